#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread::{self, JoinHandle};

const MOUNT_DEFS: &str = concat!(
    r#"<defSwitchVector device="Mount" name="CONNECTION" state="Ok" perm="rw" rule="OneOfMany">"#,
    r#"<defSwitch name="CONNECT">On</defSwitch><defSwitch name="DISCONNECT">Off</defSwitch>"#,
    "</defSwitchVector>\n",
    r#"<defTextVector device="Mount" name="DRIVER_INFO" state="Idle" perm="ro">"#,
    r#"<defText name="DRIVER_NAME">Simulator</defText><defText name="DRIVER_INTERFACE">5</defText>"#,
    "</defTextVector>\n",
    r#"<defNumberVector device="Mount" name="EQUATORIAL_EOD_COORD" state="Idle" perm="rw">"#,
    r#"<defNumber name="RA" format="%010.6m" min="0" max="24" step="0">12.5</defNumber>"#,
    r#"<defNumber name="DEC" format="%010.6m" min="-90" max="90" step="0">-30</defNumber>"#,
    "</defNumberVector>\n",
);

const CAMERA_DEFS: &str = concat!(
    r#"<defTextVector device="Cam" name="DRIVER_INFO" state="Idle" perm="ro">"#,
    r#"<defText name="DRIVER_INTERFACE">2</defText>"#,
    "</defTextVector>\n",
);

/// One-connection fake INDI server.
///
/// Answers the first line with `defs`, then every further client line with
/// the matching entry of `replies`, until the client hangs up. Returns the
/// lines the client sent.
fn fake_server(defs: impl Into<String>, replies: Vec<&'static str>) -> (u16, JoinHandle<Vec<String>>) {
    let defs = defs.into();
    let listener = TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed");
    let port = listener.local_addr().expect("listener has an address").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("cli should connect");
        let mut writer = stream.try_clone().expect("stream should clone");
        let mut reader = BufReader::new(stream);
        let mut received = Vec::new();
        let mut replies = replies.into_iter();
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap_or(0) > 0 {
            let reply = if received.is_empty() {
                Some(defs.as_str())
            } else {
                replies.next()
            };
            received.push(line.trim_end().to_string());
            line.clear();
            if let Some(reply) = reply {
                if writer.write_all(reply.as_bytes()).is_err() {
                    break;
                }
            }
        }
        received
    });
    (port, handle)
}

fn cli(port: u16) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_indiprims"));
    command
        .env_remove("INDI_SERVER")
        .arg("--log-level")
        .arg("error")
        .arg("--server")
        .arg(format!("127.0.0.1:{port}"));
    command
}

#[test]
fn devices_lists_registry_as_json() {
    let (port, server) = fake_server(
        // Both devices arrive in one burst.
        format!("{MOUNT_DEFS}{CAMERA_DEFS}"),
        Vec::new(),
    );

    let output = cli(port)
        .args(["--format", "json", "devices", "--settle", "2s"])
        .output()
        .expect("devices should run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let rows: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("devices output should be json");
    let rows = rows.as_array().expect("devices output should be an array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "Cam");
    assert_eq!(rows[1]["name"], "Mount");
    assert_eq!(rows[1]["connected"], true);
    assert_eq!(rows[1]["interfaces"], serde_json::json!(["telescope", "guider"]));

    let received = server.join().expect("server thread should finish");
    assert_eq!(received, vec![r#"<getProperties version="1.7"/>"#]);
}

#[test]
fn devices_filters_by_interface() {
    let (port, server) = fake_server(
        format!("{MOUNT_DEFS}{CAMERA_DEFS}"),
        Vec::new(),
    );

    let output = cli(port)
        .args(["--format", "raw", "devices", "--interface", "ccd"])
        .output()
        .expect("devices should run");
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "Cam\n");
    server.join().expect("server thread should finish");
}

#[test]
fn get_prints_raw_element_values() {
    let (port, server) = fake_server(MOUNT_DEFS, Vec::new());

    let output = cli(port)
        .args([
            "--format",
            "raw",
            "get",
            "Mount",
            "--property",
            "EQUATORIAL_EOD_COORD",
        ])
        .output()
        .expect("get should run");
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Mount.EQUATORIAL_EOD_COORD.RA=12.5\nMount.EQUATORIAL_EOD_COORD.DEC=-30\n"
    );

    let received = server.join().expect("server thread should finish");
    assert_eq!(
        received,
        vec![r#"<getProperties version="1.7" device="Mount" name="EQUATORIAL_EOD_COORD"/>"#]
    );
}

#[test]
fn get_unknown_device_is_a_data_error() {
    let (port, server) = fake_server(MOUNT_DEFS, Vec::new());

    let output = cli(port)
        .args(["get", "Ghost", "--settle", "500ms"])
        .output()
        .expect("get should run");
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Ghost"));
    server.join().expect("server thread should finish");
}

#[test]
fn set_sends_number_vector_in_argument_order() {
    let (port, server) = fake_server(
        MOUNT_DEFS,
        vec![concat!(
            r#"<setNumberVector device="Mount" name="EQUATORIAL_EOD_COORD" state="Ok">"#,
            r#"<oneNumber name="RA">6</oneNumber><oneNumber name="DEC">45</oneNumber>"#,
            "</setNumberVector>\n",
        )],
    );

    let output = cli(port)
        .args([
            "--format",
            "raw",
            "set",
            "Mount",
            "EQUATORIAL_EOD_COORD",
            "DEC=45",
            "RA=6:00:00",
        ])
        .output()
        .expect("set should run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Mount.EQUATORIAL_EOD_COORD.RA=6\nMount.EQUATORIAL_EOD_COORD.DEC=45\n"
    );

    let received = server.join().expect("server thread should finish");
    assert_eq!(
        received[1],
        concat!(
            r#"<newNumberVector device="Mount" name="EQUATORIAL_EOD_COORD">"#,
            r#"<oneNumber name="DEC">45</oneNumber><oneNumber name="RA">6</oneNumber>"#,
            "</newNumberVector>"
        )
    );
}

#[test]
fn set_unknown_property_sends_nothing() {
    let (port, server) = fake_server(MOUNT_DEFS, Vec::new());

    let output = cli(port)
        .args(["set", "Mount", "NO_SUCH", "--switch", "X=On", "--settle", "500ms"])
        .output()
        .expect("set should run");
    assert_eq!(output.status.code(), Some(60));

    let received = server.join().expect("server thread should finish");
    assert_eq!(received.len(), 1);
}

#[test]
fn connect_refused_exits_with_transport_code() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("loopback bind should succeed");
    let port = listener.local_addr().expect("listener has an address").port();
    drop(listener);

    let output = cli(port)
        .args(["--connect-timeout", "1s", "devices"])
        .output()
        .expect("devices should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn watch_stops_after_count() {
    let (port, server) = fake_server(MOUNT_DEFS, Vec::new());

    let output = cli(port)
        .args(["--format", "json", "watch", "--count", "3", "--duration", "5s"])
        .output()
        .expect("watch should run");
    assert!(output.status.success());

    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect();
    let names: Vec<&str> = events
        .iter()
        .map(|event| event["event"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        names,
        vec!["serverConnected", "deviceDiscovered", "deviceConnected"]
    );
    server.join().expect("server thread should finish");
}
