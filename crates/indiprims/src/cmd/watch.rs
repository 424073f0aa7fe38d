use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use indiprims_client::ClientEvent;
use tracing::warn;

use crate::cmd::session::{self, CliConnection};
use crate::cmd::{ServerArgs, WatchArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_event, OutputFormat};

pub fn run(args: WatchArgs, server: &ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let limit = args
        .duration
        .as_deref()
        .map(session::parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);

    let running = session::install_ctrlc_handler()?;
    let mut conn = session::open(server)?;
    conn.try_request_properties(args.device.as_deref())
        .map_err(|err| client_error("getProperties failed", err))?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|at| Instant::now() >= at) {
            break;
        }
        conn.poll(Duration::from_millis(100));

        for event in session::drain(&mut conn) {
            if !matches_device(&event, args.device.as_deref()) {
                continue;
            }
            if let (Some(mode), ClientEvent::DeviceDiscovered { device }) = (args.blobs, &event) {
                request_blobs(&mut conn, mode, device);
            }

            print_event(&event, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
        session::ensure_connected(&conn)?;
    }

    conn.disconnect();
    Ok(SUCCESS)
}

fn matches_device(event: &ClientEvent, device: Option<&str>) -> bool {
    match (device, event.device()) {
        (None, _) => true,
        // Server-level events are always shown.
        (Some(_), None) => true,
        (Some(wanted), Some(actual)) => wanted == actual,
    }
}

fn request_blobs(conn: &mut CliConnection, mode: indiprims_wire::BlobMode, device: &str) {
    if !conn.set_blob_mode(mode, device, None) {
        warn!(device, %mode, "BLOB mode request not sent");
    }
}
