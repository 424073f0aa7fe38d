//! Connect to an INDI server and print every client event.
//!
//! Run with:
//!   cargo run --example watch-devices -- localhost:7624
//!
//! The INDI simulators make a convenient server:
//!   indiserver indi_simulator_telescope indi_simulator_ccd

use std::time::Duration;

use indiprims::client::{ClientConfig, ClientEvent, Connection};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:7624".to_string());
    let mut conn = Connection::new(ClientConfig::new(server.parse()?));

    conn.events_mut().subscribe(|event| println!("{event}"));
    let updates = conn.events_mut().channel();

    conn.try_connect()?;
    conn.try_request_properties(None)?;

    while conn.is_connected() {
        conn.poll(Duration::from_millis(250));

        // Connect every device as soon as its driver announces it.
        let discovered: Vec<String> = updates
            .try_iter()
            .filter_map(|event| match event {
                ClientEvent::PropertyDefined { device, name } if name == "CONNECTION" => {
                    Some(device)
                }
                _ => None,
            })
            .collect();
        for device in discovered {
            if !conn.registry().get(&device).is_some_and(|d| d.is_connected()) {
                conn.connect_device(&device);
            }
        }
    }

    eprintln!("Server closed the connection");
    Ok(())
}
