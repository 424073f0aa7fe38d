use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use indiprims_client::{interface, ClientEvent, Device, PropertyVector};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    #[serde(flatten)]
    event: &'a ClientEvent,
    received_at: String,
}

pub fn print_event(event: &ClientEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                event,
                received_at: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "DEVICE", "DETAIL"])
                .add_row(vec![
                    event.name().into_owned(),
                    event.device().unwrap_or("-").to_string(),
                    event_detail(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{event}"),
        OutputFormat::Raw => {
            if let ClientEvent::DeviceMessage { message, .. } = event {
                print_raw(format!("{message}\n").as_bytes());
            }
        }
    }
}

fn event_detail(event: &ClientEvent) -> String {
    match event {
        ClientEvent::ServerConnected { server } | ClientEvent::ServerDisconnected { server } => {
            server.clone()
        }
        ClientEvent::PropertyDefined { name, .. }
        | ClientEvent::KindDefined { name, .. }
        | ClientEvent::KindUpdated { name, .. }
        | ClientEvent::PropertyRemoved { name, .. } => name.clone(),
        ClientEvent::DeviceMessage { message, .. } => message.clone(),
        _ => String::new(),
    }
}

/// Summary row for `indiprims devices`.
#[derive(Serialize)]
pub struct DeviceRow {
    pub name: String,
    pub connected: bool,
    pub interface: Option<u32>,
    pub interfaces: Vec<&'static str>,
    pub properties: usize,
}

impl DeviceRow {
    pub fn from_device(device: &Device) -> Self {
        let interface = device.driver_interface();
        Self {
            name: device.name().to_string(),
            connected: device.is_connected(),
            interface,
            interfaces: interface.map(interface::names).unwrap_or_default(),
            properties: device.len(),
        }
    }
}

pub fn print_devices(rows: &[DeviceRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["DEVICE", "CONNECTED", "INTERFACE", "PROPERTIES"]);
            for row in rows {
                table.add_row(vec![
                    row.name.clone(),
                    row.connected.to_string(),
                    interface_label(row),
                    row.properties.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "{} connected={} interface={} properties={}",
                    row.name,
                    row.connected,
                    interface_label(row),
                    row.properties
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", row.name);
            }
        }
    }
}

fn interface_label(row: &DeviceRow) -> String {
    match row.interface {
        Some(bits) => format!("{bits} ({})", row.interfaces.join(",")),
        None => "unknown".to_string(),
    }
}

pub fn print_vectors(vectors: &[&PropertyVector], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(vectors).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROPERTY", "KIND", "STATE", "PERM", "ELEMENT", "VALUE"]);
            for vector in vectors {
                for (element, value) in vector.elements().values() {
                    table.add_row(vec![
                        vector.name().to_string(),
                        vector.kind().to_string(),
                        vector.state().unwrap_or("-").to_string(),
                        vector.perm().unwrap_or("-").to_string(),
                        element.to_string(),
                        value.into_owned(),
                    ]);
                }
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for vector in vectors {
                println!(
                    "{} [{}] state={} perm={}",
                    vector.name(),
                    vector.kind(),
                    vector.state().unwrap_or("-"),
                    vector.perm().unwrap_or("-")
                );
                for (element, value) in vector.elements().values() {
                    println!("  {element} = {value}");
                }
            }
        }
        // device.property.element=value, one per line
        OutputFormat::Raw => {
            for vector in vectors {
                for (element, value) in vector.elements().values() {
                    println!("{}.{}.{element}={value}", vector.device(), vector.name());
                }
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
