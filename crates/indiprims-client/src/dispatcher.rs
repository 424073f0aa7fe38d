//! Protocol state machine: one decoded message in, registry mutation and
//! events out.

use indiprims_wire::{DelProperty, Elements, Notice, VectorMessage, WireMessage};
use tracing::{debug, info, trace};

use crate::events::{ClientEvent, EventSink};
use crate::registry::{PropertyVector, Registry, Removed, CONNECT, DISCONNECT};

const ON: &str = "On";

/// Apply one server message.
///
/// Returns `true` if the registry changed or an event was emitted. While
/// not connected every message is discarded.
pub fn dispatch<S: EventSink + ?Sized>(
    registry: &mut Registry,
    sink: &mut S,
    message: WireMessage,
    connected: bool,
) -> bool {
    if !connected {
        debug!(tag = %message.tag_name(), "discarding message while disconnected");
        return false;
    }

    match message {
        WireMessage::Message(notice) => on_notice(sink, notice),
        WireMessage::DelProperty(del) => on_del_property(registry, sink, del),
        WireMessage::DefVector(vector) => on_vector(registry, sink, vector, true),
        WireMessage::SetVector(vector) => on_vector(registry, sink, vector, false),
        other @ (WireMessage::GetProperties(_)
        | WireMessage::NewVector(_)
        | WireMessage::OneElement(_)
        | WireMessage::EnableBlob(_)) => {
            trace!(tag = %other.tag_name(), "ignoring client-side message");
            false
        }
    }
}

fn on_notice<S: EventSink + ?Sized>(sink: &mut S, notice: Notice) -> bool {
    info!(
        device = notice.device.as_deref().unwrap_or("server"),
        text = %notice.message,
        "INDI message"
    );
    sink.emit(ClientEvent::DeviceMessage {
        device: notice.device,
        message: notice.message,
        timestamp: notice.timestamp,
    });
    true
}

fn on_del_property<S: EventSink + ?Sized>(
    registry: &mut Registry,
    sink: &mut S,
    del: DelProperty,
) -> bool {
    match registry.remove_vector(&del.device, del.name.as_deref()) {
        Some(Removed::Vector(vector)) => {
            info!(device = %del.device, property = vector.name(), "property removed");
            sink.emit(ClientEvent::PropertyRemoved {
                device: del.device,
                name: vector.name().to_string(),
            });
            true
        }
        Some(Removed::Device(_)) => {
            info!(device = %del.device, "device removed");
            sink.emit(ClientEvent::DeviceRemoved { device: del.device });
            true
        }
        None => {
            debug!(device = %del.device, property = ?del.name, "delProperty for unknown target");
            false
        }
    }
}

fn on_vector<S: EventSink + ?Sized>(
    registry: &mut Registry,
    sink: &mut S,
    message: VectorMessage,
    definition: bool,
) -> bool {
    let device = message.header.device.clone();
    let name = message.header.name.clone();
    let kind = message.kind();

    if registry.ensure_device(&device) {
        info!(%device, "device discovered");
        sink.emit(ClientEvent::DeviceDiscovered {
            device: device.clone(),
        });
    }

    let vector = registry.upsert_vector(message);
    connection_heuristics(vector, sink);

    if definition {
        debug!(%device, property = %name, %kind, "property defined");
        sink.emit(ClientEvent::PropertyDefined {
            device: device.clone(),
            name: name.clone(),
        });
        sink.emit(ClientEvent::KindDefined { device, name, kind });
    } else {
        trace!(%device, property = %name, %kind, "property updated");
        sink.emit(ClientEvent::KindUpdated { device, name, kind });
    }
    true
}

/// The `CONNECT`/`DISCONNECT` convention, evaluated per element in order.
///
/// Any element kind qualifies; only the element name and an `On` value count.
fn connection_heuristics<S: EventSink + ?Sized>(vector: &PropertyVector, sink: &mut S) {
    let state_ok = vector.state() == Some("Ok");
    for name in switched_on(vector.elements()) {
        if name == CONNECT && state_ok {
            info!(device = vector.device(), "device connected");
            sink.emit(ClientEvent::DeviceConnected {
                device: vector.device().to_string(),
            });
        } else if name == DISCONNECT {
            info!(device = vector.device(), "device disconnected");
            sink.emit(ClientEvent::DeviceDisconnected {
                device: vector.device().to_string(),
            });
        }
    }
}

/// Names of the elements whose value is `On`, in wire order.
fn switched_on(elements: &Elements) -> Vec<&str> {
    match elements {
        Elements::Switch(items) => items
            .iter()
            .filter(|e| e.state.is_on())
            .map(|e| e.name.as_str())
            .collect(),
        Elements::Text(items) => items
            .iter()
            .filter(|e| e.value == ON)
            .map(|e| e.name.as_str())
            .collect(),
        Elements::Number(items) => items
            .iter()
            .filter(|e| e.text == ON)
            .map(|e| e.name.as_str())
            .collect(),
        Elements::Light(items) => items
            .iter()
            .filter(|e| e.state == ON)
            .map(|e| e.name.as_str())
            .collect(),
        Elements::Blob(_) => Vec::new(),
    }
}
