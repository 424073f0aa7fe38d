//! Builders for client-to-server messages.
//!
//! Element entries are emitted in caller order, one `one*` child each.

use indiprims_wire::{
    BlobMode, Elements, EnableBlob, GetProperties, NumberElement, SwitchElement, SwitchState,
    TextElement, VectorHeader, VectorMessage, WireMessage, PROTOCOL_VERSION,
};

use crate::registry::{CONNECT, CONNECTION, DISCONNECT};

/// Discovery request, global or scoped to one device.
pub fn get_properties(device: Option<&str>) -> WireMessage {
    WireMessage::GetProperties(GetProperties {
        version: Some(PROTOCOL_VERSION.to_string()),
        device: device.map(str::to_string),
        name: None,
    })
}

/// Discovery request for a single property of a device.
pub fn get_property(device: &str, property: &str) -> WireMessage {
    WireMessage::GetProperties(GetProperties {
        version: Some(PROTOCOL_VERSION.to_string()),
        device: Some(device.to_string()),
        name: Some(property.to_string()),
    })
}

/// BLOB delivery policy for a device, or one of its properties.
pub fn enable_blob(mode: BlobMode, device: &str, property: Option<&str>) -> WireMessage {
    WireMessage::EnableBlob(EnableBlob {
        device: device.to_string(),
        name: property.map(str::to_string),
        mode,
    })
}

/// `newTextVector` with one `oneText` per entry, in iteration order.
pub fn new_text_vector<I, K, V>(device: &str, property: &str, elements: I) -> WireMessage
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let items = elements
        .into_iter()
        .map(|(name, value)| TextElement {
            name: name.into(),
            label: None,
            value: value.into(),
        })
        .collect();
    new_vector(device, property, Elements::Text(items))
}

/// `newNumberVector` with one `oneNumber` per entry, in iteration order.
pub fn new_number_vector<I, K>(device: &str, property: &str, elements: I) -> WireMessage
where
    I: IntoIterator<Item = (K, f64)>,
    K: Into<String>,
{
    let items = elements
        .into_iter()
        .map(|(name, value)| NumberElement::value(name, value))
        .collect();
    new_vector(device, property, Elements::Number(items))
}

/// `newSwitchVector` with one `oneSwitch` per entry, in iteration order.
pub fn new_switch_vector<I, K, V>(device: &str, property: &str, elements: I) -> WireMessage
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<SwitchState>,
{
    let items = elements
        .into_iter()
        .map(|(name, state)| SwitchElement {
            name: name.into(),
            label: None,
            state: state.into(),
        })
        .collect();
    new_vector(device, property, Elements::Switch(items))
}

/// The standard `CONNECTION` switch in the requested position.
pub fn connection_switch(device: &str, connect: bool) -> WireMessage {
    new_switch_vector(
        device,
        CONNECTION,
        [(CONNECT, connect), (DISCONNECT, !connect)],
    )
}

fn new_vector(device: &str, property: &str, elements: Elements) -> WireMessage {
    WireMessage::NewVector(VectorMessage::new(
        VectorHeader::new(device, property),
        elements,
    ))
}
