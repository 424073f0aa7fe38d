use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

use crate::kind::{BlobMode, SwitchState, VectorKind};
use crate::number::format_number;

/// Attributes shared by every `def*Vector`, `set*Vector` and `new*Vector`.
///
/// Only `device` and `name` are always present; `set*` messages usually
/// carry just `state`/`timestamp`, and `new*` messages carry neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VectorHeader {
    pub device: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VectorHeader {
    /// Header with only `device` and `name` set.
    pub fn new(device: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style state setter.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

/// One member of a text vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextElement {
    pub name: String,
    pub label: Option<String>,
    pub value: String,
}

/// One member of a number vector.
///
/// `text` keeps the value as it appeared on the wire (possibly sexagesimal).
/// `value` is NaN when `text` is not a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberElement {
    pub name: String,
    pub label: Option<String>,
    pub value: f64,
    pub text: String,
    pub format: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl NumberElement {
    /// Element carrying only a value, as used in `oneNumber`.
    pub fn value(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            label: None,
            value,
            text: format_number(value),
            format: None,
            min: None,
            max: None,
            step: None,
        }
    }
}

/// One member of a switch vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchElement {
    pub name: String,
    pub label: Option<String>,
    pub state: SwitchState,
}

/// One member of a light vector. The state is kept as received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LightElement {
    pub name: String,
    pub label: Option<String>,
    pub state: String,
}

/// One member of a BLOB vector.
///
/// `defBLOB` carries no payload, so `data` is empty until the first
/// `setBLOBVector` arrives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlobElement {
    pub name: String,
    pub label: Option<String>,
    pub format: Option<String>,
    pub size: Option<u64>,
    /// Payload bytes; only their count is serialized.
    #[serde(rename = "received", serialize_with = "serialize_len")]
    pub data: Bytes,
}

fn serialize_len<S: serde::Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(data.len() as u64)
}

/// The ordered element list of a vector, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "items")]
pub enum Elements {
    Text(Vec<TextElement>),
    Number(Vec<NumberElement>),
    Switch(Vec<SwitchElement>),
    Light(Vec<LightElement>),
    #[serde(rename = "BLOB")]
    Blob(Vec<BlobElement>),
}

impl Elements {
    /// Empty element list of the given kind.
    pub fn empty(kind: VectorKind) -> Self {
        match kind {
            VectorKind::Text => Elements::Text(Vec::new()),
            VectorKind::Number => Elements::Number(Vec::new()),
            VectorKind::Switch => Elements::Switch(Vec::new()),
            VectorKind::Light => Elements::Light(Vec::new()),
            VectorKind::Blob => Elements::Blob(Vec::new()),
        }
    }

    /// Kind implied by the variant.
    pub fn kind(&self) -> VectorKind {
        match self {
            Elements::Text(_) => VectorKind::Text,
            Elements::Number(_) => VectorKind::Number,
            Elements::Switch(_) => VectorKind::Switch,
            Elements::Light(_) => VectorKind::Light,
            Elements::Blob(_) => VectorKind::Blob,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Elements::Text(items) => items.len(),
            Elements::Number(items) => items.len(),
            Elements::Switch(items) => items.len(),
            Elements::Light(items) => items.len(),
            Elements::Blob(items) => items.len(),
        }
    }

    /// Whether there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element names in wire order.
    pub fn names(&self) -> Vec<&str> {
        self.values().into_iter().map(|(name, _)| name).collect()
    }

    /// `(name, value)` pairs in wire order, values rendered as wire text.
    ///
    /// BLOB payloads are summarised as `<N bytes>`.
    pub fn values(&self) -> Vec<(&str, Cow<'_, str>)> {
        match self {
            Elements::Text(items) => items
                .iter()
                .map(|e| (e.name.as_str(), Cow::Borrowed(e.value.as_str())))
                .collect(),
            Elements::Number(items) => items
                .iter()
                .map(|e| (e.name.as_str(), Cow::Borrowed(e.text.as_str())))
                .collect(),
            Elements::Switch(items) => items
                .iter()
                .map(|e| (e.name.as_str(), Cow::Borrowed(e.state.as_str())))
                .collect(),
            Elements::Light(items) => items
                .iter()
                .map(|e| (e.name.as_str(), Cow::Borrowed(e.state.as_str())))
                .collect(),
            Elements::Blob(items) => items
                .iter()
                .map(|e| (e.name.as_str(), Cow::Owned(format!("<{} bytes>", e.data.len()))))
                .collect(),
        }
    }

    /// Wire text of one element.
    pub fn value_of(&self, name: &str) -> Option<Cow<'_, str>> {
        self.values()
            .into_iter()
            .find(|(element, _)| *element == name)
            .map(|(_, value)| value)
    }

    /// Text elements, if this is a text vector.
    pub fn as_text(&self) -> Option<&[TextElement]> {
        match self {
            Elements::Text(items) => Some(items),
            _ => None,
        }
    }

    /// Number elements, if this is a number vector.
    pub fn as_number(&self) -> Option<&[NumberElement]> {
        match self {
            Elements::Number(items) => Some(items),
            _ => None,
        }
    }

    /// Switch elements, if this is a switch vector.
    pub fn as_switch(&self) -> Option<&[SwitchElement]> {
        match self {
            Elements::Switch(items) => Some(items),
            _ => None,
        }
    }

    /// Light elements, if this is a light vector.
    pub fn as_light(&self) -> Option<&[LightElement]> {
        match self {
            Elements::Light(items) => Some(items),
            _ => None,
        }
    }

    /// BLOB elements, if this is a BLOB vector.
    pub fn as_blob(&self) -> Option<&[BlobElement]> {
        match self {
            Elements::Blob(items) => Some(items),
            _ => None,
        }
    }
}

/// A vector message: header plus elements.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMessage {
    pub header: VectorHeader,
    pub elements: Elements,
}

impl VectorMessage {
    /// Vector from a header and elements.
    pub fn new(header: VectorHeader, elements: Elements) -> Self {
        Self { header, elements }
    }

    /// Kind of the elements.
    pub fn kind(&self) -> VectorKind {
        self.elements.kind()
    }

    /// Target device.
    pub fn device(&self) -> &str {
        &self.header.device
    }

    /// Vector name.
    pub fn name(&self) -> &str {
        &self.header.name
    }
}

/// `delProperty`: remove one vector, or a whole device when `name` is absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DelProperty {
    pub device: String,
    pub name: Option<String>,
    pub timestamp: Option<String>,
    pub message: Option<String>,
}

/// `message`: a notice from a device, or from the server when `device` is absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Notice {
    pub device: Option<String>,
    pub message: String,
    pub timestamp: Option<String>,
}

/// `getProperties`: discovery request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetProperties {
    pub version: Option<String>,
    pub device: Option<String>,
    pub name: Option<String>,
}

/// `enableBLOB`: BLOB delivery policy for a device or one of its vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct EnableBlob {
    pub device: String,
    pub name: Option<String>,
    pub mode: BlobMode,
}

/// One complete top-level protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// `def*Vector`: full definition of a vector.
    DefVector(VectorMessage),
    /// `set*Vector`: new values of a vector.
    SetVector(VectorMessage),
    /// `delProperty`.
    DelProperty(DelProperty),
    /// `message`.
    Message(Notice),
    /// `getProperties`.
    GetProperties(GetProperties),
    /// `new*Vector`, client to server only.
    NewVector(VectorMessage),
    /// A stray `one*` element at top level.
    OneElement(VectorKind),
    /// `enableBLOB`, client to server only.
    EnableBlob(EnableBlob),
}

impl WireMessage {
    /// XML tag name of this message.
    pub fn tag_name(&self) -> Cow<'static, str> {
        match self {
            WireMessage::DefVector(v) => Cow::Owned(format!("def{}Vector", v.kind())),
            WireMessage::SetVector(v) => Cow::Owned(format!("set{}Vector", v.kind())),
            WireMessage::NewVector(v) => Cow::Owned(format!("new{}Vector", v.kind())),
            WireMessage::OneElement(kind) => Cow::Owned(format!("one{kind}")),
            WireMessage::DelProperty(_) => Cow::Borrowed("delProperty"),
            WireMessage::Message(_) => Cow::Borrowed("message"),
            WireMessage::GetProperties(_) => Cow::Borrowed("getProperties"),
            WireMessage::EnableBlob(_) => Cow::Borrowed("enableBLOB"),
        }
    }

    /// Device named by the message, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            WireMessage::DefVector(v) | WireMessage::SetVector(v) | WireMessage::NewVector(v) => {
                Some(&v.header.device)
            }
            WireMessage::DelProperty(d) => Some(&d.device),
            WireMessage::Message(n) => n.device.as_deref(),
            WireMessage::GetProperties(g) => g.device.as_deref(),
            WireMessage::EnableBlob(e) => Some(&e.device),
            WireMessage::OneElement(_) => None,
        }
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag_name())?;
        match self {
            WireMessage::DefVector(v) | WireMessage::SetVector(v) | WireMessage::NewVector(v) => {
                write!(f, " ({}, {}", v.header.device, v.header.name)?;
                if let Some(state) = &v.header.state {
                    write!(f, ", {state}")?;
                }
                write!(f, ")")?;
                for (name, value) in v.elements.values() {
                    write!(f, " {name}={value}")?;
                }
                Ok(())
            }
            WireMessage::DelProperty(d) => match &d.name {
                Some(name) => write!(f, " ({}, {name})", d.device),
                None => write!(f, " ({})", d.device),
            },
            WireMessage::Message(n) => write!(
                f,
                " ({}) - {}",
                n.device.as_deref().unwrap_or("server"),
                n.message
            ),
            WireMessage::GetProperties(g) => {
                write!(f, " ({})", g.device.as_deref().unwrap_or("*"))
            }
            WireMessage::EnableBlob(e) => write!(f, " ({}) {}", e.device, e.mode),
            WireMessage::OneElement(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn switch(name: &str, state: SwitchState) -> SwitchElement {
        SwitchElement {
            name: name.to_string(),
            label: None,
            state,
        }
    }

    #[test]
    fn elements_report_kind_and_values() {
        let elements = Elements::Switch(vec![
            switch("CONNECT", SwitchState::On),
            switch("DISCONNECT", SwitchState::Off),
        ]);
        assert_eq!(elements.kind(), VectorKind::Switch);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements.names(), vec!["CONNECT", "DISCONNECT"]);
        assert_eq!(elements.value_of("CONNECT").as_deref(), Some("On"));
        assert_eq!(elements.value_of("MISSING"), None);
        assert!(elements.as_switch().is_some());
        assert!(elements.as_number().is_none());
    }

    #[test]
    fn blob_values_are_summarised() {
        let elements = Elements::Blob(vec![BlobElement {
            name: "CCD1".to_string(),
            label: None,
            format: Some(".fits".to_string()),
            size: Some(4),
            data: Bytes::from_static(b"abcd"),
        }]);
        assert_eq!(elements.value_of("CCD1").as_deref(), Some("<4 bytes>"));
    }

    #[test]
    fn elements_serialize_tagged_by_kind() {
        let elements = Elements::Number(vec![NumberElement::value("RA", 12.5)]);
        let json = serde_json::to_value(&elements).unwrap();
        assert_eq!(json["kind"], "Number");
        assert_eq!(json["items"][0]["name"], "RA");
        assert_eq!(json["items"][0]["value"], 12.5);
    }

    #[test]
    fn tag_names() {
        let msg = WireMessage::DefVector(VectorMessage::new(
            VectorHeader::new("Mount", "CONNECTION"),
            Elements::empty(VectorKind::Blob),
        ));
        assert_eq!(msg.tag_name(), "defBLOBVector");
        assert_eq!(msg.device(), Some("Mount"));
        assert_eq!(WireMessage::OneElement(VectorKind::Light).tag_name(), "oneLight");
        assert_eq!(
            WireMessage::Message(Notice::default()).tag_name(),
            "message"
        );
    }

    #[test]
    fn display_is_compact() {
        let msg = WireMessage::SetVector(VectorMessage::new(
            VectorHeader::new("Mount", "CONNECTION").with_state("Ok"),
            Elements::Switch(vec![switch("CONNECT", SwitchState::On)]),
        ));
        assert_eq!(
            msg.to_string(),
            "setSwitchVector (Mount, CONNECTION, Ok) CONNECT=On"
        );
    }
}
