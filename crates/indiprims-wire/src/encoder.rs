use std::borrow::Cow;

use base64::Engine as _;
use bytes::BytesMut;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{Result, WireError};
use crate::message::{Elements, VectorHeader, VectorMessage, WireMessage};
use crate::number::format_number;

/// Where a vector is going; decides which attributes and child tags are used.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Def,
    Set,
    New,
}

/// Encode one message as a single XML element into `dst`.
///
/// No trailing newline is written; [`crate::MessageWriter`] adds it.
pub fn encode_message(message: &WireMessage, dst: &mut BytesMut) -> Result<()> {
    let mut writer = Writer::new(Vec::with_capacity(256));
    write_message(&mut writer, message).map_err(xml_error)?;
    dst.extend_from_slice(&writer.into_inner());
    Ok(())
}

/// Encode one message to an owned string.
pub fn to_xml(message: &WireMessage) -> Result<String> {
    let mut dst = BytesMut::new();
    encode_message(message, &mut dst)?;
    String::from_utf8(dst.to_vec())
        .map_err(|err| WireError::Io(std::io::Error::other(err.to_string())))
}

fn xml_error(err: quick_xml::Error) -> WireError {
    WireError::Io(std::io::Error::other(err.to_string()))
}

type XmlResult = std::result::Result<(), quick_xml::Error>;

fn write_message(w: &mut Writer<Vec<u8>>, message: &WireMessage) -> XmlResult {
    match message {
        WireMessage::DefVector(vector) => write_vector(w, vector, Role::Def),
        WireMessage::SetVector(vector) => write_vector(w, vector, Role::Set),
        WireMessage::NewVector(vector) => write_vector(w, vector, Role::New),
        WireMessage::DelProperty(del) => {
            let mut start = BytesStart::new("delProperty");
            start.push_attribute(("device", del.device.as_str()));
            push_optional(&mut start, "name", &del.name);
            push_optional(&mut start, "timestamp", &del.timestamp);
            push_optional(&mut start, "message", &del.message);
            w.write_event(Event::Empty(start))
        }
        WireMessage::Message(notice) => {
            let mut start = BytesStart::new("message");
            push_optional(&mut start, "device", &notice.device);
            push_optional(&mut start, "timestamp", &notice.timestamp);
            start.push_attribute(("message", notice.message.as_str()));
            w.write_event(Event::Empty(start))
        }
        WireMessage::GetProperties(get) => {
            let mut start = BytesStart::new("getProperties");
            push_optional(&mut start, "version", &get.version);
            push_optional(&mut start, "device", &get.device);
            push_optional(&mut start, "name", &get.name);
            w.write_event(Event::Empty(start))
        }
        WireMessage::EnableBlob(enable) => {
            let mut start = BytesStart::new("enableBLOB");
            start.push_attribute(("device", enable.device.as_str()));
            push_optional(&mut start, "name", &enable.name);
            write_with_text(w, start, enable.mode.as_str())
        }
        WireMessage::OneElement(kind) => {
            w.write_event(Event::Empty(BytesStart::new(format!("one{kind}"))))
        }
    }
}

fn write_vector(w: &mut Writer<Vec<u8>>, vector: &VectorMessage, role: Role) -> XmlResult {
    let tag = match role {
        Role::Def => format!("def{}Vector", vector.kind()),
        Role::Set => format!("set{}Vector", vector.kind()),
        Role::New => format!("new{}Vector", vector.kind()),
    };
    let start = vector_start(&tag, &vector.header, role);
    w.write_event(Event::Start(start))?;
    write_elements(w, &vector.elements, role)?;
    w.write_event(Event::End(BytesEnd::new(tag)))
}

fn vector_start<'a>(tag: &'a str, header: &'a VectorHeader, role: Role) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    start.push_attribute(("device", header.device.as_str()));
    start.push_attribute(("name", header.name.as_str()));
    if role == Role::Def {
        push_optional(&mut start, "label", &header.label);
        push_optional(&mut start, "group", &header.group);
    }
    if role != Role::New {
        push_optional(&mut start, "state", &header.state);
    }
    if role == Role::Def {
        push_optional(&mut start, "perm", &header.perm);
        push_optional(&mut start, "rule", &header.rule);
    }
    if role != Role::New {
        push_optional(&mut start, "timeout", &header.timeout);
    }
    push_optional(&mut start, "timestamp", &header.timestamp);
    if role != Role::New {
        push_optional(&mut start, "message", &header.message);
    }
    start
}

fn write_elements(w: &mut Writer<Vec<u8>>, elements: &Elements, role: Role) -> XmlResult {
    let def = role == Role::Def;
    let tag = if def {
        format!("def{}", elements.kind())
    } else {
        format!("one{}", elements.kind())
    };

    match elements {
        Elements::Text(items) => {
            for e in items {
                let start = element_start(&tag, &e.name, &e.label, def);
                write_with_text(w, start, &e.value)?;
            }
        }
        Elements::Number(items) => {
            for e in items {
                let mut start = element_start(&tag, &e.name, &e.label, def);
                if def {
                    push_optional(&mut start, "format", &e.format);
                    push_number(&mut start, "min", e.min);
                    push_number(&mut start, "max", e.max);
                    push_number(&mut start, "step", e.step);
                }
                let text = if e.text.is_empty() {
                    Cow::Owned(format_number(e.value))
                } else {
                    Cow::Borrowed(e.text.as_str())
                };
                write_with_text(w, start, &text)?;
            }
        }
        Elements::Switch(items) => {
            for e in items {
                let start = element_start(&tag, &e.name, &e.label, def);
                write_with_text(w, start, e.state.as_str())?;
            }
        }
        Elements::Light(items) => {
            for e in items {
                let start = element_start(&tag, &e.name, &e.label, def);
                write_with_text(w, start, &e.state)?;
            }
        }
        Elements::Blob(items) => {
            for e in items {
                let mut start = element_start(&tag, &e.name, &e.label, def);
                if def {
                    w.write_event(Event::Empty(start))?;
                    continue;
                }
                let size = e.size.unwrap_or(e.data.len() as u64).to_string();
                start.push_attribute(("size", size.as_str()));
                push_optional(&mut start, "format", &e.format);
                let payload = base64::engine::general_purpose::STANDARD.encode(&e.data);
                write_with_text(w, start, &payload)?;
            }
        }
    }
    Ok(())
}

fn element_start<'a>(
    tag: &'a str,
    name: &'a str,
    label: &'a Option<String>,
    def: bool,
) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    start.push_attribute(("name", name));
    if def {
        push_optional(&mut start, "label", label);
    }
    start
}

fn write_with_text(w: &mut Writer<Vec<u8>>, start: BytesStart<'_>, text: &str) -> XmlResult {
    let end = start.to_end().into_owned();
    w.write_event(Event::Start(start))?;
    if !text.is_empty() {
        w.write_event(Event::Text(BytesText::new(text)))?;
    }
    w.write_event(Event::End(end))
}

fn push_optional(start: &mut BytesStart<'_>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        start.push_attribute((key, value.as_str()));
    }
}

fn push_number(start: &mut BytesStart<'_>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        start.push_attribute((key, format_number(value).as_str()));
    }
}
