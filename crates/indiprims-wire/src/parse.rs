//! Conversion of one complete top-level XML fragment into a [`WireMessage`].

use base64::Engine as _;
use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::warn;

use crate::error::{malformed, Result};
use crate::kind::{BlobMode, SwitchState, VectorKind};
use crate::message::{
    BlobElement, DelProperty, Elements, EnableBlob, GetProperties, LightElement, Notice,
    NumberElement, SwitchElement, TextElement, VectorHeader, VectorMessage, WireMessage,
};
use crate::number::parse_number;

/// A parsed XML element.
#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    fn owned_attr(&self, key: &str) -> Option<String> {
        self.attr(key).map(str::to_string)
    }
}

/// Which message family a vector tag belongs to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum VectorRole {
    Def,
    Set,
    New,
}

/// Parse one complete top-level element.
///
/// Returns `Ok(None)` for well-formed elements this client does not know.
pub(crate) fn parse_fragment(fragment: &[u8]) -> Result<Option<WireMessage>> {
    let root = build_tree(fragment)?;
    to_message(root, fragment)
}

fn build_tree(fragment: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(fragment);
    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| malformed(format!("xml error: {err}"), fragment))?;
        match event {
            Event::Start(start) => stack.push(open_node(&start, fragment)?),
            Event::Empty(start) => {
                let node = open_node(&start, fragment)?;
                attach(&mut stack, &mut root, node, fragment)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected end tag", fragment))?;
                attach(&mut stack, &mut root, node, fragment)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    let unescaped = text
                        .unescape()
                        .map_err(|err| malformed(format!("bad text: {err}"), fragment))?;
                    top.text.push_str(&unescaped);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unclosed element", fragment));
    }
    root.ok_or_else(|| malformed("no element in fragment", fragment))
}

fn open_node(start: &BytesStart<'_>, fragment: &[u8]) -> Result<Node> {
    let tag = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| malformed("tag name is not utf-8", fragment))?
        .to_string();

    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|err| malformed(format!("bad attribute: {err}"), fragment))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| malformed("attribute name is not utf-8", fragment))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(format!("bad attribute value: {err}"), fragment))?
            .into_owned();
        attrs.push((key, value));
    }

    Ok(Node {
        tag,
        attrs,
        ..Node::default()
    })
}

fn attach(stack: &mut [Node], root: &mut Option<Node>, node: Node, fragment: &[u8]) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(malformed("more than one top-level element", fragment)),
    }
    Ok(())
}

fn to_message(node: Node, fragment: &[u8]) -> Result<Option<WireMessage>> {
    let message = match node.tag.as_str() {
        "getProperties" => WireMessage::GetProperties(GetProperties {
            version: node.owned_attr("version"),
            device: node.owned_attr("device"),
            name: node.owned_attr("name"),
        }),
        "delProperty" => WireMessage::DelProperty(DelProperty {
            device: required(&node, "device", fragment)?,
            name: node.owned_attr("name"),
            timestamp: node.owned_attr("timestamp"),
            message: node.owned_attr("message"),
        }),
        "message" => WireMessage::Message(Notice {
            device: node.owned_attr("device"),
            message: node.owned_attr("message").unwrap_or_default(),
            timestamp: node.owned_attr("timestamp"),
        }),
        "enableBLOB" => {
            let mode = node
                .text
                .parse::<BlobMode>()
                .map_err(|reason| malformed(reason, fragment))?;
            WireMessage::EnableBlob(EnableBlob {
                device: required(&node, "device", fragment)?,
                name: node.owned_attr("name"),
                mode,
            })
        }
        tag => match classify_vector(tag) {
            Some((role, kind)) => {
                let vector = to_vector(node, role, kind, fragment)?;
                match role {
                    VectorRole::Def => WireMessage::DefVector(vector),
                    VectorRole::Set => WireMessage::SetVector(vector),
                    VectorRole::New => WireMessage::NewVector(vector),
                }
            }
            None => match tag.strip_prefix("one").and_then(VectorKind::from_tag_part) {
                Some(kind) => WireMessage::OneElement(kind),
                None => {
                    warn!(tag, "skipping unknown top-level element");
                    return Ok(None);
                }
            },
        },
    };
    Ok(Some(message))
}

fn classify_vector(tag: &str) -> Option<(VectorRole, VectorKind)> {
    let body = tag.strip_suffix("Vector")?;
    let (role, kind) = if let Some(kind) = body.strip_prefix("def") {
        (VectorRole::Def, kind)
    } else if let Some(kind) = body.strip_prefix("set") {
        (VectorRole::Set, kind)
    } else if let Some(kind) = body.strip_prefix("new") {
        (VectorRole::New, kind)
    } else {
        return None;
    };
    VectorKind::from_tag_part(kind).map(|kind| (role, kind))
}

fn required(node: &Node, key: &str, fragment: &[u8]) -> Result<String> {
    node.owned_attr(key)
        .ok_or_else(|| malformed(format!("<{}> without '{key}'", node.tag), fragment))
}

fn to_vector(
    node: Node,
    role: VectorRole,
    kind: VectorKind,
    fragment: &[u8],
) -> Result<VectorMessage> {
    let header = VectorHeader {
        device: required(&node, "device", fragment)?,
        name: required(&node, "name", fragment)?,
        label: node.owned_attr("label"),
        group: node.owned_attr("group"),
        state: node.owned_attr("state"),
        perm: node.owned_attr("perm"),
        rule: node.owned_attr("rule"),
        timeout: node.owned_attr("timeout"),
        timestamp: node.owned_attr("timestamp"),
        message: node.owned_attr("message"),
    };

    let child_tag = match role {
        VectorRole::Def => format!("def{kind}"),
        VectorRole::Set | VectorRole::New => format!("one{kind}"),
    };
    let is_definition = role == VectorRole::Def;

    let mut elements = Elements::empty(kind);
    for child in node.children {
        if child.tag != child_tag {
            return Err(malformed(
                format!("<{}> inside <{}>", child.tag, node.tag),
                fragment,
            ));
        }
        let name = required(&child, "name", fragment)?;
        let label = child.owned_attr("label");
        match &mut elements {
            Elements::Text(items) => items.push(TextElement {
                name,
                label,
                value: child.text.trim().to_string(),
            }),
            Elements::Number(items) => {
                let text = child.text.trim().to_string();
                let value = parse_number(&text).unwrap_or_else(|| {
                    warn!(
                        vector = %header.name,
                        element = %name,
                        %text,
                        "non-numeric number value"
                    );
                    f64::NAN
                });
                items.push(NumberElement {
                    value,
                    text,
                    format: child.owned_attr("format"),
                    min: optional_number(&child, "min"),
                    max: optional_number(&child, "max"),
                    step: optional_number(&child, "step"),
                    name,
                    label,
                });
            }
            Elements::Switch(items) => {
                let state = child.text.parse::<SwitchState>().unwrap_or_else(|reason| {
                    warn!(
                        vector = %header.name,
                        element = %name,
                        %reason,
                        "treating switch as Off"
                    );
                    SwitchState::Off
                });
                items.push(SwitchElement { name, label, state });
            }
            Elements::Light(items) => items.push(LightElement {
                name,
                label,
                state: child.text.trim().to_string(),
            }),
            Elements::Blob(items) => {
                let data = if is_definition {
                    Bytes::new()
                } else {
                    decode_blob(&child.text).unwrap_or_else(|reason| {
                        warn!(
                            vector = %header.name,
                            element = %name,
                            %reason,
                            "dropping undecodable BLOB payload"
                        );
                        Bytes::new()
                    })
                };
                items.push(BlobElement {
                    format: child.owned_attr("format"),
                    size: child.attr("size").and_then(|size| size.trim().parse().ok()),
                    data,
                    name,
                    label,
                });
            }
        }
    }

    Ok(VectorMessage::new(header, elements))
}

fn optional_number(node: &Node, key: &str) -> Option<f64> {
    let raw = node.attr(key)?;
    let value = parse_number(raw);
    if value.is_none() {
        warn!(key, raw, element = ?node.attr("name"), "ignoring non-numeric bound");
    }
    value
}

fn decode_blob(text: &str) -> std::result::Result<Bytes, String> {
    let cleaned: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map(Bytes::from)
        .map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;

    fn parse(xml: &str) -> Result<Option<WireMessage>> {
        parse_fragment(xml.as_bytes())
    }

    #[test]
    fn def_number_vector_with_bounds() {
        let msg = parse(
            r#"<defNumberVector device="Mount" name="EQUATORIAL_EOD_COORD" label="Eq. Coordinates" group="Main Control" state="Idle" perm="rw" timeout="60" timestamp="2024-01-01T00:00:00">
                <defNumber name="RA" label="RA (hh:mm:ss)" format="%010.6m" min="0" max="24" step="0">12:30:00</defNumber>
                <defNumber name="DEC" label="DEC (dd:mm:ss)" format="%010.6m" min="-90" max="90" step="0">-45.25</defNumber>
            </defNumberVector>"#,
        )
        .unwrap()
        .unwrap();

        let WireMessage::DefVector(vector) = msg else {
            panic!("expected def vector");
        };
        assert_eq!(vector.kind(), VectorKind::Number);
        assert_eq!(vector.header.group.as_deref(), Some("Main Control"));
        assert_eq!(vector.header.perm.as_deref(), Some("rw"));
        let numbers = vector.elements.as_number().unwrap();
        assert_eq!(numbers.len(), 2);
        assert_eq!(numbers[0].value, 12.5);
        assert_eq!(numbers[0].text, "12:30:00");
        assert_eq!(numbers[0].max, Some(24.0));
        assert_eq!(numbers[1].value, -45.25);
        assert_eq!(numbers[1].min, Some(-90.0));
    }

    #[test]
    fn set_switch_vector() {
        let msg = parse(
            r#"<setSwitchVector device="Mount" name="CONNECTION" state="Ok"><oneSwitch name="CONNECT">On</oneSwitch><oneSwitch name="DISCONNECT">
            Off
            </oneSwitch></setSwitchVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::SetVector(vector) = msg else {
            panic!("expected set vector");
        };
        let switches = vector.elements.as_switch().unwrap();
        assert_eq!(switches[0].state, SwitchState::On);
        assert_eq!(switches[1].state, SwitchState::Off);
        assert_eq!(vector.header.state.as_deref(), Some("Ok"));
    }

    #[test]
    fn text_is_unescaped_and_trimmed() {
        let msg = parse(
            r#"<defTextVector device="Cam" name="INFO" state="Idle" perm="ro"><defText name="NOTE"> a &amp; b </defText></defTextVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::DefVector(vector) = msg else {
            panic!("expected def vector");
        };
        assert_eq!(vector.elements.as_text().unwrap()[0].value, "a & b");
    }

    #[test]
    fn blob_payload_is_base64_decoded() {
        let msg = parse(
            "<setBLOBVector device=\"Cam\" name=\"CCD1\" state=\"Ok\"><oneBLOB name=\"CCD1\" size=\"5\" format=\".fits\">aGVs\nbG8=</oneBLOB></setBLOBVector>",
        )
        .unwrap()
        .unwrap();
        let WireMessage::SetVector(vector) = msg else {
            panic!("expected set vector");
        };
        let blob = &vector.elements.as_blob().unwrap()[0];
        assert_eq!(blob.data.as_ref(), b"hello");
        assert_eq!(blob.size, Some(5));
        assert_eq!(blob.format.as_deref(), Some(".fits"));
    }

    #[test]
    fn def_blob_has_no_payload() {
        let msg = parse(
            r#"<defBLOBVector device="Cam" name="CCD1" state="Idle" perm="ro"><defBLOB name="CCD1" label="Image"/></defBLOBVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::DefVector(vector) = msg else {
            panic!("expected def vector");
        };
        assert!(vector.elements.as_blob().unwrap()[0].data.is_empty());
    }

    #[test]
    fn del_property_message_and_get_properties() {
        assert_eq!(
            parse(r#"<delProperty device="Mount"/>"#).unwrap(),
            Some(WireMessage::DelProperty(DelProperty {
                device: "Mount".to_string(),
                ..DelProperty::default()
            }))
        );
        assert_eq!(
            parse(r#"<message timestamp="t" message="server restarting"/>"#).unwrap(),
            Some(WireMessage::Message(Notice {
                device: None,
                message: "server restarting".to_string(),
                timestamp: Some("t".to_string()),
            }))
        );
        assert_eq!(
            parse(r#"<getProperties version="1.7"/>"#).unwrap(),
            Some(WireMessage::GetProperties(GetProperties {
                version: Some("1.7".to_string()),
                device: None,
                name: None,
            }))
        );
    }

    #[test]
    fn stray_one_element_and_unknown_tags() {
        assert_eq!(
            parse(r#"<oneNumber name="X">1</oneNumber>"#).unwrap(),
            Some(WireMessage::OneElement(VectorKind::Number))
        );
        assert_eq!(parse(r#"<pingRequest uid="1"/>"#).unwrap(), None);
    }

    #[test]
    fn malformed_inputs() {
        let cases = [
            r#"<defTextVector name="X"><defText name="A">a</defText></defTextVector>"#,
            r#"<setSwitchVector device="D" name="S"><oneText name="A">x</oneText></setSwitchVector>"#,
            r#"<setTextVector device="D" name="S"><oneText>x</oneText></setTextVector>"#,
            r#"<defTextVector device="D" name="X"></defSwitchVector>"#,
            r#"<enableBLOB device="D">Sometimes</enableBLOB>"#,
        ];
        for case in cases {
            let err = parse(case).unwrap_err();
            assert!(
                matches!(err, WireError::Malformed { .. }),
                "expected malformed for {case}, got {err:?}"
            );
        }
    }

    #[test]
    fn bad_element_values_are_kept_not_fatal() {
        let msg = parse(
            r#"<setNumberVector device="Focuser" name="POS" state="Ok"><oneNumber name="P"></oneNumber><oneNumber name="Q">1,5</oneNumber><oneNumber name="R">7</oneNumber></setNumberVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::SetVector(vector) = msg else {
            panic!("expected set vector");
        };
        let numbers = vector.elements.as_number().unwrap();
        assert!(numbers[0].value.is_nan());
        assert_eq!(numbers[0].text, "");
        assert!(numbers[1].value.is_nan());
        assert_eq!(numbers[1].text, "1,5");
        assert_eq!(numbers[2].value, 7.0);

        let msg = parse(
            r#"<setSwitchVector device="D" name="S"><oneSwitch name="A">Maybe</oneSwitch><oneSwitch name="B">On</oneSwitch></setSwitchVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::SetVector(vector) = msg else {
            panic!("expected set vector");
        };
        let switches = vector.elements.as_switch().unwrap();
        assert_eq!(switches[0].state, SwitchState::Off);
        assert_eq!(switches[1].state, SwitchState::On);

        let msg = parse(
            r#"<setBLOBVector device="D" name="B"><oneBLOB name="B" size="3">***</oneBLOB></setBLOBVector>"#,
        )
        .unwrap()
        .unwrap();
        let WireMessage::SetVector(vector) = msg else {
            panic!("expected set vector");
        };
        assert!(vector.elements.as_blob().unwrap()[0].data.is_empty());
    }
}
