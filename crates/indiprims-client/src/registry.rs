use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use indiprims_wire::{
    parse_number, BlobElement, Elements, LightElement, NumberElement, SwitchElement, TextElement,
    VectorHeader, VectorKind, VectorMessage,
};
use serde::Serialize;
use tracing::warn;

use crate::interface::{ALL, DRIVER_INFO, DRIVER_INTERFACE};

/// Standard switch vector that connects a driver to its hardware.
pub const CONNECTION: &str = "CONNECTION";
/// Element of [`CONNECTION`] that is `On` while connected.
pub const CONNECT: &str = "CONNECT";
/// Element of [`CONNECTION`] that is `On` while disconnected.
pub const DISCONNECT: &str = "DISCONNECT";

/// One named property of a device, as last reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyVector {
    #[serde(flatten)]
    header: VectorHeader,
    elements: Elements,
}

impl PropertyVector {
    fn from_message(message: VectorMessage) -> Self {
        Self {
            header: message.header,
            elements: message.elements,
        }
    }

    /// Apply a Def/Set snapshot in place.
    ///
    /// Header attributes present in the message overwrite the stored ones,
    /// absent ones are kept. The element list is always replaced.
    fn apply(&mut self, message: VectorMessage) {
        let VectorHeader {
            label,
            group,
            state,
            perm,
            rule,
            timeout,
            timestamp,
            message: text,
            ..
        } = message.header;
        merge(&mut self.header.label, label);
        merge(&mut self.header.group, group);
        merge(&mut self.header.state, state);
        merge(&mut self.header.perm, perm);
        merge(&mut self.header.rule, rule);
        merge(&mut self.header.timeout, timeout);
        merge(&mut self.header.timestamp, timestamp);
        merge(&mut self.header.message, text);
        self.elements = message.elements;
    }

    /// Owning device name.
    pub fn device(&self) -> &str {
        &self.header.device
    }

    /// Vector name, unique within its device.
    pub fn name(&self) -> &str {
        &self.header.name
    }

    /// Element kind of the current definition.
    pub fn kind(&self) -> VectorKind {
        self.elements.kind()
    }

    /// `Idle`, `Ok`, `Busy` or `Alert`, as received.
    pub fn state(&self) -> Option<&str> {
        self.header.state.as_deref()
    }

    /// Human-readable label from the definition.
    pub fn label(&self) -> Option<&str> {
        self.header.label.as_deref()
    }

    /// UI group from the definition.
    pub fn group(&self) -> Option<&str> {
        self.header.group.as_deref()
    }

    /// `ro`, `wo` or `rw`.
    pub fn perm(&self) -> Option<&str> {
        self.header.perm.as_deref()
    }

    /// Switch rule such as `OneOfMany`, for switch vectors.
    pub fn rule(&self) -> Option<&str> {
        self.header.rule.as_deref()
    }

    /// Worst-case response time in seconds, as received.
    pub fn timeout(&self) -> Option<&str> {
        self.header.timeout.as_deref()
    }

    /// Timestamp of the last definition or update.
    pub fn timestamp(&self) -> Option<&str> {
        self.header.timestamp.as_deref()
    }

    /// Message attached to the last definition or update.
    pub fn message(&self) -> Option<&str> {
        self.header.message.as_deref()
    }

    /// All header attributes as currently merged.
    pub fn header(&self) -> &VectorHeader {
        &self.header
    }

    /// Current elements in wire order.
    pub fn elements(&self) -> &Elements {
        &self.elements
    }

    /// Whether a switch element with this name is `On`.
    pub fn is_switch_on(&self, element: &str) -> bool {
        self.elements.as_switch().is_some_and(|switches| {
            switches
                .iter()
                .any(|switch| switch.name == element && switch.state.is_on())
        })
    }
}

fn merge(slot: &mut Option<String>, incoming: Option<String>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// A device and its properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    name: String,
    properties: BTreeMap<String, PropertyVector>,
}

impl Device {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Vector by name.
    pub fn property(&self, name: &str) -> Option<&PropertyVector> {
        self.properties.get(name)
    }

    /// Whether a vector with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Properties ordered by name.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyVector> {
        self.properties.values()
    }

    /// Vector names, sorted.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the device has no vectors.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Derived from the `CONNECTION` switch; never stored.
    pub fn is_connected(&self) -> bool {
        self.property(CONNECTION)
            .is_some_and(|vector| vector.is_switch_on(CONNECT))
    }

    /// `DRIVER_INFO.DRIVER_INTERFACE` as an integer.
    ///
    /// `None` when the vector or element is missing or not a non-negative
    /// integer.
    pub fn driver_interface(&self) -> Option<u32> {
        let info = self.property(DRIVER_INFO)?;
        let raw = match info.elements() {
            Elements::Text(items) => {
                let element = items.iter().find(|e| e.name == DRIVER_INTERFACE)?;
                parse_number(&element.value)?
            }
            Elements::Number(items) => items.iter().find(|e| e.name == DRIVER_INTERFACE)?.value,
            _ => return None,
        };
        if raw.is_finite() && raw >= 0.0 && raw.fract() == 0.0 && raw <= f64::from(u32::MAX) {
            Some(raw as u32)
        } else {
            None
        }
    }

    /// Text elements of `property`.
    pub fn texts(&self, property: &str) -> Option<&[TextElement]> {
        self.typed(property, VectorKind::Text, Elements::as_text)
    }

    /// Number elements of `property`.
    pub fn numbers(&self, property: &str) -> Option<&[NumberElement]> {
        self.typed(property, VectorKind::Number, Elements::as_number)
    }

    /// Switch elements of `property`.
    pub fn switches(&self, property: &str) -> Option<&[SwitchElement]> {
        self.typed(property, VectorKind::Switch, Elements::as_switch)
    }

    /// Light elements of `property`.
    pub fn lights(&self, property: &str) -> Option<&[LightElement]> {
        self.typed(property, VectorKind::Light, Elements::as_light)
    }

    /// BLOB elements of `property`.
    pub fn blobs(&self, property: &str) -> Option<&[BlobElement]> {
        self.typed(property, VectorKind::Blob, Elements::as_blob)
    }

    fn typed<'a, T>(
        &'a self,
        property: &str,
        expected: VectorKind,
        view: fn(&'a Elements) -> Option<&'a [T]>,
    ) -> Option<&'a [T]> {
        let vector = self.property(property)?;
        let elements = view(vector.elements());
        if elements.is_none() {
            warn!(
                device = %self.name,
                property,
                expected = %expected,
                actual = %vector.kind(),
                "property has a different kind"
            );
        }
        elements
    }
}

/// What [`Registry::remove_vector`] took out.
#[derive(Debug, Clone, PartialEq)]
pub enum Removed {
    Vector(PropertyVector),
    Device(Device),
}

/// In-memory store of known devices, ordered by device name.
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<String, Device>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the device if needed. Returns `true` when it was created.
    pub fn ensure_device(&mut self, name: &str) -> bool {
        if self.devices.contains_key(name) {
            return false;
        }
        self.devices.insert(name.to_string(), Device::new(name));
        true
    }

    /// Whether the device is known.
    pub fn contains(&self, device: &str) -> bool {
        self.devices.contains_key(device)
    }

    /// Device by name.
    pub fn get(&self, device: &str) -> Option<&Device> {
        self.devices.get(device)
    }

    /// One vector of one device.
    pub fn vector(&self, device: &str, name: &str) -> Option<&PropertyVector> {
        self.get(device)?.property(name)
    }

    /// All devices, ordered by name.
    pub fn all(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Known device names, sorted.
    pub fn device_names(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device is known.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Create or replace the vector named by `message`.
    ///
    /// The device is created if missing. An existing vector is updated in
    /// place; its element list always matches `message` afterwards.
    pub fn upsert_vector(&mut self, message: VectorMessage) -> &PropertyVector {
        let device = self
            .devices
            .entry(message.header.device.clone())
            .or_insert_with(|| Device::new(message.header.device.clone()));
        match device.properties.entry(message.header.name.clone()) {
            Entry::Occupied(entry) => {
                let vector = entry.into_mut();
                vector.apply(message);
                vector
            }
            Entry::Vacant(entry) => entry.insert(PropertyVector::from_message(message)),
        }
    }

    /// Remove one vector, or the whole device when `name` is `None`.
    pub fn remove_vector(&mut self, device: &str, name: Option<&str>) -> Option<Removed> {
        match name {
            Some(name) => self
                .devices
                .get_mut(device)?
                .properties
                .remove(name)
                .map(Removed::Vector),
            None => self.devices.remove(device).map(Removed::Device),
        }
    }

    /// Driver interface bits of one device, see [`Device::driver_interface`].
    pub fn driver_interface(&self, device: &str) -> Option<u32> {
        self.get(device)?.driver_interface()
    }

    /// Devices whose interface shares a bit with `mask`.
    ///
    /// [`ALL`] matches every device that has a `DRIVER_INFO` vector, even
    /// when its interface is `GENERAL` (0) or unreadable. Other masks need a
    /// readable interface.
    pub fn filter_by_interface(&self, mask: u32) -> Vec<&Device> {
        self.all()
            .filter(|device| {
                if mask == ALL {
                    return device.contains(DRIVER_INFO);
                }
                device
                    .driver_interface()
                    .is_some_and(|bits| bits & mask != 0)
            })
            .collect()
    }

    /// Remove every device, returning their names in iteration order.
    pub fn clear(&mut self) -> Vec<String> {
        let devices = std::mem::take(&mut self.devices);
        devices.into_keys().collect()
    }
}
