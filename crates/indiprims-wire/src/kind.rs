use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// INDI protocol version sent in `getProperties`.
pub const PROTOCOL_VERSION: &str = "1.7";

/// The five property vector kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum VectorKind {
    Text,
    Number,
    Switch,
    Light,
    #[serde(rename = "BLOB")]
    Blob,
}

impl VectorKind {
    /// All kinds, in wire-table order.
    pub const ALL: [VectorKind; 5] = [
        VectorKind::Text,
        VectorKind::Number,
        VectorKind::Switch,
        VectorKind::Light,
        VectorKind::Blob,
    ];

    /// Spelling used inside tag names (`defBLOBVector`, `oneText`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            VectorKind::Text => "Text",
            VectorKind::Number => "Number",
            VectorKind::Switch => "Switch",
            VectorKind::Light => "Light",
            VectorKind::Blob => "BLOB",
        }
    }

    /// Parse the kind part of a tag name.
    pub fn from_tag_part(part: &str) -> Option<Self> {
        VectorKind::ALL.into_iter().find(|kind| kind.as_str() == part)
    }
}

impl fmt::Display for VectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a switch element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            SwitchState::On => "On",
            SwitchState::Off => "Off",
        }
    }

    /// `true` for [`SwitchState::On`].
    pub fn is_on(self) -> bool {
        self == SwitchState::On
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchState {
    type Err = String;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("on") {
            Ok(SwitchState::On)
        } else if trimmed.eq_ignore_ascii_case("off") {
            Ok(SwitchState::Off)
        } else {
            Err(format!("'{trimmed}' is not a valid switch state"))
        }
    }
}

/// Server-side BLOB delivery policy requested with `enableBLOB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum BlobMode {
    /// Never send BLOBs (server default).
    #[default]
    Never,
    /// Send BLOBs interleaved with other traffic.
    Also,
    /// Send only BLOBs on this connection.
    Only,
}

impl BlobMode {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            BlobMode::Never => "Never",
            BlobMode::Also => "Also",
            BlobMode::Only => "Only",
        }
    }
}

impl fmt::Display for BlobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlobMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "Never" => Ok(BlobMode::Never),
            "Also" => Ok(BlobMode::Also),
            "Only" => Ok(BlobMode::Only),
            other => Err(format!("'{other}' is not a valid BLOB mode")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tag_parts() {
        for kind in VectorKind::ALL {
            assert_eq!(VectorKind::from_tag_part(kind.as_str()), Some(kind));
        }
        assert_eq!(VectorKind::from_tag_part("Blob"), None);
        assert_eq!(VectorKind::Blob.to_string(), "BLOB");
    }

    #[test]
    fn switch_state_parsing() {
        assert_eq!(" On ".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!("off".parse::<SwitchState>().unwrap(), SwitchState::Off);
        assert!("maybe".parse::<SwitchState>().is_err());
        assert_eq!(SwitchState::from(true), SwitchState::On);
    }

    #[test]
    fn blob_mode_parsing() {
        assert_eq!("Also".parse::<BlobMode>().unwrap(), BlobMode::Also);
        assert!("always".parse::<BlobMode>().is_err());
        assert_eq!(BlobMode::default(), BlobMode::Never);
    }
}
