//! `DRIVER_INFO.DRIVER_INTERFACE` bits.
//!
//! Drivers advertise what kind of device they control as a bitmask in the
//! standard `DRIVER_INFO` text vector.

/// Property carrying driver metadata.
pub const DRIVER_INFO: &str = "DRIVER_INFO";
/// Element of [`DRIVER_INFO`] holding the interface bitmask.
pub const DRIVER_INTERFACE: &str = "DRIVER_INTERFACE";

pub const GENERAL: u32 = 0;
pub const TELESCOPE: u32 = 1 << 0;
pub const CCD: u32 = 1 << 1;
pub const GUIDER: u32 = 1 << 2;
pub const FOCUSER: u32 = 1 << 3;
pub const FILTER: u32 = 1 << 4;
pub const DOME: u32 = 1 << 5;
pub const GPS: u32 = 1 << 6;
pub const WEATHER: u32 = 1 << 7;
pub const AO: u32 = 1 << 8;
pub const DUSTCAP: u32 = 1 << 9;
pub const LIGHTBOX: u32 = 1 << 10;
pub const DETECTOR: u32 = 1 << 11;
pub const AUX: u32 = 1 << 15;

/// Mask matching every device that reports an interface.
pub const ALL: u32 = 0xFFFF;

const NAMED: [(&str, u32); 13] = [
    ("telescope", TELESCOPE),
    ("ccd", CCD),
    ("guider", GUIDER),
    ("focuser", FOCUSER),
    ("filter", FILTER),
    ("dome", DOME),
    ("gps", GPS),
    ("weather", WEATHER),
    ("ao", AO),
    ("dustcap", DUSTCAP),
    ("lightbox", LIGHTBOX),
    ("detector", DETECTOR),
    ("aux", AUX),
];

/// Lower-case names of the bits set in `mask`.
pub fn names(mask: u32) -> Vec<&'static str> {
    if mask == GENERAL {
        return vec!["general"];
    }
    NAMED
        .iter()
        .filter(|(_, bit)| mask & bit != 0)
        .map(|(name, _)| *name)
        .collect()
}

/// Parse one interface name (case-insensitive), `all`, or a numeric mask
/// (decimal or `0x` hex).
pub fn parse_mask(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u32::from_str_radix(hex, 16).ok();
    }
    if let Ok(value) = trimmed.parse::<u32>() {
        return Some(value);
    }
    let lower = trimmed.to_ascii_lowercase();
    match lower.as_str() {
        "all" => Some(ALL),
        "general" => Some(GENERAL),
        name => NAMED
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, bit)| *bit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_of_combined_mask() {
        assert_eq!(names(TELESCOPE | GPS), vec!["telescope", "gps"]);
        assert_eq!(names(GENERAL), vec!["general"]);
        assert_eq!(names(CCD | GUIDER | AUX), vec!["ccd", "guider", "aux"]);
    }

    #[test]
    fn parse_masks() {
        assert_eq!(parse_mask("Telescope"), Some(TELESCOPE));
        assert_eq!(parse_mask("0x22"), Some(CCD | DOME));
        assert_eq!(parse_mask("6"), Some(CCD | GUIDER));
        assert_eq!(parse_mask("all"), Some(ALL));
        assert_eq!(parse_mask("toaster"), None);
    }
}
