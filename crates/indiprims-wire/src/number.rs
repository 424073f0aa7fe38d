//! INDI number text.
//!
//! Servers send numbers as plain decimals or in sexagesimal notation
//! (`-12:30:15.5`, `5:30`, `5 30 00`); the `format` attribute only affects
//! display.

/// Parse a wire number. Returns `None` for empty or non-numeric text.
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Some(value);
    }
    parse_sexagesimal(trimmed)
}

fn parse_sexagesimal(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let negative = parts[0].starts_with('-');
    let mut total = 0.0;
    let mut divisor = 1.0;
    for (index, part) in parts.iter().enumerate() {
        let value: f64 = part.parse().ok()?;
        if index > 0 && value < 0.0 {
            return None;
        }
        total += value.abs() / divisor;
        divisor *= 60.0;
    }
    Some(if negative { -total } else { total })
}

/// Render a number the way it is sent to servers (plain decimal).
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimals() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" -1.5e3 "), Some(-1500.0));
    }

    #[test]
    fn sexagesimal() {
        assert_eq!(parse_number("12:30:00"), Some(12.5));
        assert_eq!(parse_number("-00:30"), Some(-0.5));
        assert_eq!(parse_number("5 15 00"), Some(5.25));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("1:2:3:4"), None);
        assert_eq!(parse_number("10:-5"), None);
    }

    #[test]
    fn formats_plain_decimal() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(-0.25), "-0.25");
    }
}
