use std::time::Duration;

use anyhow::{bail, Result};

/// Suffix to milliseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("s", 1_000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
    ("d", 86_400_000.0),
];

/// Parse duration strings like "500ms", "5s", "1.5m", "2h".
///
/// A bare number is taken as milliseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str.trim().parse()?;
            if !val.is_finite() || val < 0.0 {
                bail!("Invalid duration: {}", s);
            }
            return Ok(Duration::from_millis((val * multiplier) as u64));
        }
    }

    bail!("Unknown duration format: {}", s)
}

/// Format an uptime as the largest applicable unit chain.
///
/// Leading zero units are omitted: `5s`, `2m 5s`, `1h 0m 3s`, `3d 4h 0m 1s`.
pub fn format_uptime(d: Duration) -> String {
    let total = d.as_secs();
    let seconds = total % 60;
    let minutes = (total / 60) % 60;
    let hours = (total / 3_600) % 24;
    let days = total / 86_400;

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Format a byte count for display
pub fn format_bytes(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.1} KB", b / KIB)
    } else if b < KIB * KIB * KIB {
        format!("{:.1} MB", b / (KIB * KIB))
    } else {
        format!("{:.2} GB", b / (KIB * KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_milliseconds() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("60000").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_minutes_and_hours() {
        assert_eq!(parse_duration("1.5m").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7_200));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-5s").is_err());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_millis(125_000)), "2m 5s");
        assert_eq!(format_uptime(Duration::from_millis(999)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(3_603)), "1h 0m 3s");
        assert_eq!(
            format_uptime(Duration::from_secs(3 * 86_400 + 4 * 3_600 + 1)),
            "3d 4h 0m 1s"
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(52_428_800), "50.0 MB");
    }
}
