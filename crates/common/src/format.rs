//! Human-readable formatting for sizes and durations.

use std::time::Duration;

const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// Index into `UNITS` and the scaled value for a byte count.
fn scale(bytes: u64) -> (usize, f64) {
    let mut value: f64 = bytes as f64;
    let mut unit: usize = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    (unit, value)
}

/// Format the numeric part of a byte count, scaled to its unit.
///
/// Whole bytes are printed without decimals; larger units use two.
pub fn format_bytes(bytes: u64) -> String {
    let (unit, value) = scale(bytes);
    if unit == 0 {
        format!("{}", bytes)
    } else {
        format!("{:.2}", value)
    }
}

/// Unit label matching [`format_bytes`].
pub fn format_bytes_units(bytes: u64) -> &'static str {
    UNITS[scale(bytes).0]
}

/// Number and unit together, e.g. `"1.50 MB"`.
pub fn format_size(bytes: u64) -> String {
    format!("{} {}", format_bytes(bytes), format_bytes_units(bytes))
}

/// Format an elapsed duration as `"1h 2m 3s"`, dropping leading zero fields.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total: u64 = elapsed.as_secs();
    let hours: u64 = total / 3600;
    let minutes: u64 = (total % 3600) / 60;
    let seconds: u64 = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}.{:03}s", seconds, elapsed.subsec_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_small() {
        assert_eq!(format_bytes(0), "0");
        assert_eq!(format_bytes(1023), "1023");
        assert_eq!(format_bytes_units(1023), "B");
    }

    #[test]
    fn test_format_bytes_scaled() {
        assert_eq!(format_bytes(1536), "1.50");
        assert_eq!(format_bytes_units(1536), "KB");
        assert_eq!(format_size(45 * 1024 * 1024), "45.00 MB");
    }

    #[test]
    fn test_format_bytes_caps_at_largest_unit() {
        assert_eq!(format_bytes_units(u64::MAX), "PB");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.500s");
        assert_eq!(format_elapsed(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
