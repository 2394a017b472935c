//! Hashrate parsing and formatting helpers.

/// Convert a value string with an optional unit suffix into raw H/s.
/// Supports H/s, kH/s, MH/s, GH/s, case insensitive.
pub fn parse_hashrate(value: &str, unit: Option<&str>) -> f64 {
    let Ok(value) = value.trim().parse::<f64>() else {
        return 0.0;
    };
    let Some(unit) = unit else {
        return value;
    };
    let unit = unit.to_ascii_lowercase();
    if unit.contains("gh") {
        value * 1_000_000_000.0
    } else if unit.contains("mh") {
        value * 1_000_000.0
    } else if unit.contains("kh") {
        value * 1_000.0
    } else {
        value
    }
}

/// Format raw H/s into a readable string.
pub fn format_hashrate(hr: f64) -> String {
    if hr >= 1_000_000_000.0 {
        format!("{:.2} GH/s", hr / 1_000_000_000.0)
    } else if hr >= 1_000_000.0 {
        format!("{:.2} MH/s", hr / 1_000_000.0)
    } else if hr >= 1_000.0 {
        format!("{:.2} kH/s", hr / 1_000.0)
    } else {
        format!("{} H/s", hr.max(0.0) as u64)
    }
}
