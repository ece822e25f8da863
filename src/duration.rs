//! Human-readable durations for config values: "500ms", "30s", "5m", "1h".

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{de, Deserialize, Deserializer, Serializer};

/// Parse a duration string such as `"250ms"`, `"30s"`, `"5m"` or `"2h"`.
///
/// Whitespace is trimmed and units are case-insensitive.
///
/// ```
/// use schwab_history::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
/// ```
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .context("Duration needs a unit (ms, s, m or h)")?;
    let (num, unit) = s.split_at(split);
    let num: u64 = num
        .parse()
        .with_context(|| format!("Invalid number in duration {s:?}"))?;

    let millis = match unit.trim() {
        "ms" => Some(num),
        "s" => num.checked_mul(1_000),
        "m" => num.checked_mul(60_000),
        "h" => num.checked_mul(3_600_000),
        other => anyhow::bail!("Unknown duration unit {other:?}"),
    }
    .context("Duration is too large")?;

    Ok(Duration::from_millis(millis))
}

/// Render a duration with the largest unit that divides it evenly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis == 0 {
        return "0s".to_string();
    }
    for (unit, size) in [("h", 3_600_000u128), ("m", 60_000), ("s", 1_000)] {
        if millis % size == 0 {
            return format!("{}{unit}", millis / size);
        }
    }
    format!("{millis}ms")
}

/// Serde helper for config fields holding a duration string.
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(de::Error::custom)
}

/// Serde helper writing a duration back in the form [`parse_duration`] reads.
pub fn serialize_duration<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}
