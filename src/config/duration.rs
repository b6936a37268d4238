//! Duration type with human-readable parsing support.
//!
//! Operator-facing periods accept either a plain number (milliseconds) or a
//! string with a unit suffix: `"30s"`, `"5m"`, `"1h"`, `"7d"`. `"500ms"` is
//! accepted for symmetry with the bare-number form.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Duration in milliseconds with human-readable parsing support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs * 1000)
    }

    pub const fn from_mins(mins: u64) -> Self {
        Duration(mins * 60 * 1000)
    }

    pub const fn from_hours(hours: u64) -> Self {
        Duration(hours * 60 * 60 * 1000)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Converts to std::time::Duration for use with tokio and std APIs.
    pub const fn as_std(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.0)
    }
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        std::time::Duration::from_millis(d.0)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl FromStr for Duration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl de::Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a duration like '30s', '5m', '1h', '1d' or a number in milliseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Duration, E> {
                Ok(Duration(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration cannot be negative"));
                }
                Ok(Duration(v as u64))
            }

            fn visit_str<E>(self, s: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                parse_duration(s).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

/// Parse a duration string into milliseconds.
///
/// A bare number is milliseconds. A trailing unit of `ms`, `s`, `m`, `h`
/// or `d` scales accordingly. Case-insensitive, surrounding whitespace is
/// ignored.
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration(ms));
    }

    let s_lower = s.to_lowercase();

    let (num_str, multiplier) = if s_lower.ends_with("ms") {
        (&s[..s.len() - 2], 1u64)
    } else if s_lower.ends_with('s') {
        (&s[..s.len() - 1], 1000u64)
    } else if s_lower.ends_with('m') {
        (&s[..s.len() - 1], 60 * 1000u64)
    } else if s_lower.ends_with('h') {
        (&s[..s.len() - 1], 60 * 60 * 1000u64)
    } else if s_lower.ends_with('d') {
        (&s[..s.len() - 1], 24 * 60 * 60 * 1000u64)
    } else {
        return Err(format!(
            "invalid duration format: '{s}'. Expected a number of milliseconds or a string with suffix (ms, s, m, h, d)"
        ));
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number in duration: '{}'", num_str.trim()))?;

    Ok(Duration(num * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_numbers_are_milliseconds() {
        assert_eq!(parse_duration("0").unwrap(), Duration(0));
        assert_eq!(parse_duration("100").unwrap(), Duration(100));
        assert_eq!(parse_duration("5000").unwrap(), Duration(5000));
    }

    #[test]
    fn test_parse_with_suffix() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration(30_000));
        assert_eq!(parse_duration("5m").unwrap(), Duration(300_000));
        assert_eq!(parse_duration("1h").unwrap(), Duration(3_600_000));
        assert_eq!(parse_duration("1d").unwrap(), Duration(86_400_000));
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(parse_duration("5M").unwrap(), Duration(300_000));
        assert_eq!(parse_duration("30S").unwrap(), Duration(30_000));
        assert_eq!(parse_duration("500MS").unwrap(), Duration(500));
    }

    #[test]
    fn test_parse_with_whitespace() {
        assert_eq!(parse_duration("  5m  ").unwrap(), Duration(300_000));
        assert_eq!(parse_duration("5 m").unwrap(), Duration(300_000));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("1.5m").is_err());
    }

    #[test]
    fn test_constructors() {
        assert_eq!(Duration::from_millis(5), Duration(5));
        assert_eq!(Duration::from_secs(5), Duration(5000));
        assert_eq!(Duration::from_mins(5), Duration(300_000));
        assert_eq!(Duration::from_hours(1), Duration(3_600_000));
    }

    #[test]
    fn test_as_std() {
        let d = Duration::from_secs(5);
        assert_eq!(d.as_std(), std::time::Duration::from_millis(5000));
        let std_duration: std::time::Duration = d.into();
        assert_eq!(std_duration.as_millis(), 5000);
    }

    #[test]
    fn test_deserialize_from_number() {
        #[derive(Deserialize)]
        struct Probe {
            period: Duration,
        }

        let probe: Probe = toml::from_str("period = 5000").unwrap();
        assert_eq!(probe.period, Duration(5000));
    }

    #[test]
    fn test_deserialize_from_string() {
        #[derive(Deserialize)]
        struct Probe {
            period: Duration,
        }

        let probe: Probe = toml::from_str("period = \"5m\"").unwrap();
        assert_eq!(probe.period, Duration(300_000));

        let probe: Probe = toml::from_str("period = \"30s\"").unwrap();
        assert_eq!(probe.period, Duration(30_000));
    }

    #[test]
    fn test_deserialize_negative_error() {
        let result: Result<Duration, _> = serde_json::from_str("-5000");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_as_milliseconds() {
        let json = serde_json::to_string(&Duration::from_secs(5)).unwrap();
        assert_eq!(json, "5000");
    }
}
