//! Go-style duration strings (`90s`, `15m`, `1h30m`, `500ms`, `7d`) used throughout
//! the YAML configuration.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

use crate::errors::{Error, Result};

/// Parse a duration made of one or more `<number><unit>` segments.
///
/// Supported units are `ms`, `s`, `m`, `h` and `d`. A bare `0` is accepted.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let input = value.trim();
    if input.is_empty() {
        return Err(Error::config("Invalid duration '': expected format like 90s, 15m, 24h"));
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = Duration::ZERO;
    let mut rest = input;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(Error::config(format!(
                "Invalid duration '{}': expected a number before the unit",
                value
            )));
        }
        let quantity: u64 = rest[..digits]
            .parse()
            .map_err(|err| Error::config(format!("Invalid duration '{}': {}", value, err)))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let overflow =
            || Error::config(format!("Invalid duration '{}': value out of range", value));
        let secs = |factor: u64| {
            quantity.checked_mul(factor).map(Duration::from_secs).ok_or_else(overflow)
        };

        let segment = match unit {
            "ms" => Duration::from_millis(quantity),
            "s" => Duration::from_secs(quantity),
            "m" => secs(60)?,
            "h" => secs(3_600)?,
            "d" => secs(86_400)?,
            "" => {
                return Err(Error::config(format!(
                    "Invalid duration '{}': missing unit",
                    value
                )))
            }
            other => {
                return Err(Error::config(format!(
                    "Invalid duration unit '{}' in '{}': expected one of ms, s, m, h, d",
                    other, value
                )))
            }
        };
        total = total.checked_add(segment).ok_or_else(overflow)?;
    }

    Ok(total)
}

/// Render a duration in the same compact notation `parse_duration` accepts.
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }

    let millis = duration.subsec_millis();
    let mut secs = duration.as_secs();
    let mut out = String::new();

    let hours = secs / 3_600;
    secs %= 3_600;
    let minutes = secs / 60;
    secs %= 60;

    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    if millis > 0 {
        out.push_str(&format!("{}ms", millis));
    }
    out
}

/// Serde adapter for `Duration` fields written as duration strings.
pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_duration(*duration))
}

/// Same adapter for optional fields.
pub mod option {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(value) if !value.trim().is_empty() => {
                parse_duration(&value).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }

    pub fn serialize<S>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(value) => serializer.serialize_str(&format_duration(*value)),
            None => serializer.serialize_none(),
        }
    }
}
