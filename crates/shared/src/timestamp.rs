//! Lenient timestamp parsing.
//!
//! Browsers submit `<input type="date">` and `datetime-local` values without
//! an offset, the hosted backend returns Postgres `timestamptz` text, and
//! SQLite stores whatever sqlx encodes. Everything is normalised to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("unrecognised timestamp: {0:?}")]
pub struct TimestampError(pub String);

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%#z"];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    Err(TimestampError(input.to_string()))
}

/// Serde adapter for a required timestamp.
pub mod required {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse_timestamp(&raw).map_err(D::Error::custom)
    }
}

/// Serde adapter for a nullable timestamp. A blank string reads as `None`.
pub mod option {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => s.serialize_str(&dt.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => parse_timestamp(&raw).map(Some).map_err(D::Error::custom),
            _ => Ok(None),
        }
    }
}

/// Serde adapter for a timestamp inside a partial update.
///
/// Absent field → `None` (keep), `null` or `""` → `Some(None)` (clear),
/// anything else → `Some(Some(ts))`. Pair with `#[serde(default)]`.
pub mod patch {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<DateTime<Utc>>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(Some(dt)) => s.serialize_str(&dt.to_rfc3339()),
            _ => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) if !raw.trim().is_empty() => parse_timestamp(&raw)
                .map(|dt| Some(Some(dt)))
                .map_err(D::Error::custom),
            _ => Ok(Some(None)),
        }
    }
}
