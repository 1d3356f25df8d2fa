//! Scan storage types, value coercion and identity keys

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::adapter::SqlValue;
use super::error::ConversionError;

/// Storage type a scan cell coerces raw column values into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Integer,
    Real,
    Text,
    Bool,
    Blob,
    Timestamp,
    Uuid,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageType::Integer => write!(f, "integer"),
            StorageType::Real => write!(f, "real"),
            StorageType::Text => write!(f, "text"),
            StorageType::Bool => write!(f, "bool"),
            StorageType::Blob => write!(f, "blob"),
            StorageType::Timestamp => write!(f, "timestamp"),
            StorageType::Uuid => write!(f, "uuid"),
        }
    }
}

impl StorageType {
    /// Coerce a raw driver value into this storage type.
    ///
    /// NULL always passes through untouched so outer-join misses never fail
    /// a scan, whatever the destination field looks like.
    pub fn coerce(self, value: SqlValue) -> Result<SqlValue, ConversionError> {
        use SqlValue as V;

        let coerced = match (self, value) {
            (_, V::Null) => V::Null,

            (StorageType::Integer, V::Integer(i)) => V::Integer(i),
            (StorageType::Integer, V::Bool(b)) => V::Integer(i64::from(b)),
            (StorageType::Integer, V::Real(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                V::Integer(f as i64)
            }
            (StorageType::Integer, V::Text(s)) => V::Integer(
                s.trim()
                    .parse()
                    .map_err(|_| unparseable(StorageType::Integer, s))?,
            ),

            (StorageType::Real, V::Real(f)) => V::Real(f),
            (StorageType::Real, V::Integer(i)) => V::Real(i as f64),
            (StorageType::Real, V::Text(s)) => V::Real(
                s.trim()
                    .parse()
                    .map_err(|_| unparseable(StorageType::Real, s))?,
            ),

            (StorageType::Text, V::Text(s)) => V::Text(s),
            (StorageType::Text, V::Integer(i)) => V::Text(i.to_string()),
            (StorageType::Text, V::Real(f)) => V::Text(f.to_string()),
            (StorageType::Text, V::Uuid(u)) => V::Text(u.to_string()),
            (StorageType::Text, V::Timestamp(t)) => V::Text(t.to_rfc3339()),
            (StorageType::Text, V::Blob(b)) => V::Text(String::from_utf8(b).map_err(|e| {
                unparseable(
                    StorageType::Text,
                    String::from_utf8_lossy(e.as_bytes()).into_owned(),
                )
            })?),

            (StorageType::Bool, V::Bool(b)) => V::Bool(b),
            (StorageType::Bool, V::Integer(0)) => V::Bool(false),
            (StorageType::Bool, V::Integer(1)) => V::Bool(true),
            (StorageType::Bool, V::Text(s)) => V::Bool(
                parse_bool(&s).ok_or_else(|| unparseable(StorageType::Bool, s))?,
            ),

            (StorageType::Blob, V::Blob(b)) => V::Blob(b),
            (StorageType::Blob, V::Text(s)) => V::Blob(s.into_bytes()),

            (StorageType::Timestamp, V::Timestamp(t)) => V::Timestamp(t),
            (StorageType::Timestamp, V::Text(s)) => V::Timestamp(
                parse_timestamp(&s).ok_or_else(|| unparseable(StorageType::Timestamp, s))?,
            ),
            (StorageType::Timestamp, V::Integer(secs)) => V::Timestamp(
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| ConversionError::OutOfRange {
                        value: secs.to_string(),
                        target: "timestamp",
                    })?,
            ),

            (StorageType::Uuid, V::Uuid(u)) => V::Uuid(u),
            (StorageType::Uuid, V::Text(s)) => V::Uuid(
                Uuid::parse_str(s.trim()).map_err(|_| unparseable(StorageType::Uuid, s))?,
            ),
            (StorageType::Uuid, V::Blob(b)) => V::Uuid(
                Uuid::from_slice(&b)
                    .map_err(|_| unparseable(StorageType::Uuid, format!("{} bytes", b.len())))?,
            ),

            (expected, other) => {
                return Err(ConversionError::Incompatible {
                    expected,
                    found: other.kind(),
                })
            }
        };

        Ok(coerced)
    }
}

fn unparseable(expected: StorageType, value: String) -> ConversionError {
    ConversionError::Unparseable { expected, value }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// Accepts RFC 3339 and the `YYYY-MM-DD[ HH:MM:SS[.fff]]` forms SQLite and
/// MySQL hand back as text.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Ordered tuple of key values with structural equality and hashing.
///
/// Used both as the primary-key identity of a materialized entity and as the
/// join key when wiring relationships.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<SqlValue>);

impl CompositeKey {
    /// Build a key; `None` when any component is NULL, since NULL never
    /// identifies or joins anything.
    pub fn from_values(values: Vec<SqlValue>) -> Option<Self> {
        if values.iter().any(SqlValue::is_null) {
            return None;
        }
        Some(Self(values))
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:?}", value)?;
        }
        write!(f, ")")
    }
}
