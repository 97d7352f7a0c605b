use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

///
/// Value
///
/// Scalar attribute value. Filters assert against these; records carry
/// them. Multi-valuedness is modeled at the attribute level, not here.
///
/// `Null` → the attribute is present with no value (SQL NULL).
///

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    /// Render to the native JSON form used by document records.
    /// Timestamps become ISO-8601 instant strings.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(i) => JsonValue::from(*i),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Timestamp(ts) => JsonValue::String(encode_time(*ts)),
            Self::Null => JsonValue::Null,
        }
    }

    /// Convert from a native JSON field. Strings that parse as ISO-8601
    /// instants are promoted to timestamps, matching how document records
    /// round-trip dates.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => n.as_i64().map_or_else(
                || Self::Text(n.to_string()),
                Self::Int,
            ),
            JsonValue::String(s) => {
                decode_time(s).map_or_else(|| Self::Text(s.clone()), Self::Timestamp)
            }
            JsonValue::Null => Self::Null,
            other => Self::Text(other.to_string()),
        }
    }

    /// True for types passed to the backend as typed literals rather than
    /// escaped strings.
    #[must_use]
    pub const fn is_typed_literal(&self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_))
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

/// Encode an instant the way document records store it: ISO-8601 with
/// millisecond precision, zone designator dropped.
#[must_use]
pub fn encode_time(ts: DateTime<Utc>) -> String {
    let encoded = ts.to_rfc3339_opts(SecondsFormat::Millis, true);
    encoded.trim_end_matches('Z').to_string()
}

/// Decode an instant, tolerating a missing trailing zone designator.
#[must_use]
pub fn decode_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }

    let candidate = if raw.ends_with('Z') {
        raw.to_string()
    } else {
        format!("{raw}Z")
    };

    DateTime::parse_from_rfc3339(&candidate)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

///
/// TESTS
///
