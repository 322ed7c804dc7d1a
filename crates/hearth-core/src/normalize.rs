//! Type-aware normalization of field values
//!
//! Payloads arrive as loosely typed JSON: amounts as numbers or strings,
//! dates with or without a time component, booleans as `true`, `"1"` or
//! `"TRUE"`. Before an update touches storage, old and new values are
//! normalized per field type and compared so that a request that changes
//! nothing can be answered as a no-op.

use chrono::NaiveDate;
use serde_json::Value;

/// Tolerance for comparing normalized numbers
const NUMBER_EPSILON: f64 = 1e-9;

/// How a field's value should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Date,
    Boolean,
}

/// A value reduced to its canonical form
#[derive(Debug, Clone)]
pub enum NormalizedValue {
    /// null, missing, or empty
    Absent,
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl PartialEq for NormalizedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Absent, Self::Absent) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => (a - b).abs() < NUMBER_EPSILON,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl NormalizedValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Parse a calendar date, discarding any time-of-day suffix
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    // "2024-01-05T10:00:00Z", "2024-01-05 10:00:00"
    if s.len() > 10 && s.is_char_boundary(10) {
        let (head, tail) = s.split_at(10);
        if tail.starts_with('T') || tail.starts_with(' ') {
            return NaiveDate::parse_from_str(head, "%Y-%m-%d").ok();
        }
    }
    None
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Reduce a value to its canonical form for `field_type`
///
/// Unparsable numbers and dates normalize to `Absent`.
pub fn normalize(value: &Value, field_type: FieldType) -> NormalizedValue {
    if is_blank(value) {
        return NormalizedValue::Absent;
    }

    match field_type {
        FieldType::String => match value {
            Value::String(s) => NormalizedValue::Text(s.trim().to_string()),
            Value::Number(n) => NormalizedValue::Text(n.to_string()),
            Value::Bool(b) => NormalizedValue::Text(b.to_string()),
            other => NormalizedValue::Text(other.to_string()),
        },
        FieldType::Number => match value {
            Value::Number(n) => n
                .as_f64()
                .map(NormalizedValue::Number)
                .unwrap_or(NormalizedValue::Absent),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => NormalizedValue::Number(n),
                _ => NormalizedValue::Absent,
            },
            _ => NormalizedValue::Absent,
        },
        FieldType::Date => match value {
            Value::String(s) => parse_date(s)
                .map(NormalizedValue::Date)
                .unwrap_or(NormalizedValue::Absent),
            _ => NormalizedValue::Absent,
        },
        FieldType::Boolean => NormalizedValue::Bool(truthy(value)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Whether two values are the same once normalized
pub fn values_equal(old: &Value, new: &Value, field_type: FieldType) -> bool {
    normalize(old, field_type) == normalize(new, field_type)
}

/// Strictly validate and normalize a value
///
/// Unlike [`normalize`], a present value that cannot be interpreted as
/// `field_type` is reported as an error message instead of becoming
/// `Absent`.
pub fn coerce(value: &Value, field_type: FieldType) -> Result<NormalizedValue, String> {
    if is_blank(value) {
        return Ok(NormalizedValue::Absent);
    }

    let normalized = normalize(value, field_type);
    match field_type {
        FieldType::String => match value {
            Value::Array(_) | Value::Object(_) => Err("must be a string".to_string()),
            _ => Ok(normalized),
        },
        FieldType::Number if normalized.is_absent() => Err("must be a number".to_string()),
        FieldType::Date if normalized.is_absent() => {
            Err("must be a valid date (YYYY-MM-DD)".to_string())
        }
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(normalized),
            Value::Number(n) if matches!(n.as_f64(), Some(f) if f == 0.0 || f == 1.0) => {
                Ok(normalized)
            }
            Value::String(s)
                if ["true", "false", "1", "0"]
                    .iter()
                    .any(|v| s.trim().eq_ignore_ascii_case(v)) =>
            {
                Ok(normalized)
            }
            _ => Err("must be a boolean".to_string()),
        },
        _ => Ok(normalized),
    }
}
