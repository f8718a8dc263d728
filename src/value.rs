use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use ordered_float::OrderedFloat;

use crate::data_type::DataType;

/// Datetime layouts accepted when inferring a column from raw cells.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, interpreted at midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Represents a single cell value flowing through the pipeline.
///
/// This enum wraps all supported Rust types into a single type that can be
/// passed around the engine. It includes support for `NULL` (an empty cell).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// represents an empty or missing value.
    Null,
    /// A 64-bit signed integer value.
    Int(i64),
    /// A 64-bit floating-point value.
    Float(f64),
    /// A UTF-8 string value, wrapped in an [Arc] for efficient,
    /// thread-safe sharing and cheap cloning.
    Text(Arc<str>),
    /// A boolean value.
    Bool(bool),
    /// A timezone-less date and time.
    DateTime(NaiveDateTime),
}

impl Value {
    /// Returns `true` if the value is [Value::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the inner integer value if this is a [Value::Int].
    /// Otherwise, returns `None`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the inner float value if this is a [Value::Float].
    /// Otherwise, returns `None`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns a reference to the inner string slice if this is a [Value::Text].
    /// Otherwise, returns `None`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the inner boolean value if this is a [Value::Bool].
    /// Otherwise, returns `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the inner datetime if this is a [Value::DateTime].
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Widens an integer or float to `f64`. Every other variant yields `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the logical [DataType] corresponding to this value.
    ///
    /// Returns `None` if the value is [Value::Null], because a standalone NULL
    /// value is untyped until it is placed in a column.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Int(_) => Some(DataType::Int),
            Self::Float(_) => Some(DataType::Float),
            Self::Text(_) => Some(DataType::Text),
            Self::Bool(_) => Some(DataType::Bool),
            Self::DateTime(_) => Some(DataType::DateTime),
        }
    }

    /// Parses a raw cell as the given type. Returns `None` when the text does not
    /// fit the type. Blank cells are not handled here; callers map them to
    /// [Value::Null] first.
    pub fn parse_as(raw: &str, data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::Int => parse_int(raw).map(Self::Int),
            DataType::Float => parse_float(raw).map(Self::Float),
            DataType::Bool => parse_bool(raw).map(Self::Bool),
            DataType::DateTime => parse_datetime(raw).map(Self::DateTime),
            DataType::Text => Some(Self::Text(Arc::from(raw))),
        }
    }

    /// Converts a numeric value to the requested numeric column type.
    ///
    /// Used when a derived column merges an integer side with a float side.
    pub fn widen_to(self, data_type: DataType) -> Self {
        match (self, data_type) {
            (Self::Int(i), DataType::Float) => Self::Float(i as f64),
            (value, _) => value,
        }
    }

    /// Ordering used by the sort stage and by `min`/`max`.
    ///
    /// Nulls compare greater than everything so they end up last in ascending
    /// order. Integers and floats compare numerically with each other; values of
    /// unrelated types fall back to a fixed rank so the ordering stays total.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Greater,
            (_, Self::Null) => Ordering::Less,
            (Self::Int(l), Self::Int(r)) => l.cmp(r),
            (Self::Text(l), Self::Text(r)) => l.cmp(r),
            (Self::Bool(l), Self::Bool(r)) => l.cmp(r),
            (Self::DateTime(l), Self::DateTime(r)) => l.cmp(r),
            (l, r) => match (l.as_f64(), r.as_f64()) {
                (Some(l), Some(r)) => l.total_cmp(&r),
                _ => l.rank().cmp(&r.rank()),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Int(_) | Self::Float(_) => 0,
            Self::Bool(_) => 1,
            Self::DateTime(_) => 2,
            Self::Text(_) => 3,
            Self::Null => 4,
        }
    }

    /// Hashable identity of the value, exact per type.
    pub fn key(&self) -> KeyValue {
        match self {
            Self::Null => KeyValue::Null,
            Self::Int(i) => KeyValue::Int(*i),
            Self::Float(f) => KeyValue::Float(OrderedFloat(*f)),
            Self::Text(s) => KeyValue::Text(Arc::clone(s)),
            Self::Bool(b) => KeyValue::Bool(*b),
            Self::DateTime(dt) => KeyValue::DateTime(*dt),
        }
    }

    /// Like [Value::key] but folds integers into the float domain, so that
    /// `Int(1)` and `Float(1.0)` hash alike.
    pub fn widened_key(&self) -> KeyValue {
        match self {
            Self::Int(i) => KeyValue::Float(OrderedFloat(*i as f64)),
            other => other.key(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::DateTime(dt) if dt.nanosecond() == 0 => {
                write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
            }
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

/// Hashable projection of a [Value], used to partition rows for joins and
/// group-by. Floats hash through [OrderedFloat].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyValue {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(Arc<str>),
    Bool(bool),
    DateTime(NaiveDateTime),
}

pub(crate) fn parse_int(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Only finite floats count, so `NaN`/`inf` cells stay text.
pub(crate) fn parse_float(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
