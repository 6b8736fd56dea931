//! Owned column values read back from a result set.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// A single result cell, decoded from the driver by column type.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Json(JsonValue),
    Uuid(Uuid),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Short(_) => "i16",
            Self::Int(_) => "i32",
            Self::Long(_) => "i64",
            Self::Float(_) => "f32",
            Self::Double(_) => "f64",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::TimestampTz(_) => "timestamptz",
            Self::Date(_) => "date",
            Self::Json(_) => "json",
            Self::Uuid(_) => "uuid",
            Self::Bytes(_) => "bytea",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{v}'"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::TimestampTz(v) => write!(f, "{v}"),
            Self::Date(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Conversion from a result cell into a Rust value.
///
/// Integer and float conversions widen losslessly (`i16 -> i32 -> i64`,
/// `f32 -> f64`) but never narrow. `NULL` only converts into `Option<_>`.
pub trait FromSqlValue: Sized {
    /// Name of the target type, used in decode errors.
    const TYPE_NAME: &'static str;

    /// Convert the cell, or return `None` when the value has the wrong kind.
    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

macro_rules! impl_from_sql_value {
    ($ty:ty, $name:literal, { $($pat:pat => $out:expr),+ $(,)? }) => {
        impl FromSqlValue for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_sql_value(value: &SqlValue) -> Option<Self> {
                match value {
                    $($pat => Some($out),)+
                    _ => None,
                }
            }
        }
    };
}

impl_from_sql_value!(bool, "bool", { SqlValue::Bool(v) => *v });
impl_from_sql_value!(i16, "i16", { SqlValue::Short(v) => *v });
impl_from_sql_value!(i32, "i32", {
    SqlValue::Short(v) => i32::from(*v),
    SqlValue::Int(v) => *v,
});
impl_from_sql_value!(i64, "i64", {
    SqlValue::Short(v) => i64::from(*v),
    SqlValue::Int(v) => i64::from(*v),
    SqlValue::Long(v) => *v,
});
impl_from_sql_value!(f32, "f32", { SqlValue::Float(v) => *v });
impl_from_sql_value!(f64, "f64", {
    SqlValue::Float(v) => f64::from(*v),
    SqlValue::Double(v) => *v,
});
impl_from_sql_value!(String, "String", { SqlValue::Text(v) => v.clone() });
impl_from_sql_value!(NaiveDateTime, "NaiveDateTime", { SqlValue::Timestamp(v) => *v });
impl_from_sql_value!(DateTime<Utc>, "DateTime<Utc>", { SqlValue::TimestampTz(v) => *v });
impl_from_sql_value!(NaiveDate, "NaiveDate", { SqlValue::Date(v) => *v });
impl_from_sql_value!(JsonValue, "serde_json::Value", { SqlValue::Json(v) => v.clone() });
impl_from_sql_value!(Uuid, "Uuid", { SqlValue::Uuid(v) => *v });
impl_from_sql_value!(Vec<u8>, "Vec<u8>", { SqlValue::Bytes(v) => v.clone() });

impl FromSqlValue for SqlValue {
    const TYPE_NAME: &'static str = "SqlValue";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        Some(value.clone())
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => Some(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}
