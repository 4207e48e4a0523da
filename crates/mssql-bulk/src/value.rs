//! SQL value types for tabular buffers and catalog rows.
//!
//! [`SqlValue`] is the unit a [`TabularBuffer`](crate::buffer::TabularBuffer)
//! stores per cell. NULL is always an explicit [`SqlValue::Null`] carrying the
//! column type, never the zero value of that type.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type hint for NULL values and column types.
///
/// The bulk copier needs the column type to encode a NULL on the wire, so
/// nulls keep it around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlNullType {
    Bool,
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint for correct wire format encoding.
    Null(SqlNullType),

    /// Boolean value (bit).
    Bool(bool),

    /// Unsigned byte (tinyint).
    U8(u8),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real).
    F32(f32),

    /// 64-bit floating point (float).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID/GUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value.
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::U8(_) => SqlNullType::U8,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Text form of the value, as a catalog reader sees it.
    ///
    /// Returns `None` for NULL. Binary data renders as lowercase hex.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null(_) => return None,
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::U8(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => hex::encode(v),
            SqlValue::Uuid(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::DateTime(v) => v.to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339(),
            SqlValue::Date(v) => v.to_string(),
            SqlValue::Time(v) => v.to_string(),
        };
        Some(text)
    }
}

/// A Rust type that projects into a single buffer column.
///
/// Implemented for the basic scalar types and for `Option<T>`, which unwraps
/// to `T`'s column type and maps `None` to a typed NULL.
pub trait ToSqlValue {
    /// Column type of this Rust type.
    fn sql_type() -> SqlNullType
    where
        Self: Sized;

    /// Whether values of this type may be NULL.
    fn nullable() -> bool
    where
        Self: Sized,
    {
        false
    }

    /// Owned cell value.
    fn to_sql_value(&self) -> SqlValue;
}

macro_rules! impl_to_sql_value {
    ($ty:ty, $null:ident, |$v:ident| $conv:expr) => {
        impl ToSqlValue for $ty {
            fn sql_type() -> SqlNullType {
                SqlNullType::$null
            }

            fn to_sql_value(&self) -> SqlValue {
                let $v = self;
                $conv
            }
        }
    };
}

impl_to_sql_value!(bool, Bool, |v| SqlValue::Bool(*v));
impl_to_sql_value!(u8, U8, |v| SqlValue::U8(*v));
impl_to_sql_value!(i8, I16, |v| SqlValue::I16(i16::from(*v)));
impl_to_sql_value!(i16, I16, |v| SqlValue::I16(*v));
impl_to_sql_value!(u16, I32, |v| SqlValue::I32(i32::from(*v)));
impl_to_sql_value!(i32, I32, |v| SqlValue::I32(*v));
impl_to_sql_value!(u32, I64, |v| SqlValue::I64(i64::from(*v)));
impl_to_sql_value!(i64, I64, |v| SqlValue::I64(*v));
impl_to_sql_value!(u64, Decimal, |v| SqlValue::Decimal(Decimal::from(*v)));
impl_to_sql_value!(f32, F32, |v| SqlValue::F32(*v));
impl_to_sql_value!(f64, F64, |v| SqlValue::F64(*v));
impl_to_sql_value!(Decimal, Decimal, |v| SqlValue::Decimal(*v));
impl_to_sql_value!(String, String, |v| SqlValue::Text(v.clone()));
impl_to_sql_value!(&str, String, |v| SqlValue::Text(v.to_string()));
impl_to_sql_value!(Vec<u8>, Bytes, |v| SqlValue::Bytes(v.clone()));
impl_to_sql_value!(Uuid, Uuid, |v| SqlValue::Uuid(*v));
impl_to_sql_value!(NaiveDateTime, DateTime, |v| SqlValue::DateTime(*v));
impl_to_sql_value!(DateTime<FixedOffset>, DateTimeOffset, |v| {
    SqlValue::DateTimeOffset(*v)
});
impl_to_sql_value!(DateTime<Utc>, DateTimeOffset, |v| {
    SqlValue::DateTimeOffset(v.fixed_offset())
});
impl_to_sql_value!(NaiveDate, Date, |v| SqlValue::Date(*v));
impl_to_sql_value!(NaiveTime, Time, |v| SqlValue::Time(*v));

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn sql_type() -> SqlNullType {
        T::sql_type()
    }

    fn nullable() -> bool {
        true
    }

    fn to_sql_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_sql_value(),
            None => SqlValue::Null(T::sql_type()),
        }
    }
}
