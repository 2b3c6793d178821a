//! Host-side column values and SQL-side bound arguments.
//!
//! [`FieldValue`] is what an entity holds for one column. [`Value`] is what gets bound to a
//! statement marker. Column codecs translate between the two; the driver glue translates
//! [`Value`] to and from the Postgres wire format.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};

use crate::error::{SqlError, SqlResult};

/// The zero instant. Bare time columns holding it are stored as NULL.
pub const ZERO_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// A positional argument bound to a statement marker, or a decoded column cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is the zero value of its kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(v) => !*v,
            Value::Int(v) => *v == 0,
            Value::Float(v) => *v == 0.0,
            Value::Text(v) => v.is_empty(),
            Value::Time(v) => *v == ZERO_TIME,
            Value::Json(v) => v.is_null(),
            Value::Bytes(v) => v.is_empty(),
            Value::Array(v) => v.is_empty(),
        }
    }

    /// Short kind name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
        }
    }
}

macro_rules! value_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::TEXT | Type::VARCHAR | Type::BPCHAR => v.to_string().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(v) => match *ty {
                Type::JSON | Type::JSONB => {
                    serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out)
                }
                _ => v.as_str().to_sql(ty, out),
            },
            Value::Time(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                Type::DATE => v.date_naive().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Json(v) => match *ty {
                Type::TEXT | Type::VARCHAR => v.to_string().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Bytes(v) => v.as_slice().to_sql(ty, out),
            Value::Array(v) => v.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        let value = match *ty {
            Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Value::Int(i64::from(i16::from_sql(ty, raw)?)),
            Type::INT4 => Value::Int(i64::from(i32::from_sql(ty, raw)?)),
            Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
            Type::OID => Value::Int(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => Value::Float(f64::from(f32::from_sql(ty, raw)?)),
            Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => Value::Time(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::TIMESTAMP => Value::Time(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            Type::DATE => Value::Time(NaiveDate::from_sql(ty, raw)?.and_time(NaiveTime::MIN).and_utc()),
            Type::JSON | Type::JSONB => Value::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::BYTEA => Value::Bytes(raw.to_vec()),
            _ => match ty.kind() {
                Kind::Array(_) => Value::Array(Vec::<Value>::from_sql(ty, raw)?),
                _ => Value::Text(std::str::from_utf8(raw)?.to_string()),
            },
        };
        Ok(value)
    }

    fn from_sql_null(_: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Value::Null)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// The value an entity holds for one column.
///
/// Struct, map and dynamic columns carry their JSON tree; pointers carry `Nil` or the pointee;
/// containers carry `List`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, FieldValue::Nil)
    }

    /// Whether this is the zero value of its kind.
    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Nil => true,
            FieldValue::Bool(v) => !*v,
            FieldValue::Int(v) => *v == 0,
            FieldValue::Uint(v) => *v == 0,
            FieldValue::Float(v) => *v == 0.0,
            FieldValue::Str(v) => v.is_empty(),
            FieldValue::Time(v) => *v == ZERO_TIME,
            FieldValue::Json(v) => v.is_null(),
            FieldValue::List(v) => v.is_empty(),
        }
    }

    /// Serialize a struct, map or dynamic value into a JSON field.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> SqlResult<Self> {
        serde_json::to_value(value)
            .map(FieldValue::Json)
            .map_err(|e| SqlError::encode("json", e.to_string()))
    }

    /// Deserialize a JSON field, falling back to the default value when it holds nothing.
    pub fn decode_json<T: DeserializeOwned + Default>(self, column: &str) -> SqlResult<T> {
        match self {
            FieldValue::Nil | FieldValue::Json(serde_json::Value::Null) => Ok(T::default()),
            FieldValue::Json(v) => {
                serde_json::from_value(v).map_err(|e| SqlError::decode(column, e.to_string()))
            }
            other => Err(SqlError::decode(
                column,
                format!("expected json, got {other:?}"),
            )),
        }
    }
}

macro_rules! field_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Int(v as i64)
            }
        })*
    };
}

macro_rules! field_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Uint(v as u64)
            }
        })*
    };
}

field_from_signed!(i8, i16, i32, i64, isize);
field_from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(f64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Time(v)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(v: serde_json::Value) -> Self {
        FieldValue::Json(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Nil, Into::into)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(v: Vec<T>) -> Self {
        FieldValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Typed extraction of a decoded [`FieldValue`].
pub trait FromField: Sized {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self>;
}

fn mismatch(column: &str, expected: &str, got: &FieldValue) -> SqlError {
    SqlError::decode(column, format!("expected {expected}, got {got:?}"))
}

macro_rules! from_field_int {
    ($($t:ty),*) => {
        $(impl FromField for $t {
            fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
                match value {
                    FieldValue::Int(v) => <$t>::try_from(v)
                        .map_err(|e| SqlError::decode(column, e.to_string())),
                    FieldValue::Uint(v) => <$t>::try_from(v)
                        .map_err(|e| SqlError::decode(column, e.to_string())),
                    FieldValue::Nil => Ok(0),
                    other => Err(mismatch(column, "integer", &other)),
                }
            }
        })*
    };
}

from_field_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromField for bool {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Bool(v) => Ok(v),
            FieldValue::Nil => Ok(false),
            other => Err(mismatch(column, "bool", &other)),
        }
    }
}

impl FromField for f64 {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Float(v) => Ok(v),
            FieldValue::Int(v) => Ok(v as f64),
            FieldValue::Nil => Ok(0.0),
            other => Err(mismatch(column, "float", &other)),
        }
    }
}

impl FromField for f32 {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        f64::from_field(column, value).map(|v| v as f32)
    }
}

impl FromField for String {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Str(v) => Ok(v),
            FieldValue::Nil => Ok(String::new()),
            other => Err(mismatch(column, "string", &other)),
        }
    }
}

impl FromField for DateTime<Utc> {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Time(v) => Ok(v),
            FieldValue::Nil => Ok(ZERO_TIME),
            other => Err(mismatch(column, "time", &other)),
        }
    }
}

impl FromField for serde_json::Value {
    fn from_field(_: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Json(v) => Ok(v),
            FieldValue::Nil => Ok(serde_json::Value::Null),
            other => Ok(field_to_json(other)),
        }
    }
}

impl<T: FromField> FromField for Option<T> {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::Nil => Ok(None),
            other => T::from_field(column, other).map(Some),
        }
    }
}

impl<T: FromField> FromField for Vec<T> {
    fn from_field(column: &str, value: FieldValue) -> SqlResult<Self> {
        match value {
            FieldValue::List(items) => items
                .into_iter()
                .map(|item| T::from_field(column, item))
                .collect(),
            FieldValue::Nil => Ok(Vec::new()),
            other => Err(mismatch(column, "list", &other)),
        }
    }
}

pub(crate) fn field_to_json(value: FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Nil => serde_json::Value::Null,
        FieldValue::Bool(v) => v.into(),
        FieldValue::Int(v) => v.into(),
        FieldValue::Uint(v) => v.into(),
        FieldValue::Float(v) => v.into(),
        FieldValue::Str(v) => v.into(),
        FieldValue::Time(v) => v.to_rfc3339().into(),
        FieldValue::Json(v) => v,
        FieldValue::List(v) => v.into_iter().map(field_to_json).collect(),
    }
}
