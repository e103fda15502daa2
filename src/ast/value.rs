//! Owned parameter values.
//!
//! `Value` is what ends up in a compiled parameter list. It carries enough
//! type information to be encoded by `tokio-postgres` against whatever type
//! the server inferred for the placeholder, including user-defined enums and
//! domains that the stock `ToSql` impls refuse.
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use super::schema::BoxError;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Interval(Interval),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

/// PostgreSQL `INTERVAL`, stored the way the server does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl Interval {
    pub fn from_secs(secs: i64) -> Self {
        Self {
            microseconds: secs * 1_000_000,
            ..Self::default()
        }
    }

    pub fn from_days(days: i32) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn from_months(months: i32) -> Self {
        Self {
            months,
            ..Self::default()
        }
    }
}

impl Value {
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Interval => Interval,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        // Domains are sent as their base type.
        if let Kind::Domain(base) = ty.kind() {
            return self.to_sql(base, out);
        }

        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::Int16(v) => encode_int(i64::from(*v), ty, out),
            Value::Int32(v) => encode_int(i64::from(*v), ty, out),
            Value::Int64(v) => encode_int(*v, ty, out),
            Value::Float32(v) => match *ty {
                Type::FLOAT8 => f64::from(*v).to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Float64(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Text(v) => {
                if let Kind::Enum(_) = ty.kind() {
                    // Enum labels travel as their text representation.
                    out.extend_from_slice(v.as_bytes());
                    Ok(IsNull::No)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Uuid(v) => v.to_sql_checked(ty, out),
            Value::Date(v) => match *ty {
                Type::TIMESTAMP => v
                    .and_hms_opt(0, 0, 0)
                    .ok_or("date has no midnight")?
                    .to_sql_checked(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Time(v) => v.to_sql_checked(ty, out),
            Value::Timestamp(v) => v.to_sql_checked(ty, out),
            Value::TimestampTz(v) => v.to_sql_checked(ty, out),
            Value::Interval(v) => {
                if *ty != Type::INTERVAL {
                    return Err(format!("cannot encode an interval as {}", ty.name()).into());
                }
                out.put_i64(v.microseconds);
                out.put_i32(v.days);
                out.put_i32(v.months);
                Ok(IsNull::No)
            }
            Value::Json(v) => v.to_sql_checked(ty, out),
            Value::Array(items) => items.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Encode an integer at the width the server asked for.
fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql_checked(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql_checked(ty, out),
        Type::FLOAT4 => (v as f32).to_sql_checked(ty, out),
        Type::FLOAT8 => (v as f64).to_sql_checked(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value, ty: &Type) -> Result<(IsNull, Vec<u8>), BoxError> {
        let mut buf = BytesMut::new();
        let is_null = value.to_sql_checked(ty, &mut buf)?;
        Ok((is_null, buf.to_vec()))
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert_eq!(Value::from(7i32), Value::Int32(7));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(
            Value::from(vec!["foo", "bar"]),
            Value::Array(vec![Value::Text("foo".into()), Value::Text("bar".into())])
        );
    }

    #[test]
    fn test_null_encodes_as_null() {
        let (is_null, bytes) = encode(&Value::Null, &Type::TEXT).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_integer_narrowed_to_target_width() {
        let (_, bytes) = encode(&Value::Int64(4444), &Type::INT4).unwrap();
        assert_eq!(bytes, 4444i32.to_be_bytes().to_vec());

        let (_, bytes) = encode(&Value::Int32(3), &Type::INT8).unwrap();
        assert_eq!(bytes, 3i64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_integer_overflow_is_an_error() {
        assert!(encode(&Value::Int64(i64::MAX), &Type::INT2).is_err());
    }

    #[test]
    fn test_interval_binary_layout() {
        let interval = Interval {
            months: 1,
            days: 2,
            microseconds: 60_000_000,
        };
        let (_, bytes) = encode(&Value::Interval(interval), &Type::INTERVAL).unwrap();
        let mut expected = Vec::new();
        expected.extend_from_slice(&60_000_000i64.to_be_bytes());
        expected.extend_from_slice(&2i32.to_be_bytes());
        expected.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_interval_rejects_other_types() {
        assert!(encode(&Value::Interval(Interval::from_secs(1)), &Type::TEXT).is_err());
    }

    #[test]
    fn test_text_against_enum_type_is_raw_label() {
        let ty = Type::new(
            "guinea_pig_status".into(),
            90_001,
            Kind::Enum(vec!["NEW".into(), "OLD".into()]),
            "public".into(),
        );
        let (_, bytes) = encode(&Value::Text("NEW".into()), &ty).unwrap();
        assert_eq!(bytes, b"NEW".to_vec());
    }

    #[test]
    fn test_date_widened_to_timestamp() {
        let date = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        let (_, from_date) = encode(&Value::Date(date), &Type::TIMESTAMP).unwrap();
        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        let (_, from_timestamp) = encode(&Value::Timestamp(midnight), &Type::TIMESTAMP).unwrap();
        assert_eq!(from_date, from_timestamp);
    }

    #[test]
    fn test_text_against_integer_is_wrong_type() {
        assert!(encode(&Value::Text("1".into()), &Type::INT4).is_err());
    }

    #[test]
    fn test_text_array() {
        let value = Value::from(vec!["foo", "bar"]);
        let (is_null, bytes) = encode(&value, &Type::VARCHAR_ARRAY).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_array_against_scalar_is_wrong_type() {
        assert!(encode(&Value::from(vec![1i32]), &Type::INT4).is_err());
    }
}
