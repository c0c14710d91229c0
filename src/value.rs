//! Typed extraction from `sea_query::Value` cells and literal rendering.
//!
//! Result cells are stored as `sea_query::Value`, the same value type used for
//! query parameters, so a materialized column can be fed straight back into
//! another query.

use sea_query::{Expr, PostgresQueryBuilder, Query, Value};

/// Error type for value extraction failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExtractionError {
    /// The value is null (None variant)
    NullValue,
    /// The value type doesn't match the expected type
    TypeMismatch {
        expected: String,
        actual: String,
    },
    /// Value conversion failed (e.g., overflow, invalid format)
    ConversionError(String),
}

impl std::fmt::Display for ValueExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueExtractionError::NullValue => write!(f, "Value is null"),
            ValueExtractionError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {}, got {}", expected, actual)
            }
            ValueExtractionError::ConversionError(msg) => {
                write!(f, "Conversion error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ValueExtractionError {}

/// Extract a Rust value from a result cell.
///
/// ```rust
/// use lifequery::value::{FromValue, ValueExtractionError};
/// use sea_query::Value;
///
/// assert_eq!(i32::from_value(&Value::Int(Some(42))), Ok(42));
/// assert_eq!(i32::from_value(&Value::Int(None)), Err(ValueExtractionError::NullValue));
/// assert_eq!(Option::<i32>::from_value(&Value::Int(None)), Ok(None));
/// ```
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError>;
}

fn mismatch(expected: &str, value: &Value) -> ValueExtractionError {
    ValueExtractionError::TypeMismatch {
        expected: expected.to_string(),
        actual: format!("{:?}", value),
    }
}

macro_rules! impl_from_value {
    ($type:ty, $variant:ident, $expected:expr) => {
        impl FromValue for $type {
            fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
                match value {
                    Value::$variant(Some(v)) => Ok(<$type>::clone(v)),
                    Value::$variant(None) => Err(ValueExtractionError::NullValue),
                    _ => Err(mismatch($expected, value)),
                }
            }
        }
    };
}

impl_from_value!(i16, SmallInt, "SmallInt");
impl_from_value!(i32, Int, "Int");
impl_from_value!(f32, Float, "Float");
impl_from_value!(bool, Bool, "Bool");
impl_from_value!(String, String, "String");
impl_from_value!(Vec<u8>, Bytes, "Bytes");
impl_from_value!(serde_json::Value, Json, "Json");
impl_from_value!(uuid::Uuid, Uuid, "Uuid");
impl_from_value!(chrono::NaiveDate, ChronoDate, "ChronoDate");
impl_from_value!(chrono::NaiveDateTime, ChronoDateTime, "ChronoDateTime");
impl_from_value!(rust_decimal::Decimal, Decimal, "Decimal");

// Counts and identity columns arrive as INT8 from PostgreSQL but as INT from
// most external providers, so integer widening is accepted here.
impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::BigInt(Some(v)) => Ok(*v),
            Value::Int(Some(v)) => Ok(i64::from(*v)),
            Value::SmallInt(Some(v)) => Ok(i64::from(*v)),
            Value::TinyInt(Some(v)) => Ok(i64::from(*v)),
            Value::Unsigned(Some(v)) => Ok(i64::from(*v)),
            Value::BigUnsigned(Some(v)) => i64::try_from(*v).map_err(|_| {
                ValueExtractionError::ConversionError(format!(
                    "BigUnsigned value {} exceeds i64::MAX",
                    v
                ))
            }),
            Value::BigInt(None)
            | Value::Int(None)
            | Value::SmallInt(None)
            | Value::TinyInt(None)
            | Value::Unsigned(None)
            | Value::BigUnsigned(None) => Err(ValueExtractionError::NullValue),
            _ => Err(mismatch("BigInt", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::Double(Some(v)) => Ok(*v),
            Value::Float(Some(v)) => Ok(f64::from(*v)),
            Value::Double(None) | Value::Float(None) => Err(ValueExtractionError::NullValue),
            _ => Err(mismatch("Double", value)),
        }
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
        match value {
            Value::BigUnsigned(Some(v)) => Ok(*v),
            Value::BigUnsigned(None) => Err(ValueExtractionError::NullValue),
            _ => {
                let signed = i64::from_value(value)?;
                u64::try_from(signed).map_err(|_| {
                    ValueExtractionError::ConversionError(format!(
                        "negative value {} cannot be converted to u64",
                        signed
                    ))
                })
            }
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
        match T::from_value(value) {
            Ok(v) => Ok(Some(v)),
            Err(ValueExtractionError::NullValue) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ValueExtractionError> {
        Ok(value.clone())
    }
}

/// Render a value as an inlined PostgreSQL literal, escaped by sea-query.
///
/// Used for the expanded (display) form of query text and for cursor
/// declarations, never for the parameterized execution form.
pub fn render_literal(value: &Value) -> String {
    let sql = Query::select()
        .expr(Expr::val(value.clone()))
        .to_string(PostgresQueryBuilder);
    match sql.strip_prefix("SELECT ") {
        Some(literal) => literal.to_string(),
        None => sql,
    }
}

/// Returns `true` when the value is any null variant.
pub(crate) fn is_null(value: &Value) -> bool {
    render_literal(value) == "NULL"
}
