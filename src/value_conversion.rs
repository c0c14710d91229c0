//! Value conversion from `sea_query::Value` to `may_postgres` parameters.
//!
//! The conversion follows a two-pass pattern:
//! 1. First pass: convert every value into an owned, typed parameter
//! 2. Second pass: borrow the owned parameters as `&dyn ToSql`
//!
//! The borrowed slice is only valid inside the closure, which is where the
//! statement runs.

use crate::error::QueryError;
use may_postgres::types::ToSql;
use sea_query::Value;

type OwnedParam = Box<dyn ToSql + Sync>;

/// Convert query values to `ToSql` parameters and run `f` with them.
///
/// Nulls keep the SQL type of their variant so the server can infer the
/// parameter type (`Value::String(None)` binds as a text NULL, not an int).
///
/// # Errors
///
/// Returns `QueryError::Execution` if a value has no PostgreSQL mapping or
/// an unsigned value does not fit in `BIGINT`.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, QueryError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, QueryError>,
{
    // First pass: owned parameters
    let mut owned: Vec<OwnedParam> = Vec::with_capacity(values.len());
    for value in values {
        owned.push(to_owned_param(value)?);
    }

    // Second pass: references to the stored parameters
    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref() as &dyn ToSql).collect();

    f(&params)
}

fn to_owned_param(value: &Value) -> Result<OwnedParam, QueryError> {
    let param: OwnedParam = match value {
        Value::Bool(v) => Box::new(*v),
        Value::TinyInt(v) => Box::new(v.map(i16::from)),
        Value::SmallInt(v) => Box::new(*v),
        Value::Int(v) => Box::new(*v),
        Value::BigInt(v) => Box::new(*v),
        Value::TinyUnsigned(v) => Box::new(v.map(i16::from)),
        Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
        Value::Unsigned(v) => Box::new(v.map(i64::from)),
        Value::BigUnsigned(v) => {
            let converted = match v {
                Some(u) => Some(i64::try_from(*u).map_err(|_| {
                    QueryError::Execution(format!(
                        "BigUnsigned value {} exceeds i64::MAX ({}), cannot be safely cast to i64",
                        u,
                        i64::MAX
                    ))
                })?),
                None => None,
            };
            Box::new(converted)
        }
        Value::Float(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(v) => Box::new(v.as_ref().map(|s| String::clone(s))),
        Value::Char(v) => Box::new(v.map(|c| c.to_string())),
        Value::Bytes(v) => Box::new(v.as_ref().map(|b| Vec::<u8>::clone(b))),
        Value::Json(v) => Box::new(v.as_ref().map(|j| serde_json::Value::clone(j))),
        Value::Uuid(v) => Box::new(v.as_ref().map(|u| uuid::Uuid::clone(u))),
        Value::ChronoDate(v) => Box::new(v.as_ref().map(|d| chrono::NaiveDate::clone(d))),
        Value::ChronoTime(v) => Box::new(v.as_ref().map(|t| chrono::NaiveTime::clone(t))),
        Value::ChronoDateTime(v) => {
            Box::new(v.as_ref().map(|d| chrono::NaiveDateTime::clone(d)))
        }
        Value::ChronoDateTimeUtc(v) => {
            Box::new(v.as_ref().map(|d| chrono::DateTime::<chrono::Utc>::clone(d)))
        }
        Value::Decimal(v) => Box::new(v.as_ref().map(|d| rust_decimal::Decimal::clone(d))),
        _ => {
            return Err(QueryError::Execution(format!(
                "Unsupported value type in query: {:?}",
                value
            )));
        }
    };
    Ok(param)
}
