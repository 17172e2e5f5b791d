//! Positional statement parameters (`$1`, `$2`, ...).

use super::DbError;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use std::str::FromStr;

/// A value bound to a statement placeholder. Never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Sent as a text-typed NULL; cast the placeholder (`$1::int`) when the
    /// target is not text.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for SqlParam {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v)
    }
}

/// Parses the CLI form `type:value` (`int:5`, `date:2025-10-01`, `null`).
/// A value without a recognised type prefix is text.
impl FromStr for SqlParam {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "null" {
            return Ok(Self::Null);
        }
        let invalid = || DbError::InvalidParam(s.to_string());
        let Some((kind, value)) = s.split_once(':') else {
            return Ok(Self::Text(s.to_string()));
        };
        match kind {
            "bool" => value.parse().map(Self::Bool).map_err(|_| invalid()),
            "int" => value.parse().map(Self::Int).map_err(|_| invalid()),
            "float" => value.parse().map(Self::Float).map_err(|_| invalid()),
            "text" => Ok(Self::Text(value.to_string())),
            "date" => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|_| invalid()),
            "ts" => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .map(Self::Timestamp)
                .map_err(|_| invalid()),
            _ => Ok(Self::Text(s.to_string())),
        }
    }
}

/// Bind `params` to `query` in order.
pub(crate) fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(v) => query.bind(*v),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Date(v) => query.bind(*v),
            SqlParam::Timestamp(v) => query.bind(*v),
        };
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_prefixes_parse() {
        assert_eq!("int:42".parse::<SqlParam>().unwrap(), SqlParam::Int(42));
        assert_eq!("bool:true".parse::<SqlParam>().unwrap(), SqlParam::Bool(true));
        assert_eq!("float:1.5".parse::<SqlParam>().unwrap(), SqlParam::Float(1.5));
        assert_eq!(
            "date:2025-10-01".parse::<SqlParam>().unwrap(),
            SqlParam::Date(NaiveDate::from_ymd_opt(2025, 10, 1).unwrap())
        );
        assert_eq!("null".parse::<SqlParam>().unwrap(), SqlParam::Null);
    }

    #[test]
    fn untyped_values_are_text() {
        assert_eq!("VOO".parse::<SqlParam>().unwrap(), SqlParam::Text("VOO".into()));
        assert_eq!("007".parse::<SqlParam>().unwrap(), SqlParam::Text("007".into()));
        assert_eq!(
            "text:int:5".parse::<SqlParam>().unwrap(),
            SqlParam::Text("int:5".into())
        );
        assert_eq!(
            "http://x".parse::<SqlParam>().unwrap(),
            SqlParam::Text("http://x".into())
        );
    }

    #[test]
    fn malformed_typed_values_error() {
        assert!(matches!(
            "int:abc".parse::<SqlParam>(),
            Err(DbError::InvalidParam(_))
        ));
        assert!("date:10/01/2025".parse::<SqlParam>().is_err());
    }
}
