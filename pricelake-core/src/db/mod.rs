//! Postgres gateway: parametrized reads and writes, bulk table replace and
//! guarded table drops, moving data between Postgres and polars frames.
//!
//! Schema and table names supplied by callers pass an allow-list check and
//! are then quoted; values are always bound as parameters.

pub mod config;
pub mod frame;
pub mod gateway;
pub mod ident;
pub mod params;

pub use config::DbConfig;
pub use gateway::Gateway;
pub use ident::{quote_identifier, validate_identifier, QualifiedName, DEFAULT_SCHEMA};
pub use params::SqlParam;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid identifier {0:?}: use only [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),

    #[error("database configuration: {0}")]
    Config(String),

    #[error("unsupported column type {type_name} for column '{column}' (cast it in SQL)")]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("dataframe conversion: {0}")]
    Frame(String),

    #[error("invalid parameter {0:?}")]
    InvalidParam(String),

    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;
