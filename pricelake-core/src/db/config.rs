//! Connection settings read from `POSTGRES_*` environment variables.

use super::ident::{validate_identifier, DEFAULT_SCHEMA};
use super::{DbError, DbResult};
use sqlx::postgres::PgConnectOptions;
use std::fmt;

/// Postgres connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub user: String,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Schema for unqualified table names.
    pub default_schema: String,
    pub max_connections: u32,
}

impl DbConfig {
    /// Read `POSTGRES_USER`, `POSTGRES_PASSWORD`, `POSTGRES_HOST` (default
    /// `localhost`), `POSTGRES_PORT` (default 5432), `POSTGRES_DB`,
    /// `POSTGRES_SCHEMA` (default `public`) and `POSTGRES_MAX_CONNECTIONS`
    /// (default 5) from the process environment.
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| DbError::Config(format!("{key} is not set")));

        let port = match var("POSTGRES_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| DbError::Config(format!("POSTGRES_PORT is not a port: {p:?}")))?,
            None => 5432,
        };
        let max_connections = match var("POSTGRES_MAX_CONNECTIONS") {
            Some(n) => n.parse().map_err(|_| {
                DbError::Config(format!("POSTGRES_MAX_CONNECTIONS is not a number: {n:?}"))
            })?,
            None => 5,
        };
        let default_schema = var("POSTGRES_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        validate_identifier(&default_schema)?;

        Ok(Self {
            user: required("POSTGRES_USER")?,
            password: var("POSTGRES_PASSWORD"),
            host: var("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
            port,
            database: required("POSTGRES_DB")?,
            default_schema,
            max_connections,
        })
    }

    /// Driver connect options. Built field by field so passwords need no URL escaping.
    pub fn connect_options(&self) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl Default for DbConfig {
    /// Local development defaults; `from_env` is the normal constructor.
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: None,
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            default_schema: DEFAULT_SCHEMA.to_string(),
            max_connections: 5,
        }
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("default_schema", &self.default_schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
