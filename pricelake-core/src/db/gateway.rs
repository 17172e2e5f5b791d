//! Postgres gateway over an explicitly owned connection pool.
//!
//! Lifecycle: build once at process start (`connect` or `connect_lazy`),
//! clone freely into whatever needs it, call `close` on shutdown. Every
//! operation takes its own connection or transaction from the pool and
//! returns it when done.

use super::config::DbConfig;
use super::frame::{rows_per_insert, rows_to_frame, BindFrame, ResultColumn};
use super::ident::QualifiedName;
use super::params::{bind_params, SqlParam};
use super::DbResult;
use polars::prelude::DataFrame;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Column as _, Executor as _, Postgres, QueryBuilder, Row as _, TypeInfo as _};
use tracing::{debug, info};

/// Handle to the relational store.
#[derive(Debug, Clone)]
pub struct Gateway {
    pool: PgPool,
    default_schema: String,
}

impl Gateway {
    /// Open the pool, establishing a first connection eagerly.
    ///
    /// Connections are pinged before being handed out so dead ones are
    /// replaced transparently.
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let pool = Self::pool_options(config)
            .connect_with(config.connect_options())
            .await?;
        info!(host = %config.host, port = config.port, database = %config.database, "connected");
        Ok(Self::from_pool(pool, &config.default_schema))
    }

    /// Build the pool without connecting; the first operation connects.
    pub fn connect_lazy(config: &DbConfig) -> Self {
        let pool = Self::pool_options(config).connect_lazy_with(config.connect_options());
        Self::from_pool(pool, &config.default_schema)
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, default_schema: &str) -> Self {
        Self {
            pool,
            default_schema: default_schema.to_string(),
        }
    }

    fn pool_options(config: &DbConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .test_before_acquire(true)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    /// Parse and validate a caller-supplied `schema.table` / `table` name.
    pub fn qualify(&self, table_name: &str) -> DbResult<QualifiedName> {
        QualifiedName::parse(table_name, &self.default_schema)
    }

    /// Close every pooled connection. Operations after this fail.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("pool closed");
    }

    /// Run a read-only statement and materialize the full result.
    ///
    /// Parameters bind to `$1..$n`. An empty result keeps the statement's
    /// columns (with their types) and has zero rows.
    pub async fn read(&self, sql: &str, params: &[SqlParam]) -> DbResult<DataFrame> {
        let mut conn = self.pool.acquire().await?;
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&mut *conn)
            .await?;

        let columns: Vec<ResultColumn> = match rows.first() {
            Some(first) => first
                .columns()
                .iter()
                .map(|c| ResultColumn {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect(),
            None => (&mut *conn)
                .describe(sql)
                .await?
                .columns()
                .iter()
                .map(|c| ResultColumn {
                    name: c.name().to_string(),
                    type_name: c.type_info().name().to_string(),
                })
                .collect(),
        };

        let df = rows_to_frame(&columns, &rows)?;
        debug!(rows = df.height(), columns = df.width(), "read");
        Ok(df)
    }

    /// Run a write or DDL statement in a transaction; returns affected rows.
    ///
    /// Commits on success. On error the transaction is dropped, which rolls
    /// it back.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let result = bind_params(sqlx::query(sql), params)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Replace `table_name` with the contents of `df`.
    ///
    /// Returns 0 without touching the store when there is nothing to load.
    /// Otherwise, in one transaction: drop the table if present, create it
    /// from the frame's columns, insert every row in multi-row batches.
    /// The returned count is the frame's height.
    pub async fn bulk_replace(&self, df: Option<&DataFrame>, table_name: &str) -> DbResult<usize> {
        let Some(df) = df.filter(|df| df.height() > 0 && df.width() > 0) else {
            return Ok(0);
        };

        let table = self.qualify(table_name)?;
        let bind = BindFrame::from_frame(df)?;
        let batch_rows = rows_per_insert(bind.columns.len());

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&bind.create_table_sql(&table))
            .execute(&mut *tx)
            .await?;

        let prefix = bind.insert_prefix(&table);
        let mut start = 0;
        while start < bind.height {
            let end = (start + batch_rows).min(bind.height);
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(&prefix);
            insert.push_values(start..end, |mut tuple, row| {
                for column in &bind.columns {
                    column.push_bind(&mut tuple, row);
                }
            });
            insert.build().execute(&mut *tx).await?;
            start = end;
        }
        tx.commit().await?;

        info!(table = %table, rows = bind.height, "table replaced");
        Ok(bind.height)
    }

    /// `DROP TABLE IF EXISTS ... CASCADE`. Succeeds when the table is absent;
    /// dependent views and foreign-key constraints go with it.
    pub async fn delete_table(&self, table_name: &str) -> DbResult<()> {
        let table = self.qualify(table_name)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {table} CASCADE"))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(table = %table, "table dropped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;
    use polars::prelude::*;

    /// A pool aimed at a closed port: any attempt to talk to the store fails,
    /// so a successful call proves no SQL was sent.
    fn unreachable_gateway() -> Gateway {
        let config = DbConfig {
            port: 1,
            ..DbConfig::default()
        };
        Gateway::connect_lazy(&config)
    }

    #[tokio::test]
    async fn bulk_replace_of_nothing_is_a_noop() {
        let gw = unreachable_gateway();

        assert_eq!(gw.bulk_replace(None, "stg.lookup").await.unwrap(), 0);

        let empty = DataFrame::new(vec![Column::new("a".into(), Vec::<i64>::new())]).unwrap();
        assert_eq!(gw.bulk_replace(Some(&empty), "stg.lookup").await.unwrap(), 0);

        // Nothing to load wins over a bad name: no validation, no DDL.
        assert_eq!(gw.bulk_replace(Some(&empty), "bad name").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_identifiers_fail_before_any_sql() {
        let gw = unreachable_gateway();
        let df = DataFrame::new(vec![Column::new("a".into(), [1i64])]).unwrap();

        for name in ["lookup; DROP TABLE x", "stg.my-table", ".lookup", "1abc"] {
            assert!(matches!(
                gw.bulk_replace(Some(&df), name).await,
                Err(DbError::InvalidIdentifier(_))
            ));
            assert!(matches!(
                gw.delete_table(name).await,
                Err(DbError::InvalidIdentifier(_))
            ));
        }
    }

    #[tokio::test]
    async fn qualify_uses_gateway_default_schema() {
        let config = DbConfig {
            port: 1,
            default_schema: "analytics".to_string(),
            ..DbConfig::default()
        };
        let gw = Gateway::connect_lazy(&config);
        let q = gw.qualify("lookup").unwrap();
        assert_eq!(q.schema(), "analytics");
        let q = gw.qualify("stg.lookup").unwrap();
        assert_eq!(q.schema(), "stg");
    }
}
