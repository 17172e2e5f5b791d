//! Conversions between polars frames and Postgres rows.
//!
//! Frame → table: each column maps to one Postgres type and one bind buffer.
//!
//! | polars                           | Postgres           |
//! |----------------------------------|--------------------|
//! | Boolean                          | `BOOLEAN`          |
//! | Int32                            | `INTEGER`          |
//! | Int64/UInt32/UInt64              | `BIGINT`           |
//! | Float32/Float64                  | `DOUBLE PRECISION` |
//! | Date                             | `DATE`             |
//! | Datetime (any unit/zone, as UTC) | `TIMESTAMP`        |
//! | String and anything else         | `TEXT`             |
//!
//! Rows → frame goes the other way for the types in `decode_column`.

use super::ident::{quote_identifier, QualifiedName};
use super::{DbError, DbResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, Row as _};

fn frame_err(e: PolarsError) -> DbError {
    DbError::Frame(e.to_string())
}

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// One frame column ready to bind, row by row.
#[derive(Debug, Clone)]
pub(crate) enum BindColumn {
    Bool(Vec<Option<bool>>),
    Int(Vec<Option<i32>>),
    BigInt(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl BindColumn {
    pub(crate) fn from_column(column: &Column) -> DbResult<Self> {
        let bound = match column.dtype() {
            DataType::Boolean => Self::Bool(column.bool().map_err(frame_err)?.into_iter().collect()),
            DataType::Int32 => Self::Int(column.i32().map_err(frame_err)?.into_iter().collect()),
            DataType::Int64 | DataType::UInt32 | DataType::UInt64 => {
                // Strict: an unsigned value above i64::MAX errors instead of turning NULL.
                let cast = column.strict_cast(&DataType::Int64).map_err(frame_err)?;
                Self::BigInt(cast.i64().map_err(frame_err)?.into_iter().collect())
            }
            DataType::Float32 | DataType::Float64 => {
                let cast = column.cast(&DataType::Float64).map_err(frame_err)?;
                Self::Double(cast.f64().map_err(frame_err)?.into_iter().collect())
            }
            DataType::Date => {
                let days = column.date().map_err(frame_err)?;
                Self::Date(
                    (0..days.len())
                        .map(|i| days.get(i).map(|d| epoch() + chrono::Duration::days(d.into())))
                        .collect(),
                )
            }
            DataType::Datetime(_, _) => {
                let cast = column
                    .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                    .map_err(frame_err)?;
                let micros = cast.datetime().map_err(frame_err)?;
                Self::Timestamp(
                    (0..micros.len())
                        .map(|i| {
                            micros
                                .get(i)
                                .and_then(DateTime::from_timestamp_micros)
                                .map(|t| t.naive_utc())
                        })
                        .collect(),
                )
            }
            _ => {
                let cast = column.cast(&DataType::String).map_err(frame_err)?;
                Self::Text(
                    cast.str()
                        .map_err(frame_err)?
                        .into_iter()
                        .map(|s| s.map(str::to_string))
                        .collect(),
                )
            }
        };
        Ok(bound)
    }

    /// Postgres column type for `CREATE TABLE`.
    pub(crate) fn sql_type(&self) -> &'static str {
        match self {
            Self::Bool(_) => "BOOLEAN",
            Self::Int(_) => "INTEGER",
            Self::BigInt(_) => "BIGINT",
            Self::Double(_) => "DOUBLE PRECISION",
            Self::Text(_) => "TEXT",
            Self::Date(_) => "DATE",
            Self::Timestamp(_) => "TIMESTAMP",
        }
    }

    /// Bind the value at `row` into a VALUES tuple.
    pub(crate) fn push_bind(&self, tuple: &mut Separated<'_, '_, Postgres, &'static str>, row: usize) {
        match self {
            Self::Bool(v) => tuple.push_bind(v[row]),
            Self::Int(v) => tuple.push_bind(v[row]),
            Self::BigInt(v) => tuple.push_bind(v[row]),
            Self::Double(v) => tuple.push_bind(v[row]),
            Self::Text(v) => tuple.push_bind(v[row].clone()),
            Self::Date(v) => tuple.push_bind(v[row]),
            Self::Timestamp(v) => tuple.push_bind(v[row]),
        };
    }
}

/// A frame converted for loading: column names plus bind buffers.
#[derive(Debug, Clone)]
pub(crate) struct BindFrame {
    pub names: Vec<String>,
    pub columns: Vec<BindColumn>,
    pub height: usize,
}

impl BindFrame {
    pub(crate) fn from_frame(df: &DataFrame) -> DbResult<Self> {
        let names = df.get_column_names().iter().map(|n| n.to_string()).collect();
        let columns = df
            .get_columns()
            .iter()
            .map(BindColumn::from_column)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            names,
            columns,
            height: df.height(),
        })
    }

    /// `CREATE TABLE` statement mirroring the frame's columns.
    pub(crate) fn create_table_sql(&self, table: &QualifiedName) -> String {
        let defs: Vec<String> = self
            .names
            .iter()
            .zip(&self.columns)
            .map(|(name, col)| format!("{} {}", quote_identifier(name), col.sql_type()))
            .collect();
        format!("CREATE TABLE {table} ({})", defs.join(", "))
    }

    /// `INSERT INTO ... (cols) ` prefix; VALUES tuples are appended per batch.
    pub(crate) fn insert_prefix(&self, table: &QualifiedName) -> String {
        let cols: Vec<String> = self.names.iter().map(|n| quote_identifier(n)).collect();
        format!("INSERT INTO {table} ({}) ", cols.join(", "))
    }
}

/// Rows per multi-row INSERT.
pub const INSERT_BATCH_ROWS: usize = 10_000;

/// Postgres accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Rows per INSERT for a table of `column_count` columns: the batch size,
/// reduced so one statement stays within the bind-parameter limit.
pub fn rows_per_insert(column_count: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / column_count.max(1);
    INSERT_BATCH_ROWS.min(by_params).max(1)
}

/// Result-set column: name and Postgres type name as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultColumn {
    pub name: String,
    pub type_name: String,
}

/// Build a frame from fetched rows, one polars column per result column.
pub(crate) fn rows_to_frame(columns: &[ResultColumn], rows: &[PgRow]) -> DbResult<DataFrame> {
    let decoded = columns
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(idx, col, rows))
        .collect::<DbResult<Vec<_>>>()?;
    DataFrame::new(decoded).map_err(frame_err)
}

fn decode_column(idx: usize, col: &ResultColumn, rows: &[PgRow]) -> DbResult<Column> {
    let name: PlSmallStr = col.name.as_str().into();

    fn values<'r, T>(rows: &'r [PgRow], idx: usize) -> DbResult<Vec<Option<T>>>
    where
        T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
    {
        rows.iter()
            .map(|r| r.try_get::<Option<T>, _>(idx).map_err(DbError::from))
            .collect()
    }

    let column = match col.type_name.as_str() {
        "BOOL" => Column::new(name, values::<bool>(rows, idx)?),
        "INT2" => {
            let v: Vec<Option<i32>> = values::<i16>(rows, idx)?
                .into_iter()
                .map(|x| x.map(i32::from))
                .collect();
            Column::new(name, v)
        }
        "INT4" => Column::new(name, values::<i32>(rows, idx)?),
        "INT8" => Column::new(name, values::<i64>(rows, idx)?),
        "FLOAT4" => {
            let v: Vec<Option<f64>> = values::<f32>(rows, idx)?
                .into_iter()
                .map(|x| x.map(f64::from))
                .collect();
            Column::new(name, v)
        }
        "FLOAT8" => Column::new(name, values::<f64>(rows, idx)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Column::new(name, values::<String>(rows, idx)?),
        "DATE" => {
            let days: Vec<Option<i32>> = values::<NaiveDate>(rows, idx)?
                .into_iter()
                .map(|d| d.map(|d| (d - epoch()).num_days() as i32))
                .collect();
            Column::new(name, days)
                .cast(&DataType::Date)
                .map_err(frame_err)?
        }
        "TIMESTAMP" => {
            let micros: Vec<Option<i64>> = values::<NaiveDateTime>(rows, idx)?
                .into_iter()
                .map(|t| t.map(|t| t.and_utc().timestamp_micros()))
                .collect();
            Column::new(name, micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .map_err(frame_err)?
        }
        "TIMESTAMPTZ" => {
            let micros: Vec<Option<i64>> = values::<DateTime<Utc>>(rows, idx)?
                .into_iter()
                .map(|t| t.map(|t| t.timestamp_micros()))
                .collect();
            Column::new(name, micros)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))
                .map_err(frame_err)?
        }
        other => {
            return Err(DbError::UnsupportedColumnType {
                column: col.name.clone(),
                type_name: other.to_string(),
            })
        }
    };
    Ok(column)
}
