//! Data provider trait and structured error types.
//!
//! The DataProvider trait abstracts over market data sources so the fetcher
//! can be exercised against an in-memory fake in tests.

use chrono::NaiveDate;
use polars::prelude::DataFrame;
use thiserror::Error;

/// Structured error types for fetch and partition operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from provider for {symbol}")]
    HttpStatus { status: u16, symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("invalid partition component {component}={value:?}")]
    InvalidPartition { component: &'static str, value: String },

    #[error("no partition at {0}")]
    PartitionNotFound(String),

    #[error("dataframe error: {0}")]
    FrameError(String),

    #[error("parquet I/O error: {0}")]
    ParquetError(String),

    #[error("filesystem error: {0}")]
    Io(String),
}

/// Source of daily market observations.
///
/// Implementations return the provider's own column naming; the fetcher
/// normalizes names and tags rows afterwards.
pub trait DataProvider: Send + Sync {
    /// Short identifier used as the partition `source` (e.g. `yfinance`).
    fn name(&self) -> &str;

    /// Fetch daily observations for a symbol over `[start, end]`.
    fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate)
        -> Result<DataFrame, DataError>;
}
