//! Ticker fetch: provider call followed by column normalization.

use super::provider::{DataError, DataProvider};
use chrono::NaiveDate;
use polars::prelude::*;
use tracing::info;

/// Default first day of history requested from the provider.
pub const DEFAULT_START: &str = "2018-01-01";

/// Name of the column that tags every row with its ticker.
pub const TICKER_COLUMN: &str = "ticker";

/// `DEFAULT_START` as a date.
pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default()
}

/// Fetch the full daily history of `ticker` from `start` to today.
///
/// The result has lowercase column names and a trailing `ticker` column.
/// Provider failures are returned as-is; an empty history is not an error.
pub fn fetch_ticker_data(
    provider: &dyn DataProvider,
    ticker: &str,
    start: NaiveDate,
) -> Result<DataFrame, DataError> {
    let today = chrono::Local::now().date_naive();
    let raw = provider.fetch(ticker, start, today)?;
    let df = normalize_frame(raw, ticker)?;
    info!(%ticker, provider = provider.name(), rows = df.height(), "fetched");
    Ok(df)
}

/// Lowercase every column name (spaces become underscores, so the provider's
/// `Adj Close` lands as `adj_close`) and append a constant `ticker` column.
pub fn normalize_frame(df: DataFrame, ticker: &str) -> Result<DataFrame, DataError> {
    let lowered: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|c| c.clone().with_name(normalize_name(c.name()).into()))
        .collect();
    let mut df = DataFrame::new(lowered)
        .map_err(|e| DataError::FrameError(format!("rename columns: {e}")))?;

    let tickers = Column::new(TICKER_COLUMN.into(), vec![ticker; df.height()]);
    df.with_column(tickers)
        .map_err(|e| DataError::FrameError(format!("tag ticker: {e}")))?;
    Ok(df)
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}
