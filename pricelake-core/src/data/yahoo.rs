//! Yahoo Finance data provider.
//!
//! Fetches daily OHLCV bars from Yahoo's v8 chart API and returns them as a
//! frame with the provider's column naming (`Date`, `Open`, ..., `Volume`).
//!
//! One request per fetch. Failures are reported, never retried: the caller
//! (or the orchestrator above it) decides whether to run again.

use super::provider::{DataError, DataProvider};
use chrono::{NaiveDate, NaiveTime};
use polars::prelude::*;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds (e.g. -14400 for New York in summer).
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// One parsed trading day before frame assembly.
#[derive(Debug, Clone, PartialEq)]
struct DailyQuote {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    adj_close: Option<f64>,
    volume: Option<i64>,
}

const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    auto_adjust: bool,
}

impl YahooProvider {
    /// Provider name, also the default partition `source`.
    pub const NAME: &'static str = "yfinance";

    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::NetworkUnreachable(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            auto_adjust: true,
        })
    }

    /// Scale open/high/low/close by the adjusted-close ratio (default on).
    ///
    /// With adjustment off the raw close is kept and an `Adj Close` column is added.
    pub fn with_auto_adjust(mut self, auto_adjust: bool) -> Self {
        self.auto_adjust = auto_adjust;
        self
    }

    /// Build the chart API URL for a symbol and date range.
    ///
    /// The symbol is a single percent-encoded path segment.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<reqwest::Url, DataError> {
        let start_ts = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let end_ts = end.and_time(NaiveTime::MIN).and_utc().timestamp() + 86_399;

        let bad_url = |detail: String| DataError::NetworkUnreachable(format!("chart URL: {detail}"));
        let mut url = reqwest::Url::parse(CHART_BASE_URL).map_err(|e| bad_url(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| bad_url(CHART_BASE_URL.to_string()))?
            .push(symbol);
        url.query_pairs_mut()
            .append_pair("period1", &start_ts.to_string())
            .append_pair("period2", &end_ts.to_string())
            .append_pair("interval", "1d")
            .append_pair("includeAdjustedClose", "true")
            .append_pair("events", "div,splits");
        Ok(url)
    }

    /// Parse the chart API response into daily quotes.
    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<DailyQuote>, DataError> {
        let result = resp.chart.result.ok_or_else(|| {
            if let Some(err) = resp.chart.error {
                if err.code == "Not Found" {
                    DataError::SymbolNotFound {
                        symbol: symbol.to_string(),
                    }
                } else {
                    DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description))
                }
            } else {
                DataError::ResponseFormatChanged("empty result with no error".into())
            }
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        // Bars are dated in exchange-local time, not UTC.
        let gmtoffset = data.meta.as_ref().and_then(|m| m.gmtoffset).unwrap_or(0);

        // No timestamps means no trading days in range; not an error here.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut quotes = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = chrono::DateTime::from_timestamp(ts + gmtoffset, 0)
                .map(|dt| dt.naive_utc().date())
                .ok_or_else(|| {
                    DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
                })?;

            let q = DailyQuote {
                date,
                open: quote.open.get(i).copied().flatten(),
                high: quote.high.get(i).copied().flatten(),
                low: quote.low.get(i).copied().flatten(),
                close: quote.close.get(i).copied().flatten(),
                adj_close: adj_closes
                    .as_ref()
                    .and_then(|v| v.get(i).copied().flatten()),
                volume: quote.volume.get(i).copied().flatten(),
            };

            // Holidays come back as all-null rows
            if q.open.is_none()
                && q.high.is_none()
                && q.low.is_none()
                && q.close.is_none()
                && q.volume.is_none()
            {
                continue;
            }

            quotes.push(q);
        }

        Ok(quotes)
    }

    /// Assemble parsed quotes into the provider-shaped frame.
    fn quotes_to_frame(quotes: &[DailyQuote], auto_adjust: bool) -> Result<DataFrame, DataError> {
        let epoch = NaiveDate::default();
        let dates: Vec<i32> = quotes
            .iter()
            .map(|q| (q.date - epoch).num_days() as i32)
            .collect();

        let ratio = |q: &DailyQuote| match (q.adj_close, q.close) {
            (Some(adj), Some(close)) if auto_adjust && close != 0.0 => adj / close,
            _ => 1.0,
        };
        let scaled = |pick: fn(&DailyQuote) -> Option<f64>| -> Vec<Option<f64>> {
            quotes.iter().map(|q| pick(q).map(|v| v * ratio(q))).collect()
        };

        let mut columns = vec![
            Column::new("Date".into(), dates)
                .cast(&DataType::Date)
                .map_err(|e| DataError::FrameError(format!("date cast: {e}")))?,
            Column::new("Open".into(), scaled(|q| q.open)),
            Column::new("High".into(), scaled(|q| q.high)),
            Column::new("Low".into(), scaled(|q| q.low)),
            Column::new("Close".into(), scaled(|q| q.close)),
        ];
        if !auto_adjust {
            let adj: Vec<Option<f64>> = quotes.iter().map(|q| q.adj_close).collect();
            columns.push(Column::new("Adj Close".into(), adj));
        }
        let volumes: Vec<Option<i64>> = quotes.iter().map(|q| q.volume).collect();
        columns.push(Column::new("Volume".into(), volumes));

        DataFrame::new(columns).map_err(|e| DataError::FrameError(format!("assemble frame: {e}")))
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DataFrame, DataError> {
        let url = Self::chart_url(symbol, start, end)?;
        debug!(%symbol, %url, "requesting chart");

        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| DataError::NetworkUnreachable(e.to_string()))?;

        let status = resp.status();
        // Yahoo reports unknown symbols as 404 with a JSON error body
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                symbol: symbol.to_string(),
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        let quotes = Self::parse_response(symbol, chart)?;
        Self::quotes_to_frame(&quotes, self.auto_adjust)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, null, 102.0],
                        "high":   [102.0, null, 104.0],
                        "low":    [99.0,  null, 101.0],
                        "close":  [101.0, null, 103.0],
                        "volume": [1000,  null, 1200]
                    }],
                    "adjclose": [{ "adjclose": [50.5, null, 103.0] }]
                }
            }],
            "error": null
        }
    }"#;

    fn sample() -> ChartResponse {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn parse_skips_all_null_days() {
        let quotes = YahooProvider::parse_response("VOO", sample()).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(quotes[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let err = YahooProvider::parse_response("NOPE", resp).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { symbol } if symbol == "NOPE"));
    }

    #[test]
    fn missing_timestamps_yield_empty_result() {
        let body = r#"{"chart":{"result":[{"indicators":{"quote":[{"open":[],"high":[],"low":[],"close":[],"volume":[]}]}}],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let quotes = YahooProvider::parse_response("VOO", resp).unwrap();
        assert!(quotes.is_empty());

        let df = YahooProvider::quotes_to_frame(&quotes, true).unwrap();
        assert_eq!(df.height(), 0);
    }

    #[test]
    fn frame_uses_provider_column_names() {
        let quotes = YahooProvider::parse_response("VOO", sample()).unwrap();
        let df = YahooProvider::quotes_to_frame(&quotes, true).unwrap();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, ["Date", "Open", "High", "Low", "Close", "Volume"]);
        assert_eq!(df.column("Date").unwrap().dtype(), &DataType::Date);
    }

    #[test]
    fn auto_adjust_scales_prices_by_adjclose_ratio() {
        let quotes = YahooProvider::parse_response("VOO", sample()).unwrap();
        let df = YahooProvider::quotes_to_frame(&quotes, true).unwrap();
        let close = df.column("Close").unwrap().f64().unwrap();
        let open = df.column("Open").unwrap().f64().unwrap();
        assert_eq!(close.get(0), Some(50.5));
        assert_eq!(open.get(0), Some(50.0));
        assert_eq!(close.get(1), Some(103.0));
    }

    #[test]
    fn raw_mode_keeps_close_and_adds_adj_close() {
        let quotes = YahooProvider::parse_response("VOO", sample()).unwrap();
        let df = YahooProvider::quotes_to_frame(&quotes, false).unwrap();
        assert_eq!(df.column("Close").unwrap().f64().unwrap().get(0), Some(101.0));
        assert_eq!(
            df.column("Adj Close").unwrap().f64().unwrap().get(0),
            Some(50.5)
        );
    }

    #[test]
    fn raw_mode_adj_close_survives_normalization() {
        let quotes = YahooProvider::parse_response("VOO", sample()).unwrap();
        let df = YahooProvider::quotes_to_frame(&quotes, false).unwrap();
        let df = crate::data::normalize_frame(df, "VOO").unwrap();
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(
            names,
            ["date", "open", "high", "low", "close", "adj_close", "volume", "ticker"]
        );
        assert_eq!(
            df.column("adj_close").unwrap().f64().unwrap().get(0),
            Some(50.5)
        );
    }

    #[test]
    fn chart_url_covers_whole_end_day() {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2018, 1, 2).unwrap();
        let url = YahooProvider::chart_url("VOO", start, end).unwrap();
        let url = url.as_str();
        assert!(url.contains("/chart/VOO?"));
        assert!(url.contains("period1=1514764800"));
        assert!(url.contains("period2=1514937599"));
        assert!(url.contains("events=div%2Csplits"));
    }

    #[test]
    fn chart_url_encodes_symbol_as_one_segment() {
        let day = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let url = YahooProvider::chart_url("A?B&c#d/e", day, day).unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/A%3FB&c%23d%2Fe");
        assert_eq!(url.fragment(), None);
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(
            keys,
            ["period1", "period2", "interval", "includeAdjustedClose", "events"]
        );
    }

    #[test]
    fn bar_dates_use_exchange_offset() {
        // 2024-01-01T23:00Z is already Jan 2 in Sydney (UTC+11).
        let body = r#"{"chart":{"result":[{
            "meta": {"gmtoffset": 39600},
            "timestamp": [1704150000],
            "indicators": {"quote": [{"open":[7.0],"high":[7.5],"low":[6.9],"close":[7.2],"volume":[500]}]}
        }],"error":null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let quotes = YahooProvider::parse_response("BHP.AX", resp).unwrap();
        assert_eq!(quotes[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }
}
