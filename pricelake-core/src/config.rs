//! Pipeline configuration, loadable from TOML.
//!
//! Every field has a default, so an empty file (or no file) describes the
//! stock `ingest_market_prices_raw` workflow:
//!
//! ```toml
//! [workflow]
//! tickers = ["VOO", "VT", "VB", "IBIT"]
//! source = "yfinance"
//!
//! [storage]
//! base_dir = "./minio_data"
//!
//! [fetch]
//! start_date = "2018-01-01"
//! auto_adjust = true
//! ```

use crate::data::{default_start, DEFAULT_BASE_DIR};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifier of the daily raw ingestion workflow.
pub const WORKFLOW_ID: &str = "ingest_market_prices_raw";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub workflow: WorkflowSpec,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
}

/// Workflow description handed to the scheduler.
///
/// `schedule`, `catchup` and `retries` are descriptive: they document the
/// contract with whatever runs the workflow daily. The runner itself
/// executes each task exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkflowSpec {
    pub id: String,
    pub description: String,
    pub schedule: String,
    pub start_date: NaiveDate,
    pub catchup: bool,
    pub retries: u32,
    pub tags: Vec<String>,
    pub source: String,
    pub tickers: Vec<String>,
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        Self {
            id: WORKFLOW_ID.to_string(),
            description: "Raw ingestion of market prices via yfinance".to_string(),
            schedule: "@daily".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 10, 1).unwrap_or_default(),
            catchup: false,
            retries: 0,
            tags: vec!["raw".to_string(), "market_prices".to_string()],
            source: "yfinance".to_string(),
            tickers: ["VOO", "VT", "VB", "IBIT"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// First day of history requested for every ticker.
    pub start_date: NaiveDate,
    /// Apply split/dividend adjustment to OHLC prices.
    pub auto_adjust: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            start_date: default_start(),
            auto_adjust: true,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.tickers.is_empty() {
            return Err(ConfigError::Invalid("workflow.tickers is empty".into()));
        }
        if let Some(t) = self.workflow.tickers.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("blank ticker {t:?}")));
        }
        let mut seen = std::collections::HashSet::new();
        if let Some(t) = self.workflow.tickers.iter().find(|t| !seen.insert(t.as_str())) {
            return Err(ConfigError::Invalid(format!("duplicate ticker {t:?}")));
        }
        if self.workflow.source.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.source is empty".into()));
        }
        Ok(())
    }
}
