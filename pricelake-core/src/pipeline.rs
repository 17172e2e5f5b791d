//! Daily ingestion run: expands the ticker list into one fetch → write task
//! per ticker and collects each task's written path for audit.
//!
//! Tasks share no state and write disjoint partitions, so they may run in
//! any order or in parallel. Each task runs once; a failed task is reported
//! and the remaining tasks still run.

use crate::config::PipelineConfig;
use crate::data::{fetch_ticker_data, DataError, DataProvider, PartitionWriter};
use chrono::{NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

/// Progress callback for a workflow run.
pub trait TaskProgress: Send + Sync {
    /// Called when a ticker task starts.
    fn on_start(&self, ticker: &str, index: usize, total: usize);

    /// Called when a ticker task finishes.
    fn on_complete(&self, ticker: &str, index: usize, total: usize, result: &Result<PathBuf, DataError>);

    /// Called once every task has finished.
    fn on_run_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that emits tracing events.
pub struct LogProgress;

impl TaskProgress for LogProgress {
    fn on_start(&self, ticker: &str, index: usize, total: usize) {
        info!(%ticker, task = index + 1, total, "ingesting");
    }

    fn on_complete(
        &self,
        ticker: &str,
        _index: usize,
        _total: usize,
        result: &Result<PathBuf, DataError>,
    ) {
        match result {
            Ok(path) => info!(%ticker, path = %path.display(), "ingested"),
            Err(e) => error!(%ticker, error = %e, "ingestion failed"),
        }
    }

    fn on_run_complete(&self, succeeded: usize, failed: usize, total: usize) {
        info!(succeeded, failed, total, "run complete");
    }
}

/// Fetch one ticker and write it to today's partition. Returns the file path.
pub fn ingest_ticker(
    provider: &dyn DataProvider,
    writer: &PartitionWriter,
    ticker: &str,
    source: &str,
    start: NaiveDate,
) -> Result<PathBuf, DataError> {
    let df = fetch_ticker_data(provider, ticker, start)?;
    writer.write(&df, source, ticker)
}

/// Outcome of one ticker task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success { path: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub ticker: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// Audit record of one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub workflow_id: String,
    pub source: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| matches!(t.outcome, TaskOutcome::Success { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tasks.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Paths written by successful tasks, in ticker order.
    pub fn written_paths(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter_map(|t| match &t.outcome {
                TaskOutcome::Success { path } => Some(path.as_str()),
                TaskOutcome::Failed { .. } => None,
            })
            .collect()
    }
}

/// Run every ticker task of the configured workflow once.
///
/// With `parallel`, tasks fan out over the rayon pool; the report keeps
/// the configured ticker order either way.
pub fn run_ingest(
    provider: &dyn DataProvider,
    writer: &PartitionWriter,
    config: &PipelineConfig,
    parallel: bool,
    progress: &dyn TaskProgress,
) -> RunReport {
    let started_at = chrono::Local::now().naive_local();
    let workflow = &config.workflow;
    let total = workflow.tickers.len();

    let task = |index: usize, ticker: &String| -> TaskReport {
        progress.on_start(ticker, index, total);
        let result = ingest_ticker(
            provider,
            writer,
            ticker,
            &workflow.source,
            config.fetch.start_date,
        );
        progress.on_complete(ticker, index, total, &result);

        let outcome = match result {
            Ok(path) => TaskOutcome::Success {
                path: path.display().to_string(),
            },
            Err(e) => TaskOutcome::Failed {
                error: e.to_string(),
            },
        };
        TaskReport {
            ticker: ticker.clone(),
            outcome,
        }
    };

    let tasks: Vec<TaskReport> = if parallel {
        workflow
            .tickers
            .par_iter()
            .enumerate()
            .map(|(i, t)| task(i, t))
            .collect()
    } else {
        workflow
            .tickers
            .iter()
            .enumerate()
            .map(|(i, t)| task(i, t))
            .collect()
    };

    let report = RunReport {
        workflow_id: workflow.id.clone(),
        source: workflow.source.clone(),
        started_at,
        finished_at: chrono::Local::now().naive_local(),
        tasks,
    };
    progress.on_run_complete(report.succeeded(), report.failed(), total);
    report
}
