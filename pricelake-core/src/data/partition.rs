//! Raw-layer Parquet writer with Hive-style date partitioning.
//!
//! Layout: `{base_dir}/raw/market_prices/source={SOURCE}/asset={ASSET}/dt={YYYY-MM-DD}/part-000.parquet`
//!
//! - The `dt` component is the ingestion date (wall clock at write time),
//!   not derived from the data. Re-running on the same day overwrites the
//!   same file; a new day creates a new partition.
//! - Writes go to a uniquely named temp file in the partition directory
//!   and are renamed into place.

use super::provider::DataError;
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default root of the local object-store mirror.
pub const DEFAULT_BASE_DIR: &str = "./minio_data";

const LAYER: &str = "raw";
const DOMAIN: &str = "market_prices";
const PART_FILE: &str = "part-000.parquet";

/// Partition coordinates: (source, asset, ingestion date).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
    pub source: String,
    pub asset: String,
    pub dt: NaiveDate,
}

impl PartitionKey {
    /// Build a key, rejecting components that would escape their directory level.
    pub fn new(
        source: impl Into<String>,
        asset: impl Into<String>,
        dt: NaiveDate,
    ) -> Result<Self, DataError> {
        let source = source.into();
        let asset = asset.into();
        check_component("source", &source)?;
        check_component("asset", &asset)?;
        Ok(Self { source, asset, dt })
    }

    /// Key for today's ingestion date.
    pub fn today(source: impl Into<String>, asset: impl Into<String>) -> Result<Self, DataError> {
        Self::new(source, asset, chrono::Local::now().date_naive())
    }

    /// Partition directory relative to the base dir.
    pub fn relative_dir(&self) -> PathBuf {
        source_dir(Path::new(""), &self.source)
            .join(format!("asset={}", self.asset))
            .join(format!("dt={}", self.dt.format("%Y-%m-%d")))
    }

    /// Partition file relative to the base dir.
    pub fn relative_path(&self) -> PathBuf {
        self.relative_dir().join(PART_FILE)
    }
}

fn check_component(component: &'static str, value: &str) -> Result<(), DataError> {
    let bad = value.is_empty()
        || value == "."
        || value.contains("..")
        || value.contains(['/', '\\', '='])
        || value.chars().any(char::is_control);
    if bad {
        return Err(DataError::InvalidPartition {
            component,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn source_dir(base: &Path, source: &str) -> PathBuf {
    base.join(LAYER)
        .join(DOMAIN)
        .join(format!("source={source}"))
}

/// Writes and reads raw-layer partitions under a base directory.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    base_dir: PathBuf,
}

impl Default for PartitionWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

impl PartitionWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory of the layout.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Absolute (base-joined) path of a partition file.
    pub fn path_for(&self, key: &PartitionKey) -> PathBuf {
        self.base_dir.join(key.relative_path())
    }

    /// Write `df` into today's partition for (source, asset).
    ///
    /// Returns the written path. An existing file at that path is replaced.
    pub fn write(&self, df: &DataFrame, source: &str, asset: &str) -> Result<PathBuf, DataError> {
        let key = PartitionKey::today(source, asset)?;
        self.write_key(df, &key)
    }

    /// Write `df` into the partition for an explicit ingestion date.
    pub fn write_for_date(
        &self,
        df: &DataFrame,
        source: &str,
        asset: &str,
        dt: NaiveDate,
    ) -> Result<PathBuf, DataError> {
        let key = PartitionKey::new(source, asset, dt)?;
        self.write_key(df, &key)
    }

    /// Write `df` at the location described by `key`.
    pub fn write_key(&self, df: &DataFrame, key: &PartitionKey) -> Result<PathBuf, DataError> {
        let path = self.path_for(key);
        let dir = self.base_dir.join(key.relative_dir());
        fs::create_dir_all(&dir)
            .map_err(|e| DataError::Io(format!("create {}: {e}", dir.display())))?;

        // Unique temp name per writer: concurrent writers of one key never
        // share a file, and the last rename wins. Dropped on any error.
        let mut tmp = tempfile::Builder::new()
            .prefix(".part-000.")
            .suffix(".parquet.tmp")
            .tempfile_in(&dir)
            .map_err(|e| DataError::Io(format!("create temp file in {}: {e}", dir.display())))?;
        ParquetWriter::new(tmp.as_file_mut())
            .finish(&mut df.clone())
            .map_err(|e| DataError::ParquetError(format!("write parquet: {e}")))?;

        tmp.persist(&path)
            .map_err(|e| DataError::Io(format!("atomic rename failed: {}", e.error)))?;

        info!(
            source = %key.source,
            asset = %key.asset,
            dt = %key.dt,
            rows = df.height(),
            path = %path.display(),
            "partition written"
        );
        Ok(path)
    }

    /// Load a partition file back into a frame.
    pub fn read_partition(&self, key: &PartitionKey) -> Result<DataFrame, DataError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Err(DataError::PartitionNotFound(path.display().to_string()));
        }
        read_parquet(&path)
    }

    /// All partitions written for a source, sorted by (asset, dt).
    ///
    /// Directories that don't follow the `asset=`/`dt=` naming or lack a
    /// part file are skipped.
    pub fn list_partitions(&self, source: &str) -> Result<Vec<PartitionKey>, DataError> {
        check_component("source", source)?;
        let root = source_dir(&self.base_dir, source);
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for asset_entry in read_dir(&root)? {
            let Some(asset) = strip_dir_name(&asset_entry, "asset=") else {
                continue;
            };
            for dt_entry in read_dir(&asset_entry)? {
                let Some(dt_str) = strip_dir_name(&dt_entry, "dt=") else {
                    continue;
                };
                let Ok(dt) = NaiveDate::parse_from_str(&dt_str, "%Y-%m-%d") else {
                    continue;
                };
                if !dt_entry.join(PART_FILE).is_file() {
                    continue;
                }
                keys.push(PartitionKey {
                    source: source.to_string(),
                    asset: asset.clone(),
                    dt,
                });
            }
        }

        keys.sort();
        Ok(keys)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let entries =
        fs::read_dir(dir).map_err(|e| DataError::Io(format!("read dir {}: {e}", dir.display())))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DataError::Io(format!("dir entry: {e}")))?;
        let path = entry.path();
        if path.is_dir() {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn strip_dir_name(path: &Path, prefix: &str) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(prefix))
        .map(str::to_string)
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

/// Read a whole Parquet file.
pub fn read_parquet(path: &Path) -> Result<DataFrame, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Io(format!("open: {e}")))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::ParquetError(format!("read: {e}")))
}
