//! Data ingestion and partitioned storage

pub mod fetch;
pub mod partition;
pub mod provider;
pub mod yahoo;

pub use fetch::{default_start, fetch_ticker_data, normalize_frame, DEFAULT_START};
pub use partition::{PartitionKey, PartitionWriter, DEFAULT_BASE_DIR};
pub use provider::{DataError, DataProvider};
pub use yahoo::YahooProvider;
