//! pricelake core: market price ingestion and relational load helpers.
//!
//! This crate contains the ingestion-and-load path:
//! - Provider fetch (Yahoo Finance) with column normalization and ticker tagging
//! - Date-partitioned Parquet writer (`source=/asset=/dt=` layout)
//! - Daily ingestion workflow: one fetch → write task per ticker
//! - Postgres gateway: parametrized reads/writes, bulk replace, guarded drops

pub mod config;
pub mod data;
pub mod db;
pub mod pipeline;
