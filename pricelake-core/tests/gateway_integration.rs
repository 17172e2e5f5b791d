//! Gateway round trips against a live Postgres.
//!
//! Runs only when `POSTGRES_DB` (and the other `POSTGRES_*` variables) point
//! at a reachable server; otherwise every test returns early.

use chrono::NaiveDate;
use polars::prelude::*;
use pricelake_core::db::{DbConfig, Gateway, SqlParam};
use std::sync::atomic::{AtomicU64, Ordering};

static TABLE_COUNTER: AtomicU64 = AtomicU64::new(0);

const SCHEMA: &str = "pricelake_test";

async fn gateway() -> Option<Gateway> {
    if std::env::var("POSTGRES_DB").is_err() {
        eprintln!("POSTGRES_DB not set; skipping");
        return None;
    }
    let config = DbConfig::from_env().ok()?;
    let gw = Gateway::connect(&config).await.ok()?;
    gw.execute(&format!("CREATE SCHEMA IF NOT EXISTS {SCHEMA}"), &[])
        .await
        .ok()?;
    Some(gw)
}

fn unique_table() -> String {
    let id = TABLE_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{SCHEMA}.prices_{}_{id}", std::process::id())
}

fn prices(rows: usize) -> DataFrame {
    let start = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap();
    let epoch = NaiveDate::default();
    let days: Vec<i32> = (0..rows)
        .map(|i| (start - epoch).num_days() as i32 + i as i32)
        .collect();
    let closes: Vec<Option<f64>> = (0..rows)
        .map(|i| if i == 1 { None } else { Some(100.0 + i as f64) })
        .collect();
    let volumes: Vec<i64> = (0..rows).map(|i| 1_000 + i as i64).collect();
    DataFrame::new(vec![
        Column::new("date".into(), days).cast(&DataType::Date).unwrap(),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("ticker".into(), vec!["VOO"; rows]),
    ])
    .unwrap()
}

#[tokio::test]
async fn bulk_replace_then_read_back() {
    let Some(gw) = gateway().await else { return };
    let table = unique_table();

    let loaded = gw.bulk_replace(Some(&prices(3)), &table).await.unwrap();
    assert_eq!(loaded, 3);

    let df = gw
        .read(
            &format!("SELECT date, close, volume, ticker FROM {table} WHERE ticker = $1 ORDER BY date"),
            &[SqlParam::from("VOO")],
        )
        .await
        .unwrap();
    assert_eq!(df.height(), 3);
    assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
    assert_eq!(df.column("close").unwrap().f64().unwrap().get(1), None);
    assert_eq!(df.column("volume").unwrap().i64().unwrap().get(2), Some(1_002));

    gw.delete_table(&table).await.unwrap();
}

#[tokio::test]
async fn bulk_replace_replaces_previous_contents() {
    let Some(gw) = gateway().await else { return };
    let table = unique_table();

    gw.bulk_replace(Some(&prices(5)), &table).await.unwrap();
    gw.bulk_replace(Some(&prices(2)), &table).await.unwrap();

    let df = gw
        .read(&format!("SELECT count(*)::int8 AS n FROM {table}"), &[])
        .await
        .unwrap();
    assert_eq!(df.column("n").unwrap().i64().unwrap().get(0), Some(2));

    gw.delete_table(&table).await.unwrap();
}

#[tokio::test]
async fn bulk_replace_spans_multiple_insert_batches() {
    let Some(gw) = gateway().await else { return };
    let table = unique_table();

    assert_eq!(gw.bulk_replace(Some(&prices(25_001)), &table).await.unwrap(), 25_001);
    let df = gw
        .read(&format!("SELECT count(*)::int8 AS n FROM {table}"), &[])
        .await
        .unwrap();
    assert_eq!(df.column("n").unwrap().i64().unwrap().get(0), Some(25_001));

    gw.delete_table(&table).await.unwrap();
}

#[tokio::test]
async fn delete_missing_table_is_ok() {
    let Some(gw) = gateway().await else { return };
    gw.delete_table(&unique_table()).await.unwrap();
    gw.delete_table(&unique_table()).await.unwrap();
}

#[tokio::test]
async fn execute_reports_affected_rows_and_rolls_back_on_error() {
    let Some(gw) = gateway().await else { return };
    let table = unique_table();
    gw.bulk_replace(Some(&prices(4)), &table).await.unwrap();

    let updated = gw
        .execute(
            &format!("UPDATE {table} SET volume = volume + $1 WHERE close IS NOT NULL"),
            &[SqlParam::Int(1)],
        )
        .await
        .unwrap();
    assert_eq!(updated, 3);

    // Fails mid-statement (division by zero); nothing is deleted.
    let failed = gw
        .execute(
            &format!("DELETE FROM {table} WHERE volume / $1 > 0"),
            &[SqlParam::Int(0)],
        )
        .await;
    assert!(failed.is_err());
    let df = gw
        .read(&format!("SELECT count(*)::int8 AS n FROM {table}"), &[])
        .await
        .unwrap();
    assert_eq!(df.column("n").unwrap().i64().unwrap().get(0), Some(4));

    gw.delete_table(&table).await.unwrap();
}

#[tokio::test]
async fn empty_result_keeps_typed_columns() {
    let Some(gw) = gateway().await else { return };
    let df = gw
        .read("SELECT 1::int4 AS a, 'x'::text AS b WHERE false", &[])
        .await
        .unwrap();
    assert_eq!(df.height(), 0);
    assert_eq!(df.column("a").unwrap().dtype(), &DataType::Int32);
    assert_eq!(df.column("b").unwrap().dtype(), &DataType::String);
}
