//! Intake of scraper adapter output.
//!
//! Each configured store drops one JSON array of records into the data
//! directory. Files are decoded element by element so a single malformed
//! record never sinks the rest of the store, and records that carry neither
//! a URL nor a name are dropped before they can reach the pipeline.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::models::{ProductRecord, RawRecord};

/// One store's validated records, plus how many the intake gate dropped.
#[derive(Debug)]
pub struct StoreBatch {
    pub store: String,
    pub records: Vec<ProductRecord>,
    pub rejected: usize,
}

/// Reads a single adapter output file into validated records.
///
/// The file must hold a JSON array. Elements that do not decode as records
/// are counted and skipped; `fallback_store` and `run_stamp` fill fields
/// the adapter left out.
pub fn read_adapter_file(path: &Path, store: &str, run_stamp: &str) -> Result<StoreBatch> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read adapter output {}", path.display()))?;

    let values: Vec<Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))?;

    let mut records = Vec::with_capacity(values.len());
    let mut rejected = 0;

    for value in values {
        let raw: RawRecord = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed record from {}: {}", store, e);
                rejected += 1;
                continue;
            }
        };

        match raw.into_record(store, run_stamp) {
            Some(record) => records.push(record),
            None => {
                warn!("Skipping {} record with neither URL nor name", store);
                rejected += 1;
            }
        }
    }

    Ok(StoreBatch {
        store: store.to_string(),
        records,
        rejected,
    })
}

/// Reads every configured store's adapter file.
///
/// A store whose file is missing or unreadable is skipped with a log line;
/// the run continues with whichever stores did deliver.
pub fn ingest_all(config: &PipelineConfig, run_stamp: &str) -> Vec<StoreBatch> {
    let mut batches = Vec::new();

    for entry in &config.tiendas {
        let path = config.store_file(entry);
        if !path.exists() {
            warn!(
                "No adapter output for {} at {}, skipping store",
                entry.nombre,
                path.display()
            );
            continue;
        }

        match read_adapter_file(&path, &entry.nombre, run_stamp) {
            Ok(batch) => {
                info!(
                    "{}: {} records read, {} rejected",
                    entry.nombre,
                    batch.records.len(),
                    batch.rejected
                );
                batches.push(batch);
            }
            Err(e) => {
                error!("Failed to ingest {}: {:#}", entry.nombre, e);
            }
        }
    }

    batches
}
