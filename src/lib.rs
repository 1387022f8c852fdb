//! Consolidation pipeline behind the BabyAhorro diaper price comparator.
//!
//! Store scrapers run elsewhere and drop one JSON file per store; this crate
//! turns those files into a canonical, historized dataset. Records are
//! validated and normalized, every offer gets a comparable per-unit price,
//! one observation per product and store is appended to the SQLite price
//! history, and the consolidated CSV, search/report views and price alerts
//! are built on top of the latest run.

pub mod alerts;
pub mod config;
pub mod ingest;
pub mod models;
pub mod processor;
pub mod query;
pub mod report;
pub mod storage;
