use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use babyahorro::alerts;
use babyahorro::config::PipelineConfig;
use babyahorro::ingest::{self, StoreBatch};
use babyahorro::models::{ProductRecord, RUN_DATE_FORMAT};
use babyahorro::processor::consolidator::{self, ConsolidatedRow};
use babyahorro::processor::pricing;
use babyahorro::storage::PriceDb;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = std::env::var("BABYAHORRO_CONFIG")
        .unwrap_or_else(|_| "configs/babyahorro.toml".to_string());
    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {}", config_path))?;

    let started = Local::now();
    let run_stamp = started.format(RUN_DATE_FORMAT).to_string();

    info!("🚀 Starting BabyAhorro consolidation run {}", run_stamp);
    info!(
        "{} stores configured, data directory: {}",
        config.tiendas.len(),
        config.pipeline.data_dir.display()
    );

    // Read every adapter's output
    let mut batches = ingest::ingest_all(&config, &run_stamp);
    let total_read: usize = batches.iter().map(|b| b.records.len()).sum();
    if total_read == 0 {
        warn!("⚠️ No adapter produced any records; nothing to consolidate");
        return Ok(());
    }

    // Fill missing unit counts and attach comparable per-unit prices before
    // anything is persisted
    for batch in &mut batches {
        pricing::enrich_records(&mut batch.records);
    }

    // Append one observation per record to the price history
    let db_path = config.db_path();
    let db = PriceDb::open(&db_path)
        .with_context(|| format!("Failed to open price database at {}", db_path.display()))?;
    let base_urls = config.base_urls();

    let mut persisted = 0;
    let mut stores_ok = 0;
    for batch in &batches {
        match db.record_observations(&run_stamp, &batch.records, &base_urls) {
            Ok(count) => {
                info!("✅ {}: {} price observations appended", batch.store, count);
                persisted += count;
                stores_ok += 1;
            }
            Err(e) => {
                error!("❌ {}: batch aborted: {:#}", batch.store, e);
                // Continue with other stores even if one fails
            }
        }
    }

    if let Some(stats) = db.history_stats()? {
        info!(
            "History now holds {} observations of {} products across {} runs",
            stats.total_observations, stats.tracked_products, stats.distinct_runs
        );
    }

    // Consolidated export with cross-store lowest-price flags
    let records: Vec<ProductRecord> = batches
        .iter()
        .flat_map(|b| b.records.iter().cloned())
        .collect();
    let rows = consolidator::build_consolidated(&records);
    let export_path = config.consolidated_path();
    consolidator::write_consolidated_csv(&export_path, &rows)
        .with_context(|| format!("Failed to write {}", export_path.display()))?;
    info!("📊 Consolidated CSV written to {}", export_path.display());

    // Price alerts against the fresh snapshot
    match alerts::check_subscriptions(&db, started.naive_local()) {
        Ok(triggered) => {
            for alert in &triggered {
                info!(
                    "🔔 Alert for {}: {} at ${} in {}",
                    alert.subscription.email, alert.product_name, alert.found_price, alert.store
                );
            }
        }
        Err(e) => error!("❌ Alert check failed: {:#}", e),
    }

    print_run_summary(&batches, &rows, stores_ok, persisted);
    info!(
        "🎉 Run finished in {}s",
        (Local::now() - started).num_seconds()
    );

    Ok(())
}

fn print_run_summary(batches: &[StoreBatch], rows: &[ConsolidatedRow], stores_ok: usize, persisted: usize) {
    info!("\n=== Consolidation Summary ===");
    for batch in batches {
        let with_price = batch.records.iter().filter(|r| r.precio.is_some()).count();
        info!(
            "{}: {} products ({} with price, {} rejected)",
            batch.store,
            batch.records.len(),
            with_price,
            batch.rejected
        );
    }

    let flagged = rows.iter().filter(|r| r.es_precio_mas_bajo).count();
    info!(
        "✅ {} of {} stores persisted, {} observations written",
        stores_ok,
        batches.len(),
        persisted
    );
    info!(
        "📊 {} records consolidated, {} flagged as lowest in their group",
        rows.len(),
        flagged
    );

    let mut cheapest: Vec<&ConsolidatedRow> =
        rows.iter().filter(|r| r.precio_por_unidad.is_some()).collect();
    cheapest.sort_by_key(|r| r.precio_por_unidad);
    if !cheapest.is_empty() {
        info!("Top offers by unit price:");
        for (i, row) in cheapest.iter().take(5).enumerate() {
            info!(
                "  {}. ${}/unidad - {} ({})",
                i + 1,
                row.precio_por_unidad.unwrap_or_default(),
                row.nombre,
                row.tienda
            );
        }
    }
}
