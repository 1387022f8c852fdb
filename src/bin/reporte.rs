use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;

use babyahorro::config::PipelineConfig;
use babyahorro::models::RUN_DATE_FORMAT;
use babyahorro::processor::consolidator;
use babyahorro::report;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config_path = std::env::var("BABYAHORRO_CONFIG")
        .unwrap_or_else(|_| "configs/babyahorro.toml".to_string());
    let config = PipelineConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load pipeline configuration from {}", config_path))?;

    let consolidated_path = config.consolidated_path();
    let rows = consolidator::read_consolidated(&consolidated_path)
        .context("No consolidated data found; run the pipeline first")?;
    info!(
        "{} consolidated rows read from {}",
        rows.len(),
        consolidated_path.display()
    );

    let price_report = report::build_report(&rows);
    if price_report.analyzed == 0 {
        info!("Nothing to analyze after filtering; no report written");
        return Ok(());
    }
    info!(
        "Analyzing {} diaper offers, {} rows excluded as non-diaper",
        price_report.analyzed, price_report.excluded
    );

    let generated_at = Local::now().format(RUN_DATE_FORMAT).to_string();
    let text = report::render_report(&price_report, &generated_at);
    println!("{text}");

    let report_path = config.report_path();
    if let Some(parent) = report_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(report_path, &text)
        .with_context(|| format!("Failed to write {}", report_path.display()))?;
    info!("📊 Report saved to {}", report_path.display());

    Ok(())
}
