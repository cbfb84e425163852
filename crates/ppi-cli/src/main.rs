mod browser;
mod io;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use ppi_core::{AppConfig, RetailerConfig};
use ppi_scraper::{run_batch, DebugCapture, OutputSchema};
use tracing_subscriber::EnvFilter;

use crate::browser::ChromiumSession;

#[derive(Debug, Parser)]
#[command(name = "ppi")]
#[command(about = "Scrape product prices by running per-retailer browser flows")]
struct Cli {
    /// Retailer flow definitions (YAML).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Targets CSV with `retailer_id` and `product_id` columns.
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Results CSV to write.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Run the browser without a window.
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,
}

impl Cli {
    fn apply(self, mut config: AppConfig) -> AppConfig {
        if let Some(path) = self.config {
            config.retailers_path = path;
        }
        if let Some(path) = self.targets {
            config.targets_path = path;
        }
        if let Some(path) = self.output {
            config.output_path = path;
        }
        if self.headless {
            config.headless = true;
        } else if self.headed {
            config.headless = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_config = ppi_core::load_app_config()?;
    let config = Cli::parse().apply(env_config);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    run(&config).await
}

async fn run(config: &AppConfig) -> anyhow::Result<()> {
    // Configuration problems abort before the browser starts.
    let definitions = ppi_core::load_retailers(&config.retailers_path)?;
    let retailers = ppi_core::normalize_retailers(&definitions)?;
    let targets = io::read_targets(&config.targets_path)?;
    tracing::info!(
        retailers = retailers.len(),
        targets = targets.len(),
        config = %config.retailers_path.display(),
        "loaded retailers and targets"
    );

    let schema = OutputSchema::from_retailers(retailers.values());
    let mut writer = io::ResultsWriter::create(&config.output_path, schema)?;
    let capture = DebugCapture::new(&config.debug_dir);

    let longest_step_ms = retailers
        .values()
        .map(RetailerConfig::longest_timeout_ms)
        .max()
        .unwrap_or_default();
    let session = ChromiumSession::launch(
        config.headless,
        config.chrome_path.as_deref(),
        browser::request_timeout(longest_step_ms),
    )
    .await
    .context("failed to launch browser")?;

    let result = async {
        let page = session.new_page().await?;
        run_batch(&page, &retailers, &targets, Some(&capture), |row| {
            writer.write_row(row)
        })
        .await
    }
    .await;

    // Always release the browser, even when the batch failed.
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "failed to close browser cleanly");
    }

    let summary = result?;
    writer.finish()?;
    tracing::info!(
        output = %config.output_path.display(),
        rows = summary.rows,
        "results written"
    );
    Ok(())
}
