//! Sequential batch runner over a single shared page.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ppi_core::{RetailerConfig, Target};

use crate::error::FlowError;
use crate::flow::{run_one, ResultRow};
use crate::output::{assemble_row, OutputRow};
use crate::page::Page;

/// Writes the page HTML and a screenshot after an unexpected failure.
#[derive(Debug, Clone)]
pub struct DebugCapture {
    dir: PathBuf,
}

impl DebugCapture {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `<retailer>_last.html` and `<retailer>_last.png`.
    ///
    /// Best effort: every failure is logged and swallowed so the original
    /// error is what gets reported.
    pub async fn capture(&self, page: &dyn Page, retailer_id: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to create debug directory"
            );
            return;
        }

        let stem = sanitize_file_stem(retailer_id);
        let html_path = self.dir.join(format!("{stem}_last.html"));
        match page.content().await {
            Ok(html) => {
                if let Err(e) = tokio::fs::write(&html_path, html).await {
                    tracing::warn!(
                        path = %html_path.display(),
                        error = %e,
                        "failed to write debug html"
                    );
                }
            }
            Err(e) => tracing::warn!(
                retailer = retailer_id,
                error = %e,
                "failed to read page content"
            ),
        }

        let png_path = self.dir.join(format!("{stem}_last.png"));
        if let Err(e) = page.screenshot(&png_path).await {
            tracing::warn!(
                path = %png_path.display(),
                error = %e,
                "failed to save debug screenshot"
            );
        }
    }
}

fn sanitize_file_stem(retailer_id: &str) -> String {
    let stem: String = retailer_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unknown".to_owned()
    } else {
        stem
    }
}

/// Outcome counts for a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rows: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl BatchSummary {
    fn record(&mut self, row: &OutputRow) {
        self.rows += 1;
        if row.is_success() {
            self.succeeded += 1;
        } else if row.is_not_found() {
            self.not_found += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Scrape every target in order, handing each assembled row to `write`.
///
/// Targets run one at a time against `page`. A failing target produces a
/// row with its error and the batch moves on; only `write` can stop it.
///
/// # Errors
///
/// Returns the first error produced by `write`.
pub async fn run_batch<E, F>(
    page: &dyn Page,
    retailers: &BTreeMap<String, RetailerConfig>,
    targets: &[Target],
    capture: Option<&DebugCapture>,
    mut write: F,
) -> Result<BatchSummary, E>
where
    F: FnMut(&OutputRow) -> Result<(), E>,
{
    let mut summary = BatchSummary::default();

    for (index, target) in targets.iter().enumerate() {
        let outcome = process_target(page, retailers, target).await;

        if let Err(err) = &outcome {
            if err.is_not_found() {
                tracing::info!(
                    index,
                    retailer = target.retailer_id().unwrap_or_default(),
                    product_id = target.product_id().unwrap_or_default(),
                    http_status = ?err.http_status(),
                    reason = %err,
                    "product not found"
                );
            } else {
                tracing::error!(
                    index,
                    retailer = target.retailer_id().unwrap_or_default(),
                    product_id = target.product_id().unwrap_or_default(),
                    error = %err,
                    "target failed"
                );
                if let (Some(capture), Some(retailer_id)) = (capture, target.retailer_id()) {
                    capture.capture(page, retailer_id).await;
                }
            }
        }

        let row = assemble_row(target, outcome);
        tracing::info!(
            index,
            retailer = row.retailer_id.as_deref().unwrap_or_default(),
            product_id = row.product_id.as_deref().unwrap_or_default(),
            final_price = row.final_price.as_deref().unwrap_or_default(),
            tries = ?row.tries,
            http_status = ?row.http_status,
            error = row.error.as_deref().unwrap_or_default(),
            "row assembled"
        );
        summary.record(&row);
        write(&row)?;
    }

    tracing::info!(
        rows = summary.rows,
        succeeded = summary.succeeded,
        not_found = summary.not_found,
        failed = summary.failed,
        "batch complete"
    );
    Ok(summary)
}

async fn process_target(
    page: &dyn Page,
    retailers: &BTreeMap<String, RetailerConfig>,
    target: &Target,
) -> Result<ResultRow, FlowError> {
    let retailer_id = target.retailer_id().ok_or(FlowError::MissingRetailerId)?;
    let config = retailers
        .get(retailer_id)
        .ok_or_else(|| FlowError::UnknownRetailer(retailer_id.to_owned()))?;
    if target.product_id().is_none() {
        return Err(FlowError::MissingProductId);
    }
    run_one(page, retailer_id, config, target).await
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
