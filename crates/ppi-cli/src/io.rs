//! CSV targets input and results output.

use std::fs::File;
use std::path::Path;

use anyhow::Context;
use ppi_core::Target;
use ppi_scraper::{OutputRow, OutputSchema};

/// Read every target row, in file order.
pub(crate) fn read_targets(path: &Path) -> anyhow::Result<Vec<Target>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open targets file {}", path.display()))?;

    reader
        .deserialize::<Target>()
        .enumerate()
        .map(|(index, record)| {
            record.with_context(|| {
                format!("invalid targets row {} in {}", index + 2, path.display())
            })
        })
        .collect()
}

/// Streams result rows to a CSV file, header first.
pub(crate) struct ResultsWriter {
    writer: csv::Writer<File>,
    schema: OutputSchema,
}

impl ResultsWriter {
    /// Create the file (and its parent directory) and write the header.
    pub(crate) fn create(path: &Path, schema: OutputSchema) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory {}", parent.display())
            })?;
        }
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create results file {}", path.display()))?;
        writer.write_record(schema.header())?;
        Ok(Self { writer, schema })
    }

    pub(crate) fn write_row(&mut self, row: &OutputRow) -> anyhow::Result<()> {
        self.writer.write_record(self.schema.record(row))?;
        // Flush per row so a crash keeps everything collected so far.
        self.writer.flush()?;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
