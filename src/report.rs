//! Merge audit report: one row per successfully processed component.

use std::path::Path;

use serde::Serialize;

use crate::error::MergeResult;

/// One audit record, appended after a component is processed.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    /// Component name derived from the file stem.
    pub component: String,
    /// Source file name.
    pub file: String,
    /// Row count of the component after loading.
    pub rows: usize,
    /// Column count of the component after loading.
    pub cols: usize,
}

/// Ordered collection of report rows, written once after finalization.
#[derive(Debug, Default)]
pub struct MergeReport {
    rows: Vec<ReportRow>,
}

impl MergeReport {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one record for a processed component.
    pub fn record(&mut self, component: &str, file: &str, rows: usize, cols: usize) {
        self.rows.push(ReportRow {
            component: component.to_string(),
            file: file.to_string(),
            rows,
            cols,
        });
    }

    /// Number of recorded components.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no component was recorded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Recorded rows in processing order.
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Writes the report as CSV. Best effort: the caller logs a failure and
    /// never aborts the run over it.
    pub fn write_csv(&self, path: &Path) -> MergeResult<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
