//! Sequential merge pipeline: scan, load, optimize, namespace, absorb.

use tracing::{info, warn};

use crate::accumulator::AccumulatorEngine;
use crate::config::MergeConfig;
use crate::error::MergeResult;
use crate::loader::load_component;
use crate::namespace::suffix_non_key;
use crate::optimize::optimize_batch;
use crate::report::MergeReport;
use crate::scan::scan_input_dir;

/// Summary of a completed merge run.
#[derive(Debug)]
pub struct MergeSummary {
    /// Components successfully merged into the final table.
    pub components_merged: usize,
    /// Components skipped because they failed to load.
    pub components_skipped: usize,
    /// Final table row count.
    pub rows: usize,
    /// Final table column count.
    pub cols: usize,
}

/// Runs one merge over the configured input directory.
///
/// Components are processed strictly one at a time: load, optimize,
/// namespace, fold into the accumulator, checkpoint. A component that fails
/// to load is logged and skipped; it can never corrupt the already
/// checkpointed accumulator state. Fatal errors (bad configuration, nothing
/// to merge, unwritable outputs) propagate to the caller.
pub fn run(config: &MergeConfig) -> MergeResult<MergeSummary> {
    config.validate()?;

    let files = scan_input_dir(&config.input_dir)?;
    info!(
        files = files.len(),
        dir = %config.input_dir.display(),
        "scanned input directory"
    );

    let mut engine = AccumulatorEngine::new(config.checkpoint_path())?;
    let mut report = MergeReport::new();
    let mut skipped = 0usize;
    let total = files.len();

    for (i, file) in files.iter().enumerate() {
        info!(
            step = i + 1,
            total,
            file = %file.file_name,
            component = %file.component,
            "reading component"
        );

        let batch = match load_component(&file.path) {
            Ok(batch) => batch,
            Err(error) => {
                warn!(file = %file.file_name, %error, "skipping component");
                skipped += 1;
                continue;
            }
        };

        let batch = optimize_batch(&batch)?;
        let batch = suffix_non_key(&batch, &file.component)?;
        report.record(
            &file.component,
            &file.file_name,
            batch.num_rows(),
            batch.num_columns(),
        );

        let (rows, cols) = engine.absorb(batch)?;
        info!(rows, cols, "accumulator checkpointed");
    }

    let final_table = engine.finalize(config)?;
    let summary = MergeSummary {
        components_merged: report.len(),
        components_skipped: skipped,
        rows: final_table.num_rows(),
        cols: final_table.num_columns(),
    };

    let report_path = config.report_path();
    if let Err(error) = report.write_csv(&report_path) {
        warn!(path = %report_path.display(), %error, "failed to write merge report");
    }

    Ok(summary)
}
