//! Incremental, memory-bounded merger for NHANES-style survey components.
//!
//! Scans a directory of `*_clean.(csv|xlsx|xls)` component files keyed by the
//! subject identifier `SEQN` and folds them one at a time into a single wide
//! Parquet table. The demographics component anchors the row set; every other
//! component is left-joined against it. After each merge step the accumulator
//! is spilled to a Parquet checkpoint and read straight back, so peak memory
//! stays bounded by one checkpoint plus one component regardless of how many
//! files are merged.
//!
//! One-to-many medication files are reduced to one row per subject by
//! concatenating the drug name column; every other file is deduplicated to a
//! single row per key. Per-file failures are logged and skipped, never fatal.
//!
//! # Usage
//!
//! ```rust,no_run
//! use nhanes_merge::{MergeConfig, run};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MergeConfig::new(
//!         "data/clean".into(),
//!         "out/nhanes_1999_2018".into(),
//!         false,
//!     );
//!     let summary = run(&config)?;
//!     println!(
//!         "{} components -> {} rows x {} cols",
//!         summary.components_merged, summary.rows, summary.cols
//!     );
//!     Ok(())
//! }
//! ```

mod accumulator;
mod config;
mod error;
mod loader;
mod namespace;
mod optimize;
mod pipeline;
mod report;
mod scan;
mod table;

pub use accumulator::{AccumulatorEngine, left_join, read_parquet, write_parquet};
pub use config::MergeConfig;
pub use error::{MergeError, MergeResult};
pub use loader::{LoadStrategy, classify, load_component};
pub use namespace::suffix_non_key;
pub use optimize::optimize_batch;
pub use pipeline::{MergeSummary, run};
pub use report::{MergeReport, ReportRow};
pub use scan::{ScannedFile, component_from_stem, scan_input_dir};
pub use table::SUBJECT_KEY;
