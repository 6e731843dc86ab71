//! Run configuration for the merge pipeline.

use std::fs;
use std::path::PathBuf;

use crate::error::{MergeError, MergeResult};

/// Configuration for one merge run.
///
/// Values come from CLI flags or `NHANES_*` environment variables; the core
/// only sees this struct and never reads the process environment itself.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Directory scanned for `*_clean` component files.
    pub input_dir: PathBuf,

    /// Output base path; per-artifact extensions are appended to it.
    pub output_base: PathBuf,

    /// Also write the final table as CSV (can be very large for wide data).
    pub write_csv: bool,
}

impl MergeConfig {
    /// Creates a new configuration.
    pub fn new(input_dir: PathBuf, output_base: PathBuf, write_csv: bool) -> Self {
        Self {
            input_dir,
            output_base,
            write_csv,
        }
    }

    /// Path of the final merged Parquet table.
    pub fn parquet_path(&self) -> PathBuf {
        self.output_base.with_extension("parquet")
    }

    /// Path of the optional final CSV table.
    pub fn csv_path(&self) -> PathBuf {
        self.output_base.with_extension("csv")
    }

    /// Path of the on-disk accumulator checkpoint, superseded by the final
    /// output once the run completes.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.sibling("_tmp.parquet")
    }

    /// Path of the per-component audit report.
    pub fn report_path(&self) -> PathBuf {
        self.sibling("_merge_report.csv")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .output_base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_base.with_file_name(format!("{name}{suffix}"))
    }

    /// Validates the configured paths before scanning begins.
    ///
    /// The output parent directory is created if missing; a missing input
    /// directory is fatal.
    pub fn validate(&self) -> MergeResult<()> {
        if !self.input_dir.is_dir() {
            return Err(MergeError::Config(format!(
                "input directory not found: {}",
                self.input_dir.display()
            )));
        }

        if let Some(parent) = self.output_base.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: &str) -> MergeConfig {
        MergeConfig::new(PathBuf::from("/in"), PathBuf::from(base), false)
    }

    #[test]
    fn test_artifact_paths() {
        let config = config("/out/nhanes_1999_2018");

        assert_eq!(
            config.parquet_path(),
            PathBuf::from("/out/nhanes_1999_2018.parquet")
        );
        assert_eq!(config.csv_path(), PathBuf::from("/out/nhanes_1999_2018.csv"));
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("/out/nhanes_1999_2018_tmp.parquet")
        );
        assert_eq!(
            config.report_path(),
            PathBuf::from("/out/nhanes_1999_2018_merge_report.csv")
        );
    }

    #[test]
    fn test_validate_rejects_missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = MergeConfig::new(
            dir.path().join("does_not_exist"),
            dir.path().join("out"),
            false,
        );

        assert!(matches!(config.validate(), Err(MergeError::Config(_))));
    }

    #[test]
    fn test_validate_creates_output_parent() {
        let dir = tempfile::tempdir().unwrap();
        let config = MergeConfig::new(
            dir.path().to_path_buf(),
            dir.path().join("nested/deeper/out"),
            false,
        );

        config.validate().unwrap();
        assert!(dir.path().join("nested/deeper").is_dir());
    }
}
