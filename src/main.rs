//! CLI binary for the NHANES component merger.

use std::path::PathBuf;

use clap::Parser;
use nhanes_merge::{MergeConfig, run};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Merges per-component survey files into one wide Parquet table keyed by SEQN.
#[derive(Parser, Debug)]
#[command(name = "nhanes-merge")]
#[command(about = "Incremental, memory-bounded merger for survey component files")]
struct Args {
    /// Folder containing the *_clean component files
    #[arg(long = "dir", env = "NHANES_INPUT_DIR")]
    input_dir: PathBuf,

    /// Output base path; per-artifact extensions are appended
    #[arg(long = "out", env = "NHANES_OUTPUT_DIR")]
    output: PathBuf,

    /// Also write a final CSV (not recommended for very wide data)
    #[arg(
        long = "csv",
        env = "NHANES_MAKE_CSV",
        default_value = "false",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    write_csv: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = MergeConfig::new(args.input_dir, args.output, args.write_csv);

    match run(&config) {
        Ok(summary) => {
            info!(
                components = summary.components_merged,
                skipped = summary.components_skipped,
                rows = summary.rows,
                cols = summary.cols,
                output = %config.parquet_path().display(),
                "merge completed"
            );
        }
        Err(error) => {
            error!("{error}");
            std::process::exit(1);
        }
    }
}
