//! Input directory scanning, component naming and processing order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MergeError, MergeResult};

/// File name prefixes excluded from the scan: documentation, dictionaries,
/// example sheets and editor lock-file markers.
const EXCLUDE_PREFIXES: &[&str] = &[
    "dictionary_",
    "nhanes_inconsistencies_documentation",
    "example_",
    "m -",
    "w -",
    "~$",
];

/// Recognized component file suffixes.
const CLEAN_SUFFIXES: &[&str] = &["_clean.csv", "_clean.xlsx", "_clean.xls"];

/// Anchor component prefix; sorted first so its key set defines the row set
/// every other component is left-joined against.
const ANCHOR_PREFIX: &str = "demographics_clean";

/// One source file selected by the scan, in processing order.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Full path of the source file.
    pub path: PathBuf,
    /// File name, used for logging and the merge report.
    pub file_name: String,
    /// Component name derived from the file stem; doubles as the column
    /// namespace suffix.
    pub component: String,
}

fn is_excluded(name: &str) -> bool {
    let lname = name.to_lowercase();
    EXCLUDE_PREFIXES.iter().any(|p| lname.starts_with(p))
}

/// Derives the component name from a file stem.
///
/// Lowercased, trailing `_clean` / `_unclean` stripped, whitespace collapsed
/// to underscores. Component names are unique as long as file names are,
/// which keeps the namespace suffix collision-free.
pub fn component_from_stem(stem: &str) -> String {
    let s = stem.trim().to_lowercase();
    let s = s
        .strip_suffix("_clean")
        .or_else(|| s.strip_suffix("_unclean"))
        .unwrap_or(&s);
    s.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Scans the input directory and returns component files in processing order.
///
/// The demographics component sorts first whenever present; all other files
/// follow lexicographically by lowercased name so reruns are reproducible.
pub fn scan_input_dir(dir: &Path) -> MergeResult<Vec<ScannedFile>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        let lname = name.to_lowercase();
        if !CLEAN_SUFFIXES.iter().any(|s| lname.ends_with(s)) || is_excluded(&name) {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        files.push(ScannedFile {
            component: component_from_stem(stem),
            file_name: name,
            path,
        });
    }

    files.sort_by_key(|f| {
        let lname = f.file_name.to_lowercase();
        (u8::from(!lname.starts_with(ANCHOR_PREFIX)), lname)
    });

    if files.is_empty() {
        return Err(MergeError::NoMatchingFiles(dir.to_path_buf()));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "SEQN\n1\n").unwrap();
    }

    #[test]
    fn test_component_from_stem() {
        assert_eq!(component_from_stem("Demographics_clean"), "demographics");
        assert_eq!(component_from_stem("blood pressure_unclean"), "blood_pressure");
        assert_eq!(component_from_stem("  Lab Results  "), "lab_results");
        assert_eq!(component_from_stem("rxq_rx_clean"), "rxq_rx");
    }

    #[test]
    fn test_scan_orders_anchor_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "albumin_clean.csv");
        touch(dir.path(), "demographics_clean.csv");
        touch(dir.path(), "zinc_clean.xlsx");

        let files = scan_input_dir(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            ["demographics_clean.csv", "albumin_clean.csv", "zinc_clean.xlsx"]
        );
    }

    #[test]
    fn test_scan_skips_excluded_and_unmatched() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "dictionary_labs_clean.csv");
        touch(dir.path(), "example_demo_clean.csv");
        touch(dir.path(), "~$labs_clean.xlsx");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "labs.csv");
        touch(dir.path(), "labs_clean.csv");

        let files = scan_input_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].component, "labs");
    }

    #[test]
    fn test_scan_fails_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            scan_input_dir(dir.path()),
            Err(MergeError::NoMatchingFiles(_))
        ));
    }
}
