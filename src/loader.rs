//! Per-file component loading: format dispatch, normalization and key
//! cardinality resolution.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use calamine::{Data, Reader};
use tracing::debug;

use crate::error::{MergeError, MergeResult};
use crate::table::{
    RawTable, SUBJECT_KEY, batch_from_raw, dedup_by_key, normalize_cell, normalize_column_name,
    parse_key_column,
};

/// How a source file's key cardinality is resolved.
///
/// A small closed set of strategies selected by [`classify`]; the policy is
/// auditable here instead of being scattered through the load path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One row per subject expected; duplicate keys are deduplicated by a
    /// deterministic first-after-sort tie-break.
    Direct,
    /// Multi-record-per-subject source reduced to one row per key by
    /// concatenating all non-null values of the designated attribute.
    AggregateConcat {
        /// The single attribute column kept on this path.
        attribute: String,
    },
}

/// File name markers identifying the one-to-many medication component.
const MULTI_RECORD_MARKERS: &[&str] = &["medication", "rxq", "rx_"];

/// The designated attribute kept on the aggregation path.
const MULTI_RECORD_ATTRIBUTE: &str = "RXDDRUG";

/// Delimiter between concatenated attribute values.
const CONCAT_SEPARATOR: &str = ", ";

/// Selects the load strategy for a source file.
///
/// The aggregation path is the one declared filename-driven exception: a file
/// whose name carries a medication marker and whose columns include the
/// designated attribute is treated as multi-record-per-subject.
pub fn classify(file_name: &str, columns: &[String]) -> LoadStrategy {
    let lname = file_name.to_lowercase();
    if MULTI_RECORD_MARKERS.iter().any(|m| lname.contains(m))
        && columns.iter().any(|c| c == MULTI_RECORD_ATTRIBUTE)
    {
        return LoadStrategy::AggregateConcat {
            attribute: MULTI_RECORD_ATTRIBUTE.to_string(),
        };
    }
    LoadStrategy::Direct
}

/// Loads one component file into a clean single-subject-per-row batch.
///
/// Column names are normalized, all-missing columns dropped, the subject key
/// canonicalized to `Int64`, and key cardinality resolved per the classified
/// [`LoadStrategy`]. Any error here is a skip-this-file signal for the
/// pipeline.
pub fn load_component(path: &Path) -> MergeResult<RecordBatch> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let raw = read_raw(path, &file_name)?;
    let key_idx = raw
        .columns
        .iter()
        .position(|c| c == SUBJECT_KEY)
        .ok_or_else(|| MergeError::schema(&file_name, format!("no {SUBJECT_KEY} column found")))?;

    match classify(&file_name, &raw.columns) {
        LoadStrategy::AggregateConcat { attribute } => {
            debug!(file = %file_name, %attribute, "aggregating multi-record component");
            aggregate_concat(&raw, key_idx, &attribute, &file_name)
        }
        LoadStrategy::Direct => {
            let keys = parse_key_column(&raw, key_idx, &file_name)?;
            let batch = batch_from_raw(&raw, key_idx, keys)?;
            dedup_by_key(batch, &file_name)
        }
    }
}

fn read_raw(path: &Path, file_name: &str) -> MergeResult<RawTable> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" => read_excel(path, file_name),
        other => Err(MergeError::UnsupportedFormat(format!(".{other}"))),
    }
}

fn read_csv(path: &Path) -> MergeResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(normalize_column_name)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            (0..columns.len())
                .map(|i| record.get(i).and_then(normalize_cell))
                .collect(),
        );
    }

    Ok(RawTable { columns, rows })
}

fn read_excel(path: &Path, file_name: &str) -> MergeResult<RawTable> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| MergeError::schema(file_name, "workbook has no sheets"))??;

    let mut row_iter = range.rows();
    let columns: Vec<String> = row_iter
        .next()
        .ok_or_else(|| MergeError::schema(file_name, "sheet is empty"))?
        .iter()
        .map(|c| normalize_column_name(&c.to_string()))
        .collect();

    let rows = row_iter
        .map(|row| {
            (0..columns.len())
                .map(|i| row.get(i).and_then(sheet_cell))
                .collect()
        })
        .collect();

    Ok(RawTable { columns, rows })
}

/// Converts a spreadsheet cell to a raw cell, formatting integral floats
/// without a fractional part so integer inference still applies.
fn sheet_cell(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => normalize_cell(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 9.0e15 {
                Some((*f as i64).to_string())
            } else {
                Some(f.to_string())
            }
        }
        other => normalize_cell(&other.to_string()),
    }
}

/// Aggregates a multi-record component to one row per key.
///
/// Keeps only the key and the designated attribute, discarding every other
/// column of the source; this narrowing is intentional. Values concatenate in
/// source row order, duplicates preserved; output rows sort by key.
fn aggregate_concat(
    raw: &RawTable,
    key_idx: usize,
    attribute: &str,
    file_name: &str,
) -> MergeResult<RecordBatch> {
    let attr_idx = raw
        .columns
        .iter()
        .position(|c| c == attribute)
        .ok_or_else(|| MergeError::schema(file_name, format!("no {attribute} column found")))?;

    let keys = parse_key_column(raw, key_idx, file_name)?;

    let mut grouped: BTreeMap<i64, String> = BTreeMap::new();
    for (row, key) in raw.rows.iter().zip(keys) {
        let Some(value) = row.get(attr_idx).and_then(|c| c.as_deref()) else {
            continue;
        };
        grouped
            .entry(key)
            .and_modify(|acc| {
                acc.push_str(CONCAT_SEPARATOR);
                acc.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new(SUBJECT_KEY, DataType::Int64, false),
        Field::new(attribute, DataType::Utf8, true),
    ]));
    let keys = Int64Array::from(grouped.keys().copied().collect::<Vec<_>>());
    let values: StringArray = grouped.values().map(Some).collect();

    RecordBatch::try_new(schema, vec![Arc::new(keys), Arc::new(values)]).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::key_array;
    use std::fs;

    fn write_csv(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_classify_requires_marker_and_attribute() {
        let meds = columns(&["SEQN", "RXDDRUG", "RXDDAYS"]);
        assert_eq!(
            classify("medications_clean.csv", &meds),
            LoadStrategy::AggregateConcat {
                attribute: "RXDDRUG".to_string()
            }
        );
        assert_eq!(classify("rxq_rx_clean.xlsx", &meds), LoadStrategy::AggregateConcat {
            attribute: "RXDDRUG".to_string()
        });

        // Marker without the attribute column falls back to the direct path.
        let no_attr = columns(&["SEQN", "RXDDAYS"]);
        assert_eq!(classify("medications_clean.csv", &no_attr), LoadStrategy::Direct);

        // Attribute without the marker stays direct as well.
        assert_eq!(classify("labs_clean.csv", &meds), LoadStrategy::Direct);
    }

    #[test]
    fn test_load_component_normalizes_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "labs_clean.csv",
            " seqn ,LBXTC\n2,180\n1,150\n2,200\n",
        );

        let batch = load_component(&path).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let keys = key_array(&batch, "t").unwrap();
        assert_eq!(keys.values(), &[1, 2]);
    }

    #[test]
    fn test_load_component_aggregates_medications() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "medications_clean.csv",
            "SEQN,RXDDRUG,RXDDAYS\n1,ASPIRIN,10\n1,INSULIN,20\n2,METFORMIN,30\n1,ASPIRIN,5\n",
        );

        let batch = load_component(&path).unwrap();
        assert_eq!(batch.num_rows(), 2);
        // Dosage columns are discarded on the aggregation path.
        assert_eq!(batch.num_columns(), 2);

        let drugs = batch
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        // Source row order, duplicates preserved.
        assert_eq!(drugs.value(0), "ASPIRIN, INSULIN, ASPIRIN");
        assert_eq!(drugs.value(1), "METFORMIN");
    }

    #[test]
    fn test_load_component_skips_null_attribute_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "rxq_rx_clean.csv",
            "SEQN,RXDDRUG\n1,ASPIRIN\n2,\n1,INSULIN\n",
        );

        let batch = load_component(&path).unwrap();
        // Subject 2 only had a null drug name, so it drops out entirely.
        assert_eq!(batch.num_rows(), 1);
        let keys = key_array(&batch, "t").unwrap();
        assert_eq!(keys.values(), &[1]);
    }

    #[test]
    fn test_load_component_missing_key_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "broken_clean.csv", "ID,VALUE\n1,2\n");

        assert!(matches!(
            load_component(&path),
            Err(MergeError::Schema { .. })
        ));
    }

    #[test]
    fn test_load_component_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "labs_clean.parquet", "not a table");

        assert!(matches!(
            load_component(&path),
            Err(MergeError::UnsupportedFormat(_))
        ));
    }
}
