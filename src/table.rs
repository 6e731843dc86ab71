//! Raw-cell tables as read from disk and their conversion to Arrow batches.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, UInt32Array};
use arrow::compute::take;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{MergeError, MergeResult};

/// Canonical name of the subject key column.
pub const SUBJECT_KEY: &str = "SEQN";

/// Cell spellings treated as missing, compared case-insensitively.
const MISSING_MARKERS: &[&str] = &["na", "n/a", "nan", "null"];

/// A table as read from disk: normalized column names and untyped cells.
#[derive(Debug, Default)]
pub struct RawTable {
    /// Trimmed, uppercased column names.
    pub columns: Vec<String>,
    /// Row-major cells; `None` marks a missing value.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Normalizes a column header: trimmed and uppercased.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Normalizes a raw cell, mapping empty strings and missing markers to `None`.
pub fn normalize_cell(cell: &str) -> Option<String> {
    let cell = cell.trim();
    if cell.is_empty() || MISSING_MARKERS.iter().any(|m| cell.eq_ignore_ascii_case(m)) {
        return None;
    }
    Some(cell.to_string())
}

/// Coerces a key cell to `i64`, accepting integral floats ("73557.0").
fn coerce_key(cell: &str) -> Option<i64> {
    if let Ok(v) = cell.parse::<i64>() {
        return Some(v);
    }
    let v = cell.parse::<f64>().ok()?;
    (v.is_finite() && v.fract() == 0.0 && v.abs() <= i64::MAX as f64).then_some(v as i64)
}

/// Parses the subject key column of a raw table.
///
/// The key is never allowed to be null or non-numeric; a violation fails the
/// whole file with a schema error rather than producing ambiguous join keys.
pub fn parse_key_column(raw: &RawTable, key_idx: usize, context: &str) -> MergeResult<Vec<i64>> {
    let mut keys = Vec::with_capacity(raw.rows.len());
    for (i, row) in raw.rows.iter().enumerate() {
        let cell = row.get(key_idx).and_then(|c| c.as_deref());
        let Some(key) = cell.and_then(coerce_key) else {
            return Err(MergeError::schema(
                context,
                format!("row {}: {SUBJECT_KEY} value {cell:?} is not a valid subject key", i + 2),
            ));
        };
        keys.push(key);
    }
    Ok(keys)
}

/// Inferred storage type for one column's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Int,
    Float,
    Text,
}

/// Infers a column type over non-missing cells: all-i64 stays integer, any
/// float demotes to float, anything else is text.
fn infer_kind(cells: &[Option<&str>]) -> ColumnKind {
    let mut kind = ColumnKind::Int;
    for cell in cells.iter().flatten() {
        match kind {
            ColumnKind::Int => {
                if cell.parse::<i64>().is_err() {
                    kind = if cell.parse::<f64>().is_ok() {
                        ColumnKind::Float
                    } else {
                        ColumnKind::Text
                    };
                }
            }
            ColumnKind::Float => {
                if cell.parse::<f64>().is_err() {
                    kind = ColumnKind::Text;
                }
            }
            ColumnKind::Text => break,
        }
    }
    kind
}

fn build_column(cells: &[Option<&str>]) -> (DataType, ArrayRef) {
    match infer_kind(cells) {
        ColumnKind::Int => {
            let array: Int64Array = cells
                .iter()
                .map(|c| c.and_then(|s| s.parse::<i64>().ok()))
                .collect();
            (DataType::Int64, Arc::new(array))
        }
        ColumnKind::Float => {
            let array: Float64Array = cells
                .iter()
                .map(|c| c.and_then(|s| s.parse::<f64>().ok()))
                .collect();
            (DataType::Float64, Arc::new(array))
        }
        ColumnKind::Text => {
            let array: StringArray = cells.iter().copied().collect();
            (DataType::Utf8, Arc::new(array))
        }
    }
}

/// Builds a typed record batch from a raw table.
///
/// The subject key becomes the first column as non-null `Int64`; remaining
/// columns keep their source order with inferred types. Columns that carry no
/// values at all are dropped here, they only inflate width.
pub fn batch_from_raw(
    raw: &RawTable,
    key_idx: usize,
    keys: Vec<i64>,
) -> MergeResult<RecordBatch> {
    let mut fields = vec![Field::new(SUBJECT_KEY, DataType::Int64, false)];
    let mut columns: Vec<ArrayRef> = vec![Arc::new(Int64Array::from(keys))];

    for (j, name) in raw.columns.iter().enumerate() {
        if j == key_idx {
            continue;
        }
        let cells: Vec<Option<&str>> = raw
            .rows
            .iter()
            .map(|r| r.get(j).and_then(|c| c.as_deref()))
            .collect();
        if cells.iter().all(Option::is_none) {
            continue;
        }
        let (data_type, array) = build_column(&cells);
        fields.push(Field::new(name.clone(), data_type, true));
        columns.push(array);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}

/// Returns the subject key column of a batch as `Int64`.
pub fn key_array<'a>(batch: &'a RecordBatch, context: &str) -> MergeResult<&'a Int64Array> {
    let idx = batch.schema().index_of(SUBJECT_KEY)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| MergeError::schema(context, format!("{SUBJECT_KEY} column is not Int64")))
}

/// Resolves duplicate subject keys by keeping exactly one row per key.
///
/// Rows are stable-sorted by key and the first occurrence wins. This is a
/// deterministic tie-break, not a merge of the duplicate records; sources with
/// legitimate multi-row-per-subject data must use the aggregation path
/// instead. Tables without duplicates pass through untouched, preserving
/// source row order.
pub fn dedup_by_key(batch: RecordBatch, context: &str) -> MergeResult<RecordBatch> {
    let picked = {
        let keys = key_array(&batch, context)?;
        let mut seen = HashSet::with_capacity(keys.len());
        if keys.values().iter().all(|k| seen.insert(*k)) {
            return Ok(batch);
        }

        let mut order: Vec<u32> = (0..keys.len() as u32).collect();
        order.sort_by_key(|&i| keys.value(i as usize));

        seen.clear();
        order
            .into_iter()
            .filter(|&i| seen.insert(keys.value(i as usize)))
            .map(Some)
            .collect::<UInt32Array>()
    };

    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), &picked, None))
        .collect::<Result<Vec<_>, _>>()?;
    RecordBatch::try_new(batch.schema(), columns).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(columns: &[&str], rows: &[&[Option<&str>]]) -> RawTable {
        RawTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_normalize_cell_missing_markers() {
        assert_eq!(normalize_cell("  7.5 "), Some("7.5".to_string()));
        assert_eq!(normalize_cell(""), None);
        assert_eq!(normalize_cell("  "), None);
        assert_eq!(normalize_cell("NA"), None);
        assert_eq!(normalize_cell("NaN"), None);
        assert_eq!(normalize_cell("null"), None);
    }

    #[test]
    fn test_coerce_key_accepts_integral_floats() {
        assert_eq!(coerce_key("73557"), Some(73557));
        assert_eq!(coerce_key("73557.0"), Some(73557));
        assert_eq!(coerce_key("73557.5"), None);
        assert_eq!(coerce_key("abc"), None);
    }

    #[test]
    fn test_parse_key_column_rejects_missing_keys() {
        let raw = raw(&["SEQN", "X"], &[&[Some("1"), Some("a")], &[None, Some("b")]]);
        let result = parse_key_column(&raw, 0, "labs_clean.csv");
        assert!(matches!(result, Err(MergeError::Schema { .. })));
    }

    #[test]
    fn test_batch_from_raw_infers_types_and_drops_empty_columns() {
        let raw = raw(
            &["SEQN", "AGE", "BMI", "NOTE", "EMPTY"],
            &[
                &[Some("1"), Some("34"), Some("21.5"), Some("ok"), None],
                &[Some("2"), Some("55"), None, None, None],
            ],
        );
        let keys = parse_key_column(&raw, 0, "t").unwrap();
        let batch = batch_from_raw(&raw, 0, keys).unwrap();

        let schema = batch.schema();
        let names: Vec<_> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, ["SEQN", "AGE", "BMI", "NOTE"]);
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_dedup_keeps_first_row_after_key_sort() {
        let raw = raw(
            &["SEQN", "VISIT"],
            &[
                &[Some("2"), Some("late")],
                &[Some("1"), Some("first")],
                &[Some("2"), Some("early")],
            ],
        );
        let keys = parse_key_column(&raw, 0, "t").unwrap();
        let batch = batch_from_raw(&raw, 0, keys).unwrap();
        let deduped = dedup_by_key(batch, "t").unwrap();

        assert_eq!(deduped.num_rows(), 2);
        let keys = key_array(&deduped, "t").unwrap();
        assert_eq!(keys.values(), &[1, 2]);
        let visits = deduped
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(visits.value(0), "first");
        // First occurrence in source order wins for the duplicated key.
        assert_eq!(visits.value(1), "late");
    }

    #[test]
    fn test_dedup_preserves_order_without_duplicates() {
        let raw = raw(
            &["SEQN", "X"],
            &[&[Some("5"), Some("a")], &[Some("3"), Some("b")]],
        );
        let keys = parse_key_column(&raw, 0, "t").unwrap();
        let batch = batch_from_raw(&raw, 0, keys).unwrap();
        let deduped = dedup_by_key(batch, "t").unwrap();

        let keys = key_array(&deduped, "t").unwrap();
        assert_eq!(keys.values(), &[5, 3]);
    }
}
