//! Storage-representation shrinking for component tables.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::MergeResult;
use crate::table::SUBJECT_KEY;

/// Distinct-value cap above which a string column stays plain text.
const MAX_DICTIONARY_VALUES: usize = 200;

/// Distinct-to-total ratio cap for dictionary encoding; genuinely
/// high-cardinality free text is not worth the encoding overhead.
const DICTIONARY_RATIO: f64 = 0.5;

/// Shrinks each column's storage without changing logical values.
///
/// Floats narrow to `Float32` when every value round-trips exactly, integers
/// to the smallest width that fits the observed range, and low-cardinality
/// strings become `Int32`-keyed dictionaries. The subject key is never
/// altered; it must stay byte-comparable across all components. A second
/// pass over an already-optimized batch is a no-op.
pub fn optimize_batch(batch: &RecordBatch) -> MergeResult<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if field.name() != SUBJECT_KEY {
            if let Some(target) = narrowed_type(column) {
                fields.push(field.as_ref().clone().with_data_type(target.clone()));
                columns.push(cast(column, &target)?);
                continue;
            }
        }
        fields.push(field.as_ref().clone());
        columns.push(column.clone());
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}

/// Picks a narrower storage type for a column, or `None` to keep it as is.
fn narrowed_type(column: &ArrayRef) -> Option<DataType> {
    match column.data_type() {
        DataType::Float64 => {
            let values = column.as_any().downcast_ref::<Float64Array>()?;
            narrow_float(values)
        }
        DataType::Int64 => {
            let values = column.as_any().downcast_ref::<Int64Array>()?;
            narrow_int(values)
        }
        DataType::Utf8 => {
            let values = column.as_any().downcast_ref::<StringArray>()?;
            dictionary_type(values)
        }
        _ => None,
    }
}

fn narrow_float(values: &Float64Array) -> Option<DataType> {
    let lossless = values
        .iter()
        .flatten()
        .all(|v| v.is_nan() || (v as f32) as f64 == v);
    lossless.then_some(DataType::Float32)
}

fn narrow_int(values: &Int64Array) -> Option<DataType> {
    let mut min = i64::MAX;
    let mut max = i64::MIN;
    for v in values.iter().flatten() {
        min = min.min(v);
        max = max.max(v);
    }
    if min > max {
        // No observed values; the narrowest width trivially fits.
        return Some(DataType::Int8);
    }
    if min >= i64::from(i8::MIN) && max <= i64::from(i8::MAX) {
        Some(DataType::Int8)
    } else if min >= i64::from(i16::MIN) && max <= i64::from(i16::MAX) {
        Some(DataType::Int16)
    } else if min >= i64::from(i32::MIN) && max <= i64::from(i32::MAX) {
        Some(DataType::Int32)
    } else {
        None
    }
}

fn dictionary_type(values: &StringArray) -> Option<DataType> {
    let distinct: HashSet<&str> = values.iter().flatten().collect();
    let within_cap = distinct.len() <= MAX_DICTIONARY_VALUES
        && distinct.len() as f64 <= DICTIONARY_RATIO * values.len() as f64;
    within_cap
        .then(|| DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)))
}
