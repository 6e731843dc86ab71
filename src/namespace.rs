//! Per-component column renaming.

use std::sync::Arc;

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;

use crate::error::MergeResult;
use crate::table::SUBJECT_KEY;

/// Separator between the original column name and its component namespace.
const NAMESPACE_SEPARATOR: &str = "__";

/// Renames every non-key column to `<original>__<component>`.
///
/// Deterministic and collision-free by construction as long as component
/// names are unique, which filename derivation guarantees. Arrays are shared;
/// only the schema is rewritten.
pub fn suffix_non_key(batch: &RecordBatch, component: &str) -> MergeResult<RecordBatch> {
    let fields: Vec<_> = batch
        .schema()
        .fields()
        .iter()
        .map(|field| {
            if field.name() == SUBJECT_KEY {
                field.as_ref().clone()
            } else {
                let name = format!("{}{NAMESPACE_SEPARATOR}{component}", field.name());
                field.as_ref().clone().with_name(name)
            }
        })
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), batch.columns().to_vec())
        .map_err(Into::into)
}
