//! The incremental merge engine: per-step left joins, checkpoint spilling and
//! finalization.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array};
use arrow::compute::{cast, concat_batches, take};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, warn};

use crate::config::MergeConfig;
use crate::error::{MergeError, MergeResult};
use crate::table::{SUBJECT_KEY, key_array};

/// Engine state: one `Loaded` transition per absorbed component; the
/// finalized state is reached by consuming the engine in
/// [`AccumulatorEngine::finalize`].
enum EngineState {
    Empty,
    Loaded {
        table: RecordBatch,
        components: usize,
    },
}

/// Owns the growing wide table and its on-disk checkpoint.
///
/// The first absorbed component becomes the accumulator verbatim and anchors
/// the row set; every later component is left-joined into it on the subject
/// key. After each step the table is spilled to a Parquet checkpoint and read
/// straight back, so the engine only ever holds one freshly materialized
/// accumulator plus the component being merged, independent of how many
/// components came before.
pub struct AccumulatorEngine {
    checkpoint_path: PathBuf,
    state: EngineState,
}

impl AccumulatorEngine {
    /// Creates an engine writing checkpoints to the given path.
    ///
    /// A leftover checkpoint from an interrupted run is untrustworthy and is
    /// deleted here, never resumed.
    pub fn new(checkpoint_path: PathBuf) -> MergeResult<Self> {
        if checkpoint_path.exists() {
            debug!(path = %checkpoint_path.display(), "removing stale checkpoint");
            fs::remove_file(&checkpoint_path)?;
        }
        Ok(Self {
            checkpoint_path,
            state: EngineState::Empty,
        })
    }

    /// Number of components absorbed so far.
    pub fn components(&self) -> usize {
        match &self.state {
            EngineState::Empty => 0,
            EngineState::Loaded { components, .. } => *components,
        }
    }

    /// Current accumulator shape as `(rows, cols)`, if any.
    pub fn shape(&self) -> Option<(usize, usize)> {
        match &self.state {
            EngineState::Empty => None,
            EngineState::Loaded { table, .. } => Some((table.num_rows(), table.num_columns())),
        }
    }

    /// Folds one namespaced component into the accumulator and checkpoints.
    ///
    /// Returns the accumulator shape after the step. The in-memory result of
    /// the join is dropped and replaced by the checkpoint read-back, which
    /// discards any intermediate buffers built during the merge.
    pub fn absorb(&mut self, component: RecordBatch) -> MergeResult<(usize, usize)> {
        let components = self.components();
        let merged = match std::mem::replace(&mut self.state, EngineState::Empty) {
            EngineState::Empty => component,
            EngineState::Loaded { table, .. } => {
                debug!(
                    accumulator_cols = table.num_columns(),
                    component_cols = component.num_columns(),
                    "merging component into accumulator"
                );
                left_join(&table, &component)?
            }
        };

        write_parquet(&self.checkpoint_path, &merged)?;
        drop(merged);
        let table = read_parquet(&self.checkpoint_path)?;

        let shape = (table.num_rows(), table.num_columns());
        self.state = EngineState::Loaded {
            table,
            components: components + 1,
        };
        Ok(shape)
    }

    /// Writes the final outputs and consumes the engine.
    ///
    /// Fails with [`MergeError::EmptyMerge`] when nothing was absorbed. The
    /// checkpoint is removed once the final table is durable; a failure to
    /// remove it is only worth a warning.
    pub fn finalize(self, config: &MergeConfig) -> MergeResult<RecordBatch> {
        let EngineState::Loaded { table, components } = self.state else {
            return Err(MergeError::EmptyMerge);
        };

        debug!(
            components,
            rows = table.num_rows(),
            cols = table.num_columns(),
            "writing final outputs"
        );
        write_parquet(&config.parquet_path(), &table)?;
        if config.write_csv {
            write_csv(&config.csv_path(), &table)?;
        }

        if let Err(error) = fs::remove_file(&self.checkpoint_path) {
            warn!(path = %self.checkpoint_path.display(), %error, "failed to remove checkpoint");
        }

        Ok(table)
    }
}

/// Strict left join of `acc` with `component` on the subject key.
///
/// Every accumulator row is preserved exactly once, in order; component keys
/// absent from the accumulator are dropped; accumulator keys absent from the
/// component get nulls in the new columns. The component's key column is
/// consumed by the join and not duplicated into the output.
pub fn left_join(acc: &RecordBatch, component: &RecordBatch) -> MergeResult<RecordBatch> {
    let acc_keys = key_array(acc, "accumulator")?;
    let comp_keys = key_array(component, "component")?;

    // First occurrence wins; the loader already guarantees unique keys.
    let mut lookup: HashMap<i64, u32> = HashMap::with_capacity(comp_keys.len());
    for i in 0..comp_keys.len() {
        lookup.entry(comp_keys.value(i)).or_insert(i as u32);
    }

    let indices: UInt32Array = (0..acc_keys.len())
        .map(|i| lookup.get(&acc_keys.value(i)).copied())
        .collect();

    let mut fields: Vec<Field> = acc
        .schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    let mut columns: Vec<ArrayRef> = acc.columns().to_vec();

    for (field, column) in component.schema().fields().iter().zip(component.columns()) {
        if field.name() == SUBJECT_KEY {
            continue;
        }
        // Keys missing from the component surface as nulls.
        fields.push(field.as_ref().clone().with_nullable(true));
        columns.push(take(column.as_ref(), &indices, None)?);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}

/// Writes a batch as a single Parquet file, replacing any existing file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> MergeResult<()> {
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

/// Reads a Parquet file back into one materialized batch.
pub fn read_parquet(path: &Path) -> MergeResult<RecordBatch> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();

    let mut batches = Vec::new();
    for batch in builder.build()? {
        batches.push(batch?);
    }
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    concat_batches(&schema, &batches).map_err(Into::into)
}

/// Writes a batch as CSV, expanding dictionary columns back to plain text.
fn write_csv(path: &Path, batch: &RecordBatch) -> MergeResult<()> {
    let batch = undictionary(batch)?;
    let file = File::create(path)?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(file);
    writer.write(&batch)?;
    Ok(())
}

fn undictionary(batch: &RecordBatch) -> MergeResult<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(batch.num_columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if matches!(field.data_type(), DataType::Dictionary(_, _)) {
            fields.push(field.as_ref().clone().with_data_type(DataType::Utf8));
            columns.push(cast(column, &DataType::Utf8)?);
        } else {
            fields.push(field.as_ref().clone());
            columns.push(column.clone());
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(Into::into)
}
