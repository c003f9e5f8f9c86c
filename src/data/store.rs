use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, AsArray};
use arrow::compute::{cast, concat_batches, max, min};
use arrow::datatypes::{DataType, Field, Int64Type, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::loader::load_parquet;
use super::model::{find_column, is_text_type};
use super::schema::CATEGORICAL_COLUMNS;

// ---------------------------------------------------------------------------
// Type optimisation
// ---------------------------------------------------------------------------

fn dictionary_type() -> DataType {
    DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8))
}

/// Narrowest integer type holding every value in `[lo, hi]`.
fn narrow_int_type(lo: i64, hi: i64) -> DataType {
    if lo >= i8::MIN as i64 && hi <= i8::MAX as i64 {
        DataType::Int8
    } else if lo >= i16::MIN as i64 && hi <= i16::MAX as i64 {
        DataType::Int16
    } else if lo >= i32::MIN as i64 && hi <= i32::MAX as i64 {
        DataType::Int32
    } else {
        DataType::Int64
    }
}

/// Shrink a batch before it is written:
/// * Float64 → Float32
/// * Int64 → the narrowest of Int8 / Int16 / Int32 that holds the column's
///   min and max (all-null columns are left alone)
/// * categorical text columns → `Dictionary(Int32, Utf8)`
pub fn optimize_types(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let target = match column.data_type() {
            DataType::Float64 => DataType::Float32,
            DataType::Int64 => {
                let ints = column.as_primitive::<Int64Type>();
                match (min(ints), max(ints)) {
                    (Some(lo), Some(hi)) => narrow_int_type(lo, hi),
                    _ => DataType::Int64,
                }
            }
            DataType::Utf8 if CATEGORICAL_COLUMNS.contains(&field.name().as_str()) => {
                dictionary_type()
            }
            other => other.clone(),
        };

        let column = if &target == column.data_type() {
            Arc::clone(column)
        } else {
            cast(column.as_ref(), &target)
                .with_context(|| format!("converting {} to {target}", field.name()))?
        };
        fields.push(field.as_ref().clone().with_data_type(target));
        columns.push(column);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context("rebuilding batch")
}

/// Inverse of [`optimize_types`]: integers back to Int64, floats to Float64,
/// dictionaries to Utf8, all fields nullable.
fn widen_types(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let target = match column.data_type() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 => DataType::Int64,
            DataType::Float16 | DataType::Float32 => DataType::Float64,
            dt if is_text_type(dt) => DataType::Utf8,
            other => other.clone(),
        };
        let column = if &target == column.data_type() {
            Arc::clone(column)
        } else {
            cast(column.as_ref(), &target)
                .with_context(|| format!("widening {} to {target}", field.name()))?
        };
        fields.push(Field::new(field.name(), target, true));
        columns.push(column);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context("rebuilding batch")
}

/// Concatenate batches that may have been optimised differently. Column
/// names must match position by position.
pub fn concat_widened(batches: &[RecordBatch]) -> Result<RecordBatch> {
    let widened = batches
        .iter()
        .map(widen_types)
        .collect::<Result<Vec<_>>>()?;
    let Some(first) = widened.first() else {
        bail!("no batches to combine");
    };
    let schema = first.schema();

    for (i, batch) in widened.iter().enumerate().skip(1) {
        let other = batch.schema();
        let same_names = schema.fields().len() == other.fields().len()
            && schema
                .fields()
                .iter()
                .zip(other.fields())
                .all(|(a, b)| a.name() == b.name());
        if !same_names {
            bail!("batch {i} has different columns than batch 0");
        }
        for (a, b) in schema.fields().iter().zip(other.fields()) {
            if a.data_type() != b.data_type() {
                bail!(
                    "column {} is {} in batch 0 but {} in batch {i}",
                    a.name(),
                    a.data_type(),
                    b.data_type()
                );
            }
        }
    }

    concat_batches(&schema, &widened).context("concatenating batches")
}

// ---------------------------------------------------------------------------
// Parquet writing
// ---------------------------------------------------------------------------

/// Write one batch to `path` with Snappy compression, replacing the file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).context("creating parquet writer")?;
    writer.write(batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events.parquet".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write through a temp file in the same directory, then rename over `path`,
/// so a crash mid-write never leaves a truncated output behind.
fn write_parquet_atomic(path: &Path, batch: &RecordBatch) -> Result<()> {
    let tmp = temp_sibling(path);
    write_parquet(&tmp, batch)?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("moving {} into place", tmp.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Checkpointed append
// ---------------------------------------------------------------------------

/// Incrementally built Parquet output.
///
/// The first [`ParquetStore::append`] replaces whatever is at `path`; later
/// calls read the file back, concatenate, re-optimise and rewrite it.
#[derive(Debug)]
pub struct ParquetStore {
    path: PathBuf,
    created: bool,
}

impl ParquetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            created: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything has been written by this store yet.
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Persist `batch`; returns the number of rows now in the file.
    pub fn append(&mut self, batch: &RecordBatch) -> Result<usize> {
        let combined = if self.created {
            let existing = load_parquet(&self.path)?;
            concat_widened(&[existing, batch.clone()])?
        } else {
            batch.clone()
        };
        let optimized = optimize_types(&combined)?;
        write_parquet_atomic(&self.path, &optimized)?;

        if self.created {
            log::info!(
                "Appended {} events (total in file: {})",
                batch.num_rows(),
                optimized.num_rows()
            );
        } else {
            log::info!("Created new file with {} events", optimized.num_rows());
        }
        self.created = true;
        Ok(optimized.num_rows())
    }
}

// ---------------------------------------------------------------------------
// Output summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSummary {
    pub rows: usize,
    pub bytes: u64,
    /// Min and max of the `SQLDATE` column, when present.
    pub sqldate_range: Option<(i64, i64)>,
}

impl StoreSummary {
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Describe a Parquet file written by [`ParquetStore`].
pub fn summarize(path: &Path) -> Result<StoreSummary> {
    let bytes = std::fs::metadata(path)
        .with_context(|| format!("reading metadata of {}", path.display()))?
        .len();
    let batch = load_parquet(path)?;

    let sqldate_range = match find_column(&batch.schema(), "SQLDATE") {
        Some(idx) => {
            let dates = cast(batch.column(idx).as_ref(), &DataType::Int64)
                .context("reading SQLDATE")?;
            let dates = dates.as_primitive::<Int64Type>();
            min(dates).zip(max(dates))
        }
        None => None,
    };

    Ok(StoreSummary {
        rows: batch.num_rows(),
        bytes,
        sqldate_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn events(ids: Vec<i64>, dates: Vec<i64>, country: Vec<&str>) -> RecordBatch {
        let n = ids.len();
        let schema = Arc::new(Schema::new(vec![
            Field::new("GLOBALEVENTID", DataType::Int64, true),
            Field::new("SQLDATE", DataType::Int64, true),
            Field::new("GoldsteinScale", DataType::Float64, true),
            Field::new("ActionGeo_CountryCode", DataType::Utf8, true),
            Field::new("SOURCEURL", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(Int64Array::from(dates)),
                Arc::new(Float64Array::from(vec![1.5; n])),
                Arc::new(StringArray::from(country)),
                Arc::new(StringArray::from(vec!["https://example.com"; n])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn optimize_picks_narrowest_types() {
        let batch = events(vec![1, 100], vec![20250301, 20250302], vec!["US", "FR"]);
        let optimized = optimize_types(&batch).unwrap();
        let schema = optimized.schema();

        assert_eq!(schema.field(0).data_type(), &DataType::Int8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int32);
        assert_eq!(schema.field(2).data_type(), &DataType::Float32);
        assert_eq!(schema.field(3).data_type(), &dictionary_type());
        // Non-categorical text stays plain.
        assert_eq!(schema.field(4).data_type(), &DataType::Utf8);
    }

    #[test]
    fn narrow_int_boundaries() {
        assert_eq!(narrow_int_type(-128, 127), DataType::Int8);
        assert_eq!(narrow_int_type(-129, 0), DataType::Int16);
        assert_eq!(narrow_int_type(0, 32_768), DataType::Int32);
        assert_eq!(narrow_int_type(0, i32::MAX as i64 + 1), DataType::Int64);
    }

    #[test]
    fn differently_optimized_batches_concatenate() {
        let small = optimize_types(&events(vec![1], vec![20250301], vec!["US"])).unwrap();
        let large = optimize_types(&events(vec![70_000], vec![20250302], vec!["FR"])).unwrap();
        let combined = concat_widened(&[small, large]).unwrap();
        assert_eq!(combined.num_rows(), 2);
        assert_eq!(combined.schema().field(0).data_type(), &DataType::Int64);
    }

    #[test]
    fn store_replaces_then_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.parquet");
        std::fs::write(&path, b"stale contents").unwrap();

        let mut store = ParquetStore::new(&path);
        assert!(!store.is_created());
        assert_eq!(
            store
                .append(&events(vec![1, 2], vec![20250301, 20250301], vec!["US", "US"]))
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .append(&events(vec![3], vec![20250305], vec!["DE"]))
                .unwrap(),
            3
        );

        let summary = summarize(&path).unwrap();
        assert_eq!(summary.rows, 3);
        assert!(summary.bytes > 0);
        assert_eq!(summary.sqldate_range, Some((20250301, 20250305)));
        assert!(!temp_sibling(&path).exists());
    }
}
