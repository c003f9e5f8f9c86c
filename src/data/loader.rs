use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray,
    StringBuilder,
};
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::Scalar;
use super::schema::{event_schema, ColumnKind, EVENT_COLUMNS};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load an event table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.export.CSV` – GDELT 1.0 daily export (tab-separated, no header)
/// * `.zip`        – zipped GDELT daily export
/// * `.parquet`    – Parquet file, e.g. the collector's output
/// * `.csv`        – header row, column types inferred from the values
/// * `.json`       – `[{ "NumMentions": 7, ... }, ...]`
pub fn load_file(path: &Path) -> Result<RecordBatch> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if name.ends_with(".export.csv") {
        let file = std::fs::File::open(path).context("opening export file")?;
        return read_gdelt_export(file);
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "zip" => {
            let file = std::fs::File::open(path).context("opening export archive")?;
            read_gdelt_zip(file)
        }
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// GDELT export loader
// ---------------------------------------------------------------------------

enum ColumnBuilder {
    Int(Int64Builder),
    Float(Float64Builder),
    Text(StringBuilder),
}

impl ColumnBuilder {
    fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Int => ColumnBuilder::Int(Int64Builder::new()),
            ColumnKind::Float => ColumnBuilder::Float(Float64Builder::new()),
            ColumnKind::Text => ColumnBuilder::Text(StringBuilder::new()),
        }
    }

    /// Append one raw field. Empty or unparsable numeric fields become null.
    fn push(&mut self, raw: &str) {
        let raw = raw.trim();
        match self {
            ColumnBuilder::Int(b) => b.append_option(raw.parse::<i64>().ok()),
            ColumnBuilder::Float(b) => b.append_option(raw.parse::<f64>().ok()),
            ColumnBuilder::Text(b) if raw.is_empty() => b.append_null(),
            ColumnBuilder::Text(b) => b.append_value(raw),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Int(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Float(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Text(mut b) => Arc::new(b.finish()),
        }
    }
}

/// Parse a GDELT 1.0 daily export stream into a record batch with the fixed
/// export schema. Short rows are padded with nulls; invalid UTF-8 is replaced.
pub fn read_gdelt_export<R: Read>(reader: R) -> Result<RecordBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(reader);

    let mut columns: Vec<ColumnBuilder> = EVENT_COLUMNS
        .iter()
        .map(|(_, kind)| ColumnBuilder::new(*kind))
        .collect();

    for (row_no, result) in reader.byte_records().enumerate() {
        let record = result.with_context(|| format!("export row {row_no}"))?;
        if record.len() < EVENT_COLUMNS.len() {
            log::debug!(
                "export row {row_no}: {} fields, expected {}",
                record.len(),
                EVENT_COLUMNS.len()
            );
        }
        for (idx, builder) in columns.iter_mut().enumerate() {
            let field = record.get(idx).unwrap_or_default();
            builder.push(&String::from_utf8_lossy(field));
        }
    }

    let arrays: Vec<ArrayRef> = columns.into_iter().map(ColumnBuilder::finish).collect();
    RecordBatch::try_new(event_schema(), arrays).context("assembling export batch")
}

/// Read the first entry of a zipped daily export.
pub fn read_gdelt_zip<R: Read + Seek>(reader: R) -> Result<RecordBatch> {
    let mut archive = zip::ZipArchive::new(reader).context("opening zip archive")?;
    if archive.len() == 0 {
        bail!("zip archive is empty");
    }
    let entry = archive.by_index(0).context("reading zip entry")?;
    read_gdelt_export(entry)
}

/// Convenience for in-memory downloads.
pub fn read_gdelt_zip_bytes(bytes: &[u8]) -> Result<RecordBatch> {
    read_gdelt_zip(Cursor::new(bytes))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON layout, one object per row:
///
/// ```json
/// [
///   { "GLOBALEVENTID": 1, "NumMentions": 7, "Actor1Name": "POLICE" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RecordBatch> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut arrays = Vec::with_capacity(names.len());
    for name in &names {
        let values: Vec<Scalar> = records
            .iter()
            .map(|rec| rec.get(name).map(json_to_scalar).unwrap_or(Scalar::Null))
            .collect();
        let array = scalars_to_array(&values);
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    batch_from_columns(fields, arrays)
}

fn json_to_scalar(val: &JsonValue) -> Scalar {
    match val {
        JsonValue::String(s) => Scalar::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Scalar::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Scalar::Float(f)
            } else {
                Scalar::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Scalar::Bool(*b),
        JsonValue::Null => Scalar::Null,
        other => Scalar::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names. Each column becomes Int64,
/// Float64, Boolean or Utf8 depending on what all of its non-empty values
/// parse as. Text columns keep the raw text, so codes like `030` survive.
fn load_csv(path: &Path) -> Result<RecordBatch> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, column) in raw.iter_mut().enumerate() {
            column.push(record.get(col_idx).unwrap_or("").to_string());
        }
    }

    let mut fields = Vec::with_capacity(headers.len());
    let mut arrays = Vec::with_capacity(headers.len());
    for (name, cells) in headers.iter().zip(raw) {
        let values: Vec<Scalar> = cells.iter().map(|s| guess_scalar(s)).collect();
        let array = if values.iter().any(|v| matches!(v, Scalar::String(_))) {
            let text: StringArray = cells
                .iter()
                .map(|s| (!s.is_empty()).then_some(s.as_str()))
                .collect();
            Arc::new(text) as ArrayRef
        } else {
            scalars_to_array(&values)
        };
        fields.push(Field::new(name, array.data_type().clone(), true));
        arrays.push(array);
    }

    batch_from_columns(fields, arrays)
}

fn guess_scalar(s: &str) -> Scalar {
    let s = s.trim();
    if s.is_empty() {
        return Scalar::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Scalar::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Scalar::Float(f);
    }
    if s == "true" || s == "false" {
        return Scalar::Bool(s == "true");
    }
    Scalar::String(s.to_string())
}

// -- shared column building --

/// Pick the narrowest Arrow type that holds every non-null value: Int64 if
/// all are integers, Float64 if all are numeric, Boolean if all are bools,
/// otherwise Utf8 with values rendered as text.
fn scalars_to_array(values: &[Scalar]) -> ArrayRef {
    let non_null = || values.iter().filter(|v| !v.is_null());

    if non_null().all(|v| matches!(v, Scalar::Integer(_))) {
        let arr: Int64Array = values
            .iter()
            .map(|v| match v {
                Scalar::Integer(i) => Some(*i),
                _ => None,
            })
            .collect();
        return Arc::new(arr);
    }
    if non_null().all(|v| v.as_f64().is_some()) {
        let arr: Float64Array = values.iter().map(Scalar::as_f64).collect();
        return Arc::new(arr);
    }
    if non_null().all(|v| matches!(v, Scalar::Bool(_))) {
        let arr: BooleanArray = values
            .iter()
            .map(|v| match v {
                Scalar::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        return Arc::new(arr);
    }
    let arr: StringArray = values
        .iter()
        .map(|v| (!v.is_null()).then(|| v.to_string()))
        .collect();
    Arc::new(arr)
}

fn batch_from_columns(fields: Vec<Field>, arrays: Vec<ArrayRef>) -> Result<RecordBatch> {
    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    RecordBatch::try_new(schema, arrays).context("assembling record batch")
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load every row group of a Parquet file into one batch. Types are kept as
/// stored (narrow integers, dictionaries); the filter engine widens on read.
pub fn load_parquet(path: &Path) -> Result<RecordBatch> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening parquet file {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let schema = builder.schema().clone();
    let reader = builder.build().context("building parquet reader")?;

    let mut batches = Vec::new();
    for batch_result in reader {
        batches.push(batch_result.context("reading parquet record batch")?);
    }

    concat_batches(&schema, &batches).context("combining parquet record batches")
}
