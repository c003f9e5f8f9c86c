use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::FilterError;

// ---------------------------------------------------------------------------
// Scalar – a single cell or rule literal
// ---------------------------------------------------------------------------

/// A dynamically-typed value: either a rule literal or a cell read from a
/// row collection. Rule literals are only ever `Integer`, `Float` or `String`.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => write!(f, "{s}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Null => write!(f, "<null>"),
        }
    }
}

impl Scalar {
    /// Short type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::String(_) => "string",
            Scalar::Integer(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Bool(_) => "boolean",
            Scalar::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Order two non-null values of compatible types.
    ///
    /// Integers and floats compare numerically; strings compare without
    /// regard to case. Returns `None` for incompatible pairs and for nulls.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Integer(a), Scalar::Integer(b)) => Some(a.cmp(b)),
            (Scalar::String(a), Scalar::String(b)) => {
                Some(a.to_lowercase().cmp(&b.to_lowercase()))
            }
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ColumnView – one column normalised to a small set of physical types
// ---------------------------------------------------------------------------

/// A column cast to one of four canonical Arrow types so cells can be read
/// as [`Scalar`]s regardless of how narrowly the data was stored.
#[derive(Debug, Clone)]
pub enum ColumnView {
    Int(Int64Array),
    Float(Float64Array),
    Text(StringArray),
    Bool(BooleanArray),
}

impl ColumnView {
    /// Normalise an Arrow column. Integer widths collapse to Int64, floats to
    /// Float64, dictionary and large/view strings to Utf8. Temporal columns
    /// are rendered as text.
    pub fn new(name: &str, array: &ArrayRef) -> Result<Self, FilterError> {
        let target = match array.data_type() {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => DataType::Int64,
            DataType::Float16 | DataType::Float32 | DataType::Float64 => DataType::Float64,
            DataType::Boolean => DataType::Boolean,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => DataType::Utf8,
            DataType::Dictionary(_, value) if is_text_type(value) => DataType::Utf8,
            DataType::Date32
            | DataType::Date64
            | DataType::Timestamp(_, _)
            | DataType::Time32(_)
            | DataType::Time64(_) => DataType::Utf8,
            other => {
                return Err(FilterError::UnsupportedColumn {
                    column: name.to_string(),
                    data_type: other.to_string(),
                })
            }
        };

        let array = if array.data_type() == &target {
            Arc::clone(array)
        } else {
            cast(array.as_ref(), &target)?
        };

        Ok(match target {
            DataType::Int64 => ColumnView::Int(array.as_primitive::<Int64Type>().clone()),
            DataType::Float64 => ColumnView::Float(array.as_primitive::<Float64Type>().clone()),
            DataType::Boolean => ColumnView::Bool(array.as_boolean().clone()),
            _ => ColumnView::Text(array.as_string::<i32>().clone()),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnView::Int(a) => a.len(),
            ColumnView::Float(a) => a.len(),
            ColumnView::Text(a) => a.len(),
            ColumnView::Bool(a) => a.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one cell. NaN floats read as `Null`.
    pub fn cell(&self, row: usize) -> Scalar {
        match self {
            ColumnView::Int(a) if a.is_valid(row) => Scalar::Integer(a.value(row)),
            ColumnView::Float(a) if a.is_valid(row) && !a.value(row).is_nan() => {
                Scalar::Float(a.value(row))
            }
            ColumnView::Text(a) if a.is_valid(row) => Scalar::String(a.value(row).to_string()),
            ColumnView::Bool(a) if a.is_valid(row) => Scalar::Bool(a.value(row)),
            _ => Scalar::Null,
        }
    }
}

/// Whether values of this type read back as strings, dictionaries included.
pub fn is_text_type(data_type: &DataType) -> bool {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => true,
        DataType::Dictionary(_, value) => is_text_type(value),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Column lookup / projection helpers
// ---------------------------------------------------------------------------

/// Index of the column whose name matches `name` ignoring ASCII case.
pub fn find_column(schema: &Schema, name: &str) -> Option<usize> {
    schema
        .fields()
        .iter()
        .position(|f| f.name().eq_ignore_ascii_case(name))
}

/// Keep the requested columns that exist, in request order. Missing columns
/// are silently dropped; an empty request keeps every column.
pub fn select_columns(batch: &RecordBatch, columns: &[String]) -> Result<RecordBatch, FilterError> {
    if columns.is_empty() {
        return Ok(batch.clone());
    }
    let schema = batch.schema();
    let mut indices = Vec::with_capacity(columns.len());
    for name in columns {
        if let Some(idx) = find_column(&schema, name) {
            if !indices.contains(&idx) {
                indices.push(idx);
            }
        }
    }
    Ok(batch.project(&indices)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{DictionaryArray, Float32Array, Int8Array};
    use arrow::datatypes::{Field, Int32Type};

    #[test]
    fn numeric_values_compare_across_widths() {
        assert_eq!(
            Scalar::Integer(5).compare(&Scalar::Float(5.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Scalar::Float(-10.5).compare(&Scalar::Integer(-10)),
            Some(Ordering::Less)
        );
        assert_eq!(Scalar::String("5".into()).compare(&Scalar::Integer(5)), None);
        assert_eq!(Scalar::Null.compare(&Scalar::Null), None);
    }

    #[test]
    fn strings_compare_without_case() {
        assert_eq!(
            Scalar::String("US".into()).compare(&Scalar::String("us".into())),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn narrow_columns_are_widened() {
        let ints: ArrayRef = Arc::new(Int8Array::from(vec![Some(3), None]));
        let view = ColumnView::new("n", &ints).unwrap();
        assert_eq!(view.cell(0), Scalar::Integer(3));
        assert_eq!(view.cell(1), Scalar::Null);

        let floats: ArrayRef = Arc::new(Float32Array::from(vec![2.5, f32::NAN]));
        let view = ColumnView::new("f", &floats).unwrap();
        assert_eq!(view.cell(0), Scalar::Float(2.5));
        assert_eq!(view.cell(1), Scalar::Null);

        let dict: DictionaryArray<Int32Type> = vec!["US", "FR", "US"].into_iter().collect();
        let dict: ArrayRef = Arc::new(dict);
        let view = ColumnView::new("c", &dict).unwrap();
        assert_eq!(view.cell(2), Scalar::String("US".into()));
    }

    #[test]
    fn column_lookup_ignores_case() {
        let schema = Schema::new(vec![
            Field::new("NumMentions", DataType::Int64, true),
            Field::new("ActionGeo_Lat", DataType::Float64, true),
        ]);
        assert_eq!(find_column(&schema, "NUMMENTIONS"), Some(0));
        assert_eq!(find_column(&schema, "actiongeo_lat"), Some(1));
        assert_eq!(find_column(&schema, "Missing"), None);
    }

    #[test]
    fn projection_keeps_request_order_and_skips_missing() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("A", DataType::Int64, true),
            Field::new("B", DataType::Int64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Int64Array::from(vec![2])),
            ],
        )
        .unwrap();
        let projected =
            select_columns(&batch, &["B".to_string(), "Z".to_string(), "A".to_string()]).unwrap();
        let names: Vec<_> = projected
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
