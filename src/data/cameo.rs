use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use regex::Regex;

use super::model::{find_column, ColumnView, Scalar};

/// Column added by [`CameoCodes::add_descriptions`].
pub const EVENT_DESCRIPTION: &str = "EventDescription";

static WIDE_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("wide gap pattern"));
static CODE_THEN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+(.+)$").expect("code line pattern"));

/// CAMEO event code → description, e.g. `030` → `Express intent to cooperate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameoCodes {
    codes: BTreeMap<String, String>,
}

impl CameoCodes {
    /// Parse a code table: one header line, then `code  description` per line.
    /// Code and description are split on the first run of two or more spaces,
    /// or on the first whitespace when a line has no wider gap.
    pub fn parse(text: &str) -> Self {
        let mut codes = BTreeMap::new();
        for line in text.lines().skip(1).map(str::trim) {
            if line.is_empty() {
                continue;
            }
            let mut parts = WIDE_GAP.splitn(line, 2);
            let entry = match (parts.next(), parts.next()) {
                (Some(code), Some(description)) => Some((code, description)),
                _ => CODE_THEN_TEXT.captures(line).map(|caps| {
                    let (_, [code, description]) = caps.extract();
                    (code, description)
                }),
            };
            if let Some((code, description)) = entry {
                codes.insert(code.trim().to_string(), description.trim().to_string());
            }
        }
        Self { codes }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading CAMEO codes from {}", path.display()))?;
        let codes = Self::parse(&text);
        log::info!("Loaded {} CAMEO event codes from {}", codes.len(), path.display());
        Ok(codes)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.codes.get(code.trim()).map(String::as_str)
    }

    /// Look up a code read from an `EventCode` cell.
    ///
    /// Integer cells have lost their leading zeros, so they are tried padded
    /// to three digits and then to four: `30` finds `030`, `211` finds `0211`.
    pub fn describe(&self, cell: &Scalar) -> Option<&str> {
        match cell {
            Scalar::Integer(code) => self
                .get(&format!("{code:03}"))
                .or_else(|| self.get(&format!("{code:04}"))),
            Scalar::String(code) => self.get(code),
            _ => None,
        }
    }

    /// Append (or replace) a Utf8 `EventDescription` column derived from
    /// `EventCode`. Unknown codes and null cells give null descriptions. A
    /// batch without `EventCode` is returned unchanged.
    pub fn add_descriptions(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let schema = batch.schema();
        let Some(idx) = find_column(&schema, "EventCode") else {
            log::warn!("No EventCode column; event descriptions not added");
            return Ok(batch.clone());
        };
        let codes = ColumnView::new("EventCode", batch.column(idx))?;
        let descriptions: StringArray = (0..codes.len())
            .map(|row| self.describe(&codes.cell(row)))
            .collect();

        let unmatched = descriptions
            .null_count()
            .saturating_sub(batch.column(idx).null_count());
        if unmatched > 0 {
            log::debug!("{unmatched} event codes have no CAMEO description");
        }

        let mut fields = Vec::with_capacity(schema.fields().len() + 1);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            if !field.name().eq_ignore_ascii_case(EVENT_DESCRIPTION) {
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(column));
            }
        }
        fields.push(Field::new(EVENT_DESCRIPTION, DataType::Utf8, true));
        columns.push(Arc::new(descriptions));

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context("adding event descriptions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{AsArray, Int32Array, Int64Array};

    const TABLE: &str = "CAMEOEVENTCODE\tEVENTDESCRIPTION
01  MAKE PUBLIC STATEMENT
030  Express intent to cooperate, not specified below

0211  Appeal for economic cooperation
141  Demonstrate or rally
2041 Mass killings
";

    fn codes() -> CameoCodes {
        CameoCodes::parse(TABLE)
    }

    #[test]
    fn table_parses_after_header() {
        let codes = codes();
        assert_eq!(codes.len(), 5);
        assert_eq!(codes.get("01"), Some("MAKE PUBLIC STATEMENT"));
        assert_eq!(
            codes.get("030"),
            Some("Express intent to cooperate, not specified below")
        );
        // Single-space lines fall back to the first whitespace.
        assert_eq!(codes.get("2041"), Some("Mass killings"));
        assert_eq!(codes.get("CAMEOEVENTCODE"), None);
    }

    #[test]
    fn integer_codes_are_zero_padded() {
        let codes = codes();
        assert_eq!(
            codes.describe(&Scalar::Integer(30)),
            Some("Express intent to cooperate, not specified below")
        );
        assert_eq!(
            codes.describe(&Scalar::Integer(211)),
            Some("Appeal for economic cooperation")
        );
        assert_eq!(codes.describe(&Scalar::Integer(141)), Some("Demonstrate or rally"));
        assert_eq!(codes.describe(&Scalar::Integer(2041)), Some("Mass killings"));
        assert_eq!(
            codes.describe(&Scalar::String(" 030 ".into())),
            Some("Express intent to cooperate, not specified below")
        );
    }

    #[test]
    fn unknown_codes_describe_as_null() {
        let codes = codes();
        assert_eq!(codes.describe(&Scalar::Integer(999)), None);
        assert_eq!(codes.describe(&Scalar::String("30".into())), None);
        assert_eq!(codes.describe(&Scalar::Null), None);
    }

    #[test]
    fn descriptions_follow_event_codes() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("GLOBALEVENTID", DataType::Int64, false),
            Field::new("EventCode", DataType::Int32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(Int32Array::from(vec![Some(141), Some(999), None])),
            ],
        )
        .unwrap();

        let enriched = codes().add_descriptions(&batch).unwrap();
        assert_eq!(enriched.num_columns(), 3);
        let descriptions = enriched
            .column_by_name(EVENT_DESCRIPTION)
            .unwrap()
            .as_string::<i32>();
        assert_eq!(descriptions.value(0), "Demonstrate or rally");
        assert!(descriptions.is_null(1));
        assert!(descriptions.is_null(2));

        // Running it again replaces the column instead of duplicating it.
        let again = codes().add_descriptions(&enriched).unwrap();
        assert_eq!(again.num_columns(), 3);
    }

    #[test]
    fn batch_without_event_code_is_unchanged() {
        let schema = Arc::new(Schema::new(vec![Field::new(
            "GLOBALEVENTID",
            DataType::Int64,
            false,
        )]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        assert_eq!(codes().add_descriptions(&batch).unwrap(), batch);
    }
}
