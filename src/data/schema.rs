use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

/// Physical type of a column in a GDELT 1.0 daily export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Text,
}

impl ColumnKind {
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Int => DataType::Int64,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Text => DataType::Utf8,
        }
    }
}

use ColumnKind::{Float, Int, Text};

/// Column order of a daily `YYYYMMDD.export.CSV` file (58 tab-separated
/// fields, no header row).
///
/// Event codes are read as integers, matching how the columns are usually
/// typed downstream, so rules like `EventRootCode not in [20, 21]` compare
/// numerically.
pub const EVENT_COLUMNS: &[(&str, ColumnKind)] = &[
    ("GLOBALEVENTID", Int),
    ("SQLDATE", Int),
    ("MonthYear", Int),
    ("Year", Int),
    ("FractionDate", Float),
    ("Actor1Code", Text),
    ("Actor1Name", Text),
    ("Actor1CountryCode", Text),
    ("Actor1KnownGroupCode", Text),
    ("Actor1EthnicCode", Text),
    ("Actor1Religion1Code", Text),
    ("Actor1Religion2Code", Text),
    ("Actor1Type1Code", Text),
    ("Actor1Type2Code", Text),
    ("Actor1Type3Code", Text),
    ("Actor2Code", Text),
    ("Actor2Name", Text),
    ("Actor2CountryCode", Text),
    ("Actor2KnownGroupCode", Text),
    ("Actor2EthnicCode", Text),
    ("Actor2Religion1Code", Text),
    ("Actor2Religion2Code", Text),
    ("Actor2Type1Code", Text),
    ("Actor2Type2Code", Text),
    ("Actor2Type3Code", Text),
    ("IsRootEvent", Int),
    ("EventCode", Int),
    ("EventBaseCode", Int),
    ("EventRootCode", Int),
    ("QuadClass", Int),
    ("GoldsteinScale", Float),
    ("NumMentions", Int),
    ("NumSources", Int),
    ("NumArticles", Int),
    ("AvgTone", Float),
    ("Actor1Geo_Type", Int),
    ("Actor1Geo_FullName", Text),
    ("Actor1Geo_CountryCode", Text),
    ("Actor1Geo_ADM1Code", Text),
    ("Actor1Geo_Lat", Float),
    ("Actor1Geo_Long", Float),
    ("Actor1Geo_FeatureID", Text),
    ("Actor2Geo_Type", Int),
    ("Actor2Geo_FullName", Text),
    ("Actor2Geo_CountryCode", Text),
    ("Actor2Geo_ADM1Code", Text),
    ("Actor2Geo_Lat", Float),
    ("Actor2Geo_Long", Float),
    ("Actor2Geo_FeatureID", Text),
    ("ActionGeo_Type", Int),
    ("ActionGeo_FullName", Text),
    ("ActionGeo_CountryCode", Text),
    ("ActionGeo_ADM1Code", Text),
    ("ActionGeo_Lat", Float),
    ("ActionGeo_Long", Float),
    ("ActionGeo_FeatureID", Text),
    ("DATEADDED", Int),
    ("SOURCEURL", Text),
];

/// Columns kept by the collector unless told otherwise.
pub const DEFAULT_COLUMNS: &[&str] = &[
    "GLOBALEVENTID",
    "SQLDATE",
    "DATEADDED",
    "MonthYear",
    "Year",
    "FractionDate",
    "Actor1Name",
    "Actor2Name",
    "Actor1CountryCode",
    "Actor2CountryCode",
    "Actor1Type1Code",
    "EventCode",
    "EventRootCode",
    "EventBaseCode",
    "GoldsteinScale",
    "NumMentions",
    "NumSources",
    "NumArticles",
    "AvgTone",
    "ActionGeo_Lat",
    "ActionGeo_Long",
    "ActionGeo_CountryCode",
    "ActionGeo_ADM1Code",
    "ActionGeo_FullName",
    "SOURCEURL",
];

/// Low-cardinality columns stored dictionary-encoded when they hold text.
pub const CATEGORICAL_COLUMNS: &[&str] = &[
    "Actor1CountryCode",
    "Actor2CountryCode",
    "ActionGeo_CountryCode",
    "EventCode",
    "EventRootCode",
    "EventBaseCode",
];

/// Arrow schema of a parsed export; every field is nullable.
pub fn event_schema() -> SchemaRef {
    let fields: Vec<Field> = EVENT_COLUMNS
        .iter()
        .map(|(name, kind)| Field::new(*name, kind.data_type(), true))
        .collect();
    Arc::new(Schema::new(fields))
}

pub fn default_columns() -> Vec<String> {
    DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
}
