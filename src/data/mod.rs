/// Data layer: row collections, loading, and Parquet persistence.
///
/// Architecture:
/// ```text
///  .export.CSV(.zip) / .parquet / .csv / .json
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RecordBatch
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │    model      │  Scalar cells, ColumnView, column lookup
///   └──────────────┘
///        │  cameo: optional EventCode → EventDescription
///        │  (filtered by crate::filter)
///        ▼
///   ┌──────────┐
///   │  store    │  optimise dtypes → checkpointed Parquet append
///   └──────────┘
/// ```

pub mod cameo;
pub mod loader;
pub mod model;
pub mod schema;
pub mod store;
