//! Collect GDELT 1.0 daily event exports, narrow them with plain-English
//! filter rules and keep the survivors in a Parquet file.

pub mod collect;
pub mod data;
pub mod error;
pub mod filter;

/// Initialise `env_logger` at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
