use std::path::PathBuf;

use arrow::error::ArrowError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Rule text errors
// ---------------------------------------------------------------------------

/// A rule whose text could not be turned into a predicate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("could not parse rule `{rule}`: {reason}")]
    Syntax { rule: String, reason: String },

    #[error("unknown operator in rule `{rule}`")]
    UnknownOperator { rule: String },
}

// ---------------------------------------------------------------------------
// Per-rule application errors
// ---------------------------------------------------------------------------

/// Failure while applying one rule. Never aborts a filtering pass.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("cannot compare {cell} values in column {column} with a {literal} literal")]
    TypeMismatch {
        column: String,
        cell: &'static str,
        literal: &'static str,
    },

    #[error("invalid value for `{operator}`: {reason}")]
    InvalidValue { operator: String, reason: String },

    #[error("column {column} has unsupported type {data_type}")]
    UnsupportedColumn { column: String, data_type: String },

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

// ---------------------------------------------------------------------------
// Rule configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported rule file format `{}`: use .json, .yaml or .yml", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON rule file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML rule file: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("duplicate filter rule name `{0}`")]
    DuplicateRule(String),
}
