//! Error types for the chart pipeline.
//!
//! - [`ParseError`] - Raw extract reading errors
//! - [`TransformError`] - Sort, synthesis and pivot errors
//! - [`ClassificationError`] - Entity lookup errors
//! - [`ValidationError`] - Chart JSON schema errors
//! - [`StatsError`] - Key statistics file errors
//! - [`ConfigError`] - Environment configuration errors
//! - [`ChartError`] - Top-level, one per chart run
//!
//! Every lower-level error converts into [`ChartError`] via `From`, so `?`
//! works across module boundaries.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Pipeline stages
// =============================================================================

/// Stage of the chart pipeline that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Synthesis,
    TemporalFilter,
    NullFilter,
    Normalize,
    ZeroPairPruning,
    Pivot,
    Sort,
    Shape,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Synthesis => "synthesis",
            Stage::TemporalFilter => "temporal filter",
            Stage::NullFilter => "null filter",
            Stage::Normalize => "label normalization",
            Stage::ZeroPairPruning => "zero-pair pruning",
            Stage::Pivot => "category pivot",
            Stage::Sort => "sort",
            Stage::Shape => "shape",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Raw extract errors
// =============================================================================

/// Errors while reading a raw extract from disk.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Failed to read file.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV.
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported file extension.
    #[error("Unsupported extract format: {0}")]
    UnsupportedFormat(PathBuf),

    /// A required column is missing from the header row.
    #[error("{file}: missing required column '{column}'")]
    MissingColumn { file: String, column: String },

    /// A cell could not be converted to its column type.
    #[error("Line {line}, column '{column}' (value '{value}'): {message}")]
    InvalidCell {
        line: usize,
        column: String,
        value: String,
        message: String,
    },

    /// Empty file.
    #[error("Extract is empty")]
    EmptyFile,
}

// =============================================================================
// Transformation errors
// =============================================================================

/// Errors raised by the sorter, the synthesizer and the chart pipeline.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A column referenced by the caller is absent from the table.
    #[error("{stage}: column not found: {column}")]
    ColumnNotFound { stage: Stage, column: String },

    /// Two rows landed on the same pivot cell.
    #[error(
        "category pivot: duplicate key (debtor '{debtor}', year {year}, creditor '{creditor}') for category '{category}'"
    )]
    DuplicateKey {
        debtor: String,
        year: String,
        creditor: String,
        category: String,
    },

    /// Aggregation operator name is not known.
    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(String),

    /// A cell does not hold the type the stage needs.
    #[error("{stage}: invalid value '{value}' in column '{column}'")]
    InvalidValue {
        stage: Stage,
        column: String,
        value: String,
    },

    /// The classification resolver itself failed.
    #[error("synthesis: {0}")]
    Classification(#[from] ClassificationError),
}

impl TransformError {
    pub fn column_not_found(stage: Stage, column: impl Into<String>) -> Self {
        TransformError::ColumnNotFound {
            stage,
            column: column.into(),
        }
    }
}

// =============================================================================
// Classification errors
// =============================================================================

/// Errors from a classification resolver.
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// Lookup failed and the caller asked for `OnNotFound::Error`.
    #[error("Entity not found: '{id}' (as {from})")]
    NotFound { id: String, from: String },

    /// Classification table could not be loaded.
    #[error("Failed to load classifications: {0}")]
    Load(#[from] ParseError),
}

// =============================================================================
// Validation errors
// =============================================================================

/// Chart JSON does not match its schema.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema validation failed.
    #[error("Validation failed: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// Embedded schema itself is broken.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

// =============================================================================
// Key statistics errors
// =============================================================================

/// Errors while merge-updating the key statistics file.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Key stats IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key stats JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Existing file holds something other than a JSON object.
    #[error("Key stats file is not a JSON object: {0}")]
    NotAnObject(PathBuf),
}

// =============================================================================
// Configuration errors
// =============================================================================

/// Invalid environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

// =============================================================================
// Chart errors (top-level)
// =============================================================================

/// Failure of a single chart run.
///
/// A chart failing never aborts the batch; the runner records it and moves on.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Extract error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Key stats error: {0}")]
    Stats(#[from] StatsError),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV output error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    /// Chart needs a value the data does not contain.
    #[error("Missing data: {0}")]
    MissingData(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for raw extract reading.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for table transformations.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for a chart run.
pub type ChartResult<T> = Result<T, ChartError>;
