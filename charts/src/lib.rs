//! # debt-charts - Debt overview charts from International Debt Statistics
//!
//! Turns raw IDS observation extracts (one row per debtor × creditor ×
//! indicator × year) into chart-ready tables and compact JSON payloads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Extracts   │────▶│   Parser    │────▶│ Synthesize  │────▶│  Pipeline   │
//! │ (CSV/JSON)  │     │  (typed)    │     │ (+ Africa)  │     │ (per chart) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │ CSV + JSON  │◀────│  Validate   │◀───────────┘
//!                     │  (atomic)   │     │ (schema)    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use debt_charts::{charts::ChartRunner, config::Settings};
//!
//! let mut runner = ChartRunner::new(Settings::from_env()?);
//! let report = runner.run(None, chrono::Local::now().date_naive());
//! assert!(report.is_success());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Table, chart records, cell helpers
//! - [`parser`] - Extract reading with encoding detection
//! - [`classify`] - Entity classification resolver
//! - [`transform`] - Sorter, synthesizer and chart pipeline
//! - [`validation`] - Chart JSON schema validation
//! - [`charts`] - Chart catalogue and batch runner
//! - [`stats`] - Key statistics file
//! - [`output`] - Atomic file writing
//! - [`config`] - Environment settings
//! - [`logs`] - Run log

// Core modules
pub mod error;
pub mod models;

// Input
pub mod classify;
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Charts and output
pub mod charts;
pub mod output;
pub mod stats;

// Ambient
pub mod config;
pub mod logs;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ChartError, ChartResult, ClassificationError, ConfigError, ParseError, ParseResult, Stage,
    StatsError, TransformError, TransformResult, ValidationError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{ChartRecord, Table};

// =============================================================================
// Re-exports - Classification
// =============================================================================

pub use classify::{
    ClassFilter, ClassificationFact, ClassificationResolver, EntityPredicate, IdType, LookupResolver,
    OnNotFound,
};

// =============================================================================
// Re-exports - Transformations
// =============================================================================

pub use transform::{
    assemble, effective_order, sort, synthesize, AggregateOp, Aggregation, AssemblyReport, CategoryMap,
    ChartOutput, ChartSpec, Combine, Labels, OutputShape, PinSpec, PinnedColumn, Synthesized,
    UnresolvableEntity, YearRange,
};

// =============================================================================
// Re-exports - Charts
// =============================================================================

pub use charts::{ChartId, ChartRunner, ChartSummary, RunReport};
pub use config::Settings;
pub use stats::KeyStatsStore;
