//! Table transformations.
//!
//! - Sort: pinned-first categorical ordering
//! - Synthesize: derived-aggregate entities from classified parts
//! - Pipeline: chart assembly (filter, normalize, prune, pivot, sort, shape)

pub mod pipeline;
pub mod sort;
pub mod synthesize;

pub use pipeline::{assemble, AssemblyReport, CategoryMap, ChartOutput, ChartSpec, Combine, Labels, OutputShape, YearRange};
pub use sort::{effective_order, sort, PinSpec, PinnedColumn};
pub use synthesize::{synthesize, AggregateOp, Aggregation, Synthesized, UnresolvableEntity};
