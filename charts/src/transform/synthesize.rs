//! Derived-aggregate synthesis.
//!
//! Builds a synthetic entity (e.g. "Africa (excluding high income)") out of
//! the real entities a classification predicate selects, and appends its rows
//! to the dataset.
//!
//! ```text
//! entity  code  indicator  year  value        resolve + filter        group by every
//! Kenya   KEN   BLAT       2020  10      →    region == Africa   →    other column,
//! Ghana   GHA   BLAT       2020  20           income != High          aggregate value
//! World   WLD   BLAT       2020  900          (World unresolved)
//!
//!                            + Africa (excluding high income)  -  BLAT  2020  30
//! ```
//!
//! Entities the resolver does not know are usually aggregates themselves
//! (World, income groups) and never count towards the synthetic total. They
//! are reported back as [`UnresolvableEntity`] warnings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::classify::{ClassificationFact, ClassificationResolver, EntityPredicate};
use crate::error::{Stage, TransformError, TransformResult};
use crate::models::{cell_f64, cell_text, columns, number, CellKey, Table};

// =============================================================================
// Aggregations
// =============================================================================

/// Reduces the values of one group to a single value.
pub trait Aggregation {
    fn name(&self) -> &str;

    /// `values` is never empty.
    fn aggregate(&self, values: &[f64]) -> f64;
}

/// Built-in aggregation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    #[default]
    Sum,
    Mean,
    Min,
    Max,
    Count,
    Median,
}

impl FromStr for AggregateOp {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum" => Ok(AggregateOp::Sum),
            "mean" | "avg" | "average" => Ok(AggregateOp::Mean),
            "min" => Ok(AggregateOp::Min),
            "max" => Ok(AggregateOp::Max),
            "count" => Ok(AggregateOp::Count),
            "median" => Ok(AggregateOp::Median),
            _ => Err(TransformError::UnsupportedAggregation(s.to_string())),
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Aggregation for AggregateOp {
    fn name(&self) -> &str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Mean => "mean",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Count => "count",
            AggregateOp::Median => "median",
        }
    }

    fn aggregate(&self, values: &[f64]) -> f64 {
        match self {
            AggregateOp::Sum => values.iter().sum(),
            AggregateOp::Mean => values.iter().sum::<f64>() / values.len() as f64,
            AggregateOp::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            AggregateOp::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            AggregateOp::Count => values.len() as f64,
            AggregateOp::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        }
    }
}

// =============================================================================
// Synthesis
// =============================================================================

/// An entity left out of the candidate set because the resolver had no
/// classification for it. Not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvableEntity {
    pub entity_name: String,
    pub entity_code: Option<String>,
}

/// Result of [`synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    /// Input rows, unchanged, followed by the synthetic rows.
    pub table: Table,
    pub synthetic_rows: usize,
    pub unresolved: Vec<UnresolvableEntity>,
}

/// Append the synthetic entity `label` to `table`.
///
/// `table` needs `entity_name`, `entity_code` and `value`; every other column
/// is a grouping dimension. Synthetic rows carry `is_aggregate = true` and a
/// null `entity_code`. When nothing matches, the returned table is the input.
pub fn synthesize(
    table: &Table,
    resolver: &dyn ClassificationResolver,
    predicate: &dyn EntityPredicate,
    aggregation: &dyn Aggregation,
    label: &str,
) -> TransformResult<Synthesized> {
    let name_col = table.require(Stage::Synthesis, columns::ENTITY_NAME)?;
    let code_col = table.require(Stage::Synthesis, columns::ENTITY_CODE)?;
    let value_col = table.require(Stage::Synthesis, columns::VALUE)?;
    let flag_col = table.column_index(columns::IS_AGGREGATE);

    let is_synthetic = |row: &[Value]| flag_col.is_some_and(|c| row[c] == Value::Bool(true));

    // Resolve each distinct entity code once.
    let mut codes: Vec<String> = Vec::new();
    for row in table.rows().iter().filter(|r| !is_synthetic(r)) {
        if let Some(code) = row[code_col].as_str() {
            if !codes.iter().any(|c| c == code) {
                codes.push(code.to_string());
            }
        }
    }
    let facts: HashMap<String, ClassificationFact> = codes
        .iter()
        .cloned()
        .zip(resolver.classify(&codes)?)
        .filter_map(|(code, fact)| fact.map(|f| (code, f)))
        .collect();

    let dimensions: Vec<usize> = (0..table.columns().len())
        .filter(|&c| c != name_col && c != code_col && c != value_col && Some(c) != flag_col)
        .collect();

    let mut unresolved: Vec<UnresolvableEntity> = Vec::new();
    let mut group_index: BTreeMap<Vec<CellKey>, usize> = BTreeMap::new();
    let mut groups: Vec<(Vec<Value>, Vec<f64>)> = Vec::new();

    for row in table.rows().iter().filter(|r| !is_synthetic(r)) {
        let code = row[code_col].as_str();
        let Some(fact) = code.and_then(|c| facts.get(c)) else {
            let warning = UnresolvableEntity {
                entity_name: cell_text(&row[name_col]),
                entity_code: code.map(String::from),
            };
            if !unresolved.contains(&warning) {
                unresolved.push(warning);
            }
            continue;
        };

        let fact = ClassificationFact {
            entity_name: row[name_col].as_str().map(String::from),
            ..fact.clone()
        };
        if !predicate.matches(&fact) {
            continue;
        }
        let Some(value) = cell_f64(&row[value_col]) else {
            continue;
        };

        let key_cells: Vec<Value> = dimensions.iter().map(|&c| row[c].clone()).collect();
        let key: Vec<CellKey> = key_cells.iter().cloned().map(CellKey).collect();
        let idx = *group_index.entry(key).or_insert_with(|| {
            groups.push((key_cells, Vec::new()));
            groups.len() - 1
        });
        groups[idx].1.push(value);
    }

    if groups.is_empty() {
        return Ok(Synthesized {
            table: table.clone(),
            synthetic_rows: 0,
            unresolved,
        });
    }

    let mut out = table.clone();
    if flag_col.is_none() {
        out.add_column(columns::IS_AGGREGATE, Value::Bool(false));
    }
    let flag_col = out.column_index(columns::IS_AGGREGATE);

    let synthetic_rows = groups.len();
    for (key_cells, values) in groups {
        let mut row = vec![Value::Null; out.columns().len()];
        for (&c, cell) in dimensions.iter().zip(key_cells) {
            row[c] = cell;
        }
        row[name_col] = Value::String(label.to_string());
        row[code_col] = Value::Null;
        row[value_col] = number(aggregation.aggregate(&values));
        if let Some(c) = flag_col {
            row[c] = Value::Bool(true);
        }
        out.push_row(row);
    }

    Ok(Synthesized {
        table: out,
        synthetic_rows,
        unresolved,
    })
}
