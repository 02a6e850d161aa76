//! Domain models for the chart pipeline.
//!
//! - [`Table`] - Column-ordered snapshot of rows, the unit every stage consumes
//! - [`ChartRecord`] - Compact JSON record consumed by the charting frontend
//! - [`columns`] - Column names of raw extracts and chart tables
//! - Cell helpers - ordering and equality over JSON cells

pub mod table;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::cmp::Ordering;

pub use table::Table;

// =============================================================================
// Column names
// =============================================================================

/// Column names used by raw extracts and by the chart tables built from them.
pub mod columns {
    pub const ENTITY_NAME: &str = "entity_name";
    pub const ENTITY_CODE: &str = "entity_code";
    pub const COUNTERPART_NAME: &str = "counterpart_name";
    pub const COUNTERPART_CODE: &str = "counterpart_code";
    pub const INDICATOR_CODE: &str = "indicator_code";
    pub const INDICATOR_NAME: &str = "indicator_name";
    pub const YEAR: &str = "year";
    pub const VALUE: &str = "value";
    pub const IS_AGGREGATE: &str = "is_aggregate";

    pub const DEBTOR_NAME: &str = "debtor_name";
    pub const CREDITOR_NAME: &str = "creditor_name";
    pub const CATEGORY: &str = "category";

    /// Columns every observation extract must carry.
    pub const OBSERVATION: [&str; 8] = [
        INDICATOR_NAME,
        INDICATOR_CODE,
        YEAR,
        ENTITY_NAME,
        ENTITY_CODE,
        COUNTERPART_NAME,
        COUNTERPART_CODE,
        VALUE,
    ];
}

// =============================================================================
// Chart record
// =============================================================================

/// One point series entry of a chart payload.
///
/// `y_values` is aligned positionally to the chart's declared categories and
/// always has one slot per category, `null` where the category is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecord {
    pub filter1_values: Value,
    pub x_values: Value,
    pub filter2_values: Value,
    pub y_values: Vec<Option<f64>>,
}

// =============================================================================
// Cell helpers
// =============================================================================

/// Build a numeric cell. Non-finite values become `null`.
pub fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Numeric view of a cell. Numeric strings are accepted.
pub fn cell_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text view of a cell, as written to CSV and error messages.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Total order over cells: booleans, numbers (numerically), strings
/// (lexicographically), nested values, then nulls last.
pub fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (x, y) if type_rank(x) == type_rank(y) => x.to_string().cmp(&y.to_string()),
        (x, y) => type_rank(x).cmp(&type_rank(y)),
    }
}

/// Cell equality where `2020` and `2020.0` are the same value.
pub fn cells_equal(a: &Value, b: &Value) -> bool {
    compare_cells(a, b) == Ordering::Equal
}

/// Cell usable as an ordered map key.
#[derive(Debug, Clone)]
pub struct CellKey(pub Value);

impl PartialEq for CellKey {
    fn eq(&self, other: &Self) -> bool {
        cells_equal(&self.0, &other.0)
    }
}

impl Eq for CellKey {}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_cells(&self.0, &other.0)
    }
}
