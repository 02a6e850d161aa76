//! Pinned-first categorical sort.
//!
//! For every pinned column the effective order is the caller's pinned
//! values, in the order given, followed by every other distinct value of the
//! column in ascending order. Rows are then ordered by one stable multi-key
//! sort whose keys are the pinned columns in declaration order, so pinning
//! `debtor_name` keeps each debtor's block contiguous.
//!
//! ```text
//! pin debtor_name = ["Low & middle income"]
//!
//! Zambia      2020          Low & middle income  2020
//! Angola      2020    →     Low & middle income  2021
//! Low & mid.  2020          Angola               2020
//! Low & mid.  2021          Zambia               2020
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::{Stage, TransformResult};
use crate::models::{cells_equal, compare_cells, Table};
use crate::parser::loose_cell;

/// Values pinned to the top of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinnedColumn {
    pub column: String,
    #[serde(with = "one_or_many")]
    pub values: Vec<Value>,
}

/// Ordered set of pinned columns. Declaration order is sort-key priority.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinSpec {
    columns: Vec<PinnedColumn>,
}

impl PinSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a single value.
    pub fn pin(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.pin_all(column, [value.into()])
    }

    /// Pin several values, in the given order.
    pub fn pin_all<I, V>(mut self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.columns.push(PinnedColumn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Parse `column=value1|value2`, as given on the command line. Values
    /// are typed the way `read_table` types cells.
    pub fn parse_entry(entry: &str) -> Option<PinnedColumn> {
        let (column, values) = entry.split_once('=')?;
        let column = column.trim();
        if column.is_empty() {
            return None;
        }
        Some(PinnedColumn {
            column: column.to_string(),
            values: values
                .split('|')
                .map(|v| loose_cell(v.trim()))
                .collect(),
        })
    }

    pub fn push(&mut self, pinned: PinnedColumn) {
        self.columns.push(pinned);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PinnedColumn> {
        self.columns.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Sort `table` by `pins`. Returns a new table; the input is untouched.
///
/// Fails with `ColumnNotFound` before any work if a pinned column is absent.
pub fn sort(table: &Table, pins: &PinSpec) -> TransformResult<Table> {
    let indices = pins
        .iter()
        .map(|p| table.require(Stage::Sort, &p.column))
        .collect::<TransformResult<Vec<_>>>()?;

    let ranks: Vec<Vec<usize>> = pins
        .iter()
        .zip(&indices)
        .map(|(pinned, &col)| column_ranks(table, col, &pinned.values))
        .collect();

    let mut order: Vec<usize> = (0..table.len()).collect();
    // `sort_by` is stable: equal key tuples keep their input order.
    order.sort_by(|&a, &b| {
        ranks
            .iter()
            .map(|r| r[a].cmp(&r[b]))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });

    Ok(table.reorder(&order))
}

/// Effective category order of `column`: pinned values, then the rest ascending.
pub fn effective_order(table: &Table, column: &str, pinned: &[Value]) -> TransformResult<Vec<Value>> {
    let col = table.require(Stage::Sort, column)?;
    let mut order = pinned.to_vec();
    order.extend(unpinned_values(table, col, pinned).into_iter().cloned());
    Ok(order)
}

fn unpinned_values<'a>(table: &'a Table, col: usize, pinned: &[Value]) -> Vec<&'a Value> {
    let mut rest: Vec<&Value> = table
        .rows()
        .iter()
        .map(|r| &r[col])
        .filter(|v| !pinned.iter().any(|p| cells_equal(p, v)))
        .collect();
    rest.sort_by(|a, b| compare_cells(a, b));
    rest.dedup_by(|a, b| cells_equal(a, b));
    rest
}

fn column_ranks(table: &Table, col: usize, pinned: &[Value]) -> Vec<usize> {
    let rest = unpinned_values(table, col, pinned);
    table
        .rows()
        .iter()
        .map(|row| {
            let value = &row[col];
            match pinned.iter().position(|p| cells_equal(p, value)) {
                Some(pos) => pos,
                None => {
                    pinned.len()
                        + rest
                            .binary_search_by(|v| compare_cells(v, value))
                            .unwrap_or_else(|at| at)
                }
            }
        })
        .collect()
}

/// Accept either a scalar or a list for pinned values.
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Value>),
        One(Value),
    }

    pub fn serialize<S: Serializer>(values: &[Value], serializer: S) -> Result<S::Ok, S::Error> {
        values.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Value>, D::Error> {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::Many(values) => values,
            OneOrMany::One(value) => vec![value],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use serde_json::json;

    fn table(rows: &[(&str, i64, &str)]) -> Table {
        Table::from_rows(
            ["debtor_name", "year", "creditor_name"],
            rows.iter()
                .map(|(d, y, c)| vec![json!(d), json!(y), json!(c)])
                .collect(),
        )
    }

    fn column(table: &Table, name: &str) -> Vec<Value> {
        table.column_values(name).unwrap().into_iter().cloned().collect()
    }

    fn standard_pins() -> PinSpec {
        PinSpec::new()
            .pin("debtor_name", "Low & middle income")
            .pin("creditor_name", "All creditors")
    }

    #[test]
    fn test_pinned_first_then_alphabetical() {
        let t = table(&[
            ("Zambia", 2020, "China"),
            ("Angola", 2020, "All creditors"),
            ("Low & middle income", 2020, "World Bank"),
            ("Low & middle income", 2020, "All creditors"),
        ]);
        let sorted = sort(&t, &standard_pins()).unwrap();

        assert_eq!(
            column(&sorted, "debtor_name"),
            vec![json!("Low & middle income"), json!("Low & middle income"), json!("Angola"), json!("Zambia")]
        );
        assert_eq!(sorted.get(0, "creditor_name"), Some(&json!("All creditors")));
        assert_eq!(sorted.get(1, "creditor_name"), Some(&json!("World Bank")));
    }

    #[test]
    fn test_debtor_blocks_stay_contiguous() {
        let t = table(&[
            ("Kenya", 2020, "All creditors"),
            ("Low & middle income", 2020, "All creditors"),
            ("Kenya", 2021, "All creditors"),
            ("Low & middle income", 2021, "All creditors"),
        ]);
        let sorted = sort(&t, &standard_pins()).unwrap();
        assert_eq!(
            column(&sorted, "debtor_name"),
            vec![json!("Low & middle income"), json!("Low & middle income"), json!("Kenya"), json!("Kenya")]
        );
        // Stable: years keep their input order inside each block.
        assert_eq!(column(&sorted, "year"), vec![json!(2020), json!(2021), json!(2020), json!(2021)]);
    }

    #[test]
    fn test_pinned_values_in_caller_order() {
        let t = table(&[
            ("B", 2020, "x"),
            ("C", 2020, "x"),
            ("A", 2020, "x"),
            ("D", 2020, "x"),
        ]);
        let pins = PinSpec::new().pin_all("debtor_name", ["C", "Missing", "A"]);
        let sorted = sort(&t, &pins).unwrap();
        assert_eq!(
            column(&sorted, "debtor_name"),
            vec![json!("C"), json!("A"), json!("B"), json!("D")]
        );
    }

    #[test]
    fn test_sort_is_idempotent() {
        let t = table(&[
            ("Zambia", 2021, "China"),
            ("Low & middle income", 2020, "China"),
            ("Angola", 2020, "All creditors"),
            ("Zambia", 2020, "All creditors"),
        ]);
        let once = sort(&t, &standard_pins()).unwrap();
        let twice = sort(&once, &standard_pins()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_equal_keys_keep_input_order() {
        let t = table(&[
            ("Kenya", 2022, "All creditors"),
            ("Kenya", 2020, "All creditors"),
            ("Kenya", 2021, "All creditors"),
        ]);
        let sorted = sort(&t, &standard_pins()).unwrap();
        assert_eq!(sorted, t);
    }

    #[test]
    fn test_missing_column_fails_before_sorting() {
        let t = table(&[("Kenya", 2020, "All creditors")]);
        let pins = PinSpec::new().pin("debtor_name", "Kenya").pin("region", "Africa");
        let err = sort(&t, &pins).unwrap_err();
        assert!(matches!(err, TransformError::ColumnNotFound { ref column, .. } if column == "region"));
    }

    #[test]
    fn test_numeric_column_orders_numerically() {
        let t = table(&[("A", 2010, "x"), ("A", 9, "x"), ("A", 100, "x")]);
        let pins = PinSpec::new().pin("year", 100);
        let sorted = sort(&t, &pins).unwrap();
        assert_eq!(column(&sorted, "year"), vec![json!(100), json!(9), json!(2010)]);
    }

    #[test]
    fn test_effective_order() {
        let t = table(&[("Zambia", 2020, "x"), ("Angola", 2020, "x"), ("Zambia", 2021, "x")]);
        let order = effective_order(&t, "debtor_name", &[json!("Kenya")]).unwrap();
        assert_eq!(order, vec![json!("Kenya"), json!("Angola"), json!("Zambia")]);
    }

    #[test]
    fn test_pin_spec_deserializes_scalar_or_list() {
        let spec: PinSpec = serde_json::from_value(json!([
            {"column": "debtor_name", "values": "Low & middle income"},
            {"column": "creditor_name", "values": ["All creditors", "China"]}
        ]))
        .unwrap();
        let columns: Vec<_> = spec.iter().collect();
        assert_eq!(columns[0].values, vec![json!("Low & middle income")]);
        assert_eq!(columns[1].values.len(), 2);
    }

    #[test]
    fn test_parse_entry() {
        let entry = PinSpec::parse_entry("creditor_name=All creditors|China").unwrap();
        assert_eq!(entry.column, "creditor_name");
        assert_eq!(entry.values, vec![json!("All creditors"), json!("China")]);
        assert!(PinSpec::parse_entry("no-equals").is_none());
    }

    #[test]
    fn test_parsed_numeric_pin_matches_numeric_cells() {
        let entry = PinSpec::parse_entry("year=2021|2019").unwrap();
        assert_eq!(entry.values, vec![json!(2021), json!(2019)]);

        let mut pins = PinSpec::new();
        pins.push(entry);
        let t = table(&[("A", 2019, "x"), ("A", 2020, "x"), ("A", 2021, "x")]);
        let sorted = sort(&t, &pins).unwrap();
        assert_eq!(column(&sorted, "year"), vec![json!(2021), json!(2019), json!(2020)]);
    }
}
