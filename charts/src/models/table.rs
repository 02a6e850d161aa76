//! Column-ordered table of JSON cells.

use serde_json::{Map, Value};

use crate::error::{Stage, TransformError, TransformResult};

/// Immutable-by-convention snapshot of tabular data.
///
/// Columns keep their declared order, which is also the order they are
/// written to CSV. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Create a table from rows. Short rows are padded with `null`, long rows
    /// are truncated.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    /// Build a table from JSON objects, one column per listed key.
    /// Missing keys become `null`.
    pub fn from_records(columns: &[&str], records: &[Value]) -> Self {
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(*c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::from_rows(columns.iter().copied(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of a column the given stage cannot work without.
    pub fn require(&self, stage: Stage, name: &str) -> TransformResult<usize> {
        self.column_index(name)
            .ok_or_else(|| TransformError::column_not_found(stage, name))
    }

    /// Append a row, normalizing its width to the column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    /// Cell at `row` in column `name`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// All cells of a column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let col = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[col]).collect())
    }

    /// New table keeping rows for which `keep` returns true.
    pub fn filter<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Value]) -> bool,
    {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }

    /// New table with rows in the order given by `indices`.
    pub fn reorder(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Rename a column in place. Unknown names are ignored.
    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Append a column filled with `fill`.
    pub fn add_column(&mut self, name: &str, fill: Value) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.clone());
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_rows(
            ["debtor", "year"],
            vec![vec![json!("Kenya"), json!(2020)], vec![json!("Ghana"), json!(2021)]],
        )
    }

    #[test]
    fn test_rows_are_padded() {
        let table = Table::from_rows(["a", "b", "c"], vec![vec![json!(1)]]);
        assert_eq!(table.rows()[0], vec![json!(1), Value::Null, Value::Null]);
    }

    #[test]
    fn test_require_reports_stage() {
        let err = sample().require(Stage::Pivot, "creditor").unwrap_err();
        assert!(err.to_string().contains("category pivot"));
        assert!(err.to_string().contains("creditor"));
    }

    #[test]
    fn test_filter_leaves_input_untouched() {
        let table = sample();
        let filtered = table.filter(|r| r[1] == json!(2021));
        assert_eq!(filtered.len(), 1);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_rename_and_records() {
        let mut table = sample();
        table.rename_column("debtor", "debtor_name");
        let records = table.to_records();
        assert_eq!(records[0]["debtor_name"], "Kenya");
        assert_eq!(records[1]["year"], 2021);
    }

    #[test]
    fn test_from_records_missing_keys_are_null() {
        let table = Table::from_records(&["a", "b"], &[json!({"a": 1})]);
        assert_eq!(table.get(0, "b"), Some(&Value::Null));
    }
}
