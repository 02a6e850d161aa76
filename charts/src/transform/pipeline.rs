//! Chart assembly pipeline.
//!
//! Every chart is the same seven-stage run over a raw observation extract,
//! parameterized by a declarative [`ChartSpec`]:
//!
//! ```text
//! raw ─▶ years ─▶ nulls ─▶ labels ─▶ zero pairs ─▶ pivot ─▶ sort ─▶ shape
//!                            │                                     │
//!                            └─▶ download table        wide table ◀┴▶ JSON records
//! ```
//!
//! Stages are pure functions over [`Table`] and are public so they can be
//! used and tested on their own.
//!
//! # Example
//!
//! ```rust,ignore
//! use debt_charts::transform::pipeline::{assemble, CategoryMap, ChartSpec, YearRange};
//! use debt_charts::transform::sort::PinSpec;
//!
//! let spec = ChartSpec::new("chart_1", YearRange::from(2000), CategoryMap::new()
//!         .map("DT.DOD.BLAT.CD", "bilateral")
//!         .map("DT.DOD.MLAT.CD", "multilateral"))
//!     .pins(PinSpec::new().pin("debtor_name", "Low & middle income"))
//!     .prune_zero_pairs(0.0);
//!
//! let output = assemble(&raw, &spec)?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::sort::{sort, PinSpec};
use crate::error::{Stage, TransformError, TransformResult};
use crate::models::{cell_f64, cell_text, columns, number, CellKey, ChartRecord, Table};

/// Columns of the long download table, in output order.
pub const DOWNLOAD_COLUMNS: [&str; 7] = [
    columns::INDICATOR_NAME,
    columns::INDICATOR_CODE,
    columns::YEAR,
    columns::DEBTOR_NAME,
    columns::CREDITOR_NAME,
    columns::VALUE,
    columns::CATEGORY,
];

/// Index columns of the wide chart table.
pub const INDEX_COLUMNS: [&str; 3] = [columns::DEBTOR_NAME, columns::YEAR, columns::CREDITOR_NAME];

// =============================================================================
// Chart parameters
// =============================================================================

/// Inclusive year bounds. `end` may lie past the latest actual data year to
/// keep projected years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i64,
    #[serde(default)]
    pub end: Option<i64>,
}

impl YearRange {
    pub fn from(start: i64) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self { start, end: Some(end) }
    }

    pub fn contains(&self, year: i64) -> bool {
        year >= self.start && self.end.map_or(true, |end| year <= end)
    }
}

/// Indicator code to semantic category mapping.
///
/// Category order, as used for wide columns and `y_values`, is the order in
/// which categories first appear, with the residual category last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    entries: Vec<(String, String)>,
    #[serde(default)]
    residual: Option<String>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(mut self, code: impl Into<String>, category: impl Into<String>) -> Self {
        self.entries.push((code.into(), category.into()));
        self
    }

    /// Collect every unmapped indicator code, summed, under `category`.
    pub fn with_residual(mut self, category: impl Into<String>) -> Self {
        self.residual = Some(category.into());
        self
    }

    pub fn category_of(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, category)| category.as_str())
    }

    pub fn residual(&self) -> Option<&str> {
        self.residual.as_deref()
    }

    /// Declared categories, in column order.
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, category) in &self.entries {
            if !out.contains(category) {
                out.push(category.clone());
            }
        }
        if let Some(residual) = &self.residual {
            if !out.contains(residual) {
                out.push(residual.clone());
            }
        }
        out
    }

    /// Category for a row: mapped, else residual, else none.
    fn resolve(&self, code: &str) -> Option<&str> {
        self.category_of(code).or(self.residual.as_deref())
    }
}

/// What to do when two rows land on the same pivot cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// Fail with `DuplicateKey`.
    #[default]
    Reject,
    /// Add the values.
    Sum,
}

/// Labels rewritten during normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labels {
    /// Counterpart label of the all-creditors total in raw extracts.
    pub world: String,
    /// Label it is presented as.
    pub all_creditors: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            world: "World".to_string(),
            all_creditors: "All creditors".to_string(),
        }
    }
}

/// Which chart artifacts to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    Table,
    Records,
    #[default]
    Both,
}

impl OutputShape {
    fn wants_table(self) -> bool {
        matches!(self, OutputShape::Table | OutputShape::Both)
    }

    fn wants_records(self) -> bool {
        matches!(self, OutputShape::Records | OutputShape::Both)
    }
}

/// Full parameter set of one chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub name: String,
    pub years: YearRange,
    pub categories: CategoryMap,
    #[serde(default)]
    pub combine: Combine,
    #[serde(default)]
    pub pins: PinSpec,
    /// Drop (debtor, creditor) pairs whose absolute value sum is at most this.
    #[serde(default)]
    pub prune_threshold: Option<f64>,
    #[serde(default)]
    pub labels: Labels,
    /// Keep a single creditor (after normalization).
    #[serde(default)]
    pub creditor: Option<String>,
    #[serde(default)]
    pub output: OutputShape,
    /// Category column order of the wide table, when it differs from the
    /// `y_values` order.
    #[serde(default)]
    pub table_columns: Option<Vec<String>>,
}

impl ChartSpec {
    pub fn new(name: impl Into<String>, years: YearRange, categories: CategoryMap) -> Self {
        Self {
            name: name.into(),
            years,
            categories,
            combine: Combine::default(),
            pins: PinSpec::default(),
            prune_threshold: None,
            labels: Labels::default(),
            creditor: None,
            output: OutputShape::default(),
            table_columns: None,
        }
    }

    pub fn pins(mut self, pins: PinSpec) -> Self {
        self.pins = pins;
        self
    }

    pub fn combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    pub fn prune_zero_pairs(mut self, threshold: f64) -> Self {
        self.prune_threshold = Some(threshold);
        self
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn only_creditor(mut self, creditor: impl Into<String>) -> Self {
        self.creditor = Some(creditor.into());
        self
    }

    pub fn output(mut self, output: OutputShape) -> Self {
        self.output = output;
        self
    }

    pub fn table_columns<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_columns = Some(categories.into_iter().map(Into::into).collect());
        self
    }
}

// =============================================================================
// Output
// =============================================================================

/// Row counts along the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssemblyReport {
    pub input_rows: usize,
    pub in_year_range: usize,
    pub non_null: usize,
    pub pruned_pairs: usize,
    /// Rows whose indicator has no category and no residual to fall into.
    pub unmapped_rows: usize,
    pub wide_rows: usize,
}

/// Everything one chart produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
    /// Long, normalized rows (before pruning), for download.
    pub download: Table,
    pub wide: Option<Table>,
    pub records: Option<Vec<ChartRecord>>,
    pub categories: Vec<String>,
    pub report: AssemblyReport,
}

/// Run the whole pipeline for one chart.
pub fn assemble(raw: &Table, spec: &ChartSpec) -> TransformResult<ChartOutput> {
    let mut report = AssemblyReport {
        input_rows: raw.len(),
        ..AssemblyReport::default()
    };

    let table = filter_years(raw, &spec.years)?;
    report.in_year_range = table.len();

    let table = drop_null_values(&table)?;
    report.non_null = table.len();

    let mut table = normalize_labels(&table, &spec.labels)?;
    if let Some(creditor) = &spec.creditor {
        let col = table.require(Stage::Normalize, columns::CREDITOR_NAME)?;
        table = table.filter(|r| r[col].as_str() == Some(creditor.as_str()));
    }

    let download = download_table(&table, &spec.categories)?;

    if let Some(threshold) = spec.prune_threshold {
        let (pruned, dropped) = prune_zero_pairs(&table, threshold)?;
        table = pruned;
        report.pruned_pairs = dropped;
    }

    let (wide, unmapped) = pivot(&table, &spec.categories, spec.combine)?;
    report.unmapped_rows = unmapped;
    report.wide_rows = wide.len();

    let wide = sort(&wide, &spec.pins)?;
    let categories = spec.categories.categories();

    let records = if spec.output.wants_records() {
        Some(to_records(&wide, &categories)?)
    } else {
        None
    };

    let wide = match (&spec.table_columns, spec.output.wants_table()) {
        (_, false) => None,
        (None, true) => Some(wide),
        (Some(order), true) => Some(select_columns(&wide, order)?),
    };

    Ok(ChartOutput {
        download,
        wide,
        records,
        categories,
        report,
    })
}

// =============================================================================
// Stages
// =============================================================================

fn year_of(row: &[Value], col: usize, stage: Stage) -> TransformResult<i64> {
    row[col]
        .as_i64()
        .or_else(|| row[col].as_f64().filter(|y| y.fract() == 0.0).map(|y| y as i64))
        .ok_or_else(|| TransformError::InvalidValue {
            stage,
            column: columns::YEAR.to_string(),
            value: cell_text(&row[col]),
        })
}

/// Keep rows whose `year` lies in `years`.
pub fn filter_years(table: &Table, years: &YearRange) -> TransformResult<Table> {
    let col = table.require(Stage::TemporalFilter, columns::YEAR)?;
    let mut keep = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        if years.contains(year_of(row, col, Stage::TemporalFilter)?) {
            keep.push(i);
        }
    }
    Ok(table.reorder(&keep))
}

/// Drop rows with a null `value`.
pub fn drop_null_values(table: &Table) -> TransformResult<Table> {
    let col = table.require(Stage::NullFilter, columns::VALUE)?;
    Ok(table.filter(|r| !r[col].is_null()))
}

/// Present the all-creditors total under its display label and rename raw
/// entity columns to debtor / creditor.
pub fn normalize_labels(table: &Table, labels: &Labels) -> TransformResult<Table> {
    table.require(Stage::Normalize, columns::ENTITY_NAME)?;
    let counterpart = table.require(Stage::Normalize, columns::COUNTERPART_NAME)?;

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut row = row.clone();
            if row[counterpart].as_str() == Some(labels.world.as_str()) {
                row[counterpart] = Value::String(labels.all_creditors.clone());
            }
            row
        })
        .collect();

    let mut out = Table::from_rows(table.columns().iter().cloned(), rows);
    out.rename_column(columns::ENTITY_NAME, columns::DEBTOR_NAME);
    out.rename_column(columns::COUNTERPART_NAME, columns::CREDITOR_NAME);
    Ok(out)
}

/// Long table for download: fixed columns, with each row's category.
pub fn download_table(table: &Table, categories: &CategoryMap) -> TransformResult<Table> {
    let code = table.require(Stage::Normalize, columns::INDICATOR_CODE)?;
    let sources: Vec<Option<usize>> = DOWNLOAD_COLUMNS.iter().map(|c| table.column_index(c)).collect();

    let mut out = Table::new(DOWNLOAD_COLUMNS);
    for row in table.rows() {
        let category = row[code]
            .as_str()
            .and_then(|c| categories.resolve(c))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null);
        let cells = DOWNLOAD_COLUMNS
            .iter()
            .zip(&sources)
            .map(|(name, source)| match (*name, source) {
                (columns::CATEGORY, _) => category.clone(),
                (_, Some(c)) => row[*c].clone(),
                (_, None) => Value::Null,
            })
            .collect();
        out.push_row(cells);
    }
    Ok(out)
}

/// Drop every (debtor, creditor) pair whose values, summed over all its
/// rows, have an absolute value of at most `threshold`. Returns the kept rows
/// and the number of pairs dropped.
pub fn prune_zero_pairs(table: &Table, threshold: f64) -> TransformResult<(Table, usize)> {
    let debtor = table.require(Stage::ZeroPairPruning, columns::DEBTOR_NAME)?;
    let creditor = table.require(Stage::ZeroPairPruning, columns::CREDITOR_NAME)?;
    let value = table.require(Stage::ZeroPairPruning, columns::VALUE)?;

    let pair = |row: &[Value]| (CellKey(row[debtor].clone()), CellKey(row[creditor].clone()));

    let mut sums: BTreeMap<(CellKey, CellKey), f64> = BTreeMap::new();
    for row in table.rows() {
        *sums.entry(pair(row)).or_insert(0.0) += cell_f64(&row[value]).unwrap_or(0.0);
    }

    let kept = table.filter(|row| sums.get(&pair(row)).is_some_and(|s| s.abs() > threshold));
    let dropped = sums.values().filter(|s| s.abs() <= threshold).count();
    Ok((kept, dropped))
}

type IndexKey = (CellKey, CellKey, CellKey);

/// Reshape long rows into one row per (debtor, year, creditor) and one
/// column per category. Returns the wide table and the number of rows with
/// no category.
pub fn pivot(table: &Table, categories: &CategoryMap, combine: Combine) -> TransformResult<(Table, usize)> {
    let debtor = table.require(Stage::Pivot, columns::DEBTOR_NAME)?;
    let year = table.require(Stage::Pivot, columns::YEAR)?;
    let creditor = table.require(Stage::Pivot, columns::CREDITOR_NAME)?;
    let code = table.require(Stage::Pivot, columns::INDICATOR_CODE)?;
    let value = table.require(Stage::Pivot, columns::VALUE)?;

    let names = categories.categories();
    let mut cells: BTreeMap<IndexKey, Vec<Option<f64>>> = BTreeMap::new();
    let mut seen: BTreeSet<(IndexKey, String)> = BTreeSet::new();
    let mut unmapped = 0;

    for row in table.rows() {
        let Some(category) = row[code].as_str().and_then(|c| categories.resolve(c)) else {
            unmapped += 1;
            continue;
        };
        let Some(slot) = names.iter().position(|n| n == category) else {
            unmapped += 1;
            continue;
        };
        let amount = cell_f64(&row[value]).ok_or_else(|| TransformError::InvalidValue {
            stage: Stage::Pivot,
            column: columns::VALUE.to_string(),
            value: cell_text(&row[value]),
        })?;

        let key = (
            CellKey(row[debtor].clone()),
            CellKey(row[year].clone()),
            CellKey(row[creditor].clone()),
        );
        let duplicate = || TransformError::DuplicateKey {
            debtor: cell_text(&row[debtor]),
            year: cell_text(&row[year]),
            creditor: cell_text(&row[creditor]),
            category: category.to_string(),
        };
        // Only distinct indicators may share a cell; a repeated observation never does.
        if !seen.insert((key.clone(), cell_text(&row[code]))) {
            return Err(duplicate());
        }

        let entry = cells.entry(key).or_insert_with(|| vec![None; names.len()]);
        let summable = combine == Combine::Sum || categories.residual() == Some(category);
        entry[slot] = match entry[slot] {
            None => Some(amount),
            Some(existing) if summable => Some(existing + amount),
            Some(_) => return Err(duplicate()),
        };
    }

    // The residual is a total: a row with none of its codes holds 0, not null.
    let residual_slot = categories.residual().and_then(|r| names.iter().position(|n| n == r));

    let mut wide = Table::new(INDEX_COLUMNS.iter().map(|c| c.to_string()).chain(names.iter().cloned()));
    for ((d, y, c), mut values) in cells {
        if let Some(slot) = residual_slot {
            values[slot].get_or_insert(0.0);
        }
        let mut row = vec![d.0, y.0, c.0];
        row.extend(values.into_iter().map(|v| v.map(number).unwrap_or(Value::Null)));
        wide.push_row(row);
    }
    Ok((wide, unmapped))
}

/// Wide table with the index columns followed by `categories`, in that order.
pub fn select_columns(wide: &Table, categories: &[String]) -> TransformResult<Table> {
    let names: Vec<String> = INDEX_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(categories.iter().cloned())
        .collect();
    let indices = names
        .iter()
        .map(|c| wide.require(Stage::Shape, c))
        .collect::<TransformResult<Vec<_>>>()?;

    let rows = wide
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(Table::from_rows(names, rows))
}

/// Collapse a wide table into chart records. `y_values` follows
/// `categories` exactly; a category column missing from the table yields
/// `null` in every record.
pub fn to_records(wide: &Table, categories: &[String]) -> TransformResult<Vec<ChartRecord>> {
    let debtor = wide.require(Stage::Shape, columns::DEBTOR_NAME)?;
    let year = wide.require(Stage::Shape, columns::YEAR)?;
    let creditor = wide.require(Stage::Shape, columns::CREDITOR_NAME)?;
    let slots: Vec<Option<usize>> = categories.iter().map(|c| wide.column_index(c)).collect();

    Ok(wide
        .rows()
        .iter()
        .map(|row| ChartRecord {
            filter1_values: row[debtor].clone(),
            x_values: row[year].clone(),
            filter2_values: row[creditor].clone(),
            y_values: slots
                .iter()
                .map(|slot| slot.and_then(|c| cell_f64(&row[c])))
                .collect(),
        })
        .collect())
}
