//! Batch runner: load extracts, build charts, write files.
//!
//! Each chart is independent. A failing chart is logged and recorded in the
//! [`RunReport`]; the others still run. All files of a chart are rendered and
//! validated before the first one is written.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::dsa::{self, DsaRow, DSA_FILE_STEM};
use super::key_stats::{self, format_update_date, LAST_UPDATE_KEY};
use super::{ChartId, Dataset};
use crate::classify::{ClassificationResolver, LookupResolver};
use crate::config::Settings;
use crate::error::{ChartError, ChartResult};
use crate::logs::{log_chart, log_error, log_info, log_info_indent, log_success, log_warning_indent, LogEntry};
use crate::models::{columns, Table};
use crate::output::{table_to_csv, write_atomic};
use crate::parser::{read_observations, read_records};
use crate::stats::KeyStatsStore;
use crate::transform::{assemble, synthesize, AggregateOp, ChartOutput};
use crate::validation::validate_chart_records;

pub const CLASSIFICATIONS_FILE_STEM: &str = "classifications";

const EXTENSIONS: [&str; 2] = ["csv", "json"];

/// Find `<dir>/<stem>.csv` or `<dir>/<stem>.json`.
pub fn find_extract(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

/// What one chart produced.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSummary {
    pub chart: String,
    pub files: Vec<PathBuf>,
    pub rows: usize,
    pub warnings: Vec<String>,
}

/// Outcome of one step of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepOutcome>,
}

impl RunReport {
    fn record<T>(&mut self, step: impl Into<String>, result: &ChartResult<T>, detail: impl FnOnce(&T) -> String) {
        let step = step.into();
        match result {
            Ok(value) => {
                let detail = detail(value);
                log_success(format!("{}: {}", step, detail));
                self.steps.push(StepOutcome { step, ok: true, detail });
            }
            Err(e) => {
                log_error(format!("{} failed: {}", step, e));
                self.steps.push(StepOutcome {
                    step,
                    ok: false,
                    detail: e.to_string(),
                });
            }
        }
    }

    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Runs charts against one raw-data directory.
pub struct ChartRunner {
    settings: Settings,
    resolver: Option<Box<dyn ClassificationResolver>>,
    datasets: HashMap<Dataset, Table>,
}

impl ChartRunner {
    /// Runner using the classification file in the raw data directory, if any.
    pub fn new(settings: Settings) -> Self {
        let resolver = match find_extract(&settings.raw_dir, CLASSIFICATIONS_FILE_STEM) {
            Some(path) => match LookupResolver::from_path(&path) {
                Ok(resolver) => {
                    log_info(format!("Classifications: {} entities", resolver.len()));
                    Some(Box::new(resolver) as Box<dyn ClassificationResolver>)
                }
                Err(e) => {
                    log_warning_indent(format!("Ignoring {}: {}", path.display(), e), 0);
                    None
                }
            },
            None => None,
        };
        Self {
            settings,
            resolver,
            datasets: HashMap::new(),
        }
    }

    pub fn with_resolver(settings: Settings, resolver: Box<dyn ClassificationResolver>) -> Self {
        Self {
            settings,
            resolver: Some(resolver),
            datasets: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load an extract once, adding the synthetic entity where it applies.
    fn ensure_loaded(&mut self, dataset: Dataset) -> ChartResult<()> {
        if self.datasets.contains_key(&dataset) {
            return Ok(());
        }
        let path = find_extract(&self.settings.raw_dir, dataset.stem()).ok_or_else(|| {
            ChartError::MissingData(format!(
                "no {} extract in {}",
                dataset.stem(),
                self.settings.raw_dir.display()
            ))
        })?;
        let raw = read_observations(&path)?;
        log_info_indent(format!("{}: {} rows", path.display(), raw.len()), 1);

        let table = match (&self.resolver, dataset.synthesizes()) {
            (Some(resolver), true) => {
                let synthetic = &self.settings.synthetic;
                let levels = dataset.level_indicators();
                let (summable, ratios) = split_by_indicator(&raw, &levels);
                let result = synthesize(
                    &summable,
                    &**resolver,
                    &synthetic.filter,
                    &AggregateOp::Sum,
                    &synthetic.label,
                )?;
                log_info_indent(
                    format!("{}: {} rows for {}", dataset.stem(), result.synthetic_rows, synthetic.label),
                    1,
                );
                if !result.unresolved.is_empty() {
                    log_warning_indent(
                        format!(
                            "{} entities without classification left out of {}",
                            result.unresolved.len(),
                            synthetic.label
                        ),
                        1,
                    );
                }
                append_rows(result.table, &ratios)
            }
            (None, true) => {
                log_warning_indent(format!("No classifications, {} not added", self.settings.synthetic.label), 1);
                raw
            }
            _ => raw,
        };
        self.datasets.insert(dataset, table);
        Ok(())
    }

    fn loaded(&self, dataset: Dataset) -> ChartResult<&Table> {
        self.datasets
            .get(&dataset)
            .ok_or_else(|| ChartError::MissingData(dataset.stem().to_string()))
    }

    fn dsa_rows(&self) -> ChartResult<Option<Vec<DsaRow>>> {
        match find_extract(&self.settings.raw_dir, DSA_FILE_STEM) {
            Some(path) => Ok(Some(read_records(&path)?)),
            None => Ok(None),
        }
    }

    fn output_path(&self, file: String) -> PathBuf {
        self.settings.output_dir.join(file)
    }

    /// Build one chart and write its files.
    pub fn run_chart(&mut self, id: ChartId) -> ChartResult<ChartSummary> {
        log_info(format!("{}", id));
        match (id.spec(&self.settings), id.dataset()) {
            (Some(spec), Some(dataset)) => {
                self.ensure_loaded(dataset)?;
                let output = assemble(self.loaded(dataset)?, &spec)?;
                self.write_assembled(id, &output)
            }
            _ => self.run_dsa_map(id),
        }
    }

    fn write_assembled(&self, id: ChartId, output: &ChartOutput) -> ChartResult<ChartSummary> {
        let name = id.name();
        let mut files: Vec<(PathBuf, Vec<u8>)> = vec![(
            self.output_path(format!("{}_download.csv", name)),
            table_to_csv(&output.download)?,
        )];
        if let Some(wide) = &output.wide {
            files.push((self.output_path(format!("{}_chart.csv", name)), table_to_csv(wide)?));
        }
        if let Some(records) = &output.records {
            let json = serde_json::to_value(records)?;
            validate_chart_records(&json, Some(output.categories.len()))?;
            files.push((self.output_path(format!("{}_chart.json", name)), serde_json::to_vec(&json)?));
        }

        let mut warnings = Vec::new();
        if output.report.unmapped_rows > 0 {
            warnings.push(format!("{} rows with no category", output.report.unmapped_rows));
        }
        if output.report.pruned_pairs > 0 {
            log_info_indent(format!("{} all-zero debtor/creditor pairs dropped", output.report.pruned_pairs), 1);
        }
        for warning in &warnings {
            log_chart(&name, LogEntry::warning(warning.clone()).with_indent(1));
        }

        write_all(&files)?;
        Ok(ChartSummary {
            chart: name,
            files: files.into_iter().map(|(path, _)| path).collect(),
            rows: output.report.wide_rows,
            warnings,
        })
    }

    fn run_dsa_map(&self, id: ChartId) -> ChartResult<ChartSummary> {
        let rows = self.dsa_rows()?.ok_or_else(|| {
            ChartError::MissingData(format!("no {} file in {}", DSA_FILE_STEM, self.settings.raw_dir.display()))
        })?;
        let map = dsa::build(&rows, self.resolver.as_deref())?;

        let name = id.name();
        let files = vec![
            (self.output_path(format!("{}_download.csv", name)), table_to_csv(&map.download)?),
            (self.output_path(format!("{}_chart.csv", name)), table_to_csv(&map.chart)?),
        ];
        let warnings: Vec<String> = map
            .unresolved
            .iter()
            .map(|country| format!("no ISO3 code for '{}'", country))
            .collect();
        for warning in &warnings {
            log_chart(&name, LogEntry::warning(warning.clone()).with_indent(1));
        }

        write_all(&files)?;
        Ok(ChartSummary {
            chart: name,
            files: files.into_iter().map(|(path, _)| path).collect(),
            rows: map.chart.len(),
            warnings,
        })
    }

    /// Compute key statistics and merge them into `key_stats.json`.
    pub fn key_stats(&mut self) -> ChartResult<Map<String, Value>> {
        self.ensure_loaded(Dataset::DebtStocks)?;
        self.ensure_loaded(Dataset::DebtService)?;
        let dsa = self.dsa_rows()?;

        let stats = key_stats::compute(
            self.loaded(Dataset::DebtStocks)?,
            self.loaded(Dataset::DebtService)?,
            dsa.as_deref(),
            &self.settings,
        )?;
        for skipped in &stats.skipped {
            log_warning_indent(format!("{} skipped: input not available", skipped), 1);
        }

        Ok(KeyStatsStore::in_dir(&self.settings.output_dir).merge(stats.values)?)
    }

    /// Stamp `key_stats.json` with the data update date, keeping other keys.
    pub fn last_update(&self, date: NaiveDate) -> ChartResult<Map<String, Value>> {
        let store = KeyStatsStore::in_dir(&self.settings.output_dir);
        Ok(store.set(LAST_UPDATE_KEY, Value::String(format_update_date(date)))?)
    }

    /// Run `only` one chart, or every chart plus key statistics and the
    /// update stamp.
    pub fn run(&mut self, only: Option<ChartId>, today: NaiveDate) -> RunReport {
        let mut report = RunReport::default();
        let charts = match only {
            Some(id) => vec![id],
            None => ChartId::ALL.to_vec(),
        };

        for id in charts {
            let result = self.run_chart(id);
            report.record(id.name(), &result, |s| format!("{} rows, {} files", s.rows, s.files.len()));
        }

        if only.is_none() {
            let result = self.key_stats();
            report.record("key_stats", &result, |m| format!("{} keys", m.len()));
            let result = self.last_update(today);
            report.record("last_update", &result, |_| format_update_date(today));
        }
        report
    }
}

/// Split an extract into rows of the given indicators and all other rows.
fn split_by_indicator(table: &Table, codes: &[&str]) -> (Table, Table) {
    let col = table.column_index(columns::INDICATOR_CODE);
    let listed = |row: &[Value]| col.and_then(|c| row[c].as_str()).is_some_and(|code| codes.contains(&code));
    (table.filter(|r| listed(r)), table.filter(|r| !listed(r)))
}

/// Append `extra` to `table`. Columns `table` has beyond `extra`'s are
/// filled with `false` (the aggregate flag).
fn append_rows(mut table: Table, extra: &Table) -> Table {
    let width = table.columns().len();
    for row in extra.rows() {
        let mut row = row.clone();
        row.resize(width, Value::Bool(false));
        table.push_row(row);
    }
    table
}

fn write_all(files: &[(PathBuf, Vec<u8>)]) -> ChartResult<()> {
    for (path, bytes) in files {
        write_atomic(path, bytes)?;
    }
    Ok(())
}
