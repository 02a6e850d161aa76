//! Headline figures shown next to the charts.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use super::dsa::DsaRow;
use super::{DEBT_SERVICE_TYPES, DEBT_STOCK_TYPES};
use crate::config::Settings;
use crate::error::{ChartError, ChartResult};
use crate::models::{cell_f64, columns, Table};

pub const DEBT_GNI_INDICATOR: &str = "DT.DOD.DECT.GN.ZS";
pub const LMY_CODE: &str = "LMY";
pub const WORLD_CODE: &str = "WLD";

pub const LAST_UPDATE_KEY: &str = "last_data_update";

/// Computed statistics and the ones that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyStats {
    pub values: Map<String, Value>,
    pub skipped: Vec<String>,
}

/// Round half away from zero to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_trillions(value: f64) -> String {
    format!("US${} trillion", round2(value / 1e12))
}

pub fn format_billions(value: f64) -> String {
    format!("US${} billion", round2(value / 1e9))
}

pub fn format_percent(value: f64) -> String {
    format!("{}%", round2(value))
}

pub fn format_update_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

/// Sum of `value` over rows matching every `(column, accepted values)` test.
fn sum_where(table: &Table, tests: &[(&str, &[&str])], year: i64) -> Option<f64> {
    let value = table.column_index(columns::VALUE)?;
    let year_col = table.column_index(columns::YEAR)?;
    let cols: Vec<(usize, &[&str])> = tests
        .iter()
        .map(|(name, accepted)| table.column_index(name).map(|c| (c, *accepted)))
        .collect::<Option<_>>()?;

    let mut matched = false;
    let mut total = 0.0;
    for row in table.rows() {
        if row[year_col].as_i64() != Some(year) {
            continue;
        }
        let hit = cols
            .iter()
            .all(|(c, accepted)| row[*c].as_str().is_some_and(|v| accepted.contains(&v)));
        if !hit {
            continue;
        }
        if let Some(v) = cell_f64(&row[value]) {
            matched = true;
            total += v;
        }
    }
    matched.then_some(total)
}

/// Compute key statistics for `settings.latest_year`.
///
/// Debt stock and debt service totals are required; the debt-to-GNI ratio
/// and the distress count are skipped when their inputs are missing.
pub fn compute(
    stocks: &Table,
    service: &Table,
    dsa: Option<&[DsaRow]>,
    settings: &Settings,
) -> ChartResult<KeyStats> {
    let year = settings.latest_year;
    let mut stats = KeyStats::default();
    let lmy: &[&str] = &[LMY_CODE];
    let world: &[&str] = &[WORLD_CODE];

    let stock_codes: Vec<&str> = DEBT_STOCK_TYPES.iter().map(|(code, _)| *code).collect();
    let stock_total = sum_where(
        stocks,
        &[
            (columns::ENTITY_CODE, lmy),
            (columns::COUNTERPART_CODE, world),
            (columns::INDICATOR_CODE, stock_codes.as_slice()),
        ],
        year,
    )
    .ok_or_else(|| ChartError::MissingData(format!("no {} debt stocks for {}", LMY_CODE, year)))?;
    stats
        .values
        .insert("debt_stock_total".into(), Value::String(format_trillions(stock_total)));

    let service_codes: Vec<&str> = DEBT_SERVICE_TYPES.iter().map(|(code, _, _)| *code).collect();
    let debtor = [settings.headline_debtor.as_str()];
    let creditors = [settings.labels.world.as_str(), settings.labels.all_creditors.as_str()];
    let service_total = sum_where(
        service,
        &[
            (columns::ENTITY_NAME, &debtor[..]),
            (columns::COUNTERPART_NAME, &creditors[..]),
            (columns::INDICATOR_CODE, service_codes.as_slice()),
        ],
        year,
    )
    .ok_or_else(|| {
        ChartError::MissingData(format!("no {} debt service for {}", settings.headline_debtor, year))
    })?;
    stats
        .values
        .insert("debt_service_total".into(), Value::String(format_billions(service_total)));

    match sum_where(
        stocks,
        &[
            (columns::ENTITY_CODE, lmy),
            (columns::COUNTERPART_CODE, world),
            (columns::INDICATOR_CODE, &[DEBT_GNI_INDICATOR][..]),
        ],
        year,
    ) {
        Some(ratio) => {
            stats.values.insert("debt_gni".into(), Value::String(format_percent(ratio)));
        }
        None => stats.skipped.push("debt_gni".into()),
    }

    match dsa {
        Some(rows) => {
            let count = rows.iter().filter(|r| r.in_distress()).count();
            stats.values.insert("countries_debt_distress".into(), Value::from(count));
        }
        None => stats.skipped.push("countries_debt_distress".into()),
    }

    stats.values.insert("latest_year".into(), Value::from(year));
    Ok(stats)
}
