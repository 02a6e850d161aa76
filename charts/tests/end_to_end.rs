//! Full chart runs over the fixture extracts in `tests/fixtures/raw_data`.

use chrono::NaiveDate;
use debt_charts::{
    ChartId, ChartRunner, ClassificationError, ClassificationResolver, IdType, OnNotFound, Settings,
};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/raw_data")
}

fn settings(raw_dir: &Path, output_dir: &Path) -> Settings {
    Settings {
        raw_dir: raw_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        ..Settings::default()
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn read_json(path: PathBuf) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_full_run_writes_every_file() {
    let out = tempdir().unwrap();
    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    let report = runner.run(None, today());

    assert!(report.is_success(), "{:?}", report.steps);
    assert_eq!(report.steps.len(), 7);

    for file in [
        "chart_1_download.csv",
        "chart_1_chart.csv",
        "chart_1_chart.json",
        "chart_2_download.csv",
        "chart_2_chart.csv",
        "chart_2_chart.json",
        "chart_3_download.csv",
        "chart_3_chart.csv",
        "chart_4_download.csv",
        "chart_4_chart.csv",
        "chart_4_chart.json",
        "chart_5_download.csv",
        "chart_5_chart.csv",
        "key_stats.json",
    ] {
        assert!(out.path().join(file).is_file(), "missing {}", file);
    }
    assert!(!out.path().join("chart_3_chart.json").exists());
}

#[test]
fn test_debt_stocks_chart() {
    let out = tempdir().unwrap();
    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    let summary = runner.run_chart(ChartId::DebtStocks).unwrap();
    assert_eq!(summary.rows, 6);
    assert_eq!(summary.warnings, vec!["1 rows with no category".to_string()]);

    let records = read_json(out.path().join("chart_1_chart.json"));
    let records = records.as_array().unwrap();

    assert_eq!(
        records[0],
        json!({
            "filter1_values": "Low & middle income",
            "x_values": 2024,
            "filter2_values": "All creditors",
            "y_values": [5.0e12, 3.874e12, null, null, null]
        })
    );

    // Kenya 10 + Ghana 20; Seychelles is high income, India is not in Africa.
    assert_eq!(records[1]["filter1_values"], json!("Africa (excluding high income)"));
    assert_eq!(records[1]["y_values"], json!([30.0, null, null, null, null]));

    let debtors: Vec<&str> = records.iter().filter_map(|r| r["filter1_values"].as_str()).collect();
    assert_eq!(
        debtors,
        vec![
            "Low & middle income",
            "Africa (excluding high income)",
            "Ghana",
            "India",
            "Kenya",
            "Seychelles"
        ]
    );
    // All-zero China pairs are pruned from the chart but kept for download.
    assert!(records.iter().all(|r| r["filter2_values"] == json!("All creditors")));
    let download = fs::read_to_string(out.path().join("chart_1_download.csv")).unwrap();
    assert!(download.contains("Kenya,China,0.0,bilateral"));
    assert!(!download.contains("1999"));
}

#[test]
fn test_debt_service_keeps_projections() {
    let out = tempdir().unwrap();
    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    runner.run_chart(ChartId::DebtService).unwrap();
    runner.run_chart(ChartId::PrincipalInterest).unwrap();

    let service = read_json(out.path().join("chart_2_chart.json"));
    let lmi: Vec<&Value> = service
        .as_array()
        .unwrap()
        .iter()
        .filter(|r| r["filter1_values"] == json!("Low & middle income"))
        .collect();
    assert_eq!(lmi.len(), 2);
    assert_eq!(lmi[0]["x_values"], json!(2024));
    assert_eq!(lmi[0]["y_values"], json!([145.123e9, null, null, null, null]));
    assert_eq!(lmi[1]["x_values"], json!(2030));

    let split = read_json(out.path().join("chart_4_chart.json"));
    assert_eq!(split[0]["y_values"], json!([100.0e9, 45.123e9]));
    assert_eq!(split[1]["y_values"], json!([1.0e9, null]));

    let csv = fs::read_to_string(out.path().join("chart_4_chart.csv")).unwrap();
    assert_eq!(
        csv.lines().take(2).collect::<Vec<_>>(),
        vec![
            "debtor_name,year,creditor_name,interest,principal",
            "Low & middle income,2024,All creditors,45123000000.0,100000000000.0"
        ]
    );
}

#[test]
fn test_currency_composition_table() {
    let out = tempdir().unwrap();
    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    runner.run_chart(ChartId::CurrencyComposition).unwrap();

    let csv = fs::read_to_string(out.path().join("chart_3_chart.csv")).unwrap();
    assert_eq!(
        csv,
        "debtor_name,year,creditor_name,U.S. dollars,Euro,SDR,Japanese yen,Pound sterling,All other currencies\n\
         Low & middle income,2024,All creditors,60.0,20.0,,,,12.5\n\
         Kenya,2024,All creditors,55.0,,,,,0.0\n"
    );
}

#[test]
fn test_dsa_map() {
    let out = tempdir().unwrap();
    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    let summary = runner.run_chart(ChartId::DsaMap).unwrap();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.warnings, vec!["no ISO3 code for 'Atlantis'".to_string()]);

    let csv = fs::read_to_string(out.path().join("chart_5_chart.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("country_name,risk_of_debt_distress,latest_publication,debt_sustainability_assessment,iso3_code,color")
    );
    assert_eq!(lines.next(), Some("Zambia,In debt distress,30 June 2024,Sustainable,ZMB,#73175a"));
}

#[test]
fn test_key_stats_merge_with_update_stamp() {
    let out = tempdir().unwrap();
    fs::write(out.path().join("key_stats.json"), r#"{"editor_note": "keep me"}"#).unwrap();

    let mut runner = ChartRunner::new(settings(&fixtures(), out.path()));
    runner.key_stats().unwrap();
    runner.last_update(today()).unwrap();

    let stats = read_json(out.path().join("key_stats.json"));
    assert_eq!(
        stats,
        json!({
            "editor_note": "keep me",
            "debt_stock_total": "US$8.87 trillion",
            "debt_service_total": "US$145.12 billion",
            "debt_gni": "23.46%",
            "countries_debt_distress": 2,
            "latest_year": 2024,
            "last_data_update": "16 October 2026"
        })
    );
}

#[test]
fn test_failing_chart_does_not_stop_batch() {
    let raw = tempdir().unwrap();
    for file in ["classifications.csv", "ids_debt_stocks.csv", "ids_debt_service.csv", "dsa.csv"] {
        fs::copy(fixtures().join(file), raw.path().join(file)).unwrap();
    }
    let out = tempdir().unwrap();
    fs::write(out.path().join("chart_3_chart.csv"), "previous").unwrap();

    let mut runner = ChartRunner::new(settings(raw.path(), out.path()));
    let report = runner.run(None, today());

    assert_eq!(report.failed(), 1);
    let failed: Vec<&str> = report.steps.iter().filter(|s| !s.ok).map(|s| s.step.as_str()).collect();
    assert_eq!(failed, vec!["chart_3"]);
    assert!(out.path().join("chart_4_chart.json").is_file());
    assert_eq!(fs::read_to_string(out.path().join("chart_3_chart.csv")).unwrap(), "previous");
}

#[test]
fn test_without_classifications_no_synthetic_rows() {
    let raw = tempdir().unwrap();
    fs::copy(fixtures().join("ids_debt_stocks.csv"), raw.path().join("ids_debt_stocks.csv")).unwrap();
    let out = tempdir().unwrap();

    let mut runner = ChartRunner::new(settings(raw.path(), out.path()));
    let summary = runner.run_chart(ChartId::DebtStocks).unwrap();
    assert_eq!(summary.rows, 5);
}

/// Places Kenya and Ghana in lower-middle-income Africa, nothing else.
struct TwoCountries;

impl ClassificationResolver for TwoCountries {
    fn resolve(
        &self,
        ids: &[String],
        from: IdType,
        to: IdType,
        _on_not_found: OnNotFound,
    ) -> Result<Vec<Option<String>>, ClassificationError> {
        Ok(ids
            .iter()
            .map(|id| match (from, to, id.as_str()) {
                (IdType::EntityCode, IdType::Region, "KEN" | "GHA") => Some("Africa".to_string()),
                (IdType::EntityCode, IdType::IncomeLevel, "KEN" | "GHA") => Some("Lower middle income".to_string()),
                _ => None,
            })
            .collect())
    }
}

#[test]
fn test_ratios_are_not_aggregated() {
    let raw = tempdir().unwrap();
    fs::write(
        raw.path().join("ids_debt_stocks.csv"),
        "indicator_name,indicator_code,year,entity_name,entity_code,counterpart_name,counterpart_code,value\n\
         bilateral,DT.DOD.BLAT.CD,2024,Kenya,KEN,World,WLD,10\n\
         bilateral,DT.DOD.BLAT.CD,2024,Ghana,GHA,World,WLD,20\n\
         debt to GNI,DT.DOD.DECT.GN.ZS,2024,Kenya,KEN,World,WLD,70\n\
         debt to GNI,DT.DOD.DECT.GN.ZS,2024,Ghana,GHA,World,WLD,80\n",
    )
    .unwrap();
    let out = tempdir().unwrap();

    let mut runner = ChartRunner::with_resolver(settings(raw.path(), out.path()), Box::new(TwoCountries));
    runner.run_chart(ChartId::DebtStocks).unwrap();

    let download = fs::read_to_string(out.path().join("chart_1_download.csv")).unwrap();
    let synthetic: Vec<&str> = download
        .lines()
        .filter(|l| l.contains("Africa (excluding high income)"))
        .collect();
    assert_eq!(
        synthetic,
        vec!["bilateral,DT.DOD.BLAT.CD,2024,Africa (excluding high income),All creditors,30.0,bilateral"]
    );
    assert_eq!(download.lines().filter(|l| l.contains("DT.DOD.DECT.GN.ZS")).count(), 2);
}
