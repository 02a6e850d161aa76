//! debt-charts CLI - Build the debt overview charts from IDS extracts
//!
//! # Main Commands
//!
//! ```bash
//! debt-charts run                   # All charts, key statistics, update stamp
//! debt-charts run --only 3          # A single chart
//! debt-charts chart 1               # Same, without the batch report
//! debt-charts key-stats             # Merge key statistics into key_stats.json
//! debt-charts last-update           # Stamp key_stats.json with today's date
//! ```
//!
//! # Standalone Tools
//!
//! ```bash
//! debt-charts sort table.csv --pin "debtor_name=Low & middle income"
//! debt-charts synthesize ids_debt_stocks.csv --region Africa --exclude-income "High income"
//! debt-charts validate output/chart_1_chart.json --categories 5
//! ```

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use debt_charts::{
    charts::{ChartId, ChartRunner},
    classify::{ClassFilter, LookupResolver},
    config::Settings,
    output::table_to_csv,
    parser::{read_observations, read_table},
    transform::{sort, synthesize, AggregateOp, PinSpec},
    validation::validate_chart_records,
    ValidationError,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "debt-charts")]
#[command(about = "Build debt overview charts from International Debt Statistics extracts", long_about = None)]
struct Cli {
    /// Raw extract directory (overrides DEBT_CHARTS_RAW_DIR)
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,

    /// Output directory (overrides DEBT_CHARTS_OUTPUT_DIR)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Latest year of actual data (overrides DEBT_CHARTS_LATEST_YEAR)
    #[arg(long, global = true)]
    latest_year: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every chart, key statistics and the update stamp
    Run {
        /// Only run this chart (1-5)
        #[arg(long)]
        only: Option<ChartId>,
    },

    /// Build a single chart (1-5)
    Chart { chart: ChartId },

    /// Compute key statistics and merge them into key_stats.json
    KeyStats,

    /// Set last_data_update in key_stats.json
    LastUpdate {
        /// Date to record (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Sort a table with pinned values first
    Sort {
        /// Input CSV or JSON file
        input: PathBuf,

        /// Pinned values, `column=value1|value2`; repeat for more columns
        #[arg(short, long = "pin", required = true)]
        pins: Vec<String>,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append a synthetic aggregate entity to an observation extract
    Synthesize {
        /// Input observation extract (CSV or JSON)
        input: PathBuf,

        /// Classification file (default: <raw-dir>/classifications.csv)
        #[arg(long)]
        classifications: Option<PathBuf>,

        /// Region the members must belong to
        #[arg(long)]
        region: Option<String>,

        /// Income levels to leave out
        #[arg(long)]
        exclude_income: Vec<String>,

        /// Income levels to keep (default: all)
        #[arg(long)]
        include_income: Vec<String>,

        /// Name of the synthetic entity
        #[arg(long, default_value = "Africa (excluding high income)")]
        label: String,

        /// Aggregation: sum, mean, min, max, count, median
        #[arg(long, default_value = "sum")]
        op: String,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a chart JSON file
    Validate {
        /// Chart JSON file (array of records)
        input: PathBuf,

        /// Expected number of y values per record
        #[arg(long)]
        categories: Option<usize>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { only } => cmd_run(settings, only),
        Commands::Chart { chart } => cmd_chart(settings, chart),
        Commands::KeyStats => cmd_key_stats(settings),
        Commands::LastUpdate { date } => cmd_last_update(settings, date),
        Commands::Sort { input, pins, output } => cmd_sort(&input, &pins, output.as_deref()),
        Commands::Synthesize {
            input,
            classifications,
            region,
            exclude_income,
            include_income,
            label,
            op,
            output,
        } => {
            let filter = ClassFilter {
                region,
                include_income_levels: include_income,
                exclude_income_levels: exclude_income,
            };
            let classifications =
                classifications.unwrap_or_else(|| settings.raw_dir.join("classifications.csv"));
            cmd_synthesize(&input, &classifications, &filter, &label, &op, output.as_deref())
        }
        Commands::Validate { input, categories } => cmd_validate(&input, categories),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = &cli.raw_dir {
        settings.raw_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        settings.output_dir = dir.clone();
    }
    if let Some(year) = cli.latest_year {
        settings.latest_year = year;
    }
    settings.check()?;
    Ok(settings)
}

fn cmd_run(settings: Settings, only: Option<ChartId>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Raw data: {}", settings.raw_dir.display());
    eprintln!("Output:   {}", settings.output_dir.display());

    let mut runner = ChartRunner::new(settings);
    let report = runner.run(only, Local::now().date_naive());

    eprintln!();
    for step in &report.steps {
        let mark = if step.ok { "ok" } else { "FAILED" };
        eprintln!("   {:<12} {:<7} {}", step.step, mark, step.detail);
    }

    if !report.is_success() {
        return Err(format!("{} of {} steps failed", report.failed(), report.steps.len()).into());
    }
    eprintln!("\nDone.");
    Ok(())
}

fn cmd_chart(settings: Settings, chart: ChartId) -> Result<(), Box<dyn std::error::Error>> {
    let mut runner = ChartRunner::new(settings);
    let summary = runner.run_chart(chart)?;
    for file in &summary.files {
        eprintln!("   Written: {}", file.display());
    }
    Ok(())
}

fn cmd_key_stats(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let mut runner = ChartRunner::new(settings);
    let stats = runner.key_stats()?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn cmd_last_update(settings: Settings, date: Option<NaiveDate>) -> Result<(), Box<dyn std::error::Error>> {
    let runner = ChartRunner::new(settings);
    let stats = runner.last_update(date.unwrap_or_else(|| Local::now().date_naive()))?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn cmd_sort(input: &Path, pins: &[String], output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Sorting: {}", input.display());

    let mut spec = PinSpec::new();
    for entry in pins {
        let pinned = PinSpec::parse_entry(entry)
            .ok_or_else(|| format!("invalid pin '{}', expected column=value1|value2", entry))?;
        spec.push(pinned);
    }

    let table = read_table(input)?;
    let sorted = sort(&table, &spec)?;
    eprintln!("   {} rows", sorted.len());

    write_output(&table_to_csv(&sorted)?, output)
}

fn cmd_synthesize(
    input: &Path,
    classifications: &Path,
    filter: &ClassFilter,
    label: &str,
    op: &str,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Synthesizing '{}' from: {}", label, input.display());

    let aggregation: AggregateOp = op.parse()?;
    let resolver = LookupResolver::from_path(classifications)?;
    let table = read_observations(input)?;

    let result = synthesize(&table, &resolver, filter, &aggregation, label)?;
    eprintln!("   Input rows: {}", table.len());
    eprintln!("   Synthetic rows: {}", result.synthetic_rows);
    if !result.unresolved.is_empty() {
        eprintln!("   Unclassified entities: {}", result.unresolved.len());
        for entity in result.unresolved.iter().take(5) {
            eprintln!("     - {}", entity.entity_name);
        }
    }

    write_output(&table_to_csv(&result.table)?, output)
}

fn cmd_validate(input: &Path, categories: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Validating: {}", input.display());

    let content = fs::read_to_string(input)?;
    let records: Value = serde_json::from_str(&content)?;

    match validate_chart_records(&records, categories) {
        Ok(()) => {
            let count = records.as_array().map_or(0, Vec::len);
            eprintln!("   All {} records valid", count);
            Ok(())
        }
        Err(ValidationError::SchemaError { errors }) => {
            for err in errors.iter().take(10) {
                eprintln!("   - {}", err);
            }
            Err(format!("{} validation errors", errors.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn write_output(content: &[u8], path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            debt_charts::output::write_atomic(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            print!("{}", String::from_utf8_lossy(content));
        }
    }
    Ok(())
}
