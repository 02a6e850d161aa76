//! Run configuration.
//!
//! Loaded from the environment (a `.env` file is picked up first), with
//! defaults for everything. CLI flags override individual fields.
//!
//! | Variable | Default |
//! |---|---|
//! | `DEBT_CHARTS_RAW_DIR` | `raw_data` |
//! | `DEBT_CHARTS_OUTPUT_DIR` | `output` |
//! | `DEBT_CHARTS_START_YEAR` | `2000` |
//! | `DEBT_CHARTS_LATEST_YEAR` | `2024` |
//! | `DEBT_CHARTS_ESTIMATED_YEARS` | `6` |
//! | `DEBT_CHARTS_PRUNE_THRESHOLD` | `0.0` |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::classify::ClassFilter;
use crate::error::ConfigError;
use crate::transform::Labels;

pub const RAW_DIR: &str = "DEBT_CHARTS_RAW_DIR";
pub const OUTPUT_DIR: &str = "DEBT_CHARTS_OUTPUT_DIR";
pub const START_YEAR: &str = "DEBT_CHARTS_START_YEAR";
pub const LATEST_YEAR: &str = "DEBT_CHARTS_LATEST_YEAR";
pub const ESTIMATED_YEARS: &str = "DEBT_CHARTS_ESTIMATED_YEARS";
pub const PRUNE_THRESHOLD: &str = "DEBT_CHARTS_PRUNE_THRESHOLD";

/// Synthetic aggregate appended to the debt stock and debt service extracts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEntity {
    pub label: String,
    pub filter: ClassFilter,
}

impl Default for SyntheticEntity {
    fn default() -> Self {
        Self {
            label: "Africa (excluding high income)".to_string(),
            filter: ClassFilter::region("Africa").excluding_income("High income"),
        }
    }
}

/// Everything a chart run needs to know besides its input data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub raw_dir: PathBuf,
    pub output_dir: PathBuf,
    pub start_year: i64,
    /// Latest year of actual (not projected) data.
    pub latest_year: i64,
    /// Projected years kept in debt service charts past `latest_year`.
    pub estimated_years: i64,
    pub prune_threshold: f64,
    /// Debtor pinned to the top of every chart.
    pub headline_debtor: String,
    pub labels: Labels,
    pub synthetic: SyntheticEntity,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("raw_data"),
            output_dir: PathBuf::from("output"),
            start_year: 2000,
            latest_year: 2024,
            estimated_years: 6,
            prune_threshold: 0.0,
            headline_debtor: "Low & middle income".to_string(),
            labels: Labels::default(),
            synthetic: SyntheticEntity::default(),
        }
    }
}

impl Settings {
    /// Load from the process environment, reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unset or blank keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(dir) = get(RAW_DIR) {
            settings.raw_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(OUTPUT_DIR) {
            settings.output_dir = PathBuf::from(dir);
        }
        if let Some(v) = get(START_YEAR) {
            settings.start_year = parse(START_YEAR, &v)?;
        }
        if let Some(v) = get(LATEST_YEAR) {
            settings.latest_year = parse(LATEST_YEAR, &v)?;
        }
        if let Some(v) = get(ESTIMATED_YEARS) {
            settings.estimated_years = parse(ESTIMATED_YEARS, &v)?;
        }
        if let Some(v) = get(PRUNE_THRESHOLD) {
            settings.prune_threshold = parse(PRUNE_THRESHOLD, &v)?;
        }

        settings.check()?;
        Ok(settings)
    }

    /// Last year kept by charts that include projections.
    pub fn projection_end(&self) -> i64 {
        self.latest_year + self.estimated_years
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        };
        if self.latest_year < self.start_year {
            return Err(invalid(LATEST_YEAR, self.latest_year.to_string()));
        }
        if self.estimated_years < 0 {
            return Err(invalid(ESTIMATED_YEARS, self.estimated_years.to_string()));
        }
        if !self.prune_threshold.is_finite() || self.prune_threshold < 0.0 {
            return Err(invalid(PRUNE_THRESHOLD, self.prune_threshold.to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.projection_end(), 2030);
        assert_eq!(settings.labels.all_creditors, "All creditors");
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            (OUTPUT_DIR, "/tmp/charts"),
            (LATEST_YEAR, "2023"),
            (PRUNE_THRESHOLD, "0.5"),
            (START_YEAR, "  "),
        ]))
        .unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/charts"));
        assert_eq!(settings.latest_year, 2023);
        assert_eq!(settings.prune_threshold, 0.5);
        assert_eq!(settings.start_year, 2000);
    }

    #[test]
    fn test_invalid_value() {
        let err = Settings::from_lookup(lookup(&[(START_YEAR, "two thousand")])).unwrap_err();
        assert!(err.to_string().contains(START_YEAR));

        let err = Settings::from_lookup(lookup(&[(PRUNE_THRESHOLD, "-1")])).unwrap_err();
        assert!(err.to_string().contains(PRUNE_THRESHOLD));
    }

    #[test]
    fn test_latest_before_start_rejected() {
        assert!(Settings::from_lookup(lookup(&[(LATEST_YEAR, "1990")])).is_err());
    }

    #[test]
    fn test_partial_json_settings() {
        let settings: Settings = serde_json::from_str(r#"{"latest_year": 2025}"#).unwrap();
        assert_eq!(settings.latest_year, 2025);
        assert_eq!(settings.synthetic.label, "Africa (excluding high income)");
    }
}
