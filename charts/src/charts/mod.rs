//! Chart catalogue.
//!
//! Charts 1-4 are declarative [`ChartSpec`]s over an observation extract;
//! chart 5 is the debt sustainability map built from the DSA list. The
//! [`runner`] loads extracts, runs charts and writes their files.

pub mod dsa;
pub mod key_stats;
pub mod runner;

use std::fmt;
use std::str::FromStr;

use crate::config::Settings;
use crate::models::columns;
use crate::transform::{CategoryMap, ChartSpec, Combine, OutputShape, PinSpec, YearRange};

pub use runner::{ChartRunner, ChartSummary, RunReport};

/// First year of the currency composition series.
pub const CURRENCY_START_YEAR: i64 = 2001;

/// Debt stock indicators and their debt type.
pub const DEBT_STOCK_TYPES: [(&str, &str); 5] = [
    ("DT.DOD.BLAT.CD", "bilateral"),
    ("DT.DOD.MLAT.CD", "multilateral"),
    ("DT.DOD.PBND.CD", "bonds"),
    ("DT.DOD.PCBK.CD", "commercial banks"),
    ("DT.DOD.PROP.CD", "other private"),
];

/// Debt service indicators: (code, debt type, principal or interest).
pub const DEBT_SERVICE_TYPES: [(&str, &str, &str); 10] = [
    ("DT.AMT.BLAT.CD", "bilateral", "principal"),
    ("DT.AMT.MLAT.CD", "multilateral", "principal"),
    ("DT.AMT.PBND.CD", "bonds", "principal"),
    ("DT.AMT.PCBK.CD", "commercial banks", "principal"),
    ("DT.AMT.PROP.CD", "other private", "principal"),
    ("DT.INT.BLAT.CD", "bilateral", "interest"),
    ("DT.INT.MLAT.CD", "multilateral", "interest"),
    ("DT.INT.PBND.CD", "bonds", "interest"),
    ("DT.INT.PCBK.CD", "commercial banks", "interest"),
    ("DT.INT.PROP.CD", "other private", "interest"),
];

pub const CURRENCIES: [(&str, &str); 5] = [
    ("DT.CUR.USDL.ZS", "U.S. dollars"),
    ("DT.CUR.EURO.ZS", "Euro"),
    ("DT.CUR.SDRW.ZS", "SDR"),
    ("DT.CUR.JYEN.ZS", "Japanese yen"),
    ("DT.CUR.UKPS.ZS", "Pound sterling"),
];

pub const OTHER_CURRENCIES: &str = "All other currencies";

/// Raw observation extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    DebtStocks,
    DebtService,
    CurrencyComposition,
}

impl Dataset {
    /// File stem under the raw data directory.
    pub fn stem(self) -> &'static str {
        match self {
            Dataset::DebtStocks => "ids_debt_stocks",
            Dataset::DebtService => "ids_debt_service",
            Dataset::CurrencyComposition => "ids_currency_composition",
        }
    }

    /// Whether the synthetic aggregate entity is added on load.
    pub fn synthesizes(self) -> bool {
        matches!(self, Dataset::DebtStocks | Dataset::DebtService)
    }

    /// Level indicators (current US$) the synthetic entity is summed over.
    /// Ratios such as debt to GNI are never aggregated.
    pub fn level_indicators(self) -> Vec<&'static str> {
        match self {
            Dataset::DebtStocks => DEBT_STOCK_TYPES.iter().map(|(code, _)| *code).collect(),
            Dataset::DebtService => DEBT_SERVICE_TYPES.iter().map(|(code, _, _)| *code).collect(),
            Dataset::CurrencyComposition => Vec::new(),
        }
    }
}

/// The five published charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChartId {
    DebtStocks,
    DebtService,
    CurrencyComposition,
    PrincipalInterest,
    DsaMap,
}

impl ChartId {
    pub const ALL: [ChartId; 5] = [
        ChartId::DebtStocks,
        ChartId::DebtService,
        ChartId::CurrencyComposition,
        ChartId::PrincipalInterest,
        ChartId::DsaMap,
    ];

    pub fn number(self) -> u8 {
        match self {
            ChartId::DebtStocks => 1,
            ChartId::DebtService => 2,
            ChartId::CurrencyComposition => 3,
            ChartId::PrincipalInterest => 4,
            ChartId::DsaMap => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.number() == n)
    }

    /// File prefix, e.g. `chart_1`.
    pub fn name(self) -> String {
        format!("chart_{}", self.number())
    }

    pub fn title(self) -> &'static str {
        match self {
            ChartId::DebtStocks => "debt stocks",
            ChartId::DebtService => "total debt service",
            ChartId::CurrencyComposition => "currency composition",
            ChartId::PrincipalInterest => "debt service by principal and interest",
            ChartId::DsaMap => "debt sustainability map",
        }
    }

    /// Extract the chart reads, `None` for the DSA map.
    pub fn dataset(self) -> Option<Dataset> {
        match self {
            ChartId::DebtStocks => Some(Dataset::DebtStocks),
            ChartId::DebtService | ChartId::PrincipalInterest => Some(Dataset::DebtService),
            ChartId::CurrencyComposition => Some(Dataset::CurrencyComposition),
            ChartId::DsaMap => None,
        }
    }

    /// Assembly parameters, `None` for the DSA map.
    pub fn spec(self, settings: &Settings) -> Option<ChartSpec> {
        let name = self.name();
        let spec = match self {
            ChartId::DebtStocks => ChartSpec::new(
                name,
                YearRange::from(settings.start_year),
                DEBT_STOCK_TYPES
                    .iter()
                    .fold(CategoryMap::new(), |m, (code, cat)| m.map(*code, *cat)),
            )
            .pins(headline_pins(settings))
            .prune_zero_pairs(settings.prune_threshold),

            ChartId::DebtService => ChartSpec::new(
                name,
                YearRange::between(settings.start_year, settings.projection_end()),
                debt_type_order()
                    .into_iter()
                    .fold(CategoryMap::new(), |m, (code, cat)| m.map(code, cat)),
            )
            .combine(Combine::Sum)
            .pins(headline_pins(settings))
            .prune_zero_pairs(settings.prune_threshold),

            ChartId::CurrencyComposition => ChartSpec::new(
                name,
                YearRange::from(CURRENCY_START_YEAR),
                CURRENCIES
                    .iter()
                    .fold(CategoryMap::new(), |m, (code, cat)| m.map(*code, *cat))
                    .with_residual(OTHER_CURRENCIES),
            )
            .only_creditor(settings.labels.all_creditors.clone())
            .pins(PinSpec::new().pin(columns::DEBTOR_NAME, settings.headline_debtor.as_str()))
            .output(OutputShape::Table),

            ChartId::PrincipalInterest => ChartSpec::new(
                name,
                YearRange::between(settings.start_year, settings.projection_end()),
                DEBT_SERVICE_TYPES
                    .iter()
                    .filter(|(_, _, kind)| *kind == "principal")
                    .chain(DEBT_SERVICE_TYPES.iter().filter(|(_, _, kind)| *kind == "interest"))
                    .fold(CategoryMap::new(), |m, (code, _, kind)| m.map(*code, *kind)),
            )
            .table_columns(["interest", "principal"])
            .combine(Combine::Sum)
            .pins(headline_pins(settings))
            .prune_zero_pairs(settings.prune_threshold),

            ChartId::DsaMap => return None,
        };
        Some(spec.labels(settings.labels.clone()))
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.title())
    }
}

impl FromStr for ChartId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = s.trim().trim_start_matches("chart_");
        n.parse::<u8>()
            .ok()
            .and_then(ChartId::from_number)
            .ok_or_else(|| format!("unknown chart '{}', expected 1-5", s))
    }
}

fn headline_pins(settings: &Settings) -> PinSpec {
    PinSpec::new()
        .pin(columns::DEBTOR_NAME, settings.headline_debtor.as_str())
        .pin(columns::CREDITOR_NAME, settings.labels.all_creditors.as_str())
}

/// Debt service codes keyed by debt type, in debt stock column order, so
/// charts 1 and 2 share their `y_values` layout.
fn debt_type_order() -> Vec<(&'static str, &'static str)> {
    DEBT_STOCK_TYPES
        .iter()
        .flat_map(|(_, category)| {
            DEBT_SERVICE_TYPES
                .iter()
                .filter(move |(_, cat, _)| cat == category)
                .map(|(code, cat, _)| (*code, *cat))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_numbers_round_trip() {
        for id in ChartId::ALL {
            assert_eq!(ChartId::from_number(id.number()), Some(id));
        }
        assert_eq!("3".parse::<ChartId>().unwrap(), ChartId::CurrencyComposition);
        assert_eq!("chart_5".parse::<ChartId>().unwrap(), ChartId::DsaMap);
        assert!("9".parse::<ChartId>().is_err());
    }

    #[test]
    fn test_debt_service_shares_debt_stock_columns() {
        let settings = Settings::default();
        let stocks = ChartId::DebtStocks.spec(&settings).unwrap();
        let service = ChartId::DebtService.spec(&settings).unwrap();
        assert_eq!(stocks.categories.categories(), service.categories.categories());
        assert_eq!(service.categories.category_of("DT.INT.PCBK.CD"), Some("commercial banks"));
        assert_eq!(service.years.end, Some(2030));
    }

    #[test]
    fn test_principal_before_interest() {
        let spec = ChartId::PrincipalInterest.spec(&Settings::default()).unwrap();
        assert_eq!(spec.categories.categories(), vec!["principal", "interest"]);
        assert_eq!(spec.table_columns, Some(vec!["interest".to_string(), "principal".to_string()]));
        assert_eq!(spec.combine, Combine::Sum);
    }

    #[test]
    fn test_level_indicators_exclude_ratios() {
        let stocks = Dataset::DebtStocks.level_indicators();
        assert_eq!(stocks.len(), 5);
        assert!(!stocks.contains(&"DT.DOD.DECT.GN.ZS"));
        assert_eq!(Dataset::DebtService.level_indicators().len(), 10);
        assert!(Dataset::CurrencyComposition.level_indicators().is_empty());
    }

    #[test]
    fn test_currency_chart_shape() {
        let spec = ChartId::CurrencyComposition.spec(&Settings::default()).unwrap();
        assert_eq!(spec.categories.categories().len(), 6);
        assert_eq!(spec.categories.residual(), Some(OTHER_CURRENCIES));
        assert_eq!(spec.output, OutputShape::Table);
        assert_eq!(spec.prune_threshold, None);
        assert_eq!(spec.creditor.as_deref(), Some("All creditors"));
    }

    #[test]
    fn test_dsa_map_has_no_spec() {
        assert!(ChartId::DsaMap.spec(&Settings::default()).is_none());
        assert!(ChartId::DsaMap.dataset().is_none());
    }
}
