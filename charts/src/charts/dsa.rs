//! Debt sustainability map (chart 5).
//!
//! One row per country with a published risk of debt distress, resolved to
//! its ISO3 code for the map and coloured by risk.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{ClassificationResolver, IdType, OnNotFound};
use crate::error::{ChartResult, ParseError};
use crate::models::Table;

pub const DSA_FILE_STEM: &str = "dsa";

/// Publication dates are presented as e.g. `05 March 2025`.
pub const DATE_FORMAT: &str = "%d %B %Y";

/// Risk rating to map colour.
pub const RISK_COLOURS: [(&str, &str); 4] = [
    ("High", "#ff6224"),
    ("Moderate", "#f5be29"),
    ("Low", "#00c3d1"),
    ("In debt distress", "#73175a"),
];

/// Ratings counted as "in or at high risk of debt distress".
pub const DISTRESS_RATINGS: [&str; 2] = ["In debt distress", "High"];

const DOWNLOAD_COLUMNS: [&str; 5] = [
    "country_name",
    "risk_of_debt_distress",
    "latest_publication",
    "debt_sustainability_assessment",
    "iso3_code",
];

/// One row of the DSA list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsaRow {
    pub country_name: String,
    #[serde(default)]
    pub risk_of_debt_distress: Option<String>,
    #[serde(default)]
    pub latest_publication: Option<String>,
    #[serde(default)]
    pub debt_sustainability_assessment: Option<String>,
}

impl DsaRow {
    /// Rating, if one is published.
    pub fn risk(&self) -> Option<&str> {
        self.risk_of_debt_distress
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    pub fn in_distress(&self) -> bool {
        self.risk().is_some_and(|r| DISTRESS_RATINGS.contains(&r))
    }
}

/// The two DSA tables plus countries the resolver could not place.
#[derive(Debug, Clone, PartialEq)]
pub struct DsaMap {
    pub download: Table,
    pub chart: Table,
    pub unresolved: Vec<String>,
}

pub fn risk_colour(risk: &str) -> Option<&'static str> {
    RISK_COLOURS.iter().find(|(r, _)| *r == risk).map(|(_, c)| *c)
}

/// Parse a publication date in any of the formats the DSA list has used.
pub fn parse_publication_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Timestamps: keep the date part.
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    if let Ok(date) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Some(date);
    }
    ["%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            // Month-only dates
            ["%B %Y", "%b %Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&format!("1 {}", raw), &format!("%d {}", fmt)).ok())
        })
}

/// Build the download and chart tables for the DSA map.
pub fn build(rows: &[DsaRow], resolver: Option<&dyn ClassificationResolver>) -> ChartResult<DsaMap> {
    let rated: Vec<&DsaRow> = rows.iter().filter(|r| r.risk().is_some()).collect();

    let names: Vec<String> = rated.iter().map(|r| r.country_name.clone()).collect();
    let iso3 = match resolver {
        Some(resolver) => resolver.resolve(&names, IdType::Name, IdType::Iso3Code, OnNotFound::Ignore)?,
        None => vec![None; names.len()],
    };

    let mut download = Table::new(DOWNLOAD_COLUMNS);
    let mut unresolved = Vec::new();
    for (i, (row, code)) in rated.iter().zip(iso3).enumerate() {
        let published = match row.latest_publication.as_deref().map(str::trim) {
            None | Some("") => Value::Null,
            Some(raw) => {
                let date = parse_publication_date(raw).ok_or_else(|| ParseError::InvalidCell {
                    line: i + 2,
                    column: "latest_publication".to_string(),
                    value: raw.to_string(),
                    message: "expected a date".to_string(),
                })?;
                Value::String(date.format(DATE_FORMAT).to_string())
            }
        };
        if code.is_none() {
            unresolved.push(row.country_name.clone());
        }
        download.push_row(vec![
            Value::String(row.country_name.clone()),
            row.risk().map(|r| Value::String(r.to_string())).unwrap_or(Value::Null),
            published,
            row.debt_sustainability_assessment
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            code.map(Value::String).unwrap_or(Value::Null),
        ]);
    }

    let rows = download
        .rows()
        .iter()
        .map(|row| {
            let colour = row[1].as_str().and_then(risk_colour);
            let mut row = row.clone();
            row.push(colour.map(|c| Value::String(c.to_string())).unwrap_or(Value::Null));
            row
        })
        .collect();
    let chart = Table::from_rows(DOWNLOAD_COLUMNS.into_iter().chain(["color"]), rows);

    Ok(DsaMap {
        download,
        chart,
        unresolved,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassificationFact, LookupResolver};
    use serde_json::json;

    fn row(name: &str, risk: Option<&str>, date: &str) -> DsaRow {
        DsaRow {
            country_name: name.into(),
            risk_of_debt_distress: risk.map(String::from),
            latest_publication: Some(date.into()),
            debt_sustainability_assessment: Some("Sustainable".into()),
        }
    }

    fn resolver() -> Box<dyn ClassificationResolver> {
        Box::new(LookupResolver::new(vec![ClassificationFact {
            entity_code: "ZMB".into(),
            entity_name: Some("Zambia".into()),
            iso3_code: Some("ZMB".into()),
            region: Some("Africa".into()),
            income_level: Some("Lower middle income".into()),
        }]))
    }

    #[test]
    fn test_unrated_countries_dropped() {
        let rows = vec![
            row("Zambia", Some("In debt distress"), "2024-06-30"),
            row("Kenya", None, "2024-01-01"),
            row("Ghana", Some("  "), "2024-01-01"),
        ];
        let map = build(&rows, Some(resolver().as_ref())).unwrap();
        assert_eq!(map.download.len(), 1);
    }

    #[test]
    fn test_iso3_colour_and_date() {
        let rows = vec![row("Zambia", Some("In debt distress"), "2024-06-30")];
        let map = build(&rows, Some(resolver().as_ref())).unwrap();

        assert_eq!(map.chart.get(0, "iso3_code"), Some(&json!("ZMB")));
        assert_eq!(map.chart.get(0, "color"), Some(&json!("#73175a")));
        assert_eq!(map.chart.get(0, "latest_publication"), Some(&json!("30 June 2024")));
        assert!(!map.download.has_column("color"));
        assert!(map.unresolved.is_empty());
    }

    #[test]
    fn test_unknown_country_reported() {
        let rows = vec![row("Atlantis", Some("Low"), "March 2023")];
        let map = build(&rows, Some(resolver().as_ref())).unwrap();
        assert_eq!(map.unresolved, vec!["Atlantis".to_string()]);
        assert_eq!(map.chart.get(0, "iso3_code"), Some(&Value::Null));
        assert_eq!(map.chart.get(0, "latest_publication"), Some(&json!("01 March 2023")));
        assert_eq!(map.chart.get(0, "color"), Some(&json!("#00c3d1")));
    }

    #[test]
    fn test_bad_date_is_an_error() {
        let rows = vec![row("Zambia", Some("High"), "not a date")];
        assert!(build(&rows, None).is_err());
    }

    #[test]
    fn test_publication_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 3, 5);
        assert_eq!(parse_publication_date("2025-03-05"), expected);
        assert_eq!(parse_publication_date("2025-03-05T00:00:00"), expected);
        assert_eq!(parse_publication_date("05 March 2025"), expected);
        assert_eq!(parse_publication_date("March 5, 2025"), expected);
    }

    #[test]
    fn test_in_distress() {
        assert!(row("A", Some("High"), "").in_distress());
        assert!(row("A", Some("In debt distress"), "").in_distress());
        assert!(!row("A", Some("Moderate"), "").in_distress());
        assert!(!row("A", None, "").in_distress());
    }
}
