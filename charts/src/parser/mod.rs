//! Raw extract reader with encoding and delimiter auto-detection.
//!
//! Extracts are CSV (any common delimiter, UTF-8 or Latin-1 / Windows-1252)
//! or JSON arrays of records. Observation extracts are checked against the
//! required columns and typed on the way in: `year` as an integer, `value`
//! as a nullable number, everything else as text.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::models::{columns, number, Table};

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes using the given encoding. Unknown encodings fall back to
/// lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).into_owned(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.into_owned()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Read a file and decode it with the detected encoding.
pub fn read_text(path: &Path) -> ParseResult<String> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let encoding = detect_encoding(&bytes);
    Ok(decode_content(&bytes, &encoding))
}

enum Format {
    Csv,
    Json,
}

fn format_of(path: &Path) -> ParseResult<Format> {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("csv") | Some("txt") | Some("tsv") => Ok(Format::Csv),
        Some("json") => Ok(Format::Json),
        _ => Err(ParseError::UnsupportedFormat(path.to_path_buf())),
    }
}

fn csv_reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(content))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}

/// Deserialize every record of a CSV or JSON file into `T`.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> ParseResult<Vec<T>> {
    let content = read_text(path)?;
    match format_of(path)? {
        Format::Json => Ok(serde_json::from_str(&content)?),
        Format::Csv => {
            let mut reader = csv_reader(&content);
            let mut records = Vec::new();
            for record in reader.deserialize() {
                records.push(record?);
            }
            Ok(records)
        }
    }
}

/// Read any CSV or JSON table without a required schema. Integer-looking
/// cells become integers, other numbers floats, empty cells `null`.
pub fn read_table(path: &Path) -> ParseResult<Table> {
    let content = read_text(path)?;
    match format_of(path)? {
        Format::Csv => {
            if content.trim().is_empty() {
                return Err(ParseError::EmptyFile);
            }
            let mut reader = csv_reader(&content);
            let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            let mut table = Table::new(headers);
            for record in reader.records() {
                table.push_row(record?.iter().map(loose_cell).collect());
            }
            Ok(table)
        }
        Format::Json => {
            let records: Vec<Value> = serde_json::from_str(&content)?;
            let first = records
                .first()
                .and_then(Value::as_object)
                .ok_or(ParseError::EmptyFile)?;
            let headers: Vec<&str> = first.keys().map(String::as_str).collect();
            Ok(Table::from_records(&headers, &records))
        }
    }
}

/// Cell typed from text: empty is null, then integer, then finite float,
/// else string. Also used for values given on the command line.
pub fn loose_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::from(i);
    }
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => number(f),
        _ => Value::String(raw.to_string()),
    }
}

/// Read an observation extract (one row per debtor × creditor × indicator × year).
pub fn read_observations(path: &Path) -> ParseResult<Table> {
    let content = read_text(path)?;
    let source = path.display().to_string();
    match format_of(path)? {
        Format::Csv => parse_observations_csv(&content, &source),
        Format::Json => {
            let records: Vec<Value> = serde_json::from_str(&content)?;
            parse_observations_json(&records, &source)
        }
    }
}

/// Parse observation CSV content.
pub fn parse_observations_csv(content: &str, source: &str) -> ParseResult<Table> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyFile);
    }

    let mut reader = csv_reader(content);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    check_required(&headers, source)?;

    let mut table = Table::new(headers.clone());
    for record in reader.records() {
        let record = record?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(column, raw)| typed_cell(column, raw, line))
            .collect::<ParseResult<Vec<Value>>>()?;
        table.push_row(row);
    }
    Ok(table)
}

/// Parse observation records already decoded from JSON.
pub fn parse_observations_json(records: &[Value], source: &str) -> ParseResult<Table> {
    let first = records
        .first()
        .and_then(Value::as_object)
        .ok_or(ParseError::EmptyFile)?;

    // Required columns first, in their canonical order, then the rest.
    let mut headers: Vec<String> = columns::OBSERVATION.iter().map(|c| c.to_string()).collect();
    let extra: Vec<String> = first.keys().filter(|k| !headers.contains(k)).cloned().collect();
    headers.extend(extra);
    check_required(&first.keys().cloned().collect::<Vec<_>>(), source)?;

    let empty = Map::new();
    let mut table = Table::new(headers.clone());
    for (i, record) in records.iter().enumerate() {
        let obj = record.as_object().unwrap_or(&empty);
        let row = headers
            .iter()
            .map(|column| match obj.get(column) {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(Value::String(s)) => typed_cell(column, s, i + 1),
                Some(other) => typed_cell(column, &other.to_string(), i + 1),
            })
            .collect::<ParseResult<Vec<Value>>>()?;
        table.push_row(row);
    }
    Ok(table)
}

fn check_required(headers: &[String], source: &str) -> ParseResult<()> {
    for required in columns::OBSERVATION {
        if !headers.iter().any(|h| h == required) {
            return Err(ParseError::MissingColumn {
                file: source.to_string(),
                column: required.to_string(),
            });
        }
    }
    Ok(())
}

fn is_missing(raw: &str) -> bool {
    matches!(raw.trim(), "" | "NA" | "NaN" | "nan" | "null" | "None")
}

fn typed_cell(column: &str, raw: &str, line: usize) -> ParseResult<Value> {
    let invalid = |message: &str| ParseError::InvalidCell {
        line,
        column: column.to_string(),
        value: raw.to_string(),
        message: message.to_string(),
    };

    match column {
        columns::YEAR => {
            let parsed: f64 = raw.trim().parse().map_err(|_| invalid("expected a year"))?;
            if parsed.fract() != 0.0 {
                return Err(invalid("expected a whole year"));
            }
            Ok(Value::from(parsed as i64))
        }
        columns::VALUE => {
            if is_missing(raw) {
                return Ok(Value::Null);
            }
            let parsed: f64 = raw.trim().parse().map_err(|_| invalid("expected a number"))?;
            Ok(number(parsed))
        }
        _ if raw.is_empty() => Ok(Value::Null),
        _ => Ok(Value::String(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const HEADER: &str =
        "indicator_name,indicator_code,year,entity_name,entity_code,counterpart_name,counterpart_code,value";

    #[test]
    fn test_parse_observations_types_cells() {
        let csv = format!(
            "{HEADER}\nBilateral,DT.DOD.BLAT.CD,2020,Kenya,KEN,World,WLD,100.5\nBilateral,DT.DOD.BLAT.CD,2021.0,Kenya,KEN,World,WLD,\n"
        );
        let table = parse_observations_csv(&csv, "test").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "year"), Some(&json!(2020)));
        assert_eq!(table.get(0, "value"), Some(&json!(100.5)));
        assert_eq!(table.get(1, "year"), Some(&json!(2021)));
        assert_eq!(table.get(1, "value"), Some(&Value::Null));
        assert_eq!(table.get(0, "counterpart_name"), Some(&json!("World")));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let csv = "entity_name,year,value\nKenya,2020,1\n";
        let err = parse_observations_csv(csv, "ids_debt_stocks.csv").unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn { .. }));
        assert!(err.to_string().contains("ids_debt_stocks.csv"));
    }

    #[test]
    fn test_invalid_year_reports_line() {
        let csv = format!("{HEADER}\nB,X,twenty,Kenya,KEN,World,WLD,1\n");
        let err = parse_observations_csv(&csv, "test").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Line 2"));
        assert!(msg.contains("year"));
    }

    #[test]
    fn test_empty_file_error() {
        assert!(matches!(parse_observations_csv("", "test"), Err(ParseError::EmptyFile)));
    }

    #[test]
    fn test_semicolon_extract() {
        let csv = format!("{}\nB;X;2020;Kenya;KEN;World;WLD;3\n", HEADER.replace(',', ";"));
        let table = parse_observations_csv(&csv, "test").unwrap();
        assert_eq!(table.get(0, "value"), Some(&json!(3.0)));
    }

    #[test]
    fn test_json_extract_keeps_extra_columns() {
        let records = vec![json!({
            "indicator_name": "Bilateral",
            "indicator_code": "DT.DOD.BLAT.CD",
            "year": 2020,
            "entity_name": "Kenya",
            "entity_code": "KEN",
            "counterpart_name": "World",
            "counterpart_code": "WLD",
            "value": 12,
            "source": "IDS"
        })];
        let table = parse_observations_json(&records, "test").unwrap();
        assert_eq!(table.columns().last().map(String::as_str), Some("source"));
        assert_eq!(table.get(0, "year"), Some(&json!(2020)));
        assert_eq!(table.get(0, "value"), Some(&json!(12.0)));
    }

    #[test]
    fn test_read_table_infers_cells() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "debtor_name,year,bilateral").unwrap();
        writeln!(file, "Kenya,2020,1.5").unwrap();
        writeln!(file, "Ghana,2021,").unwrap();
        let table = read_table(file.path()).unwrap();
        assert_eq!(table.get(0, "year"), Some(&json!(2020)));
        assert_eq!(table.get(0, "bilateral"), Some(&json!(1.5)));
        assert_eq!(table.get(1, "bilateral"), Some(&Value::Null));
        assert_eq!(table.get(1, "debtor_name"), Some(&json!("Ghana")));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), b',');
        assert_eq!(detect_delimiter("a\tb\tc"), b'\t');
    }

    #[test]
    fn test_latin1_decoding() {
        // "Côte" in ISO-8859-1
        let bytes: &[u8] = &[0x43, 0xF4, 0x74, 0x65];
        assert_eq!(decode_content(bytes, "iso-8859-1"), "Côte");
    }

    #[test]
    fn test_read_observations_from_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        writeln!(file, "B,DT.DOD.BLAT.CD,2020,Kenya,KEN,World,WLD,7").unwrap();
        let table = read_observations(file.path()).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        assert!(matches!(
            read_observations(file.path()),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }
}
