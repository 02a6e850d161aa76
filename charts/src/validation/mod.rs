//! JSON Schema validation for chart payloads.
//!
//! Chart JSON is checked against `schemas/chart-records.json` (Draft 7,
//! embedded at compile time) before it is written. The schema fixes the
//! record shape; the expected `y_values` length is added per chart.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use debt_charts::validation::validate_chart_records;
//!
//! let records = json!([
//!     {"filter1_values": "Kenya", "x_values": 2020, "filter2_values": "All creditors", "y_values": [1.0, null]}
//! ]);
//! assert!(validate_chart_records(&records, Some(2)).is_ok());
//! ```

use serde_json::Value;

use crate::error::ValidationError;

const CHART_RECORDS_SCHEMA: &str = include_str!("../../schemas/chart-records.json");

/// Validate `data` against `schema`.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error otherwise
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator =
        jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check, no error details.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Embedded chart records schema, optionally pinned to `categories` slots
/// per `y_values`.
pub fn chart_records_schema(categories: Option<usize>) -> Result<Value, ValidationError> {
    let mut schema: Value = serde_json::from_str(CHART_RECORDS_SCHEMA)
        .map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;

    if let Some(n) = categories {
        let y_values = schema
            .pointer_mut("/items/properties/y_values")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| ValidationError::InvalidSchema("missing y_values definition".to_string()))?;
        y_values.insert("minItems".to_string(), Value::from(n));
        y_values.insert("maxItems".to_string(), Value::from(n));
    }
    Ok(schema)
}

/// Validate a chart JSON payload.
pub fn validate_chart_records(data: &Value, categories: Option<usize>) -> Result<(), ValidationError> {
    let schema = chart_records_schema(categories)?;
    validate(&schema, data).map_err(|errors| {
        if errors.len() == 1 && errors[0].starts_with("Invalid schema") {
            ValidationError::InvalidSchema(errors[0].clone())
        } else {
            ValidationError::SchemaError { errors }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(y: Value) -> Value {
        json!({
            "filter1_values": "Low & middle income",
            "x_values": 2020,
            "filter2_values": "All creditors",
            "y_values": y
        })
    }

    #[test]
    fn test_embedded_schema_parses() {
        assert!(chart_records_schema(None).is_ok());
        assert!(chart_records_schema(Some(5)).is_ok());
    }

    #[test]
    fn test_valid_records() {
        let data = json!([record(json!([1.0, null, 0.0]))]);
        assert!(validate_chart_records(&data, Some(3)).is_ok());
        assert!(validate_chart_records(&json!([]), Some(3)).is_ok());
    }

    #[test]
    fn test_wrong_y_length() {
        let data = json!([record(json!([1.0, 2.0]))]);
        assert!(validate_chart_records(&data, None).is_ok());
        let err = validate_chart_records(&data, Some(5)).unwrap_err();
        assert!(matches!(err, ValidationError::SchemaError { .. }));
    }

    #[test]
    fn test_fractional_year_rejected() {
        let mut bad = record(json!([1.0]));
        bad["x_values"] = json!(2020.5);
        let err = validate_chart_records(&json!([bad]), Some(1)).unwrap_err();
        match err {
            ValidationError::SchemaError { errors } => assert!(!errors.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_field() {
        let data = json!([{ "filter1_values": "Kenya", "x_values": 2020 }]);
        let schema = chart_records_schema(None).unwrap();
        assert!(!is_valid(&schema, &data));
        let errors = validate(&schema, &data).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("filter2_values")));
    }
}
