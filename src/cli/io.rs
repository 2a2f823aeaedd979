//! JSON I/O handling for CLI
//!
//! - Input: a JSON array of features (or one feature) via stdin
//! - Output: single JSON object via stdout
//! - UTF-8 only

use std::io::{self, Read, Write};

use serde_json::Value;

use crate::view::FeatureRow;

use super::errors::{CliError, CliResult};

/// Read the features to write from stdin
pub fn read_features() -> CliResult<Vec<FeatureRow>> {
    let mut input = String::new();
    io::stdin().lock().read_to_string(&mut input)?;
    parse_features(&input)
}

/// Parse either a JSON array of features or a single feature object
pub fn parse_features(input: &str) -> CliResult<Vec<FeatureRow>> {
    if input.trim().is_empty() {
        return Err(CliError::input_error("Empty input"));
    }

    let value: Value =
        serde_json::from_str(input).map_err(|e| CliError::input_error(e.to_string()))?;
    let features: Result<Vec<FeatureRow>, serde_json::Error> = match value {
        Value::Array(_) => serde_json::from_value(value),
        Value::Object(_) => serde_json::from_value::<FeatureRow>(value).map(|row| vec![row]),
        _ => return Err(CliError::input_error("Expected a feature object or an array of features")),
    };
    features.map_err(|e| CliError::input_error(format!("Invalid feature: {}", e)))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    emit(&response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    emit(&response)
}

fn emit(response: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, response)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
