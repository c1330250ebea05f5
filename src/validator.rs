//! Response validation: expected status plus step assertions.
//!
//! Step `assert` entries:
//! - `status`: expected status code, overriding the API definition
//! - `contains`: a string or list of strings the body must contain
//! - any other key: dot path into the JSON body, compared for
//!   equality with the given value

use crate::extractor::lookup;
use crate::model::Endpoint;
use crate::transport::TransportResponse;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub failure_reason: Option<String>,
    pub expected_status: Option<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>, expected: Option<String>) -> Self {
        Self {
            passed: errors.is_empty(),
            failure_reason: (!errors.is_empty()).then(|| errors.join("; ")),
            expected_status: expected,
        }
    }
}

pub trait Validator: Send + Sync {
    fn validate(
        &self,
        endpoint: &Endpoint,
        assertions: &HashMap<String, Value>,
        response: &TransportResponse,
    ) -> ValidationResult;
}

/// Pass/fail purely on the 2xx range. Used when no validator is
/// configured.
pub fn check_success_range(response: &TransportResponse) -> ValidationResult {
    let errors = if (200..300).contains(&response.status) {
        vec![]
    } else {
        vec![format!(
            "status code {} is not in the success range",
            response.status
        )]
    };
    ValidationResult::from_errors(errors, Some("2xx".to_string()))
}

/// Lowest declared 2xx response, else the lowest declared numeric
/// code. `None` when the endpoint declares no numeric codes.
pub fn expected_status(endpoint: &Endpoint) -> Option<u16> {
    let mut codes: Vec<u16> = endpoint
        .responses
        .keys()
        .filter_map(|code| code.parse().ok())
        .collect();
    codes.sort_unstable();
    codes
        .iter()
        .copied()
        .find(|c| (200..300).contains(c))
        .or_else(|| codes.first().copied())
}

/// Validates against the endpoint's declared responses and the step's
/// assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusValidator;

impl Validator for StatusValidator {
    fn validate(
        &self,
        endpoint: &Endpoint,
        assertions: &HashMap<String, Value>,
        response: &TransportResponse,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let mut json_expectations = HashMap::new();
        let mut contains = Vec::new();
        let mut asserted_status = None;

        for (key, expected) in assertions {
            match key.as_str() {
                "status" => match status_from_value(expected) {
                    Some(code) => asserted_status = Some(code),
                    None => errors.push(format!(
                        "assertion 'status' is not a status code: {expected}"
                    )),
                },
                "contains" => match expected {
                    Value::String(text) => contains.push(text.clone()),
                    Value::Array(items) => contains.extend(
                        items.iter().filter_map(|v| v.as_str().map(String::from)),
                    ),
                    other => errors.push(format!(
                        "assertion 'contains' must be a string or list: {other}"
                    )),
                },
                _ => {
                    json_expectations.insert(key.clone(), expected.clone());
                }
            }
        }

        let expected = asserted_status.or_else(|| expected_status(endpoint));
        let expected_label = match expected {
            Some(code) => {
                if response.status != code {
                    errors.push(format!(
                        "status code mismatch: expected {code}, got {}",
                        response.status
                    ));
                }
                code.to_string()
            }
            None => {
                if let Some(reason) = check_success_range(response).failure_reason
                {
                    errors.push(reason);
                }
                "2xx".to_string()
            }
        };

        if !json_expectations.is_empty() {
            match validate_json(&response.body, &json_expectations) {
                Ok(mut json_errors) => errors.append(&mut json_errors),
                Err(e) => errors.push(e.to_string()),
            }
        }
        errors.extend(validate_contains(&response.body, &contains));

        ValidationResult::from_errors(errors, Some(expected_label))
    }
}

fn status_from_value(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Compare each dot path in `expectations` against the JSON `body`.
pub fn validate_json(
    body: &str,
    expectations: &HashMap<String, Value>,
) -> Result<Vec<String>> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| anyhow!("response body is not valid JSON: {e}"))?;

    let mut errors = Vec::new();
    for (path, expected) in expectations {
        match lookup(&json, path) {
            Some(actual) if actual == expected => {}
            Some(actual) => errors.push(format!(
                "JSON path '{path}' mismatch: expected {expected}, got {actual}"
            )),
            None => {
                errors.push(format!("JSON path '{path}' not found in response"))
            }
        }
    }

    Ok(errors)
}

pub fn validate_contains(body: &str, texts: &[String]) -> Vec<String> {
    texts
        .iter()
        .filter(|text| !body.contains(text.as_str()))
        .map(|text| format!("response body does not contain '{text}'"))
        .collect()
}
