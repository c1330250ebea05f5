//! Scenario definitions, endpoint descriptions and run results.

use crate::value::ParamString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// An ordered, named sequence of steps. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One HTTP call plus its templates, extraction rules and
/// dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the scenario. Used as the dependency key and
    /// the result key.
    pub name: String,
    #[serde(flatten)]
    pub target: Target,
    /// Raw path-parameter templates. Resolved values become local
    /// bindings that win over every other source.
    #[serde(default, deserialize_with = "scalar_map")]
    pub path_params: HashMap<String, String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub query_params: HashMap<String, String>,
    #[serde(default, deserialize_with = "scalar_map")]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub request_body: Option<RequestBody>,
    /// variable name -> JSON path into the response body.
    #[serde(default)]
    pub extract: HashMap<String, String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Consumed by the validator, see [`crate::validator`].
    #[serde(default, rename = "assert")]
    pub assertions: HashMap<String, Value>,
}

/// Path template plus method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    #[serde(rename = "endpoint", default)]
    pub path: String,
    #[serde(default)]
    pub method: HttpMethod,
}

/// Request body as written in the scenario file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    /// Used verbatim as the body template.
    Text(String),
    /// Serialized to compact JSON, then treated as a template.
    Structured(Value),
}

impl RequestBody {
    /// Body template text before placeholder substitution.
    pub fn template(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Structured(value) => serde_json::to_string(value),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Post,
        Self::Put,
        Self::Delete,
        Self::Patch,
        Self::Head,
        Self::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported HTTP method '{s}'"))
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HttpMethod> for String {
    fn from(method: HttpMethod) -> Self {
        method.as_str().to_string()
    }
}

/// Accept `key: 1`, `key: true` and `key: "text"` alike.
fn scalar_map<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Value>> =
        Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, v.to_param_string()))
        .collect())
}

/// An operation from the API definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub path: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Declared status code -> JSON example, if the definition has
    /// one.
    #[serde(default)]
    pub responses: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub request_body_example: Option<Value>,
}

impl Endpoint {
    /// Stand-in for a step whose target is not in the API
    /// definition.
    pub fn synthetic(step: &Step) -> Self {
        Self {
            path: step.target.path.clone(),
            method: step.target.method,
            operation_id: Some(step.name.clone()),
            description: Some(step.name.clone()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
}

impl FromStr for ParamLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "path" => Ok(Self::Path),
            "query" => Ok(Self::Query),
            "header" => Ok(Self::Header),
            "cookie" => Ok(Self::Cookie),
            "body" => Ok(Self::Body),
            "formData" => Ok(Self::FormData),
            other => Err(format!("unknown parameter location '{other}'")),
        }
    }
}

/// Outcome of one executed step. Skipped steps produce none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub scenario: String,
    pub step: String,
    pub method: HttpMethod,
    /// Concrete path after placeholder substitution.
    pub path: String,
    /// `None` when the transport failed.
    pub status: Option<u16>,
    pub expected_status: Option<String>,
    pub passed: bool,
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub transport_error: bool,
    pub elapsed_ms: u64,
    pub response_body: Option<String>,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub description: Option<String>,
    pub results: Vec<StepResult>,
    /// Steps denied by the dependency gate, in declaration order.
    pub skipped: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub scenarios: Vec<ScenarioReport>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl SuiteReport {
    /// All step results, scenario by scenario, in execution order.
    pub fn results(&self) -> impl Iterator<Item = &StepResult> {
        self.scenarios.iter().flat_map(|s| s.results.iter())
    }
}
