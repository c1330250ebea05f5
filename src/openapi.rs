//! API definitions from OpenAPI 3 / Swagger 2 documents.
//!
//! Only what the scenario engine needs is read: operations, their
//! parameters with examples, declared response codes and examples.
//! Schemas are not interpreted.

use crate::config::RequestConfig;
use crate::model::{
    Endpoint, HttpMethod, ParamLocation, Parameter, RequestBody, Scenario,
    Step, Target,
};
use crate::value::ParamString;
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Looks up the definition of a step's target.
pub trait EndpointResolver: Send + Sync {
    fn find(&self, path: &str, method: HttpMethod) -> Option<&Endpoint>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ApiDefinition {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

impl EndpointResolver for ApiDefinition {
    fn find(&self, path: &str, method: HttpMethod) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|e| e.path == path && e.method == method)
    }
}

impl ApiDefinition {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading API definition from {}", path.display());
        let content = fs::read_to_string(path).with_context(|| {
            format!("Failed to read API definition: {}", path.display())
        })?;
        let def = Self::parse(&content).with_context(|| {
            format!("Failed to parse API definition: {}", path.display())
        })?;
        info!("Found {} endpoints in {}", def.endpoints.len(), path.display());
        Ok(def)
    }

    /// Load and merge several definition files.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut merged = Self::default();
        for path in paths {
            merged.merge(Self::load(path)?);
        }
        Ok(merged)
    }

    /// Parse a JSON or YAML document.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: Value = match serde_json::from_str(content) {
            Ok(doc) => doc,
            Err(_) => serde_yaml::from_str(content)
                .context("document is neither valid JSON nor YAML")?,
        };
        Self::from_document(&doc)
    }

    pub fn from_document(doc: &Value) -> Result<Self> {
        let paths = doc
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| anyhow!("document has no 'paths' object"))?;
        if doc.get("openapi").is_none() && doc.get("swagger").is_none() {
            bail!("document declares neither 'openapi' nor 'swagger'");
        }

        let info = doc.get("info");
        let text = |key: &str| {
            info.and_then(|i| i.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };

        let mut endpoints = Vec::new();
        for (path, item) in paths {
            let item = resolve_ref(doc, item);
            let shared = item.get("parameters");
            for method in HttpMethod::ALL {
                let key = method.as_str().to_ascii_lowercase();
                if let Some(op) = item.get(&key).and_then(Value::as_object) {
                    endpoints.push(parse_operation(doc, path, method, op, shared));
                }
            }
        }
        debug!("Parsed {} operations", endpoints.len());

        Ok(Self {
            title: text("title").unwrap_or_default(),
            version: text("version").unwrap_or_default(),
            description: text("description"),
            endpoints,
        })
    }

    /// Append `other`'s endpoints. Title and version are kept from the
    /// first non-empty definition.
    pub fn merge(&mut self, other: Self) {
        if self.title.is_empty() {
            self.title = other.title;
            self.version = other.version;
            self.description = other.description;
        }
        self.endpoints.extend(other.endpoints);
    }

    /// One step per endpoint, for suites without scenarios. Parameter
    /// examples fill path and query params; `request.path_params` always
    /// apply, `request.query_params` only to declared query params.
    pub fn to_scenario(&self, request: &RequestConfig) -> Scenario {
        let mut used = HashSet::new();
        let steps = self
            .endpoints
            .iter()
            .map(|endpoint| {
                let base = endpoint.operation_id.clone().unwrap_or_else(|| {
                    format!("{} {}", endpoint.method, endpoint.path)
                });
                let mut name = base.clone();
                let mut n = 1;
                while !used.insert(name.clone()) {
                    n += 1;
                    name = format!("{base} #{n}");
                }
                endpoint_step(name, endpoint, request)
            })
            .collect();

        Scenario {
            name: if self.title.is_empty() {
                "endpoints".to_string()
            } else {
                self.title.clone()
            },
            description: Some("every endpoint of the API definition".into()),
            steps,
        }
    }
}

fn endpoint_step(name: String, endpoint: &Endpoint, request: &RequestConfig) -> Step {
    let examples = |location: ParamLocation| -> HashMap<String, String> {
        endpoint
            .parameters
            .iter()
            .filter(|p| p.location == location)
            .filter_map(|p| p.example.clone().map(|ex| (p.name.clone(), ex)))
            .collect()
    };

    let mut path_params = examples(ParamLocation::Path);
    path_params.extend(request.path_params.clone());

    let mut query_params = examples(ParamLocation::Query);
    for param in &endpoint.parameters {
        if param.location == ParamLocation::Query {
            if let Some(value) = request.query_params.get(&param.name) {
                query_params.insert(param.name.clone(), value.clone());
            }
        }
    }

    Step {
        name,
        target: Target {
            path: endpoint.path.clone(),
            method: endpoint.method,
        },
        path_params,
        query_params,
        headers: HashMap::new(),
        request_body: endpoint_body(endpoint, request),
        extract: HashMap::new(),
        dependencies: Vec::new(),
        assertions: HashMap::new(),
    }
}

/// The definition's example, else the configured body for the path.
fn endpoint_body(endpoint: &Endpoint, request: &RequestConfig) -> Option<RequestBody> {
    if let Some(example) = &endpoint.request_body_example {
        return Some(RequestBody::Structured(example.clone()));
    }
    if !matches!(
        endpoint.method,
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch
    ) {
        return None;
    }
    match request.request_bodies.get(&endpoint.path)? {
        Value::String(text) => Some(RequestBody::Text(text.clone())),
        value => Some(RequestBody::Structured(value.clone())),
    }
}

/// Follow a local `$ref` (`#/components/...`), one level deep.
fn resolve_ref<'a>(doc: &'a Value, value: &'a Value) -> &'a Value {
    value
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix('#'))
        .and_then(|pointer| doc.pointer(pointer))
        .unwrap_or(value)
}

fn parse_operation(
    doc: &Value,
    path: &str,
    method: HttpMethod,
    op: &Map<String, Value>,
    shared: Option<&Value>,
) -> Endpoint {
    let text = |key: &str| op.get(key).and_then(Value::as_str).map(String::from);

    // Operation-level parameters replace path-level ones with the same
    // name and location.
    let mut params: BTreeMap<(String, String), Parameter> = BTreeMap::new();
    let mut order = Vec::new();
    for list in [shared, op.get("parameters")].into_iter().flatten() {
        for raw in list.as_array().into_iter().flatten() {
            if let Some(param) = parse_parameter(resolve_ref(doc, raw)) {
                let key = (param.name.clone(), format!("{:?}", param.location));
                if !params.contains_key(&key) {
                    order.push(key.clone());
                }
                params.insert(key, param);
            }
        }
    }
    let parameters: Vec<Parameter> =
        order.into_iter().filter_map(|k| params.remove(&k)).collect();

    let request_body_example = op
        .get("requestBody")
        .map(|rb| resolve_ref(doc, rb))
        .and_then(|rb| rb.get("content"))
        .and_then(json_media_example)
        .or_else(|| {
            // Swagger 2 body parameter
            op.get("parameters")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|p| resolve_ref(doc, p))
                .find(|p| p.get("in").and_then(Value::as_str) == Some("body"))
                .and_then(|p| p.get("schema"))
                .and_then(|s| s.get("example"))
                .cloned()
        });

    let responses: BTreeMap<String, Option<String>> = op
        .get("responses")
        .and_then(Value::as_object)
        .map(|responses| {
            responses
                .iter()
                .map(|(code, resp)| {
                    let resp = resolve_ref(doc, resp);
                    let example = resp
                        .get("content")
                        .and_then(json_media_example)
                        .or_else(|| {
                            resp.get("examples")
                                .and_then(|e| e.get("application/json"))
                                .cloned()
                        })
                        .map(|ex| ex.to_string());
                    (code.clone(), example)
                })
                .collect()
        })
        .unwrap_or_default();

    Endpoint {
        path: path.to_string(),
        method,
        operation_id: text("operationId"),
        description: text("description").or_else(|| text("summary")),
        tags: op
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        parameters,
        responses,
        request_body_example,
    }
}

fn parse_parameter(raw: &Value) -> Option<Parameter> {
    let name = raw.get("name")?.as_str()?.to_string();
    let location = raw.get("in")?.as_str()?.parse().ok()?;
    let schema = raw.get("schema");

    let kind = schema
        .and_then(|s| s.get("type"))
        .or_else(|| raw.get("type"))
        .and_then(|t| match t {
            Value::String(s) => Some(s.clone()),
            Value::Array(types) => {
                types.first().and_then(Value::as_str).map(String::from)
            }
            _ => None,
        });

    let example = raw
        .get("example")
        .or_else(|| schema.and_then(|s| s.get("example")))
        .or_else(|| raw.get("x-example"))
        .or_else(|| schema.and_then(|s| s.get("default")))
        .or_else(|| raw.get("default"))
        .map(ParamString::to_param_string);

    Some(Parameter {
        name,
        location,
        required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
        kind,
        example,
    })
}

/// `example` (or the first of `examples`) of the first JSON media type.
fn json_media_example(content: &Value) -> Option<Value> {
    let media = content
        .as_object()?
        .iter()
        .find(|(ct, _)| ct.contains("json"))
        .map(|(_, media)| media)?;
    media
        .get("example")
        .or_else(|| media.get("schema").and_then(|s| s.get("example")))
        .or_else(|| {
            media
                .get("examples")
                .and_then(Value::as_object)
                .and_then(|ex| ex.values().next())
                .and_then(|ex| ex.get("value"))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OPENAPI_YAML: &str = r##"
openapi: 3.0.0
info:
  title: Events API
  version: "1.2"
paths:
  /events/{event_id}:
    parameters:
      - name: event_id
        in: path
        required: true
        schema: {type: integer, example: 87}
    get:
      operationId: getEvent
      summary: Fetch one event
      parameters:
        - $ref: "#/components/parameters/Verbose"
      responses:
        "200":
          description: ok
          content:
            application/json:
              example: {id: 87, title: Gala}
        "404":
          description: missing
    delete:
      operationId: deleteEvent
      responses:
        "204": {description: gone}
  /events:
    post:
      tags: [events]
      requestBody:
        content:
          application/json:
            example: {title: New}
      responses:
        "201": {description: created}
components:
  parameters:
    Verbose:
      name: verbose
      in: query
      schema: {type: boolean, default: false}
"##;

    #[test]
    fn test_parse_openapi3_yaml() {
        let def = ApiDefinition::parse(OPENAPI_YAML).unwrap();
        assert_eq!(def.title, "Events API");
        assert_eq!(def.version, "1.2");
        assert_eq!(def.endpoints.len(), 3);

        let get = def.find("/events/{event_id}", HttpMethod::Get).unwrap();
        assert_eq!(get.operation_id.as_deref(), Some("getEvent"));
        assert_eq!(get.description.as_deref(), Some("Fetch one event"));
        assert_eq!(get.parameters.len(), 2);
        assert_eq!(get.parameters[0].name, "event_id");
        assert_eq!(get.parameters[0].example.as_deref(), Some("87"));
        assert_eq!(get.parameters[1].location, ParamLocation::Query);
        assert_eq!(get.parameters[1].example.as_deref(), Some("false"));
        assert_eq!(
            get.responses.get("200").cloned().flatten().as_deref(),
            Some(r#"{"id":87,"title":"Gala"}"#)
        );
        assert_eq!(get.responses.get("404"), Some(&None));

        let post = def.find("/events", HttpMethod::Post).unwrap();
        assert_eq!(post.tags, vec!["events".to_string()]);
        assert_eq!(post.request_body_example, Some(json!({"title": "New"})));
        assert!(def.find("/events", HttpMethod::Get).is_none());
    }

    #[test]
    fn test_parse_swagger2_json() {
        let doc = json!({
            "swagger": "2.0",
            "info": {"title": "Pets", "version": "1"},
            "paths": {
                "/pets": {
                    "post": {
                        "operationId": "addPet",
                        "parameters": [
                            {"name": "body", "in": "body",
                             "schema": {"example": {"name": "rex"}}},
                            {"name": "dry", "in": "query", "type": "boolean",
                             "x-example": true}
                        ],
                        "responses": {
                            "200": {"examples": {"application/json": {"id": 1}}}
                        }
                    }
                }
            }
        });
        let def = ApiDefinition::parse(&doc.to_string()).unwrap();
        let post = def.find("/pets", HttpMethod::Post).unwrap();
        assert_eq!(post.request_body_example, Some(json!({"name": "rex"})));
        assert_eq!(post.parameters[1].kind.as_deref(), Some("boolean"));
        assert_eq!(post.parameters[1].example.as_deref(), Some("true"));
        assert_eq!(
            post.responses.get("200").cloned().flatten().as_deref(),
            Some(r#"{"id":1}"#)
        );
    }

    #[test]
    fn test_rejects_non_api_documents() {
        assert!(ApiDefinition::parse("name: not an api\n").is_err());
        assert!(ApiDefinition::parse("openapi: 3.0.0\ninfo: {}\n").is_err());
    }

    #[test]
    fn test_endpoint_mode_scenario() {
        let def = ApiDefinition::parse(OPENAPI_YAML).unwrap();
        let scenario = def.to_scenario(&RequestConfig {
            path_params: HashMap::from([("event_id".into(), "5".into())]),
            query_params: HashMap::from([
                ("verbose".into(), "true".into()),
                ("unrelated".into(), "x".into()),
            ]),
            ..Default::default()
        });

        assert_eq!(scenario.name, "Events API");
        assert_eq!(scenario.steps.len(), 3);
        let get = scenario
            .steps
            .iter()
            .find(|s| s.name == "getEvent")
            .unwrap();
        assert_eq!(get.path_params["event_id"], "5");
        assert_eq!(get.query_params["verbose"], "true");
        assert!(!get.query_params.contains_key("unrelated"));

        let post = scenario
            .steps
            .iter()
            .find(|s| s.name == "POST /events")
            .unwrap();
        assert!(matches!(post.request_body, Some(RequestBody::Structured(_))));
    }

    #[test]
    fn test_configured_body_fills_missing_example() {
        let def = ApiDefinition::parse(
            r#"{"openapi":"3.0.0","paths":{
                "/events":{"post":{"requestBody":{"content":{"application/json":
                    {"example":{"title":"from example"}}}}}},
                "/tags":{"put":{},"get":{}},
                "/notes":{"patch":{}}}}"#,
        )
        .unwrap();
        let request = RequestConfig {
            request_bodies: HashMap::from([
                ("/events".into(), json!({"title": "configured"})),
                ("/tags".into(), json!({"name": "{tag}"})),
                ("/notes".into(), json!("{\"text\":\"hi\"}")),
            ]),
            ..Default::default()
        };
        let scenario = def.to_scenario(&request);
        let body = |name: &str| {
            scenario
                .steps
                .iter()
                .find(|s| s.name == name)
                .unwrap()
                .request_body
                .as_ref()
                .map(|b| b.template().unwrap())
        };

        assert_eq!(body("POST /events").as_deref(), Some(r#"{"title":"from example"}"#));
        assert_eq!(body("PUT /tags").as_deref(), Some(r#"{"name":"{tag}"}"#));
        assert_eq!(body("GET /tags"), None);
        assert_eq!(body("PATCH /notes").as_deref(), Some(r#"{"text":"hi"}"#));
    }
}
