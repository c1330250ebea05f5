//! Request sending.

use crate::error::{ConfigError, TransportError};
use crate::model::{Endpoint, HttpMethod};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method as ReqMethod};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};
use url::Url;

/// A fully resolved request, ready for the sender.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreparedRequest {
    /// Concrete path; unresolved placeholders stay as written.
    pub path: String,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    /// Placeholder names no tier could resolve, across all fields.
    pub unresolved: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub elapsed_ms: u64,
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &PreparedRequest,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`RequestSender`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpSender {
    client: Client,
    base_url: Url,
    headers: HashMap<String, String>,
}

impl HttpSender {
    /// `timeout` applies to every request of the suite.
    pub fn new(
        base_url: &str,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, base_url, headers)?)
    }

    /// Use a preconfigured client.
    pub fn with_client(
        client: Client,
        base_url: &str,
        headers: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            headers,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join `path` (with any remaining `{name}` slots filled from
    /// `path_params`) onto the base URL and append the query string.
    pub fn build_url(
        &self,
        path: &str,
        path_params: &HashMap<String, String>,
        query: &HashMap<String, String>,
    ) -> Result<Url, TransportError> {
        let mut path = path.to_string();
        for (name, value) in path_params {
            path = path.replace(&format!("{{{name}}}"), value);
        }

        let mut url = if path.starts_with("http://") || path.starts_with("https://")
        {
            Url::parse(&path)
        } else {
            self.base_url.join(path.trim_start_matches('/'))
        }
        .map_err(|e| TransportError::Request {
            url: path.clone(),
            reason: e.to_string(),
        })?;

        if !query.is_empty() {
            // Sorted so the same step always produces the same URL.
            let sorted: BTreeMap<&String, &String> = query.iter().collect();
            url.query_pairs_mut().extend_pairs(sorted);
        }

        Ok(url)
    }
}

/// The base must end with `/` or `Url::join` drops its last segment.
fn normalize_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingBaseUrl);
    }
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|e| ConfigError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

fn convert_method(method: HttpMethod) -> ReqMethod {
    match method {
        HttpMethod::Get => ReqMethod::GET,
        HttpMethod::Post => ReqMethod::POST,
        HttpMethod::Put => ReqMethod::PUT,
        HttpMethod::Delete => ReqMethod::DELETE,
        HttpMethod::Patch => ReqMethod::PATCH,
        HttpMethod::Head => ReqMethod::HEAD,
        HttpMethod::Options => ReqMethod::OPTIONS,
    }
}

fn classify(url: &Url, err: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if err.is_timeout() {
        TransportError::Timeout { url }
    } else if err.is_connect() {
        TransportError::Connect {
            url,
            reason: err.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl RequestSender for HttpSender {
    #[instrument(skip_all, fields(method = %endpoint.method, path = %request.path))]
    async fn send(
        &self,
        endpoint: &Endpoint,
        request: &PreparedRequest,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.build_url(
            &request.path,
            &request.path_params,
            &request.query_params,
        )?;

        let mut headers = self.headers.clone();
        headers.extend(
            request
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut req_builder = self
            .client
            .request(convert_method(endpoint.method), url.clone());
        for (name, value) in &headers {
            req_builder = req_builder.header(name, value);
        }

        if let Some(body) = request.body.as_ref().filter(|b| !b.is_empty()) {
            if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                req_builder =
                    req_builder.header("Content-Type", "application/json");
            }
            req_builder = req_builder.body(body.clone());
        }

        debug!("Sending {} {}", endpoint.method, url);
        let started = Instant::now();
        let response =
            req_builder.send().await.map_err(|e| classify(&url, e))?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    value.to_str().unwrap_or("").to_string(),
                )
            })
            .collect();
        let body = response.text().await.map_err(|e| classify(&url, e))?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!("Received {} in {} ms", status, elapsed_ms);

        Ok(TransportResponse {
            status,
            headers,
            body,
            elapsed_ms,
        })
    }
}
