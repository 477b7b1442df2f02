//! HTTP client for the API under test

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::client::ApiClient;
use crate::types::{ApiResponse, Method, Request};
use crate::{Error, Result};

/// Configuration for [`HttpApi`]
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL every request path is joined to
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Headers sent with every request; fixture headers win on conflict
    pub default_headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout: Duration::from_secs(30),
            default_headers: BTreeMap::new(),
        }
    }
}

/// `reqwest`-backed API collaborator
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    default_headers: BTreeMap<String, String>,
}

impl HttpApi {
    pub fn new(config: HttpConfig) -> Result<Self> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "base url must be http(s): {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_headers: config.default_headers,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ApiClient for HttpApi {
    async fn execute(&self, request: &Request) -> Result<ApiResponse> {
        let url = self.url(&request.path);
        debug!("{} {}", request.method, url);

        let headers = merge_headers(&self.default_headers, &request.headers)?;

        let mut builder = self.client.request(to_reqwest(request.method), &url).headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        Ok(ApiResponse {
            status,
            body: parse_body(&text),
        })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Header names are case-insensitive, so a fixture `authorization` replaces a
/// default `Authorization` instead of being sent next to it.
fn merge_headers(
    defaults: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in defaults.iter().chain(overrides.iter()) {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::InvalidHeader(name.clone()))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::InvalidHeader(format!("{}: {:?}", name, value)))?;
        map.insert(header, value);
    }
    Ok(map)
}

/// Empty body is `null`; anything that is not JSON is kept as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
