//! Tool Gateway client: fetches the service catalog and invokes named tools.
//!
//! Wire shapes are bit-exact with the Tool Gateway. The HTTP client is built once
//! per instance and the catalog fetch is memoized behind a mutex so repeat calls
//! within one process never re-hit the network.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use conduit_types::catalog::Catalog;
use conduit_types::error::{CatalogError, InvocationError};
use conduit_util::{build_gateway_client, mask_sensitive_arguments, redact_bearer_tokens, DEFAULT_GATEWAY_TIMEOUT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// The seam the Execution Engine drives steps through, mirroring the teacher's
/// `CommandRunner` trait: production code talks to a real Tool Gateway, tests
/// substitute a double that never touches the network (e.g. one that panics if
/// `invoke_tool` is ever reached, proving a code path never invokes a tool).
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn fetch_catalog(&self) -> Result<Catalog, CatalogError>;

    async fn invoke_tool(&self, service: &str, action: &str, arguments: Map<String, Value>, bearer_token: &str) -> Result<Value, InvocationError>;
}

/// Talks to a single Tool Gateway instance. Safe to share across concurrent
/// executions: `http` is immutable after construction and `catalog_cache` is
/// mutex-guarded.
pub struct CatalogClient {
    http: Client,
    base_url: String,
    catalog_cache: Mutex<Option<Catalog>>,
}

impl CatalogClient {
    /// Builds a client against `base_url` with the default 30-second per-call timeout.
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_GATEWAY_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = build_gateway_client(timeout)?;
        Ok(Self { http, base_url: base_url.into(), catalog_cache: Mutex::new(None) })
    }

    /// Fetches and caches the service catalog. Subsequent calls return the cached
    /// value without a network round trip.
    pub async fn fetch_catalog(&self) -> Result<Catalog, CatalogError> {
        if let Some(cached) = self.catalog_cache.lock().expect("catalog cache mutex poisoned").clone() {
            return Ok(cached);
        }

        let url = format!("{}/api/services", self.base_url);
        debug!(url = %url, "fetching tool gateway catalog");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|error| CatalogError::Unavailable { reason: error.to_string() })?;

        if !response.status().is_success() {
            return Err(CatalogError::Unavailable { reason: format!("catalog endpoint returned {}", response.status()) });
        }

        let catalog: Catalog = response.json().await.map_err(|error| CatalogError::Malformed { reason: error.to_string() })?;

        *self.catalog_cache.lock().expect("catalog cache mutex poisoned") = Some(catalog.clone());
        Ok(catalog)
    }

    /// Invokes `"{service}.{action}"` on the gateway, placing `bearer_token` into
    /// the arguments under the `token` key.
    pub async fn invoke_tool(&self, service: &str, action: &str, mut arguments: Map<String, Value>, bearer_token: &str) -> Result<Value, InvocationError> {
        arguments.insert("token".into(), Value::String(bearer_token.to_string()));
        let name = format!("{service}.{action}");

        debug!(tool = %name, arguments = ?mask_sensitive_arguments(&arguments), "invoking tool gateway");

        let url = format!("{}/api/mcp/tools/call", self.base_url);
        let request_body = ToolCallRequest { name: name.clone(), arguments };

        let response = self
            .http
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|error| InvocationError::Transport { status: None, message: error.to_string() })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InvocationError::Transport { status: Some(status.as_u16()), message: format!("tool gateway returned {status}") });
        }

        let body: ToolCallResponse = response.json().await.map_err(|error| InvocationError::Transport { status: Some(status.as_u16()), message: error.to_string() })?;

        let first = body.result.content.into_iter().next().ok_or_else(|| InvocationError::Tool { message: "tool gateway returned no content".into() })?;

        if body.result.is_error {
            warn!(tool = %name, message = %redact_bearer_tokens(&first.text), "tool gateway reported an error");
            return Err(InvocationError::Tool { message: first.text });
        }

        serde_json::from_str(&first.text).map_err(|error| InvocationError::Tool { message: format!("tool response was not a JSON object: {error}") })
    }
}

#[async_trait]
impl ToolGateway for CatalogClient {
    async fn fetch_catalog(&self) -> Result<Catalog, CatalogError> {
        CatalogClient::fetch_catalog(self).await
    }

    async fn invoke_tool(&self, service: &str, action: &str, arguments: Map<String, Value>, bearer_token: &str) -> Result<Value, InvocationError> {
        CatalogClient::invoke_tool(self, service, action, arguments, bearer_token).await
    }
}

#[derive(Debug, Serialize)]
struct ToolCallRequest {
    name: String,
    arguments: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ToolCallResponse {
    result: ToolCallResult,
}

#[derive(Debug, Deserialize)]
struct ToolCallResult {
    content: Vec<ToolCallContent>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct ToolCallContent {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    content_type: String,
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_builds_without_network_access() {
        let client = CatalogClient::new("http://localhost:9999");
        assert!(client.is_ok());
    }
}
