//! Generic JSON-over-HTTP tool server client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{results_from_body, Capability, ToolArgs, ToolName};
use crate::error::CapabilityError;

/// Posts tool arguments to `{base_url}/tools/{tool_name}`.
#[derive(Clone)]
pub struct HttpToolCapability {
    client: Client,
    base_url: String,
}

impl HttpToolCapability {
    /// Builds a client for the tool server at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into();
        anyhow::ensure!(
            base_url.starts_with("http://") || base_url.starts_with("https://"),
            "tool server URL must be http(s), got {base_url}"
        );
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build tool server HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, tool: ToolName) -> String {
        format!("{}/tools/{}", self.base_url, tool.as_str())
    }
}

#[async_trait]
impl Capability for HttpToolCapability {
    async fn invoke(&self, tool: ToolName, args: &ToolArgs) -> Result<Vec<Value>, CapabilityError> {
        let url = self.endpoint(tool);
        let resp = self
            .client
            .post(&url)
            .json(args)
            .send()
            .await
            .map_err(|err| CapabilityError::Transport {
                tool,
                message: format!("failed to call {url}: {err}"),
            })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CapabilityError::Transport {
                tool,
                message: format!("{url} returned {status}: {body}"),
            });
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|err| CapabilityError::MalformedResponse {
                tool,
                message: err.to_string(),
            })?;
        results_from_body(tool, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_tool_name() {
        let cap = HttpToolCapability::new("http://127.0.0.1:8765/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            cap.endpoint(ToolName::CatalogSearch),
            "http://127.0.0.1:8765/tools/catalog_search"
        );
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpToolCapability::new("ftp://nope", Duration::from_secs(1)).is_err());
    }
}
