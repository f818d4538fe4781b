//! Abstract tool-invocation boundary shared by catalog and web search.
//!
//! A capability returns raw JSON objects; it never builds
//! [`NormalizedRecord`](crate::NormalizedRecord)s itself. Mapping raw fields
//! is the job of the per-source adapters in [`crate::normalizer`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CapabilityError;
use crate::state::Filters;

mod fixture;
mod http;
mod serper;

pub use fixture::FixtureCapability;
pub use http::HttpToolCapability;
pub use serper::{SerperWebSearch, SERPER_ENDPOINT};

/// Tools the core knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    /// Private catalog lookup.
    CatalogSearch,
    /// Live web search.
    WebSearch,
}

impl ToolName {
    /// Wire name of the tool.
    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::CatalogSearch => "catalog_search",
            ToolName::WebSearch => "web_search",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments passed to every tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolArgs {
    /// Raw user query.
    pub query: String,
    /// Filters from the retrieval plan.
    #[serde(skip_serializing_if = "Filters::is_empty")]
    pub filters: Filters,
    /// Requested result count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_results: Option<usize>,
}

/// Anything that can answer `invoke(tool_name, args)`.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Runs one tool call and returns the raw result objects in source order.
    async fn invoke(&self, tool: ToolName, args: &ToolArgs) -> Result<Vec<Value>, CapabilityError>;
}

/// Routes each tool name to the provider registered for it.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    catalog: Option<Arc<dyn Capability>>,
    web: Option<Arc<dyn Capability>>,
}

impl CapabilitySet {
    /// Empty set; every invocation fails with `Unavailable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the catalog_search provider.
    pub fn with_catalog(mut self, capability: Arc<dyn Capability>) -> Self {
        self.catalog = Some(capability);
        self
    }

    /// Registers the web_search provider.
    pub fn with_web(mut self, capability: Arc<dyn Capability>) -> Self {
        self.web = Some(capability);
        self
    }

    fn provider(&self, tool: ToolName) -> Option<&Arc<dyn Capability>> {
        match tool {
            ToolName::CatalogSearch => self.catalog.as_ref(),
            ToolName::WebSearch => self.web.as_ref(),
        }
    }
}

#[async_trait]
impl Capability for CapabilitySet {
    async fn invoke(&self, tool: ToolName, args: &ToolArgs) -> Result<Vec<Value>, CapabilityError> {
        match self.provider(tool) {
            Some(provider) => provider.invoke(tool, args).await,
            None => Err(CapabilityError::Unavailable(tool)),
        }
    }
}

/// Accepts either a bare JSON array or an object with a `results` array.
pub(crate) fn results_from_body(tool: ToolName, body: Value) -> Result<Vec<Value>, CapabilityError> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Err(CapabilityError::MalformedResponse {
                tool,
                message: "object body without a results array".to_string(),
            }),
            Some(other) => Err(CapabilityError::MalformedResponse {
                tool,
                message: format!("results field is {}", json_kind(&other)),
            }),
        },
        other => Err(CapabilityError::MalformedResponse {
            tool,
            message: format!("expected array or object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_both_body_shapes() {
        let bare = results_from_body(ToolName::WebSearch, json!([{ "title": "a" }])).unwrap();
        let wrapped =
            results_from_body(ToolName::WebSearch, json!({ "results": [{ "title": "a" }] }))
                .unwrap();
        assert_eq!(bare, wrapped);
    }

    #[test]
    fn rejects_scalar_bodies() {
        let err = results_from_body(ToolName::CatalogSearch, json!("oops")).unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedResponse { .. }));
    }

    #[test]
    fn args_skip_empty_filters() {
        let args = ToolArgs {
            query: "dice".into(),
            filters: Filters::default(),
            num_results: None,
        };
        assert_eq!(serde_json::to_value(&args).unwrap(), json!({ "query": "dice" }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_provider_is_unavailable() {
        let set = CapabilitySet::new();
        let args = ToolArgs {
            query: "dice".into(),
            filters: Filters::default(),
            num_results: Some(5),
        };
        let err = set.invoke(ToolName::WebSearch, &args).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(ToolName::WebSearch)));
    }
}
