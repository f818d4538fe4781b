//! Serper (Google Search API) backed web_search.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use super::{Capability, ToolArgs, ToolName};
use crate::error::CapabilityError;
use crate::state::Filters;

/// Default Serper search endpoint.
pub const SERPER_ENDPOINT: &str = "https://google.serper.dev/search";

/// web_search provider that queries Serper and returns organic plus shopping hits.
#[derive(Clone)]
pub struct SerperWebSearch {
    client: Client,
    endpoint: String,
}

impl SerperWebSearch {
    /// Builds a Serper client; the key is sent as `X-API-KEY`.
    pub fn new(api_key: &str, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Serper API key");
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            HeaderValue::from_str(api_key.trim()).context("invalid Serper API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Serper HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Capability for SerperWebSearch {
    async fn invoke(&self, tool: ToolName, args: &ToolArgs) -> Result<Vec<Value>, CapabilityError> {
        if tool != ToolName::WebSearch {
            return Err(CapabilityError::Unavailable(tool));
        }
        let num_results = args.num_results.unwrap_or(5).clamp(1, 10);
        let request = SerperRequest {
            q: enhanced_query(&args.query, &args.filters),
            num: num_results * 2,
            gl: "us",
            hl: "en",
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| CapabilityError::Transport {
                tool,
                message: err.to_string(),
            })?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(CapabilityError::Transport {
                tool,
                message: format!("Serper returned {status}: {body}"),
            });
        }
        let parsed: SerperResponse =
            resp.json()
                .await
                .map_err(|err| CapabilityError::MalformedResponse {
                    tool,
                    message: err.to_string(),
                })?;
        let mut results = flatten_response(parsed);
        results.truncate(num_results);
        Ok(results)
    }
}

/// Appends filter hints the way a shopper would type them.
pub(crate) fn enhanced_query(query: &str, filters: &Filters) -> String {
    let mut parts = vec![query.trim().to_string()];
    if let Some(max_price) = filters.max_price {
        parts.push(format!("under ${max_price}"));
    }
    if let Some(brand) = &filters.brand {
        parts.push(format!("{brand} brand"));
    }
    let lowered = query.to_lowercase();
    if !lowered.contains("buy") && !lowered.contains("price") {
        parts.push("buy".to_string());
    }
    parts.join(" ")
}

fn flatten_response(resp: SerperResponse) -> Vec<Value> {
    let mut out = Vec::with_capacity(resp.shopping.len() + resp.organic.len());
    for item in resp.shopping {
        out.push(json!({
            "title": item.title,
            "url": item.link,
            "snippet": item.snippet.unwrap_or_default(),
            "price": item.price,
            "source": item.source,
        }));
    }
    for item in resp.organic {
        let host = Url::parse(&item.link)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string));
        out.push(json!({
            "title": item.title,
            "url": item.link,
            "snippet": item.snippet.unwrap_or_default(),
            "source": host,
        }));
    }
    out
}

#[derive(Serialize)]
struct SerperRequest<'a> {
    q: String,
    num: usize,
    gl: &'a str,
    hl: &'a str,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
    #[serde(default)]
    shopping: Vec<SerperShopping>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperShopping {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    snippet: Option<String>,
    price: Option<Value>,
    source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_gets_filter_hints() {
        let filters = Filters {
            max_price: Some(20.0),
            category: None,
            brand: Some("Hasbro".into()),
        };
        assert_eq!(
            enhanced_query("family board game", &filters),
            "family board game under $20 Hasbro brand buy"
        );
    }

    #[test]
    fn price_queries_skip_buy_hint() {
        assert_eq!(
            enhanced_query("current price of Catan", &Filters::default()),
            "current price of Catan"
        );
    }

    #[test]
    fn shopping_hits_come_first() {
        let resp: SerperResponse = serde_json::from_value(json!({
            "organic": [{ "title": "Catan review", "link": "https://www.example.com/catan" }],
            "shopping": [{ "title": "Catan", "link": "https://shop.test/catan", "price": "$44.99", "source": "Shop" }]
        }))
        .unwrap();
        let flat = flatten_response(resp);
        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0]["price"], json!("$44.99"));
        assert_eq!(flat[1]["source"], json!("www.example.com"));
    }
}
