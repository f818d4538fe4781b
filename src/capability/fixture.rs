//! Offline capability serving raw results from a JSON document.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{results_from_body, Capability, ToolArgs, ToolName};
use crate::error::CapabilityError;
use crate::normalizer::coerce_price;

/// Serves a fixed result pool, keyword-ranked against the query.
#[derive(Debug, Clone, Default)]
pub struct FixtureCapability {
    pool: Vec<Value>,
}

impl FixtureCapability {
    /// Wraps an in-memory result pool.
    pub fn new(pool: Vec<Value>) -> Self {
        Self { pool }
    }

    /// Loads a pool from a JSON array or `{ "results": [...] }` file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        let body: Value = serde_json::from_str(&raw)
            .with_context(|| format!("fixture {} is not valid JSON", path.display()))?;
        let pool = results_from_body(ToolName::CatalogSearch, body)
            .with_context(|| format!("fixture {} has no result list", path.display()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Capability for FixtureCapability {
    async fn invoke(&self, _tool: ToolName, args: &ToolArgs) -> Result<Vec<Value>, CapabilityError> {
        let tokens = tokenize_query(&args.query);
        let max_price = args.filters.max_price;
        let mut scored: Vec<(f64, Value)> = self
            .pool
            .iter()
            .filter(|item| within_budget(item, max_price))
            .filter_map(|item| {
                let score = keyword_overlap(&tokens, &haystack(item));
                (score > 0.0).then(|| (score, item.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        let limit = args.num_results.unwrap_or(scored.len());
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, mut item)| {
                if let Value::Object(map) = &mut item {
                    map.entry("relevance_score")
                        .or_insert_with(|| Value::from((score * 10_000.0).round() / 10_000.0));
                }
                item
            })
            .collect())
    }
}

fn within_budget(item: &Value, max_price: Option<f64>) -> bool {
    match (max_price, item.get("price").and_then(coerce_price)) {
        (Some(limit), Some(price)) => price <= limit,
        _ => true,
    }
}

fn haystack(item: &Value) -> String {
    ["title", "category", "brand", "snippet"]
        .iter()
        .filter_map(|key| item.get(*key).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokenize_query(query: &str) -> BTreeSet<String> {
    query
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| tok.len() >= 3)
        .map(str::to_lowercase)
        .collect()
}

fn keyword_overlap(tokens: &BTreeSet<String>, haystack: &str) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|token| haystack.contains(token.as_str())).count();
    hits as f64 / tokens.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Filters;
    use serde_json::json;

    fn args(query: &str, max_price: Option<f64>) -> ToolArgs {
        ToolArgs {
            query: query.into(),
            filters: Filters {
                max_price,
                ..Filters::default()
            },
            num_results: Some(5),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ranks_by_keyword_overlap() {
        let cap = FixtureCapability::new(vec![
            json!({ "title": "Dice Tower", "price": 9.0 }),
            json!({ "title": "Herbaceous", "category": "Board Games", "price": 14.01 }),
            json!({ "title": "Unrelated Mouse", "price": 19.0 }),
        ]);
        let out = cap
            .invoke(ToolName::CatalogSearch, &args("herbaceous board game", None))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["title"], json!("Herbaceous"));
        assert_eq!(out[0]["relevance_score"], json!(1.0));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn honours_max_price() {
        let cap = FixtureCapability::new(vec![
            json!({ "title": "Cheap Dice", "price": "$5.00" }),
            json!({ "title": "Premium Dice", "price": 50.0 }),
        ]);
        let out = cap
            .invoke(ToolName::WebSearch, &args("dice", Some(10.0)))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["title"], json!("Cheap Dice"));
    }
}
