//! Per-source adapters that validate raw tool output into [`NormalizedRecord`]s.
//!
//! Field names reported by a source are never trusted directly: each adapter
//! knows which raw keys its source uses and coerces values into the common
//! shape. Records without a title are rejected; prices become numbers or
//! `None`, never free text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ValidationError;
use crate::state::{Availability, NormalizedRecord, Source};

/// Maps one source's raw result objects into normalized records.
pub trait SourceAdapter {
    /// Source tag stamped on every record.
    fn source(&self) -> Source;

    /// Validates and maps one raw result.
    fn adapt(&self, raw: &Value) -> Result<NormalizedRecord, ValidationError>;
}

/// Adapter for catalog_search results.
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogAdapter;

impl SourceAdapter for CatalogAdapter {
    fn source(&self) -> Source {
        Source::Catalog
    }

    fn adapt(&self, raw: &Value) -> Result<NormalizedRecord, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        let title = required_title(obj, &["title", "name"])?;
        let mut record = NormalizedRecord::new(title, Source::Catalog);
        record.identity_key = first_identifier(obj, &["sku", "doc_id", "id", "asin"]);
        record.brand = first_text(obj, &["brand", "manufacturer"]);
        record.category = category_of(obj);
        record.price = first_present(obj, &["price", "list_price"]).and_then(coerce_price);
        record.rating = first_present(obj, &["rating", "stars"]).and_then(coerce_score);
        record.availability = availability_of(obj);
        record.source_url = first_text(obj, &["product_url", "url"]);
        record.raw_score = first_present(obj, &["relevance_score", "score"]).and_then(coerce_score);
        Ok(record)
    }
}

/// Adapter for web_search results.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAdapter;

impl SourceAdapter for WebAdapter {
    fn source(&self) -> Source {
        Source::Web
    }

    fn adapt(&self, raw: &Value) -> Result<NormalizedRecord, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        let title = required_title(obj, &["title"])?;
        let mut record = NormalizedRecord::new(title, Source::Web);
        record.brand = first_text(obj, &["brand"]);
        record.category = category_of(obj);
        record.price = first_present(obj, &["price", "current_price"])
            .and_then(coerce_price)
            .or_else(|| {
                let snippet = first_text(obj, &["snippet", "description"]).unwrap_or_default();
                extract_price(&format!("{snippet} {}", record.title))
            });
        record.rating = first_present(obj, &["rating"]).and_then(coerce_score);
        record.availability = availability_of(obj);
        record.source_url = first_text(obj, &["url", "link"]);
        record.raw_score = first_present(obj, &["score", "relevance_score"]).and_then(coerce_score);
        Ok(record)
    }
}

/// Normalizes a whole result list, dropping invalid records.
///
/// Source order is kept unless every record carries a score, in which case
/// records are stably sorted by score descending.
pub fn normalize_results<A: SourceAdapter>(adapter: &A, raw: &[Value]) -> Vec<NormalizedRecord> {
    let mut records = Vec::with_capacity(raw.len());
    for (idx, item) in raw.iter().enumerate() {
        match adapter.adapt(item) {
            Ok(record) => records.push(record),
            Err(err) => debug!(source = %adapter.source(), index = idx, %err, "dropping raw result"),
        }
    }
    if !records.is_empty() && records.iter().all(|r| r.raw_score.is_some()) {
        records.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    records
}

/// Coerces a JSON number or price-like string into a non-negative price.
pub fn coerce_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => {
            if text.trim_start().starts_with('-') {
                return None;
            }
            first_amount(text)
        }
        _ => None,
    }?;
    (price.is_finite() && price >= 0.0).then_some(price)
}

/// Pulls a price out of free text such as a search snippet.
pub fn extract_price(text: &str) -> Option<f64> {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        [
            Regex::new(r"\$\s?(\d[\d,]*(?:\.\d+)?)").expect("dollar pattern"),
            Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(?:usd|dollars?)\b").expect("usd pattern"),
            Regex::new(r"(?i)price[:\s]+\$?(\d[\d,]*(?:\.\d+)?)").expect("price pattern"),
        ]
    });
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_amount(m.as_str()))
            .filter(|price| price.is_finite() && *price >= 0.0)
    })
}

/// Maps free-text stock status onto [`Availability`].
pub fn parse_availability(text: &str) -> Availability {
    let lowered = text.trim().to_lowercase().replace(['_', '-'], " ");
    if lowered.is_empty() {
        return Availability::Unknown;
    }
    const OUT: &[&str] = &[
        "out of stock",
        "unavailable",
        "sold out",
        "backorder",
        "discontinued",
        "no stock",
    ];
    const IN: &[&str] = &["in stock", "available", "only", "left in stock", "ships"];
    static NEGATED: OnceLock<Regex> = OnceLock::new();
    let negated = NEGATED.get_or_init(|| {
        Regex::new(r"\b(?:not|no longer|isn't|never)(?:\s+\w+){0,2}?\s+(?:available|in stock)\b")
            .expect("negated stock pattern")
    });
    if OUT.iter().any(|cue| lowered.contains(cue)) || negated.is_match(&lowered) {
        Availability::OutOfStock
    } else if IN.iter().any(|cue| lowered.contains(cue)) {
        Availability::InStock
    } else {
        Availability::Unknown
    }
}

const HOST_SUFFIXES: &[&str] = &[
    "com", "net", "org", "co", "uk", "us", "ca", "de", "fr", "au", "jp", "io", "biz", "info", "shop",
    "store",
];

/// Strips store decoration from a search-result title: a leading
/// `Amazon.com:` prefix, trailing ` : Category` or ` | Store` segments,
/// ` - Walmart.com` suffixes and any bare URL or hostname words.
pub fn site_free_title(title: &str) -> String {
    let mut rest = title.trim();
    if let Some((head, tail)) = rest.split_once(':') {
        if looks_like_hostname(head) {
            rest = tail;
        }
    }
    let head = rest
        .split(" | ")
        .flat_map(|part| part.split(" : "))
        .map(str::trim)
        .find(|part| !part.is_empty() && !looks_like_hostname(part))
        .unwrap_or_default();
    head.split(" - ")
        .map(str::trim)
        .filter(|part| !part.is_empty() && !looks_like_hostname(part))
        .collect::<Vec<_>>()
        .join(" - ")
        .split_whitespace()
        .filter(|word| !looks_like_hostname(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// True for URLs and bare hostnames such as `Amazon.com` or `www.target.com`.
pub fn looks_like_hostname(text: &str) -> bool {
    let word = text
        .trim()
        .trim_matches(|ch: char| matches!(ch, '(' | ')' | '[' | ']' | ',' | ';' | ':' | '.'))
        .to_lowercase();
    if word.split_whitespace().nth(1).is_some() {
        return false;
    }
    if word.contains("://") || word.starts_with("www.") {
        return true;
    }
    let labels: Vec<&str> = word.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty() && label.chars().all(|ch| ch.is_alphanumeric() || ch == '-')
        })
        && labels
            .last()
            .is_some_and(|suffix| HOST_SUFFIXES.contains(suffix))
}

fn first_amount(text: &str) -> Option<f64> {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    let amount = AMOUNT.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("amount pattern"));
    amount.find(text).and_then(|m| parse_amount(m.as_str()))
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn coerce_score(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(num) => num.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then_some(score)
}

fn required_title(obj: &Map<String, Value>, keys: &[&str]) -> Result<String, ValidationError> {
    first_text(obj, keys).ok_or(ValidationError::MissingTitle)
}

fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find(|value| !value.is_null())
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn first_identifier(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|key| obj.get(*key)).find_map(|value| match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    })
}

fn category_of(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("category") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Some(Value::Array(parts)) => {
            let joined = parts
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" > ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn availability_of(obj: &Map<String, Value>) -> Availability {
    match obj.get("availability").or_else(|| obj.get("in_stock")) {
        Some(Value::String(text)) => parse_availability(text),
        Some(Value::Bool(true)) => Availability::InStock,
        Some(Value::Bool(false)) => Availability::OutOfStock,
        _ => Availability::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_record_maps_known_fields() {
        let raw = json!({
            "sku": "a1b2",
            "doc_id": "doc-9",
            "title": " Herbaceous ",
            "price": 14.01,
            "rating": 4.6,
            "brand": "Pencil First Games",
            "category": ["Toys & Games", "Board Games"],
            "relevance_score": 0.81,
            "product_url": "https://www.amazon.com/dp/B01N1L34R9"
        });
        let record = CatalogAdapter.adapt(&raw).unwrap();
        assert_eq!(record.identity_key.as_deref(), Some("a1b2"));
        assert_eq!(record.title, "Herbaceous");
        assert_eq!(record.category.as_deref(), Some("Toys & Games > Board Games"));
        assert_eq!(record.price, Some(14.01));
        assert_eq!(record.raw_score, Some(0.81));
        assert_eq!(record.source, Source::Catalog);
    }

    #[test]
    fn web_record_never_carries_identity_key() {
        let raw = json!({ "title": "Herbaceous", "url": "https://x.test/p/1", "sku": "zzz" });
        let record = WebAdapter.adapt(&raw).unwrap();
        assert!(record.identity_key.is_none());
        assert_eq!(record.source_url.as_deref(), Some("https://x.test/p/1"));
    }

    #[test]
    fn missing_title_is_rejected() {
        assert_eq!(
            WebAdapter.adapt(&json!({ "url": "https://x.test" })),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(
            CatalogAdapter.adapt(&json!({ "title": "   " })),
            Err(ValidationError::MissingTitle)
        );
        assert_eq!(CatalogAdapter.adapt(&json!(42)), Err(ValidationError::NotAnObject));
    }

    #[test]
    fn prices_are_coerced_or_nulled() {
        assert_eq!(coerce_price(&json!("$1,299.99")), Some(1299.99));
        assert_eq!(coerce_price(&json!("14.01 USD")), Some(14.01));
        assert_eq!(coerce_price(&json!("call for price")), None);
        assert_eq!(coerce_price(&json!(-3.0)), None);
        assert_eq!(coerce_price(&json!("-3")), None);
        assert_eq!(coerce_price(&json!(true)), None);
    }

    #[test]
    fn web_price_falls_back_to_snippet() {
        let raw = json!({ "title": "Catan", "snippet": "Now only $39.99 with free shipping" });
        assert_eq!(WebAdapter.adapt(&raw).unwrap().price, Some(39.99));
        let raw = json!({ "title": "Catan", "price": "see site", "snippet": "no numbers here" });
        assert_eq!(WebAdapter.adapt(&raw).unwrap().price, None);
    }

    #[test]
    fn availability_text_is_classified() {
        assert_eq!(parse_availability("In Stock"), Availability::InStock);
        assert_eq!(parse_availability("in_stock"), Availability::InStock);
        assert_eq!(parse_availability("Only 3 left"), Availability::InStock);
        assert_eq!(parse_availability("Currently unavailable."), Availability::OutOfStock);
        assert_eq!(parse_availability("Out of Stock"), Availability::OutOfStock);
        assert_eq!(parse_availability("maybe"), Availability::Unknown);
    }

    #[test]
    fn store_decoration_is_stripped_from_titles() {
        assert_eq!(
            site_free_title("Amazon.com: Herbaceous Board Game : Toys & Games"),
            "Herbaceous Board Game"
        );
        assert_eq!(site_free_title("Catan Board Game - Walmart.com"), "Catan Board Game");
        assert_eq!(site_free_title("Herbaceous | www.target.com"), "Herbaceous");
        assert_eq!(
            site_free_title("https://www.sketchy.example/deal Catan"),
            "Catan"
        );
        assert_eq!(site_free_title("Catan: Seafarers 5-6 Player"), "Catan: Seafarers 5-6 Player");
        assert_eq!(site_free_title("Version 2.0 Dice"), "Version 2.0 Dice");
        assert!(site_free_title("bestbuy.com").is_empty());
    }

    #[test]
    fn negated_stock_text_is_out_of_stock() {
        for text in [
            "Not available",
            "Not in stock",
            "No longer available",
            "Temporarily not available online",
            "This item is not currently available",
            "isn't available in your area",
        ] {
            assert_eq!(parse_availability(text), Availability::OutOfStock, "{text}");
        }
        assert_eq!(parse_availability("Available now"), Availability::InStock);
    }

    #[test]
    fn invalid_records_are_dropped_and_scores_order_results() {
        let raw = vec![
            json!({ "title": "Low", "relevance_score": 0.2 }),
            json!({ "price": 3.0 }),
            json!({ "title": "High", "relevance_score": 0.9 }),
        ];
        let records = normalize_results(&CatalogAdapter, &raw);
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["High", "Low"]);
    }

    #[test]
    fn unscored_results_keep_source_order() {
        let raw = vec![json!({ "title": "B" }), json!({ "title": "A", "score": 1.0 })];
        let records = normalize_results(&WebAdapter, &raw);
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "A"]);
    }
}
