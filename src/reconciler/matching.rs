//! Pairing catalog records with web records.
//!
//! Exact pairs are found first (shared identity key or product-id URL
//! segment). The remaining records are paired greedily by title similarity,
//! highest score first, ties broken by catalog position then web position.

use std::collections::BTreeSet;

use url::Url;

use crate::normalizer::site_free_title;
use crate::state::{MatchConfidence, NormalizedRecord};

// Words that say what kind of product a title is, not which product.
const GENERIC_TOKENS: &[&str] = &[
    "a", "an", "the", "of", "and", "for", "board", "game", "games", "edition", "set", "toy", "toys",
];
const GENERIC_SEGMENTS: &[&str] = &[
    "index", "default", "details", "detail", "page", "item", "product", "products", "p", "ip",
];

/// One catalog/web pairing, by index into the two input lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPair {
    /// Index into the catalog list.
    pub catalog: usize,
    /// Index into the web list.
    pub web: usize,
    /// `Exact` or `Fuzzy`.
    pub confidence: MatchConfidence,
}

/// Pairs records across the two lists. Each record appears in at most one pair.
pub fn match_records(
    catalog: &[NormalizedRecord],
    web: &[NormalizedRecord],
    threshold: f64,
) -> Vec<MatchPair> {
    let mut pairs = Vec::new();
    let mut catalog_taken = vec![false; catalog.len()];
    let mut web_taken = vec![false; web.len()];

    let web_keys: Vec<Option<String>> = web.iter().map(web_key).collect();
    for (ci, record) in catalog.iter().enumerate() {
        let keys = catalog_keys(record);
        if keys.is_empty() {
            continue;
        }
        let hit = web_keys.iter().enumerate().find(|(wi, key)| {
            !web_taken[*wi] && key.as_ref().is_some_and(|key| keys.contains(key))
        });
        if let Some((wi, _)) = hit {
            catalog_taken[ci] = true;
            web_taken[wi] = true;
            pairs.push(MatchPair {
                catalog: ci,
                web: wi,
                confidence: MatchConfidence::Exact,
            });
        }
    }

    let mut candidates = Vec::new();
    for (ci, c) in catalog.iter().enumerate().filter(|(ci, _)| !catalog_taken[*ci]) {
        for (wi, w) in web.iter().enumerate().filter(|(wi, _)| !web_taken[*wi]) {
            if brands_conflict(c, w) {
                continue;
            }
            let score = title_similarity(&c.title, &w.title);
            if score >= threshold {
                candidates.push((score, ci, wi));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });
    for (_, ci, wi) in candidates {
        if catalog_taken[ci] || web_taken[wi] {
            continue;
        }
        catalog_taken[ci] = true;
        web_taken[wi] = true;
        pairs.push(MatchPair {
            catalog: ci,
            web: wi,
            confidence: MatchConfidence::Fuzzy,
        });
    }

    pairs.sort_by_key(|pair| pair.catalog);
    pairs
}

/// Title similarity in `0.0..=1.0`.
///
/// Store affixes and generic words ("board game", "edition") are dropped
/// first. The score weighs Jaccard overlap of the remaining tokens at 0.7 and
/// Jaro-Winkler on the same tokens at 0.3, so a distinguishing extra word
/// ("Seafarers", "Expansion") costs as much as a missing one.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let left = title_tokens(a);
    let right = title_tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.iter().filter(|tok| right.contains(*tok)).count() as f64;
    let union = (left.len() + right.len()) as f64 - shared;
    let overlap = shared / union;
    let jw = strsim::jaro_winkler(&left.join(" "), &right.join(" "));
    0.7 * overlap + 0.3 * jw
}

/// Extracts the product id a URL points at: the segment after `dp` or
/// `gp/product`, else an ASIN-shaped segment, else a last path segment that
/// carries a digit and is not a generic page name. Other URLs have no id.
pub fn product_id(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url.trim()).ok()?;
    let segments: Vec<&str> = url
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .collect();
    let after = |marker: &[&str]| {
        segments
            .windows(marker.len() + 1)
            .find(|window| window[..marker.len()] == *marker)
            .map(|window| window[marker.len()])
    };
    let id = after(&["dp"])
        .or_else(|| after(&["gp", "product"]))
        .or_else(|| segments.iter().copied().find(|segment| looks_like_asin(segment)))
        .map(str::to_lowercase)
        .or_else(|| segments.last().copied().and_then(trailing_id))?;
    (!id.is_empty()).then_some(id)
}

fn trailing_id(segment: &str) -> Option<String> {
    let id = segment
        .trim_end_matches(".html")
        .trim_end_matches(".htm")
        .to_lowercase();
    let has_digit = id.chars().any(|ch| ch.is_ascii_digit());
    (has_digit && id.len() >= 4 && !GENERIC_SEGMENTS.contains(&id.as_str())).then_some(id)
}

fn looks_like_asin(segment: &str) -> bool {
    segment.len() == 10
        && segment
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        && segment.chars().any(|ch| ch.is_ascii_digit())
}

fn catalog_keys(record: &NormalizedRecord) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    if let Some(id) = &record.identity_key {
        let id = id.trim().to_lowercase();
        if !id.is_empty() {
            keys.insert(id);
        }
    }
    if let Some(id) = record.source_url.as_deref().and_then(product_id) {
        keys.insert(id);
    }
    keys
}

fn web_key(record: &NormalizedRecord) -> Option<String> {
    record.source_url.as_deref().and_then(product_id)
}

fn brands_conflict(a: &NormalizedRecord, b: &NormalizedRecord) -> bool {
    match (&a.brand, &b.brand) {
        (Some(x), Some(y)) => !x.trim().eq_ignore_ascii_case(y.trim()),
        _ => false,
    }
}

// Distinct lowercased tokens in title order; generic words are dropped unless
// nothing else is left.
fn title_tokens(title: &str) -> Vec<String> {
    let mut all: Vec<String> = Vec::new();
    for tok in site_free_title(title)
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|tok| !tok.is_empty())
        .map(str::to_lowercase)
    {
        if !all.contains(&tok) {
            all.push(tok);
        }
    }
    let specific: Vec<String> = all
        .iter()
        .filter(|tok| !GENERIC_TOKENS.contains(&tok.as_str()))
        .cloned()
        .collect();
    if specific.is_empty() {
        all
    } else {
        specific
    }
}
