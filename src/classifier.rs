//! Intent classification: query text to `{intent, constraints, safety_flag}`.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ClassificationError;
use crate::providers::{LlmProvider, ProviderRequest};
use crate::state::Constraints;

/// Label used whenever the goal cannot be determined.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Free-form goal label such as `check_price`.
    pub intent: String,
    /// Extracted entities (item, budget, category, brand, ...).
    pub constraints: Constraints,
    /// True when the query asks for unsafe content.
    pub safety_flag: bool,
}

impl Classification {
    /// Default used when classification fails: unknown intent, no retrieval.
    pub fn fail_closed() -> Self {
        Self {
            intent: UNKNOWN_INTENT.to_string(),
            constraints: Constraints::new(),
            safety_flag: false,
        }
    }

    /// Output for an unsafe query.
    pub fn unsafe_query() -> Self {
        Self {
            safety_flag: true,
            ..Self::fail_closed()
        }
    }

    /// Forces the shape expected of a flagged query.
    fn sanitized(self) -> Self {
        if self.safety_flag {
            return Self::unsafe_query();
        }
        let intent = self.intent.trim().to_string();
        Self {
            intent: if intent.is_empty() {
                UNKNOWN_INTENT.to_string()
            } else {
                intent
            },
            ..self
        }
    }
}

/// Anything that can label a query.
pub trait IntentClassifier: Send + Sync {
    /// Classifies one query.
    fn classify(&self, query: &str) -> Result<Classification, ClassificationError>;
}

/// Runs a classifier and falls back to [`Classification::fail_closed`] on error.
pub fn classify_or_fail_closed(classifier: &dyn IntentClassifier, query: &str) -> Classification {
    match classifier.classify(query) {
        Ok(classification) => classification.sanitized(),
        Err(err) => {
            warn!(%err, "classification failed; continuing with unknown intent");
            Classification::fail_closed()
        }
    }
}

/// Deterministic keyword classifier that needs no model.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

const UNSAFE_PHRASES: &[&str] = &[
    "make a bomb",
    "build a bomb",
    "explosive",
    "ghost gun",
    "untraceable gun",
    "kill someone",
    "hurt someone",
    "poison someone",
    "buy drugs",
    "counterfeit",
    "stolen",
    "meth",
    "cocaine",
    "heroin",
    "fentanyl",
];
const COMPARE_CUES: &[&str] = &[
    "compare", "comparison", "vs", "versus", "difference between", "better than",
];
const PRICE_CUES: &[&str] = &["price", "pricing", "cost", "how much", "cheapest", "deal on"];
const AVAILABILITY_CUES: &[&str] = &["in stock", "availability", "available", "sold out", "stock"];
const SEARCH_CUES: &[&str] = &[
    "recommend", "recommendation", "suggest", "looking for", "find", "best", "gift", "show me", "search", "need",
    "want", "ideas",
];
const CATEGORY_CUES: &[(&str, &str)] = &[
    ("board game", "board game"),
    ("card game", "card game"),
    ("dice game", "dice game"),
    ("dice", "dice game"),
    ("controller", "controller"),
    ("mouse", "mouse"),
    ("mice", "mouse"),
    ("headset", "headset"),
    ("puzzle", "puzzle"),
    ("keyboard", "keyboard"),
];
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "of", "for", "is", "are", "what", "whats", "what's", "current", "currently",
    "latest", "now", "price", "cost", "how", "much", "does", "do", "in", "stock", "available",
    "availability", "me", "show", "find", "recommend", "suggest", "please", "i", "want", "need",
    "looking", "compare", "vs", "versus", "and", "or", "any", "some", "under", "below", "budget",
    "best", "cheapest", "can", "buy", "to", "with", "it", "still",
];

impl IntentClassifier for RuleClassifier {
    fn classify(&self, query: &str) -> Result<Classification, ClassificationError> {
        let lowered = format!(" {} ", query.trim().to_lowercase());
        if UNSAFE_PHRASES.iter().any(|phrase| contains_phrase(&lowered, phrase)) {
            return Ok(Classification::unsafe_query());
        }

        let mut constraints = Constraints::new();
        if let Some(budget) = extract_budget(query) {
            constraints.insert("budget".to_string(), Value::from(budget));
        }
        if let Some((_, category)) = CATEGORY_CUES
            .iter()
            .find(|(cue, _)| contains_phrase(&lowered, cue))
        {
            constraints.insert("category".to_string(), Value::from(*category));
        }
        if let Some(brand) = extract_brand(query) {
            constraints.insert("brand".to_string(), Value::from(brand));
        }
        if let Some(item) = item_phrase(query) {
            constraints.insert("item".to_string(), Value::from(item));
        }

        let has = |cues: &[&str]| cues.iter().any(|cue| contains_phrase(&lowered, cue));
        let intent = if has(COMPARE_CUES) {
            "compare"
        } else if has(PRICE_CUES) {
            "check_price"
        } else if has(AVAILABILITY_CUES) {
            "check_availability"
        } else if has(SEARCH_CUES) || constraints.contains_key("category") {
            "search"
        } else {
            UNKNOWN_INTENT
        };

        Ok(Classification {
            intent: intent.to_string(),
            constraints,
            safety_flag: false,
        })
    }
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(phrase) {
        let begin = start + pos;
        let end = begin + phrase.len();
        let before = haystack[..begin].chars().next_back();
        let after = haystack[end..].chars().next();
        let boundary = |ch: Option<char>| ch.map_or(true, |c| !c.is_alphanumeric());
        // plural suffix still counts as a word match
        let after_ok = boundary(after) || (after == Some('s') && boundary(haystack[end + 1..].chars().next()));
        if boundary(before) && after_ok {
            return true;
        }
        start = end;
    }
    false
}

fn extract_budget(query: &str) -> Option<f64> {
    static BUDGET: OnceLock<Regex> = OnceLock::new();
    let budget = BUDGET.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:under|below|less than|at most|up to|max(?:imum)?|budget(?: of| is)?)\s*\$?\s*(\d[\d,]*(?:\.\d+)?)",
        )
        .expect("budget pattern")
    });
    budget
        .captures(query)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
}

fn extract_brand(query: &str) -> Option<String> {
    static BRAND: OnceLock<Regex> = OnceLock::new();
    let brand = BRAND.get_or_init(|| {
        Regex::new(r"\b(?:by|from)\s+([A-Z][\w&'-]*(?:\s+[A-Z][\w&'-]*)*)").expect("brand pattern")
    });
    brand
        .captures(query)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn item_phrase(query: &str) -> Option<String> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|word| {
            word.trim_matches(|ch: char| !ch.is_alphanumeric() && ch != '\'')
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .filter(|word| !FILLER_WORDS.contains(&word.as_str()))
        .filter(|word| !word.chars().all(|ch| ch.is_ascii_digit()))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

const ROUTER_PROMPT: &str = r#"You are the Router Agent in an e-commerce assistant.

Your job:
1. Identify the user's INTENT.
2. Extract CONSTRAINTS relevant to product filtering.
3. Check for SAFETY issues.

INTENT CATEGORIES:
- "search"             -> product suggestions / recommendations
- "compare"            -> comparing items / pros and cons
- "check_price"        -> price inquiries, especially current or latest price
- "check_availability" -> stock status or availability
- "unknown"            -> fallback

Constraints to extract ONLY if present: item, category, brand, budget,
max_price, min_price, rating, features.

safety_flag = true only if the user asks for harmful, violent, illegal, or
unsafe content. When safety_flag is true use intent "unknown" and {} constraints.

Respond ONLY with:
{"intent": "...", "constraints": {...}, "safety_flag": true/false}"#;

/// Classifier that asks an LLM for the router JSON.
pub struct LlmClassifier {
    provider: Box<dyn LlmProvider + Send + Sync>,
    max_tokens: usize,
}

impl LlmClassifier {
    /// Wraps a provider.
    pub fn new(provider: Box<dyn LlmProvider + Send + Sync>) -> Self {
        Self {
            provider,
            max_tokens: 350,
        }
    }
}

impl IntentClassifier for LlmClassifier {
    fn classify(&self, query: &str) -> Result<Classification, ClassificationError> {
        let request = ProviderRequest {
            system: ROUTER_PROMPT,
            prompt: query,
            temperature: 0.0,
            max_tokens: self.max_tokens,
        };
        let reply = self.provider.complete_json(&request)?;
        parse_router_reply(&reply)
    }
}

#[derive(Debug, Deserialize)]
struct RouterReply {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    constraints: Option<Map<String, Value>>,
    #[serde(default)]
    safety_flag: Option<bool>,
}

/// Parses a router reply, tolerating code fences and surrounding prose.
pub fn parse_router_reply(reply: &str) -> Result<Classification, ClassificationError> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(ClassificationError::Malformed(
                "reply contains no JSON object".to_string(),
            ))
        }
    };
    let parsed: RouterReply = serde_json::from_str(body)
        .map_err(|err| ClassificationError::Malformed(err.to_string()))?;
    Ok(Classification {
        intent: parsed
            .intent
            .unwrap_or_else(|| UNKNOWN_INTENT.to_string()),
        constraints: parsed
            .constraints
            .map(|map| map.into_iter().filter(|(_, v)| !v.is_null()).collect())
            .unwrap_or_default(),
        safety_flag: parsed.safety_flag.unwrap_or(false),
    })
}
