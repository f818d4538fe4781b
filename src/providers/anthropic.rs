use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::{build_client, post_json, LlmProvider, ProviderRequest};
use crate::error::ClassificationError;

const MESSAGES: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
// Prefilled assistant turn; the model continues the object from here.
const PREFILL: &str = "{";

/// Anthropic messages API with a prefilled `{` so the reply is the router object.
pub struct AnthropicProvider {
    model: String,
    client: Client,
}

impl AnthropicProvider {
    /// Builds a client that sends `api_key` and the pinned API version.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self, ClassificationError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(api_key.trim())
            .map_err(|_| ClassificationError::Backend("invalid Anthropic API key".to_string()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(Self {
            model,
            client: build_client("Anthropic", headers, timeout)?,
        })
    }

    fn body<'a>(&'a self, request: &ProviderRequest<'a>) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: [
                Turn {
                    role: "user",
                    content: request.prompt,
                },
                Turn {
                    role: "assistant",
                    content: PREFILL,
                },
            ],
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn complete_json(&self, request: &ProviderRequest) -> Result<String, ClassificationError> {
        let parsed: MessagesResponse =
            post_json(&self.client, "Anthropic", MESSAGES, &self.body(request))?;
        reply_text(parsed)
    }
}

fn reply_text(parsed: MessagesResponse) -> Result<String, ClassificationError> {
    if parsed.stop_reason.as_deref() == Some("max_tokens") {
        return Err(ClassificationError::Malformed(
            "Anthropic reply was cut off".to_string(),
        ));
    }
    let text: String = parsed
        .content
        .into_iter()
        .filter_map(|block| match block {
            Block::Text { text } => Some(text),
            Block::Other => None,
        })
        .collect();
    if text.trim().is_empty() {
        return Err(ClassificationError::Malformed(
            "Anthropic reply has no text".to_string(),
        ));
    }
    Ok(format!("{PREFILL}{text}"))
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: usize,
    temperature: f32,
    system: &'a str,
    messages: [Turn<'a>; 2],
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_turn_is_prefilled() {
        let provider =
            AnthropicProvider::new("key", "claude-test".into(), Duration::from_secs(1)).unwrap();
        let request = ProviderRequest {
            system: "route",
            prompt: "is catan in stock",
            temperature: 0.0,
            max_tokens: 64,
        };
        let body = serde_json::to_value(provider.body(&request)).unwrap();
        assert_eq!(body["system"], "route");
        assert_eq!(body["messages"][1], json!({ "role": "assistant", "content": "{" }));
    }

    #[test]
    fn reply_is_rejoined_with_the_prefill() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "\"intent\": \"check_availability\"}" }],
            "stop_reason": "end_turn"
        }))
        .unwrap();
        assert_eq!(
            reply_text(parsed).unwrap(),
            "{\"intent\": \"check_availability\"}"
        );
    }

    #[test]
    fn truncated_reply_is_malformed() {
        let parsed: MessagesResponse = serde_json::from_value(json!({
            "content": [{ "type": "text", "text": "\"intent\": " }],
            "stop_reason": "max_tokens"
        }))
        .unwrap();
        assert!(matches!(reply_text(parsed), Err(ClassificationError::Malformed(_))));
    }
}
