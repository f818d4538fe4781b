use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::{build_client, post_json, LlmProvider, ProviderRequest};
use crate::error::ClassificationError;

const CHAT_COMPLETIONS: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat completions in JSON mode.
pub struct OpenAiProvider {
    model: String,
    client: Client,
}

impl OpenAiProvider {
    /// Builds a client that authenticates every request with `api_key`.
    pub fn new(api_key: &str, model: String, timeout: Duration) -> Result<Self, ClassificationError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ClassificationError::Backend("invalid OpenAI API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(Self {
            model,
            client: build_client("OpenAI", headers, timeout)?,
        })
    }

    fn body<'a>(&'a self, request: &ProviderRequest<'a>) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system,
                },
                ChatMessage {
                    role: "user",
                    content: request.prompt,
                },
            ],
        }
    }
}

impl LlmProvider for OpenAiProvider {
    fn complete_json(&self, request: &ProviderRequest) -> Result<String, ClassificationError> {
        let parsed: ChatResponse =
            post_json(&self.client, "OpenAI", CHAT_COMPLETIONS, &self.body(request))?;
        reply_text(parsed)
    }
}

fn reply_text(parsed: ChatResponse) -> Result<String, ClassificationError> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ClassificationError::Malformed("OpenAI returned no choices".to_string()))?;
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ClassificationError::Malformed(
            "OpenAI reply was cut off".to_string(),
        ));
    }
    choice
        .message
        .content
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ClassificationError::Malformed("OpenAI reply has no content".to_string()))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
