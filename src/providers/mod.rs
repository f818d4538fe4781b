//! Blocking chat-completion clients used by [`crate::classifier::LlmClassifier`].
//!
//! Both providers ask their model for a single JSON object and hand back its
//! text. Transport and status failures surface as
//! [`ClassificationError::Backend`]; a reply without usable text is
//! [`ClassificationError::Malformed`].

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ClassificationError;

mod anthropic;
mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

/// Trait implemented by concrete LLM providers.
pub trait LlmProvider {
    /// Sends one system + user exchange and returns the JSON object the
    /// model replied with, as text.
    fn complete_json(&self, request: &ProviderRequest) -> Result<String, ClassificationError>;
}

/// Request envelope shared by the various providers.
pub struct ProviderRequest<'a> {
    /// System instructions.
    pub system: &'a str,
    /// User turn.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion budget.
    pub max_tokens: usize,
}

fn build_client(
    vendor: &str,
    headers: HeaderMap,
    timeout: Duration,
) -> Result<Client, ClassificationError> {
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|err| ClassificationError::Backend(format!("{vendor} client: {err}")))
}

fn post_json<B: Serialize, R: DeserializeOwned>(
    client: &Client,
    vendor: &str,
    url: &str,
    body: &B,
) -> Result<R, ClassificationError> {
    let resp = client
        .post(url)
        .json(body)
        .send()
        .map_err(|err| ClassificationError::Backend(format!("{vendor} request failed: {err}")))?;
    check_status(vendor, resp)?
        .json()
        .map_err(|err| ClassificationError::Malformed(format!("{vendor} response: {err}")))
}

fn check_status(vendor: &str, resp: Response) -> Result<Response, ClassificationError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(ClassificationError::Backend(format!(
        "{vendor} returned {status}: {}",
        text.chars().take(200).collect::<String>()
    )))
}
