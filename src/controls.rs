//! Pipeline tunables and the command-line surface shared by the binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use tracing::warn;

use crate::capability::{
    Capability, CapabilitySet, FixtureCapability, HttpToolCapability, SerperWebSearch,
    SERPER_ENDPOINT,
};
use crate::classifier::{IntentClassifier, LlmClassifier, RuleClassifier};
use crate::providers::{AnthropicProvider, OpenAiProvider};

/// Catalog tool accepts at most this many results per call.
pub const MAX_CATALOG_RESULTS: usize = 20;
/// Web tool accepts at most this many results per call.
pub const MAX_WEB_RESULTS: usize = 10;

/// Knobs that bound retrieval and reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineControls {
    catalog_results: usize,
    web_results: usize,
    match_threshold: f64,
    discrepancy_threshold: f64,
    capability_timeout: Duration,
    capability_retries: u8,
}

impl PipelineControls {
    /// Number of catalog results requested per query.
    pub fn catalog_results(&self) -> usize {
        self.catalog_results
    }

    /// Number of web results requested per query.
    pub fn web_results(&self) -> usize {
        self.web_results
    }

    /// Minimum title similarity for a fuzzy match (inclusive).
    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }

    /// Relative price delta above which a discrepancy is recorded.
    pub fn discrepancy_threshold(&self) -> f64 {
        self.discrepancy_threshold
    }

    /// Upper bound on a single capability invocation.
    pub fn capability_timeout(&self) -> Duration {
        self.capability_timeout
    }

    /// Extra attempts after a transient capability failure (0 or 1).
    pub fn capability_retries(&self) -> u8 {
        self.capability_retries
    }

    /// Sets the catalog result count, clamped to `1..=20`.
    pub fn with_catalog_results(mut self, count: usize) -> Self {
        self.catalog_results = count.clamp(1, MAX_CATALOG_RESULTS);
        self
    }

    /// Sets the web result count, clamped to `1..=10`.
    pub fn with_web_results(mut self, count: usize) -> Self {
        self.web_results = count.clamp(1, MAX_WEB_RESULTS);
        self
    }

    /// Sets τ, clamped to `0.0..=1.0`.
    pub fn with_match_threshold(mut self, threshold: f64) -> Self {
        if threshold.is_finite() {
            self.match_threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    /// Sets the discrepancy threshold, clamped to `0.0..=1.0`.
    pub fn with_discrepancy_threshold(mut self, threshold: f64) -> Self {
        if threshold.is_finite() {
            self.discrepancy_threshold = threshold.clamp(0.0, 1.0);
        }
        self
    }

    /// Sets the per-call timeout; zero is raised to one millisecond.
    pub fn with_capability_timeout(mut self, timeout: Duration) -> Self {
        self.capability_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Sets the retry budget; anything above one is treated as one.
    pub fn with_capability_retries(mut self, retries: u8) -> Self {
        self.capability_retries = retries.min(1);
        self
    }
}

impl Default for PipelineControls {
    fn default() -> Self {
        Self {
            catalog_results: 5,
            web_results: 5,
            match_threshold: 0.6,
            discrepancy_threshold: 0.20,
            capability_timeout: Duration::from_secs(10),
            capability_retries: 0,
        }
    }
}

/// Flags shared by `shopcrawl-cli` and `shopcrawl-api`.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Catalog results requested per query (1-20)
    #[arg(long, env = "SHOPCRAWL_CATALOG_RESULTS", default_value_t = 5)]
    pub catalog_results: usize,

    /// Web results requested per query (1-10)
    #[arg(long, env = "SHOPCRAWL_WEB_RESULTS", default_value_t = 5)]
    pub web_results: usize,

    /// Fuzzy title-match threshold
    #[arg(long, env = "SHOPCRAWL_MATCH_THRESHOLD", default_value_t = 0.6)]
    pub match_threshold: f64,

    /// Relative price delta flagged as a discrepancy
    #[arg(long, env = "SHOPCRAWL_DISCREPANCY_THRESHOLD", default_value_t = 0.20)]
    pub discrepancy_threshold: f64,

    /// Seconds allowed per capability call
    #[arg(long, env = "SHOPCRAWL_CAPABILITY_TIMEOUT_SECS", default_value_t = 10)]
    pub capability_timeout_secs: u64,

    /// Retries after a transient capability failure (0 or 1)
    #[arg(long, env = "SHOPCRAWL_CAPABILITY_RETRIES", default_value_t = 0)]
    pub capability_retries: u8,

    /// Intent classifier backend (rules, openai or anthropic)
    #[arg(long, env = "SHOPCRAWL_CLASSIFIER", default_value = "rules")]
    pub classifier: String,

    /// OpenAI API key (required when --classifier openai)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// OpenAI chat model used for intent routing
    #[arg(long, env = "SHOPCRAWL_OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Anthropic API key (required when --classifier anthropic)
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    pub anthropic_api_key: Option<String>,

    /// Anthropic model identifier
    #[arg(
        long,
        env = "SHOPCRAWL_ANTHROPIC_MODEL",
        default_value = "claude-3-5-haiku-latest"
    )]
    pub anthropic_model: String,

    /// Seconds allowed for one classifier LLM call
    #[arg(long, env = "SHOPCRAWL_LLM_TIMEOUT_SECS", default_value_t = 30)]
    pub llm_timeout_secs: u64,

    /// Tool server exposing POST /tools/{catalog_search,web_search}
    #[arg(long, env = "SHOPCRAWL_TOOL_SERVER")]
    pub tool_server: Option<String>,

    /// Serper API key; enables live web_search
    #[arg(long, env = "SERPER_API_KEY")]
    pub serper_api_key: Option<String>,

    /// Serper endpoint override
    #[arg(long, env = "SHOPCRAWL_SERPER_URL", default_value = SERPER_ENDPOINT)]
    pub serper_url: String,

    /// JSON file served as catalog_search results
    #[arg(long, env = "SHOPCRAWL_CATALOG_FIXTURE")]
    pub catalog_fixture: Option<PathBuf>,

    /// JSON file served as web_search results
    #[arg(long, env = "SHOPCRAWL_WEB_FIXTURE")]
    pub web_fixture: Option<PathBuf>,
}

impl PipelineArgs {
    /// Converts the parsed flags into `PipelineControls`.
    pub fn build_controls(&self) -> PipelineControls {
        PipelineControls::default()
            .with_catalog_results(self.catalog_results)
            .with_web_results(self.web_results)
            .with_match_threshold(self.match_threshold)
            .with_discrepancy_threshold(self.discrepancy_threshold)
            .with_capability_timeout(self.capability_timeout())
            .with_capability_retries(self.capability_retries)
    }

    fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs.max(1))
    }

    /// Instantiates the selected classifier backend.
    pub fn build_classifier(&self) -> Result<Arc<dyn IntentClassifier>> {
        let timeout = Duration::from_secs(self.llm_timeout_secs.max(1));
        let backend = self.classifier.trim().to_lowercase();
        let classifier: Arc<dyn IntentClassifier> = match backend.as_str() {
            "rules" => Arc::new(RuleClassifier),
            "openai" => {
                let key = self
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set for the OpenAI classifier"))?;
                let provider = OpenAiProvider::new(&key, self.openai_model.clone(), timeout)?;
                Arc::new(LlmClassifier::new(Box::new(provider)))
            }
            "anthropic" => {
                let key = self.anthropic_api_key.clone().ok_or_else(|| {
                    anyhow!("ANTHROPIC_API_KEY must be set for the Anthropic classifier")
                })?;
                let provider = AnthropicProvider::new(&key, self.anthropic_model.clone(), timeout)?;
                Arc::new(LlmClassifier::new(Box::new(provider)))
            }
            other => bail!(
                "unsupported classifier '{}'; use rules, openai or anthropic",
                other
            ),
        };
        Ok(classifier)
    }

    /// Wires catalog and web providers. Fixtures win over the tool server for
    /// catalog_search; Serper wins over fixtures and the tool server for
    /// web_search.
    pub fn build_capabilities(&self) -> Result<CapabilitySet> {
        let timeout = self.capability_timeout();
        let tool_server: Option<Arc<dyn Capability>> = match &self.tool_server {
            Some(url) => Some(Arc::new(HttpToolCapability::new(url.clone(), timeout)?)),
            None => None,
        };

        let mut set = CapabilitySet::new();
        if let Some(path) = &self.catalog_fixture {
            set = set.with_catalog(Arc::new(FixtureCapability::from_path(path)?));
        } else if let Some(server) = &tool_server {
            set = set.with_catalog(Arc::clone(server));
        } else {
            warn!("no catalog_search provider configured");
        }

        if let Some(key) = &self.serper_api_key {
            set = set.with_web(Arc::new(SerperWebSearch::new(
                key,
                self.serper_url.clone(),
                timeout,
            )?));
        } else if let Some(path) = &self.web_fixture {
            set = set.with_web(Arc::new(FixtureCapability::from_path(path)?));
        } else if let Some(server) = tool_server {
            set = set.with_web(server);
        } else {
            warn!("no web_search provider configured");
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        pipeline: PipelineArgs,
    }

    fn parse(args: &[&str]) -> PipelineArgs {
        let mut argv = vec!["shopcrawl"];
        argv.extend_from_slice(args);
        TestCli::parse_from(argv).pipeline
    }

    #[test]
    fn defaults_match_documented_values() {
        let controls = PipelineControls::default();
        assert_eq!(controls.catalog_results(), 5);
        assert_eq!(controls.web_results(), 5);
        assert_eq!(controls.match_threshold(), 0.6);
        assert_eq!(controls.discrepancy_threshold(), 0.20);
        assert_eq!(controls.capability_timeout(), Duration::from_secs(10));
        assert_eq!(controls.capability_retries(), 0);
    }

    #[test]
    fn builders_clamp() {
        let controls = PipelineControls::default()
            .with_catalog_results(0)
            .with_web_results(50)
            .with_match_threshold(1.7)
            .with_capability_retries(3);
        assert_eq!(controls.catalog_results(), 1);
        assert_eq!(controls.web_results(), MAX_WEB_RESULTS);
        assert_eq!(controls.match_threshold(), 1.0);
        assert_eq!(controls.capability_retries(), 1);
    }

    #[test]
    fn flags_flow_into_controls() {
        let args = parse(&[
            "--web-results",
            "8",
            "--match-threshold",
            "0.75",
            "--capability-timeout-secs",
            "3",
        ]);
        let controls = args.build_controls();
        assert_eq!(controls.web_results(), 8);
        assert_eq!(controls.match_threshold(), 0.75);
        assert_eq!(controls.capability_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn unknown_classifier_is_rejected() {
        let args = parse(&["--classifier", "oracle"]);
        assert!(args.build_classifier().is_err());
    }

    #[test]
    fn rules_classifier_needs_no_keys() {
        let args = parse(&["--classifier", "rules"]);
        assert!(args.build_classifier().is_ok());
    }
}
