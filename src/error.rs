//! Error taxonomy for the retrieval-reconciliation core.
//!
//! None of these escape [`crate::Pipeline::run_pipeline`]: classification errors fall
//! back to a fail-closed default, capability errors shrink the candidate set,
//! validation errors drop a single record.

use std::time::Duration;

use thiserror::Error;

use crate::capability::ToolName;

/// The classifier could not produce structured output.
#[derive(Debug, Error)]
pub enum ClassificationError {
    /// The model/provider call itself failed.
    #[error("classifier backend failed: {0}")]
    Backend(String),
    /// The backend replied, but not with the expected JSON object.
    #[error("malformed classifier output: {0}")]
    Malformed(String),
}

/// A retrieval source was unreachable or answered with garbage.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// No provider is registered for this tool.
    #[error("{0} capability is not configured")]
    Unavailable(ToolName),
    /// The call exceeded its per-call budget.
    #[error("{tool} timed out after {elapsed:?}")]
    Timeout {
        /// Tool that timed out.
        tool: ToolName,
        /// Budget that was exhausted.
        elapsed: Duration,
    },
    /// Transport-level failure (connect, TLS, non-success status).
    #[error("{tool} transport error: {message}")]
    Transport {
        /// Tool that failed.
        tool: ToolName,
        /// Underlying error text.
        message: String,
    },
    /// The response body was not a list of result objects.
    #[error("{tool} returned a malformed response: {message}")]
    MalformedResponse {
        /// Tool that failed.
        tool: ToolName,
        /// What was wrong with the body.
        message: String,
    },
}

impl CapabilityError {
    /// Timeouts and transport errors may be retried once; bad payloads may not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CapabilityError::Timeout { .. } | CapabilityError::Transport { .. }
        )
    }
}

/// One raw result object could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Raw result was not a JSON object.
    #[error("result is not an object")]
    NotAnObject,
    /// Title absent or blank.
    #[error("result has no title")]
    MissingTitle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_failures_are_transient() {
        let timeout = CapabilityError::Timeout {
            tool: ToolName::WebSearch,
            elapsed: Duration::from_millis(10),
        };
        let malformed = CapabilityError::MalformedResponse {
            tool: ToolName::WebSearch,
            message: "not a list".into(),
        };
        assert!(timeout.is_transient());
        assert!(!malformed.is_transient());
        assert!(!CapabilityError::Unavailable(ToolName::CatalogSearch).is_transient());
    }

    #[test]
    fn messages_name_the_tool() {
        let err = CapabilityError::Unavailable(ToolName::CatalogSearch);
        assert_eq!(err.to_string(), "catalog_search capability is not configured");
    }
}
