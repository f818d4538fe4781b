#![warn(missing_docs)]
//! Core library for the shopcrawl shopping-question pipeline.
//!
//! A query is classified, turned into a retrieval plan, answered by the
//! catalog and/or web capabilities, and reconciled into one ranked answer.

pub mod answer;
pub mod capability;
pub mod classifier;
pub mod controls;
pub mod error;
pub mod executor;
pub mod normalizer;
pub mod pipeline;
pub mod planner;
pub mod providers;
pub mod reconciler;
pub mod state;

pub use capability::{
    Capability, CapabilitySet, FixtureCapability, HttpToolCapability, SerperWebSearch, ToolArgs,
    ToolName,
};
pub use classifier::{
    classify_or_fail_closed, Classification, IntentClassifier, LlmClassifier, RuleClassifier,
};
pub use controls::{PipelineArgs, PipelineControls};
pub use error::{CapabilityError, ClassificationError, ValidationError};
pub use executor::{execute, RetrievalOutcome};
pub use pipeline::Pipeline;
pub use planner::{plan, IntentFamily};
pub use reconciler::{reconcile, reconcile_items};
pub use state::{
    AnswerKind, Availability, Constraints, Discrepancy, DiscrepancyField, FinalAnswer,
    Filters, MatchConfidence, NormalizedRecord, PipelineState, ReconciledItem, RetrievalPlan,
    Source,
};
