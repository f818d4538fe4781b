//! Pipeline state threaded through every stage, plus the record shapes it carries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::ToolName;
use crate::classifier::Classification;

/// Open key-value map of entities extracted from the query.
pub type Constraints = BTreeMap<String, Value>;

/// Stock status reported by a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Purchasable now.
    InStock,
    /// Listed but not purchasable.
    OutOfStock,
    /// The source said nothing usable.
    #[default]
    Unknown,
}

impl Availability {
    /// True when the source reported a definite status.
    pub fn is_known(self) -> bool {
        self != Availability::Unknown
    }

    /// Spoken/displayed phrasing.
    pub fn describe(self) -> &'static str {
        match self {
            Availability::InStock => "in stock",
            Availability::OutOfStock => "out of stock",
            Availability::Unknown => "availability unknown",
        }
    }
}

/// Which retrieval capability produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Private, pre-indexed product catalog.
    Catalog,
    /// Live web search.
    Web,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Catalog => write!(f, "catalog"),
            Source::Web => write!(f, "web"),
        }
    }
}

/// Common record shape both retrieval sources are normalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Stable id (catalog id, ASIN) when known. Always `None` for web records.
    pub identity_key: Option<String>,
    /// Product title; records without one never get this far.
    pub title: String,
    /// Brand name.
    pub brand: Option<String>,
    /// Category path or label.
    pub category: Option<String>,
    /// Price in USD, never negative.
    pub price: Option<f64>,
    /// Average star rating.
    pub rating: Option<f64>,
    /// Stock status.
    pub availability: Availability,
    /// Producing capability.
    pub source: Source,
    /// Product page the record points at.
    pub source_url: Option<String>,
    /// Source-local relevance score.
    pub raw_score: Option<f64>,
}

impl NormalizedRecord {
    /// Minimal record with only a title; used by adapters and tests.
    pub fn new(title: impl Into<String>, source: Source) -> Self {
        Self {
            identity_key: None,
            title: title.into(),
            brand: None,
            category: None,
            price: None,
            rating: None,
            availability: Availability::Unknown,
            source,
            source_url: None,
            raw_score: None,
        }
    }
}

/// Filters forwarded to the retrieval capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    /// Upper price bound in USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    /// Category label as the user phrased it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Brand name as the user phrased it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
}

impl Filters {
    /// True when no filter is set.
    pub fn is_empty(&self) -> bool {
        self.max_price.is_none() && self.category.is_none() && self.brand.is_none()
    }
}

/// Which capabilities to call and what to compare afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    /// Query the private catalog.
    pub use_catalog: bool,
    /// Query live web search.
    pub use_web: bool,
    /// Reconcile prices across sources.
    pub compare_price: bool,
    /// Reconcile availability across sources.
    pub compare_availability: bool,
    /// Filters derived from the constraints.
    pub filters: Filters,
}

impl RetrievalPlan {
    /// Plan that touches no capability.
    pub fn no_retrieval() -> Self {
        Self::default()
    }

    /// True when at least one capability is requested.
    pub fn requests_retrieval(&self) -> bool {
        self.use_catalog || self.use_web
    }

    /// True when catalog and web records should be matched against each other.
    pub fn wants_comparison(&self) -> bool {
        self.compare_price || self.compare_availability
    }
}

/// How a reconciled item's sources were paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    /// Shared identity key or product-id URL segment.
    Exact,
    /// Title similarity above the configured threshold.
    Fuzzy,
    /// Single-source item.
    None,
}

impl MatchConfidence {
    /// True for items backed by both sources.
    pub fn is_matched(self) -> bool {
        self != MatchConfidence::None
    }
}

/// Field on which the two sources disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyField {
    /// Catalog and web prices differ beyond the threshold.
    Price,
    /// Catalog and web report different stock status.
    Availability,
}

/// Disagreement between the catalog and web side of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Field in disagreement.
    pub field: DiscrepancyField,
    /// Catalog-reported value.
    pub catalog_value: Value,
    /// Web-reported value.
    pub web_value: Value,
}

/// One candidate after matching and merging catalog and web records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledItem {
    /// Catalog identity key when a catalog record contributed.
    pub identity_key: Option<String>,
    /// Display title.
    pub title: String,
    /// Brand name.
    pub brand: Option<String>,
    /// Category path or label.
    pub category: Option<String>,
    /// Merged price.
    pub price: Option<f64>,
    /// Merged rating.
    pub rating: Option<f64>,
    /// Merged stock status.
    pub availability: Availability,
    /// Catalog provenance URL.
    pub catalog_url: Option<String>,
    /// Web provenance URL.
    pub web_url: Option<String>,
    /// Sources that contributed, catalog first.
    pub sources: Vec<Source>,
    /// Relevance score used for ranking.
    pub raw_score: Option<f64>,
    /// Cross-source disagreements, empty when none.
    pub discrepancies: Vec<Discrepancy>,
    /// How the sources were paired.
    pub match_confidence: MatchConfidence,
}

impl ReconciledItem {
    /// URL most useful to a shopper: the live web page, else the catalog page.
    pub fn preferred_url(&self) -> Option<&str> {
        self.web_url.as_deref().or(self.catalog_url.as_deref())
    }

    /// True when a price discrepancy was recorded.
    pub fn has_price_discrepancy(&self) -> bool {
        self.discrepancies
            .iter()
            .any(|d| d.field == DiscrepancyField::Price)
    }
}

/// Which terminal branch produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Ranked items were found.
    Answered,
    /// Nothing usable came back.
    NoResults,
    /// The safety gate fired.
    Refused,
}

/// Terminal payload consumed by the UI and voice layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    /// Terminal branch.
    pub kind: AnswerKind,
    /// Display string.
    pub text: String,
    /// Short spoken sentence, never containing a URL.
    pub speech_text: String,
    /// Structured ranked list for UI rendering.
    pub ranked_items: Vec<ReconciledItem>,
}

pub(crate) const REFUSAL_TEXT: &str = "I'm sorry, but I can't assist with that request.";
pub(crate) const NO_RESULTS_TEXT: &str = "I couldn't find matching products for your query. \
Try adjusting your constraints or rephrasing your request.";
pub(crate) const NO_RESULTS_SPEECH: &str = "Sorry, I couldn't find any matching products.";

impl FinalAnswer {
    /// Fixed payload returned whenever the safety flag is set.
    pub fn refusal() -> Self {
        Self {
            kind: AnswerKind::Refused,
            text: REFUSAL_TEXT.to_string(),
            speech_text: REFUSAL_TEXT.to_string(),
            ranked_items: Vec::new(),
        }
    }

    /// Payload returned when no usable records exist.
    pub fn no_results() -> Self {
        Self {
            kind: AnswerKind::NoResults,
            text: NO_RESULTS_TEXT.to_string(),
            speech_text: NO_RESULTS_SPEECH.to_string(),
            ranked_items: Vec::new(),
        }
    }
}

/// Per-query record every stage appends to. Fields are never removed or
/// renamed; each `record_*` call belongs to exactly one stage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    query: String,
    #[serde(flatten)]
    classification: Classification,
    plan: RetrievalPlan,
    catalog_results: Vec<NormalizedRecord>,
    web_results: Vec<NormalizedRecord>,
    failed_capabilities: Vec<ToolName>,
    final_answer: Option<FinalAnswer>,
    debug_log: Vec<String>,
}

impl PipelineState {
    /// Creates the state for one query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            classification: Classification::fail_closed(),
            plan: RetrievalPlan::no_retrieval(),
            catalog_results: Vec::new(),
            web_results: Vec::new(),
            failed_capabilities: Vec::new(),
            final_answer: None,
            debug_log: Vec::new(),
        }
    }

    /// Raw query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Intent label assigned by the classifier.
    pub fn intent(&self) -> &str {
        &self.classification.intent
    }

    /// Extracted constraints.
    pub fn constraints(&self) -> &Constraints {
        &self.classification.constraints
    }

    /// Authoritative safety gate.
    pub fn safety_flag(&self) -> bool {
        self.classification.safety_flag
    }

    /// Full classifier output.
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Retrieval plan chosen by the planner.
    pub fn plan(&self) -> &RetrievalPlan {
        &self.plan
    }

    /// Normalized catalog records in source order.
    pub fn catalog_results(&self) -> &[NormalizedRecord] {
        &self.catalog_results
    }

    /// Normalized web records in source order.
    pub fn web_results(&self) -> &[NormalizedRecord] {
        &self.web_results
    }

    /// Capabilities that were requested but failed.
    pub fn failed_capabilities(&self) -> &[ToolName] {
        &self.failed_capabilities
    }

    /// Terminal answer, once the reconciler has run.
    pub fn final_answer(&self) -> Option<&FinalAnswer> {
        self.final_answer.as_ref()
    }

    /// Consumes the state and yields the answer, if any.
    pub fn into_final_answer(self) -> Option<FinalAnswer> {
        self.final_answer
    }

    /// Stage trace lines.
    pub fn debug_log(&self) -> &[String] {
        &self.debug_log
    }

    /// Classifier stage output.
    pub fn record_classification(&mut self, classification: Classification) {
        self.classification = classification;
    }

    /// Planner stage output.
    pub fn record_plan(&mut self, plan: RetrievalPlan) {
        self.plan = plan;
    }

    /// Executor stage output.
    pub fn record_retrieval(
        &mut self,
        catalog_results: Vec<NormalizedRecord>,
        web_results: Vec<NormalizedRecord>,
        failed_capabilities: Vec<ToolName>,
    ) {
        self.catalog_results = catalog_results;
        self.web_results = web_results;
        self.failed_capabilities = failed_capabilities;
    }

    /// Reconciler stage output.
    pub fn record_answer(&mut self, answer: FinalAnswer) {
        self.final_answer = Some(answer);
    }

    /// Appends one trace line.
    pub fn log(&mut self, line: impl Into<String>) {
        self.debug_log.push(line.into());
    }
}
