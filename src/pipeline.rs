//! Classifier → planner → executor → reconciler, over one [`PipelineState`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::capability::Capability;
use crate::classifier::{classify_or_fail_closed, Classification, IntentClassifier};
use crate::controls::PipelineControls;
use crate::executor::execute;
use crate::planner::plan;
use crate::reconciler::reconcile;
use crate::state::{FinalAnswer, PipelineState};

/// The retrieval-reconciliation core. Cheap to clone; share one per process.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn IntentClassifier>,
    capabilities: Arc<dyn Capability>,
    controls: PipelineControls,
}

impl Pipeline {
    /// Builds a pipeline with default controls.
    pub fn new(classifier: Arc<dyn IntentClassifier>, capabilities: Arc<dyn Capability>) -> Self {
        Self {
            classifier,
            capabilities,
            controls: PipelineControls::default(),
        }
    }

    /// Replaces the controls.
    pub fn with_controls(mut self, controls: PipelineControls) -> Self {
        self.controls = controls;
        self
    }

    /// Active controls.
    pub fn controls(&self) -> &PipelineControls {
        &self.controls
    }

    /// Answers one query. Every path returns a well-formed answer.
    pub async fn run_pipeline(&self, query: &str) -> FinalAnswer {
        self.run_state(query)
            .await
            .into_final_answer()
            .unwrap_or_else(FinalAnswer::no_results)
    }

    /// Like [`Pipeline::run_pipeline`] but gives up as soon as `token` fires,
    /// dropping any in-flight capability calls.
    pub async fn run_cancellable(&self, query: &str, token: &CancellationToken) -> Option<FinalAnswer> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("query cancelled; discarding pipeline state");
                None
            }
            state = self.run_state(query) => state.into_final_answer(),
        }
    }

    /// Runs every stage and returns the full state, including the debug log.
    pub async fn run_state(&self, query: &str) -> PipelineState {
        let span = info_span!("pipeline", query = %query);
        self.stages(query).instrument(span).await
    }

    async fn stages(&self, query: &str) -> PipelineState {
        let mut state = PipelineState::new(query);

        let classification = self.classify(query).await;
        state.log(format!(
            "[CLASSIFIER] intent={} safety_flag={} constraints={}",
            classification.intent,
            classification.safety_flag,
            serde_json::to_string(&classification.constraints).unwrap_or_default()
        ));
        state.record_classification(classification);

        let retrieval_plan = plan(state.intent(), state.constraints(), state.safety_flag());
        state.log(format!(
            "[PLANNER] use_catalog={} use_web={} compare_price={} compare_availability={} filters={}",
            retrieval_plan.use_catalog,
            retrieval_plan.use_web,
            retrieval_plan.compare_price,
            retrieval_plan.compare_availability,
            serde_json::to_string(&retrieval_plan.filters).unwrap_or_default()
        ));
        debug!(?retrieval_plan, "plan chosen");
        state.record_plan(retrieval_plan);

        if state.safety_flag() {
            state.log("[EXECUTOR] safety flag set; no capability invoked");
        } else {
            let outcome = execute(
                self.capabilities.as_ref(),
                state.plan(),
                state.query(),
                &self.controls,
            )
            .await;
            for line in outcome.log {
                state.log(line);
            }
            state.record_retrieval(outcome.catalog_results, outcome.web_results, outcome.failed);
        }

        let answer = reconcile(&mut state, &self.controls);
        info!(
            kind = ?answer.kind,
            items = answer.ranked_items.len(),
            failed = state.failed_capabilities().len(),
            "pipeline finished"
        );
        state.record_answer(answer);
        state
    }

    async fn classify(&self, query: &str) -> Classification {
        let classifier = Arc::clone(&self.classifier);
        let query = query.to_string();
        // LLM backends use blocking HTTP clients
        match tokio::task::spawn_blocking(move || classify_or_fail_closed(classifier.as_ref(), &query))
            .await
        {
            Ok(classification) => classification,
            Err(err) => {
                warn!(%err, "classifier task join error; failing closed");
                Classification::fail_closed()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilitySet, FixtureCapability};
    use crate::classifier::RuleClassifier;
    use crate::state::AnswerKind;
    use serde_json::json;

    fn pipeline() -> Pipeline {
        let catalog = FixtureCapability::new(vec![json!({
            "sku": "herb-001",
            "title": "Herbaceous",
            "price": 14.01,
            "category": "Board Games"
        })]);
        let web = FixtureCapability::new(vec![json!({
            "title": "Herbaceous Board Game",
            "price": "$14.01",
            "url": "https://www.amazon.com/Herbaceous-Board-Game/dp/B01N1L34R9"
        })]);
        let set = CapabilitySet::new()
            .with_catalog(Arc::new(catalog))
            .with_web(Arc::new(web));
        Pipeline::new(Arc::new(RuleClassifier), Arc::new(set))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn every_stage_writes_a_log_line() {
        let state = pipeline().run_state("current price of Herbaceous board game").await;
        for tag in ["[CLASSIFIER]", "[PLANNER]", "[EXECUTOR]", "[RECONCILER]"] {
            assert!(
                state.debug_log().iter().any(|line| line.starts_with(tag)),
                "missing {tag} in {:?}",
                state.debug_log()
            );
        }
        assert_eq!(state.final_answer().map(|a| a.kind), Some(AnswerKind::Answered));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn cancelled_token_discards_the_query() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(pipeline()
            .run_cancellable("current price of Herbaceous board game", &token)
            .await
            .is_none());
    }
}
