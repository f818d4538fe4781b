//! Retrieval executor: runs the planned capability calls and normalizes output.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::{Capability, ToolArgs, ToolName};
use crate::controls::PipelineControls;
use crate::error::CapabilityError;
use crate::normalizer::{normalize_results, CatalogAdapter, WebAdapter};
use crate::state::{NormalizedRecord, RetrievalPlan};

/// What the executor hands back to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    /// Normalized catalog records, source order.
    pub catalog_results: Vec<NormalizedRecord>,
    /// Normalized web records, source order.
    pub web_results: Vec<NormalizedRecord>,
    /// Requested capabilities that failed after the retry budget.
    pub failed: Vec<ToolName>,
    /// `[EXECUTOR]` trace lines.
    pub log: Vec<String>,
}

impl RetrievalOutcome {
    /// True when no usable record came back from any source.
    pub fn is_empty(&self) -> bool {
        self.catalog_results.is_empty() && self.web_results.is_empty()
    }
}

/// Runs the capabilities the plan asks for.
///
/// Catalog and web calls run concurrently, each under its own timeout, so a
/// slow source never delays the other past that bound. A failing source is
/// logged and contributes no records; nothing here returns an error.
pub async fn execute(
    capability: &dyn Capability,
    plan: &RetrievalPlan,
    query: &str,
    controls: &PipelineControls,
) -> RetrievalOutcome {
    let mut outcome = RetrievalOutcome::default();
    if !plan.requests_retrieval() {
        outcome
            .log
            .push("[EXECUTOR] plan requests no retrieval; skipping capabilities".to_string());
        return outcome;
    }

    let catalog_args = ToolArgs {
        query: query.to_string(),
        filters: plan.filters.clone(),
        num_results: Some(controls.catalog_results()),
    };
    let web_args = ToolArgs {
        query: query.to_string(),
        filters: plan.filters.clone(),
        num_results: Some(controls.web_results()),
    };

    let catalog_call = async {
        if plan.use_catalog {
            Some(invoke_bounded(capability, ToolName::CatalogSearch, &catalog_args, controls).await)
        } else {
            None
        }
    };
    let web_call = async {
        if plan.use_web {
            Some(invoke_bounded(capability, ToolName::WebSearch, &web_args, controls).await)
        } else {
            None
        }
    };
    let (catalog_raw, web_raw) = tokio::join!(catalog_call, web_call);

    if let Some(result) = catalog_raw {
        if let Some(raw) = absorb(ToolName::CatalogSearch, result, &mut outcome) {
            let records = normalize_results(&CatalogAdapter, &raw);
            outcome.log.push(format!(
                "[EXECUTOR] catalog_search: {} raw -> {} records",
                raw.len(),
                records.len()
            ));
            outcome.catalog_results = records;
        }
    }

    if let Some(result) = web_raw {
        if let Some(raw) = absorb(ToolName::WebSearch, result, &mut outcome) {
            let mut records = normalize_results(&WebAdapter, &raw);
            let before = records.len();
            if let Some(limit) = plan.filters.max_price {
                records.retain(|record| record.price.map_or(true, |price| price <= limit));
            }
            outcome.log.push(format!(
                "[EXECUTOR] web_search: {} raw -> {} records ({} over budget)",
                raw.len(),
                records.len(),
                before - records.len()
            ));
            outcome.web_results = records;
        }
    }

    if outcome.is_empty() {
        outcome
            .log
            .push("[EXECUTOR] no usable records from any capability".to_string());
    }
    outcome
}

fn absorb(
    tool: ToolName,
    result: Result<Vec<Value>, CapabilityError>,
    outcome: &mut RetrievalOutcome,
) -> Option<Vec<Value>> {
    match result {
        Ok(raw) => Some(raw),
        Err(err) => {
            warn!(%tool, %err, "capability failed; continuing without it");
            outcome.log.push(format!("[EXECUTOR] {tool} failed: {err}"));
            outcome.failed.push(tool);
            None
        }
    }
}

/// One capability call under the configured timeout, retried at most once on
/// a transient failure.
async fn invoke_bounded(
    capability: &dyn Capability,
    tool: ToolName,
    args: &ToolArgs,
    controls: &PipelineControls,
) -> Result<Vec<Value>, CapabilityError> {
    let mut attempt: u8 = 0;
    loop {
        let started = Instant::now();
        let result = match tokio::time::timeout(
            controls.capability_timeout(),
            capability.invoke(tool, args),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CapabilityError::Timeout {
                tool,
                elapsed: started.elapsed(),
            }),
        };
        match result {
            Err(err) if err.is_transient() && attempt < controls.capability_retries() => {
                attempt += 1;
                debug!(%tool, %err, attempt, "retrying capability");
            }
            other => return other,
        }
    }
}
