//! Reconciler: safety gate, cross-source matching, merge, discrepancy flags
//! and ranking.

use std::cmp::Ordering;

use serde_json::Value;

use crate::answer::compose_answer;
use crate::controls::PipelineControls;
use crate::state::{
    Availability, Discrepancy, DiscrepancyField, FinalAnswer, MatchConfidence, NormalizedRecord,
    PipelineState, ReconciledItem, RetrievalPlan, Source,
};

mod matching;

pub use matching::{match_records, product_id, title_similarity, MatchPair};

/// Produces the terminal answer for a state whose retrieval stage has run.
///
/// The safety flag is checked before anything else; a flagged state never
/// reaches matching or ranking.
pub fn reconcile(state: &mut PipelineState, controls: &PipelineControls) -> FinalAnswer {
    if state.safety_flag() {
        state.log("[RECONCILER] safety flag set; returning refusal");
        return FinalAnswer::refusal();
    }
    let items = reconcile_items(
        state.catalog_results(),
        state.web_results(),
        state.plan(),
        controls,
    );
    let matched = items.iter().filter(|item| item.match_confidence.is_matched()).count();
    let flagged = items.iter().filter(|item| !item.discrepancies.is_empty()).count();
    state.log(format!(
        "[RECONCILER] {} items ({} matched across sources, {} with discrepancies)",
        items.len(),
        matched,
        flagged
    ));
    compose_answer(items)
}

/// Matches, merges and ranks the two record lists. Pure and deterministic:
/// the same inputs always yield the same items in the same order.
pub fn reconcile_items(
    catalog: &[NormalizedRecord],
    web: &[NormalizedRecord],
    plan: &RetrievalPlan,
    controls: &PipelineControls,
) -> Vec<ReconciledItem> {
    let pairs = if !catalog.is_empty() && !web.is_empty() && plan.wants_comparison() {
        match_records(catalog, web, controls.match_threshold())
    } else {
        Vec::new()
    };

    let mut web_paired = vec![false; web.len()];
    let mut partner = vec![None; catalog.len()];
    for pair in &pairs {
        partner[pair.catalog] = Some((pair.web, pair.confidence));
        web_paired[pair.web] = true;
    }

    let mut items = Vec::with_capacity(catalog.len() + web.len());
    for (ci, record) in catalog.iter().enumerate() {
        let item = match partner[ci] {
            Some((wi, confidence)) => merge_pair(record, &web[wi], confidence, plan, controls),
            None => singleton(record),
        };
        items.push(item);
    }
    items.extend(
        web.iter()
            .zip(&web_paired)
            .filter(|(_, paired)| !**paired)
            .map(|(record, _)| singleton(record)),
    );

    // stable: equal keys keep catalog-then-web source order
    items.sort_by(rank_order);
    items
}

fn merge_pair(
    catalog: &NormalizedRecord,
    web: &NormalizedRecord,
    confidence: MatchConfidence,
    plan: &RetrievalPlan,
    controls: &PipelineControls,
) -> ReconciledItem {
    let (price, availability) = if plan.use_web {
        (
            web.price.or(catalog.price),
            if web.availability.is_known() {
                web.availability
            } else {
                catalog.availability
            },
        )
    } else {
        (catalog.price, catalog.availability)
    };

    let mut discrepancies = Vec::new();
    if let (Some(c), Some(w)) = (catalog.price, web.price) {
        if price_delta(c, w) > controls.discrepancy_threshold() {
            discrepancies.push(Discrepancy {
                field: DiscrepancyField::Price,
                catalog_value: Value::from(c),
                web_value: Value::from(w),
            });
        }
    }
    if plan.compare_availability
        && catalog.availability.is_known()
        && web.availability.is_known()
        && catalog.availability != web.availability
    {
        discrepancies.push(Discrepancy {
            field: DiscrepancyField::Availability,
            catalog_value: availability_value(catalog.availability),
            web_value: availability_value(web.availability),
        });
    }

    ReconciledItem {
        identity_key: catalog.identity_key.clone(),
        title: catalog.title.clone(),
        brand: catalog.brand.clone().or_else(|| web.brand.clone()),
        category: catalog.category.clone().or_else(|| web.category.clone()),
        price,
        rating: catalog.rating.or(web.rating),
        availability,
        catalog_url: catalog.source_url.clone(),
        web_url: web.source_url.clone(),
        sources: vec![Source::Catalog, Source::Web],
        raw_score: catalog.raw_score.or(web.raw_score),
        discrepancies,
        match_confidence: confidence,
    }
}

fn singleton(record: &NormalizedRecord) -> ReconciledItem {
    let (catalog_url, web_url) = match record.source {
        Source::Catalog => (record.source_url.clone(), None),
        Source::Web => (None, record.source_url.clone()),
    };
    ReconciledItem {
        identity_key: record.identity_key.clone(),
        title: record.title.clone(),
        brand: record.brand.clone(),
        category: record.category.clone(),
        price: record.price,
        rating: record.rating,
        availability: record.availability,
        catalog_url,
        web_url,
        sources: vec![record.source],
        raw_score: record.raw_score,
        discrepancies: Vec::new(),
        match_confidence: MatchConfidence::None,
    }
}

/// Relative price difference, `|c - w| / max(c, w)`.
pub fn price_delta(catalog_price: f64, web_price: f64) -> f64 {
    let ceiling = catalog_price.max(web_price);
    if ceiling <= 0.0 {
        return 0.0;
    }
    (catalog_price - web_price).abs() / ceiling
}

fn availability_value(availability: Availability) -> Value {
    serde_json::to_value(availability).unwrap_or(Value::Null)
}

/// Matched first, then score descending (scored before unscored), then
/// lower price (priced before unpriced).
fn rank_order(a: &ReconciledItem, b: &ReconciledItem) -> Ordering {
    b.match_confidence
        .is_matched()
        .cmp(&a.match_confidence.is_matched())
        .then_with(|| match (a.raw_score, b.raw_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| match (a.price, b.price) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}
