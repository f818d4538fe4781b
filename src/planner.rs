//! Deterministic intent → retrieval plan policy.
//!
//! The table in [`IntentFamily::plan_row`] is the only place retrieval
//! decisions are made. Unrecognized labels land on the no-retrieval row.

use serde_json::Value;

use crate::normalizer::coerce_price;
use crate::state::{Constraints, Filters, RetrievalPlan};

/// Planner-level grouping of free-form intent labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentFamily {
    /// Current price questions.
    PriceCheck,
    /// Stock status questions.
    AvailabilityCheck,
    /// Recommendations and general product search.
    Search,
    /// Explicit comparison between products or stores.
    Compare,
    /// Anything else, including flagged queries.
    Unknown,
}

impl IntentFamily {
    /// Maps a classifier label onto a family. Labels are trimmed, lowercased
    /// and have spaces/hyphens folded to underscores first.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "check_price" | "price_check" | "price" | "get_price" => IntentFamily::PriceCheck,
            "check_availability" | "availability_check" | "availability" | "in_stock"
            | "stock_check" => IntentFamily::AvailabilityCheck,
            "search" | "recommend" | "recommendation" | "product_search" | "find" => {
                IntentFamily::Search
            }
            "compare" | "comparison" | "compare_products" => IntentFamily::Compare,
            _ => IntentFamily::Unknown,
        }
    }

    /// `(use_catalog, use_web, compare_price, compare_availability)`.
    fn plan_row(self) -> (bool, bool, bool, bool) {
        match self {
            IntentFamily::PriceCheck => (true, true, true, true),
            IntentFamily::AvailabilityCheck => (true, true, false, true),
            IntentFamily::Search => (true, false, false, false),
            IntentFamily::Compare => (true, true, true, true),
            IntentFamily::Unknown => (false, false, false, false),
        }
    }
}

/// Builds the retrieval plan for one classified query.
pub fn plan(intent: &str, constraints: &Constraints, safety_flag: bool) -> RetrievalPlan {
    let family = if safety_flag {
        IntentFamily::Unknown
    } else {
        IntentFamily::from_label(intent)
    };
    let (use_catalog, use_web, compare_price, compare_availability) = family.plan_row();
    if !(use_catalog || use_web) {
        return RetrievalPlan::no_retrieval();
    }
    RetrievalPlan {
        use_catalog,
        use_web,
        compare_price,
        compare_availability,
        filters: derive_filters(constraints),
    }
}

/// Keeps the constraints that map onto filters; everything else is dropped.
pub fn derive_filters(constraints: &Constraints) -> Filters {
    let max_price = ["max_price", "budget"]
        .iter()
        .filter_map(|key| constraints.get(*key))
        .find_map(coerce_price);
    Filters {
        max_price,
        category: text_constraint(constraints, "category"),
        brand: text_constraint(constraints, "brand"),
    }
}

fn text_constraint(constraints: &Constraints, key: &str) -> Option<String> {
    match constraints.get(key) {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}
