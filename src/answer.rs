//! Final answer formatting: display text, spoken summary, store names.
//!
//! Formatting never changes `ranked_items`; it only reads them.

use std::fmt::Write as _;

use url::{Host, Url};

use crate::normalizer::site_free_title;
use crate::state::{AnswerKind, DiscrepancyField, FinalAnswer, ReconciledItem, Source};

const CATALOG_INTRO: &str = "Here are the top matches from our product catalog:";
const WEB_INTRO: &str = "Here are the most relevant live web results:";
const MIXED_INTRO: &str = "Here are the best matched products:";

const KNOWN_STORES: &[(&str, &str)] = &[
    ("amazon", "Amazon"),
    ("bestbuy", "Best Buy"),
    ("walmart", "Walmart"),
    ("target", "Target"),
    ("ebay", "eBay"),
    ("gamestop", "GameStop"),
    ("barnesandnoble", "Barnes & Noble"),
];

/// Builds the terminal payload from ranked items; empty input is "no results".
pub fn compose_answer(items: Vec<ReconciledItem>) -> FinalAnswer {
    let Some(top) = items.first() else {
        return FinalAnswer::no_results();
    };
    let speech_text = speech_summary(top, items.len());
    FinalAnswer {
        kind: AnswerKind::Answered,
        text: render_text(&items),
        speech_text,
        ranked_items: items,
    }
}

/// Markdown-ish list for display.
pub fn render_text(items: &[ReconciledItem]) -> String {
    let catalog_only = items.iter().all(|item| item.sources == [Source::Catalog]);
    let web_only = items.iter().all(|item| item.sources == [Source::Web]);
    let intro = if catalog_only {
        CATALOG_INTRO
    } else if web_only {
        WEB_INTRO
    } else {
        MIXED_INTRO
    };

    let mut text = String::from(intro);
    for item in items {
        text.push_str("\n- ");
        text.push_str(&render_line(item));
    }
    text
}

fn render_line(item: &ReconciledItem) -> String {
    let mut parts = vec![format!("**{}**", item.title)];
    if let Some(brand) = &item.brand {
        parts.push(format!("Brand: {brand}"));
    }
    if let Some(price) = item.price {
        parts.push(format!("Price: {}", format_price(price)));
    }
    if item.availability.is_known() {
        parts.push(format!("Availability: {}", item.availability.describe()));
    }
    if let Some(category) = &item.category {
        parts.push(format!("Category: {category}"));
    }
    if let Some(rating) = item.rating {
        parts.push(format!("Rating: {rating:.1}"));
    }
    let url = item.preferred_url();
    if let Some(store) = url.and_then(store_name) {
        parts.push(format!("Store: {store}"));
    }
    if let Some(url) = url {
        parts.push(format!("[Link]({url})"));
    }

    let mut line = parts.join(" | ");
    for discrepancy in &item.discrepancies {
        match discrepancy.field {
            DiscrepancyField::Price => {
                let _ = write!(
                    line,
                    " ⚠ price differs (catalog {}, web {})",
                    value_price(&discrepancy.catalog_value),
                    value_price(&discrepancy.web_value)
                );
            }
            DiscrepancyField::Availability => {
                let _ = write!(
                    line,
                    " ⚠ availability differs (catalog {}, web {})",
                    value_text(&discrepancy.catalog_value),
                    value_text(&discrepancy.web_value)
                );
            }
        }
    }
    line
}

/// One short spoken sentence about the top item. Never contains a URL.
pub fn speech_summary(top: &ReconciledItem, total: usize) -> String {
    let title = speakable_title(&top.title);
    let store = top
        .web_url
        .as_deref()
        .and_then(store_name)
        .or_else(|| top.catalog_url.as_deref().and_then(store_name));

    let mut sentence = match (top.price, &store) {
        (Some(price), Some(store)) => {
            format!("{title} is {} at {store}.", format_price(price))
        }
        (Some(price), None) => format!("{title} is {}.", format_price(price)),
        (None, Some(store)) => format!("I found {title} at {store}."),
        (None, None) => format!("I found {title}."),
    };
    if top.availability.is_known() {
        let _ = write!(sentence, " It's {}.", top.availability.describe());
    }
    match total {
        0 | 1 => {}
        2 => sentence.push_str(" I found 1 other option too."),
        n => {
            let _ = write!(sentence, " I found {} other options too.", n - 1);
        }
    }
    sentence
}

/// Shopper-facing store name derived from a URL's hostname only.
pub fn store_name(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url.trim()).ok()?;
    let host = match url.host()? {
        Host::Domain(domain) => domain.to_lowercase(),
        Host::Ipv4(_) | Host::Ipv6(_) => return None,
    };
    let labels: Vec<&str> = host
        .split('.')
        .filter(|label| !label.is_empty())
        .collect();
    let label = match labels.as_slice() {
        [] => return None,
        [only] => *only,
        [.., second_level, "co" | "com" | "org" | "net", _] => *second_level,
        [.., second_level, _tld] => *second_level,
    };
    if let Some((_, name)) = KNOWN_STORES.iter().find(|(key, _)| *key == label) {
        return Some((*name).to_string());
    }
    let mut chars = label.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

fn speakable_title(title: &str) -> String {
    let cleaned = site_free_title(title);
    if cleaned.is_empty() {
        "This product".to_string()
    } else {
        cleaned
    }
}

fn format_price(price: f64) -> String {
    format!("${price:.2}")
}

fn value_price(value: &serde_json::Value) -> String {
    value
        .as_f64()
        .map(format_price)
        .unwrap_or_else(|| "unknown".to_string())
}

fn value_text(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map(|text| text.replace('_', " "))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Availability, Discrepancy, MatchConfidence};
    use serde_json::json;

    fn item(title: &str, price: Option<f64>, url: Option<&str>) -> ReconciledItem {
        ReconciledItem {
            identity_key: None,
            title: title.into(),
            brand: None,
            category: None,
            price,
            rating: None,
            availability: Availability::Unknown,
            catalog_url: None,
            web_url: url.map(str::to_string),
            sources: vec![Source::Web],
            raw_score: None,
            discrepancies: Vec::new(),
            match_confidence: MatchConfidence::None,
        }
    }

    #[test]
    fn store_names_come_from_hostnames() {
        assert_eq!(store_name("https://www.amazon.com/dp/B01N1L34R9").as_deref(), Some("Amazon"));
        assert_eq!(store_name("https://smile.amazon.co.uk/x").as_deref(), Some("Amazon"));
        assert_eq!(store_name("https://shop.target.com/p/1").as_deref(), Some("Target"));
        assert_eq!(store_name("https://www.bestbuy.com/site/1").as_deref(), Some("Best Buy"));
        assert_eq!(store_name("https://boardgamebliss.com/x").as_deref(), Some("Boardgamebliss"));
        assert_eq!(store_name("http://127.0.0.1:8080/x"), None);
        assert_eq!(store_name("nope"), None);
    }

    #[test]
    fn speech_states_price_and_store() {
        let top = item(
            "Herbaceous",
            Some(14.01),
            Some("https://www.amazon.com/Herbaceous/dp/B01N1L34R9"),
        );
        assert_eq!(speech_summary(&top, 1), "Herbaceous is $14.01 at Amazon.");
    }

    #[test]
    fn speech_degrades_without_fields() {
        let mut top = item("Mystery Dice", None, None);
        assert_eq!(speech_summary(&top, 3), "I found Mystery Dice. I found 2 other options too.");
        top.availability = Availability::InStock;
        assert_eq!(speech_summary(&top, 1), "I found Mystery Dice. It's in stock.");
    }

    #[test]
    fn speech_never_reads_urls_from_titles() {
        let top = item(
            "Catan https://www.example.com/catan www.example.com",
            Some(44.0),
            Some("https://www.example.com/catan"),
        );
        let speech = speech_summary(&top, 1);
        assert!(!speech.contains("://"));
        assert!(!speech.contains("www."));
        assert_eq!(speech, "Catan is $44.00 at Example.");
    }

    #[test]
    fn speech_drops_store_decoration_from_web_titles() {
        let top = item(
            "Amazon.com: Herbaceous Board Game : Toys & Games",
            Some(14.01),
            Some("https://www.amazon.com/dp/B01N1L34R9"),
        );
        assert_eq!(
            speech_summary(&top, 1),
            "Herbaceous Board Game is $14.01 at Amazon."
        );
        let bare = item("Walmart.com", Some(9.0), None);
        assert_eq!(speech_summary(&bare, 1), "This product is $9.00.");
    }

    #[test]
    fn text_lists_items_with_discrepancy_note() {
        let mut top = item("Herbaceous", Some(13.0), Some("https://www.amazon.com/dp/B01N1L34R9"));
        top.sources = vec![Source::Catalog, Source::Web];
        top.brand = Some("Pencil First Games".into());
        top.discrepancies.push(Discrepancy {
            field: DiscrepancyField::Price,
            catalog_value: json!(10.0),
            web_value: json!(13.0),
        });
        let text = render_text(&[top]);
        assert!(text.starts_with(MIXED_INTRO));
        assert!(text.contains(
            "**Herbaceous** | Brand: Pencil First Games | Price: $13.00 | Store: Amazon | [Link](https://www.amazon.com/dp/B01N1L34R9)"
        ));
        assert!(text.contains("⚠ price differs (catalog $10.00, web $13.00)"));
    }

    #[test]
    fn empty_items_are_no_results() {
        assert_eq!(compose_answer(Vec::new()), FinalAnswer::no_results());
    }
}
