mod common;

use pretty_assertions::assert_eq;
use shopcrawl::{AnswerKind, MatchConfidence, Source};

use common::fixture_pipeline;

#[tokio::test(flavor = "current_thread")]
async fn herbaceous_price_check_end_to_end() {
    let state = fixture_pipeline()
        .run_state("current price of Herbaceous board game")
        .await;

    assert_eq!(state.intent(), "check_price");
    assert!(!state.safety_flag());
    let plan = state.plan();
    assert!(plan.use_catalog && plan.use_web && plan.compare_price);
    assert!(state.failed_capabilities().is_empty());
    assert!(state
        .catalog_results()
        .iter()
        .all(|record| record.source == Source::Catalog && record.identity_key.is_some()));
    assert!(state
        .web_results()
        .iter()
        .all(|record| record.source == Source::Web && record.identity_key.is_none()));

    let answer = state.final_answer().expect("answer recorded");
    assert_eq!(answer.kind, AnswerKind::Answered);
    let top = &answer.ranked_items[0];
    assert_eq!(top.title, "Herbaceous");
    assert_eq!(top.match_confidence, MatchConfidence::Fuzzy);
    assert_eq!(top.price, Some(14.01));
    assert!(top.discrepancies.is_empty());
    assert_eq!(top.identity_key.as_deref(), Some("herb-001"));
    assert_eq!(
        top.catalog_url.as_deref(),
        Some("https://catalog.example.com/items/herb-001")
    );
    assert_eq!(
        top.web_url.as_deref(),
        Some("https://www.amazon.com/Herbaceous-Board-Game/dp/B01N1L34R9")
    );
    assert!(answer.speech_text.starts_with("Herbaceous is $14.01 at Amazon."));
    assert!(answer.text.contains("**Herbaceous**"));
}

#[tokio::test(flavor = "current_thread")]
async fn web_price_is_extracted_from_snippet() {
    let state = fixture_pipeline()
        .run_state("what does Catan cost, compare stores")
        .await;
    let catan = state
        .web_results()
        .iter()
        .find(|record| record.title.starts_with("Catan"))
        .expect("catan web record");
    assert_eq!(catan.price, Some(59.99));
}

#[tokio::test(flavor = "current_thread")]
async fn recommendations_stay_in_the_catalog() {
    let state = fixture_pipeline().run_state("recommend a board game").await;
    assert_eq!(state.intent(), "search");
    assert!(!state.plan().use_web);
    assert!(state.web_results().is_empty());

    let answer = state.final_answer().expect("answer recorded");
    assert_eq!(answer.kind, AnswerKind::Answered);
    assert!(answer
        .ranked_items
        .iter()
        .all(|item| item.sources == vec![Source::Catalog]));
    assert!(answer
        .text
        .starts_with("Here are the top matches from our product catalog:"));
}

#[tokio::test(flavor = "current_thread")]
async fn state_serializes_with_classifier_fields_inline() {
    let state = fixture_pipeline()
        .run_state("is Herbaceous in stock")
        .await;
    let json = serde_json::to_value(&state).unwrap();
    assert_eq!(json["intent"], "check_availability");
    assert_eq!(json["safety_flag"], false);
    assert!(json["debug_log"].as_array().is_some_and(|lines| lines.len() >= 4));
    assert_eq!(json["final_answer"]["kind"], "answered");
}
