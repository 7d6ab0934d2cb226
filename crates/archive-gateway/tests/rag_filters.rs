//! `/rag/query` and `/rag/search` share one request-shaping path (spec §6
//! `filters: {chat_name?, sender?, filter_days?}`); these tests pin down
//! how that shape folds into `archive_retrieval::engine::QueryFilters`.

use archive_gateway::http::rag::{build_filters, into_query_request, QueryFiltersBody, RagRequestBody};

#[test]
fn no_filters_means_unfiltered_query() {
    let filters = build_filters(None);
    assert!(filters.source.is_none());
    assert!(filters.sender.is_none());
    assert!(filters.timestamp_gte.is_none());
    assert!(filters.timestamp_lte.is_none());
}

#[test]
fn filter_days_becomes_a_timestamp_cutoff() {
    let before = chrono::Utc::now().timestamp() - 7 * 86_400;
    let filters = build_filters(Some(QueryFiltersBody {
        chat_name: None,
        sender: None,
        source: None,
        filter_days: Some(7),
    }));
    let cutoff = filters.timestamp_gte.expect("filter_days must set timestamp_gte");
    // allow a little slack for wall-clock drift between the two `now()` calls
    assert!((cutoff - before).abs() < 5);
}

#[test]
fn sender_takes_priority_over_chat_name_alias() {
    let filters = build_filters(Some(QueryFiltersBody {
        chat_name: Some("family".to_string()),
        sender: Some("alice".to_string()),
        source: None,
        filter_days: None,
    }));
    assert_eq!(filters.sender.as_deref(), Some("alice"));
}

#[test]
fn chat_name_falls_back_when_sender_absent() {
    let filters = build_filters(Some(QueryFiltersBody {
        chat_name: Some("family".to_string()),
        sender: None,
        source: None,
        filter_days: None,
    }));
    assert_eq!(filters.sender.as_deref(), Some("family"));
}

#[test]
fn into_query_request_preserves_question_and_history() {
    let body = RagRequestBody {
        question: "who booked the flight?".to_string(),
        conversation_id: Some("c1".to_string()),
        history: vec![("user".to_string(), "hi".to_string())],
        filters: None,
        k: Some(5),
    };
    let req = into_query_request(body);
    assert_eq!(req.question, "who booked the flight?");
    assert_eq!(req.conversation_id.as_deref(), Some("c1"));
    assert_eq!(req.history.len(), 1);
}
