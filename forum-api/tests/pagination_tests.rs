mod common;

use common::*;
use forum_api::JsonApi;
use forum_model::Model;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeSet;

const TIED: &str = "2024-01-01T00:00:00Z";

/// `n` visible discussions that all share one `lastPostedAt`.
fn tied_forum(n: usize) -> JsonApi {
    let api = forum_api();
    for i in 0..n {
        insert(
            &api,
            Model::new("discussions")
                .with("title", format!("Tied {i}"))
                .with("lastPostedAt", TIED)
                .with("createdAt", TIED)
                .with("isHidden", false),
        );
    }
    api
}

fn page(api: &JsonApi, offset: usize, limit: usize) -> Value {
    let response = send_with(
        api,
        guest(),
        "GET",
        "/api/discussions",
        &format!("page[offset]={offset}&page[limit]={limit}"),
        Value::Null,
    );
    assert_eq!(response.status, 200);
    document(&response).clone()
}

fn ids(doc: &Value) -> Vec<String> {
    doc["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn ties_are_broken_by_id() {
    let api = tied_forum(6);

    let mut seen = Vec::new();
    for offset in [0, 2, 4] {
        let doc = page(&api, offset, 2);
        assert_eq!(doc["meta"]["total"], 6);
        seen.extend(ids(&doc));
    }
    assert_eq!(seen, vec!["1", "2", "3", "4", "5", "6"]);
}

#[test]
fn links_follow_the_window() {
    let api = tied_forum(6);
    let base = "http://localhost:8080/api/discussions";

    let first = page(&api, 0, 2);
    assert_eq!(first["links"]["first"], format!("{base}?page[offset]=0&page[limit]=2"));
    assert_eq!(first["links"]["next"], format!("{base}?page[offset]=2&page[limit]=2"));
    assert!(first["links"].get("prev").is_none());

    let middle = page(&api, 2, 2);
    assert_eq!(middle["links"]["prev"], format!("{base}?page[offset]=0&page[limit]=2"));
    assert_eq!(middle["links"]["next"], format!("{base}?page[offset]=4&page[limit]=2"));

    let last = page(&api, 4, 2);
    assert!(last["links"].get("next").is_none());
    assert_eq!(last["links"]["prev"], format!("{base}?page[offset]=2&page[limit]=2"));
}

#[test]
fn links_keep_other_parameters() {
    let api = tied_forum(3);
    let response = send_with(
        &api,
        guest(),
        "GET",
        "/api/discussions",
        "sort=oldest&page[limit]=1",
        Value::Null,
    );
    let links = &document(&response)["links"];
    assert_eq!(
        links["next"],
        "http://localhost:8080/api/discussions?sort=oldest&page[offset]=1&page[limit]=1"
    );
}

#[test]
fn offset_past_the_end_is_empty() {
    let api = tied_forum(2);
    let doc = page(&api, 10, 2);
    assert!(ids(&doc).is_empty());
    assert_eq!(doc["meta"]["total"], 2);
    assert!(doc["links"].get("next").is_none());
}

#[test]
fn malformed_offset_is_rejected() {
    let api = tied_forum(1);
    let response = send_with(&api, guest(), "GET", "/api/discussions", "page[offset]=-1", Value::Null);
    assert_eq!(response.status, 400);
    assert_eq!(error_parameter(&response).as_deref(), Some("page[offset]"));
}

#[test]
fn unaddressable_offset_is_rejected_and_the_store_stays_usable() {
    let api = tied_forum(2);
    for offset in [u64::MAX.to_string(), (i64::MAX as u64 + 1).to_string()] {
        let response = send_with(
            &api,
            guest(),
            "GET",
            "/api/discussions",
            &format!("page[offset]={offset}"),
            Value::Null,
        );
        assert_eq!(response.status, 400, "{offset}");
        assert_eq!(error_parameter(&response).as_deref(), Some("page[offset]"));
    }

    // The largest accepted offset is simply past the end.
    let doc = page(&api, i64::MAX as usize, 2);
    assert!(ids(&doc).is_empty());
    assert!(doc["links"].get("next").is_none());

    let after = send(&api, guest(), "GET", "/api/discussions");
    assert_eq!(after.status, 200);
    assert_eq!(document(&after)["meta"]["total"], 2);
}

#[test]
fn hidden_records_are_not_counted() {
    let api = tied_forum(3);
    insert(
        &api,
        Model::new("discussions")
            .with("title", "Hidden")
            .with("lastPostedAt", TIED)
            .with("userId", 42)
            .with("isHidden", true),
    );

    assert_eq!(page(&api, 0, 10)["meta"]["total"], 3);
    let own = send_with(&api, member(42, &[]), "GET", "/api/discussions", "", Value::Null);
    assert_eq!(document(&own)["meta"]["total"], 4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn walking_pages_visits_every_record_once(records in 1usize..9, limit in 1usize..5) {
        let api = tied_forum(records);
        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let doc = page(&api, offset, limit);
            seen.extend(ids(&doc));
            if doc["links"].get("next").is_none() {
                break;
            }
            offset += limit;
        }
        let unique: BTreeSet<&String> = seen.iter().collect();
        prop_assert_eq!(seen.len(), records);
        prop_assert_eq!(unique.len(), records);
    }
}
