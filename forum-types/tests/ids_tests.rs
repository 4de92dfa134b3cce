use forum_types::{format_timestamp, parse_timestamp, Error, RecordId, RequestId};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

// ── RecordId ──────────────────────────────────────────────────────

#[test]
fn record_id_display_and_parse() {
    let id = RecordId::new(42);
    assert_eq!(id.to_string(), "42");
    assert_eq!(RecordId::parse("42").unwrap(), id);
}

#[test]
fn record_id_from_str() {
    let parsed: RecordId = RecordId::from_str("7").unwrap();
    assert_eq!(parsed.get(), 7);
}

#[test]
fn record_id_rejects_non_canonical_forms() {
    for bad in ["", "0", "01", "-3", "1e3", " 1", "abc", "9999999999999999999"] {
        assert!(RecordId::parse(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn parse_errors_name_the_rejected_input() {
    let err = RecordId::parse("abc").unwrap_err();
    assert!(matches!(err, Error::InvalidRecordId(ref s) if s == "abc"));
    assert_eq!(err.to_string(), "invalid record id: abc");

    let err = parse_timestamp("yesterday").unwrap_err();
    assert!(matches!(err, Error::InvalidTimestamp(_)));
    assert!(err.to_string().starts_with("invalid timestamp: yesterday"));
}

#[test]
fn record_id_orders_numerically() {
    assert!(RecordId::new(2) < RecordId::new(10));
}

#[test]
fn record_id_serializes_transparently() {
    let json = serde_json::to_string(&RecordId::new(5)).unwrap();
    assert_eq!(json, "5");
}

// ── RequestId ─────────────────────────────────────────────────────

#[test]
fn request_ids_are_unique() {
    let ids: HashSet<RequestId> = (0..64).map(|_| RequestId::new()).collect();
    assert_eq!(ids.len(), 64);
}

// ── Timestamps ────────────────────────────────────────────────────

#[test]
fn timestamp_roundtrip_is_stable() {
    let ts = parse_timestamp("2024-01-02T03:04:05Z").unwrap();
    assert_eq!(format_timestamp(&ts), "2024-01-02T03:04:05Z");
}

proptest! {
    #[test]
    fn record_id_wire_form_roundtrips(raw in 1i64..=999_999_999_999_999_999) {
        let id = RecordId::new(raw);
        prop_assert_eq!(RecordId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn canonical_timestamps_sort_chronologically(a in 0i64..4_000_000_000, b in 0i64..4_000_000_000) {
        let ta = chrono::DateTime::from_timestamp(a, 0).unwrap();
        let tb = chrono::DateTime::from_timestamp(b, 0).unwrap();
        prop_assert_eq!(format_timestamp(&ta).cmp(&format_timestamp(&tb)), ta.cmp(&tb));
    }
}
