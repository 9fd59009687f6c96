// Analytics pipeline: payload validation, visitor digests, batch
// aggregation, and idempotent persistence semantics

mod helpers;

use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use helpers::InMemoryClickEvents;
use penshort::analytics::aggregate::{build_deltas, build_events, ValidMessage};
use penshort::domain::{visitor_hash, ClickEventPayload, MAX_FIELD_LEN};
use penshort::storage::ClickEventRepository;

fn payload(link_id: Uuid, visitor: &str) -> ClickEventPayload {
    ClickEventPayload {
        short_code: "hello".into(),
        link_id,
        referrer: "https://www.example.com/post?utm=x".into(),
        user_agent: "Mozilla/5.0 Chrome/120.0".into(),
        visitor_hash: visitor.into(),
        country_code: Some("de".into()),
        clicked_at_ms: Utc::now().timestamp_millis(),
    }
}

#[test]
fn payload_validation_table() {
    let link = Uuid::now_v7();
    assert!(payload(link, "0123456789abcdef").validate().is_ok());

    let mut p = payload(link, "0123456789abcdef");
    p.short_code = String::new();
    assert!(p.validate().is_err(), "empty short code");

    let mut p = payload(link, "0123456789abcdef");
    p.short_code = "ab".into();
    assert!(p.validate().is_err(), "short code under 3");

    let mut p = payload(link, "0123456789abcdef");
    p.short_code = "x".repeat(51);
    assert!(p.validate().is_err(), "short code over 50");

    let mut p = payload(link, "0123456789abcdef");
    p.link_id = Uuid::nil();
    assert!(p.validate().is_err(), "nil link id");

    assert!(payload(link, "0123456789abcde").validate().is_err(), "15 hex chars");
    assert!(payload(link, "0123456789abcdeg").validate().is_err(), "non-hex char");

    let mut p = payload(link, "0123456789abcdef");
    p.clicked_at_ms = 0;
    assert!(p.validate().is_err(), "missing instant");

    let mut p = payload(link, "0123456789abcdef");
    p.user_agent = "u".repeat(MAX_FIELD_LEN + 1);
    assert!(p.validate().is_err(), "oversized user agent");

    let mut p = payload(link, "0123456789abcdef");
    p.country_code = Some("DEU".into());
    assert!(p.validate().is_err(), "3-letter country");
}

#[test]
fn visitor_digest_rotates_at_utc_midnight() {
    let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    let next_day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

    // Same (address, UA) on the same UTC date: identical, any hour
    let morning = visitor_hash("198.51.100.7", "curl/8.4.0", day);
    let evening = visitor_hash("198.51.100.7", "curl/8.4.0", day);
    assert_eq!(morning, evening);

    // Different UTC dates: different digests
    assert_ne!(morning, visitor_hash("198.51.100.7", "curl/8.4.0", next_day));
}

#[tokio::test]
async fn replayed_batches_persist_exactly_once() {
    let link = Uuid::now_v7();
    let repo = InMemoryClickEvents::default();

    let batch = vec![
        ValidMessage {
            event_id: "1700000000000-0".into(),
            payload: payload(link, "aaaaaaaaaaaaaaaa"),
        },
        ValidMessage {
            event_id: "1700000000000-1".into(),
            payload: payload(link, "bbbbbbbbbbbbbbbb"),
        },
    ];

    let events = build_events(&batch);
    assert_eq!(repo.bulk_insert(&events).await.unwrap(), 2);

    // The same stream entries delivered again (re-read or auto-claimed)
    // must not create new rows, regardless of fresh row ids
    let replayed = build_events(&batch);
    assert_eq!(repo.bulk_insert(&replayed).await.unwrap(), 0);

    let stored = repo.list_recent(link, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[test]
fn deltas_fold_referrers_countries_and_agents() {
    let link = Uuid::now_v7();
    let mut batch = vec![
        ValidMessage {
            event_id: "1-0".into(),
            payload: payload(link, "aaaaaaaaaaaaaaaa"),
        },
        ValidMessage {
            event_id: "1-1".into(),
            payload: payload(link, "aaaaaaaaaaaaaaaa"),
        },
        ValidMessage {
            event_id: "1-2".into(),
            payload: payload(link, "cccccccccccccccc"),
        },
    ];
    batch[2].payload.referrer = String::new();
    batch[2].payload.country_code = None;
    batch[2].payload.user_agent = "curl/8.4.0".into();

    let deltas = build_deltas(&batch);
    let delta = &deltas[&(link, batch[0].payload.clicked_date())];

    assert_eq!(delta.total_clicks, 3);
    assert_eq!(delta.unique_visitors, 2);
    assert_eq!(delta.referrers["example.com"], 2);
    assert_eq!(delta.referrers["direct"], 1);
    assert_eq!(delta.countries["DE"], 2);
    assert_eq!(delta.countries.get("direct"), None);
    assert_eq!(delta.user_agents["chrome"], 2);
    assert_eq!(delta.user_agents["curl"], 1);
}

#[test]
fn truncation_and_referrer_sanitizing() {
    use penshort::domain::{sanitize_referrer, truncate_field};

    assert_eq!(
        sanitize_referrer("https://example.com/page?utm_source=news#top"),
        "https://example.com/page"
    );

    let long = "x".repeat(MAX_FIELD_LEN + 100);
    assert_eq!(truncate_field(&long).len(), MAX_FIELD_LEN);
}
