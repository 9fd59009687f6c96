// Webhook delivery end to end against a recording receiver, plus the
// signing and target-policy contracts

mod helpers;

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{test_endpoint, InMemoryWebhooks};
use penshort::config::WebhookConfig;
use penshort::domain::{DeliveryStatus, WebhookDelivery, WebhookEventType};
use penshort::storage::WebhookRepository;
use penshort::webhooks::{
    sign, validate_target_url, verify, WebhookOutbox, WebhookWorker, DELIVERY_ID_HEADER,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};

fn header_value(request: &wiremock::Request, name: &str) -> String {
    request
        .headers
        .iter()
        .find(|(k, _)| k.as_str().eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.iter().next())
        .map(|v| v.as_str().to_string())
        .unwrap_or_else(|| panic!("missing header {}", name))
}

fn worker_config() -> WebhookConfig {
    WebhookConfig {
        allow_insecure: true, // local receiver
        poll_interval: Duration::from_secs(5),
        batch_size: 50,
        request_timeout: Duration::from_secs(5),
    }
}

fn click_delivery(endpoint_id: Uuid, event_id: &str) -> WebhookDelivery {
    WebhookDelivery::new(
        endpoint_id,
        event_id.to_string(),
        WebhookEventType::Click,
        serde_json::json!({
            "event_type": "click",
            "event_id": event_id,
            "timestamp": "2025-03-01T10:00:00Z",
            "data": { "short_code": "hello", "referrer": "", "country_code": null }
        }),
    )
}

#[tokio::test]
async fn delivery_reaches_receiver_with_valid_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let secret = "whsec_test_secret";
    let repo = Arc::new(InMemoryWebhooks::default());
    let endpoint = test_endpoint(Uuid::now_v7(), &format!("{}/hook", server.uri()), secret);
    repo.create_endpoint(&endpoint).await.unwrap();
    repo.create_deliveries(&[click_delivery(endpoint.id, "1700000000000-0")])
        .await
        .unwrap();

    let worker = WebhookWorker::new(repo.clone(), worker_config()).unwrap();
    worker.tick().await;

    // Delivery advanced to success with the HTTP status recorded
    let stored = repo.deliveries.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, DeliveryStatus::Success);
    assert_eq!(stored[0].attempt_count, 1);
    assert_eq!(stored[0].last_status_code, Some(200));

    // Receiver saw the signed request
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];

    let signature = header_value(request, SIGNATURE_HEADER);
    let timestamp: i64 = header_value(request, TIMESTAMP_HEADER).parse().unwrap();
    assert!(!header_value(request, DELIVERY_ID_HEADER).is_empty());

    let body = String::from_utf8(request.body.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["event_type"], "click");
    assert_eq!(parsed["data"]["short_code"], "hello");

    // HMAC over "<ts>.<body>" with key SHA-256(secret) matches the header
    assert_eq!(signature, sign(secret, timestamp, &body));
    assert!(verify(secret, timestamp, &body, &signature, timestamp + 1));
}

#[tokio::test]
async fn failed_delivery_schedules_retry_then_exhausts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhooks::default());
    let endpoint = test_endpoint(Uuid::now_v7(), &format!("{}/hook", server.uri()), "whsec_x");
    repo.create_endpoint(&endpoint).await.unwrap();

    let mut delivery = click_delivery(endpoint.id, "1700000000000-1");
    delivery.max_attempts = 2;
    repo.create_deliveries(&[delivery]).await.unwrap();

    let worker = WebhookWorker::new(repo.clone(), worker_config()).unwrap();

    worker.tick().await;
    {
        let stored = repo.deliveries.lock().unwrap();
        assert_eq!(stored[0].status, DeliveryStatus::Failed);
        assert_eq!(stored[0].attempt_count, 1);
        assert_eq!(stored[0].last_status_code, Some(500));
        // Scheduled in the future per the backoff table
        assert!(stored[0].next_retry_at > chrono::Utc::now());
    }

    // Pull the retry forward and let it exhaust
    {
        let mut stored = repo.deliveries.lock().unwrap();
        stored[0].next_retry_at = chrono::Utc::now();
    }
    worker.tick().await;
    {
        let stored = repo.deliveries.lock().unwrap();
        assert_eq!(stored[0].status, DeliveryStatus::Exhausted);
        assert_eq!(stored[0].attempt_count, 2);
    }

    // Terminal rows are never polled again
    worker.tick().await;
    assert_eq!(repo.deliveries.lock().unwrap()[0].attempt_count, 2);
}

#[tokio::test]
async fn disabled_endpoint_exhausts_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let repo = Arc::new(InMemoryWebhooks::default());
    let mut endpoint = test_endpoint(Uuid::now_v7(), &format!("{}/hook", server.uri()), "whsec_x");
    endpoint.enabled = false;
    repo.create_endpoint(&endpoint).await.unwrap();
    repo.create_deliveries(&[click_delivery(endpoint.id, "1700000000000-2")])
        .await
        .unwrap();

    let worker = WebhookWorker::new(repo.clone(), worker_config()).unwrap();
    worker.tick().await;

    let stored = repo.deliveries.lock().unwrap();
    assert_eq!(stored[0].status, DeliveryStatus::Exhausted);
    assert!(stored[0].last_error.as_deref().unwrap().contains("disabled"));
}

#[tokio::test]
async fn outbox_is_idempotent_per_event_and_endpoint() {
    let repo = Arc::new(InMemoryWebhooks::default());
    let owner = Uuid::now_v7();
    let endpoint = test_endpoint(owner, "https://hooks.example.com/x", "whsec_x");
    repo.create_endpoint(&endpoint).await.unwrap();

    let outbox = WebhookOutbox::new(repo.clone());
    let body = penshort::webhooks::ClickEventBody {
        short_code: "hello".into(),
        link_id: Uuid::now_v7(),
        referrer: String::new(),
        country_code: None,
        clicked_at: chrono::Utc::now(),
    };

    // Replayed enqueue of the same event creates at most one row
    assert_eq!(outbox.enqueue_click(owner, "1-0", &body).await.unwrap(), 1);
    assert_eq!(outbox.enqueue_click(owner, "1-0", &body).await.unwrap(), 0);
    assert_eq!(repo.deliveries.lock().unwrap().len(), 1);

    // A different event fans out independently
    assert_eq!(outbox.enqueue_click(owner, "1-1", &body).await.unwrap(), 1);
}

#[test]
fn target_policy_table() {
    // Production posture
    assert!(validate_target_url("https://hooks.example.com/penshort", false).is_ok());
    for blocked in [
        "http://hooks.example.com/x",
        "https://hooks.example.com:8080/x",
        "https://localhost/x",
        "https://svc.local/x",
        "https://127.0.0.1/x",
        "https://10.0.0.1/x",
        "https://172.16.0.1/x",
        "https://192.168.0.1/x",
        "https://169.254.0.1/x",
    ] {
        assert!(validate_target_url(blocked, false).is_err(), "accepted {}", blocked);
    }

    // Development bypass admits local receivers only because the operator
    // asked for it
    assert!(validate_target_url("http://127.0.0.1:9999/hook", true).is_ok());
}

#[test]
fn signature_rejects_replay_outside_window() {
    let ts = 1_700_000_000;
    let sig = sign("whsec_x", ts, "{}");
    assert!(verify("whsec_x", ts, "{}", &sig, ts + 299));
    assert!(!verify("whsec_x", ts, "{}", &sig, ts + 301));
    assert!(!verify("whsec_x", ts, "{}", &sig, ts - 301));
}
