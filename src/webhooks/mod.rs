//! Webhook delivery: signed payloads, target policy, outbox, worker

pub mod outbox;
pub mod policy;
pub mod signature;
pub mod worker;

pub use outbox::{enqueue_click_best_effort, ClickEventBody, WebhookOutbox};
pub use policy::validate_target_url;
pub use signature::{
    secret_digest, sign, sign_with_digest, verify, DELIVERY_ID_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER, TIMESTAMP_TOLERANCE_SECS,
};
pub use worker::WebhookWorker;
