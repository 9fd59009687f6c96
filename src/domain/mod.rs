//! Domain types: entities, validation, and the error taxonomy

pub mod api_key;
pub mod click;
pub mod error;
pub mod link;
pub mod stats;
pub mod webhook;

pub use api_key::{ApiKey, AuthContext, Scope, Tier, User};
pub use click::{
    sanitize_referrer, truncate_field, visitor_hash, ClickEvent, ClickEventPayload, MAX_FIELD_LEN,
};
pub use error::{PenshortError, Result};
pub use link::{
    validate_alias, validate_destination, validate_expiration, CachedLink, Link, LinkStatus,
    RedirectType, MAX_DESTINATION_LEN,
};
pub use stats::{referrer_domain, user_agent_family, DailyLinkStats, StatsDelta};
pub use webhook::{
    retry_backoff, DeliveryStatus, WebhookDelivery, WebhookEndpoint, WebhookEventType,
    DEFAULT_MAX_ATTEMPTS,
};
