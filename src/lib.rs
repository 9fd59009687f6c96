//! Penshort - developer-oriented URL shortening service
//!
//! The redirect plane resolves short codes cache-first with negative
//! caching; clicks flow through a Redis-stream analytics pipeline with
//! at-least-once persistence and daily pre-aggregation; webhook
//! notifications go through a signed, retried delivery outbox.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod domain;
pub mod links;
pub mod observability;
pub mod ratelimit;
pub mod server;
pub mod storage;
pub mod webhooks;

// Re-export commonly used types
pub use config::Config;
pub use domain::{PenshortError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
