//! API-key authentication: credential material and the bearer pipeline

pub mod credentials;
pub mod service;

pub use credentials::{
    generate_key, hash_key, parse_key, quick_digest, verify_key, GeneratedKey, KeyEnv, ParsedKey,
};
pub use service::AuthService;
