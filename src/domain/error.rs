// Service-wide error taxonomy and wire codes

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, PenshortError>;

/// Error taxonomy for the service
///
/// Each variant maps to one HTTP status and one entry in the closed wire
/// `code` vocabulary. Construction helpers keep call sites terse.
#[derive(Error, Debug)]
pub enum PenshortError {
    /// Caller-facing validation failure (400)
    #[error("validation error: {0}")]
    Validation(String),

    /// Missing or unverifiable credentials (401)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but lacking the required scope (403)
    #[error("forbidden: missing scope '{0}'")]
    Forbidden(String),

    /// Entity does not exist or is soft-deleted (404)
    #[error("{0} not found")]
    NotFound(String),

    /// Uniqueness conflict, e.g. alias already taken (409)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Link expired (410)
    #[error("link expired: {0}")]
    Expired(String),

    /// Link disabled by its owner (410)
    #[error("link disabled: {0}")]
    Disabled(String),

    /// Token bucket denied the request (429)
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until a token becomes available
        retry_after: u64,
    },

    /// A required dependency is unhealthy (503)
    #[error("dependency unavailable: {0}")]
    Dependency(String),

    /// Stored credential verifier uses an unsupported hash version
    #[error("unsupported credential hash version")]
    IncompatibleHashVersion,

    /// Configuration error, fatal at startup
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PenshortError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wire code for the JSON error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(msg) if msg.contains("expiration") => "EXPIRES_IN_PAST",
            Self::Validation(_) => "INVALID_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(entity) if entity.starts_with("link") => "LINK_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "ALIAS_TAKEN",
            Self::Expired(_) => "LINK_EXPIRED",
            Self::Disabled(_) => "LINK_DISABLED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::Dependency(_) => "DEPENDENCY_UNAVAILABLE",
            Self::IncompatibleHashVersion => "UNAUTHORIZED",
            Self::Config(_)
            | Self::Database(_)
            | Self::Cache(_)
            | Self::Serialization(_)
            | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error carries details safe to show to API callers
    pub fn is_client_facing(&self) -> bool {
        !matches!(
            self,
            Self::Config(_)
                | Self::Database(_)
                | Self::Cache(_)
                | Self::Serialization(_)
                | Self::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(
            PenshortError::validation("destination too long").code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            PenshortError::validation("expiration must be in the future").code(),
            "EXPIRES_IN_PAST"
        );
        assert_eq!(PenshortError::not_found("link hello").code(), "LINK_NOT_FOUND");
        assert_eq!(PenshortError::not_found("api key").code(), "NOT_FOUND");
        assert_eq!(
            PenshortError::RateLimited { retry_after: 3 }.code(),
            "RATE_LIMITED"
        );
        assert_eq!(PenshortError::internal("boom").code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_server_errors_are_not_client_facing() {
        assert!(!PenshortError::internal("pool exhausted").is_client_facing());
        assert!(PenshortError::validation("bad alias").is_client_facing());
        assert!(PenshortError::RateLimited { retry_after: 1 }.is_client_facing());
    }
}
