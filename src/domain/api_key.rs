use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability tag granted to an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Webhook,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Webhook => "webhook",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "webhook" => Some(Self::Webhook),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Rate-limit tier attached to an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Unlimited,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "unlimited" => Some(Self::Unlimited),
            _ => None,
        }
    }

    /// Requests per minute and burst capacity for the tier.
    /// `None` means the tier bypasses rate limiting.
    pub fn limits(&self) -> Option<(u64, u64)> {
        match self {
            Self::Free => Some((60, 10)),
            Self::Pro => Some((600, 50)),
            Self::Unlimited => None,
        }
    }
}

/// Stored API key record. The plaintext never appears here; `key_hash` is
/// the Argon2id verifier over the full plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,

    /// Argon2id PHC string; never serialized to API responses
    #[serde(skip_serializing)]
    pub key_hash: String,

    /// First 6 hex chars of the key, shown to users for identification
    pub prefix: String,

    pub scopes: Vec<Scope>,
    pub tier: Tier,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Decoded authorization summary attached to an authenticated request.
/// Lives at most as long as the auth-context cache TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub key_id: Uuid,
    pub prefix: String,
    pub user_id: Uuid,
    pub scopes: Vec<Scope>,
    pub tier: Tier,
}

impl AuthContext {
    pub fn from_key(key: &ApiKey) -> Self {
        Self {
            key_id: key.id,
            prefix: key.prefix.clone(),
            user_id: key.user_id,
            scopes: key.scopes.clone(),
            tier: key.tier,
        }
    }

    /// Admin subsumes every other scope
    pub fn has_scope(&self, required: Scope) -> bool {
        self.scopes
            .iter()
            .any(|s| *s == required || *s == Scope::Admin)
    }
}

/// Minimal ownership record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(scopes: Vec<Scope>) -> AuthContext {
        AuthContext {
            key_id: Uuid::now_v7(),
            prefix: "a1b2c3".into(),
            user_id: Uuid::now_v7(),
            scopes,
            tier: Tier::Free,
        }
    }

    #[test]
    fn test_admin_subsumes_all_scopes() {
        let ctx = context(vec![Scope::Admin]);
        assert!(ctx.has_scope(Scope::Read));
        assert!(ctx.has_scope(Scope::Write));
        assert!(ctx.has_scope(Scope::Webhook));
        assert!(ctx.has_scope(Scope::Admin));
    }

    #[test]
    fn test_scope_check_is_exact_otherwise() {
        let ctx = context(vec![Scope::Read, Scope::Write]);
        assert!(ctx.has_scope(Scope::Read));
        assert!(ctx.has_scope(Scope::Write));
        assert!(!ctx.has_scope(Scope::Webhook));
        assert!(!ctx.has_scope(Scope::Admin));
    }

    #[test]
    fn test_tier_limits() {
        assert_eq!(Tier::Free.limits(), Some((60, 10)));
        assert_eq!(Tier::Pro.limits(), Some((600, 50)));
        assert_eq!(Tier::Unlimited.limits(), None);
    }

    #[test]
    fn test_scope_parse_round_trip() {
        for scope in [Scope::Read, Scope::Write, Scope::Webhook, Scope::Admin] {
            assert_eq!(Scope::parse(scope.as_str()), Some(scope));
        }
        assert_eq!(Scope::parse("root"), None);
    }
}
