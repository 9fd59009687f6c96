use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{PenshortError, Result};

/// Maximum accepted destination URL length
pub const MAX_DESTINATION_LEN: usize = 2048;

/// Alias charset and length bounds: 3-50 of `[A-Za-z0-9-]`
static ALIAS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]{3,50}$").unwrap());

/// HTTP redirect status used when following a short link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum RedirectType {
    Permanent, // 301
    Temporary, // 302
}

impl RedirectType {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Permanent => 301,
            Self::Temporary => 302,
        }
    }
}

impl Default for RedirectType {
    fn default() -> Self {
        Self::Temporary
    }
}

impl TryFrom<u16> for RedirectType {
    type Error = String;

    fn try_from(code: u16) -> std::result::Result<Self, Self::Error> {
        match code {
            301 => Ok(Self::Permanent),
            302 => Ok(Self::Temporary),
            other => Err(format!("redirect_type must be 301 or 302, got {}", other)),
        }
    }
}

impl From<RedirectType> for u16 {
    fn from(rt: RedirectType) -> u16 {
        rt.status_code()
    }
}

/// A short link owned by a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,

    /// Terminal path segment identifying the link, 3-50 chars `[A-Za-z0-9-]`
    pub short_code: String,

    /// http/https destination, at most 2048 chars
    pub destination: String,

    pub redirect_type: RedirectType,

    pub user_id: Uuid,

    pub enabled: bool,

    /// Absolute expiration; must be strictly after creation when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Soft-delete instant; a deleted link is invisible to redirects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,

    pub click_count: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Redirect-visibility state derived from the link's fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Disabled,
    Expired,
    Deleted,
}

impl Link {
    pub fn new(short_code: String, destination: String, user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            short_code,
            destination,
            redirect_type: RedirectType::default(),
            user_id,
            enabled: true,
            expires_at: None,
            deleted_at: None,
            click_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn status(&self) -> LinkStatus {
        if self.is_deleted() {
            LinkStatus::Deleted
        } else if self.is_expired() {
            LinkStatus::Expired
        } else if !self.enabled {
            LinkStatus::Disabled
        } else {
            LinkStatus::Active
        }
    }
}

/// Validate a caller-supplied alias
pub fn validate_alias(alias: &str) -> Result<()> {
    if !ALIAS_RE.is_match(alias) {
        return Err(PenshortError::validation(
            "alias must be 3-50 characters of letters, digits, or hyphens",
        ));
    }
    Ok(())
}

/// Validate a destination URL: http/https scheme, non-empty host, bounded length
pub fn validate_destination(destination: &str) -> Result<()> {
    if destination.is_empty() {
        return Err(PenshortError::validation("destination must not be empty"));
    }
    if destination.len() > MAX_DESTINATION_LEN {
        return Err(PenshortError::validation(format!(
            "destination must be at most {} characters",
            MAX_DESTINATION_LEN
        )));
    }
    let parsed = url::Url::parse(destination)
        .map_err(|e| PenshortError::validation(format!("destination is not a valid URL: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PenshortError::validation(format!(
                "destination scheme must be http or https, got '{}'",
                other
            )))
        }
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(PenshortError::validation("destination must have a host"));
    }
    Ok(())
}

/// Validate an expiration instant against the current time
pub fn validate_expiration(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if expires_at <= now {
        return Err(PenshortError::validation(
            "expiration must be strictly in the future",
        ));
    }
    Ok(())
}

/// String-shaped projection of a Link sufficient to answer a redirect
/// (and attribute its click) without touching the store. Stored as a
/// Redis hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLink {
    /// Link identifier as a string, so clicks served from cache can still
    /// be attributed
    pub link_id: String,
    pub destination: String,
    pub redirect_type: u16,
    /// RFC 3339 or empty
    pub expires_at: String,
    pub enabled: bool,
    /// RFC 3339 or empty
    pub deleted_at: String,
    pub updated_at: String,
}

impl CachedLink {
    pub fn from_link(link: &Link) -> Self {
        Self {
            link_id: link.id.to_string(),
            destination: link.destination.clone(),
            redirect_type: link.redirect_type.status_code(),
            expires_at: link.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            enabled: link.enabled,
            deleted_at: link.deleted_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            updated_at: link.updated_at.to_rfc3339(),
        }
    }

    /// Reconstruct a Link carrying the fields a redirect decision needs.
    /// Ownership and counters are not round-tripped through the cache;
    /// they are zeroed placeholders.
    pub fn to_link(&self, short_code: &str) -> Result<Link> {
        let parse_opt = |s: &str| -> Result<Option<DateTime<Utc>>> {
            if s.is_empty() {
                return Ok(None);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|e| PenshortError::internal(format!("bad cached instant: {}", e)))
        };

        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PenshortError::internal(format!("bad cached instant: {}", e)))?;

        Ok(Link {
            id: Uuid::parse_str(&self.link_id).unwrap_or(Uuid::nil()),
            short_code: short_code.to_string(),
            destination: self.destination.clone(),
            redirect_type: RedirectType::try_from(self.redirect_type)
                .map_err(PenshortError::internal)?,
            user_id: Uuid::nil(),
            enabled: self.enabled,
            expires_at: parse_opt(&self.expires_at)?,
            deleted_at: parse_opt(&self.deleted_at)?,
            click_count: 0,
            created_at: updated_at,
            updated_at,
        })
    }
}
