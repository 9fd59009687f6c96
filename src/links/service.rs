// Link CRUD: validation, alias generation, cache invalidation

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::LinkCache;
use crate::domain::{
    validate_alias, validate_destination, validate_expiration, Link, PenshortError, RedirectType,
    Result,
};
use crate::storage::{LinkRepository, Page};

/// Generated alias length and charset
const GENERATED_ALIAS_LEN: usize = 7;
const ALIAS_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Collision retries before giving up on alias generation
const ALIAS_RETRIES: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLink {
    pub destination: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub redirect_type: Option<u16>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLink {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub redirect_type: Option<u16>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// `Some(None)` clears the expiration
    #[serde(default, with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

/// Distinguishes "field absent" from "field set to null" in PATCH bodies
mod double_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
    }
}

#[derive(Clone)]
pub struct LinkService {
    links: Arc<dyn LinkRepository>,
    cache: LinkCache,
}

impl LinkService {
    pub fn new(links: Arc<dyn LinkRepository>, cache: LinkCache) -> Self {
        Self { links, cache }
    }

    pub async fn create(&self, user_id: Uuid, req: CreateLink) -> Result<Link> {
        validate_destination(&req.destination)?;

        let redirect_type = match req.redirect_type {
            Some(code) => RedirectType::try_from(code).map_err(PenshortError::Validation)?,
            None => RedirectType::default(),
        };

        let now = Utc::now();
        if let Some(expires_at) = req.expires_at {
            validate_expiration(expires_at, now)?;
        }

        let link = match req.alias {
            Some(alias) => {
                validate_alias(&alias)?;
                let mut link = Link::new(alias, req.destination, user_id);
                link.redirect_type = redirect_type;
                link.expires_at = req.expires_at;
                self.links.create(&link).await?;
                link
            }
            None => {
                self.create_with_generated_alias(user_id, req.destination, redirect_type, req.expires_at)
                    .await?
            }
        };

        // A lookup that raced this create may have planted a miss marker
        if let Err(e) = self.cache.clear_negative(&link.short_code).await {
            warn!(short_code = %link.short_code, error = %e, "negative-cache clear failed");
        }

        info!(short_code = %link.short_code, link_id = %link.id, "link created");
        metrics::counter!("links_created_total", 1);
        Ok(link)
    }

    async fn create_with_generated_alias(
        &self,
        user_id: Uuid,
        destination: String,
        redirect_type: RedirectType,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Link> {
        for _ in 0..ALIAS_RETRIES {
            let mut link = Link::new(generate_alias(), destination.clone(), user_id);
            link.redirect_type = redirect_type;
            link.expires_at = expires_at;

            match self.links.create(&link).await {
                Ok(()) => return Ok(link),
                Err(PenshortError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PenshortError::internal(
            "alias generation exhausted retries",
        ))
    }

    pub async fn get(&self, id: Uuid) -> Result<Link> {
        self.links
            .get_by_id(id)
            .await?
            .filter(|l| !l.is_deleted())
            .ok_or_else(|| PenshortError::not_found("link"))
    }

    pub async fn list(&self, user_id: Uuid, page: Page) -> Result<(Vec<Link>, i64)> {
        self.links.list_by_user(user_id, page).await
    }

    pub async fn update(&self, id: Uuid, req: UpdateLink) -> Result<Link> {
        let mut link = self.get(id).await?;

        if link.is_expired() {
            return Err(PenshortError::Expired(link.short_code));
        }

        if let Some(destination) = req.destination {
            validate_destination(&destination)?;
            link.destination = destination;
        }
        if let Some(code) = req.redirect_type {
            link.redirect_type = RedirectType::try_from(code).map_err(PenshortError::Validation)?;
        }
        if let Some(enabled) = req.enabled {
            link.enabled = enabled;
        }
        if let Some(expires_at) = req.expires_at {
            if let Some(instant) = expires_at {
                validate_expiration(instant, Utc::now())?;
            }
            link.expires_at = expires_at;
        }

        link.updated_at = Utc::now();
        self.links.update(&link).await?;

        // Invalidate by deletion so concurrent workers re-read the store
        // instead of racing an in-place overwrite
        self.cache.invalidate(&link.short_code).await.ok();

        info!(link_id = %link.id, "link updated");
        Ok(link)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let link = self.get(id).await?;

        if !self.links.soft_delete(id).await? {
            return Err(PenshortError::not_found("link"));
        }
        self.cache.invalidate(&link.short_code).await.ok();

        info!(link_id = %id, short_code = %link.short_code, "link soft-deleted");
        metrics::counter!("links_deleted_total", 1);
        Ok(())
    }
}

/// 7 chars of `[A-Za-z0-9]` from the OS CSPRNG
fn generate_alias() -> String {
    let mut rng = OsRng;
    (0..GENERATED_ALIAS_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALIAS_CHARSET.len());
            ALIAS_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_alias_shape() {
        for _ in 0..100 {
            let alias = generate_alias();
            assert_eq!(alias.len(), GENERATED_ALIAS_LEN);
            assert!(alias.bytes().all(|b| b.is_ascii_alphanumeric()));
            assert!(validate_alias(&alias).is_ok());
        }
    }

    #[test]
    fn test_generated_aliases_vary() {
        let a = generate_alias();
        let b = generate_alias();
        // 62^7 keyspace; identical draws mean a broken RNG
        assert_ne!(a, b);
    }
}
