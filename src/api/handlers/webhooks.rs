// Webhook endpoint management handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;

use crate::domain::{AuthContext, PenshortError, Scope, WebhookEndpoint};
use crate::webhooks::{secret_digest, validate_target_url};

use super::super::error::ApiResult;
use super::super::middleware::require_scope;
use super::super::state::AppState;
use super::super::types::{CreateWebhookRequest, CreatedWebhookResponse, WebhookResponse};

pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<CreatedWebhookResponse>)> {
    require_scope(&ctx, Scope::Admin)?;

    if req.event_types.is_empty() {
        return Err(PenshortError::validation("event_types must not be empty").into());
    }
    validate_target_url(&req.url, state.config.webhook.allow_insecure)?;

    let secret = generate_secret();
    let now = Utc::now();
    let endpoint = WebhookEndpoint {
        id: Uuid::now_v7(),
        user_id: ctx.user_id,
        url: req.url,
        secret_hash: secret_digest(&secret),
        enabled: true,
        event_types: req.event_types,
        name: req.name,
        description: req.description,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    state.webhooks.create_endpoint(&endpoint).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedWebhookResponse {
            id: endpoint.id,
            url: endpoint.url,
            secret,
            event_types: endpoint.event_types,
            name: endpoint.name,
            created_at: endpoint.created_at,
        }),
    ))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<WebhookResponse>>> {
    require_scope(&ctx, Scope::Read)?;

    let endpoints = state.webhooks.list_endpoints_by_user(ctx.user_id).await?;
    Ok(Json(
        endpoints.iter().map(WebhookResponse::from_endpoint).collect(),
    ))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_scope(&ctx, Scope::Admin)?;

    let endpoint = state
        .webhooks
        .get_endpoint(id)
        .await?
        .filter(|ep| ep.deleted_at.is_none())
        .ok_or_else(|| PenshortError::not_found("webhook endpoint"))?;

    // Admin keys are per-owner; other owners' endpoints stay invisible
    if endpoint.user_id != ctx.user_id {
        return Err(PenshortError::not_found("webhook endpoint").into());
    }

    state.webhooks.soft_delete_endpoint(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `whsec_` + 32 bytes of OS randomness, hex-encoded
fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    format!("whsec_{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_shape() {
        let secret = generate_secret();
        assert!(secret.starts_with("whsec_"));
        assert_eq!(secret.len(), 6 + 64);
        assert_ne!(secret, generate_secret());
    }
}
