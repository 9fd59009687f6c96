// API key management handlers

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{generate_key, KeyEnv};
use crate::domain::{ApiKey, AuthContext, PenshortError, Scope, Tier};

use super::super::error::ApiResult;
use super::super::middleware::require_scope;
use super::super::state::AppState;
use super::super::types::{
    ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse, RotatedApiKeyResponse,
};

pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateApiKeyRequest>,
) -> ApiResult<(StatusCode, Json<CreatedApiKeyResponse>)> {
    require_scope(&ctx, Scope::Admin)?;

    if req.scopes.is_empty() {
        return Err(PenshortError::validation("scopes must not be empty").into());
    }

    let owner = req.user_id.unwrap_or(ctx.user_id);
    if state.users.get_by_id(owner).await?.is_none() {
        return Err(PenshortError::validation("user_id does not exist").into());
    }

    let key = mint_key(&state, owner, req.scopes, req.tier.unwrap_or(Tier::Free), req.name).await?;
    Ok((StatusCode::CREATED, Json(key)))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<Vec<ApiKeyResponse>>> {
    require_scope(&ctx, Scope::Read)?;

    let keys = state.api_keys.list_by_user(ctx.user_id).await?;
    Ok(Json(keys.iter().map(ApiKeyResponse::from_key).collect()))
}

pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_scope(&ctx, Scope::Admin)?;

    if !state.auth.revoke(key_id).await? {
        return Err(PenshortError::not_found("api key").into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Mint a replacement with the old key's owner, scopes, and tier, then
/// revoke the old key (tearing down its cached context)
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<RotatedApiKeyResponse>)> {
    require_scope(&ctx, Scope::Admin)?;

    let old = state
        .api_keys
        .get_by_id(key_id)
        .await?
        .filter(|k| !k.is_revoked())
        .ok_or_else(|| PenshortError::not_found("api key"))?;

    let minted = mint_key(
        &state,
        old.user_id,
        old.scopes.clone(),
        old.tier,
        old.name.clone(),
    )
    .await?;

    state.auth.revoke(old.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(RotatedApiKeyResponse {
            key: minted,
            revoked_key_id: old.id,
            revoked_at: Utc::now(),
        }),
    ))
}

async fn mint_key(
    state: &AppState,
    owner: Uuid,
    scopes: Vec<Scope>,
    tier: Tier,
    name: Option<String>,
) -> Result<CreatedApiKeyResponse, PenshortError> {
    let env = if state.config.is_production() {
        KeyEnv::Live
    } else {
        KeyEnv::Test
    };
    let generated = generate_key(env)?;

    let key = ApiKey {
        id: Uuid::now_v7(),
        user_id: owner,
        key_hash: generated.key_hash,
        prefix: generated.prefix,
        scopes,
        tier,
        name,
        revoked_at: None,
        last_used_at: None,
        created_at: Utc::now(),
    };
    state.api_keys.create(&key).await?;

    Ok(CreatedApiKeyResponse {
        id: key.id,
        key: generated.plaintext,
        prefix: key.prefix,
        scopes: key.scopes,
        tier: key.tier,
        name: key.name,
        created_at: key.created_at,
    })
}
