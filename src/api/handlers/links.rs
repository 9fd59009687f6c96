// Link CRUD and analytics handlers

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{AuthContext, Link, PenshortError, Scope};
use crate::links::{CreateLink, UpdateLink};
use crate::storage::Page;

use super::super::error::ApiResult;
use super::super::middleware::require_scope;
use super::super::state::AppState;
use super::super::types::{
    AnalyticsDay, AnalyticsQuery, AnalyticsResponse, LinkResponse, PaginatedResponse,
    PaginationParams,
};

pub async fn create_link(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(req): Json<CreateLink>,
) -> ApiResult<(StatusCode, Json<LinkResponse>)> {
    require_scope(&ctx, Scope::Write)?;

    let link = state.links.create(ctx.user_id, req).await?;
    let body = LinkResponse::from_link(&link, &state.config.app.base_url);
    Ok((StatusCode::CREATED, Json(body)))
}

pub async fn list_links(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<LinkResponse>>> {
    require_scope(&ctx, Scope::Read)?;

    let page = Page::new(params.page, params.per_page);
    let (links, total) = state.links.list(ctx.user_id, page).await?;
    let data = links
        .iter()
        .map(|l| LinkResponse::from_link(l, &state.config.app.base_url))
        .collect();

    Ok(Json(PaginatedResponse::new(
        data,
        page.page,
        page.per_page,
        total,
    )))
}

pub async fn get_link(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LinkResponse>> {
    require_scope(&ctx, Scope::Read)?;

    let link = state.links.get(id).await?;
    check_ownership(&ctx, &link)?;
    Ok(Json(LinkResponse::from_link(
        &link,
        &state.config.app.base_url,
    )))
}

pub async fn update_link(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLink>,
) -> ApiResult<Json<LinkResponse>> {
    require_scope(&ctx, Scope::Write)?;

    let existing = state.links.get(id).await?;
    check_ownership(&ctx, &existing)?;

    let link = state.links.update(id, req).await?;
    Ok(Json(LinkResponse::from_link(
        &link,
        &state.config.app.base_url,
    )))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_scope(&ctx, Scope::Admin)?;

    state.links.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Daily pre-aggregated analytics; defaults to the trailing 30 days
pub async fn link_analytics(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<AnalyticsResponse>> {
    require_scope(&ctx, Scope::Read)?;

    let link = state.links.get(id).await?;
    check_ownership(&ctx, &link)?;

    let today = Utc::now().date_naive();
    let to = query.to.unwrap_or(today);
    let from = query.from.unwrap_or(to - Duration::days(30));
    if from > to {
        return Err(PenshortError::validation("'from' must not be after 'to'").into());
    }

    let rows = state.stats.get_range(link.id, from, to).await?;

    let days: Vec<AnalyticsDay> = rows
        .into_iter()
        .map(|s| AnalyticsDay {
            date: s.date,
            total_clicks: s.total_clicks,
            unique_visitors: s.unique_visitors,
            referrers: s.referrers,
            countries: s.countries,
            user_agents: s.user_agents,
        })
        .collect();

    Ok(Json(AnalyticsResponse {
        link_id: link.id,
        from,
        to,
        total_clicks: days.iter().map(|d| d.total_clicks).sum(),
        unique_visitors: days.iter().map(|d| d.unique_visitors).sum(),
        days,
    }))
}

/// Non-admin keys only see their owner's links
fn check_ownership(ctx: &AuthContext, link: &Link) -> Result<(), PenshortError> {
    if ctx.has_scope(Scope::Admin) || link.user_id == ctx.user_id {
        Ok(())
    } else {
        // Indistinguishable from absent, so ids cannot be probed
        Err(PenshortError::not_found("link"))
    }
}
