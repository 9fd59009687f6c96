// The redirect endpoint: the service's hot path

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

use crate::analytics::ClickRequest;
use crate::domain::{PenshortError, RedirectType};

use super::super::error::ApiError;
use super::super::middleware::apply_rate_limit_headers;
use super::super::state::AppState;

/// Country code header supplied by the upstream proxy
const COUNTRY_HEADER: &str = "x-country-code";

pub async fn redirect(
    State(state): State<AppState>,
    Path(short_code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    // Codes outside the alias alphabet can never exist; skip all I/O
    if crate::domain::validate_alias(&short_code).is_err() {
        return ApiError(PenshortError::not_found(format!("link {}", short_code)))
            .into_response();
    }

    let client_addr = client_address(&headers, addr);

    let decision = state.limiter.check_client_addr(&client_addr).await;
    if !decision.allowed {
        let mut response = ApiError(PenshortError::RateLimited {
            retry_after: decision.retry_after,
        })
        .into_response();
        apply_rate_limit_headers(&mut response, &decision);
        return response;
    }

    let link = match state.resolver.resolve(&short_code).await {
        Ok(link) => link,
        Err(err) => return ApiError(err).into_response(),
    };

    // Side effects are detached; the Location response never waits on them
    state.recorder.record(
        link.clone(),
        ClickRequest {
            client_addr,
            user_agent: header_str(&headers, header::USER_AGENT.as_str()),
            referrer: header_str(&headers, header::REFERER.as_str()),
            country_code: headers
                .get(COUNTRY_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string()),
        },
    );

    metrics::counter!("redirects_total", 1);

    let status = match link.redirect_type {
        RedirectType::Permanent => StatusCode::MOVED_PERMANENTLY,
        RedirectType::Temporary => StatusCode::FOUND,
    };

    let mut response = status.into_response();
    match link.destination.parse() {
        Ok(location) => {
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Err(_) => ApiError(PenshortError::internal("stored destination is not a header value"))
            .into_response(),
    }
}

/// Prefer the proxy-reported client, fall back to the socket peer
fn client_address(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
