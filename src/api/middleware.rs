// API-plane middleware: bearer authentication, per-key rate limiting,
// and the X-RateLimit-* response headers

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::domain::{AuthContext, PenshortError, Scope};
use crate::ratelimit::RateLimitDecision;

use super::error::ApiError;
use super::state::AppState;

/// Authenticate the bearer credential, enforce the key's rate limit, and
/// stamp limit headers on the way out.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let bearer = match extract_bearer(&request) {
        Ok(bearer) => bearer,
        Err(err) => return ApiError(err).into_response(),
    };

    let ctx = match state.auth.authenticate(&bearer).await {
        Ok(ctx) => ctx,
        Err(err) => return ApiError(err).into_response(),
    };

    let decision = state.limiter.check_api_key(ctx.key_id, ctx.tier).await;
    if !decision.allowed {
        let mut response = ApiError(PenshortError::RateLimited {
            retry_after: decision.retry_after,
        })
        .into_response();
        apply_rate_limit_headers(&mut response, &decision);
        return response;
    }

    request.extensions_mut().insert(ctx);

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, &decision);
    response
}

fn extract_bearer(request: &Request) -> Result<String, PenshortError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| PenshortError::unauthorized("missing Authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| PenshortError::unauthorized("malformed Authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| PenshortError::unauthorized("expected Bearer credential"))
}

/// `X-RateLimit-Limit`, `-Remaining`, `-Reset` on every API response that
/// passed through a real (non-bypass) policy
pub fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    if !decision.has_headers() {
        return;
    }
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset.to_string()) {
        headers.insert("X-RateLimit-Reset", v);
    }
}

/// Per-route scope gate; `admin` passes every check
pub fn require_scope(ctx: &AuthContext, scope: Scope) -> Result<(), PenshortError> {
    if ctx.has_scope(scope) {
        Ok(())
    } else {
        Err(PenshortError::Forbidden(scope.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/api/v1/links");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer() {
        let req = request_with_auth(Some("Bearer pk_test_a1b2c3_abc"));
        assert_eq!(extract_bearer(&req).unwrap(), "pk_test_a1b2c3_abc");

        assert!(extract_bearer(&request_with_auth(None)).is_err());
        assert!(extract_bearer(&request_with_auth(Some("Basic dXNlcg=="))).is_err());
        assert!(extract_bearer(&request_with_auth(Some("Bearer "))).is_err());
    }

    #[test]
    fn test_require_scope_admin_passes_all() {
        use uuid::Uuid;
        let ctx = AuthContext {
            key_id: Uuid::now_v7(),
            prefix: "a1b2c3".into(),
            user_id: Uuid::now_v7(),
            scopes: vec![Scope::Admin],
            tier: crate::domain::Tier::Pro,
        };
        assert!(require_scope(&ctx, Scope::Read).is_ok());
        assert!(require_scope(&ctx, Scope::Write).is_ok());
        assert!(require_scope(&ctx, Scope::Admin).is_ok());
    }
}
