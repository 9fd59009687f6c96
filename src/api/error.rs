// HTTP mapping for the error taxonomy
//
// Every API error becomes `{error, code}` JSON. Server-side kinds are
// logged in full and surfaced as a generic message so internals never
// leak to callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::domain::PenshortError;

/// Handler result alias
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Newtype so the domain error can cross the axum boundary
#[derive(Debug)]
pub struct ApiError(pub PenshortError);

impl From<PenshortError> for ApiError {
    fn from(err: PenshortError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            PenshortError::Validation(_) => StatusCode::BAD_REQUEST,
            PenshortError::Unauthorized(_) | PenshortError::IncompatibleHashVersion => {
                StatusCode::UNAUTHORIZED
            }
            PenshortError::Forbidden(_) => StatusCode::FORBIDDEN,
            PenshortError::NotFound(_) => StatusCode::NOT_FOUND,
            PenshortError::Conflict(_) => StatusCode::CONFLICT,
            PenshortError::Expired(_) | PenshortError::Disabled(_) => StatusCode::GONE,
            PenshortError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            PenshortError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            PenshortError::Config(_)
            | PenshortError::Database(_)
            | PenshortError::Cache(_)
            | PenshortError::Serialization(_)
            | PenshortError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.0.is_client_facing() {
            self.0.to_string()
        } else {
            error!(error = %self.0, "request failed");
            "internal server error".to_string()
        };

        let body = Json(ErrorBody {
            error: message,
            code: self.0.code(),
        });

        let mut response = (status, body).into_response();

        if let PenshortError::RateLimited { retry_after } = &self.0 {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PenshortError::validation("x"), StatusCode::BAD_REQUEST),
            (PenshortError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (PenshortError::Forbidden("write".into()), StatusCode::FORBIDDEN),
            (PenshortError::not_found("link x"), StatusCode::NOT_FOUND),
            (PenshortError::conflict("x"), StatusCode::CONFLICT),
            (PenshortError::Expired("x".into()), StatusCode::GONE),
            (PenshortError::Disabled("x".into()), StatusCode::GONE),
            (
                PenshortError::RateLimited { retry_after: 1 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (PenshortError::Dependency("redis".into()), StatusCode::SERVICE_UNAVAILABLE),
            (PenshortError::internal("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
