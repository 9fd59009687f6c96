// Liveness, readiness, and metrics exposition

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::super::state::AppState;

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: Vec<DependencyCheck>,
}

#[derive(Serialize)]
struct DependencyCheck {
    name: &'static str,
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness: every dependency must answer
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let (db, redis) = tokio::join!(state.database.health_check(), state.cache.health_check());

    let checks = vec![
        DependencyCheck {
            name: "postgres",
            healthy: db.is_ok(),
            error: db.err().map(|e| e.to_string()),
        },
        DependencyCheck {
            name: "redis",
            healthy: redis.is_ok(),
            error: redis.err().map(|e| e.to_string()),
        },
    ];

    let all_healthy = checks.iter().all(|c| c.healthy);
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "degraded" },
            checks,
        }),
    )
}

/// Prometheus exposition; deployments fence this at the ingress
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
