// Route map binding services to the REST surface and the redirect path

use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use super::handlers::{api_keys, links, redirect, system, webhooks};
use super::middleware::auth_middleware;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    // Authenticated, per-key rate-limited API plane
    let api = Router::new()
        .route("/links", post(links::create_link).get(links::list_links))
        .route(
            "/links/:id",
            get(links::get_link)
                .patch(links::update_link)
                .delete(links::delete_link),
        )
        .route("/links/:id/analytics", get(links::link_analytics))
        .route(
            "/api-keys",
            post(api_keys::create_api_key).get(api_keys::list_api_keys),
        )
        .route("/api-keys/:key_id", delete(api_keys::revoke_api_key))
        .route("/api-keys/:key_id/rotate", post(api_keys::rotate_api_key))
        .route(
            "/webhooks",
            post(webhooks::create_webhook).get(webhooks::list_webhooks),
        )
        .route("/webhooks/:id", delete(webhooks::delete_webhook))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/healthz", get(system::healthz))
        .route("/readyz", get(system::readyz))
        .route("/metrics", get(system::metrics))
        .nest("/api/v1", api)
        // The redirect plane: IP rate-limited inside the handler
        .route("/:short_code", get(redirect::redirect))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO)),
                )
                .layer(TimeoutLayer::new(state.config.app.write_timeout))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
