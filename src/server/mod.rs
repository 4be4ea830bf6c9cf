//! HTTP surface: application state, routing, and request middleware.
//!
//! Two version prefixes (`/v0`, `/v0.1`) route to the same handlers. The
//! handlers hold one-way references to the catalog and the sync trigger;
//! nothing points back at them.

pub mod error;
mod handlers;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::{
    catalog::Catalog,
    gitstore::GitStore,
    metrics::{normalize_path, RegistryMetrics},
    sync::{handle_github_webhook, SyncTrigger},
};

const MAX_WEBHOOK_BODY_BYTES: usize = 10 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub store: Arc<GitStore>,
    pub trigger: SyncTrigger,
    pub metrics: Arc<RegistryMetrics>,
    pub webhook_secret: String,
    /// Tracked branch; pushes to any other ref are ignored.
    pub branch: String,
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/ping", get(handlers::ping))
        .route("/version", get(handlers::version))
        .route("/servers", get(handlers::list_servers))
        .route("/servers/{name}", get(handlers::get_server))
        .route("/servers/{name}/versions", get(handlers::get_server_versions))
        .route(
            "/servers/{name}/versions/{version}",
            get(handlers::get_server_version).put(handlers::not_implemented),
        )
        // Write and auth endpoints exist in the API shape but are handled
        // out-of-band via pull requests.
        .route("/publish", post(handlers::not_implemented))
        .route("/auth/github-at", post(handlers::not_implemented))
        .route("/auth/github-oidc", post(handlers::not_implemented))
        .route("/auth/oidc", post(handlers::not_implemented))
        .route("/auth/dns", post(handlers::not_implemented))
        .route("/auth/http", post(handlers::not_implemented))
        .route("/auth/none", post(handlers::not_implemented));

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .route("/webhooks/github", post(handle_github_webhook))
        .nest("/v0.1", api.clone())
        .nest("/v0", api)
        .fallback(handlers::fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_requests,
        ))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY_BYTES))
        .with_state(state)
}

/// Per-request logging and metrics.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = std::time::Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    state
        .metrics
        .record_http_request(method.as_str(), &normalize_path(&path), status);
    info!(
        method = %method,
        path = %path,
        status,
        duration_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
