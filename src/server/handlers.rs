//! Read API handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::{debug, error};

use crate::{
    catalog::IndexStatus,
    domain::{
        HealthResponse, NotImplementedResponse, OfficialMeta, PingResponse, ServerMeta,
        ServerResponse, ServerVersionsResponse, VersionEntry, VersionResponse,
    },
    error::RegistryError,
    metrics::CatalogGauges,
    server::{error, AppState},
    version,
};

const INDEX_UNAVAILABLE_DETAIL: &str =
    "Index not available. Ensure index.yaml exists and is valid.";

pub async fn health(State(state): State<AppState>) -> Response {
    let index_status = state.catalog.index_status();
    let status = if index_status == IndexStatus::Valid {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        repo_url: state.store.repo_url().to_string(),
        branch: state.store.branch().to_string(),
        commit_sha: state.store.head().await,
        last_sync_at: state.catalog.last_sync_at(),
        index_status: index_status.as_str().to_string(),
        server_count: state.catalog.server_count(),
        cache_stats: state.catalog.cache_stats(),
    })
    .into_response()
}

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { pong: true })
}

pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: version::VERSION.to_string(),
        git_commit: version::GIT_COMMIT.to_string(),
        build_time: version::BUILD_TIME.to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    cursor: String,
    /// Parsed leniently: absent or unparsable values fall back to the
    /// default page size.
    limit: Option<String>,
}

pub async fn list_servers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query
        .limit
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0);

    match state.catalog.list(&query.cursor, limit).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(RegistryError::Unavailable) => error::service_unavailable(INDEX_UNAVAILABLE_DETAIL),
        Err(err) => {
            error!(error = %err, "failed to list servers");
            error::internal_error("failed to list servers")
        }
    }
}

pub async fn get_server(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let decoded = decode_name(&name);

    match state.catalog.get(&decoded).await {
        Ok(manifest) => (
            StatusCode::OK,
            Json(ServerResponse {
                server: (*manifest).clone(),
                meta: Some(official_meta(&state)),
            }),
        )
            .into_response(),
        Err(err) => lookup_error(&decoded, err),
    }
}

/// Only the current commit's view is served, so a single version exists.
pub async fn get_server_versions(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let decoded = decode_name(&name);

    match state.catalog.get(&decoded).await {
        Ok(manifest) => (
            StatusCode::OK,
            Json(ServerVersionsResponse {
                server_name: manifest.name.clone(),
                versions: vec![VersionEntry {
                    version: manifest.version.clone(),
                    is_latest: true,
                }],
            }),
        )
            .into_response(),
        Err(err) => lookup_error(&decoded, err),
    }
}

pub async fn get_server_version(
    State(state): State<AppState>,
    Path((name, requested)): Path<(String, String)>,
) -> Response {
    let decoded = decode_name(&name);

    let manifest = match state.catalog.get(&decoded).await {
        Ok(manifest) => manifest,
        Err(err) => return lookup_error(&decoded, err),
    };

    if requested != "latest" && requested != manifest.version {
        return error::not_found(
            "Version not found. This registry only serves the latest version.",
        );
    }

    (
        StatusCode::OK,
        Json(ServerResponse {
            server: (*manifest).clone(),
            meta: Some(official_meta(&state)),
        }),
    )
        .into_response()
}

pub async fn not_implemented() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(NotImplementedResponse {
            status: StatusCode::NOT_IMPLEMENTED.as_u16(),
            title: "Not Implemented".to_string(),
            detail: "This registry is read-only. Server definitions are managed through a \
                     pull-request workflow."
                .to_string(),
            see_also: "Submit a pull request to the registry repository to add or update servers."
                .to_string(),
        }),
    )
        .into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let (cache_hits, cache_misses) = state.catalog.cache_counters();
    let cache_stats = state.catalog.cache_stats();
    let gauges = CatalogGauges {
        servers_total: state.catalog.server_count(),
        cache_size: cache_stats.size,
        cache_capacity: cache_stats.capacity,
        cache_hits,
        cache_misses,
        index_valid: state.catalog.index_status() == IndexStatus::Valid,
    };

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(&gauges),
    )
        .into_response()
}

pub async fn fallback() -> Response {
    error::not_found("Resource not found")
}

fn official_meta(state: &AppState) -> ServerMeta {
    ServerMeta {
        official: Some(OfficialMeta {
            status: "active".to_string(),
            published_at: state.catalog.last_sync_at().unwrap_or_else(Utc::now),
            is_latest: true,
        }),
    }
}

fn lookup_error(name: &str, err: RegistryError) -> Response {
    match err {
        RegistryError::Unavailable => error::service_unavailable(INDEX_UNAVAILABLE_DETAIL),
        RegistryError::NotFound(_) => error::not_found(format!("Server not found: {name}")),
        err => {
            debug!(name, error = %err, "server lookup failed");
            error::not_found(format!("Server not found: {name}"))
        }
    }
}

fn decode_name(name: &str) -> String {
    percent_decode_str(name)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| name.to_string())
}
