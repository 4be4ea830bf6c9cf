//! API response envelopes.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::ServerManifest;

/// A manifest wrapped with registry metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ServerResponse {
    pub server: ServerManifest,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<ServerMeta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerMeta {
    #[serde(
        rename = "io.modelcontextprotocol.registry/official",
        skip_serializing_if = "Option::is_none"
    )]
    pub official: Option<OfficialMeta>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficialMeta {
    pub status: String,
    pub published_at: DateTime<Utc>,
    pub is_latest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerListResponse {
    pub servers: Vec<ServerResponse>,
    pub metadata: ListMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMetadata {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub next_cursor: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerVersionsResponse {
    pub server_name: String,
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub version: String,
    pub is_latest: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub repo_url: String,
    pub branch: String,
    pub commit_sha: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub index_status: String,
    pub server_count: usize,
    pub cache_stats: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    pub pong: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_commit: String,
    pub build_time: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Body served on write endpoints; the registry is read-only.
#[derive(Debug, Clone, Serialize)]
pub struct NotImplementedResponse {
    pub status: u16,
    pub title: String,
    pub detail: String,
    pub see_also: String,
}
