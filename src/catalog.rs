//! The manifest catalog: parsed index, bounded manifest cache, lookups.
//!
//! The index is replaced wholesale behind an atomic pointer swap; cache
//! entries are created on miss, evicted by LRU capacity, and purged before
//! every index reload so stale data bound to a prior HEAD can never be
//! served. No lock is held across an await point.

use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use percent_encoding::percent_decode_str;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        validation::validate_manifest, CacheStats, Index, IndexEntry, ListMetadata,
        ServerListResponse, ServerManifest, ServerResponse,
    },
    error::{RegistryError, RegistryResult},
    gitstore::GitStore,
};

const INDEX_PATH: &str = "index.yaml";
const DEFAULT_PAGE_LIMIT: usize = 30;
const MAX_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    NotLoaded,
    Valid,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::NotLoaded => "not_loaded",
            IndexStatus::Valid => "valid",
        }
    }
}

pub struct Catalog {
    store: Arc<GitStore>,
    index: RwLock<Option<Arc<Index>>>,
    cache: Mutex<LruCache<String, Arc<ServerManifest>>>,
    cache_capacity: usize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    last_sync_at: RwLock<Option<DateTime<Utc>>>,
}

impl Catalog {
    pub fn new(store: Arc<GitStore>, cache_size: usize) -> Self {
        let capacity = cache_size.max(1);
        Self {
            store,
            index: RwLock::new(None),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap())),
            cache_capacity: capacity,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            last_sync_at: RwLock::new(None),
        }
    }

    /// Read `index.yaml` at the current HEAD, parse it, and install it as the
    /// new index. Any failure leaves the catalog in `not_loaded` status —
    /// the service never reverts to a prior index.
    pub async fn load_index(&self) -> RegistryResult<()> {
        let result = self.read_index().await;
        match result {
            Ok(index) => {
                if index.servers.is_empty() {
                    warn!("index contains no servers");
                }
                info!(
                    version = %index.version,
                    commit = %index.commit,
                    server_count = index.servers.len(),
                    "index loaded"
                );
                *self.index.write() = Some(Arc::new(index));
                *self.last_sync_at.write() = Some(Utc::now());
                Ok(())
            }
            Err(err) => {
                *self.index.write() = None;
                Err(err)
            }
        }
    }

    async fn read_index(&self) -> RegistryResult<Index> {
        let content = match self.store.read(INDEX_PATH).await {
            Ok(content) => content,
            Err(RegistryError::NotFound(_)) => {
                return Err(RegistryError::NoIndex(format!(
                    "{INDEX_PATH} not found at repository root"
                )))
            }
            Err(err) => return Err(err),
        };

        let index: Index = serde_yaml::from_slice(&content)
            .map_err(|err| RegistryError::BadIndex(err.to_string()))?;

        // Names must be unique; a duplicate would make pagination repeat
        // entries and lookups ambiguous.
        let mut seen = std::collections::HashSet::with_capacity(index.servers.len());
        for entry in &index.servers {
            if !seen.insert(entry.name.as_str()) {
                return Err(RegistryError::BadIndex(format!(
                    "duplicate server name: {}",
                    entry.name
                )));
            }
        }

        Ok(index)
    }

    /// Purge the cache and counters, then reload the index. Purge comes
    /// first: even if the reload fails, the cache cannot serve data bound to
    /// a prior HEAD.
    pub async fn refresh(&self) -> RegistryResult<()> {
        self.cache.lock().clear();
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);

        self.load_index().await
    }

    /// Look up one manifest by (possibly percent-encoded) name.
    pub async fn get(&self, name: &str) -> RegistryResult<Arc<ServerManifest>> {
        let decoded = decode_name(name);

        if let Some(manifest) = self.cache.lock().get(&decoded).cloned() {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(manifest);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let entry = {
            let guard = self.index.read();
            let index = guard.as_ref().ok_or(RegistryError::Unavailable)?;
            index
                .servers
                .iter()
                .find(|entry| entry.name == decoded)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(decoded.clone()))?
        };

        let content = self.store.read(&entry.path).await?;
        let manifest: ServerManifest = serde_yaml::from_slice(&content).map_err(|err| {
            RegistryError::BadIndex(format!("manifest {}: {err}", entry.path))
        })?;
        validate_manifest(&manifest)
            .map_err(|err| RegistryError::BadIndex(format!("manifest {}: {err}", entry.path)))?;

        let manifest = Arc::new(manifest);
        self.cache.lock().put(decoded, manifest.clone());
        Ok(manifest)
    }

    /// A page of the index sorted lexicographically by name. The cursor is
    /// the last name of the previous page; the page starts at the first entry
    /// strictly greater. Entries are hydrated via `get` with an index-row
    /// fallback, so one corrupt file cannot break listing.
    pub async fn list(&self, cursor: &str, limit: i64) -> RegistryResult<ServerListResponse> {
        let sorted: Vec<IndexEntry> = {
            let guard = self.index.read();
            let index = guard.as_ref().ok_or(RegistryError::Unavailable)?;
            let mut entries = index.servers.clone();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            entries
        };

        let limit = clamp_limit(limit);
        let start = if cursor.is_empty() {
            0
        } else {
            sorted.partition_point(|entry| entry.name.as_str() <= cursor)
        };
        let end = (start + limit).min(sorted.len());

        let mut servers = Vec::with_capacity(end - start);
        for entry in &sorted[start..end] {
            let manifest = match self.get(&entry.name).await {
                Ok(manifest) => (*manifest).clone(),
                Err(err) => {
                    debug!(name = %entry.name, error = %err, "falling back to index row");
                    minimal_manifest(entry)
                }
            };
            servers.push(ServerResponse {
                server: manifest,
                meta: None,
            });
        }

        let next_cursor = if end < sorted.len() && end > start {
            sorted[end - 1].name.clone()
        } else {
            String::new()
        };

        Ok(ServerListResponse {
            metadata: ListMetadata {
                next_cursor,
                count: servers.len(),
            },
            servers,
        })
    }

    /// Case-insensitive substring match against name and description.
    pub fn search(&self, query: &str) -> RegistryResult<Vec<IndexEntry>> {
        let guard = self.index.read();
        let index = guard.as_ref().ok_or(RegistryError::Unavailable)?;

        let query = query.to_lowercase();
        Ok(index
            .servers
            .iter()
            .filter(|entry| {
                entry.name.to_lowercase().contains(&query)
                    || entry.description.to_lowercase().contains(&query)
            })
            .cloned()
            .collect())
    }

    pub fn server_count(&self) -> usize {
        self.index
            .read()
            .as_ref()
            .map(|index| index.servers.len())
            .unwrap_or(0)
    }

    pub fn index_status(&self) -> IndexStatus {
        if self.index.read().is_some() {
            IndexStatus::Valid
        } else {
            IndexStatus::NotLoaded
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            size: self.cache.lock().len(),
            capacity: self.cache_capacity,
            hit_rate,
        }
    }

    /// (hits, misses) since the last refresh.
    pub fn cache_counters(&self) -> (u64, u64) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_at.read()
    }
}

fn decode_name(name: &str) -> String {
    percent_decode_str(name)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| name.to_string())
}

fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 {
        DEFAULT_PAGE_LIMIT
    } else {
        (limit as usize).min(MAX_PAGE_LIMIT)
    }
}

/// Built from the index row when the manifest file cannot be served.
fn minimal_manifest(entry: &IndexEntry) -> ServerManifest {
    ServerManifest {
        schema: None,
        name: entry.name.clone(),
        description: entry.description.clone(),
        version: entry.version.clone(),
        title: None,
        website_url: None,
        repository: None,
        packages: vec![],
        remotes: vec![],
    }
}
