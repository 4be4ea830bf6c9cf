//! Registry metrics.
//!
//! Process-wide atomic counters plus a per-route request map, rendered as
//! Prometheus text exposition by the `/metrics` handler. Catalog-derived
//! gauges are sampled at render time rather than mirrored into this struct.

use std::{
    fmt::Write,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;

pub struct RegistryMetrics {
    syncs_total: AtomicU64,
    sync_errors_total: AtomicU64,
    webhooks_received_total: AtomicU64,
    webhooks_ignored_total: AtomicU64,

    /// Requests keyed by rendered label set (method, normalized path, status).
    http_requests: DashMap<String, AtomicU64>,
}

impl RegistryMetrics {
    pub fn new() -> Self {
        Self {
            syncs_total: AtomicU64::new(0),
            sync_errors_total: AtomicU64::new(0),
            webhooks_received_total: AtomicU64::new(0),
            webhooks_ignored_total: AtomicU64::new(0),
            http_requests: DashMap::new(),
        }
    }

    /// Record a completed sync pass (successful or not).
    pub fn record_sync(&self) {
        self.syncs_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one failed fetch attempt or refresh failure.
    pub fn record_sync_error(&self) {
        self.sync_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_received(&self) {
        self.webhooks_received_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_webhook_ignored(&self) {
        self.webhooks_ignored_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16) {
        let key = format!("method=\"{method}\",path=\"{path}\",status=\"{status}\"");
        self.http_requests
            .entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            syncs_total: self.syncs_total.load(Ordering::Relaxed),
            sync_errors_total: self.sync_errors_total.load(Ordering::Relaxed),
            webhooks_received_total: self.webhooks_received_total.load(Ordering::Relaxed),
            webhooks_ignored_total: self.webhooks_ignored_total.load(Ordering::Relaxed),
        }
    }

    /// Render the Prometheus text exposition format (version 0.0.4).
    pub fn render(&self, gauges: &CatalogGauges) -> String {
        let snap = self.snapshot();
        let mut out = String::with_capacity(2048);

        counter(
            &mut out,
            "registry_syncs_total",
            "Total number of sync operations attempted.",
            snap.syncs_total,
        );
        counter(
            &mut out,
            "registry_sync_errors_total",
            "Total number of sync errors.",
            snap.sync_errors_total,
        );
        counter(
            &mut out,
            "registry_webhooks_received_total",
            "Total number of webhook deliveries received.",
            snap.webhooks_received_total,
        );
        counter(
            &mut out,
            "registry_webhooks_ignored_total",
            "Total number of webhook deliveries ignored.",
            snap.webhooks_ignored_total,
        );
        counter(
            &mut out,
            "registry_cache_hits_total",
            "Total number of manifest cache hits.",
            gauges.cache_hits,
        );
        counter(
            &mut out,
            "registry_cache_misses_total",
            "Total number of manifest cache misses.",
            gauges.cache_misses,
        );

        gauge(
            &mut out,
            "registry_servers_total",
            "Number of servers in the current index.",
            gauges.servers_total as u64,
        );
        gauge(
            &mut out,
            "registry_cache_size",
            "Current number of cached manifests.",
            gauges.cache_size as u64,
        );
        gauge(
            &mut out,
            "registry_cache_capacity",
            "Manifest cache capacity.",
            gauges.cache_capacity as u64,
        );
        gauge(
            &mut out,
            "registry_index_valid",
            "Whether the index is loaded and valid (1) or not (0).",
            u64::from(gauges.index_valid),
        );

        let _ = writeln!(out, "# HELP http_requests_total Total number of HTTP requests.");
        let _ = writeln!(out, "# TYPE http_requests_total counter");
        let mut requests: Vec<(String, u64)> = self
            .http_requests
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();
        requests.sort();
        for (labels, value) in requests {
            let _ = writeln!(out, "http_requests_total{{{labels}}} {value}");
        }

        out
    }
}

impl Default for RegistryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub syncs_total: u64,
    pub sync_errors_total: u64,
    pub webhooks_received_total: u64,
    pub webhooks_ignored_total: u64,
}

/// Catalog state sampled at exposition time.
#[derive(Debug, Clone, Default)]
pub struct CatalogGauges {
    pub servers_total: usize,
    pub cache_size: usize,
    pub cache_capacity: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub index_valid: bool,
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} counter");
    let _ = writeln!(out, "{name} {value}");
}

fn gauge(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
    let _ = writeln!(out, "{name} {value}");
}

/// Collapse dynamic path segments into route templates so metric label
/// cardinality stays bounded.
pub fn normalize_path(path: &str) -> String {
    for prefix in ["/v0.1/servers/", "/v0/servers/"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            if rest.is_empty() {
                break;
            }
            if rest.contains("/versions/") {
                return format!("{prefix}{{name}}/versions/{{version}}");
            }
            if rest.ends_with("/versions") {
                return format!("{prefix}{{name}}/versions");
            }
            return format!("{prefix}{{name}}");
        }
    }
    path.to_string()
}
