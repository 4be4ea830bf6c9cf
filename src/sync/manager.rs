//! Sync controller: keeps the working copy and the catalog converged to
//! upstream HEAD with bounded latency and bounded load.
//!
//! One cooperative task owns both inputs — the poll ticker and the
//! single-slot trigger channel — so at most one sync is ever in flight.
//! Trigger-initiated syncs are debounced; trigger emission never blocks.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::{catalog::Catalog, gitstore::GitStore, metrics::RegistryMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    Poll,
    Webhook,
}

impl fmt::Display for SyncSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncSource::Poll => write!(f, "poll"),
            SyncSource::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Minimum interval between two trigger-initiated syncs.
    pub debounce: Duration,
    /// Deadline for a single fetch attempt.
    pub fetch_deadline: Duration,
    pub max_fetch_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5 * 60),
            debounce: Duration::from_secs(10),
            fetch_deadline: Duration::from_secs(5 * 60),
            max_fetch_attempts: 3,
        }
    }
}

/// Non-blocking handle for requesting a sync. The channel holds one slot;
/// when a sync is already pending, additional triggers are dropped — the
/// pending sync observes the latest upstream state anyway.
#[derive(Clone)]
pub struct SyncTrigger {
    tx: mpsc::Sender<SyncSource>,
}

impl SyncTrigger {
    /// Create a trigger and its receiving half. `SyncManager::new` wires the
    /// receiver into the controller; tests may consume it directly.
    pub fn channel() -> (Self, mpsc::Receiver<SyncSource>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn trigger(&self) {
        match self.tx.try_send(SyncSource::Webhook) {
            Ok(()) => debug!("sync triggered"),
            Err(mpsc::error::TrySendError::Full(_)) => debug!("sync already pending"),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("sync controller stopped; trigger dropped")
            }
        }
    }
}

pub struct SyncManager {
    store: Arc<GitStore>,
    catalog: Arc<Catalog>,
    metrics: Arc<RegistryMetrics>,
    cfg: SyncConfig,
    trigger_rx: mpsc::Receiver<SyncSource>,
    last_sync: Option<Instant>,
    in_flight: bool,
}

impl SyncManager {
    pub fn new(
        store: Arc<GitStore>,
        catalog: Arc<Catalog>,
        metrics: Arc<RegistryMetrics>,
        cfg: SyncConfig,
    ) -> (Self, SyncTrigger) {
        let mut cfg = cfg;
        if cfg.poll_interval.is_zero() {
            cfg.poll_interval = SyncConfig::default().poll_interval;
        }
        if cfg.fetch_deadline.is_zero() {
            cfg.fetch_deadline = cfg.poll_interval;
        }
        if cfg.max_fetch_attempts == 0 {
            cfg.max_fetch_attempts = 1;
        }

        let (trigger, trigger_rx) = SyncTrigger::channel();
        (
            Self {
                store,
                catalog,
                metrics,
                cfg,
                trigger_rx,
                last_sync: None,
                in_flight: false,
            },
            trigger,
        )
    }

    /// Run until the shutdown signal fires. Cancellation is honored at every
    /// suspension point: ticker, trigger receive, and retry backoff.
    pub async fn run(mut self, mut shutdown: watch::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.cfg.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial load already
        // happened at startup, so swallow it.
        ticker.tick().await;

        info!(
            poll_interval = ?self.cfg.poll_interval,
            debounce = ?self.cfg.debounce,
            "sync controller started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("sync controller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.do_sync(SyncSource::Poll, &mut shutdown).await;
                }
                // A closed channel disables this branch; polling still works.
                Some(source) = self.trigger_rx.recv() => {
                    if self.debounced() {
                        debug!("sync debounced");
                        continue;
                    }
                    self.do_sync(source, &mut shutdown).await;
                }
            }
        }
    }

    fn debounced(&self) -> bool {
        matches!(self.last_sync, Some(at) if at.elapsed() < self.cfg.debounce)
    }

    async fn do_sync(&mut self, source: SyncSource, shutdown: &mut watch::Receiver<()>) {
        if self.in_flight {
            debug!(%source, "sync already in progress");
            return;
        }
        self.in_flight = true;

        let started = Instant::now();
        info!(%source, "starting sync");

        let fetched = self
            .store
            .fetch_with_retry(
                self.cfg.fetch_deadline,
                self.cfg.max_fetch_attempts,
                &self.metrics,
                shutdown,
            )
            .await;

        match fetched {
            Err(err) => {
                // last_sync is deliberately not advanced on failure.
                error!(%source, error = %err, elapsed = ?started.elapsed(), "sync failed");
            }
            Ok(false) => {
                debug!(%source, "no changes detected");
                self.last_sync = Some(Instant::now());
            }
            Ok(true) => {
                // The working copy is not rolled back on refresh failure:
                // serving UNAVAILABLE beats serving cached data that no
                // longer matches HEAD.
                if let Err(err) = self.catalog.refresh().await {
                    error!(%source, error = %err, "catalog refresh failed after fetch");
                    self.metrics.record_sync_error();
                } else {
                    let head = self.store.head().await;
                    info!(
                        %source,
                        commit = %head,
                        server_count = self.catalog.server_count(),
                        elapsed = ?started.elapsed(),
                        "sync completed"
                    );
                }
                self.last_sync = Some(Instant::now());
            }
        }

        self.metrics.record_sync();
        self.in_flight = false;
    }
}
