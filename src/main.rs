use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mcp_registry::{
    catalog::Catalog,
    config::Config,
    github::{AppAuth, TokenProvider},
    gitstore::{GitStore, StoreConfig},
    metrics::RegistryMetrics,
    server::{build_router, AppState},
    sync::{SyncConfig, SyncManager},
    version,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!(error = format!("{err:#}"), "registry failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = Config::from_env().context("failed to load configuration")?;

    info!(
        version = %version::version_string(),
        repo_url = %cfg.repo_url,
        branch = %cfg.branch,
        clone_timeout = ?cfg.clone_timeout,
        poll_interval = ?cfg.poll_interval,
        cache_size = cfg.cache_size,
        "starting registry"
    );
    if let Some(endpoint) = &cfg.otlp_endpoint {
        info!(%endpoint, "OTLP endpoint configured; export is handled by the collector sidecar");
    }

    let auth: Arc<dyn TokenProvider> = Arc::new(
        AppAuth::new(
            cfg.github_app_id,
            cfg.github_installation_id,
            &cfg.github_private_key,
        )
        .context("failed to initialize GitHub App auth")?,
    );

    let store = Arc::new(
        GitStore::new(
            StoreConfig {
                repo_url: cfg.repo_url.clone(),
                branch: cfg.branch.clone(),
                local_path: cfg.data_path.clone(),
                clone_depth: 1,
            },
            Some(auth),
        )
        .context("failed to create git store")?,
    );

    info!(timeout = ?cfg.clone_timeout, "cloning registry repository");
    store
        .clone_repo(cfg.clone_timeout)
        .await
        .context("failed to clone repository")?;
    info!(commit = %store.head().await, "repository cloned");

    let catalog = Arc::new(Catalog::new(store.clone(), cfg.cache_size));
    catalog
        .load_index()
        .await
        .context("failed to load index.yaml (the publishing workflow generates it on merge)")?;
    info!(server_count = catalog.server_count(), "index loaded");

    let metrics = Arc::new(RegistryMetrics::new());

    let (manager, trigger) = SyncManager::new(
        store.clone(),
        catalog.clone(),
        metrics.clone(),
        SyncConfig {
            poll_interval: cfg.poll_interval,
            fetch_deadline: cfg.poll_interval,
            ..SyncConfig::default()
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let sync_task = tokio::spawn(manager.run(shutdown_rx));

    let app = build_router(AppState {
        catalog,
        store,
        trigger,
        metrics,
        webhook_secret: cfg.webhook_secret.clone(),
        branch: cfg.branch.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutting down");
    let _ = shutdown_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, sync_task).await.is_err() {
        warn!("sync controller did not stop within the shutdown grace period");
    }

    info!("server stopped gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
