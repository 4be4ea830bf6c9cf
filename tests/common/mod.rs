//! Shared fixtures: a local upstream repository authored with git2, a store
//! cloned from it, and an in-process router.
#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use git2::Repository;
use tempfile::TempDir;
use tokio::sync::mpsc;

use mcp_registry::{
    catalog::Catalog,
    gitstore::{GitStore, StoreConfig},
    metrics::RegistryMetrics,
    server::{build_router, AppState},
    sync::{SyncSource, SyncTrigger},
};

pub const WEBHOOK_SECRET: &str = "s3cret";

pub const INDEX_ONE_SERVER: &str = r#"version: "1"
commit: 0123456789abcdef0123456789abcdef01234567
updated_at: "2025-06-01T12:00:00Z"
servers:
  - name: io.example/demo
    path: servers/demo.yaml
    description: Demo server
    version: 1.0.0
"#;

pub const DEMO_MANIFEST: &str = r#"$schema: https://example.com/server.schema.json
name: io.example/demo
description: Demo server
version: 1.0.0
packages:
  - registryType: npm
    identifier: "@example/demo"
    version: 1.0.0
    transport:
      type: stdio
"#;

/// A bare-bones upstream the store can clone from and fetch against.
pub struct UpstreamRepo {
    pub dir: TempDir,
}

impl UpstreamRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = git2::RepositoryInitOptions::new();
        opts.initial_head("refs/heads/main");
        Repository::init_opts(dir.path(), &opts).unwrap();
        Self { dir }
    }

    /// Local-path clone URL.
    pub fn url(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    /// Write the given files and commit everything, returning the new SHA.
    pub fn commit_files(&self, files: &[(&str, &str)], message: &str) -> String {
        let repo = Repository::open(self.dir.path()).unwrap();
        for (path, content) in files {
            let full = self.dir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"], git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let signature = git2::Signature::now("registry-test", "registry-test@example.com").unwrap();
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap();
        oid.to_string()
    }

    /// Hard-reset the upstream branch to `sha`, simulating a history rewrite.
    pub fn reset_hard(&self, sha: &str) {
        let repo = Repository::open(self.dir.path()).unwrap();
        let oid = git2::Oid::from_str(sha).unwrap();
        let object = repo.find_object(oid, None).unwrap();
        repo.reset(&object, git2::ResetType::Hard, None).unwrap();
    }

    /// One server: `io.example/demo` at `servers/demo.yaml`.
    pub fn seed_one_server(&self) -> String {
        self.commit_files(
            &[
                ("index.yaml", INDEX_ONE_SERVER),
                ("servers/demo.yaml", DEMO_MANIFEST),
            ],
            "seed registry",
        )
    }
}

/// Clone a store from the upstream; depth 0 because local fixtures carry
/// full history.
pub async fn cloned_store(upstream: &UpstreamRepo) -> (TempDir, Arc<GitStore>) {
    let data = TempDir::new().unwrap();
    let store = GitStore::new(
        StoreConfig {
            repo_url: upstream.url(),
            branch: "main".to_string(),
            local_path: data.path().join("clone"),
            clone_depth: 0,
        },
        None,
    )
    .unwrap();
    store.clone_repo(Duration::from_secs(30)).await.unwrap();
    (data, Arc::new(store))
}

pub struct TestApp {
    pub app: axum::Router,
    pub catalog: Arc<Catalog>,
    pub store: Arc<GitStore>,
    pub metrics: Arc<RegistryMetrics>,
    /// Receiving half of the trigger channel; the sync controller is not
    /// running, so tests assert emission directly.
    pub trigger_rx: mpsc::Receiver<SyncSource>,
    data: TempDir,
}

/// Router over a cloned store with the index loaded.
pub async fn test_app(upstream: &UpstreamRepo) -> TestApp {
    let app = test_app_without_index(upstream).await;
    app.catalog.load_index().await.unwrap();
    app
}

/// Router over a cloned store whose index was never loaded (degraded mode).
pub async fn test_app_without_index(upstream: &UpstreamRepo) -> TestApp {
    let (data, store) = cloned_store(upstream).await;
    let catalog = Arc::new(Catalog::new(store.clone(), 100));
    let metrics = Arc::new(RegistryMetrics::new());
    let (trigger, trigger_rx) = SyncTrigger::channel();

    let app = build_router(AppState {
        catalog: catalog.clone(),
        store: store.clone(),
        trigger,
        metrics: metrics.clone(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
        branch: "main".to_string(),
    });

    TestApp {
        app,
        catalog,
        store,
        metrics,
        trigger_rx,
        data,
    }
}

/// `sha256=<hex>` signature for a webhook body.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha2::Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
