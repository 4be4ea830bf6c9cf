//! Working-copy store: the on-disk shallow clone of the upstream repository.
//!
//! All mutating operations (`clone_repo`, `fetch`) serialize on the write
//! half of an async lock; reads take the shared half and observe a single
//! consistent HEAD. git2 calls run on the blocking pool, bounded by an
//! explicit deadline.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use git2::Repository;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{RegistryError, RegistryResult},
    github::TokenProvider,
    metrics::RegistryMetrics,
};

const RETRY_BASE_BACKOFF: Duration = Duration::from_secs(1);
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub repo_url: String,
    pub branch: String,
    pub local_path: PathBuf,
    /// Shallow clone depth; 0 fetches full history (used with local fixtures).
    pub clone_depth: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            repo_url: String::new(),
            branch: "main".to_string(),
            local_path: PathBuf::new(),
            clone_depth: 1,
        }
    }
}

#[derive(Default)]
struct StoreState {
    /// Current HEAD SHA; `None` until the initial clone succeeds.
    head: Option<String>,
}

pub struct GitStore {
    cfg: StoreConfig,
    auth: Option<Arc<dyn TokenProvider>>,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("cfg", &self.cfg)
            .field("has_auth", &self.auth.is_some())
            .finish_non_exhaustive()
    }
}

impl GitStore {
    pub fn new(cfg: StoreConfig, auth: Option<Arc<dyn TokenProvider>>) -> RegistryResult<Self> {
        if cfg.repo_url.is_empty() {
            return Err(RegistryError::Config("repo URL is required".to_string()));
        }
        if cfg.local_path.as_os_str().is_empty() {
            return Err(RegistryError::Config("local path is required".to_string()));
        }
        let mut cfg = cfg;
        if cfg.branch.is_empty() {
            cfg.branch = "main".to_string();
        }

        Ok(Self {
            cfg,
            auth,
            state: RwLock::new(StoreState::default()),
        })
    }

    /// Perform the initial clone: remove any prior directory, create the
    /// parent, and shallow-clone the tracked branch. Must succeed once before
    /// any other operation.
    pub async fn clone_repo(&self, deadline: Duration) -> RegistryResult<()> {
        let mut state = self.state.write().await;

        let token = self.acquire_token().await?;
        let cfg = self.cfg.clone();
        info!(url = %cfg.repo_url, branch = %cfg.branch, path = %cfg.local_path.display(), "cloning repository");

        let head = run_blocking(deadline, "clone", move || clone_blocking(&cfg, token)).await?;

        info!(commit = %head, "clone completed");
        state.head = Some(head);
        Ok(())
    }

    /// Pull the tracked branch with force semantics, so upstream history
    /// rewrites never wedge the clone. Returns whether HEAD changed; an
    /// already-up-to-date upstream returns `false` without mutating state.
    pub async fn fetch(&self, deadline: Duration) -> RegistryResult<bool> {
        let mut state = self.state.write().await;

        let old_head = state
            .head
            .clone()
            .ok_or_else(|| RegistryError::Upstream("repository not initialized".to_string()))?;

        let token = self.acquire_token().await?;
        let cfg = self.cfg.clone();
        let new_head = run_blocking(deadline, "fetch", move || fetch_blocking(&cfg, token)).await?;

        let changed = new_head != old_head;
        if changed {
            info!(old_commit = %old_head, new_commit = %new_head, "repository updated");
            state.head = Some(new_head);
        }
        Ok(changed)
    }

    /// Fetch with bounded retries and exponential backoff (1s doubling,
    /// capped at 30s). Each failed attempt is counted as a sync error; the
    /// shutdown signal aborts the backoff wait.
    pub async fn fetch_with_retry(
        &self,
        deadline: Duration,
        max_attempts: u32,
        metrics: &RegistryMetrics,
        shutdown: &mut watch::Receiver<()>,
    ) -> RegistryResult<bool> {
        let mut backoff = RETRY_BASE_BACKOFF;
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            match self.fetch(deadline).await {
                Ok(changed) => return Ok(changed),
                Err(err) => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %err,
                        next_backoff = ?backoff,
                        "fetch attempt failed"
                    );
                    metrics.record_sync_error();
                    last_err = Some(err);
                }
            }

            if attempt == max_attempts {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    return Err(RegistryError::Deadline(
                        "shutdown during fetch retry".to_string(),
                    ));
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
        }

        Err(last_err
            .unwrap_or_else(|| RegistryError::Upstream("fetch failed without attempts".to_string())))
    }

    /// Read a file relative to the working copy at the current HEAD.
    pub async fn read(&self, path: &str) -> RegistryResult<Vec<u8>> {
        let state = self.state.read().await;
        self.ensure_initialized(&state)?;

        let full_path = self.cfg.local_path.join(sanitize_rel_path(path)?);
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(RegistryError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Enumerate every blob under `prefix` at the current HEAD, invoking the
    /// visitor with (repo-relative path, content). An error from the visitor
    /// aborts the walk and is propagated. Ordering is not guaranteed.
    pub async fn walk<F>(&self, prefix: &str, mut visit: F) -> RegistryResult<()>
    where
        F: FnMut(&str, &[u8]) -> RegistryResult<()>,
    {
        let state = self.state.read().await;
        self.ensure_initialized(&state)?;

        let cfg = self.cfg.clone();
        let prefix = prefix.to_string();
        let files = tokio::task::spawn_blocking(move || walk_blocking(&cfg, &prefix))
            .await
            .map_err(|err| RegistryError::Upstream(format!("walk task failed: {err}")))??;

        for (path, content) in &files {
            visit(path, content)?;
        }
        Ok(())
    }

    /// Whether `path` exists in the working copy.
    pub async fn file_exists(&self, path: &str) -> bool {
        let state = self.state.read().await;
        if state.head.is_none() {
            return false;
        }
        match sanitize_rel_path(path) {
            Ok(rel) => tokio::fs::try_exists(self.cfg.local_path.join(rel))
                .await
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Plain (non-recursive) file listing of a working-copy directory.
    pub async fn list_files(&self, dir: &str) -> RegistryResult<Vec<String>> {
        let state = self.state.read().await;
        self.ensure_initialized(&state)?;

        let full_path = self.cfg.local_path.join(sanitize_rel_path(dir)?);
        let mut entries = tokio::fs::read_dir(&full_path).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(files)
    }

    /// Current HEAD SHA, or empty before the initial clone.
    pub async fn head(&self) -> String {
        self.state.read().await.head.clone().unwrap_or_default()
    }

    pub fn repo_url(&self) -> &str {
        &self.cfg.repo_url
    }

    pub fn branch(&self) -> &str {
        &self.cfg.branch
    }

    fn ensure_initialized(&self, state: &StoreState) -> RegistryResult<()> {
        if state.head.is_none() {
            return Err(RegistryError::Upstream(
                "repository not initialized".to_string(),
            ));
        }
        Ok(())
    }

    async fn acquire_token(&self) -> RegistryResult<Option<String>> {
        match &self.auth {
            Some(provider) => Ok(Some(provider.token().await?)),
            None => Ok(None),
        }
    }
}

/// Run a blocking git operation on the blocking pool under a deadline. The
/// task keeps running past the deadline, but its result is discarded.
async fn run_blocking<T, F>(deadline: Duration, op: &str, f: F) -> RegistryResult<T>
where
    F: FnOnce() -> RegistryResult<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(deadline, handle).await {
        Err(_) => Err(RegistryError::Deadline(format!(
            "{op} did not complete within {deadline:?}"
        ))),
        Ok(Err(join_err)) => Err(RegistryError::Upstream(format!(
            "{op} task failed: {join_err}"
        ))),
        Ok(Ok(result)) => result,
    }
}

fn clone_blocking(cfg: &StoreConfig, token: Option<String>) -> RegistryResult<String> {
    if let Some(parent) = cfg.local_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if cfg.local_path.exists() {
        std::fs::remove_dir_all(&cfg.local_path)?;
    }

    let repo = git2::build::RepoBuilder::new()
        .branch(&cfg.branch)
        .fetch_options(fetch_options(cfg, token))
        .clone(&cfg.repo_url, &cfg.local_path)?;

    current_head(&repo)
}

fn fetch_blocking(cfg: &StoreConfig, token: Option<String>) -> RegistryResult<String> {
    let repo = Repository::open(&cfg.local_path)?;

    {
        let mut remote = repo.find_remote("origin")?;
        let mut opts = fetch_options(cfg, token);
        remote.fetch(&[cfg.branch.as_str()], Some(&mut opts), None)?;
    }

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = fetch_head.peel_to_commit()?;
    let head_commit = repo.head()?.peel_to_commit()?;

    if fetch_commit.id() == head_commit.id() {
        debug!(commit = %head_commit.id(), "already up to date");
        return Ok(head_commit.id().to_string());
    }

    // Force-move the branch ref to the fetched commit instead of merging;
    // a rewritten upstream must never leave the clone unable to advance.
    let refname = format!("refs/heads/{}", cfg.branch);
    repo.reference(&refname, fetch_commit.id(), true, "fetch: forced update")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;

    Ok(fetch_commit.id().to_string())
}

fn walk_blocking(cfg: &StoreConfig, prefix: &str) -> RegistryResult<Vec<(String, Vec<u8>)>> {
    let repo = Repository::open(&cfg.local_path)?;
    let tree = repo.head()?.peel_to_commit()?.tree()?;

    let mut files = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            let path = format!("{}{}", root, entry.name().unwrap_or(""));
            if prefix.is_empty() || path.starts_with(prefix) {
                if let Ok(object) = entry.to_object(&repo) {
                    if let Some(blob) = object.as_blob() {
                        files.push((path, blob.content().to_vec()));
                    }
                }
            }
        }
        git2::TreeWalkResult::Ok
    })?;

    Ok(files)
}

fn fetch_options(cfg: &StoreConfig, token: Option<String>) -> git2::FetchOptions<'static> {
    let mut opts = git2::FetchOptions::new();
    if let Some(token) = token {
        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |_url, _username, _allowed| {
            git2::Cred::userpass_plaintext("x-access-token", &token)
        });
        opts.remote_callbacks(callbacks);
    }
    if cfg.clone_depth > 0 {
        opts.depth(cfg.clone_depth);
    }
    opts
}

fn current_head(repo: &Repository) -> RegistryResult<String> {
    Ok(repo.head()?.peel_to_commit()?.id().to_string())
}

/// Index paths are repo-relative and forward-slash; anything absolute or
/// escaping the working copy is rejected.
fn sanitize_rel_path(path: &str) -> RegistryResult<PathBuf> {
    let rel = Path::new(path);
    if rel.is_absolute()
        || rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(RegistryError::Validation(format!(
            "illegal repository path: {path}"
        )));
    }
    Ok(rel.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_rel_path() {
        assert!(sanitize_rel_path("index.yaml").is_ok());
        assert!(sanitize_rel_path("servers/demo.yaml").is_ok());
        assert!(sanitize_rel_path("../outside").is_err());
        assert!(sanitize_rel_path("servers/../../etc/passwd").is_err());
        assert!(sanitize_rel_path("/etc/passwd").is_err());
    }

    #[test]
    fn test_new_requires_url_and_path() {
        let err = GitStore::new(StoreConfig::default(), None).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));

        let err = GitStore::new(
            StoreConfig {
                repo_url: "https://example.com/repo.git".to_string(),
                local_path: PathBuf::new(),
                ..StoreConfig::default()
            },
            None,
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn test_empty_branch_defaults_to_main() {
        let store = GitStore::new(
            StoreConfig {
                repo_url: "https://example.com/repo.git".to_string(),
                branch: String::new(),
                local_path: PathBuf::from("/tmp/registry-data"),
                clone_depth: 1,
            },
            None,
        )
        .unwrap();
        assert_eq!(store.branch(), "main");
    }
}
