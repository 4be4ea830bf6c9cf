//! Build metadata captured at compile time.
//!
//! `REGISTRY_GIT_COMMIT` and `REGISTRY_BUILD_TIME` are emitted by `build.rs`
//! and fall back to "unknown" outside a git checkout.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT: &str = env!("REGISTRY_GIT_COMMIT");
pub const BUILD_TIME: &str = env!("REGISTRY_BUILD_TIME");

/// Short version string for startup logging.
pub fn version_string() -> String {
    format!("{} {} ({})", env!("CARGO_PKG_NAME"), VERSION, GIT_COMMIT)
}
