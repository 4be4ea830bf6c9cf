//! Read-only GitOps registry for MCP server manifests.
//!
//! A versioned git repository is the source of truth; this service keeps a
//! local shallow clone in sync with the tracked branch (periodic polling
//! plus webhook triggers), loads the manifest index into memory, and serves
//! lookups from a bounded cache over a small HTTP API. All writes happen
//! out-of-band via pull requests.

pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod github;
pub mod gitstore;
pub mod metrics;
pub mod server;
pub mod sync;
pub mod version;
