//! Wire types: manifests, the index, API responses, and shape validation.

mod index;
mod responses;
mod server;
pub mod validation;

pub use index::{Index, IndexEntry};
pub use responses::{
    CacheStats, ErrorDetail, ErrorResponse, HealthResponse, ListMetadata, NotImplementedResponse,
    OfficialMeta, PingResponse, ServerListResponse, ServerMeta, ServerResponse,
    ServerVersionsResponse, VersionEntry, VersionResponse,
};
pub use server::{
    Argument, ArgumentKind, KeyValueInput, PackageBinding, RegistryType, RemoteBinding,
    Repository, RepositorySource, RuntimeHint, ServerManifest, Transport,
};
