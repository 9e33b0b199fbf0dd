// ─── packsync ───
// Modpack synchronization engine: reconciles a declarative pack archive
// against a mutable instance directory.
//
// Architecture:
//   error      — central SyncError enum
//   events     — one-way event stream (phase / status / progress / file)
//   http       — shared reqwest client construction
//   manifest/  — format detection + CurseForge/Modrinth schema parsing
//   metadata/  — remote batch lookups, category mapping, metadata sidecar
//   sync/      — diff planning, downloads, override extraction, state,
//                and the orchestrating engine

pub mod error;
pub mod events;
pub mod http;
pub mod manifest;
pub mod metadata;
pub mod sync;

pub use error::{SyncError, SyncResult};
pub use events::{EventSink, FileAction, FileEvent, SyncEvent, SyncPhase};
pub use http::build_http_client;
pub use manifest::{
    DeclaredFiles, FileCategory, FileRef, LoaderType, ManifestDescriptor, PackFormat,
};
pub use metadata::{CurseMetadataClient, MetadataService};
pub use sync::{
    cached_manifest_info, InstallStateStore, ManifestInfo, ProtectedPaths, RetryPolicy,
    SyncEngine,
};
