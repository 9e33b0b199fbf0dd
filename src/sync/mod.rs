pub mod engine;
pub mod fetch;
pub mod overrides;
pub mod plan;
pub mod state;

pub use engine::SyncEngine;
pub use fetch::{cdn_fallback_url, ArtifactFetcher, FetchSummary};
pub use overrides::{ExtractSummary, OverrideExtractor, ProtectedPaths, RetryPolicy};
pub use plan::{plan_sync, SyncPlan, DISABLED_SUFFIX};
pub use state::{
    cached_manifest_info, InstallStateStore, ManifestInfo, INSTALLED_FILES_FILE,
    MANIFEST_INFO_FILE,
};
