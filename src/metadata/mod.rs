pub mod cache;
pub mod resolver;
pub mod service;

pub use cache::{ModMetadata, ModMetadataCache, MOD_METADATA_FILE};
pub use resolver::resolve_declared;
pub use service::{CurseMetadataClient, MetadataService, ProjectInfo, ResolvedFile};
