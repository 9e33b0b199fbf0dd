// ─── Remote metadata service ───
// Interface boundary to the modpack-metadata backend: two batch lookups,
// one for file descriptors and one for owning projects. Everything the
// engine consumes from the wire is listed here; the rest of the API is
// out of scope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

const DEFAULT_BASE_URL: &str = "https://api.curseforge.com";

/// One resolved remote file, as returned by the batch file lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedFile {
    pub id: u32,
    #[serde(rename = "modId")]
    pub mod_id: u32,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(rename = "downloadUrl")]
    pub download_url: Option<String>,
    #[serde(default)]
    pub hashes: Vec<WireHash>,
}

/// Digest entry on a resolved file. `algo`: 1 = SHA-1, 2 = MD5.
#[derive(Debug, Clone, Deserialize)]
pub struct WireHash {
    pub value: String,
    pub algo: u8,
}

/// One owning project, as returned by the batch project lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectInfo {
    pub id: u32,
    /// Site class: 12 = resource pack, 6552/4546 = shader pack.
    #[serde(rename = "classId")]
    pub class_id: Option<u32>,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub categories: Vec<ProjectCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectCategory {
    pub name: String,
}

/// Batch lookups against the remote metadata service.
///
/// The engine only ever talks to this trait; tests plug in an in-memory
/// fake instead of a live backend.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Resolve file ids to filenames, download URLs and digests.
    async fn resolve_files(&self, file_ids: &[u32]) -> SyncResult<Vec<ResolvedFile>>;

    /// Resolve project ids to class/category information.
    async fn resolve_projects(&self, project_ids: &[u32]) -> SyncResult<Vec<ProjectInfo>>;
}

#[derive(Serialize)]
struct FileIdsBody<'a> {
    #[serde(rename = "fileIds")]
    file_ids: &'a [u32],
}

#[derive(Serialize)]
struct ModIdsBody<'a> {
    #[serde(rename = "modIds")]
    mod_ids: &'a [u32],
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Vec<T>,
}

/// HTTP implementation of [`MetadataService`].
pub struct CurseMetadataClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CurseMetadataClient {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    /// Point the client at a different backend (mirrors, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_batch<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> SyncResult<Vec<T>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::MetadataResolution(format!(
                "metadata service returned HTTP {status} for {url}"
            )));
        }

        let envelope: DataEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl MetadataService for CurseMetadataClient {
    async fn resolve_files(&self, file_ids: &[u32]) -> SyncResult<Vec<ResolvedFile>> {
        self.post_batch("v1/mods/files", &FileIdsBody { file_ids })
            .await
    }

    async fn resolve_projects(&self, project_ids: &[u32]) -> SyncResult<Vec<ProjectInfo>> {
        self.post_batch("v1/mods", &ModIdsBody { mod_ids: project_ids })
            .await
    }
}
