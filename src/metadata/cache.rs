// ─── Mod metadata sidecar ───
// Human-readable mod metadata persisted beside the instance, keyed by
// filename. The engine only writes this file; the mod-toggling feature of
// the shell reads it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{SyncError, SyncResult};

pub const MOD_METADATA_FILE: &str = "mods_metadata.json";

/// One cached record. Field casing matches the sidecar wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModMetadata {
    pub file_name: String,
    pub name: String,
    pub slug: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Load-merge-save cache over `mods_metadata.json`.
pub struct ModMetadataCache {
    path: PathBuf,
}

impl ModMetadataCache {
    pub fn new(instance_dir: &Path) -> Self {
        Self {
            path: instance_dir.join(MOD_METADATA_FILE),
        }
    }

    /// Read the current records. A missing or corrupt file reads as empty.
    pub async fn load(&self) -> Vec<ModMetadata> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("Corrupt {:?}, starting fresh: {}", self.path, err);
                Vec::new()
            }
        }
    }

    /// Merge `records` in, replacing any existing entry with the same
    /// filename, and persist the result.
    pub async fn upsert(&self, records: Vec<ModMetadata>) -> SyncResult<()> {
        let mut merged = self.load().await;
        for record in records {
            merged.retain(|existing| existing.file_name != record.file_name);
            merged.push(record);
        }

        let json = serde_json::to_string_pretty(&merged)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|source| SyncError::Io {
                path: self.path.clone(),
                source,
            })
    }
}
