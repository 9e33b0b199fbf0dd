// ─── Install state persistence ───
// Two sidecar documents per instance: the set of filenames the engine
// itself installed (the only durable memory used for safe deletion) and a
// manifest summary for offline launches. Both read-repair to defaults —
// corruption degrades to "re-sync everything", never to a crash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{SyncError, SyncResult};
use crate::manifest::{LoaderType, ManifestDescriptor};

pub const INSTALLED_FILES_FILE: &str = "installed_files.json";
pub const MANIFEST_INFO_FILE: &str = "manifest_info.json";

/// Summary of the installed manifest, persisted beside the instance so a
/// later launch can skip the pipeline or proceed offline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManifestInfo {
    pub minecraft_version: String,
    /// Raw loader id, e.g. "neoforge-21.1.90".
    pub loader_id: String,
    pub loader: LoaderType,
    pub mod_count: usize,
    /// Remote file id of the installed pack version; 0 when unknown.
    pub file_id: u32,
    pub pack_name: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl ManifestInfo {
    pub fn from_descriptor(descriptor: &ManifestDescriptor, file_id: Option<u32>) -> Self {
        Self {
            minecraft_version: descriptor.minecraft_version.clone(),
            loader_id: descriptor.loader_id.clone(),
            loader: descriptor.loader,
            mod_count: descriptor.files.len(),
            file_id: file_id.unwrap_or(0),
            pack_name: descriptor.name.clone(),
            installed_at: Utc::now(),
        }
    }
}

/// Persistence for the two per-instance sidecar documents.
pub struct InstallStateStore {
    installed_path: PathBuf,
    info_path: PathBuf,
}

impl InstallStateStore {
    pub fn new(instance_dir: &Path) -> Self {
        Self {
            installed_path: instance_dir.join(INSTALLED_FILES_FILE),
            info_path: instance_dir.join(MANIFEST_INFO_FILE),
        }
    }

    /// Filenames installed by the previous run. Missing or corrupt state
    /// reads as empty — nothing gets deleted that a healthy state file
    /// would not have allowed.
    pub async fn load_installed(&self) -> HashSet<String> {
        let raw = match tokio::fs::read_to_string(&self.installed_path).await {
            Ok(raw) => raw,
            Err(_) => return HashSet::new(),
        };
        match serde_json::from_str(&raw) {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    "Corrupt {:?}, treating as empty: {}",
                    self.installed_path, err
                );
                HashSet::new()
            }
        }
    }

    /// Replace the tracked set wholesale with the current declared names.
    pub async fn save_installed(&self, names: &HashSet<String>) -> SyncResult<()> {
        // Sorted on disk so consecutive runs produce identical bytes.
        let sorted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        let json = serde_json::to_string_pretty(&sorted)?;
        tokio::fs::write(&self.installed_path, json)
            .await
            .map_err(|source| SyncError::Io {
                path: self.installed_path.clone(),
                source,
            })
    }

    /// Cached summary from the last run, if any survives parsing.
    pub async fn load_manifest_info(&self) -> Option<ManifestInfo> {
        let raw = tokio::fs::read_to_string(&self.info_path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!("Corrupt {:?}, ignoring: {}", self.info_path, err);
                None
            }
        }
    }

    pub async fn save_manifest_info(&self, info: &ManifestInfo) -> SyncResult<()> {
        let json = serde_json::to_string_pretty(info)?;
        tokio::fs::write(&self.info_path, json)
            .await
            .map_err(|source| SyncError::Io {
                path: self.info_path.clone(),
                source,
            })
    }
}

/// Convenience for the launch path: cached summary without constructing a
/// store first.
pub async fn cached_manifest_info(instance_dir: &Path) -> Option<ManifestInfo> {
    InstallStateStore::new(instance_dir).load_manifest_info().await
}
