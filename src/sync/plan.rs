// ─── Diff planning ───
// Three-way diff between the declared file set, what is on disk, and what
// the engine itself installed previously. Produces a plan of downloads and
// deletions; executing it is the engine's job.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::manifest::{FileCategory, FileRef};

/// Suffix users append to park a file without removing it.
pub const DISABLED_SUFFIX: &str = ".disabled";

#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Declared files absent on disk in both enabled and disabled form.
    pub downloads: Vec<FileRef>,
    /// On-disk files we previously installed that are no longer declared.
    pub deletions: Vec<PathBuf>,
    /// Declared files already present; downloads skipped for idempotence.
    pub kept: usize,
}

impl SyncPlan {
    /// True when a run would not touch the disk at all.
    pub fn is_noop(&self) -> bool {
        self.downloads.is_empty() && self.deletions.is_empty()
    }
}

/// Compute the plan for one synchronization run.
///
/// Deletion rule: an on-disk file in a managed directory is deleted only
/// when its de-suffixed name is missing from the declared set AND present
/// in `previously_installed` — anything we did not put there is
/// user-owned and stays, whatever the manifest says.
pub async fn plan_sync(
    instance_dir: &Path,
    declared: &[FileRef],
    previously_installed: &HashSet<String>,
) -> SyncResult<SyncPlan> {
    let declared_names: HashSet<&str> = declared.iter().map(|file| file.filename.as_str()).collect();

    let mut plan = SyncPlan::default();

    for category in FileCategory::all() {
        let dir = instance_dir.join(category.dir());
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            continue;
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|source| SyncError::Io {
                path: dir.clone(),
                source,
            })?;

        while let Some(entry) = entries.next_entry().await.map_err(|source| SyncError::Io {
            path: dir.clone(),
            source,
        })? {
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let pure_name = name.strip_suffix(DISABLED_SUFFIX).unwrap_or(&name);

            if !declared_names.contains(pure_name) && previously_installed.contains(pure_name) {
                plan.deletions.push(path);
            }
        }
    }

    for file in declared {
        let target = file.install_path(instance_dir);
        let disabled = disabled_variant(&target);
        let present = tokio::fs::try_exists(&target).await.unwrap_or(false)
            || tokio::fs::try_exists(&disabled).await.unwrap_or(false);
        if present {
            plan.kept += 1;
        } else {
            plan.downloads.push(file.clone());
        }
    }

    debug!(
        "Planned sync: {} downloads, {} deletions, {} kept",
        plan.downloads.len(),
        plan.deletions.len(),
        plan.kept
    );
    Ok(plan)
}

fn disabled_variant(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(DISABLED_SUFFIX);
    path.with_file_name(name)
}
