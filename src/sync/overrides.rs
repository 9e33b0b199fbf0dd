// ─── Override extraction ───
// Copies the archive's override tree into the instance root. Protected
// paths that already exist on disk are preserved; everything else is
// overwritten so the pack stays authoritative. Writes that keep failing
// (typically a running game holding the file) are retried, then skipped —
// one locked log file must never abort the pass.

use std::io::{Read, Seek};
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, FileAction};
use crate::manifest::descriptor::clean_relative_path;

/// Relative paths whose existing on-disk content survives extraction.
///
/// Matching is over normalized paths: forward slashes, ASCII-lowercased.
#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        Self {
            exact: vec!["options.txt".to_string(), "servers.dat".to_string()],
            prefixes: vec!["saves/".to_string(), "shaderpacks/".to_string()],
        }
    }
}

impl ProtectedPaths {
    /// Custom rule set; entries are normalized like candidate paths.
    pub fn new(exact: Vec<String>, prefixes: Vec<String>) -> Self {
        Self {
            exact: exact.into_iter().map(|p| normalize(&p)).collect(),
            prefixes: prefixes.into_iter().map(|p| normalize(&p)).collect(),
        }
    }

    pub fn is_protected(&self, relative_path: &str) -> bool {
        let path = normalize(relative_path);
        self.exact.iter().any(|exact| path == *exact)
            || self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// Bounded retry for writes that hit a transiently locked target.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractSummary {
    pub extracted: usize,
    pub skipped: usize,
}

/// Walks the archive's override subtree and applies it to the instance.
pub struct OverrideExtractor {
    protected: ProtectedPaths,
    retry: RetryPolicy,
    events: EventSink,
    cancel: CancellationToken,
}

impl OverrideExtractor {
    pub fn new(events: EventSink, cancel: CancellationToken) -> Self {
        Self {
            protected: ProtectedPaths::default(),
            retry: RetryPolicy::default(),
            events,
            cancel,
        }
    }

    pub fn with_protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Extract every entry under `overrides_root + "/"` into the instance.
    ///
    /// Directory entries only ensure the target directory exists. The
    /// protected-path check runs before any write, never after.
    pub async fn extract<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        overrides_root: &str,
        instance_dir: &Path,
    ) -> SyncResult<ExtractSummary> {
        let root = overrides_root.replace('\\', "/");
        let prefix = format!("{}/", root.trim_end_matches('/'));

        enum Entry {
            Dir,
            File(Vec<u8>),
        }

        let mut summary = ExtractSummary::default();

        for index in 0..archive.len() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let (rel, kind) = {
                let mut entry = archive.by_index(index)?;
                let name = entry.name().replace('\\', "/");
                if name.len() < prefix.len()
                    || !name.is_char_boundary(prefix.len())
                    || !name[..prefix.len()].eq_ignore_ascii_case(&prefix)
                {
                    continue;
                }
                let rel = name[prefix.len()..].to_string();
                if rel.is_empty() {
                    continue;
                }
                if entry.is_dir() || name.ends_with('/') {
                    (rel, Entry::Dir)
                } else {
                    let mut data = Vec::with_capacity(entry.size() as usize);
                    entry.read_to_end(&mut data)?;
                    (rel, Entry::File(data))
                }
            };

            let Some(clean) = clean_relative_path(&rel) else {
                warn!("Ignoring override entry with unusable path: {rel}");
                continue;
            };
            let target = instance_dir.join(&clean);

            match kind {
                Entry::Dir => {
                    tokio::fs::create_dir_all(&target)
                        .await
                        .map_err(|source| SyncError::Io {
                            path: target.clone(),
                            source,
                        })?;
                }
                Entry::File(data) => {
                    if self.protected.is_protected(&rel)
                        && tokio::fs::try_exists(&target).await.unwrap_or(false)
                    {
                        debug!("Preserving protected path: {rel}");
                        self.events.file(&rel, FileAction::Preserved, None);
                        continue;
                    }

                    // Directory entry may be missing from the archive.
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|source| SyncError::Io {
                                path: parent.to_path_buf(),
                                source,
                            })?;
                    }

                    if self.write_with_retry(&target, &data, &rel).await {
                        self.events.file(&rel, FileAction::Extracted, None);
                        summary.extracted += 1;
                    } else {
                        summary.skipped += 1;
                    }
                }
            }
        }

        debug!(
            "Override pass done: {} extracted, {} skipped",
            summary.extracted, summary.skipped
        );
        Ok(summary)
    }

    /// True when the write eventually landed; false when the entry was
    /// given up on after `retry.max_attempts` attempts.
    async fn write_with_retry(&self, target: &Path, data: &[u8], rel: &str) -> bool {
        for attempt in 1..=self.retry.max_attempts {
            match write_file(target, data).await {
                Ok(()) => return true,
                Err(err) if attempt < self.retry.max_attempts => {
                    debug!(
                        "Write attempt {attempt} failed for {rel} ({err}), retrying in {:?}",
                        self.retry.backoff
                    );
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(err) => {
                    warn!("File in use, skipping override: {rel} ({err})");
                    self.events.file(
                        rel,
                        FileAction::ExtractionSkipped,
                        Some(err.to_string()),
                    );
                }
            }
        }
        false
    }
}

async fn write_file(target: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut out = tokio::fs::File::create(target).await?;
    out.write_all(data).await?;
    out.flush().await?;
    Ok(())
}
