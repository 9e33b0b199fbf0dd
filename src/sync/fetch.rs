// ─── Artifact fetching ───
// Downloads the planned additions with bounded concurrency. A single
// broken download never fails the batch: the file is reported through the
// event stream and the rest of the pack still installs.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream::{self, StreamExt};
use md5::Md5;
use reqwest::Client;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, FileAction};
use crate::manifest::{FileCategory, FileHash, FileRef, HashAlgo};

const CDN_BASE: &str = "https://edge.forgecdn.net/files";
const DEFAULT_CONCURRENCY: usize = 8;

/// Synthesize the CDN fallback URL for a file the metadata service returned
/// without a direct link.
///
/// The decimal file id is split after the fourth digit:
/// `{CDN_BASE}/{first4}/{rest}/{filename}`. Ids shorter than four digits
/// have no defined CDN location.
pub fn cdn_fallback_url(file_id: u32, filename: &str) -> Option<String> {
    let id = file_id.to_string();
    if id.len() < 4 {
        return None;
    }
    let (prefix, rest) = id.split_at(4);
    Some(format!("{CDN_BASE}/{prefix}/{rest}/{filename}"))
}

/// Pick the URL to fetch: the resolved link verbatim when present,
/// otherwise the synthesized CDN location.
pub fn resolve_url(file: &FileRef) -> Option<String> {
    file.download_url
        .clone()
        .filter(|url| !url.is_empty())
        .or_else(|| cdn_fallback_url(file.file_id, &file.filename))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FetchSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// Concurrent, digest-validated artifact downloader.
pub struct ArtifactFetcher {
    client: Client,
    /// Maximum number of parallel downloads.
    concurrency: usize,
    events: EventSink,
    cancel: CancellationToken,
}

impl ArtifactFetcher {
    pub fn new(client: Client, events: EventSink, cancel: CancellationToken) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
            events,
            cancel,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Download every pending file, continuing past individual failures.
    ///
    /// All target directories are created before the first concurrent
    /// writer starts. Cancellation is cooperative: in-flight files finish,
    /// queued files are not started.
    pub async fn fetch_missing(
        &self,
        instance_dir: &Path,
        pending: &[FileRef],
    ) -> SyncResult<FetchSummary> {
        if pending.is_empty() {
            return Ok(FetchSummary::default());
        }

        self.prepare_directories(instance_dir, pending).await?;

        let total = pending.len();
        let counter = AtomicUsize::new(0);

        let outcomes: Vec<Option<bool>> = stream::iter(pending)
            .map(|file| {
                let counter = &counter;
                async move {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    self.events
                        .status(format!("Downloading ({current}/{total}): {}", file.label()));
                    self.events.progress(current, total);
                    Some(self.download_one(instance_dir, file).await)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let downloaded = outcomes.iter().filter(|o| **o == Some(true)).count();
        let failed = outcomes.iter().filter(|o| **o == Some(false)).count();
        debug!("Fetched {downloaded}/{total} artifacts, {failed} failed");
        Ok(FetchSummary { downloaded, failed })
    }

    /// mkdir for every target up front so concurrent writers never race on
    /// directory creation.
    async fn prepare_directories(
        &self,
        instance_dir: &Path,
        pending: &[FileRef],
    ) -> SyncResult<()> {
        for category in FileCategory::all() {
            create_dir_checked(&instance_dir.join(category.dir())).await?;
        }
        for file in pending {
            if let Some(parent) = file.install_path(instance_dir).parent() {
                create_dir_checked(parent).await?;
            }
        }
        Ok(())
    }

    /// Returns true on success, false on a reported per-file failure.
    async fn download_one(&self, instance_dir: &Path, file: &FileRef) -> bool {
        let Some(url) = resolve_url(file) else {
            warn!("No download URL for {} (file id {})", file.filename, file.file_id);
            self.events.file(
                &file.filename,
                FileAction::DownloadFailed,
                Some("no download URL available".to_string()),
            );
            return false;
        };

        let dest = file.install_path(instance_dir);
        match self.fetch_and_write(&url, &dest, &file.hashes).await {
            Ok(()) => {
                self.events
                    .file(&file.filename, FileAction::Downloaded, None);
                true
            }
            Err(err) => {
                warn!("Download failed for {}: {}", file.filename, err);
                let action = match err {
                    SyncError::DigestMismatch { .. } => FileAction::DigestMismatch,
                    _ => FileAction::DownloadFailed,
                };
                self.events
                    .file(&file.filename, action, Some(err.to_string()));
                false
            }
        }
    }

    async fn fetch_and_write(
        &self,
        url: &str,
        dest: &Path,
        hashes: &[FileHash],
    ) -> SyncResult<()> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;

        // Validate before writing; a corrupt artifact never lands on disk.
        verify_digest(&bytes, hashes, dest)?;

        // Write inside a block so the handle drops immediately.
        {
            let mut out = tokio::fs::File::create(dest)
                .await
                .map_err(|source| SyncError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
            out.write_all(&bytes)
                .await
                .map_err(|source| SyncError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
            out.flush().await.map_err(|source| SyncError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }
}

/// Check the strongest available digest; absent digests pass.
fn verify_digest(bytes: &[u8], hashes: &[FileHash], dest: &Path) -> SyncResult<()> {
    let Some(expected) = hashes
        .iter()
        .find(|hash| hash.algo == HashAlgo::Sha1)
        .or_else(|| hashes.iter().find(|hash| hash.algo == HashAlgo::Md5))
    else {
        return Ok(());
    };

    let actual = match expected.algo {
        HashAlgo::Sha1 => {
            let mut hasher = Sha1::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
        HashAlgo::Md5 => {
            let mut hasher = Md5::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        }
    };

    if actual != expected.value {
        return Err(SyncError::DigestMismatch {
            path: dest.to_path_buf(),
            expected: expected.value.clone(),
            actual,
        });
    }
    Ok(())
}

async fn create_dir_checked(path: &Path) -> SyncResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })
}
