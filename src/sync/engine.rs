// ─── Synchronization engine ───
// Drives one run end to end:
//   Opened → FormatDetected → ManifestParsed → MetadataResolved → Diffed →
//   Deleting → Downloading → OverridesExtracted → StatePersisted
// Only a package that cannot be opened or parsed aborts before touching
// disk. Every later stage degrades per file; whatever partial progress
// landed stays, and the manifest summary is persisted either way.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::{SyncError, SyncResult};
use crate::events::{EventSink, FileAction, SyncPhase};
use crate::manifest::{self, DeclaredFiles, FileRef, ManifestDescriptor};
use crate::metadata::{resolve_declared, MetadataService, ModMetadataCache};

use super::fetch::ArtifactFetcher;
use super::overrides::{OverrideExtractor, ProtectedPaths, RetryPolicy};
use super::plan::plan_sync;
use super::state::{InstallStateStore, ManifestInfo};

const DEFAULT_CONCURRENCY: usize = 8;

/// One-instance modpack synchronizer.
///
/// The caller must serialize runs per instance directory; the engine
/// assumes single-writer access and implements no cross-process locking.
pub struct SyncEngine<S> {
    service: S,
    client: Client,
    concurrency: usize,
    retry: RetryPolicy,
    protected: ProtectedPaths,
    events: EventSink,
    cancel: CancellationToken,
}

impl<S: MetadataService> SyncEngine<S> {
    pub fn new(service: S, client: Client, events: EventSink) -> Self {
        Self {
            service,
            client,
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            protected: ProtectedPaths::default(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_protected_paths(mut self, protected: ProtectedPaths) -> Self {
        self.protected = protected;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this engine's runs between file operations.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Install the pack into `instance_dir`, or reconcile an existing
    /// installation with it.
    ///
    /// `target_file_id` is the remote id of the pack version being
    /// installed, recorded in the persisted summary when known.
    pub async fn install_or_update(
        &self,
        pack_path: &Path,
        instance_dir: &Path,
        target_file_id: Option<u32>,
    ) -> SyncResult<ManifestInfo> {
        self.events.phase(SyncPhase::Opened);
        self.events.status("Opening modpack package...");
        let mut archive = manifest::open_pack(pack_path)?;

        let format = manifest::detect_format(&mut archive)?;
        self.events.phase(SyncPhase::FormatDetected);

        let descriptor = manifest::parse_manifest(&mut archive, format)?;
        self.events.phase(SyncPhase::ManifestParsed);
        info!(
            "Synchronizing {} ({:?}, mc {}, loader {}, {} files)",
            descriptor.name.as_deref().unwrap_or("modpack"),
            descriptor.format,
            descriptor.minecraft_version,
            descriptor.loader_id,
            descriptor.files.len()
        );

        let summary = ManifestInfo::from_descriptor(&descriptor, target_file_id);
        let result = self
            .run_pipeline(&mut archive, &descriptor, instance_dir)
            .await;

        // Persisted on success and partial failure alike: a later launch
        // can fall back to this summary when the network is gone.
        let store = InstallStateStore::new(instance_dir);
        if let Err(err) = store.save_manifest_info(&summary).await {
            warn!("Failed to persist manifest summary: {err}");
        }
        self.events.phase(SyncPhase::StatePersisted);

        result.map(|()| {
            self.events.status("Installation complete");
            summary
        })
    }

    async fn run_pipeline(
        &self,
        archive: &mut ZipArchive<File>,
        descriptor: &ManifestDescriptor,
        instance_dir: &Path,
    ) -> SyncResult<()> {
        tokio::fs::create_dir_all(instance_dir)
            .await
            .map_err(|source| SyncError::Io {
                path: instance_dir.to_path_buf(),
                source,
            })?;

        let declared: Vec<FileRef> = match &descriptor.files {
            DeclaredFiles::Ids(ids) => {
                let cache = ModMetadataCache::new(instance_dir);
                resolve_declared(&self.service, ids, &cache, &self.events).await?
            }
            DeclaredFiles::Resolved(files) => files.clone(),
        };
        self.events.phase(SyncPhase::MetadataResolved);

        let store = InstallStateStore::new(instance_dir);
        let previously_installed = store.load_installed().await;

        let plan = plan_sync(instance_dir, &declared, &previously_installed).await?;
        self.events.phase(SyncPhase::Diffed);
        self.events.status(format!(
            "{} to download, {} stale to remove, {} already present",
            plan.downloads.len(),
            plan.deletions.len(),
            plan.kept
        ));

        self.events.phase(SyncPhase::Deleting);
        for path in &plan.deletions {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    self.events.status(format!("Removing old file: {name}"));
                    self.events.file(&name, FileAction::Deleted, None);
                }
                Err(err) => {
                    // A file we cannot remove is left behind; next run
                    // will try again.
                    warn!("Could not remove stale file {:?}: {}", path, err);
                }
            }
        }

        // Track exactly the declared set before downloads begin, so an
        // interrupted run still diffs correctly next time.
        let declared_names: HashSet<String> = declared
            .iter()
            .map(|file| file.filename.clone())
            .collect();
        store.save_installed(&declared_names).await?;

        self.events.phase(SyncPhase::Downloading);
        let fetcher =
            ArtifactFetcher::new(self.client.clone(), self.events.clone(), self.cancel.clone())
                .with_concurrency(self.concurrency);
        let fetched = fetcher.fetch_missing(instance_dir, &plan.downloads).await?;
        if fetched.failed > 0 {
            self.events.status(format!(
                "{} files could not be downloaded and were skipped",
                fetched.failed
            ));
        }

        self.events.status("Applying overrides...");
        let extractor = OverrideExtractor::new(self.events.clone(), self.cancel.clone())
            .with_protected_paths(self.protected.clone())
            .with_retry_policy(self.retry);
        let extracted = extractor
            .extract(archive, &descriptor.overrides_root, instance_dir)
            .await?;
        self.events.phase(SyncPhase::OverridesExtracted);
        self.events.status(format!(
            "Applied {} override files ({} skipped)",
            extracted.extracted, extracted.skipped
        ));

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SyncEvent;
    use crate::http::build_http_client;
    use crate::metadata::service::{ProjectCategory, ProjectInfo, ResolvedFile};
    use crate::sync::state::{cached_manifest_info, INSTALLED_FILES_FILE, MANIFEST_INFO_FILE};
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    struct FakeService {
        files: Vec<ResolvedFile>,
        projects: Vec<ProjectInfo>,
        fail_files: bool,
    }

    #[async_trait]
    impl MetadataService for FakeService {
        async fn resolve_files(&self, _ids: &[u32]) -> SyncResult<Vec<ResolvedFile>> {
            if self.fail_files {
                return Err(SyncError::MetadataResolution("backend down".into()));
            }
            Ok(self.files.clone())
        }

        async fn resolve_projects(&self, _ids: &[u32]) -> SyncResult<Vec<ProjectInfo>> {
            Ok(self.projects.clone())
        }
    }

    fn remote_file(id: u32, mod_id: u32, name: &str) -> ResolvedFile {
        ResolvedFile {
            id,
            mod_id,
            display_name: Some(name.to_string()),
            file_name: name.to_string(),
            download_url: Some(format!("https://example.invalid/{name}")),
            hashes: Vec::new(),
        }
    }

    fn mod_project(id: u32) -> ProjectInfo {
        ProjectInfo {
            id,
            class_id: Some(6),
            name: format!("Project {id}"),
            slug: format!("project-{id}"),
            summary: Some("a mod".to_string()),
            categories: vec![ProjectCategory {
                name: "Technology".to_string(),
            }],
        }
    }

    fn write_pack(dir: &Path, entries: &[(&str, &str)]) -> PathBuf {
        let path = dir.join("pack.zip");
        let file = File::create(&path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    const CF_MANIFEST: &str = r#"{
        "minecraft": {
            "version": "1.21.1",
            "modLoaders": [{"id": "neoforge-21.1.90", "primary": true}]
        },
        "name": "Void Pack",
        "files": [
            {"projectID": 1, "fileID": 10, "required": true},
            {"projectID": 2, "fileID": 11, "required": true}
        ],
        "overrides": "overrides"
    }"#;

    fn engine(service: FakeService) -> SyncEngine<FakeService> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("packsync=debug")),
            )
            .try_init();
        SyncEngine::new(service, build_http_client().unwrap(), EventSink::disabled())
    }

    async fn touch(path: &Path) {
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(path, b"jar bytes").await.unwrap();
    }

    #[tokio::test]
    async fn curseforge_run_reconciles_instance() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        let pack = write_pack(
            dir.path(),
            &[
                ("manifest.json", CF_MANIFEST),
                ("overrides/config/jei.toml", "mode = \"cheat\""),
            ],
        );

        // Declared files already on disk — no network needed.
        touch(&instance.join("mods/alpha.jar")).await;
        touch(&instance.join("mods/beta.jar")).await;
        // Stale tracked file plus a user-owned foreign file.
        touch(&instance.join("mods/oldmod-1.0.jar")).await;
        touch(&instance.join("mods/optifine.jar")).await;
        tokio::fs::write(
            instance.join(INSTALLED_FILES_FILE),
            r#"["alpha.jar", "beta.jar", "oldmod-1.0.jar"]"#,
        )
        .await
        .unwrap();

        let service = FakeService {
            files: vec![remote_file(10, 1, "alpha.jar"), remote_file(11, 2, "beta.jar")],
            projects: vec![mod_project(1), mod_project(2)],
            fail_files: false,
        };

        let summary = engine(service)
            .install_or_update(&pack, &instance, Some(4711))
            .await
            .unwrap();

        assert_eq!(summary.minecraft_version, "1.21.1");
        assert_eq!(summary.loader_id, "neoforge-21.1.90");
        assert_eq!(summary.mod_count, 2);
        assert_eq!(summary.file_id, 4711);

        // Stale tracked file deleted, foreign file preserved.
        assert!(!instance.join("mods/oldmod-1.0.jar").exists());
        assert!(instance.join("mods/optifine.jar").exists());
        // Overrides applied.
        let config = tokio::fs::read_to_string(instance.join("config/jei.toml"))
            .await
            .unwrap();
        assert_eq!(config, "mode = \"cheat\"");
        // Tracking replaced with exactly the declared set.
        let tracked = InstallStateStore::new(&instance).load_installed().await;
        assert_eq!(tracked.len(), 2);
        assert!(tracked.contains("alpha.jar") && tracked.contains("beta.jar"));
        // Summary persisted for offline reuse.
        assert_eq!(
            cached_manifest_info(&instance).await.unwrap().loader_id,
            "neoforge-21.1.90"
        );
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        let pack = write_pack(
            dir.path(),
            &[
                ("manifest.json", CF_MANIFEST),
                ("overrides/config/jei.toml", "mode = \"cheat\""),
            ],
        );
        touch(&instance.join("mods/alpha.jar")).await;
        touch(&instance.join("mods/beta.jar")).await;

        let make_service = || FakeService {
            files: vec![remote_file(10, 1, "alpha.jar"), remote_file(11, 2, "beta.jar")],
            projects: vec![mod_project(1), mod_project(2)],
            fail_files: false,
        };

        engine(make_service())
            .install_or_update(&pack, &instance, None)
            .await
            .unwrap();

        // Second run: watch the event stream for any disk mutation.
        let (events, mut rx) = EventSink::channel();
        let second = SyncEngine::new(make_service(), build_http_client().unwrap(), events);
        second
            .install_or_update(&pack, &instance, None)
            .await
            .unwrap();

        while let Ok(event) = rx.try_recv() {
            if let SyncEvent::File(file) = event {
                assert!(
                    !matches!(file.action, FileAction::Deleted | FileAction::Downloaded),
                    "second run mutated the instance: {file:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn modrinth_run_skips_present_files_and_records_loader() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        let pack = write_pack(
            dir.path(),
            &[(
                "modrinth.index.json",
                r#"{
                    "name": "Fabulous",
                    "dependencies": {"minecraft": "1.20.1", "fabric-loader": "0.14.21"},
                    "files": [
                        {"path": "mods/sodium.jar", "downloads": ["https://example.invalid/sodium.jar"]}
                    ]
                }"#,
            )],
        );
        touch(&instance.join("mods/sodium.jar")).await;

        let service = FakeService {
            files: Vec::new(),
            projects: Vec::new(),
            fail_files: true, // must never be consulted for Modrinth packs
        };

        let summary = engine(service)
            .install_or_update(&pack, &instance, None)
            .await
            .unwrap();

        assert_eq!(summary.loader_id, "fabric-0.14.21");
        assert_eq!(summary.minecraft_version, "1.20.1");
        assert_eq!(summary.pack_name.as_deref(), Some("Fabulous"));
        let tracked = InstallStateStore::new(&instance).load_installed().await;
        assert!(tracked.contains("sodium.jar"));
    }

    #[tokio::test]
    async fn invalid_package_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        let pack = write_pack(dir.path(), &[("readme.txt", "not a pack")]);

        let service = FakeService {
            files: Vec::new(),
            projects: Vec::new(),
            fail_files: false,
        };

        let result = engine(service)
            .install_or_update(&pack, &instance, None)
            .await;
        assert!(matches!(result, Err(SyncError::InvalidPackage(_))));
        assert!(!instance.join(MANIFEST_INFO_FILE).exists());
        assert!(!instance.join(INSTALLED_FILES_FILE).exists());
    }

    #[tokio::test]
    async fn resolver_failure_still_persists_manifest_summary() {
        let dir = tempfile::tempdir().unwrap();
        let instance = dir.path().join("instance");
        let pack = write_pack(dir.path(), &[("manifest.json", CF_MANIFEST)]);

        let service = FakeService {
            files: Vec::new(),
            projects: Vec::new(),
            fail_files: true,
        };

        let result = engine(service)
            .install_or_update(&pack, &instance, None)
            .await;
        assert!(matches!(result, Err(SyncError::MetadataResolution(_))));

        // The summary is still usable as an offline fallback.
        let info = cached_manifest_info(&instance).await.unwrap();
        assert_eq!(info.minecraft_version, "1.21.1");
        // But nothing was tracked: the run never reached the diff stage.
        assert!(!instance.join(INSTALLED_FILES_FILE).exists());
    }
}
