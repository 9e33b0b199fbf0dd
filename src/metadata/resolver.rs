// ─── Metadata resolution ───
// Turns declared (projectID, fileID) pairs into resolved `FileRef`s via
// the two batch lookups, mapping project classes onto install categories
// and feeding the mod metadata sidecar as a side effect.

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::events::EventSink;
use crate::manifest::{DeclaredFile, FileCategory, FileHash, FileRef, HashAlgo};

use super::cache::{ModMetadata, ModMetadataCache};
use super::service::{MetadataService, ProjectInfo, ResolvedFile};

const RESOURCE_PACK_CLASS: u32 = 12;
const SHADER_PACK_CLASSES: [u32; 2] = [6552, 4546];

/// Map a project class id onto an install category.
///
/// Fail-open: anything unrecognized — including a project the batch lookup
/// did not return — lands in the default mods folder. The download still
/// succeeds; only the target directory degrades.
pub fn category_for_class(class_id: Option<u32>) -> FileCategory {
    match class_id {
        Some(RESOURCE_PACK_CLASS) => FileCategory::ResourcePack,
        Some(id) if SHADER_PACK_CLASSES.contains(&id) => FileCategory::ShaderPack,
        _ => FileCategory::Mod,
    }
}

/// Resolve declared files against the metadata service.
///
/// A failed file lookup is fatal — without filenames there is nothing to
/// diff or download. A failed project lookup only degrades categories and
/// is reported through the event stream.
pub async fn resolve_declared<S: MetadataService + ?Sized>(
    service: &S,
    declared: &[DeclaredFile],
    cache: &ModMetadataCache,
    events: &EventSink,
) -> SyncResult<Vec<FileRef>> {
    let file_ids = dedup_preserving_order(declared.iter().map(|file| file.file_id));
    if file_ids.is_empty() {
        return Ok(Vec::new());
    }

    events.status(format!("Resolving {} declared files...", file_ids.len()));
    let resolved = service.resolve_files(&file_ids).await?;
    let by_id: HashMap<u32, &ResolvedFile> = resolved.iter().map(|file| (file.id, file)).collect();

    let project_ids = dedup_preserving_order(resolved.iter().map(|file| file.mod_id));
    let projects = match service.resolve_projects(&project_ids).await {
        Ok(projects) => projects,
        Err(err) => {
            warn!("Project lookup failed, defaulting categories to mods: {err}");
            events.status(format!(
                "Could not verify file types, using mods folder: {err}"
            ));
            Vec::new()
        }
    };
    let class_by_project: HashMap<u32, Option<u32>> = projects
        .iter()
        .map(|project| (project.id, project.class_id))
        .collect();

    let mut files = Vec::with_capacity(file_ids.len());
    for id in &file_ids {
        let Some(remote) = by_id.get(id) else {
            warn!("Metadata service returned no entry for file id {id}");
            events.status(format!("No metadata for file id {id}, skipping"));
            continue;
        };
        let category = category_for_class(class_by_project.get(&remote.mod_id).copied().flatten());
        files.push(FileRef {
            file_id: remote.id,
            project_id: remote.mod_id,
            filename: remote.file_name.clone(),
            display_name: remote.display_name.clone(),
            download_url: remote
                .download_url
                .clone()
                .filter(|url| !url.is_empty()),
            category,
            relative_path: None,
            hashes: remote
                .hashes
                .iter()
                .filter_map(|hash| {
                    HashAlgo::from_code(hash.algo).map(|algo| FileHash {
                        algo,
                        value: hash.value.to_lowercase(),
                    })
                })
                .collect(),
        });
    }

    if !projects.is_empty() {
        let records = metadata_records(&projects, &resolved);
        if let Err(err) = cache.upsert(records).await {
            // Best effort only; a broken sidecar must not abort the install.
            warn!("Failed to persist mod metadata sidecar: {err}");
        }
    }

    debug!("Resolved {}/{} declared files", files.len(), file_ids.len());
    Ok(files)
}

fn dedup_preserving_order(ids: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn metadata_records(projects: &[ProjectInfo], files: &[ResolvedFile]) -> Vec<ModMetadata> {
    let mut records = Vec::new();
    for project in projects {
        for file in files.iter().filter(|file| file.mod_id == project.id) {
            records.push(ModMetadata {
                file_name: file.file_name.clone(),
                name: project.name.clone(),
                slug: project.slug.clone(),
                summary: project.summary.clone(),
                categories: project
                    .categories
                    .iter()
                    .map(|category| category.name.clone())
                    .collect(),
            });
        }
    }
    records
}
