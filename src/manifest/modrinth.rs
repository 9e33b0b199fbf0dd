// ─── Modrinth index schema ───
// Decodes `modrinth.index.json` and lowers it into the normalized
// descriptor. Modrinth entries carry explicit paths and pinned download
// URLs, so they come out of the parser already resolved.

use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

use super::descriptor::{
    clean_relative_path, DeclaredFiles, FileCategory, FileRef, LoaderType, ManifestDescriptor,
    PackFormat,
};

/// Ordered dependency-key table. At most one loader is expected; when
/// several keys are present this priority order is the documented
/// tie-break, not a validation error.
const LOADER_KEYS: [(&str, LoaderType); 4] = [
    ("fabric-loader", LoaderType::Fabric),
    ("quilt-loader", LoaderType::Quilt),
    ("forge", LoaderType::Forge),
    ("neoforge", LoaderType::NeoForge),
];

const MINECRAFT_KEY: &str = "minecraft";
const OVERRIDES_ROOT: &str = "overrides";

#[derive(Debug, Deserialize)]
pub struct ModrinthIndex {
    pub name: Option<String>,
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub files: Vec<ModrinthFileEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ModrinthFileEntry {
    pub path: String,
    #[serde(default)]
    pub downloads: Vec<String>,
}

impl ModrinthIndex {
    /// Lower the schema into the normalized descriptor.
    pub fn into_descriptor(self) -> ManifestDescriptor {
        let minecraft_version = self
            .dependencies
            .get(MINECRAFT_KEY)
            .cloned()
            .unwrap_or_default();

        let (loader_id, loader) = LOADER_KEYS
            .iter()
            .find_map(|(key, loader)| {
                self.dependencies
                    .get(*key)
                    .map(|version| (format!("{loader}-{version}"), *loader))
            })
            .unwrap_or((String::new(), LoaderType::Unknown));

        let mut files = Vec::with_capacity(self.files.len());
        for entry in &self.files {
            let Some(clean) = clean_relative_path(&entry.path) else {
                warn!("Ignoring index entry with unusable path: {}", entry.path);
                continue;
            };
            let filename = match clean.file_name() {
                Some(name) => name.to_string_lossy().to_string(),
                None => continue,
            };
            let rel = clean.to_string_lossy().replace('\\', "/");
            let category = rel
                .split('/')
                .next()
                .and_then(FileCategory::from_dir)
                .unwrap_or(FileCategory::Mod);

            files.push(FileRef {
                file_id: 0,
                project_id: 0,
                filename,
                display_name: None,
                download_url: entry.downloads.first().cloned(),
                category,
                relative_path: Some(rel),
                hashes: Vec::new(),
            });
        }

        ManifestDescriptor {
            format: PackFormat::Modrinth,
            name: self.name,
            version: self.version_id,
            author: None,
            minecraft_version,
            loader_id,
            loader,
            overrides_root: OVERRIDES_ROOT.to_string(),
            files: DeclaredFiles::Resolved(files),
        }
    }
}
