// ─── CurseForge manifest schema ───
// Decodes `manifest.json` as bundled inside CurseForge-style modpack
// archives and lowers it into the normalized descriptor.

use serde::Deserialize;

use super::descriptor::{
    DeclaredFile, DeclaredFiles, LoaderType, ManifestDescriptor, PackFormat,
};

/// Ordered loader prefix table. First case-insensitive prefix match wins;
/// the order is a deliberate tie-break, not iteration luck.
const LOADER_PREFIXES: [(&str, LoaderType); 4] = [
    ("neoforge", LoaderType::NeoForge),
    ("forge", LoaderType::Forge),
    ("fabric", LoaderType::Fabric),
    ("quilt", LoaderType::Quilt),
];

const DEFAULT_OVERRIDES_ROOT: &str = "overrides";

#[derive(Debug, Deserialize)]
pub struct CurseForgeManifest {
    pub minecraft: MinecraftInfo,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub files: Vec<ManifestFileEntry>,
    pub overrides: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MinecraftInfo {
    pub version: String,
    #[serde(rename = "modLoaders", default)]
    pub mod_loaders: Vec<ModLoaderEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ModLoaderEntry {
    pub id: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Deserialize)]
pub struct ManifestFileEntry {
    #[serde(rename = "projectID")]
    pub project_id: u32,
    #[serde(rename = "fileID")]
    pub file_id: u32,
    #[serde(default)]
    pub required: bool,
}

/// Map a raw loader id ("neoforge-21.1.90") onto the known loader set.
pub fn loader_from_id(id: &str) -> LoaderType {
    let lowered = id.to_lowercase();
    for (prefix, loader) in LOADER_PREFIXES {
        if lowered.starts_with(prefix) {
            return loader;
        }
    }
    LoaderType::Unknown
}

impl CurseForgeManifest {
    /// Lower the schema into the normalized descriptor.
    ///
    /// The loader is taken from the entry flagged `primary`; if none is
    /// flagged, the first entry is used. An unrecognized id maps to
    /// `LoaderType::Unknown` with the raw id passed through unresolved.
    pub fn into_descriptor(self) -> ManifestDescriptor {
        let primary = self
            .minecraft
            .mod_loaders
            .iter()
            .find(|loader| loader.primary)
            .or_else(|| self.minecraft.mod_loaders.first());

        let (loader_id, loader) = match primary {
            Some(entry) => (entry.id.clone(), loader_from_id(&entry.id)),
            None => (String::new(), LoaderType::Unknown),
        };

        let overrides_root = self
            .overrides
            .filter(|root| !root.is_empty())
            .unwrap_or_else(|| DEFAULT_OVERRIDES_ROOT.to_string());

        let files = self
            .files
            .iter()
            .map(|entry| DeclaredFile {
                project_id: entry.project_id,
                file_id: entry.file_id,
                required: entry.required,
            })
            .collect();

        ManifestDescriptor {
            format: PackFormat::CurseForge,
            name: self.name,
            version: self.version,
            author: self.author,
            minecraft_version: self.minecraft.version,
            loader_id,
            loader,
            overrides_root,
            files: DeclaredFiles::Ids(files),
        }
    }
}
