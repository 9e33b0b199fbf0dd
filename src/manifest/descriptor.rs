use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Which manifest schema the archive carried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackFormat {
    CurseForge,
    Modrinth,
}

/// Supported mod loaders — strongly typed, no magic strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    NeoForge,
    Forge,
    Fabric,
    Quilt,
    /// Loader id did not match any known prefix; the raw id is still
    /// carried in `ManifestDescriptor::loader_id` for the launch stage.
    Unknown,
}

impl std::fmt::Display for LoaderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoaderType::NeoForge => write!(f, "neoforge"),
            LoaderType::Forge => write!(f, "forge"),
            LoaderType::Fabric => write!(f, "fabric"),
            LoaderType::Quilt => write!(f, "quilt"),
            LoaderType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Where a declared file lands inside the instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Mod,
    ResourcePack,
    ShaderPack,
}

impl FileCategory {
    /// Instance subdirectory for this category.
    pub fn dir(&self) -> &'static str {
        match self {
            FileCategory::Mod => "mods",
            FileCategory::ResourcePack => "resourcepacks",
            FileCategory::ShaderPack => "shaderpacks",
        }
    }

    /// Reverse mapping from an instance subdirectory name.
    pub fn from_dir(dir: &str) -> Option<Self> {
        match dir {
            "mods" => Some(FileCategory::Mod),
            "resourcepacks" => Some(FileCategory::ResourcePack),
            "shaderpacks" => Some(FileCategory::ShaderPack),
            _ => None,
        }
    }

    /// All category directories the engine manages.
    pub fn all() -> [FileCategory; 3] {
        [
            FileCategory::Mod,
            FileCategory::ResourcePack,
            FileCategory::ShaderPack,
        ]
    }
}

/// Digest algorithms published by the metadata service (`algo` codes 1 and 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgo {
    Sha1,
    Md5,
}

impl HashAlgo {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(HashAlgo::Sha1),
            2 => Some(HashAlgo::Md5),
            _ => None,
        }
    }
}

/// A known-good digest for a remote artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHash {
    pub algo: HashAlgo,
    /// Lowercase hex digest.
    pub value: String,
}

/// A file declared by a CurseForge manifest, before metadata resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaredFile {
    pub project_id: u32,
    pub file_id: u32,
    pub required: bool,
}

/// A fully resolved file: enough to diff against disk and to download.
///
/// `filename` is the natural key for diffing — remote ids are not visible
/// in the filesystem.
#[derive(Debug, Clone)]
pub struct FileRef {
    /// Remote file id; 0 when the pack pins a direct URL instead.
    pub file_id: u32,
    /// Owning project id; 0 when unknown.
    pub project_id: u32,
    pub filename: String,
    pub display_name: Option<String>,
    pub download_url: Option<String>,
    pub category: FileCategory,
    /// Explicit target relative to the instance root. When `None` the file
    /// lands in `category.dir()/filename`.
    pub relative_path: Option<String>,
    pub hashes: Vec<FileHash>,
}

impl FileRef {
    /// Absolute install target for this file.
    pub fn install_path(&self, instance_dir: &Path) -> PathBuf {
        match &self.relative_path {
            Some(rel) => instance_dir.join(rel),
            None => instance_dir.join(self.category.dir()).join(&self.filename),
        }
    }

    /// Label used in status messages.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.filename)
    }
}

/// Declared file list in whichever state of resolution the format allows.
#[derive(Debug, Clone)]
pub enum DeclaredFiles {
    /// CurseForge ids that still need the metadata service.
    Ids(Vec<DeclaredFile>),
    /// Modrinth entries arrive with paths and URLs already pinned.
    Resolved(Vec<FileRef>),
}

impl DeclaredFiles {
    pub fn len(&self) -> usize {
        match self {
            DeclaredFiles::Ids(files) => files.len(),
            DeclaredFiles::Resolved(files) => files.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalized, immutable description of a modpack archive.
/// Created once per install invocation by the manifest parser.
#[derive(Debug, Clone)]
pub struct ManifestDescriptor {
    pub format: PackFormat,
    pub name: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub minecraft_version: String,
    /// Raw loader id, e.g. "neoforge-21.1.90".
    pub loader_id: String,
    pub loader: LoaderType,
    /// Root of the embedded override tree inside the archive.
    pub overrides_root: String,
    pub files: DeclaredFiles,
}

/// Normalize a pack-relative path: forward slashes, `Normal` components only.
///
/// Drops `.`/`..` and root components rather than erroring, mirroring how
/// zip entry names are sanitized. Returns `None` when nothing remains.
pub(crate) fn clean_relative_path(raw: &str) -> Option<PathBuf> {
    let normalized = raw.replace('\\', "/");
    let mut clean = PathBuf::new();
    for component in Path::new(&normalized).components() {
        if let Component::Normal(part) = component {
            clean.push(part);
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_dir_round_trip() {
        for category in FileCategory::all() {
            assert_eq!(FileCategory::from_dir(category.dir()), Some(category));
        }
        assert_eq!(FileCategory::from_dir("config"), None);
    }

    #[test]
    fn install_path_defaults_to_category_dir() {
        let file = FileRef {
            file_id: 1,
            project_id: 2,
            filename: "sodium.jar".to_string(),
            display_name: None,
            download_url: None,
            category: FileCategory::Mod,
            relative_path: None,
            hashes: Vec::new(),
        };
        assert_eq!(
            file.install_path(Path::new("/instance")),
            PathBuf::from("/instance/mods/sodium.jar")
        );
    }

    #[test]
    fn install_path_honors_explicit_relative_path() {
        let file = FileRef {
            file_id: 0,
            project_id: 0,
            filename: "pack.zip".to_string(),
            display_name: None,
            download_url: Some("https://example.com/pack.zip".to_string()),
            category: FileCategory::ResourcePack,
            relative_path: Some("resourcepacks/extra/pack.zip".to_string()),
            hashes: Vec::new(),
        };
        assert_eq!(
            file.install_path(Path::new("/instance")),
            PathBuf::from("/instance/resourcepacks/extra/pack.zip")
        );
    }

    #[test]
    fn clean_relative_path_strips_escapes() {
        assert_eq!(
            clean_relative_path("config\\mod\\settings.toml"),
            Some(PathBuf::from("config/mod/settings.toml"))
        );
        assert_eq!(
            clean_relative_path("../../options.txt"),
            Some(PathBuf::from("options.txt"))
        );
        assert_eq!(clean_relative_path(".."), None);
        assert_eq!(clean_relative_path(""), None);
    }

    #[test]
    fn hash_algo_codes() {
        assert_eq!(HashAlgo::from_code(1), Some(HashAlgo::Sha1));
        assert_eq!(HashAlgo::from_code(2), Some(HashAlgo::Md5));
        assert_eq!(HashAlgo::from_code(9), None);
    }
}
