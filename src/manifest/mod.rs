// ─── Manifest parsing ───
// Opens a modpack archive, detects which of the two supported schemas it
// carries and decodes it into a normalized `ManifestDescriptor`.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{SyncError, SyncResult};

pub mod curseforge;
pub mod descriptor;
pub mod modrinth;

pub use descriptor::{
    DeclaredFile, DeclaredFiles, FileCategory, FileHash, FileRef, HashAlgo, LoaderType,
    ManifestDescriptor, PackFormat,
};

pub const CURSEFORGE_MANIFEST: &str = "manifest.json";
pub const MODRINTH_INDEX: &str = "modrinth.index.json";

/// Open a modpack archive for reading.
///
/// A file that is not a readable zip is an invalid package, not an IO
/// failure — nothing has been mutated yet and nothing will be.
pub fn open_pack(path: &Path) -> SyncResult<ZipArchive<File>> {
    let file = File::open(path).map_err(|source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ZipArchive::new(file)
        .map_err(|err| SyncError::InvalidPackage(format!("not a readable zip archive: {err}")))
}

/// Detect the manifest format by exact root entry name.
///
/// `modrinth.index.json` wins over `manifest.json`; lookup is by full entry
/// name, so a stray `manifest.json` nested somewhere in the tree never
/// masks a root index.
pub fn detect_format<R: Read + Seek>(archive: &mut ZipArchive<R>) -> SyncResult<PackFormat> {
    if archive.by_name(MODRINTH_INDEX).is_ok() {
        return Ok(PackFormat::Modrinth);
    }
    if archive.by_name(CURSEFORGE_MANIFEST).is_ok() {
        return Ok(PackFormat::CurseForge);
    }
    Err(SyncError::InvalidPackage(format!(
        "archive contains neither {CURSEFORGE_MANIFEST} nor {MODRINTH_INDEX}"
    )))
}

/// Decode the detected schema into the normalized descriptor.
pub fn parse_manifest<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    format: PackFormat,
) -> SyncResult<ManifestDescriptor> {
    let descriptor = match format {
        PackFormat::Modrinth => {
            let raw = read_entry(archive, MODRINTH_INDEX)?;
            let index: modrinth::ModrinthIndex = serde_json::from_str(&raw).map_err(|err| {
                SyncError::InvalidPackage(format!("malformed {MODRINTH_INDEX}: {err}"))
            })?;
            index.into_descriptor()
        }
        PackFormat::CurseForge => {
            let raw = read_entry(archive, CURSEFORGE_MANIFEST)?;
            let manifest: curseforge::CurseForgeManifest =
                serde_json::from_str(&raw).map_err(|err| {
                    SyncError::InvalidPackage(format!("malformed {CURSEFORGE_MANIFEST}: {err}"))
                })?;
            manifest.into_descriptor()
        }
    };

    debug!(
        "Parsed {:?} manifest: mc={} loader={} files={}",
        descriptor.format,
        descriptor.minecraft_version,
        descriptor.loader_id,
        descriptor.files.len()
    );
    Ok(descriptor)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> SyncResult<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|err| SyncError::InvalidPackage(format!("cannot open {name}: {err}")))?;
    let mut raw = String::new();
    entry.read_to_string(&mut raw)?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_pack(dir: &Path, entries: &[(&str, &str)]) -> std::path::PathBuf {
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

    #[test]
    fn detects_curseforge_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(
            dir.path(),
            &[(
                "manifest.json",
                r#"{"minecraft": {"version": "1.21.1", "modLoaders": []}, "files": []}"#,
            )],
        );
        let mut archive = open_pack(&path).unwrap();
        assert_eq!(detect_format(&mut archive).unwrap(), PackFormat::CurseForge);
    }

    #[test]
    fn root_index_wins_over_nested_stray_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(
            dir.path(),
            &[
                ("overrides/manifest.json", "{}"),
                (
                    "modrinth.index.json",
                    r#"{"dependencies": {"minecraft": "1.20.1"}, "files": []}"#,
                ),
            ],
        );
        let mut archive = open_pack(&path).unwrap();
        assert_eq!(detect_format(&mut archive).unwrap(), PackFormat::Modrinth);

        let descriptor = parse_manifest(&mut archive, PackFormat::Modrinth).unwrap();
        assert_eq!(descriptor.minecraft_version, "1.20.1");
    }

    #[test]
    fn archive_without_either_manifest_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(dir.path(), &[("overrides/config/a.toml", "x = 1")]);
        let mut archive = open_pack(&path).unwrap();
        assert!(matches!(
            detect_format(&mut archive),
            Err(SyncError::InvalidPackage(_))
        ));
    }

    #[test]
    fn non_zip_file_is_invalid_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_a_pack.zip");
        std::fs::write(&path, b"plain text, no zip magic").unwrap();
        assert!(matches!(
            open_pack(&path),
            Err(SyncError::InvalidPackage(_))
        ));
    }

    #[test]
    fn malformed_manifest_json_is_invalid_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(dir.path(), &[("manifest.json", "{ not json")]);
        let mut archive = open_pack(&path).unwrap();
        let format = detect_format(&mut archive).unwrap();
        assert!(matches!(
            parse_manifest(&mut archive, format),
            Err(SyncError::InvalidPackage(_))
        ));
    }

    #[test]
    fn parses_curseforge_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pack(
            dir.path(),
            &[(
                "manifest.json",
                r#"{
                    "minecraft": {
                        "version": "1.21.1",
                        "modLoaders": [{"id": "neoforge-21.1.90", "primary": true}]
                    },
                    "name": "Void Pack",
                    "files": [{"projectID": 1, "fileID": 123456789, "required": true}],
                    "overrides": "overrides"
                }"#,
            )],
        );
        let mut archive = open_pack(&path).unwrap();
        let format = detect_format(&mut archive).unwrap();
        let descriptor = parse_manifest(&mut archive, format).unwrap();
        assert_eq!(descriptor.loader, LoaderType::NeoForge);
        assert_eq!(descriptor.files.len(), 1);
    }
}
