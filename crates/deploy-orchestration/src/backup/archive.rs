//! Gzip-compressed tar archives of backup paths.
//!
//! Every archive carries a `manifest.json` next to the captured paths. The
//! manifest maps each archive entry back to the absolute path it came from,
//! which is what restore writes to.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Name of the manifest inside the archive and next to it in storage
pub const MANIFEST_NAME: &str = "manifest.json";

/// One captured path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Relative name inside the archive
    pub name: String,
    /// Absolute path on disk
    pub path: PathBuf,
}

impl ArchiveEntry {
    /// Entry for a declared path; the name keeps only the declared path's
    /// normal components, so `./`, `/` and `..` are dropped
    pub fn new(declared: &str, path: PathBuf) -> Option<Self> {
        let name: PathBuf = Path::new(declared)
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        let name = name.to_string_lossy().replace('\\', "/");
        if name.is_empty() || name == MANIFEST_NAME {
            return None;
        }
        Some(Self { name, path })
    }
}

/// What a snapshot contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Application name
    pub app: String,
    /// Environment name
    pub environment: String,
    /// Snapshot timestamp
    pub timestamp: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Image the app was declared with at capture time
    pub image: String,
    /// Captured paths
    pub entries: Vec<ArchiveEntry>,
}

impl BackupManifest {
    /// Declared names of the captured paths
    pub fn paths(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }
}

/// Write `entries` and the manifest into a `.tar.gz` at `archive`,
/// returning the archive size
pub fn create(archive: &Path, manifest: &BackupManifest) -> io::Result<u64> {
    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(archive)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let manifest_bytes = serde_json::to_vec_pretty(manifest)?;
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(manifest.created_at.timestamp().max(0) as u64);
    header.set_cksum();
    builder.append_data(&mut header, MANIFEST_NAME, manifest_bytes.as_slice())?;

    for entry in &manifest.entries {
        debug!("Archiving {} as {}", entry.path.display(), entry.name);
        if entry.path.is_dir() {
            builder.append_dir_all(&entry.name, &entry.path)?;
        } else {
            builder.append_path_with_name(&entry.path, &entry.name)?;
        }
    }

    let encoder = builder.into_inner()?;
    encoder.finish()?;
    Ok(std::fs::metadata(archive)?.len())
}

/// Read the manifest embedded in an archive
pub fn read_manifest(archive: &Path) -> io::Result<BackupManifest> {
    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for entry in tar.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new(MANIFEST_NAME) {
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            return serde_json::from_slice(&bytes).map_err(io::Error::from);
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "archive has no manifest.json",
    ))
}

/// Put every captured path back where it came from.
///
/// Each entry is unpacked into a staging directory beside its target and
/// renamed into place, so a target is either fully old or fully new.
pub fn restore(archive: &Path, manifest: &BackupManifest) -> io::Result<Vec<PathBuf>> {
    let mut stages = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        let parent = entry
            .path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
        std::fs::create_dir_all(parent)?;
        let stage = tempfile::Builder::new()
            .prefix(".hostsolo-restore-")
            .tempdir_in(parent)?;
        stages.push(stage);
    }

    let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive)?));
    for item in tar.entries()? {
        let mut item = item?;
        let path = item.path()?.into_owned();
        if path == Path::new(MANIFEST_NAME) {
            continue;
        }
        let owner = manifest
            .entries
            .iter()
            .position(|e| path.starts_with(&e.name));
        match owner {
            Some(idx) => {
                item.unpack_in(stages[idx].path())?;
            }
            None => warn!("Ignoring unexpected archive entry {}", path.display()),
        }
    }

    let mut restored = Vec::new();
    for (entry, stage) in manifest.entries.iter().zip(&stages) {
        let staged = stage.path().join(&entry.name);
        if !staged.exists() {
            warn!("Snapshot holds nothing for {}", entry.name);
            continue;
        }
        if entry.path.is_dir() {
            std::fs::remove_dir_all(&entry.path)?;
        } else if entry.path.exists() {
            std::fs::remove_file(&entry.path)?;
        }
        std::fs::rename(&staged, &entry.path)?;
        restored.push(entry.path.clone());
    }
    Ok(restored)
}
