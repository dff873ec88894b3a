//! File snapshots used by the default `backup`/`restore`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::BackupError;
use crate::fsutil;

/// Manifest file name inside a plugin's backup directory.
pub const SNAPSHOT_MANIFEST: &str = "snapshot.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub plugin: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
}

/// One file covered by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotFile {
    /// Live location of the file.
    pub path: PathBuf,
    /// Name of the copy inside the backup directory.
    pub backup_name: String,
    /// False if the file did not exist when the snapshot was taken.
    pub existed: bool,
}

/// Backup file name: short path hash plus the original file name, so two
/// targets called `config` never collide.
fn backup_name(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hash: String = digest.iter().take(8).map(|b| format!("{:02x}", b)).collect();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    format!("{}-{}", hash, file_name)
}

pub(super) fn create(plugin: &str, files: &[PathBuf], dir: &Path) -> Result<(), BackupError> {
    std::fs::create_dir_all(dir)?;

    let mut entries = Vec::with_capacity(files.len());
    for path in files {
        let name = backup_name(path);
        let existed = path.is_file();
        if existed {
            fsutil::copy_atomic(path, &dir.join(&name)).map_err(|source| BackupError::Copy {
                path: path.clone(),
                source,
            })?;
        }
        entries.push(SnapshotFile {
            path: path.clone(),
            backup_name: name,
            existed,
        });
    }

    let manifest = SnapshotManifest {
        plugin: plugin.to_string(),
        created_at: Utc::now(),
        files: entries,
    };
    let manifest_path = dir.join(SNAPSHOT_MANIFEST);
    let json = serde_json::to_string_pretty(&manifest).map_err(|e| BackupError::Manifest {
        path: manifest_path.clone(),
        reason: e.to_string(),
    })?;
    fsutil::write_atomic(&manifest_path, json)?;

    debug!("Snapshot of {} file(s) for {} in {}", files.len(), plugin, dir.display());
    Ok(())
}

pub(super) fn read_manifest(dir: &Path) -> Result<Option<SnapshotManifest>, BackupError> {
    let path = dir.join(SNAPSHOT_MANIFEST);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| BackupError::Manifest {
            path,
            reason: e.to_string(),
        })
}

pub(super) fn restore(dir: &Path) -> Result<bool, BackupError> {
    let Some(manifest) = read_manifest(dir)? else {
        return Ok(false);
    };

    for file in &manifest.files {
        if file.existed {
            fsutil::copy_atomic(&dir.join(&file.backup_name), &file.path).map_err(|source| {
                BackupError::Copy {
                    path: file.path.clone(),
                    source,
                }
            })?;
        } else if file.path.exists() {
            std::fs::remove_file(&file.path)?;
        }
    }

    debug!("Restored snapshot for {} from {}", manifest.plugin, dir.display());
    Ok(true)
}
