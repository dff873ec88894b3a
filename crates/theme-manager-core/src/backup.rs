//! One-time backups of plugin config files.
//!
//! The first time a plugin is applied its target files are snapshotted into
//! `backups/<plugin>/`. The snapshot manifest doubles as the persisted
//! "already backed up" marker, so later applies (in this run or any later
//! one) never overwrite the user's original files in the backup.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::BackupError;
use crate::plugin::{SNAPSHOT_MANIFEST, ThemePlugin};

/// Result of [`BackupManager::backup_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    root: PathBuf,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Backup directory of plugin `name`.
    pub fn dir_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn has_backup(&self, name: &str) -> bool {
        self.dir_for(name).join(SNAPSHOT_MANIFEST).is_file()
    }

    /// Snapshot `plugin`'s files unless a snapshot already exists.
    pub fn backup_if_absent(&self, plugin: &dyn ThemePlugin) -> Result<BackupOutcome, BackupError> {
        if self.has_backup(plugin.name()) {
            return Ok(BackupOutcome::AlreadyPresent);
        }
        plugin.backup(&self.dir_for(plugin.name()))?;
        info!("Backed up {} config to {}", plugin.name(), self.dir_for(plugin.name()).display());
        Ok(BackupOutcome::Created)
    }

    /// Restore `plugin`'s snapshot and ask it to reload.
    ///
    /// Returns false when there is nothing to restore. A failed reload is
    /// logged; the files are already back in place.
    pub fn restore(&self, plugin: &dyn ThemePlugin) -> Result<bool, BackupError> {
        if !plugin.restore(&self.dir_for(plugin.name()))? {
            return Ok(false);
        }
        info!("Restored {} config", plugin.name());
        if let Err(e) = plugin.reload() {
            warn!("{} did not reload after restore: {}", plugin.name(), e);
        }
        Ok(true)
    }

    /// Delete `name`'s snapshot so the next apply takes a fresh one.
    pub fn discard(&self, name: &str) -> Result<(), BackupError> {
        let dir = self.dir_for(name);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
