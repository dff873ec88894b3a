//! Theme plugins: adapters that push a palette into one application.

mod builtin;
mod manifest;
mod snapshot;
mod template_plugin;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{BackupError, PluginApplyError};
use crate::template::TemplateContext;

pub use builtin::builtin_specs;
pub use manifest::{IncludeDirective, IncludePlacement, PluginSpec};
pub use snapshot::{SNAPSHOT_MANIFEST, SnapshotFile, SnapshotManifest};
pub use template_plugin::TemplatePlugin;

/// Contract every theme plugin implements.
///
/// A plugin owns the config files of a single application. The applier calls
/// it in this order during an apply:
///
/// 1. `is_available()` at call time; unavailable plugins are skipped.
/// 2. `backup(dir)` once, before the first apply ever touches its files.
/// 3. `apply_theme(ctx)` with the resolved palette variables.
/// 4. `reload()` so a running application picks up the new files.
///
/// Implementations must be Send + Sync; applies run on a worker thread.
pub trait ThemePlugin: Send + Sync {
    /// Unique identifier (e.g. "kitty").
    fn name(&self) -> &str;

    /// Human-readable label.
    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    /// Primary config file this plugin generates.
    fn config_path(&self) -> &Path;

    /// Template used to render `config_path`.
    fn template_name(&self) -> &str;

    /// Every file `apply_theme` may modify. Backups cover exactly these.
    fn target_files(&self) -> Vec<PathBuf> {
        vec![self.config_path().to_path_buf()]
    }

    /// Whether the target application is installed and the plugin can run.
    fn is_available(&self) -> bool;

    /// Write the application's config from `ctx`.
    fn apply_theme(&self, ctx: &TemplateContext) -> Result<(), PluginApplyError>;

    /// Snapshot `target_files()` into `dir`.
    ///
    /// The default implementation copies each existing file and writes a
    /// [`SnapshotManifest`] last, so a manifest only exists for a complete
    /// snapshot.
    fn backup(&self, dir: &Path) -> Result<(), BackupError> {
        snapshot::create(self.name(), &self.target_files(), dir)
    }

    /// Put the snapshot in `dir` back in place. Returns false when `dir`
    /// holds no snapshot.
    ///
    /// Files that did not exist when the snapshot was taken are removed.
    fn restore(&self, dir: &Path) -> Result<bool, BackupError> {
        snapshot::restore(dir)
    }

    /// Ask the running application to re-read its config.
    ///
    /// Default implementation is a no-op for applications that watch their
    /// own files.
    fn reload(&self) -> Result<(), PluginApplyError> {
        Ok(())
    }
}

/// Listing entry for a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub config_path: PathBuf,
    pub template_name: String,
    /// Result of `is_available()` when the descriptor was built.
    pub available: bool,
    pub enabled: bool,
}

impl PluginDescriptor {
    pub fn describe(plugin: &dyn ThemePlugin, enabled: bool) -> Self {
        Self {
            name: plugin.name().to_string(),
            display_name: plugin.display_name().to_string(),
            description: plugin.description().to_string(),
            config_path: plugin.config_path().to_path_buf(),
            template_name: plugin.template_name().to_string(),
            available: plugin.is_available(),
            enabled,
        }
    }
}
