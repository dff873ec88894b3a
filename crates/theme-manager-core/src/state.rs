//! Record of what is currently applied (`applied.json`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::fsutil;
use crate::palette::Palette;

/// The wallpaper and palette last pushed to the desktop.
///
/// Only confirmed applies write this; previews never do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppliedState {
    pub wallpaper: Option<PathBuf>,
    pub wallpaper_set_at: Option<DateTime<Utc>>,
    /// Wallpaper the current palette was extracted from.
    pub colors_source: Option<PathBuf>,
    pub palette: Option<Palette>,
    pub colors_applied_at: Option<DateTime<Utc>>,
    /// Plugins that applied the palette successfully.
    pub plugins: Vec<String>,
}

impl AppliedState {
    /// Read the state file. A missing file is `None`; a corrupt one is logged
    /// and also treated as `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Ignoring corrupt applied state {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fsutil::write_atomic(path, json)?;
        Ok(())
    }

    /// Load, modify and save in one step.
    pub fn update(path: &Path, f: impl FnOnce(&mut AppliedState)) -> Result<AppliedState> {
        let mut state = Self::load(path).unwrap_or_default();
        f(&mut state);
        state.save(path)?;
        Ok(state)
    }

    pub fn record_wallpaper(&mut self, wallpaper: &Path) {
        self.wallpaper = Some(wallpaper.to_path_buf());
        self.wallpaper_set_at = Some(Utc::now());
    }

    pub fn record_colors(&mut self, source: &Path, palette: &Palette, plugins: Vec<String>) {
        self.colors_source = Some(source.to_path_buf());
        self.palette = Some(palette.clone());
        self.colors_applied_at = Some(Utc::now());
        self.plugins = plugins;
    }
}
