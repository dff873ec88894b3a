//! Error types for theme-manager.
//!
//! `Error` is the crate-wide error. The per-facet types below it mirror how
//! failures propagate through an apply call: extraction and wallpaper errors
//! abort only their own facet, plugin errors stay with their plugin, and
//! backup/cache errors are downgraded to warnings by the caller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration:\n  {}", .0.join("\n  "))]
    ConfigValidation(Vec<String>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    WallpaperSet(#[from] WallpaperSetError),

    #[error(transparent)]
    PluginApply(#[from] PluginApplyError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    CacheIo(#[from] CacheIoError),

    #[error("a theme is already being applied")]
    AlreadyApplying,

    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),
}

/// Failure to turn an image into a palette.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("color extraction tool '{program}' is not installed")]
    ToolMissing { program: String },

    #[error("cannot read image {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("'{program}' exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' did not finish within {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("malformed palette output: {0}")]
    MalformedOutput(String),

    #[error("I/O error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to set the desktop wallpaper.
#[derive(Debug, Error)]
pub enum WallpaperSetError {
    #[error("wallpaper file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("no wallpaper setter found (tried: {})", .tried.join(", "))]
    NoSetter { tried: Vec<String> },

    #[error("wallpaper setter '{tool}' failed: {reason}")]
    SetterFailed { tool: String, reason: String },
}

/// Failure of a single plugin's apply step.
#[derive(Debug, Error)]
pub enum PluginApplyError {
    #[error("template '{0}' not found")]
    TemplateMissing(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to update {}: {source}", path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Failure to snapshot or restore a plugin's config files.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup of {} failed: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("backup manifest {} is unreadable: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("backup I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to read or persist the palette cache file.
#[derive(Debug, Error)]
pub enum CacheIoError {
    #[error("failed to read palette cache {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write palette cache {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("cannot stat wallpaper {}: {reason}", path.display())]
    Source { path: PathBuf, reason: String },
}
