//! The apply pipeline.
//!
//! One call moves through
//! `Idle -> ResolvingPalette -> SettingWallpaper -> ApplyingPlugins -> Reporting -> Idle`,
//! skipping the phases its mode does not need:
//!
//! | Mode           | Wallpaper | Palette (applied) | Plugins |
//! |----------------|-----------|-------------------|---------|
//! | wallpaper-only | yes       | no                | no      |
//! | colors-only    | no        | yes               | yes     |
//! | full           | yes       | yes               | yes     |
//!
//! Extraction failure is the only error that aborts a call, and it does so
//! before anything is written. Wallpaper and plugin failures are recorded in
//! the report; one plugin failing never stops the next.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backup::{BackupManager, BackupOutcome};
use crate::cache::PaletteCache;
use crate::error::Result;
use crate::extractor::{ExtractionMode, PaletteExtractor};
use crate::palette::Palette;
use crate::paths;
use crate::plugin::ThemePlugin;
use crate::state::AppliedState;
use crate::template::TemplateContext;
use crate::wallpaper::WallpaperSetter;

/// Which facets an apply touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplyMode {
    WallpaperOnly,
    ColorsOnly,
    Full,
}

impl ApplyMode {
    pub fn sets_wallpaper(self) -> bool {
        matches!(self, ApplyMode::WallpaperOnly | ApplyMode::Full)
    }

    pub fn applies_colors(self) -> bool {
        matches!(self, ApplyMode::ColorsOnly | ApplyMode::Full)
    }
}

impl FromStr for ApplyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "wallpaper" | "wallpaper-only" => Ok(ApplyMode::WallpaperOnly),
            "colors" | "colors-only" => Ok(ApplyMode::ColorsOnly),
            "full" => Ok(ApplyMode::Full),
            other => Err(format!(
                "invalid apply mode '{}', expected one of: wallpaper, colors, full",
                other
            )),
        }
    }
}

impl fmt::Display for ApplyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyMode::WallpaperOnly => "wallpaper",
            ApplyMode::ColorsOnly => "colors",
            ApplyMode::Full => "full",
        })
    }
}

/// Pipeline state, reported to the caller as it advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Idle,
    ResolvingPalette,
    SettingWallpaper,
    ApplyingPlugins,
    Reporting,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApplyPhase::Idle => "idle",
            ApplyPhase::ResolvingPalette => "resolving palette",
            ApplyPhase::SettingWallpaper => "setting wallpaper",
            ApplyPhase::ApplyingPlugins => "applying plugins",
            ApplyPhase::Reporting => "reporting",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyRequest {
    pub wallpaper: PathBuf,
    pub mode: ApplyMode,
    /// Replace color9..color15 with fixed bright colors before rendering.
    pub standard_brights: bool,
}

impl ApplyRequest {
    pub fn new(wallpaper: impl Into<PathBuf>, mode: ApplyMode) -> Self {
        Self {
            wallpaper: wallpaper.into(),
            mode,
            standard_brights: false,
        }
    }

    pub fn with_standard_brights(mut self, enabled: bool) -> Self {
        self.standard_brights = enabled;
        self
    }
}

/// Where the palette of an apply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteSource {
    Cache,
    Extracted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum WallpaperOutcome {
    NotRequested,
    Set,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum PluginOutcome {
    Success,
    Failure(String),
    /// The application disappeared between listing and running.
    SkippedUnavailable,
}

/// Outcome of one plugin within an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginResult {
    pub plugin: String,
    pub display_name: String,
    pub outcome: PluginOutcome,
    /// Backup problem, reported separately from the apply outcome.
    pub backup_warning: Option<String>,
}

/// Everything an apply did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyReport {
    pub mode: ApplyMode,
    pub wallpaper: PathBuf,
    pub palette_source: Option<PaletteSource>,
    pub palette: Option<Palette>,
    pub wallpaper_outcome: WallpaperOutcome,
    /// One entry per plugin run, in run order.
    pub plugins: Vec<PluginResult>,
    /// Non-fatal problems (cache writes, state file, backups).
    pub warnings: Vec<String>,
}

/// What the UI shows after an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Per-plugin breakdown.
    Detailed(Vec<PluginResult>),
    /// Single message for the common case.
    Aggregate { success: bool, message: String },
}

impl ApplyReport {
    pub fn succeeded(&self) -> usize {
        self.plugins
            .iter()
            .filter(|r| r.outcome == PluginOutcome::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.plugins
            .iter()
            .filter(|r| matches!(r.outcome, PluginOutcome::Failure(_)))
            .count()
    }

    /// No plugin failed and the wallpaper (if requested) was set.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && !matches!(self.wallpaper_outcome, WallpaperOutcome::Failed(_))
    }

    /// Detailed results when `show_details`, otherwise a single summary.
    pub fn notification(&self, show_details: bool) -> Notification {
        if show_details {
            return Notification::Detailed(self.plugins.clone());
        }

        let mut parts = Vec::new();
        match &self.wallpaper_outcome {
            WallpaperOutcome::NotRequested => {}
            WallpaperOutcome::Set => parts.push("wallpaper set".to_string()),
            WallpaperOutcome::Failed(_) => parts.push("wallpaper failed".to_string()),
        }
        if self.mode.applies_colors() {
            let ran = self.succeeded() + self.failed();
            parts.push(format!("{}/{} applications themed", self.succeeded(), ran));
        }

        Notification::Aggregate {
            success: self.is_success(),
            message: if parts.is_empty() {
                "nothing to do".to_string()
            } else {
                parts.join(", ")
            },
        }
    }
}

/// Runs apply calls against shared components.
///
/// The applier itself does not serialize calls; callers admit one apply at a
/// time (see `ThemeService`).
pub struct ThemeApplier {
    cache: Arc<PaletteCache>,
    extractor: Arc<dyn PaletteExtractor>,
    setter: Arc<dyn WallpaperSetter>,
    backups: BackupManager,
    state_file: Option<PathBuf>,
}

impl ThemeApplier {
    pub fn new(
        cache: Arc<PaletteCache>,
        extractor: Arc<dyn PaletteExtractor>,
        setter: Arc<dyn WallpaperSetter>,
        backups: BackupManager,
    ) -> Self {
        Self {
            cache,
            extractor,
            setter,
            backups,
            state_file: None,
        }
    }

    /// Record applied state to `path` after successful applies.
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    pub fn cache(&self) -> &Arc<PaletteCache> {
        &self.cache
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Run one apply. `plugins` are run in the given order.
    pub fn apply(
        &self,
        request: &ApplyRequest,
        plugins: &[Arc<dyn ThemePlugin>],
        mut on_phase: impl FnMut(ApplyPhase),
    ) -> Result<ApplyReport> {
        let wallpaper = paths::normalize(&request.wallpaper);
        let mut report = ApplyReport {
            mode: request.mode,
            wallpaper: wallpaper.clone(),
            palette_source: None,
            palette: None,
            wallpaper_outcome: WallpaperOutcome::NotRequested,
            plugins: Vec::new(),
            warnings: Vec::new(),
        };
        info!("Applying {} ({})", wallpaper.display(), request.mode);

        if request.mode.applies_colors() {
            on_phase(ApplyPhase::ResolvingPalette);
            let result = self.resolve_palette(&wallpaper, &mut report.warnings);
            let (palette, source) = match result {
                Ok(resolved) => resolved,
                Err(e) => {
                    on_phase(ApplyPhase::Idle);
                    return Err(e);
                }
            };
            let palette = if request.standard_brights {
                palette.with_standard_brights()
            } else {
                palette
            };
            report.palette_source = Some(source);
            report.palette = Some(palette);
        }

        if request.mode.sets_wallpaper() {
            on_phase(ApplyPhase::SettingWallpaper);
            report.wallpaper_outcome = match self.setter.set_wallpaper(&wallpaper) {
                Ok(()) => WallpaperOutcome::Set,
                Err(e) => {
                    warn!("Wallpaper not set: {}", e);
                    WallpaperOutcome::Failed(e.to_string())
                }
            };
        }

        if let Some(palette) = &report.palette {
            on_phase(ApplyPhase::ApplyingPlugins);
            let ctx = TemplateContext::from_palette(palette, Some(&wallpaper));
            report.plugins = plugins
                .iter()
                .map(|plugin| self.run_plugin(plugin.as_ref(), &ctx))
                .collect();
        }

        on_phase(ApplyPhase::Reporting);
        self.record_state(&report);
        info!(
            "Apply finished: {} succeeded, {} failed",
            report.succeeded(),
            report.failed()
        );
        on_phase(ApplyPhase::Idle);
        Ok(report)
    }

    fn resolve_palette(
        &self,
        wallpaper: &Path,
        warnings: &mut Vec<String>,
    ) -> Result<(Palette, PaletteSource)> {
        if let Some(palette) = self.cache.get(wallpaper) {
            debug!("Palette cache hit for {}", wallpaper.display());
            return Ok((palette, PaletteSource::Cache));
        }

        debug!("Palette cache miss for {}", wallpaper.display());
        let palette = self.extractor.extract(wallpaper, ExtractionMode::Applied)?;
        if let Err(e) = self.cache.put(wallpaper, palette.clone()) {
            warn!("{}", e);
            warnings.push(e.to_string());
        }
        Ok((palette, PaletteSource::Extracted))
    }

    fn run_plugin(&self, plugin: &dyn ThemePlugin, ctx: &TemplateContext) -> PluginResult {
        let mut result = PluginResult {
            plugin: plugin.name().to_string(),
            display_name: plugin.display_name().to_string(),
            outcome: PluginOutcome::Success,
            backup_warning: None,
        };

        if !plugin.is_available() {
            debug!("Plugin {} became unavailable, skipping", plugin.name());
            result.outcome = PluginOutcome::SkippedUnavailable;
            return result;
        }

        match self.backups.backup_if_absent(plugin) {
            Ok(BackupOutcome::Created | BackupOutcome::AlreadyPresent) => {}
            Err(e) => {
                warn!("Backup of {} failed: {}", plugin.name(), e);
                result.backup_warning = Some(e.to_string());
            }
        }

        match plugin.apply_theme(ctx) {
            Ok(()) => {
                info!("Applied theme to {}", plugin.name());
                if let Err(e) = plugin.reload() {
                    warn!("{} did not reload: {}", plugin.name(), e);
                }
            }
            Err(e) => {
                warn!("Plugin {} failed: {}", plugin.name(), e);
                result.outcome = PluginOutcome::Failure(e.to_string());
            }
        }
        result
    }

    fn record_state(&self, report: &ApplyReport) {
        let Some(path) = &self.state_file else {
            return;
        };

        let wallpaper_set = report.wallpaper_outcome == WallpaperOutcome::Set;
        let themed: Vec<String> = report
            .plugins
            .iter()
            .filter(|r| r.outcome == PluginOutcome::Success)
            .map(|r| r.plugin.clone())
            .collect();
        let colors_applied = report.palette.is_some() && !themed.is_empty();

        if !wallpaper_set && !colors_applied {
            return;
        }

        let result = AppliedState::update(path, |state| {
            if wallpaper_set {
                state.record_wallpaper(&report.wallpaper);
            }
            if colors_applied && let Some(palette) = &report.palette {
                state.record_colors(&report.wallpaper, palette, themed);
            }
        });
        if let Err(e) = result {
            warn!("Cannot record applied state: {}", e);
        }
    }
}
