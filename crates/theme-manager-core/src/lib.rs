//! theme-manager core: palette extraction and caching, application plugins
//! and the apply pipeline that ties them together.

pub mod applier;
pub mod backup;
pub mod cache;
pub mod error;
pub mod extractor;
pub mod fsutil;
pub mod logging;
pub mod palette;
pub mod paths;
pub mod plugin;
pub mod process;
pub mod registry;
pub mod service;
pub mod settings;
pub mod state;
pub mod template;
pub mod wallpaper;

pub use applier::{
    ApplyMode, ApplyPhase, ApplyReport, ApplyRequest, Notification, PaletteSource, PluginOutcome,
    PluginResult, ThemeApplier, WallpaperOutcome,
};
pub use backup::{BackupManager, BackupOutcome};
pub use cache::{CacheStatus, PaletteCache};
pub use error::{
    BackupError, CacheIoError, Error, ExtractionError, PluginApplyError, Result, WallpaperSetError,
};
pub use extractor::{ExtractionMode, PaletteExtractor, PywalExtractor};
pub use palette::{Palette, Rgb, SpecialColors};
pub use paths::ConfigLayout;
pub use plugin::{PluginDescriptor, PluginSpec, TemplatePlugin, ThemePlugin};
pub use registry::{DiscoveryConfig, DiscoveryReport, PluginRegistry, RejectedPlugin};
pub use service::{ScanSummary, ServiceEvent, ServiceParts, ThemeService};
pub use settings::{Settings, SettingsLoadResult, SettingsStore};
pub use state::AppliedState;
pub use template::{TemplateContext, TemplateSource};
pub use wallpaper::{CommandWallpaperSetter, WallpaperSetter, WallpaperTool};
