//! User settings: loading, validation and persistence.
//!
//! Settings live in a TOML document. The embedded default document is parsed
//! first and the user's file is deep-merged over it, so a user file only
//! needs the keys it changes. Every section rejects unknown keys.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use toml::Table;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::fsutil;
use crate::paths;

/// Known valid values for ui.backend.
const VALID_UI_BACKENDS: &[&str] = &["gtk", "qt"];

/// Known valid values for wallpaper.setter.
const VALID_SETTERS: &[&str] = &["auto", "swww", "hyprpaper", "feh", "nitrogen"];

/// Embedded default settings TOML, compiled into the binary.
pub const DEFAULT_SETTINGS_TOML: &str = include_str!("../../../settings.toml");

/// Result of locating and loading a settings file.
#[derive(Debug)]
pub struct SettingsLoadResult {
    pub settings: Settings,
    /// Path the settings were read from, if any.
    pub source: Option<PathBuf>,
    /// True when no file existed and the embedded defaults were used.
    pub used_defaults: bool,
}

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ui: UiSettings,
    pub wallpaper: WallpaperSettings,
    pub theme: ThemeSettings,
    pub extractor: ExtractorSettings,
    pub plugins: PluginSettings,
}

impl Settings {
    /// Parse the embedded default document.
    pub fn from_default_toml() -> Result<Self> {
        Ok(toml::from_str(DEFAULT_SETTINGS_TOML)?)
    }

    /// Load a settings file, merging it over the embedded defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::load_with_defaults(&content)
    }

    /// Parse `user_toml` and deep-merge it over the embedded defaults.
    pub fn load_with_defaults(user_toml: &str) -> Result<Self> {
        let mut base: Table = toml::from_str(DEFAULT_SETTINGS_TOML)
            .expect("embedded DEFAULT_SETTINGS_TOML should always be valid");
        let user: Table = toml::from_str(user_toml)?;

        deep_merge_toml(&mut base, user);

        Ok(base.try_into()?)
    }

    /// Find and load settings.
    ///
    /// An explicit path is used strictly. Otherwise the search chain from
    /// [`Settings::search_paths`] is walked; a file that exists but fails to
    /// load is an error, and only when no file exists are defaults used.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<SettingsLoadResult> {
        if let Some(path) = explicit_path {
            let settings = Self::load(path)?;
            return Ok(SettingsLoadResult {
                settings,
                source: Some(path.to_path_buf()),
                used_defaults: false,
            });
        }

        let search_paths = Self::search_paths();
        for path in &search_paths {
            if path.exists() {
                return match Self::load(path) {
                    Ok(settings) => Ok(SettingsLoadResult {
                        settings,
                        source: Some(path.clone()),
                        used_defaults: false,
                    }),
                    Err(e) => {
                        tracing::error!("Settings file {:?} exists but failed to load: {}", path, e);
                        Err(e)
                    }
                };
            }
        }

        info!("No settings file found, using built-in defaults");
        debug!(
            "Searched: {}",
            search_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(SettingsLoadResult {
            settings: Self::from_default_toml()?,
            source: None,
            used_defaults: true,
        })
    }

    /// Paths searched for a settings file, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let file = Path::new(paths::APP_DIR_NAME).join(paths::SETTINGS_FILE);

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME")
            && !xdg_config.is_empty()
        {
            paths.push(PathBuf::from(xdg_config).join(&file));
        }
        if let Some(home) = paths::home_dir() {
            let candidate = home.join(".config").join(&file);
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }

        paths
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !VALID_UI_BACKENDS.contains(&self.ui.backend.as_str()) {
            errors.push(format!(
                "ui.backend: invalid value '{}', expected one of: {}",
                self.ui.backend,
                VALID_UI_BACKENDS.join(", ")
            ));
        }
        if self.ui.window_width == 0 {
            errors.push("ui.window_width: must be greater than 0".to_string());
        }
        if self.ui.window_height == 0 {
            errors.push("ui.window_height: must be greater than 0".to_string());
        }

        if self.wallpaper.directory.trim().is_empty() {
            errors.push("wallpaper.directory: must not be empty".to_string());
        }
        if !VALID_SETTERS.contains(&self.wallpaper.setter.as_str()) {
            errors.push(format!(
                "wallpaper.setter: invalid value '{}', expected one of: {}",
                self.wallpaper.setter,
                VALID_SETTERS.join(", ")
            ));
        }
        if self.wallpaper.timeout_secs == 0 {
            errors.push("wallpaper.timeout_secs: must be greater than 0".to_string());
        }

        if self.extractor.program.trim().is_empty() {
            errors.push("extractor.program: must not be empty".to_string());
        }
        if self.extractor.timeout_secs == 0 {
            errors.push("extractor.timeout_secs: must be greater than 0".to_string());
        }

        if self.plugins.reload_timeout_secs == 0 {
            errors.push("plugins.reload_timeout_secs: must be greater than 0".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.plugins.order {
            if !seen.insert(name.as_str()) {
                errors.push(format!("plugins.order: '{}' listed more than once", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ConfigValidation(errors))
        }
    }

    /// Human-readable overview.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push("UI:".to_string());
        lines.push(format!("  backend: {}", self.ui.backend));
        lines.push(format!(
            "  window: {}x{}{}",
            self.ui.window_width,
            self.ui.window_height,
            if self.ui.floating_window { " (floating)" } else { "" }
        ));

        lines.push("\nWallpaper:".to_string());
        lines.push(format!(
            "  directory: {}",
            self.wallpaper_directory().display()
        ));
        lines.push(format!("  live_preview: {}", self.wallpaper.live_preview));
        lines.push(format!("  setter: {}", self.wallpaper.setter));

        lines.push("\nTheme:".to_string());
        lines.push(format!(
            "  results: {}",
            if self.theme.show_results_dialog {
                "detailed"
            } else {
                "summary only"
            }
        ));
        lines.push(format!(
            "  standard_bright_colors: {}",
            self.theme.standard_bright_colors
        ));

        lines.push("\nExtractor:".to_string());
        lines.push(format!(
            "  program: {}{}",
            self.extractor.program,
            self.extractor
                .backend()
                .map(|b| format!(" (backend: {})", b))
                .unwrap_or_default()
        ));
        lines.push(format!("  timeout: {}s", self.extractor.timeout_secs));
        lines.push(format!("  cache_previews: {}", self.extractor.cache_previews));

        lines.push("\nPlugins:".to_string());
        if self.plugins.order.is_empty() {
            lines.push("  order: discovery order".to_string());
        } else {
            lines.push(format!("  order: {}", self.plugins.order.join(", ")));
        }

        lines.join("\n")
    }

    /// Active wallpaper directory with `~` expanded.
    pub fn wallpaper_directory(&self) -> PathBuf {
        paths::expand_tilde(&self.wallpaper.directory)
    }

    /// Copy of these settings with one `section.key` replaced.
    ///
    /// `raw` is interpreted according to the current type of the key: booleans
    /// accept true/false/yes/no/on/off, integers must parse, string lists are
    /// comma separated. The result is validated.
    pub fn with_value(&self, key: &str, raw: &str) -> Result<Self> {
        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| Error::UnknownSetting(key.to_string()))?;

        let mut document = toml::Value::try_from(self)?;
        let current = document
            .get_mut(section)
            .and_then(toml::Value::as_table_mut)
            .and_then(|t| t.get_mut(field))
            .ok_or_else(|| Error::UnknownSetting(key.to_string()))?;

        *current = parse_like(current, key, raw.trim())?;

        let updated: Settings = document.try_into()?;
        updated.validate()?;
        Ok(updated)
    }
}

fn parse_like(current: &toml::Value, key: &str, raw: &str) -> Result<toml::Value> {
    let invalid = |expected: &str| {
        Error::ConfigValidation(vec![format!(
            "{}: invalid value '{}', expected {}",
            key, raw, expected
        )])
    };

    Ok(match current {
        toml::Value::Boolean(_) => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => toml::Value::Boolean(true),
            "false" | "no" | "off" | "0" => toml::Value::Boolean(false),
            _ => return Err(invalid("a boolean")),
        },
        toml::Value::Integer(_) => {
            toml::Value::Integer(raw.parse().map_err(|_| invalid("an integer"))?)
        }
        toml::Value::Array(_) => toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_string()))
                .collect(),
        ),
        _ => toml::Value::String(raw.to_string()),
    })
}

/// Deep merge two TOML tables, with `overlay` values taking precedence.
///
/// Nested tables merge recursively; arrays and scalars are replaced.
fn deep_merge_toml(base: &mut Table, overlay: Table) {
    for (key, overlay_value) in overlay {
        match (base.get_mut(&key), overlay_value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(overlay_table)) => {
                deep_merge_toml(base_table, overlay_table);
            }
            (_, overlay_value) => {
                base.insert(key, overlay_value);
            }
        }
    }
}

/// Window and toolkit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UiSettings {
    /// "gtk" or "qt".
    pub backend: String,
    pub window_width: u32,
    pub window_height: u32,
    pub floating_window: bool,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            backend: "gtk".to_string(),
            window_width: 800,
            window_height: 600,
            floating_window: true,
        }
    }
}

/// Wallpaper directory and setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WallpaperSettings {
    /// The single active wallpaper directory.
    pub directory: String,
    pub live_preview: bool,
    /// "auto" or a specific tool name.
    pub setter: String,
    pub timeout_secs: u64,
}

impl Default for WallpaperSettings {
    fn default() -> Self {
        Self {
            directory: "~/Pictures/Wallpapers".to_string(),
            live_preview: true,
            setter: "auto".to_string(),
            timeout_secs: 15,
        }
    }
}

impl WallpaperSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Apply result presentation and palette tweaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeSettings {
    /// Detailed per-plugin results instead of one aggregate notification.
    pub show_results_dialog: bool,
    /// Override color9..color15 with fixed bright colors.
    pub standard_bright_colors: bool,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            show_results_dialog: true,
            standard_bright_colors: false,
        }
    }
}

/// Color extraction tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorSettings {
    pub program: String,
    /// pywal backend; empty means the tool's default.
    pub backend: String,
    pub timeout_secs: u64,
    pub cache_previews: bool,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            program: "wal".to_string(),
            backend: String::new(),
            timeout_secs: 60,
            cache_previews: true,
        }
    }
}

impl ExtractorSettings {
    pub fn backend(&self) -> Option<&str> {
        let backend = self.backend.trim();
        (!backend.is_empty()).then_some(backend)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Plugin ordering and reload behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginSettings {
    /// Names moved to the front of the run order, in this order.
    pub order: Vec<String>,
    pub reload_timeout_secs: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            reload_timeout_secs: 10,
        }
    }
}

impl PluginSettings {
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }
}

/// Loaded settings plus the file they are saved to.
///
/// Every mutation is validated first and flushed to disk synchronously; a
/// rejected change leaves both the file and the in-memory value untouched.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings via [`Settings::find_and_load`].
    ///
    /// When defaults were used, saves go to the first search path.
    pub fn open(explicit_path: Option<&Path>) -> Result<Self> {
        let loaded = Settings::find_and_load(explicit_path)?;
        let path = match loaded.source {
            Some(path) => path,
            None => Settings::search_paths()
                .into_iter()
                .next()
                .unwrap_or_else(|| paths::config_dir().join(paths::SETTINGS_FILE)),
        };
        Ok(Self::new(path, loaded.settings))
    }

    pub fn new(path: impl Into<PathBuf>, settings: Settings) -> Self {
        Self {
            path: path.into(),
            settings: RwLock::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Mutate, validate and save.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut guard = self.settings.write();
        let mut updated = guard.clone();
        f(&mut updated);
        updated.validate()?;
        self.write(&updated)?;
        *guard = updated;
        Ok(())
    }

    /// Set a single `section.key` from its textual form and save.
    pub fn set_value(&self, key: &str, raw: &str) -> Result<()> {
        let mut guard = self.settings.write();
        let updated = guard.with_value(key, raw)?;
        self.write(&updated)?;
        *guard = updated;
        info!("Set {} = {}", key, raw);
        Ok(())
    }

    /// Re-read the settings file, keeping the current value on failure.
    pub fn reload(&self) -> Result<()> {
        let settings = Settings::load(&self.path)?;
        settings.validate()?;
        *self.settings.write() = settings;
        debug!("Reloaded settings from {}", self.path.display());
        Ok(())
    }

    fn write(&self, settings: &Settings) -> Result<()> {
        let text = toml::to_string_pretty(settings)?;
        fsutil::write_atomic(&self.path, text)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.ui.backend, "gtk");
        assert_eq!(settings.ui.window_width, 800);
        assert_eq!(settings.ui.window_height, 600);
        assert_eq!(settings.wallpaper.directory, "~/Pictures/Wallpapers");
        assert_eq!(settings.wallpaper.setter, "auto");
        assert!(settings.theme.show_results_dialog);
        assert_eq!(settings.extractor.program, "wal");
        assert_eq!(settings.extractor.backend(), None);
    }

    #[test]
    fn test_embedded_default_matches_struct_defaults() {
        let from_toml = Settings::from_default_toml().expect("embedded default should parse");
        assert_eq!(from_toml, Settings::default());
        assert!(from_toml.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults_nested_override() {
        let settings = Settings::load_with_defaults(
            r#"
            [theme]
            show_results_dialog = false
        "#,
        )
        .unwrap();

        assert!(!settings.theme.show_results_dialog);
        assert!(!settings.theme.standard_bright_colors);
        assert_eq!(settings.ui.window_width, 800);
    }

    #[test]
    fn test_load_with_defaults_empty() {
        let settings = Settings::load_with_defaults("").unwrap();
        assert_eq!(settings, Settings::from_default_toml().unwrap());
    }

    #[test]
    fn test_deep_merge_toml_arrays_replace() {
        let mut base: Table = toml::from_str("[plugins]\norder = [\"a\", \"b\"]\nx = 1").unwrap();
        let overlay: Table = toml::from_str("[plugins]\norder = [\"c\"]").unwrap();
        deep_merge_toml(&mut base, overlay);

        let plugins = base["plugins"].as_table().unwrap();
        assert_eq!(plugins["order"].as_array().unwrap().len(), 1);
        assert_eq!(plugins["x"].as_integer(), Some(1));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = Settings::load_with_defaults("[ui]\ncolour = \"red\"");
        assert!(matches!(result, Err(Error::TomlParse(_))));

        let result = Settings::load_with_defaults("[window]\nwidth = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_multiple_errors() {
        let mut settings = Settings::default();
        settings.ui.backend = "tk".to_string();
        settings.wallpaper.setter = "xwallpaper".to_string();
        settings.extractor.timeout_secs = 0;

        let msg = settings.validate().unwrap_err().to_string();
        assert!(msg.contains("ui.backend"));
        assert!(msg.contains("tk"));
        assert!(msg.contains("wallpaper.setter"));
        assert!(msg.contains("extractor.timeout_secs"));
    }

    #[test]
    fn test_validate_duplicate_order() {
        let mut settings = Settings::default();
        settings.plugins.order = vec!["kitty".into(), "kitty".into()];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_with_value_types() {
        let settings = Settings::default();

        let s = settings.with_value("theme.show_results_dialog", "off").unwrap();
        assert!(!s.theme.show_results_dialog);

        let s = settings.with_value("ui.window_width", "1024").unwrap();
        assert_eq!(s.ui.window_width, 1024);

        let s = settings.with_value("wallpaper.directory", "/srv/walls").unwrap();
        assert_eq!(s.wallpaper_directory(), PathBuf::from("/srv/walls"));

        let s = settings.with_value("plugins.order", "kitty, waybar").unwrap();
        assert_eq!(s.plugins.order, vec!["kitty", "waybar"]);
    }

    #[test]
    fn test_with_value_rejects_bad_input() {
        let settings = Settings::default();
        assert!(matches!(
            settings.with_value("ui.nope", "1"),
            Err(Error::UnknownSetting(_))
        ));
        assert!(matches!(
            settings.with_value("nodot", "1"),
            Err(Error::UnknownSetting(_))
        ));
        assert!(matches!(
            settings.with_value("ui.window_width", "wide"),
            Err(Error::ConfigValidation(_))
        ));
        assert!(settings.with_value("ui.backend", "tk").is_err());
    }

    #[test]
    fn test_store_saves_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme-manager/settings.toml");
        let store = SettingsStore::new(&path, Settings::default());

        store.set_value("wallpaper.live_preview", "false").unwrap();
        assert!(!store.get().wallpaper.live_preview);

        let reloaded = Settings::load(&path).unwrap();
        assert!(!reloaded.wallpaper.live_preview);

        store.update(|s| s.ui.window_height = 720).unwrap();
        assert_eq!(Settings::load(&path).unwrap().ui.window_height, 720);
    }

    #[test]
    fn test_store_rejected_change_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let store = SettingsStore::new(&path, Settings::default());

        assert!(store.update(|s| s.ui.window_width = 0).is_err());
        assert_eq!(store.get().ui.window_width, 800);
        assert!(!path.exists());
    }

    #[test]
    fn test_summary_mentions_sections() {
        let summary = Settings::default().summary();
        assert!(summary.contains("UI:"));
        assert!(summary.contains("Wallpaper:"));
        assert!(summary.contains("Extractor:"));
        assert!(summary.contains("discovery order"));
    }
}
