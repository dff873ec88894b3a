//! Plugin discovery, ordering and enabled state.
//!
//! Run order is declaration order: built-ins first, then user manifests
//! sorted by file name. `plugins.order` in the settings moves the listed
//! names to the front. Enabled flags persist in `plugins.json`; a plugin
//! without a stored flag is enabled.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fsutil;
use crate::plugin::{PluginDescriptor, PluginSpec, TemplatePlugin, ThemePlugin, builtin_specs};
use crate::template::TemplateSource;

/// Inputs for [`PluginRegistry::discover`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Directory of `*.toml` plugin manifests.
    pub manifest_dir: Option<PathBuf>,
    /// Template override directory.
    pub template_dir: Option<PathBuf>,
    /// Where enabled flags are persisted; None keeps them in memory.
    pub state_file: Option<PathBuf>,
    pub order: Vec<String>,
    pub reload_timeout: Duration,
    /// Register the built-in plugins.
    pub include_builtins: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            manifest_dir: None,
            template_dir: None,
            state_file: None,
            order: Vec::new(),
            reload_timeout: Duration::from_secs(10),
            include_builtins: true,
        }
    }
}

/// A plugin definition that was skipped during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedPlugin {
    pub source: PathBuf,
    pub reason: String,
}

/// What discovery found.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<RejectedPlugin>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginStateFile {
    #[serde(default)]
    enabled: BTreeMap<String, bool>,
}

/// Registered plugins plus their enabled flags.
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn ThemePlugin>>,
    enabled: RwLock<BTreeMap<String, bool>>,
    state_file: Option<PathBuf>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .field("state_file", &self.state_file)
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry; flags persist to `state_file` when given.
    pub fn new(state_file: Option<PathBuf>) -> Self {
        let enabled = state_file
            .as_deref()
            .map(load_state)
            .unwrap_or_default();
        Self {
            plugins: Vec::new(),
            enabled: RwLock::new(enabled),
            state_file,
        }
    }

    /// Build a registry from the built-ins and the manifest directory.
    ///
    /// Bad manifests are recorded in the report and skipped.
    pub fn discover(config: &DiscoveryConfig) -> (Self, DiscoveryReport) {
        let mut registry = Self::new(config.state_file.clone());
        let mut report = DiscoveryReport::default();
        let templates = TemplateSource::new(config.template_dir.clone());

        if config.include_builtins {
            for spec in builtin_specs() {
                let plugin = TemplatePlugin::new(spec, templates.clone(), config.reload_timeout);
                registry.push_reporting(Arc::new(plugin), PathBuf::from("<builtin>"), &mut report);
            }
        }

        if let Some(dir) = &config.manifest_dir {
            for path in manifest_files(dir) {
                match load_manifest(&path, &templates) {
                    Ok(spec) => {
                        let plugin =
                            TemplatePlugin::new(spec, templates.clone(), config.reload_timeout);
                        registry.push_reporting(Arc::new(plugin), path, &mut report);
                    }
                    Err(reason) => {
                        warn!("Skipping plugin manifest {}: {}", path.display(), reason);
                        report.rejected.push(RejectedPlugin {
                            source: path,
                            reason,
                        });
                    }
                }
            }
        }

        registry.apply_order(&config.order);
        info!(
            "Discovered {} plugin(s), rejected {}",
            registry.plugins.len(),
            report.rejected.len()
        );
        (registry, report)
    }

    fn push_reporting(
        &mut self,
        plugin: Arc<dyn ThemePlugin>,
        source: PathBuf,
        report: &mut DiscoveryReport,
    ) {
        let name = plugin.name().to_string();
        match self.register(plugin) {
            Ok(()) => report.loaded.push(name),
            Err(e) => {
                warn!("Skipping plugin from {}: {}", source.display(), e);
                report.rejected.push(RejectedPlugin {
                    source,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Add a plugin at the end of the run order. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn ThemePlugin>) -> Result<()> {
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(Error::ConfigValidation(vec![format!(
                "plugin '{}' is already registered",
                plugin.name()
            )]));
        }
        debug!("Registered plugin {}", plugin.name());
        self.plugins.push(plugin);
        Ok(())
    }

    /// Move `order`'s names to the front, in that order. Unknown names are
    /// ignored with a warning.
    pub fn apply_order(&mut self, order: &[String]) {
        let mut front = Vec::new();
        for name in order {
            match self.plugins.iter().position(|p| p.name() == name.as_str()) {
                Some(index) => front.push(self.plugins.remove(index)),
                None => warn!("plugins.order: unknown plugin '{}'", name),
            }
        }
        front.append(&mut self.plugins);
        self.plugins = front;
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ThemePlugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.read().get(name).copied().unwrap_or(true)
    }

    /// Every registered plugin, in run order.
    pub fn plugins(&self) -> Vec<PluginDescriptor> {
        self.plugins
            .iter()
            .map(|p| PluginDescriptor::describe(p.as_ref(), self.is_enabled(p.name())))
            .collect()
    }

    /// Plugins to run now: enabled and available, in run order.
    ///
    /// Availability is checked on every call.
    pub fn enabled_plugins(&self) -> Vec<Arc<dyn ThemePlugin>> {
        self.plugins
            .iter()
            .filter(|p| self.is_enabled(p.name()) && p.is_available())
            .cloned()
            .collect()
    }

    /// Descriptors of [`PluginRegistry::enabled_plugins`].
    pub fn enabled(&self) -> Vec<PluginDescriptor> {
        self.enabled_plugins()
            .iter()
            .map(|p| PluginDescriptor::describe(p.as_ref(), true))
            .collect()
    }

    /// Toggle a plugin and persist the flag.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        if self.get(name).is_none() {
            return Err(Error::UnknownPlugin(name.to_string()));
        }

        let mut flags = self.enabled.write();
        let previous = flags.insert(name.to_string(), enabled);
        if let Err(e) = self.save_state(&flags) {
            match previous {
                Some(value) => flags.insert(name.to_string(), value),
                None => flags.remove(name),
            };
            return Err(e);
        }
        info!("Plugin {} {}", name, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    fn save_state(&self, flags: &BTreeMap<String, bool>) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let state = PluginStateFile {
            enabled: flags.clone(),
        };
        fsutil::write_atomic(path, serde_json::to_string_pretty(&state)?)?;
        Ok(())
    }
}

fn load_state(path: &Path) -> BTreeMap<String, bool> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Cannot read plugin state {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };
    match serde_json::from_str::<PluginStateFile>(&text) {
        Ok(state) => state.enabled,
        Err(e) => {
            warn!("Ignoring corrupt plugin state {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

fn manifest_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    files.sort();
    files
}

fn load_manifest(path: &Path, templates: &TemplateSource) -> std::result::Result<PluginSpec, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let spec: PluginSpec = toml::from_str(&text).map_err(|e| e.to_string())?;
    spec.validate().map_err(|errors| errors.join("; "))?;
    if !templates.exists(&spec.template) {
        return Err(format!("template '{}' not found", spec.template));
    }
    Ok(spec)
}
