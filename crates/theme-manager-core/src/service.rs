//! Background workers and the event channel to the UI.
//!
//! ## Threads
//!
//! The UI thread owns the `Receiver<ServiceEvent>` returned by the
//! constructors and is the only place results are consumed. Each long-running
//! request (apply, preview, scan) spawns one worker thread that posts its
//! progress and result to the channel and exits.
//!
//! ## Admission
//!
//! At most one apply (or restore) runs at a time. Admission is a single
//! compare-and-swap on a flag that an RAII guard clears, so a panicking worker
//! still releases it. A second request while one is running fails with
//! [`Error::AlreadyApplying`] instead of queueing.
//!
//! ## Cancellation
//!
//! External tools are not interrupted. Cancelling a preview bumps a
//! generation counter; a worker whose generation is no longer current drops
//! its result on completion instead of posting it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::{debug, info, warn};

use crate::applier::{ApplyMode, ApplyPhase, ApplyReport, ApplyRequest, ThemeApplier};
use crate::backup::BackupManager;
use crate::cache::PaletteCache;
use crate::error::{BackupError, Error, ExtractionError, Result};
use crate::extractor::{PaletteExtractor, PywalExtractor};
use crate::palette::Palette;
use crate::paths::ConfigLayout;
use crate::plugin::PluginDescriptor;
use crate::registry::{DiscoveryConfig, DiscoveryReport, PluginRegistry};
use crate::settings::SettingsStore;
use crate::state::AppliedState;
use crate::wallpaper::{self, CommandWallpaperSetter, WallpaperSetter};

/// Messages posted from workers to the UI thread.
#[derive(Debug)]
pub enum ServiceEvent {
    /// The running apply entered a new phase.
    Phase(ApplyPhase),
    ApplyFinished(Result<ApplyReport>),
    PreviewReady {
        wallpaper: PathBuf,
        generation: u64,
        result: std::result::Result<Palette, ExtractionError>,
    },
    ScanFinished(ScanSummary),
    /// The settings file was re-read; on error the previous values stay.
    SettingsReloaded(Result<()>),
}

/// Result of a background cache scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Wallpapers found in the active directory.
    pub scanned: usize,
    /// Wallpapers with no valid palette.
    pub needs_regeneration: Vec<PathBuf>,
    /// Entries dropped because their file is gone.
    pub pruned: usize,
}

/// Components a service is built from.
pub struct ServiceParts {
    pub settings: Arc<SettingsStore>,
    pub cache: Arc<PaletteCache>,
    pub extractor: Arc<dyn PaletteExtractor>,
    pub setter: Arc<dyn WallpaperSetter>,
    pub registry: PluginRegistry,
    pub backups: BackupManager,
    pub state_file: Option<PathBuf>,
}

/// Clears the admission flag when dropped.
struct AdmissionGuard(Arc<AtomicBool>);

impl AdmissionGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyApplying)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ThemeService {
    settings: Arc<SettingsStore>,
    cache: Arc<PaletteCache>,
    extractor: Arc<dyn PaletteExtractor>,
    registry: Arc<PluginRegistry>,
    applier: Arc<ThemeApplier>,
    state_file: Option<PathBuf>,
    applying: Arc<AtomicBool>,
    preview_generation: Arc<AtomicU64>,
    events: Sender<ServiceEvent>,
}

impl ThemeService {
    pub fn new(parts: ServiceParts) -> (Self, Receiver<ServiceEvent>) {
        let (events, receiver) = mpsc::channel();

        let mut applier = ThemeApplier::new(
            parts.cache.clone(),
            parts.extractor.clone(),
            parts.setter,
            parts.backups,
        );
        if let Some(path) = &parts.state_file {
            applier = applier.with_state_file(path);
        }

        let service = Self {
            settings: parts.settings,
            cache: parts.cache,
            extractor: parts.extractor,
            registry: Arc::new(parts.registry),
            applier: Arc::new(applier),
            state_file: parts.state_file,
            applying: Arc::new(AtomicBool::new(false)),
            preview_generation: Arc::new(AtomicU64::new(0)),
            events,
        };
        (service, receiver)
    }

    /// Wire the production components from settings and the on-disk layout.
    pub fn from_settings(
        settings: Arc<SettingsStore>,
        layout: &ConfigLayout,
    ) -> (Self, Receiver<ServiceEvent>, DiscoveryReport) {
        let current = settings.get();

        let cache = PaletteCache::open(layout.palette_cache_file(), current.extractor.cache_previews);
        let extractor = PywalExtractor::new(
            current.extractor.program.clone(),
            current.extractor.backend().map(str::to_string),
            current.extractor.timeout(),
        );
        let setter =
            CommandWallpaperSetter::from_setting(&current.wallpaper.setter, current.wallpaper.timeout());

        let (registry, report) = PluginRegistry::discover(&DiscoveryConfig {
            manifest_dir: Some(layout.manifest_dir()),
            template_dir: Some(layout.template_dir()),
            state_file: Some(layout.plugin_state_file()),
            order: current.plugins.order.clone(),
            reload_timeout: current.plugins.reload_timeout(),
            include_builtins: true,
        });

        let (service, receiver) = Self::new(ServiceParts {
            settings,
            cache: Arc::new(cache),
            extractor: Arc::new(extractor),
            setter: Arc::new(setter),
            registry,
            backups: BackupManager::new(layout.backup_dir()),
            state_file: Some(layout.applied_state_file()),
        });
        (service, receiver, report)
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<PaletteCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn is_applying(&self) -> bool {
        self.applying.load(Ordering::Acquire)
    }

    /// Start an apply on a worker thread.
    ///
    /// Phases arrive as [`ServiceEvent::Phase`], the result as
    /// [`ServiceEvent::ApplyFinished`]. The admission flag is released before
    /// the result is posted.
    pub fn request_apply(&self, wallpaper: impl Into<PathBuf>, mode: ApplyMode) -> Result<()> {
        let guard = AdmissionGuard::acquire(&self.applying)?;
        let request = ApplyRequest::new(wallpaper, mode)
            .with_standard_brights(self.settings.get().theme.standard_bright_colors);

        let applier = self.applier.clone();
        let registry = self.registry.clone();
        let events = self.events.clone();

        thread::spawn(move || {
            let plugins = registry.enabled_plugins();
            let phase_events = events.clone();
            let result = applier.apply(&request, &plugins, |phase| {
                let _ = phase_events.send(ServiceEvent::Phase(phase));
            });
            drop(guard);
            if events.send(ServiceEvent::ApplyFinished(result)).is_err() {
                debug!("Apply finished after the UI went away");
            }
        });
        Ok(())
    }

    /// Start a preview extraction and return its generation.
    ///
    /// Starting another preview or calling [`ThemeService::cancel_preview`]
    /// makes earlier generations stale; their results are dropped.
    pub fn request_preview(&self, wallpaper: impl Into<PathBuf>) -> u64 {
        let generation = self.preview_generation.fetch_add(1, Ordering::AcqRel) + 1;
        let wallpaper = wallpaper.into();
        let cache = self.cache.clone();
        let extractor = self.extractor.clone();
        let current = self.preview_generation.clone();
        let events = self.events.clone();

        thread::spawn(move || {
            let result = cache.preview(&wallpaper, extractor.as_ref());
            if current.load(Ordering::Acquire) != generation {
                debug!("Discarding cancelled preview of {}", wallpaper.display());
                return;
            }
            let _ = events.send(ServiceEvent::PreviewReady {
                wallpaper,
                generation,
                result,
            });
        });
        generation
    }

    pub fn cancel_preview(&self) {
        self.preview_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Scan the active wallpaper directory on a worker thread.
    ///
    /// Stale entries are evicted and vanished files pruned; nothing is
    /// re-extracted.
    pub fn request_scan(&self) {
        let directory = self.settings.get().wallpaper_directory();
        let cache = self.cache.clone();
        let events = self.events.clone();

        thread::spawn(move || {
            let summary = scan(&cache, &directory);
            let _ = events.send(ServiceEvent::ScanFinished(summary));
        });
    }

    /// Re-read the settings file and post the outcome.
    ///
    /// Components built from settings at startup (extractor, setter, plugin
    /// order) keep their configuration; per-request values such as the
    /// wallpaper directory and bright-color override take effect.
    pub fn reload_settings(&self) {
        let result = self.settings.reload();
        if let Err(e) = &result {
            warn!("Keeping previous settings: {}", e);
        }
        let _ = self.events.send(ServiceEvent::SettingsReloaded(result));
    }

    pub fn list_plugins(&self) -> Vec<PluginDescriptor> {
        self.registry.plugins()
    }

    pub fn set_plugin_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.registry.set_enabled(name, enabled)
    }

    /// Wallpapers in the active directory.
    pub fn list_wallpapers(&self) -> Result<Vec<PathBuf>> {
        Ok(wallpaper::list_wallpapers(&self.settings.get().wallpaper_directory())?)
    }

    /// Put back `name`'s original config files.
    ///
    /// Refused while an apply is running. Returns false when the plugin was
    /// never backed up.
    pub fn restore_plugin(&self, name: &str) -> Result<bool> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))?;
        let _guard = AdmissionGuard::acquire(&self.applying)?;
        Ok(self.applier.backups().restore(plugin.as_ref())?)
    }

    /// Restore every plugin that has a backup, in run order.
    pub fn restore_plugins(&self) -> Result<Vec<(String, std::result::Result<bool, BackupError>)>> {
        let _guard = AdmissionGuard::acquire(&self.applying)?;
        let backups = self.applier.backups();
        let results = self
            .registry
            .names()
            .into_iter()
            .filter(|name| backups.has_backup(name))
            .filter_map(|name| {
                let plugin = self.registry.get(&name)?;
                let result = backups.restore(plugin.as_ref());
                Some((name, result))
            })
            .collect();
        Ok(results)
    }

    pub fn applied_state(&self) -> Option<AppliedState> {
        self.state_file.as_deref().and_then(AppliedState::load)
    }
}

fn scan(cache: &PaletteCache, directory: &Path) -> ScanSummary {
    let wallpapers = match wallpaper::list_wallpapers(directory) {
        Ok(list) => list,
        Err(e) => {
            warn!("Cannot list {}: {}", directory.display(), e);
            Vec::new()
        }
    };
    let needs_regeneration = cache.scan_and_refresh(&wallpapers);
    let pruned = cache.prune();
    info!(
        "Scanned {} wallpapers: {} without a palette, {} pruned",
        wallpapers.len(),
        needs_regeneration.len(),
        pruned
    );
    ScanSummary {
        scanned: wallpapers.len(),
        needs_regeneration,
        pruned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WallpaperSetError;
    use crate::extractor::ExtractionMode;
    use crate::palette::tests::sample_pywal_json;
    use crate::registry::tests::FakePlugin;
    use crate::settings::Settings;
    use std::fs;
    use std::sync::{Barrier, Mutex};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(10);

    struct NoopSetter;

    impl WallpaperSetter for NoopSetter {
        fn set_wallpaper(&self, _path: &Path) -> std::result::Result<(), WallpaperSetError> {
            Ok(())
        }
    }

    /// Extractor that blocks until released, to hold an apply open.
    struct GatedExtractor {
        entered: Barrier,
        release: Barrier,
        calls: Mutex<usize>,
    }

    impl GatedExtractor {
        fn new() -> Self {
            Self {
                entered: Barrier::new(2),
                release: Barrier::new(2),
                calls: Mutex::new(0),
            }
        }
    }

    impl PaletteExtractor for GatedExtractor {
        fn name(&self) -> &str {
            "gated"
        }

        fn extract(
            &self,
            _image: &Path,
            _mode: ExtractionMode,
        ) -> std::result::Result<Palette, ExtractionError> {
            *self.calls.lock().unwrap() += 1;
            self.entered.wait();
            self.release.wait();
            Palette::from_pywal_json(&sample_pywal_json())
        }
    }

    fn service_in(
        dir: &Path,
        extractor: Arc<dyn PaletteExtractor>,
    ) -> (ThemeService, Receiver<ServiceEvent>) {
        let mut settings = Settings::default();
        settings.wallpaper.directory = dir.join("walls").to_string_lossy().into_owned();
        let mut registry = PluginRegistry::new(None);
        registry
            .register(Arc::new(FakePlugin::new("one", true, false)))
            .unwrap();

        ThemeService::new(ServiceParts {
            settings: Arc::new(SettingsStore::new(dir.join("settings.toml"), settings)),
            cache: Arc::new(PaletteCache::in_memory(true)),
            extractor,
            setter: Arc::new(NoopSetter),
            registry,
            backups: BackupManager::new(dir.join("backups")),
            state_file: Some(dir.join("applied.json")),
        })
    }

    fn wallpaper(dir: &Path, name: &str) -> PathBuf {
        let walls = dir.join("walls");
        fs::create_dir_all(&walls).unwrap();
        let path = walls.join(name);
        fs::write(&path, b"img").unwrap();
        path
    }

    fn wait_for_apply(rx: &Receiver<ServiceEvent>) -> (Vec<ApplyPhase>, Result<ApplyReport>) {
        let mut phases = Vec::new();
        loop {
            match rx.recv_timeout(WAIT).unwrap() {
                ServiceEvent::Phase(phase) => phases.push(phase),
                ServiceEvent::ApplyFinished(result) => return (phases, result),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_second_apply_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let gated = Arc::new(GatedExtractor::new());
        let (service, rx) = service_in(dir.path(), gated.clone());
        let image = wallpaper(dir.path(), "a.jpg");

        service.request_apply(&image, ApplyMode::ColorsOnly).unwrap();
        gated.entered.wait();

        assert!(service.is_applying());
        assert!(matches!(
            service.request_apply(&image, ApplyMode::ColorsOnly),
            Err(Error::AlreadyApplying)
        ));
        assert!(matches!(service.restore_plugin("one"), Err(Error::AlreadyApplying)));

        gated.release.wait();
        let (phases, result) = wait_for_apply(&rx);
        let report = result.unwrap();
        assert_eq!(report.succeeded(), 1);
        assert_eq!(phases.first(), Some(&ApplyPhase::ResolvingPalette));
        assert_eq!(phases.last(), Some(&ApplyPhase::Idle));
        assert!(!service.is_applying());
        assert_eq!(*gated.calls.lock().unwrap(), 1);

        // Admission is open again and the cached palette is reused.
        service.request_apply(&image, ApplyMode::ColorsOnly).unwrap();
        let (_, result) = wait_for_apply(&rx);
        assert!(result.is_ok());
        assert_eq!(*gated.calls.lock().unwrap(), 1);
        assert!(service.applied_state().is_some());
    }

    #[test]
    fn test_cancelled_preview_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let gated = Arc::new(GatedExtractor::new());
        let (service, rx) = service_in(dir.path(), gated.clone());
        let image = wallpaper(dir.path(), "a.jpg");

        let generation = service.request_preview(&image);
        gated.entered.wait();
        service.cancel_preview();
        gated.release.wait();

        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
        assert!(generation > 0);
        assert!(!service.cache().has(&image));
    }

    #[test]
    fn test_preview_result_is_posted() {
        let dir = tempfile::tempdir().unwrap();
        let gated = Arc::new(GatedExtractor::new());
        let (service, rx) = service_in(dir.path(), gated.clone());
        let image = wallpaper(dir.path(), "a.jpg");

        let generation = service.request_preview(&image);
        gated.entered.wait();
        gated.release.wait();

        match rx.recv_timeout(WAIT).unwrap() {
            ServiceEvent::PreviewReady {
                wallpaper,
                generation: posted,
                result,
            } => {
                assert_eq!(wallpaper, image);
                assert_eq!(posted, generation);
                assert!(result.is_ok());
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!service.cache().has(&image));
    }

    #[test]
    fn test_scan_reports_unpaletted_wallpapers() {
        let dir = tempfile::tempdir().unwrap();
        let (service, rx) = service_in(dir.path(), Arc::new(GatedExtractor::new()));
        let a = wallpaper(dir.path(), "a.jpg");
        wallpaper(dir.path(), "b.png");
        fs::write(dir.path().join("walls/notes.txt"), "x").unwrap();

        service
            .cache()
            .put(&a, Palette::from_pywal_json(&sample_pywal_json()).unwrap())
            .unwrap();

        service.request_scan();
        match rx.recv_timeout(WAIT).unwrap() {
            ServiceEvent::ScanFinished(summary) => {
                assert_eq!(summary.scanned, 2);
                assert_eq!(summary.needs_regeneration.len(), 1);
                assert!(summary.needs_regeneration[0].ends_with("b.png"));
                assert_eq!(summary.pruned, 0);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(service.list_wallpapers().unwrap().len(), 2);
    }

    #[test]
    fn test_settings_reload_is_posted() {
        let dir = tempfile::tempdir().unwrap();
        let (service, rx) = service_in(dir.path(), Arc::new(GatedExtractor::new()));

        fs::write(dir.path().join("settings.toml"), "[theme]\nstandard_bright_colors = true\n")
            .unwrap();
        service.reload_settings();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            ServiceEvent::SettingsReloaded(Ok(()))
        ));
        assert!(service.settings().get().theme.standard_bright_colors);

        fs::write(dir.path().join("settings.toml"), "[theme]\nbogus = 1\n").unwrap();
        service.reload_settings();
        assert!(matches!(
            rx.recv_timeout(WAIT).unwrap(),
            ServiceEvent::SettingsReloaded(Err(_))
        ));
        assert!(service.settings().get().theme.standard_bright_colors);
    }

    #[test]
    fn test_sync_surface() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _rx) = service_in(dir.path(), Arc::new(GatedExtractor::new()));

        assert_eq!(service.list_plugins().len(), 1);
        service.set_plugin_enabled("one", false).unwrap();
        assert!(!service.list_plugins()[0].enabled);
        assert!(matches!(
            service.set_plugin_enabled("nope", true),
            Err(Error::UnknownPlugin(_))
        ));
        assert!(!service.restore_plugin("one").unwrap());
        assert!(service.restore_plugins().unwrap().is_empty());
        assert!(service.applied_state().is_none());
    }
}
