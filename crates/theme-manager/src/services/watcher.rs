//! File watcher behind `theme-manager watch`.
//!
//! ## Architecture
//!
//! - A watcher thread monitors the wallpaper directory and the directory that
//!   holds `settings.toml`, both non-recursively.
//! - Editors and image tools emit bursts of events for one change; they are
//!   debounced into one batch.
//! - Each batch is classified into [`WatchEvent`]s and handed to a callback
//!   on the watcher thread. The callback only requests work from the service;
//!   results come back on the service channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify_debouncer_mini::{DebounceEventResult, new_debouncer, notify::RecursiveMode};
use tracing::{debug, error, info, warn};

use theme_manager_core::paths;
use theme_manager_core::wallpaper::is_wallpaper;

/// Debounce interval (in ms) for file change events.
const FILE_CHANGE_DEBOUNCE_MS: u64 = 500;

/// What changed in one debounced batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// A wallpaper was added, removed or modified.
    WallpapersChanged,
    SettingsChanged,
}

/// Running watcher; stops when dropped.
pub struct FileWatcher {
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Watch `wallpaper_dir` and `settings_file`, calling `on_event` for each
    /// change.
    pub fn start<F>(wallpaper_dir: PathBuf, settings_file: PathBuf, on_event: F) -> Self
    where
        F: Fn(WatchEvent) + Send + 'static,
    {
        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let flag = shutdown_flag.clone();
        let handle = thread::spawn(move || {
            run_file_watcher(wallpaper_dir, settings_file, on_event, flag);
        });
        Self {
            shutdown_flag,
            handle: Some(handle),
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Run the watch loop (called on a background thread).
fn run_file_watcher<F>(
    wallpaper_dir: PathBuf,
    settings_file: PathBuf,
    on_event: F,
    shutdown_flag: Arc<AtomicBool>,
) where
    F: Fn(WatchEvent) + Send + 'static,
{
    // notify reports canonical paths; compare against the same form.
    let wallpaper_dir = paths::normalize(&wallpaper_dir);
    let settings_file = paths::normalize(&settings_file);
    let settings_dir = settings_file.parent().map(Path::to_path_buf);

    let handler_wallpaper_dir = wallpaper_dir.clone();
    let handler_settings_file = settings_file.clone();
    let debounce_duration = Duration::from_millis(FILE_CHANGE_DEBOUNCE_MS);

    let mut debouncer = match new_debouncer(debounce_duration, move |res: DebounceEventResult| {
        match res {
            Ok(events) => {
                let changed: Vec<PathBuf> = events.into_iter().map(|e| e.path).collect();
                for event in classify(&changed, &handler_wallpaper_dir, &handler_settings_file) {
                    debug!("Watch event: {:?}", event);
                    on_event(event);
                }
            }
            Err(err) => {
                error!("File watcher error: {}", err);
            }
        }
    }) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to create file watcher: {}", e);
            return;
        }
    };

    let mut watched = 0;
    for dir in std::iter::once(&wallpaper_dir).chain(settings_dir.as_ref()) {
        if !dir.is_dir() {
            warn!("Not watching {}: directory does not exist", dir.display());
            continue;
        }
        match debouncer.watcher().watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                info!("Watching {}", dir.display());
                watched += 1;
            }
            Err(e) => error!("Failed to watch {}: {}", dir.display(), e),
        }
    }
    if watched == 0 {
        error!("Nothing to watch");
        return;
    }

    while !shutdown_flag.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(250));
    }

    debug!("File watcher thread shutting down");
}

/// Reduce a batch of changed paths to at most one event of each kind.
fn classify(changed: &[PathBuf], wallpaper_dir: &Path, settings_file: &Path) -> Vec<WatchEvent> {
    let mut events = Vec::new();

    let wallpapers = changed
        .iter()
        .any(|p| p.parent() == Some(wallpaper_dir) && is_wallpaper(p));
    if wallpapers {
        events.push(WatchEvent::WallpapersChanged);
    }
    if changed.iter().any(|p| p == settings_file) {
        events.push(WatchEvent::SettingsChanged);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_wallpaper_changes() {
        let walls = Path::new("/home/u/Pictures/Wallpapers");
        let settings = Path::new("/home/u/.config/theme-manager/settings.toml");

        let changed = vec![walls.join("a.jpg"), walls.join("b.PNG")];
        assert_eq!(
            classify(&changed, walls, settings),
            [WatchEvent::WallpapersChanged]
        );
    }

    #[test]
    fn test_classify_ignores_other_files() {
        let walls = Path::new("/w");
        let settings = Path::new("/c/settings.toml");

        let changed = vec![
            PathBuf::from("/w/notes.txt"),
            PathBuf::from("/w/sub/a.jpg"),
            PathBuf::from("/c/plugins.json"),
        ];
        assert!(classify(&changed, walls, settings).is_empty());
    }

    #[test]
    fn test_classify_both() {
        let walls = Path::new("/w");
        let settings = Path::new("/c/settings.toml");

        let changed = vec![
            PathBuf::from("/c/settings.toml"),
            PathBuf::from("/w/a.webp"),
        ];
        assert_eq!(
            classify(&changed, walls, settings),
            [WatchEvent::WallpapersChanged, WatchEvent::SettingsChanged]
        );
    }
}
