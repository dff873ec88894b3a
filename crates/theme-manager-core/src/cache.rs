//! Palette cache keyed by wallpaper path.
//!
//! ## Keys and staleness
//!
//! Entries are keyed by the normalized absolute path of the wallpaper (see
//! [`paths::normalize`]), never the bare file name, so switching the active
//! wallpaper directory cannot alias two different `beach.jpg` files. Each
//! entry records the source file's modification time at extraction. An entry
//! whose file is gone or whose mtime differs is stale: lookups treat it as a
//! miss and `scan_and_refresh` evicts it.
//!
//! ## Previews
//!
//! Preview palettes come from isolated extraction and live in a separate
//! in-memory map. `get`/`has` never consult it, so previewing a wallpaper
//! can never make it look applied or cached.
//!
//! ## Persistence
//!
//! The cache file is a JSON object mapping path strings to entries, rewritten
//! with write-temp-then-rename after every mutation. Read failures start an
//! empty cache; write failures are reported but keep the in-memory entry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CacheIoError, ExtractionError};
use crate::extractor::{ExtractionMode, PaletteExtractor};
use crate::fsutil;
use crate::palette::Palette;
use crate::paths;

/// Modification time of a source file, at nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStamp {
    pub secs: u64,
    pub nanos: u32,
}

impl SourceStamp {
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            secs: since_epoch.as_secs(),
            nanos: since_epoch.subsec_nanos(),
        }
    }

    /// Current mtime of `path`.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let modified = std::fs::metadata(path)?.modified()?;
        Ok(Self::from_system_time(modified))
    }
}

/// One cached palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub palette: Palette,
    pub source_mtime: SourceStamp,
    pub extracted_at: DateTime<Utc>,
}

/// Cache state of a wallpaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Entry present and matches the file on disk.
    Fresh,
    /// Entry present but the file changed or vanished.
    Stale,
    /// No entry.
    Missing,
}

/// Palette cache shared between the UI thread and workers.
pub struct PaletteCache {
    path: Option<PathBuf>,
    entries: RwLock<BTreeMap<String, CacheEntry>>,
    previews: RwLock<HashMap<String, (SourceStamp, Palette)>>,
    cache_previews: bool,
    // Serializes snapshot-and-write so the file always reflects the latest map.
    persist_lock: Mutex<()>,
}

impl std::fmt::Debug for PaletteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaletteCache")
            .field("path", &self.path)
            .field("entries", &self.entries.read().len())
            .field("cache_previews", &self.cache_previews)
            .finish()
    }
}

impl PaletteCache {
    /// Open the cache stored at `path`.
    ///
    /// A missing file is an empty cache. An unreadable or corrupt file is
    /// logged and also treated as empty; the next write replaces it.
    pub fn open(path: impl Into<PathBuf>, cache_previews: bool) -> Self {
        let path = path.into();
        let entries = match Self::load_entries(&path) {
            Ok(entries) => {
                debug!(
                    "Loaded {} palette cache entries from {}",
                    entries.len(),
                    path.display()
                );
                entries
            }
            Err(e) => {
                warn!("{}; starting with an empty palette cache", e);
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            entries: RwLock::new(entries),
            previews: RwLock::new(HashMap::new()),
            cache_previews,
            persist_lock: Mutex::new(()),
        }
    }

    /// A cache that never touches the disk.
    pub fn in_memory(cache_previews: bool) -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeMap::new()),
            previews: RwLock::new(HashMap::new()),
            cache_previews,
            persist_lock: Mutex::new(()),
        }
    }

    fn load_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheIoError> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let read_err = |reason: String| CacheIoError::Read {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| read_err(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| read_err(e.to_string()))
    }

    /// File backing this cache, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn key(path: &Path) -> String {
        paths::normalize(path).to_string_lossy().into_owned()
    }

    fn entry_status(entry: &CacheEntry, source: &Path) -> CacheStatus {
        match SourceStamp::of(source) {
            Ok(stamp) if stamp == entry.source_mtime => CacheStatus::Fresh,
            _ => CacheStatus::Stale,
        }
    }

    /// Cache state of `path`.
    pub fn status(&self, path: &Path) -> CacheStatus {
        let key = Self::key(path);
        match self.entries.read().get(&key) {
            Some(entry) => Self::entry_status(entry, Path::new(&key)),
            None => CacheStatus::Missing,
        }
    }

    /// True iff a non-stale entry exists for `path`.
    pub fn has(&self, path: &Path) -> bool {
        self.status(path) == CacheStatus::Fresh
    }

    /// Cached palette for `path`, or None on a miss or stale entry.
    pub fn get(&self, path: &Path) -> Option<Palette> {
        let key = Self::key(path);
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        match Self::entry_status(entry, Path::new(&key)) {
            CacheStatus::Fresh => Some(entry.palette.clone()),
            _ => {
                debug!("Palette cache entry for {} is stale", key);
                None
            }
        }
    }

    /// Store `palette` for `path` stamped with the file's current mtime.
    ///
    /// The in-memory entry is updated even if persisting fails.
    pub fn put(&self, path: &Path, palette: Palette) -> Result<(), CacheIoError> {
        let key = Self::key(path);
        let stamp = SourceStamp::of(Path::new(&key)).map_err(|e| CacheIoError::Source {
            path: PathBuf::from(&key),
            reason: e.to_string(),
        })?;

        let entry = CacheEntry {
            palette,
            source_mtime: stamp,
            extracted_at: Utc::now(),
        };
        self.entries.write().insert(key.clone(), entry);
        debug!("Cached palette for {}", key);

        self.persist()
    }

    /// Evict entries for `paths` that are missing or modified.
    ///
    /// Valid entries are left untouched. Returns the paths that still exist on
    /// disk but have no valid entry, i.e. those needing regeneration.
    pub fn scan_and_refresh<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<PathBuf> {
        let mut needs_regeneration = Vec::new();
        let mut evicted = 0usize;

        {
            let mut entries = self.entries.write();
            for path in paths {
                let path = path.as_ref();
                let key = Self::key(path);
                let current = SourceStamp::of(Path::new(&key)).ok();

                match (entries.get(&key), current) {
                    (Some(_), None) => {
                        entries.remove(&key);
                        evicted += 1;
                        debug!("Evicted palette for vanished file {}", key);
                    }
                    (Some(entry), Some(stamp)) if entry.source_mtime != stamp => {
                        entries.remove(&key);
                        evicted += 1;
                        debug!("Evicted stale palette for {}", key);
                        needs_regeneration.push(path.to_path_buf());
                    }
                    (Some(_), Some(_)) => {}
                    (None, Some(_)) => needs_regeneration.push(path.to_path_buf()),
                    (None, None) => {}
                }
            }
        }

        if evicted > 0 {
            info!("Palette cache scan evicted {} entries", evicted);
            if let Err(e) = self.persist() {
                warn!("{}", e);
            }
        }

        needs_regeneration
    }

    /// Evict every entry whose source file no longer exists.
    pub fn prune(&self) -> usize {
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|key, _| Path::new(key).exists());
            before - entries.len()
        };

        if removed > 0 {
            info!("Pruned {} palette cache entries", removed);
            if let Err(e) = self.persist() {
                warn!("{}", e);
            }
        }
        removed
    }

    /// Palette for previewing `path`, never touching applied state.
    ///
    /// A fresh applied entry is reused. Otherwise the extractor runs in
    /// isolated mode; the result is kept in the preview map only when
    /// preview caching is enabled.
    pub fn preview(
        &self,
        path: &Path,
        extractor: &dyn PaletteExtractor,
    ) -> Result<Palette, ExtractionError> {
        if let Some(palette) = self.get(path) {
            return Ok(palette);
        }

        let key = Self::key(path);
        let stamp = SourceStamp::of(Path::new(&key)).ok();

        if self.cache_previews
            && let Some(stamp) = stamp
            && let Some((cached_stamp, palette)) = self.previews.read().get(&key)
            && *cached_stamp == stamp
        {
            return Ok(palette.clone());
        }

        let palette = extractor.extract(Path::new(&key), ExtractionMode::Isolated)?;

        if self.cache_previews
            && let Some(stamp) = stamp
        {
            self.previews.write().insert(key, (stamp, palette.clone()));
        }

        Ok(palette)
    }

    /// Number of stored (applied) entries, fresh or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the current entries to disk atomically.
    fn persist(&self) -> Result<(), CacheIoError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock();
        let json = {
            let entries = self.entries.read();
            serde_json::to_string_pretty(&*entries)
        }
        .map_err(|e| CacheIoError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        fsutil::write_atomic(path, json).map_err(|e| CacheIoError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
