//! Atomic file replacement.
//!
//! Every file this crate owns or writes on behalf of a plugin goes through
//! `write_atomic`, so readers only ever observe the old or the new content.
//! A symlinked path is written through: the link stays and its target is
//! replaced.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp path: `.<name>.tmp-<pid>-<n>` in the same directory, so the
/// final rename never crosses a filesystem boundary.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.tmp-{}-{}", name, std::process::id(), n))
}

/// Final file a write to `path` lands on, following symlinks.
///
/// A dangling link resolves to where it points, relative to the link's
/// directory.
fn resolve_write_target(path: &Path) -> io::Result<PathBuf> {
    let mut current = path.to_path_buf();
    // Linux MAXSYMLINKS.
    for _ in 0..40 {
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let link = fs::read_link(&current)?;
                current = match current.parent() {
                    Some(parent) if link.is_relative() => parent.join(link),
                    _ => link,
                };
            }
            _ => return Ok(current),
        }
    }
    Err(io::Error::other(format!(
        "too many levels of symbolic links: {}",
        path.display()
    )))
}

/// Write `contents` to `path` via write-temp-then-rename.
///
/// Parent directories are created as needed. The temp file is removed if
/// anything fails before the rename.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let target = resolve_write_target(path)?;
    let path = target.as_path();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path_for(path);
    let result = (|| {
        let mut file = fs::File::create(&temp)?;
        file.write_all(contents.as_ref())?;
        file.sync_all()?;
        drop(file);

        // Keep the permissions of the file being replaced.
        if let Ok(meta) = fs::metadata(path) {
            fs::set_permissions(&temp, meta.permissions())?;
        }
        fs::rename(&temp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Copy `from` over `to` atomically.
pub fn copy_atomic(from: &Path, to: &Path) -> io::Result<()> {
    let contents = fs::read(from)?;
    write_atomic(to, contents)
}

/// Update the modification time of `path`, creating it if missing.
pub fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.set_modified(std::time::SystemTime::now())
}
