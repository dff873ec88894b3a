//! Well-known locations and path normalization.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Directory name used under the XDG config home.
pub const APP_DIR_NAME: &str = "theme-manager";

pub const SETTINGS_FILE: &str = "settings.toml";
pub const PALETTE_CACHE_FILE: &str = "palette-cache.json";
pub const PLUGIN_STATE_FILE: &str = "plugins.json";
pub const APPLIED_STATE_FILE: &str = "applied.json";
pub const PLUGIN_MANIFEST_DIR: &str = "plugins";
pub const TEMPLATE_DIR: &str = "templates";
pub const BACKUP_DIR: &str = "backups";

/// The user's home directory, if `$HOME` is set.
pub fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// `$XDG_CONFIG_HOME/theme-manager`, falling back to `~/.config/theme-manager`.
///
/// Falls back to a relative `.theme-manager` directory when neither variable
/// is set, which only happens in stripped-down environments.
pub fn config_dir() -> PathBuf {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(xdg).join(APP_DIR_NAME);
    }
    match home_dir() {
        Some(home) => home.join(".config").join(APP_DIR_NAME),
        None => PathBuf::from(".theme-manager"),
    }
}

/// pywal's cache directory (`$PYWAL_CACHE_DIR` or `~/.cache/wal`).
pub fn pywal_cache_dir() -> PathBuf {
    if let Some(dir) = env::var_os("PYWAL_CACHE_DIR").filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    let cache_home = env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(|| PathBuf::from(".cache"));
    cache_home.join("wal")
}

/// Expand a leading `~` or `~/` to the home directory.
pub fn expand_tilde(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Absolute, normalized form of `path` used as a stable identity.
///
/// The parent directory is canonicalized (resolving symlinks) when it exists
/// and the file name is appended as-is. This keeps the key stable after the
/// file itself is deleted, as long as its directory survives. Paths whose
/// parent is gone are normalized lexically.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let path = expand_tilde(path);
    let absolute = if path.is_absolute() {
        path
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    };
    let lexical = lexical_normalize(&absolute);

    match (lexical.parent(), lexical.file_name()) {
        (Some(parent), Some(name)) => match parent.canonicalize() {
            Ok(parent) => parent.join(name),
            Err(_) => lexical,
        },
        _ => lexical,
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Files and directories under a theme-manager config directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayout {
    root: PathBuf,
}

impl ConfigLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at [`config_dir`].
    pub fn user() -> Self {
        Self::new(config_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    pub fn palette_cache_file(&self) -> PathBuf {
        self.root.join(PALETTE_CACHE_FILE)
    }

    pub fn plugin_state_file(&self) -> PathBuf {
        self.root.join(PLUGIN_STATE_FILE)
    }

    pub fn applied_state_file(&self) -> PathBuf {
        self.root.join(APPLIED_STATE_FILE)
    }

    pub fn manifest_dir(&self) -> PathBuf {
        self.root.join(PLUGIN_MANIFEST_DIR)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join(TEMPLATE_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexical_normalize_resolves_dots() {
        let p = lexical_normalize(Path::new("/a/./b/../c/d.jpg"));
        assert_eq!(p, PathBuf::from("/a/c/d.jpg"));
    }

    #[test]
    fn test_normalize_is_absolute() {
        let p = normalize("some/relative/wall.png");
        assert!(p.is_absolute());
        assert!(p.ends_with("some/relative/wall.png"));
    }

    #[test]
    fn test_normalize_survives_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"x").unwrap();

        let before = normalize(&file);
        std::fs::remove_file(&file).unwrap();
        let after = normalize(&file);

        assert_eq!(before, after);
    }

    #[test]
    fn test_normalize_same_file_via_dotdot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let direct = dir.path().join("a.jpg");
        let roundabout = dir.path().join("sub").join("..").join("a.jpg");
        assert_eq!(normalize(direct), normalize(roundabout));
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/etc/x"), PathBuf::from("/etc/x"));
        assert_eq!(expand_tilde("rel/x"), PathBuf::from("rel/x"));
    }

    #[test]
    fn test_layout_under_root() {
        let layout = ConfigLayout::new("/cfg/theme-manager");
        assert_eq!(layout.settings_file(), PathBuf::from("/cfg/theme-manager/settings.toml"));
        assert_eq!(layout.backup_dir(), PathBuf::from("/cfg/theme-manager/backups"));
        assert_eq!(layout.manifest_dir(), PathBuf::from("/cfg/theme-manager/plugins"));
    }
}
