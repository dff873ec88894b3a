//! Wallpaper discovery and the external wallpaper setters.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::WallpaperSetError;
use crate::process::run_with_timeout;

/// Image extensions treated as wallpapers (compared case-insensitively).
pub const WALLPAPER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Whether `path` has a wallpaper extension.
pub fn is_wallpaper(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            WALLPAPER_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Image files directly inside `dir`, sorted by file name.
///
/// A missing directory yields an empty list.
pub fn list_wallpapers(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Wallpaper directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut wallpapers = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && is_wallpaper(&path) {
            wallpapers.push(path);
        }
    }
    wallpapers.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(wallpapers)
}

/// Sets the desktop wallpaper.
pub trait WallpaperSetter: Send + Sync {
    fn set_wallpaper(&self, path: &Path) -> Result<(), WallpaperSetError>;
}

/// Supported wallpaper tools, in auto-detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallpaperTool {
    Swww,
    Hyprpaper,
    Feh,
    Nitrogen,
}

impl WallpaperTool {
    pub const ALL: [WallpaperTool; 4] = [
        WallpaperTool::Swww,
        WallpaperTool::Hyprpaper,
        WallpaperTool::Feh,
        WallpaperTool::Nitrogen,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            WallpaperTool::Swww => "swww",
            WallpaperTool::Hyprpaper => "hyprpaper",
            WallpaperTool::Feh => "feh",
            WallpaperTool::Nitrogen => "nitrogen",
        }
    }

    /// Binary that must be on PATH for this tool to be tried.
    fn binary(self) -> &'static str {
        match self {
            // hyprpaper is driven over IPC.
            WallpaperTool::Hyprpaper => "hyprctl",
            other => other.name(),
        }
    }

    /// Commands run in sequence to set `path`.
    fn commands(self, path: &Path) -> Vec<Command> {
        let path_str = path.to_string_lossy();
        match self {
            WallpaperTool::Swww => {
                let mut cmd = Command::new("swww");
                cmd.arg("img").arg(path);
                vec![cmd]
            }
            WallpaperTool::Hyprpaper => {
                let mut preload = Command::new("hyprctl");
                preload.args(["hyprpaper", "preload"]).arg(path);
                let mut set = Command::new("hyprctl");
                set.args(["hyprpaper", "wallpaper"])
                    .arg(format!(",{}", path_str));
                vec![preload, set]
            }
            WallpaperTool::Feh => {
                let mut cmd = Command::new("feh");
                cmd.arg("--bg-scale").arg(path);
                vec![cmd]
            }
            WallpaperTool::Nitrogen => {
                let mut cmd = Command::new("nitrogen");
                cmd.arg("--set-scaled").arg(path);
                vec![cmd]
            }
        }
    }
}

/// Sets the wallpaper by shelling out to the first working tool.
#[derive(Debug, Clone)]
pub struct CommandWallpaperSetter {
    tools: Vec<WallpaperTool>,
    timeout: Duration,
}

impl CommandWallpaperSetter {
    pub fn new(tools: Vec<WallpaperTool>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    /// From the `wallpaper.setter` setting: "auto" tries every tool.
    pub fn from_setting(setter: &str, timeout: Duration) -> Self {
        let tools = match WallpaperTool::from_name(setter) {
            Some(tool) => vec![tool],
            None => WallpaperTool::ALL.to_vec(),
        };
        Self::new(tools, timeout)
    }

    pub fn tools(&self) -> &[WallpaperTool] {
        &self.tools
    }

    fn run_tool(&self, tool: WallpaperTool, path: &Path) -> Result<(), String> {
        for mut cmd in tool.commands(path) {
            let output = run_with_timeout(&mut cmd, self.timeout).map_err(|e| e.to_string())?;
            if !output.success() {
                return Err(output.failure_reason());
            }
        }
        Ok(())
    }
}

impl WallpaperSetter for CommandWallpaperSetter {
    fn set_wallpaper(&self, path: &Path) -> Result<(), WallpaperSetError> {
        if !path.is_file() {
            return Err(WallpaperSetError::NotFound(path.to_path_buf()));
        }

        let mut last_failure = None;
        for &tool in &self.tools {
            if which::which(tool.binary()).is_err() {
                debug!("Wallpaper tool {} not installed, skipping", tool.name());
                continue;
            }
            match self.run_tool(tool, path) {
                Ok(()) => {
                    info!("Wallpaper set with {}: {}", tool.name(), path.display());
                    return Ok(());
                }
                Err(reason) => {
                    warn!("Wallpaper tool {} failed: {}", tool.name(), reason);
                    last_failure = Some(WallpaperSetError::SetterFailed {
                        tool: tool.name().to_string(),
                        reason,
                    });
                }
            }
        }

        Err(last_failure.unwrap_or_else(|| WallpaperSetError::NoSetter {
            tried: self.tools.iter().map(|t| t.name().to_string()).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.webp", "notes.txt", "d.jpeg", "e.gif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.jpg")).unwrap();

        let names: Vec<String> = list_wallpapers(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.jpg", "b.PNG", "c.webp", "d.jpeg"]);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_wallpapers(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_from_setting() {
        let auto = CommandWallpaperSetter::from_setting("auto", Duration::from_secs(1));
        assert_eq!(auto.tools(), WallpaperTool::ALL);

        let feh = CommandWallpaperSetter::from_setting("feh", Duration::from_secs(1));
        assert_eq!(feh.tools(), [WallpaperTool::Feh]);
    }

    #[test]
    fn test_hyprpaper_uses_ipc() {
        let cmds = WallpaperTool::Hyprpaper.commands(Path::new("/w/a.png"));
        let args: Vec<Vec<String>> = cmds
            .iter()
            .map(|c| c.get_args().map(|a| a.to_string_lossy().into_owned()).collect())
            .collect();
        assert_eq!(args[0], ["hyprpaper", "preload", "/w/a.png"]);
        assert_eq!(args[1], ["hyprpaper", "wallpaper", ",/w/a.png"]);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let setter = CommandWallpaperSetter::from_setting("auto", Duration::from_secs(1));
        let err = setter.set_wallpaper(Path::new("/nonexistent/a.jpg")).unwrap_err();
        assert!(matches!(err, WallpaperSetError::NotFound(_)));
    }
}
