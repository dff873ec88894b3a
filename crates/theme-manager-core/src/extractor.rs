//! Palette extraction through pywal.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ExtractionError;
use crate::palette::Palette;
use crate::paths;
use crate::process::{RunError, run_with_timeout};

/// File pywal writes its palette to inside its cache directory.
const PYWAL_COLORS_FILE: &str = "colors.json";

/// Whether an extraction may touch system-visible color state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    /// Preview only: nothing outside a private scratch directory changes.
    Isolated,
    /// The result becomes the system's current color scheme.
    Applied,
}

/// Turns an image into a palette.
pub trait PaletteExtractor: Send + Sync {
    /// Short tool name for logs and reports.
    fn name(&self) -> &str;

    fn extract(&self, image: &Path, mode: ExtractionMode) -> Result<Palette, ExtractionError>;
}

/// Runs the `wal` command line tool.
#[derive(Debug, Clone)]
pub struct PywalExtractor {
    program: String,
    backend: Option<String>,
    timeout: Duration,
}

impl PywalExtractor {
    pub fn new(program: impl Into<String>, backend: Option<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            backend,
            timeout,
        }
    }

    fn resolve_program(&self) -> Result<PathBuf, ExtractionError> {
        which::which(&self.program).map_err(|_| ExtractionError::ToolMissing {
            program: self.program.clone(),
        })
    }

    fn command(&self, program: &Path, image: &Path, mode: ExtractionMode) -> Command {
        let mut cmd = Command::new(program);
        // -n: leave the wallpaper alone, the applier sets it separately.
        cmd.arg("-n").arg("-q");
        if mode == ExtractionMode::Isolated {
            // Skip terminal sequences, tty reloads and template export.
            cmd.args(["-s", "-t", "-e"]);
        }
        if let Some(backend) = &self.backend {
            cmd.arg("--backend").arg(backend);
        }
        cmd.arg("-i").arg(image);
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<(), ExtractionError> {
        let output = run_with_timeout(&mut cmd, self.timeout).map_err(|e| match e {
            RunError::TimedOut => ExtractionError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            },
            e if e.is_not_found() => ExtractionError::ToolMissing {
                program: self.program.clone(),
            },
            RunError::Spawn(e) | RunError::Wait(e) => ExtractionError::Io(e),
        })?;

        if !output.success() {
            return Err(ExtractionError::ToolFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: output.failure_reason(),
            });
        }
        Ok(())
    }

    fn read_colors(cache_dir: &Path) -> Result<Palette, ExtractionError> {
        let path = cache_dir.join(PYWAL_COLORS_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            ExtractionError::MalformedOutput(format!("cannot read {}: {}", path.display(), e))
        })?;
        Palette::from_pywal_json(&json)
    }
}

impl PaletteExtractor for PywalExtractor {
    fn name(&self) -> &str {
        &self.program
    }

    fn extract(&self, image: &Path, mode: ExtractionMode) -> Result<Palette, ExtractionError> {
        std::fs::File::open(image).map_err(|e| ExtractionError::UnreadableImage {
            path: image.to_path_buf(),
            reason: e.to_string(),
        })?;
        let program = self.resolve_program()?;

        match mode {
            ExtractionMode::Isolated => {
                let scratch = tempfile::Builder::new().prefix("theme-manager-wal").tempdir()?;
                let mut cmd = self.command(&program, image, mode);
                cmd.env("PYWAL_CACHE_DIR", scratch.path());
                debug!("Isolated extraction for {} in {}", image.display(), scratch.path().display());
                self.run(cmd)?;
                Self::read_colors(scratch.path())
            }
            ExtractionMode::Applied => {
                let cache_dir = paths::pywal_cache_dir();
                self.run(self.command(&program, image, mode))?;
                let palette = Self::read_colors(&cache_dir)?;
                info!("Extracted palette from {}", image.display());
                Ok(palette)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Extractor returning a fixed palette and counting calls per mode.
    pub(crate) struct FixedExtractor {
        palette: Palette,
        isolated: AtomicUsize,
        applied: AtomicUsize,
    }

    impl FixedExtractor {
        pub(crate) fn new(palette: Palette) -> Self {
            Self {
                palette,
                isolated: AtomicUsize::new(0),
                applied: AtomicUsize::new(0),
            }
        }

        pub(crate) fn isolated_calls(&self) -> usize {
            self.isolated.load(Ordering::SeqCst)
        }

        pub(crate) fn applied_calls(&self) -> usize {
            self.applied.load(Ordering::SeqCst)
        }
    }

    impl PaletteExtractor for FixedExtractor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn extract(&self, _image: &Path, mode: ExtractionMode) -> Result<Palette, ExtractionError> {
            match mode {
                ExtractionMode::Isolated => self.isolated.fetch_add(1, Ordering::SeqCst),
                ExtractionMode::Applied => self.applied.fetch_add(1, Ordering::SeqCst),
            };
            Ok(self.palette.clone())
        }
    }

    #[test]
    fn test_missing_program_is_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();

        let extractor = PywalExtractor::new(
            "definitely-not-wal-xyz",
            None,
            Duration::from_secs(1),
        );
        let err = extractor.extract(&image, ExtractionMode::Isolated).unwrap_err();
        assert!(matches!(err, ExtractionError::ToolMissing { .. }));
    }

    #[test]
    fn test_missing_image_is_unreadable() {
        let extractor = PywalExtractor::new("wal", None, Duration::from_secs(1));
        let err = extractor
            .extract(Path::new("/nonexistent/a.png"), ExtractionMode::Applied)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::UnreadableImage { .. }));
    }

    #[test]
    fn test_command_line_per_mode() {
        let extractor =
            PywalExtractor::new("wal", Some("colorz".into()), Duration::from_secs(1));
        let image = Path::new("/w/a.png");

        let args = |mode| {
            extractor
                .command(Path::new("wal"), image, mode)
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };

        let isolated = args(ExtractionMode::Isolated);
        assert_eq!(
            isolated,
            ["-n", "-q", "-s", "-t", "-e", "--backend", "colorz", "-i", "/w/a.png"]
        );
        let applied = args(ExtractionMode::Applied);
        assert_eq!(applied, ["-n", "-q", "--backend", "colorz", "-i", "/w/a.png"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_isolated_run_reads_private_cache() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();

        // Fake wal that writes a palette into whatever cache dir it is given.
        let json = crate::palette::tests::sample_pywal_json();
        let script = dir.path().join("fake-wal");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nmkdir -p \"$PYWAL_CACHE_DIR\"\ncat > \"$PYWAL_CACHE_DIR/colors.json\" <<'EOF'\n{}\nEOF\n",
                json
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let extractor = PywalExtractor::new(
            script.to_string_lossy(),
            None,
            Duration::from_secs(10),
        );
        let palette = extractor.extract(&image, ExtractionMode::Isolated).unwrap();
        assert_eq!(palette, Palette::from_pywal_json(&json).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_tool_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("a.png");
        std::fs::write(&image, b"png").unwrap();
        let script = dir.path().join("broken-wal");
        std::fs::write(&script, "#!/bin/sh\necho 'no colors' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let extractor =
            PywalExtractor::new(script.to_string_lossy(), None, Duration::from_secs(10));
        match extractor.extract(&image, ExtractionMode::Isolated).unwrap_err() {
            ExtractionError::ToolFailed { stderr, .. } => assert_eq!(stderr, "no colors"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
