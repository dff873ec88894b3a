use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ThemePlugin;
use super::manifest::PluginSpec;
use crate::error::PluginApplyError;
use crate::fsutil;
use crate::process::run_with_timeout;
use crate::template::{self, TemplateContext, TemplateSource};

/// A plugin that renders one template into one config file.
///
/// Optionally ensures an include line in the application's main config,
/// touches marker files and runs a reload command.
#[derive(Debug, Clone)]
pub struct TemplatePlugin {
    spec: PluginSpec,
    config_path: PathBuf,
    include_file: Option<PathBuf>,
    touch_files: Vec<PathBuf>,
    templates: TemplateSource,
    reload_timeout: Duration,
}

impl TemplatePlugin {
    pub fn new(spec: PluginSpec, templates: TemplateSource, reload_timeout: Duration) -> Self {
        Self {
            config_path: spec.resolved_config_path(),
            include_file: spec.resolved_include_file(),
            touch_files: spec.resolved_touch_files(),
            spec,
            templates,
            reload_timeout,
        }
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    fn ensure_include(&self) -> Result<(), PluginApplyError> {
        let (Some(include), Some(file)) = (&self.spec.include, &self.include_file) else {
            return Ok(());
        };
        let include_err = |source| PluginApplyError::Include {
            path: file.clone(),
            source,
        };

        let existing = match std::fs::read_to_string(file) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(include_err(e)),
        };

        if let Some(updated) = include.insert_into(existing.as_deref()) {
            fsutil::write_atomic(file, updated).map_err(include_err)?;
            info!("Added '{}' to {}", include.line, file.display());
        }
        Ok(())
    }
}

impl ThemePlugin for TemplatePlugin {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn display_name(&self) -> &str {
        &self.spec.display_name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn template_name(&self) -> &str {
        &self.spec.template
    }

    fn target_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.config_path.clone()];
        for file in self.include_file.iter().chain(&self.touch_files) {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }

    fn is_available(&self) -> bool {
        let installed = self
            .spec
            .binary
            .as_deref()
            .is_none_or(|binary| which::which(binary).is_ok());
        installed && self.templates.exists(&self.spec.template)
    }

    fn apply_theme(&self, ctx: &TemplateContext) -> Result<(), PluginApplyError> {
        let text = self
            .templates
            .load(&self.spec.template)
            .ok_or_else(|| PluginApplyError::TemplateMissing(self.spec.template.clone()))?;
        let rendered = template::render(&text, ctx);

        fsutil::write_atomic(&self.config_path, rendered).map_err(|source| {
            PluginApplyError::Write {
                path: self.config_path.clone(),
                source,
            }
        })?;
        debug!("Wrote {}", self.config_path.display());

        self.ensure_include()?;

        for file in &self.touch_files {
            if let Err(e) = fsutil::touch(file) {
                warn!("Cannot touch {}: {}", file.display(), e);
            }
        }
        Ok(())
    }

    fn reload(&self) -> Result<(), PluginApplyError> {
        let Some((program, args)) = self.spec.reload.as_deref().and_then(|argv| argv.split_first())
        else {
            return Ok(());
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run_with_timeout(&mut cmd, self.reload_timeout)
            .map_err(|e| PluginApplyError::Other(format!("reload '{}': {}", program, e)))?;
        if !output.success() {
            return Err(PluginApplyError::Other(format!(
                "reload '{}' failed: {}",
                program,
                output.failure_reason()
            )));
        }
        debug!("Reloaded {}", self.spec.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::Palette;
    use crate::palette::tests::sample_pywal_json;
    use crate::plugin::manifest::{IncludeDirective, IncludePlacement};
    use std::fs;

    fn ctx() -> TemplateContext {
        let palette = Palette::from_pywal_json(&sample_pywal_json()).unwrap();
        TemplateContext::from_palette(&palette, None)
    }

    fn plugin_in(dir: &Path, templates: TemplateSource) -> TemplatePlugin {
        let spec = PluginSpec {
            name: "demo".into(),
            display_name: "Demo".into(),
            description: "test".into(),
            config_path: dir.join("demo/colors.conf").to_string_lossy().into_owned(),
            template: "demo".into(),
            binary: None,
            reload: None,
            include: Some(IncludeDirective {
                file: "main.conf".into(),
                line: "include colors.conf".into(),
                comment: None,
                placement: IncludePlacement::Append,
            }),
            touch: vec![dir.join("demo/.updated").to_string_lossy().into_owned()],
        };
        TemplatePlugin::new(spec, templates, Duration::from_secs(5))
    }

    #[test]
    fn test_apply_writes_config_and_include() {
        let dir = tempfile::tempdir().unwrap();
        let tpl_dir = dir.path().join("templates");
        fs::create_dir(&tpl_dir).unwrap();
        fs::write(tpl_dir.join("demo.template"), "bg {{background}}\n").unwrap();

        let plugin = plugin_in(dir.path(), TemplateSource::new(Some(tpl_dir)));
        assert!(plugin.is_available());
        plugin.apply_theme(&ctx()).unwrap();

        let written = fs::read_to_string(dir.path().join("demo/colors.conf")).unwrap();
        assert_eq!(written, "bg #101010\n");
        let main = fs::read_to_string(dir.path().join("demo/main.conf")).unwrap();
        assert_eq!(main, "include colors.conf\n");
        assert!(dir.path().join("demo/.updated").exists());

        // Second apply keeps a single include line.
        plugin.apply_theme(&ctx()).unwrap();
        let main = fs::read_to_string(dir.path().join("demo/main.conf")).unwrap();
        assert_eq!(main.matches("include colors.conf").count(), 1);
    }

    #[test]
    fn test_target_files_cover_include_and_touch_files() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin_in(dir.path(), TemplateSource::builtin());
        assert_eq!(
            plugin.target_files(),
            vec![
                dir.path().join("demo/colors.conf"),
                dir.path().join("demo/main.conf"),
                dir.path().join("demo/.updated"),
            ]
        );
    }

    #[test]
    fn test_missing_template_is_unavailable_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let plugin = plugin_in(dir.path(), TemplateSource::builtin());
        assert!(!plugin.is_available());
        assert!(matches!(
            plugin.apply_theme(&ctx()),
            Err(PluginApplyError::TemplateMissing(_))
        ));
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = plugin_in(dir.path(), TemplateSource::builtin()).spec().clone();
        spec.template = "kitty".into();
        spec.binary = Some("definitely-not-installed-xyz".into());
        let plugin = TemplatePlugin::new(spec, TemplateSource::builtin(), Duration::from_secs(1));
        assert!(!plugin.is_available());
    }

    #[cfg(unix)]
    #[test]
    fn test_reload_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut spec = plugin_in(dir.path(), TemplateSource::builtin()).spec().clone();
        spec.reload = Some(vec!["sh".into(), "-c".into(), "exit 1".into()]);
        let plugin = TemplatePlugin::new(spec, TemplateSource::builtin(), Duration::from_secs(5));
        assert!(plugin.reload().is_err());
    }

    #[test]
    fn test_backup_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tpl_dir = dir.path().join("templates");
        fs::create_dir(&tpl_dir).unwrap();
        fs::write(tpl_dir.join("demo.template"), "themed\n").unwrap();
        fs::create_dir(dir.path().join("demo")).unwrap();
        fs::write(dir.path().join("demo/main.conf"), "user config\n").unwrap();

        let plugin = plugin_in(dir.path(), TemplateSource::new(Some(tpl_dir)));
        let backup = dir.path().join("backup");
        plugin.backup(&backup).unwrap();
        plugin.apply_theme(&ctx()).unwrap();

        assert!(plugin.restore(&backup).unwrap());
        assert_eq!(
            fs::read_to_string(dir.path().join("demo/main.conf")).unwrap(),
            "user config\n"
        );
        assert!(!dir.path().join("demo/colors.conf").exists());
        assert!(!dir.path().join("demo/.updated").exists());
    }
}
