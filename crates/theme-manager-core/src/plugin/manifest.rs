//! Declarative plugin definitions.
//!
//! Built-in plugins and user manifests (`plugins/<name>.toml`) share this
//! schema:
//!
//! ```toml
//! name = "foot"
//! display_name = "Foot"
//! description = "Wayland terminal"
//! config_path = "~/.config/foot/theme-manager-colors.ini"
//! template = "foot"
//! binary = "foot"
//! reload = ["pkill", "-USR1", "foot"]
//!
//! [include]
//! file = "~/.config/foot/foot.ini"
//! line = "include=~/.config/foot/theme-manager-colors.ini"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths;

/// How a plugin is defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Generated file; `~` is expanded.
    pub config_path: String,
    /// Template name, resolved through the override directory then built-ins.
    pub template: String,
    /// Executable that must be on PATH for the plugin to be available.
    #[serde(default)]
    pub binary: Option<String>,
    /// Command (argv) that makes the running application reload.
    #[serde(default)]
    pub reload: Option<Vec<String>>,
    /// Line to ensure in the application's main config.
    #[serde(default)]
    pub include: Option<IncludeDirective>,
    /// Files whose mtime is bumped after writing, for external watchers.
    #[serde(default)]
    pub touch: Vec<String>,
}

/// An include/import line inserted into the application's main config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeDirective {
    /// Main config file; relative paths are resolved next to `config_path`.
    pub file: String,
    pub line: String,
    /// Comment written above the line (include the comment syntax).
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub placement: IncludePlacement,
}

/// Where a missing include line is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludePlacement {
    /// At the end of the file.
    #[default]
    Append,
    /// After the last `@define-color` line (or after the header comment), so
    /// the imported colors override fallback definitions.
    AfterDefineColors,
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl PluginSpec {
    /// Structural checks; returns every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !is_valid_name(&self.name) {
            errors.push(format!(
                "name: invalid value '{}', expected lowercase letters, digits, '-' or '_'",
                self.name
            ));
        }
        if self.display_name.trim().is_empty() {
            errors.push("display_name: must not be empty".to_string());
        }
        if self.config_path.trim().is_empty() {
            errors.push("config_path: must not be empty".to_string());
        }
        if self.template.trim().is_empty() {
            errors.push("template: must not be empty".to_string());
        }
        if let Some(reload) = &self.reload
            && reload.first().is_none_or(|program| program.trim().is_empty())
        {
            errors.push("reload: command must not be empty".to_string());
        }
        if let Some(include) = &self.include {
            if include.file.trim().is_empty() {
                errors.push("include.file: must not be empty".to_string());
            }
            if include.line.trim().is_empty() {
                errors.push("include.line: must not be empty".to_string());
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    pub fn resolved_config_path(&self) -> PathBuf {
        paths::expand_tilde(&self.config_path)
    }

    pub fn resolved_include_file(&self) -> Option<PathBuf> {
        let include = self.include.as_ref()?;
        let file = paths::expand_tilde(&include.file);
        if file.is_absolute() {
            return Some(file);
        }
        let config = self.resolved_config_path();
        Some(config.parent().unwrap_or(Path::new(".")).join(file))
    }

    pub fn resolved_touch_files(&self) -> Vec<PathBuf> {
        self.touch.iter().map(paths::expand_tilde).collect()
    }
}

impl IncludeDirective {
    /// `content` with the include line added, or None if already present.
    pub fn insert_into(&self, content: Option<&str>) -> Option<String> {
        let block: Vec<&str> = self.comment.as_deref().into_iter().chain([self.line.as_str()]).collect();

        let Some(content) = content else {
            return Some(format!("{}\n", block.join("\n")));
        };
        if content.lines().any(|l| l.trim() == self.line.trim()) {
            return None;
        }

        match self.placement {
            IncludePlacement::Append => {
                let mut out = content.to_string();
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
                out.push_str(&block.join("\n"));
                out.push('\n');
                Some(out)
            }
            IncludePlacement::AfterDefineColors => {
                let mut lines: Vec<&str> = content.split('\n').collect();
                let insert_at = lines
                    .iter()
                    .rposition(|l| l.trim_start().starts_with("@define-color"))
                    .or_else(|| lines.iter().position(|l| l.trim_end().ends_with("*/")))
                    .map_or(0, |i| i + 1);

                let mut inserted = vec![""];
                inserted.extend(&block);
                inserted.push("");
                lines.splice(insert_at..insert_at, inserted);
                Some(lines.join("\n"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PluginSpec {
        PluginSpec {
            name: "foot".into(),
            display_name: "Foot".into(),
            description: String::new(),
            config_path: "/cfg/foot/colors.ini".into(),
            template: "foot".into(),
            binary: Some("foot".into()),
            reload: None,
            include: None,
            touch: Vec::new(),
        }
    }

    fn css_import(placement: IncludePlacement) -> IncludeDirective {
        IncludeDirective {
            file: "style.css".into(),
            line: "@import 'theme.css';".into(),
            comment: Some("/* theme colors */".into()),
            placement,
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut s = spec();
        s.name = "Foot Terminal".into();
        s.template = String::new();
        s.reload = Some(Vec::new());
        let errors = s.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_parse_manifest_rejects_unknown_keys() {
        let result: Result<PluginSpec, _> = toml::from_str(
            r#"
            name = "foot"
            display_name = "Foot"
            config_path = "~/x"
            template = "foot"
            colour = "red"
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_relative_include_resolves_next_to_config() {
        let mut s = spec();
        s.include = Some(css_import(IncludePlacement::Append));
        assert_eq!(
            s.resolved_include_file(),
            Some(PathBuf::from("/cfg/foot/style.css"))
        );
    }

    #[test]
    fn test_append_include() {
        let include = css_import(IncludePlacement::Append);
        let out = include.insert_into(Some("a\nb")).unwrap();
        assert_eq!(out, "a\nb\n\n/* theme colors */\n@import 'theme.css';\n");
        assert_eq!(include.insert_into(Some(&out)), None);
    }

    #[test]
    fn test_include_into_missing_file() {
        let include = css_import(IncludePlacement::Append);
        assert_eq!(
            include.insert_into(None).unwrap(),
            "/* theme colors */\n@import 'theme.css';\n"
        );
    }

    #[test]
    fn test_include_after_define_colors() {
        let include = css_import(IncludePlacement::AfterDefineColors);
        let content = "/* header */\n@define-color bg #000;\n@define-color fg #fff;\nwindow {}\n";
        let out = include.insert_into(Some(content)).unwrap();
        assert_eq!(
            out,
            "/* header */\n@define-color bg #000;\n@define-color fg #fff;\n\n/* theme colors */\n@import 'theme.css';\n\nwindow {}\n"
        );
    }

    #[test]
    fn test_include_after_header_without_defines() {
        let include = css_import(IncludePlacement::AfterDefineColors);
        let out = include.insert_into(Some("/*\n * bar\n */\nwindow {}")).unwrap();
        assert!(out.starts_with("/*\n * bar\n */\n\n/* theme colors */\n@import 'theme.css';\n\nwindow {}"));
    }
}
