//! Template substitution for plugin config files.
//!
//! Templates are plain text with `{{name}}` placeholders. Known names are
//! replaced verbatim with palette values; unknown placeholders are left in
//! place so a typo shows up in the generated file instead of vanishing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::palette::Palette;

/// Built-in templates compiled into the binary, keyed by template name.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("waybar", include_str!("../../../templates/waybar.template")),
    ("kitty", include_str!("../../../templates/kitty.template")),
    ("wofi", include_str!("../../../templates/wofi.template")),
    ("mako", include_str!("../../../templates/mako.template")),
    ("gtk", include_str!("../../../templates/gtk.template")),
];

/// File extension for template files on disk.
pub const TEMPLATE_EXTENSION: &str = "template";

/// Variables available to templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    vars: HashMap<String, String>,
}

impl TemplateContext {
    /// Variables for a palette: `color0`..`color15`, `background`,
    /// `foreground`, `cursor`, the semantic aliases and `wallpaper`.
    pub fn from_palette(palette: &Palette, wallpaper: Option<&Path>) -> Self {
        let mut vars = HashMap::new();
        for (i, color) in palette.colors.iter().enumerate() {
            vars.insert(format!("color{}", i), color.to_string());
        }
        vars.insert("background".into(), palette.special.background.to_string());
        vars.insert("foreground".into(), palette.special.foreground.to_string());
        vars.insert("cursor".into(), palette.special.cursor.to_string());
        for (name, color) in palette.semantic_colors() {
            vars.insert(name.to_string(), color.to_string());
        }
        if let Some(wallpaper) = wallpaper {
            vars.insert("wallpaper".into(), wallpaper.display().to_string());
        }
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Substitute every `{{name}}` (spaces inside the braces allowed) with its value.
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after_open[..end].trim();
        let valid = !name.is_empty() && name.chars().all(is_name_char);
        match ctx.get(name) {
            Some(value) if valid => out.push_str(value),
            _ => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

/// Looks up templates by name: user override directory first, then built-ins.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    override_dir: Option<PathBuf>,
}

impl TemplateSource {
    pub fn new(override_dir: Option<PathBuf>) -> Self {
        Self { override_dir }
    }

    /// Only the embedded templates.
    pub fn builtin() -> Self {
        Self { override_dir: None }
    }

    fn override_path(&self, name: &str) -> Option<PathBuf> {
        self.override_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", name, TEMPLATE_EXTENSION)))
    }

    /// Template text for `name`, if any source provides it.
    pub fn load(&self, name: &str) -> Option<String> {
        if let Some(path) = self.override_path(name)
            && let Ok(text) = std::fs::read_to_string(&path)
        {
            debug!("Using template override {}", path.display());
            return Some(text);
        }
        BUILTIN_TEMPLATES
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, text)| text.to_string())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.override_path(name).is_some_and(|p| p.is_file())
            || BUILTIN_TEMPLATES.iter().any(|(builtin, _)| *builtin == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::tests::sample_pywal_json;

    fn ctx() -> TemplateContext {
        let palette = Palette::from_pywal_json(&sample_pywal_json()).unwrap();
        TemplateContext::from_palette(&palette, Some(Path::new("/walls/a.jpg")))
    }

    #[test]
    fn test_context_has_all_indexed_and_role_names() {
        let ctx = ctx();
        for i in 0..16 {
            assert!(ctx.get(&format!("color{}", i)).is_some());
        }
        assert_eq!(ctx.get("background"), Some("#101010"));
        assert_eq!(ctx.get("foreground"), Some("#eeeeee"));
        assert_eq!(ctx.get("cursor"), Some("#eeeeee"));
        assert_eq!(ctx.get("red"), ctx.get("color1"));
        assert_eq!(ctx.get("wallpaper"), Some("/walls/a.jpg"));
    }

    #[test]
    fn test_render_substitutes_verbatim() {
        let out = render("bg={{background}} c1={{ color1 }};", &ctx());
        assert_eq!(out, "bg=#101010 c1=#0a05fe;");
    }

    #[test]
    fn test_render_keeps_unknown_tokens() {
        let out = render("x={{nope}} y={{background}}", &ctx());
        assert_eq!(out, "x={{nope}} y=#101010");
    }

    #[test]
    fn test_render_keeps_unterminated_and_css_braces() {
        let out = render("window { color: {{foreground}}; } tail {{oops", &ctx());
        assert_eq!(out, "window { color: #eeeeee; } tail {{oops");
    }

    #[test]
    fn test_render_rejects_names_with_symbols() {
        let mut ctx = TemplateContext::default();
        ctx.insert("a-b", "X");
        assert_eq!(render("{{a-b}}", &ctx), "{{a-b}}");
    }

    #[test]
    fn test_builtin_templates_present() {
        let source = TemplateSource::builtin();
        for name in ["waybar", "kitty", "wofi", "mako", "gtk"] {
            assert!(source.exists(name), "missing builtin template {}", name);
            assert!(source.load(name).unwrap().contains("{{"));
        }
        assert!(!source.exists("nonexistent"));
    }

    #[test]
    fn test_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kitty.template"), "custom {{color0}}").unwrap();
        let source = TemplateSource::new(Some(dir.path().to_path_buf()));
        assert_eq!(source.load("kitty").unwrap(), "custom {{color0}}");
        // Names without an override still resolve to the builtin.
        assert!(source.load("mako").is_some());
    }

    #[test]
    fn test_builtin_templates_render_fully() {
        let source = TemplateSource::builtin();
        let ctx = ctx();
        for name in ["waybar", "kitty", "wofi", "mako", "gtk"] {
            let out = render(&source.load(name).unwrap(), &ctx);
            assert!(!out.contains("{{"), "unrendered token left in {}", name);
        }
    }
}
