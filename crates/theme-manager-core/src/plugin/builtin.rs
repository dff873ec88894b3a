//! Plugins shipped with theme-manager, in run order.

use super::manifest::{IncludeDirective, IncludePlacement, PluginSpec};

fn argv(parts: &[&str]) -> Option<Vec<String>> {
    Some(parts.iter().map(|s| s.to_string()).collect())
}

/// Built-in plugin definitions in declaration order.
pub fn builtin_specs() -> Vec<PluginSpec> {
    vec![
        PluginSpec {
            name: "waybar".into(),
            display_name: "Waybar".into(),
            description: "Wayland status bar".into(),
            config_path: "~/.config/waybar/theme-manager-style.css".into(),
            template: "waybar".into(),
            binary: Some("waybar".into()),
            // Waybar is restarted by the user's own watcher on style.css.
            reload: None,
            include: Some(IncludeDirective {
                file: "style.css".into(),
                line: "@import 'theme-manager-style.css';".into(),
                comment: Some("/* Theme Manager colors (override fallbacks) */".into()),
                placement: IncludePlacement::AfterDefineColors,
            }),
            touch: vec![
                "~/.config/waybar/style.css".into(),
                "~/.config/waybar/.theme-updated".into(),
            ],
        },
        PluginSpec {
            name: "kitty".into(),
            display_name: "Kitty Terminal".into(),
            description: "GPU-accelerated terminal emulator".into(),
            config_path: "~/.config/kitty/theme-manager-colors.conf".into(),
            template: "kitty".into(),
            binary: Some("kitty".into()),
            reload: argv(&["pkill", "-USR1", "kitty"]),
            include: Some(IncludeDirective {
                file: "kitty.conf".into(),
                line: "include theme-manager-colors.conf".into(),
                comment: Some("# Theme Manager colors".into()),
                placement: IncludePlacement::Append,
            }),
            touch: Vec::new(),
        },
        PluginSpec {
            name: "wofi".into(),
            display_name: "Wofi".into(),
            description: "Wayland application launcher".into(),
            config_path: "~/.config/wofi/theme-manager-style.css".into(),
            template: "wofi".into(),
            binary: Some("wofi".into()),
            reload: None,
            include: Some(IncludeDirective {
                file: "style.css".into(),
                line: "@import 'theme-manager-style.css';".into(),
                comment: Some("/* Theme Manager colors */".into()),
                placement: IncludePlacement::AfterDefineColors,
            }),
            touch: Vec::new(),
        },
        PluginSpec {
            name: "mako".into(),
            display_name: "Mako".into(),
            description: "Wayland notification daemon".into(),
            config_path: "~/.config/mako/config".into(),
            template: "mako".into(),
            binary: Some("mako".into()),
            reload: argv(&["makoctl", "reload"]),
            include: None,
            touch: Vec::new(),
        },
        PluginSpec {
            name: "gtk".into(),
            display_name: "GTK Themes".into(),
            description: "GTK 3 application colors".into(),
            config_path: "~/.config/gtk-3.0/theme-manager.css".into(),
            template: "gtk".into(),
            // GTK is part of every desktop this runs on.
            binary: None,
            reload: None,
            include: Some(IncludeDirective {
                file: "gtk.css".into(),
                line: "@import 'theme-manager.css';".into(),
                comment: Some("/* Theme Manager colors */".into()),
                placement: IncludePlacement::Append,
            }),
            touch: Vec::new(),
        },
    ]
}
