//! Terminal rendering of service results.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use theme_manager_core::{
    AppliedState, ApplyReport, CacheStatus, Notification, Palette, PluginDescriptor,
    PluginOutcome, PluginResult, Rgb, ScanSummary, WallpaperOutcome,
};

/// Colored block for `color`, or nothing when stdout is not a terminal.
fn swatch(color: Rgb) -> String {
    if std::io::stdout().is_terminal() {
        format!("\x1b[48;2;{};{};{}m    \x1b[0m ", color.r, color.g, color.b)
    } else {
        String::new()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn print_palette(wallpaper: &Path, palette: &Palette) {
    println!(
        "{} ({} theme)",
        file_name(wallpaper),
        if palette.is_dark() { "dark" } else { "light" }
    );
    println!("  {}background  {}", swatch(palette.special.background), palette.special.background);
    println!("  {}foreground  {}", swatch(palette.special.foreground), palette.special.foreground);
    println!("  {}cursor      {}", swatch(palette.special.cursor), palette.special.cursor);
    for (i, color) in palette.colors.iter().enumerate() {
        println!("  {}color{:<6}{}", swatch(*color), i, color);
    }
}

pub fn print_wallpapers(
    wallpapers: &[PathBuf],
    status: impl Fn(&Path) -> CacheStatus,
    current: Option<&Path>,
) {
    if wallpapers.is_empty() {
        println!("No wallpapers found");
        return;
    }
    for path in wallpapers {
        let marker = if current == Some(path.as_path()) { "*" } else { " " };
        let cached = match status(path) {
            CacheStatus::Fresh => "cached",
            CacheStatus::Stale => "stale",
            CacheStatus::Missing => "",
        };
        println!("{} {:<40} {}", marker, file_name(path), cached);
    }
}

pub fn print_plugins(plugins: &[PluginDescriptor]) {
    for plugin in plugins {
        let state = match (plugin.enabled, plugin.available) {
            (true, true) => "enabled",
            (true, false) => "enabled, not installed",
            (false, true) => "disabled",
            (false, false) => "disabled, not installed",
        };
        println!("{:<10} {:<20} {}", plugin.name, plugin.display_name, state);
        println!("           {}", plugin.config_path.display());
    }
}

fn plugin_line(result: &PluginResult) -> String {
    let outcome = match &result.outcome {
        PluginOutcome::Success => "ok".to_string(),
        PluginOutcome::Failure(reason) => format!("failed: {}", reason),
        PluginOutcome::SkippedUnavailable => "skipped (not installed)".to_string(),
    };
    let mut line = format!("  {:<20} {}", result.display_name, outcome);
    if let Some(warning) = &result.backup_warning {
        line.push_str(&format!(" (backup: {})", warning));
    }
    line
}

pub fn print_report(report: &ApplyReport, show_details: bool) {
    match report.notification(show_details) {
        Notification::Aggregate { success, message } => {
            println!("{}: {}", if success { "Done" } else { "Finished with errors" }, message);
        }
        Notification::Detailed(results) => {
            match &report.wallpaper_outcome {
                WallpaperOutcome::NotRequested => {}
                WallpaperOutcome::Set => println!("Wallpaper: {}", file_name(&report.wallpaper)),
                WallpaperOutcome::Failed(reason) => println!("Wallpaper failed: {}", reason),
            }
            if !results.is_empty() {
                println!("Applications:");
                for result in &results {
                    println!("{}", plugin_line(result));
                }
            }
        }
    }
    for warning in &report.warnings {
        eprintln!("Warning: {}", warning);
    }
}

pub fn print_scan(summary: &ScanSummary) {
    println!(
        "Scanned {} wallpapers, {} without a cached palette, {} stale entries pruned",
        summary.scanned,
        summary.needs_regeneration.len(),
        summary.pruned
    );
    for path in &summary.needs_regeneration {
        println!("  {}", file_name(path));
    }
}

pub fn print_state(state: &AppliedState) {
    match (&state.wallpaper, state.wallpaper_set_at) {
        (Some(path), Some(at)) => println!("Wallpaper: {} (since {})", path.display(), at.to_rfc2822()),
        (Some(path), None) => println!("Wallpaper: {}", path.display()),
        _ => println!("Wallpaper: none recorded"),
    }
    match (&state.colors_source, state.colors_applied_at) {
        (Some(source), Some(at)) => {
            println!("Colors: from {} (since {})", source.display(), at.to_rfc2822());
            if !state.plugins.is_empty() {
                println!("Applied to: {}", state.plugins.join(", "));
            }
        }
        _ => println!("Colors: none recorded"),
    }
    if let (Some(source), Some(palette)) = (&state.colors_source, &state.palette) {
        print_palette(source, palette);
    }
}
