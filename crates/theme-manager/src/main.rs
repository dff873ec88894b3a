//! theme-manager - wallpaper-driven color themes
//!
//! Command-line front end. The main thread plays the UI role: it submits
//! requests to the core service and consumes every result from the service
//! channel.

mod output;
mod services;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};

use theme_manager_core::settings::DEFAULT_SETTINGS_TOML;
use theme_manager_core::{
    ApplyMode, ConfigLayout, ServiceEvent, SettingsStore, ThemeService, logging,
};

use crate::services::watcher::{FileWatcher, WatchEvent};

/// theme-manager - Wallpaper-driven color themes for Wayland desktops
#[derive(Parser, Debug)]
#[command(name = "theme-manager", version, about, long_about = None)]
struct Args {
    /// Path to the settings file (uses XDG lookup if not specified)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the default settings file and exit
    #[arg(long)]
    print_default_config: bool,

    /// Validate settings and exit (returns non-zero on errors)
    #[arg(long)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List wallpapers in the active directory
    List,
    /// Show the palette of a wallpaper without applying it
    Preview {
        /// Wallpaper file (a bare name is looked up in the wallpaper directory)
        wallpaper: PathBuf,
    },
    /// Apply a wallpaper and/or its colors
    Apply {
        /// Wallpaper file (a bare name is looked up in the wallpaper directory)
        wallpaper: PathBuf,
        /// What to apply: wallpaper, colors or full
        #[arg(short, long, default_value = "full")]
        mode: ApplyMode,
        /// Print per-application results regardless of settings
        #[arg(long)]
        details: bool,
    },
    /// Drop stale palette cache entries
    Scan,
    /// Manage application plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Restore original application configs from backup
    Restore {
        /// Plugin to restore (all backed-up plugins if omitted)
        plugin: Option<String>,
    },
    /// Show the currently applied wallpaper and colors
    Current,
    /// Change a setting, e.g. `set wallpaper.directory ~/Pictures`
    Set {
        /// Setting key as section.name
        key: String,
        value: String,
    },
    /// Watch the wallpaper directory and settings file for changes
    Watch,
}

#[derive(Subcommand, Debug)]
enum PluginAction {
    /// List plugins in run order
    List,
    /// Enable a plugin
    Enable { name: String },
    /// Disable a plugin
    Disable { name: String },
}

fn main() -> ExitCode {
    let args = Args::parse();

    logging::init(args.verbose);

    if args.print_default_config {
        print!("{}", DEFAULT_SETTINGS_TOML);
        return ExitCode::SUCCESS;
    }

    // An explicit --config must exist and be valid (no fallback)
    let store = match SettingsStore::open(args.config.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = store.get().validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    debug!("Settings validated ({})", store.path().display());

    if args.check_config {
        if store.path().exists() {
            println!("Settings valid: {}", store.path().display());
        } else {
            println!("Settings valid (using defaults)");
        }
        return ExitCode::SUCCESS;
    }

    let Some(command) = args.command else {
        println!("{}", store.get().summary());
        return ExitCode::SUCCESS;
    };

    match run(command, Arc::new(store)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, store: Arc<SettingsStore>) -> anyhow::Result<()> {
    let layout = ConfigLayout::user();
    let (service, events, report) = ThemeService::from_settings(store, &layout);
    for rejected in &report.rejected {
        eprintln!(
            "Warning: plugin manifest {} skipped: {}",
            rejected.source.display(),
            rejected.reason
        );
    }

    match command {
        Command::List => {
            let wallpapers = service.list_wallpapers()?;
            let current = service.applied_state().and_then(|s| s.wallpaper);
            output::print_wallpapers(
                &wallpapers,
                |path| service.cache().status(path),
                current.as_deref(),
            );
        }
        Command::Preview { wallpaper } => {
            let wallpaper = resolve_wallpaper(&service, &wallpaper)?;
            service.request_preview(&wallpaper);
            handle_preview(&events)?;
        }
        Command::Apply {
            wallpaper,
            mode,
            details,
        } => {
            let wallpaper = resolve_wallpaper(&service, &wallpaper)?;
            service.request_apply(&wallpaper, mode)?;
            let show_details = details || service.settings().get().theme.show_results_dialog;
            handle_apply(&events, show_details)?;
        }
        Command::Scan => {
            service.request_scan();
            match events.recv()? {
                ServiceEvent::ScanFinished(summary) => output::print_scan(&summary),
                other => bail!("unexpected event: {:?}", other),
            }
        }
        Command::Plugins { action } => match action {
            PluginAction::List => output::print_plugins(&service.list_plugins()),
            PluginAction::Enable { name } => {
                service.set_plugin_enabled(&name, true)?;
                println!("Enabled {}", name);
            }
            PluginAction::Disable { name } => {
                service.set_plugin_enabled(&name, false)?;
                println!("Disabled {}", name);
            }
        },
        Command::Restore { plugin: Some(name) } => {
            if service.restore_plugin(&name)? {
                println!("Restored {}", name);
            } else {
                println!("No backup for {}", name);
            }
        }
        Command::Restore { plugin: None } => {
            let results = service.restore_plugins()?;
            if results.is_empty() {
                println!("No backups to restore");
            }
            let mut failed = 0;
            for (name, result) in results {
                match result {
                    Ok(_) => println!("Restored {}", name),
                    Err(e) => {
                        failed += 1;
                        eprintln!("Failed to restore {}: {}", name, e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} plugin(s) could not be restored", failed);
            }
        }
        Command::Current => match service.applied_state() {
            Some(state) => output::print_state(&state),
            None => println!("Nothing applied yet"),
        },
        Command::Set { key, value } => {
            service.settings().set_value(&key, &value)?;
            println!("{} = {}", key, value);
        }
        Command::Watch => watch(service, &events)?,
    }
    Ok(())
}

/// Accept a path, or a bare file name inside the wallpaper directory.
fn resolve_wallpaper(service: &ThemeService, wallpaper: &Path) -> anyhow::Result<PathBuf> {
    if wallpaper.is_file() {
        return Ok(wallpaper.to_path_buf());
    }
    let in_directory = service.settings().get().wallpaper_directory().join(wallpaper);
    if wallpaper.components().count() == 1 && in_directory.is_file() {
        return Ok(in_directory);
    }
    bail!("wallpaper not found: {}", wallpaper.display())
}

fn handle_preview(events: &Receiver<ServiceEvent>) -> anyhow::Result<()> {
    loop {
        match events.recv()? {
            ServiceEvent::PreviewReady {
                wallpaper, result, ..
            } => {
                let palette = result.context("preview failed")?;
                output::print_palette(&wallpaper, &palette);
                return Ok(());
            }
            other => debug!("Ignoring {:?}", other),
        }
    }
}

fn handle_apply(events: &Receiver<ServiceEvent>, show_details: bool) -> anyhow::Result<()> {
    loop {
        match events.recv()? {
            ServiceEvent::Phase(phase) => info!("Apply: {}", phase),
            ServiceEvent::ApplyFinished(result) => {
                let report = result?;
                output::print_report(&report, show_details);
                if !report.is_success() {
                    bail!("not every part of the theme was applied");
                }
                return Ok(());
            }
            other => debug!("Ignoring {:?}", other),
        }
    }
}

fn watch(service: ThemeService, events: &Receiver<ServiceEvent>) -> anyhow::Result<()> {
    let service = Arc::new(service);
    let wallpaper_dir = service.settings().get().wallpaper_directory();
    let settings_file = service.settings().path().to_path_buf();

    let handler = service.clone();
    let _watcher = FileWatcher::start(wallpaper_dir.clone(), settings_file, move |event| {
        match event {
            WatchEvent::WallpapersChanged => handler.request_scan(),
            WatchEvent::SettingsChanged => handler.reload_settings(),
        }
    });
    println!("Watching {} (Ctrl+C to stop)", wallpaper_dir.display());

    // Initial scan so the cache matches the directory from the start.
    service.request_scan();

    loop {
        match events.recv()? {
            ServiceEvent::ScanFinished(summary) => output::print_scan(&summary),
            ServiceEvent::SettingsReloaded(Ok(())) => {
                println!("Settings reloaded");
                let directory = service.settings().get().wallpaper_directory();
                if directory != wallpaper_dir {
                    warn!(
                        "Wallpaper directory changed to {}; restart watch to follow it",
                        directory.display()
                    );
                }
            }
            ServiceEvent::SettingsReloaded(Err(e)) => {
                eprintln!("Settings not reloaded: {}", e);
            }
            other => debug!("Ignoring {:?}", other),
        }
    }
}
