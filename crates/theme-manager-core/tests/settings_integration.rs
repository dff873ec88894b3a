//! Integration tests for settings parsing against the real settings.toml.

use std::path::PathBuf;
use theme_manager_core::settings::DEFAULT_SETTINGS_TOML;
use theme_manager_core::{Error, Settings, SettingsStore};

fn project_root() -> PathBuf {
    // Navigate from crates/theme-manager-core/ up to project root
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent() // crates/
        .unwrap()
        .parent() // theme-manager/
        .unwrap()
        .to_path_buf()
}

#[test]
fn test_load_real_settings() {
    let path = project_root().join("settings.toml");
    let settings = Settings::load(&path).expect("Failed to load settings.toml");

    assert_eq!(settings, Settings::default());
    assert!(["gtk", "qt"].contains(&settings.ui.backend.as_str()));
    assert_eq!(settings.extractor.program, "wal");
    settings.validate().expect("Real settings.toml should be valid");
}

#[test]
fn test_default_settings_toml_parses_without_error() {
    let settings =
        Settings::from_default_toml().expect("DEFAULT_SETTINGS_TOML should parse without error");
    settings
        .validate()
        .expect("DEFAULT_SETTINGS_TOML should pass validation");
    assert!(DEFAULT_SETTINGS_TOML.contains("[extractor]"));
}

#[test]
fn test_settings_summary() {
    let summary = Settings::default().summary();

    assert!(summary.contains("UI:"));
    assert!(summary.contains("Wallpaper:"));
    assert!(summary.contains("Extractor:"));
    assert!(summary.contains("Plugins:"));
    assert!(summary.contains("order: discovery order"));
}

#[test]
fn test_find_and_load_with_explicit_path() {
    let path = project_root().join("settings.toml");
    let result = Settings::find_and_load(Some(&path)).unwrap();

    assert!(!result.used_defaults);
    assert_eq!(result.source, Some(path));
}

#[test]
fn test_find_and_load_explicit_missing_fails() {
    let missing = PathBuf::from("/nonexistent/settings.toml");
    assert!(matches!(
        Settings::find_and_load(Some(&missing)),
        Err(Error::ConfigNotFound(_))
    ));
}

#[test]
fn test_partial_user_file_merges_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(
        &path,
        r#"
        [wallpaper]
        directory = "/srv/walls"

        [plugins]
        order = ["kitty"]
        "#,
    )
    .unwrap();

    let settings = Settings::load(&path).unwrap();
    assert_eq!(settings.wallpaper.directory, "/srv/walls");
    assert_eq!(settings.wallpaper.setter, "auto");
    assert_eq!(settings.plugins.order, ["kitty"]);
    assert_eq!(settings.plugins.reload_timeout_secs, 10);
}

#[test]
fn test_broken_settings_returns_error_not_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "this is not valid toml {{{{\n").unwrap();

    assert!(Settings::load(&path).is_err(), "Broken settings should fail to load");
    assert!(Settings::find_and_load(Some(&path)).is_err());
}

#[test]
fn test_unknown_keys_are_rejected() {
    let result = Settings::load_with_defaults("[wallpaper]\nfolder = \"~/walls\"\n");
    assert!(result.is_err(), "Unknown wallpaper.folder should be rejected");
}

#[test]
fn test_validation_collects_multiple_errors() {
    let toml = r#"
        [ui]
        backend = "tk"

        [wallpaper]
        setter = "xwallpaper"

        [extractor]
        timeout_secs = 0
    "#;

    let settings = Settings::load_with_defaults(toml).unwrap();
    let err = settings.validate().unwrap_err().to_string();

    assert!(err.contains("ui.backend"), "Should report ui.backend error");
    assert!(err.contains("wallpaper.setter"), "Should report wallpaper.setter error");
    assert!(
        err.contains("extractor.timeout_secs"),
        "Should report extractor.timeout_secs error"
    );
}

#[test]
fn test_store_saves_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/settings.toml");
    let store = SettingsStore::new(&path, Settings::default());

    store.set_value("theme.standard_bright_colors", "yes").unwrap();
    store
        .update(|s| s.wallpaper.directory = "/srv/walls".to_string())
        .unwrap();

    let on_disk = Settings::load(&path).unwrap();
    assert!(on_disk.theme.standard_bright_colors);
    assert_eq!(on_disk.wallpaper.directory, "/srv/walls");

    // Invalid changes leave both copies untouched.
    assert!(store.set_value("wallpaper.setter", "xwallpaper").is_err());
    assert!(matches!(
        store.set_value("wallpaper.nope", "1"),
        Err(Error::UnknownSetting(_))
    ));
    assert_eq!(store.get().wallpaper.setter, "auto");
    assert_eq!(Settings::load(&path).unwrap(), on_disk);

    std::fs::write(&path, "[ui]\nwindow_width = 1024\n").unwrap();
    store.reload().unwrap();
    assert_eq!(store.get().ui.window_width, 1024);
    assert!(!store.get().theme.standard_bright_colors);
}
