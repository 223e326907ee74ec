//! Integration tests for the stratix settings engine.
//!
//! These exercise the full resolution pipeline: layered precedence,
//! interpolation, caching, the parse/merge protocol, hooks, and the
//! generated-config round trip.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use stratix::{
    LayerKey, SettingAttrs, SettingHook, SettingType, SettingValue, Settings, SettingsError,
};
use tempfile::TempDir;

/// Test helper to create a temporary configuration file
fn create_temp_config_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let config_path = dir.path().join(name);
    fs::write(&config_path, content).expect("Failed to write test config file");
    config_path
}

/// A registry resembling a real embedding application's settings.
fn app_settings() -> Settings {
    let mut settings = Settings::new();
    settings
        .define_settings(
            "main",
            vec![
                ("name", SettingAttrs::new("Application name.")),
                ("run_mode", SettingAttrs::new("Run mode.")),
                (
                    "environment",
                    SettingAttrs::new("Active environment.").default("production"),
                ),
                (
                    "confdir",
                    SettingAttrs::new("Config dir.")
                        .kind(SettingType::Directory)
                        .default("/etc/app"),
                ),
                (
                    "vardir",
                    SettingAttrs::new("State dir.")
                        .kind(SettingType::Directory)
                        .default("/var/lib/app"),
                ),
                (
                    "ssldir",
                    SettingAttrs::new("SSL dir.")
                        .kind(SettingType::Directory)
                        .default("$vardir/ssl"),
                ),
                (
                    "loglevel",
                    SettingAttrs::new("Minimum level that gets logged.").default("notice"),
                ),
                (
                    "daemonize",
                    SettingAttrs::new("Run in the background.")
                        .kind(SettingType::Boolean)
                        .default("false"),
                ),
            ],
        )
        .unwrap();
    settings
        .define_settings(
            "master",
            vec![(
                "bucketdir",
                SettingAttrs::new("File bucket dir.")
                    .kind(SettingType::Directory)
                    .default("$vardir/bucket"),
            )],
        )
        .unwrap();
    settings
}

fn initialized_app_settings() -> Settings {
    let settings = app_settings();
    let mut defaults = HashMap::new();
    defaults.insert("name".to_string(), SettingValue::from("app"));
    defaults.insert("run_mode".to_string(), SettingValue::from("master"));
    settings.initialize_app_defaults(defaults).unwrap();
    settings
}

#[test]
fn test_multi_source_precedence_complete() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let config = create_temp_config_file(
        &temp_dir,
        "app.conf",
        "loglevel = info\n\
         vardir = /srv/state\n",
    );
    settings.parse_files(&[config]).unwrap();

    // main layer beats application defaults / definition defaults
    assert_eq!(
        settings.string_value("vardir", None).unwrap().unwrap(),
        "/srv/state"
    );

    // memory beats main
    settings.set("vardir", "/from-memory").unwrap();
    assert_eq!(
        settings.string_value("vardir", None).unwrap().unwrap(),
        "/from-memory"
    );

    // cli beats memory
    settings.handle_arg("--vardir", Some("/from-cli")).unwrap();
    assert_eq!(
        settings.string_value("vardir", None).unwrap().unwrap(),
        "/from-cli"
    );

    // untouched settings still resolve from the file layer
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "info"
    );
}

#[test]
fn test_run_mode_section_beats_main() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let config = create_temp_config_file(
        &temp_dir,
        "app.conf",
        "loglevel = notice\n\
         [master]\n\
         loglevel = debug\n\
         [agent]\n\
         loglevel = err\n",
    );
    settings.parse_files(&[config]).unwrap();

    // Run mode is master, so the [master] section wins over [main] and
    // the [agent] section is never consulted
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "debug"
    );
}

#[test]
fn test_environment_section_beats_run_mode_section() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let config = create_temp_config_file(
        &temp_dir,
        "app.conf",
        "[master]\n\
         loglevel = debug\n\
         [staging]\n\
         loglevel = warning\n",
    );
    settings.parse_files(&[config]).unwrap();

    assert_eq!(
        settings
            .string_value("loglevel", Some("staging"))
            .unwrap()
            .unwrap(),
        "warning"
    );
    // Without the environment, the run-mode section still wins
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "debug"
    );
}

#[test]
fn test_interpolation_follows_overrides() {
    let settings = app_settings();

    assert_eq!(
        settings.string_value("ssldir", None).unwrap().unwrap(),
        "/var/lib/app/ssl"
    );

    settings.set("vardir", "/tmp/state").unwrap();
    assert_eq!(
        settings.string_value("ssldir", None).unwrap().unwrap(),
        "/tmp/state/ssl"
    );
}

#[test]
fn test_cached_value_is_stable_between_mutations() {
    let settings = app_settings();

    let first = settings.string_value("ssldir", None).unwrap().unwrap();
    let second = settings.string_value("ssldir", None).unwrap().unwrap();
    assert_eq!(first, second);

    // A write to an unrelated setting invalidates the cache, but the
    // recomputed value is byte-identical when its inputs are unchanged
    settings.set("loglevel", "debug").unwrap();
    let third = settings.string_value("ssldir", None).unwrap().unwrap();
    assert_eq!(first, third);
}

#[test]
fn test_parse_atomicity_on_bad_second_file() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let good = create_temp_config_file(&temp_dir, "good.conf", "loglevel = info\n");
    settings.parse_files(&[good.clone()]).unwrap();
    let before = settings.to_listing_string(None).unwrap();

    let update = create_temp_config_file(&temp_dir, "update.conf", "loglevel = debug\n");
    let bad = create_temp_config_file(&temp_dir, "bad.conf", "this line is not a setting\n");

    let error = settings.parse_files(&[update, bad]).unwrap_err();
    assert!(error.is_parse());

    // No partial merge: the store matches its pre-call state exactly
    let after = settings.to_listing_string(None).unwrap();
    assert_eq!(before, after);
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "info"
    );
}

#[test]
fn test_later_files_merge_key_by_key() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let system = create_temp_config_file(
        &temp_dir,
        "system.conf",
        "loglevel = notice\n\
         vardir = /var/lib/app\n\
         [master]\n\
         bucketdir = /srv/bucket\n",
    );
    let user = create_temp_config_file(&temp_dir, "user.conf", "loglevel = debug\n");

    settings.parse_files(&[system, user]).unwrap();

    // The user file overrides only the key it sets
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "debug"
    );
    assert_eq!(
        settings.string_value("vardir", None).unwrap().unwrap(),
        "/var/lib/app"
    );
    // Sections absent from the user file survive from the system file
    assert_eq!(
        settings.string_value("bucketdir", None).unwrap().unwrap(),
        "/srv/bucket"
    );
}

#[test]
fn test_reparse_replaces_file_layers_wholesale() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let first = create_temp_config_file(
        &temp_dir,
        "first.conf",
        "loglevel = info\nvardir = /one\n",
    );
    settings.parse_files(&[first]).unwrap();

    let second = create_temp_config_file(&temp_dir, "second.conf", "vardir = /two\n");
    settings.parse_files(&[second]).unwrap();

    // loglevel's file-sourced value is gone; the default is back
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "notice"
    );
    assert_eq!(
        settings.string_value("vardir", None).unwrap().unwrap(),
        "/two"
    );
}

#[test]
fn test_missing_files_are_skipped_and_empty_parse_is_noop() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    settings.set("loglevel", "debug").unwrap();
    let missing = temp_dir.path().join("nope.conf");
    settings.parse_files(&[missing]).unwrap();

    // Nothing contributed data, so even the memory layer survived
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "debug"
    );
}

#[test]
fn test_unknown_settings_in_files_are_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let config = create_temp_config_file(
        &temp_dir,
        "app.conf",
        "some_future_setting = whatever\nloglevel = info\n",
    );
    settings.parse_files(&[config]).unwrap();
    assert_eq!(
        settings.string_value("loglevel", None).unwrap().unwrap(),
        "info"
    );

    // The same name assigned directly is an error
    let error = settings.set("some_future_setting", "x").unwrap_err();
    assert!(matches!(error, SettingsError::UnknownSetting { .. }));
}

#[test]
fn test_parse_hooks_observe_effective_value() {
    let temp_dir = TempDir::new().unwrap();
    let observed = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let sink = observed.clone();

    let mut settings = Settings::new();
    settings
        .define_settings(
            "main",
            vec![
                ("name", SettingAttrs::new("Application name.")),
                ("run_mode", SettingAttrs::new("Run mode.")),
                (
                    "confdir",
                    SettingAttrs::new("Config dir.").default("/etc/app"),
                ),
                (
                    "manifest",
                    SettingAttrs::new("Entry manifest.")
                        .default("$confdir/site.pp")
                        .hook(SettingHook::new(move |value| {
                            sink.lock().push(value.coerce_to_string());
                        })),
                ),
            ],
        )
        .unwrap();

    // A cli override outranks the file layer; the hook must see it
    settings
        .set_value(
            "manifest",
            SettingValue::from("/cli/site.pp"),
            LayerKey::Cli,
        )
        .unwrap();

    let config = create_temp_config_file(&temp_dir, "app.conf", "manifest = /file/site.pp\n");
    settings.parse_files(&[config]).unwrap();

    assert_eq!(observed.lock().as_slice(), ["/cli/site.pp".to_string()]);
}

#[test]
fn test_hooks_skip_settings_no_layer_defines() {
    let temp_dir = TempDir::new().unwrap();
    let observed = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
    let sink = observed.clone();

    let mut settings = Settings::new();
    settings
        .define_settings(
            "main",
            vec![
                ("loglevel", SettingAttrs::new("Log level.")),
                (
                    "watched",
                    SettingAttrs::new("Watched setting.")
                        .default("defaulted")
                        .hook(SettingHook::new(move |value| {
                            sink.lock().push(value.coerce_to_string());
                        })),
                ),
            ],
        )
        .unwrap();

    let config = create_temp_config_file(&temp_dir, "app.conf", "loglevel = info\n");
    settings.parse_files(&[config]).unwrap();

    // Only the default template provides a value, so the hook stays quiet
    assert!(observed.lock().is_empty());
}

#[test]
fn test_file_metadata_higher_precedence_section_wins() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();

    let config = create_temp_config_file(
        &temp_dir,
        "app.conf",
        "ssldir = /ssl { owner = root, group = root, mode = 755 }\n\
         [master]\n\
         ssldir = /ssl { owner = app, mode = 771 }\n",
    );
    settings.parse_files(&[config]).unwrap();

    let metadata = settings.file_metadata("ssldir").unwrap();
    // The [master] section outranks [main] for owner and mode
    assert_eq!(metadata.owner.as_deref(), Some("app"));
    assert_eq!(metadata.mode.as_deref(), Some("771"));
    // Fields the higher-precedence section leaves unset fall through
    assert_eq!(metadata.group.as_deref(), Some("root"));
}

#[test]
fn test_config_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let settings = initialized_app_settings();
    settings.set("loglevel", "debug").unwrap();
    settings.set("vardir", "/srv/state").unwrap();

    let generated = settings.to_config_string(None).unwrap();
    let before = settings.to_listing_string(None).unwrap();

    let config = create_temp_config_file(&temp_dir, "generated.conf", &generated);
    settings.parse_files(&[config]).unwrap();

    let after = settings.to_listing_string(None).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_read_only_protection_end_to_end() {
    let settings = initialized_app_settings();

    let error = settings.handle_arg("--run_mode", Some("agent")).unwrap_err();
    assert!(error.is_read_only());

    // The effective value is untouched
    assert_eq!(
        settings.string_value("run_mode", None).unwrap().unwrap(),
        "master"
    );
}

#[test]
fn test_concurrent_readers_and_writers() {
    let settings = Arc::new(app_settings());

    let writer = {
        let settings = settings.clone();
        std::thread::spawn(move || {
            for i in 0..200 {
                settings.set("vardir", format!("/state/{i}").as_str()).unwrap();
            }
        })
    };
    let reader = {
        let settings = settings.clone();
        std::thread::spawn(move || {
            for _ in 0..200 {
                let value = settings.string_value("ssldir", None).unwrap().unwrap();
                assert!(value.ends_with("/ssl"));
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();

    assert_eq!(
        settings.string_value("ssldir", None).unwrap().unwrap(),
        "/state/199/ssl"
    );
}
