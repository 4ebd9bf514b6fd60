use std::io::Write;

use clap::Parser;
use serial_test::serial;

use super::*;

fn settings_from(raw: RawSettings) -> Settings {
    Settings::from_raw(raw).expect("valid settings")
}

#[test]
fn defaults_match_documented_values() {
    let settings = settings_from(RawSettings::default());

    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
    assert_eq!(settings.database.url, None);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert_eq!(settings.cache.backend, CacheBackend::Redis);
    assert_eq!(settings.cache.redis_url, DEFAULT_REDIS_URL);
    assert_eq!(settings.cache.timeout, Duration::from_millis(500));
    assert_eq!(settings.cache.counter_ttl, Duration::from_secs(300));
    assert_eq!(settings.cache.membership_ttl, Duration::from_secs(86_400));
    assert_eq!(settings.cache.dirty_ttl, Duration::from_secs(3_600));
    assert!(settings.reconciler.enabled);
    assert_eq!(settings.reconciler.interval, Duration::from_secs(300));
}

#[test]
fn default_cache_settings_carry_the_cache_expiry_policy() {
    let settings = settings_from(RawSettings::default());

    let config = CacheConfig::from(&settings.cache);
    let defaults = CacheConfig::default();
    assert_eq!(config.counter_ttl(), defaults.counter_ttl());
    assert_eq!(config.membership_ttl(), defaults.membership_ttl());
    assert_eq!(config.dirty_ttl(), defaults.dirty_ttl());
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.logging.level = Some("info".to_string());
    raw.reconciler.interval_seconds = Some(60);

    let overrides = ServeOverrides {
        connection: ConnectionOverrides {
            log_level: Some("debug".to_string()),
            cache_backend: Some("memory".to_string()),
            ..Default::default()
        },
        reconcile_interval_seconds: Some(15),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = settings_from(raw);

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.reconciler.interval, Duration::from_secs(15));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    raw.apply_connection_overrides(&ConnectionOverrides {
        log_json: Some(true),
        ..Default::default()
    });

    assert_eq!(settings_from(raw).logging.format, LogFormat::Json);
}

#[test]
fn blank_database_url_is_treated_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    assert_eq!(settings_from(raw).database.url, None);
}

#[test]
fn zero_durations_are_rejected() {
    let mut raw = RawSettings::default();
    raw.reconciler.interval_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero interval must fail");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "reconciler.interval_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.counter_ttl_seconds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown backend must fail");
    assert!(err.to_string().contains("cache.backend"));
}

#[test]
fn redis_backend_requires_redis_scheme() {
    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some("http://127.0.0.1:6379".to_string());
    assert!(Settings::from_raw(raw).is_err());

    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memory".to_string());
    raw.cache.redis_url = Some("http://127.0.0.1:6379".to_string());
    assert!(Settings::from_raw(raw).is_ok());
}

#[test]
fn default_command_is_none() {
    let args = CliArgs::parse_from(["plaudit"]);
    assert!(args.command.is_none());
}

#[test]
fn parse_count_arguments() {
    let args = CliArgs::parse_from([
        "plaudit",
        "count",
        "--database-url",
        "postgres://example",
        "42",
        "9",
    ]);

    match args.command.expect("count command") {
        Command::Count(count) => {
            assert_eq!(count.items, vec![42, 9]);
            assert_eq!(
                count.connection.database_url.as_deref(),
                Some("postgres://example")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_toggle_arguments() {
    let args = CliArgs::parse_from(["plaudit", "toggle", "--item", "42", "--actor", "7"]);

    match args.command.expect("toggle command") {
        Command::Toggle(toggle) => {
            assert_eq!(toggle.item, 42);
            assert_eq!(toggle.actor, 7);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_top_defaults_limit() {
    let args = CliArgs::parse_from(["plaudit", "top"]);

    match args.command.expect("top command") {
        Command::Top(top) => assert_eq!(top.limit, 10),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "plaudit",
        "serve",
        "--redis-url",
        "redis://cache:6379",
        "--reconciler-enabled",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(
                serve.overrides.connection.redis_url.as_deref(),
                Some("redis://cache:6379")
            );
            assert_eq!(serve.overrides.reconciler_enabled, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
#[serial]
fn file_then_env_then_cli_precedence() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create config file");
    writeln!(
        file,
        r#"
[logging]
level = "warn"

[cache]
backend = "memory"
redis_url = "redis://from-file:6379"
counter_ttl_seconds = 120

[reconciler]
interval_seconds = 30
"#
    )
    .expect("write config file");

    let path = file.path().to_string_lossy().into_owned();

    // SAFETY: serialized with every other test that touches the environment.
    unsafe {
        std::env::set_var("PLAUDIT__CACHE__REDIS_URL", "redis://from-env:6379");
    }
    let args = CliArgs::parse_from([
        "plaudit",
        "--config-file",
        path.as_str(),
        "reconcile",
        "--log-level",
        "debug",
    ]);
    let loaded = load(&args);
    // SAFETY: as above.
    unsafe {
        std::env::remove_var("PLAUDIT__CACHE__REDIS_URL");
    }
    let settings = loaded.expect("layered settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.redis_url, "redis://from-env:6379");
    assert_eq!(settings.cache.counter_ttl, Duration::from_secs(120));
    assert_eq!(settings.reconciler.interval, Duration::from_secs(30));
}

#[test]
#[serial]
fn missing_explicit_config_file_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    let path = missing.to_string_lossy().into_owned();

    let args = CliArgs::parse_from(["plaudit", "--config-file", path.as_str(), "top"]);
    assert!(matches!(load(&args), Err(LoadError::Build(_))));
}
