use std::io::Write;

use serial_test::serial;

use super::*;
use crate::cache::{ExecutionContext, FlushMode};

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.max_public_cache_time = 30;

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache_max_public_seconds: Some(120),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.max_public_cache_time, 120);
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.server.public_addr.port(), DEFAULT_PUBLIC_PORT);
    assert_eq!(settings.server.admin_addr.port(), DEFAULT_ADMIN_PORT);
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.context, ExecutionContext::Production);
    assert_eq!(settings.cache.flush_mode, FlushMode::Deferred);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_can_disable_the_cache() {
    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        cache_enabled: Some(false),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.cache.enabled);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero port");
    assert!(matches!(err, LoadError::Invalid { key: "server.public_port", .. }));
}

#[test]
fn shared_listener_address_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(5000);
    raw.server.admin_port = Some(5000);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn conflicting_query_rules_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.query_params.allow = vec!["page".to_string()];
    raw.cache.query_params.ignore = vec!["page".to_string()];
    let err = Settings::from_raw(raw).expect_err("conflict");
    assert!(matches!(err, LoadError::Invalid { key: "cache.query_params", .. }));
}

#[test]
fn zero_capacity_is_clamped() {
    let mut raw = RawSettings::default();
    raw.cache.capacity = 0;
    raw.cache.flush_batch_limit = 0;
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.capacity, 1);
    assert_eq!(settings.cache.flush_batch_limit, 1);
}

#[test]
#[serial]
fn config_file_populates_cache_section() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        r#"
[server]
public_port = 8080

[cache]
max_public_cache_time = 300
context = "development"
flush_mode = "immediate"
query_params.allow = ["page"]
cookie_params.ignore = ["_ga"]
"#
    )
    .expect("write config");

    let args = CliArgs::parse_from([
        "pagecache",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "serve",
    ]);
    let settings = load(&args).expect("settings");

    assert_eq!(settings.server.public_addr.port(), 8080);
    assert_eq!(settings.cache.max_public_cache_time, 300);
    assert_eq!(settings.cache.context, ExecutionContext::Development);
    assert_eq!(settings.cache.flush_mode, FlushMode::Immediate);
    assert_eq!(settings.cache.query_params.allow, vec!["page".to_string()]);
    assert_eq!(settings.cache.cookie_params.ignore, vec!["_ga".to_string()]);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["pagecache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "pagecache",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--server-port",
        "8080",
        "--cache-enabled",
        "false",
        "--cache-max-public-seconds",
        "60",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.public_port, Some(8080));
            assert_eq!(serve.overrides.cache_enabled, Some(false));
            assert_eq!(serve.overrides.cache_max_public_seconds, Some(60));
        }
    }
}

#[test]
#[serial]
fn environment_overrides_file_and_cli_overrides_environment() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    writeln!(file, "[cache]\nmax_public_cache_time = 300\ncapacity = 10").expect("write config");

    // SAFETY: serialized with every other test that reads the environment.
    unsafe {
        std::env::set_var("PAGECACHE__CACHE__CAPACITY", "25");
        std::env::set_var("PAGECACHE__CACHE__QUERY_PARAMS__ALLOW", "page,sort");
    }

    let path = file.path().to_str().expect("utf-8 path");
    let args = CliArgs::parse_from([
        "pagecache",
        "--config-file",
        path,
        "serve",
        "--cache-max-public-seconds",
        "90",
    ]);
    let result = load(&args);

    unsafe {
        std::env::remove_var("PAGECACHE__CACHE__CAPACITY");
        std::env::remove_var("PAGECACHE__CACHE__QUERY_PARAMS__ALLOW");
    }

    let settings = result.expect("settings");
    assert_eq!(settings.cache.capacity, 25);
    assert_eq!(settings.cache.max_public_cache_time, 90);
    assert_eq!(
        settings.cache.query_params.allow,
        vec!["page".to_string(), "sort".to_string()]
    );
}
