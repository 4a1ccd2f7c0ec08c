use relay_core::config::Config;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.bridge.agent_name, "__BridgeClient");
    assert!(cfg.bridge.reconnect);
    assert_eq!(cfg.bridge.reconnect_delay_ms, 1000);
    assert_eq!(cfg.bridge.max_reconnect_delay_ms, 30_000);
    assert_eq!(cfg.bridge.max_reconnect_attempts, None);
    assert_eq!(cfg.spawner.max_workers, 32);
    assert_eq!(cfg.spawner.registration_timeout_secs, 30);
    assert_eq!(cfg.spawner.registration_poll_ms, 500);
    assert_eq!(cfg.spawner.dashboard_port, None);
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("__BridgeClient"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.bridge.agent_name, cfg.bridge.agent_name);
    assert_eq!(parsed.spawner.max_workers, cfg.spawner.max_workers);
}

#[test]
fn config_partial_toml_fills_defaults() {
    let partial = r#"
[general]
log_level = "debug"

[bridge]
reconnect_delay_ms = 2000
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.general.log_level, "debug");
    assert_eq!(cfg.bridge.reconnect_delay_ms, 2000);
    // defaults should fill in the rest
    assert_eq!(cfg.bridge.agent_name, "__BridgeClient");
    assert_eq!(cfg.spawner.max_workers, 32);
}

#[test]
fn load_from_missing_path_errors() {
    let err = Config::load_from("/nonexistent/path/config.toml").unwrap_err();
    assert!(matches!(err, relay_core::config::ConfigError::Io(_)));
}

#[test]
fn load_from_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[spawner]\nmax_workers = 4\n").unwrap();
    let cfg = Config::load_from(&path).unwrap();
    assert_eq!(cfg.spawner.max_workers, 4);
}
