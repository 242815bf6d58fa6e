//! Configuration loading tests

use drover_common::config::{load_toml_config, TomlConfig};
use std::io::Write;

#[test]
fn load_from_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        database = "/srv/drover/drover.db"

        [resolver]
        base_url = "https://resolve.internal.example"
        api_key = "test-key"
        timeout_secs = 10

        [migration]
        batch_size = 25
        max_attempts = 5
        retry_base_ms = 100
        "#
    )
    .unwrap();

    let config = load_toml_config(Some(file.path())).unwrap();
    assert_eq!(config.database.as_deref(), Some("/srv/drover/drover.db"));
    assert_eq!(config.resolver.base_url, "https://resolve.internal.example");
    assert_eq!(config.resolver.api_key.as_deref(), Some("test-key"));
    assert_eq!(config.resolver.timeout_secs, 10);
    assert_eq!(config.migration.batch_size, 25);
    assert_eq!(config.migration.max_attempts, 5);
    assert_eq!(config.migration.retry_base_ms, 100);
}

#[test]
fn missing_explicit_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_toml_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config.migration.batch_size, 50);
    assert!(config.resolver.api_key.is_none());
}

#[test]
fn malformed_file_is_a_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "database = [not valid").unwrap();

    let err = load_toml_config(Some(file.path()));
    assert!(err.is_err());
}

#[test]
fn default_config_round_trips_through_toml() {
    let config = TomlConfig::default();
    let serialized = toml::to_string(&config).unwrap();
    let parsed: TomlConfig = toml::from_str(&serialized).unwrap();
    assert_eq!(parsed.migration.batch_size, config.migration.batch_size);
    assert_eq!(parsed.resolver.base_url, config.resolver.base_url);
}
