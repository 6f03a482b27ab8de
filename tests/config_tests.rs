// Integration tests for configuration loading and validation

mod common;

use grid_engine::{Config, ConfigError, GridError};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.database.path, "data/grid_engine.db");
    assert_eq!(config.engine.persist_interval_secs, 10);
    assert_eq!(config.engine.cooldown_secs, 5);
    assert_eq!(config.engine.price_key_precision, 8);
    assert!(config.logging.tick_logging);
    assert_eq!(config.engine.cooldown(), chrono::Duration::seconds(5));
    assert_eq!(config.engine.persist_interval(), chrono::Duration::seconds(10));
}

#[test]
fn test_example_config_parses() {
    let config = Config::from_toml_str(include_str!("../config.toml.example")).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.engine.cooldown_secs, 5);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let config = Config::from_toml_str("[engine]\ncooldown_secs = 30\n").unwrap();
    assert_eq!(config.engine.cooldown_secs, 30);
    assert_eq!(config.engine.persist_interval_secs, 10);
    assert_eq!(config.database.path, "data/grid_engine.db");
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");

    let mut config = Config::default();
    config.database.path = "elsewhere/grid.db".to_string();
    config.logging.tick_logging = false;
    config.to_file(&path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("elsewhere/grid.db"));

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.database.path, "elsewhere/grid.db");
    assert!(!loaded.logging.tick_logging);
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("new.toml");
    assert!(!path.exists());

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.engine.persist_interval_secs, 10);
}

#[test]
fn test_invalid_values_are_rejected() {
    let err = Config::from_toml_str("[engine]\npersist_interval_secs = 0\n").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let err = Config::from_toml_str("[logging]\nlevel = \"loud\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));

    let err = Config::from_toml_str("[engine\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let grid_err: GridError = Config::from_file("/nonexistent/config.toml").unwrap_err().into();
    assert_eq!(grid_err.category(), "io");
}
