//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use levin_p2p::config::{NodeConfig, MAINNET_NETWORK_ID, MAX_PAYLOAD_SIZE};
use levin_p2p::error::ProtocolError;
use std::time::Duration;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = NodeConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
    assert_eq!(config.network.network_id, MAINNET_NETWORK_ID);
    assert_eq!(config.p2p.max_payload_size, MAX_PAYLOAD_SIZE);
}

#[test]
fn test_invalid_listen_address() {
    let mut config = NodeConfig::default();
    config.p2p.listen_address = "not-an-ip".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid listen address")));
}

#[test]
fn test_zero_max_connections() {
    let mut config = NodeConfig::default();
    config.p2p.max_connections = 0;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Max connections must be greater than 0")));
}

#[test]
fn test_polling_interval_bounds() {
    let mut config = NodeConfig::default();
    config.p2p.polling_interval = Duration::from_millis(1);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Polling interval too short")));

    config.p2p.polling_interval = Duration::from_secs(120);
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Polling interval too long")));
}

#[test]
fn test_zero_timed_sync_interval() {
    let mut config = NodeConfig::default();
    config.p2p.timed_sync_interval = Duration::ZERO;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Timed sync interval")));
}

#[test]
fn test_tiny_payload_limit() {
    let mut config = NodeConfig::default();
    config.p2p.max_payload_size = 100;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Max payload size too small")));
}

#[test]
fn test_min_version_above_announced() {
    let mut config = NodeConfig::default();
    config.network.protocol_version = 1;
    config.network.min_protocol_version = 2;
    assert!(config
        .validate()
        .iter()
        .any(|e| e.contains("Minimum protocol version")));
}

#[test]
fn test_zero_network_id() {
    let mut config = NodeConfig::default();
    config.network.network_id = [0; 16];
    assert!(config.validate().iter().any(|e| e.contains("all zeroes")));
}

#[test]
fn test_zero_chain_height() {
    let mut config = NodeConfig::default();
    config.chain.height = 0;
    assert!(config.validate().iter().any(|e| e.contains("genesis")));
}

#[test]
fn test_multiple_errors_collected() {
    let mut config = NodeConfig::default();
    config.p2p.listen_address = String::new();
    config.p2p.max_connections = 0;
    config.chain.height = 0;

    let errors = config.validate();
    assert!(errors.len() >= 3, "Expected several errors, got {errors:?}");
}

#[test]
fn test_validate_strict_reports_config_error() {
    let mut config = NodeConfig::default();
    config.p2p.max_connections = 0;

    match config.validate_strict() {
        Err(ProtocolError::ConfigError(msg)) => {
            assert!(msg.contains("Configuration validation failed"));
        }
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn test_toml_round_trip() {
    let config = NodeConfig::default_with_overrides(|c| {
        c.p2p.port = 28080;
        c.p2p.polling_interval = Duration::from_millis(250);
        c.p2p.timed_sync_interval = Duration::from_secs(30);
        c.chain.height = 1234;
        c.chain.top_hash = [0xAB; 32];
        c.logging.log_level = Level::DEBUG;
    });

    let text = toml::to_string_pretty(&config).expect("serialize");
    let parsed = NodeConfig::from_toml(&text).expect("parse");

    assert_eq!(parsed.p2p.port, 28080);
    assert_eq!(parsed.p2p.polling_interval, Duration::from_millis(250));
    assert_eq!(parsed.p2p.timed_sync_interval, Duration::from_secs(30));
    assert_eq!(parsed.chain.height, 1234);
    assert_eq!(parsed.chain.top_hash, [0xAB; 32]);
    assert_eq!(parsed.network.network_id, MAINNET_NETWORK_ID);
    assert_eq!(parsed.logging.log_level, Level::DEBUG);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let parsed = NodeConfig::from_toml(
        r#"
        [chain]
        height = 42
        top_hash = "0000000000000000000000000000000000000000000000000000000000000001"
        "#,
    )
    .expect("parse");

    assert_eq!(parsed.chain.height, 42);
    assert_eq!(parsed.chain.top_hash[31], 1);
    assert_eq!(parsed.p2p.port, NodeConfig::default().p2p.port);
}

#[test]
fn test_bad_hex_rejected() {
    let result = NodeConfig::from_toml(
        r#"
        [network]
        network_id = "zz"
        protocol_version = 1
        min_protocol_version = 1
        "#,
    );
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_signed_hex_digits_rejected() {
    let plus = "+1".repeat(16);
    let result = NodeConfig::from_toml(&format!(
        "[network]\nnetwork_id = \"{plus}\"\nprotocol_version = 1\nmin_protocol_version = 1\n"
    ));
    assert!(matches!(result, Err(ProtocolError::ConfigError(_))));
}

#[test]
fn test_hex_fields_round_trip_lowercase() {
    let config = NodeConfig::default_with_overrides(|c| c.chain.top_hash = [0xAB; 32]);
    let text = toml::to_string(&config).unwrap();
    assert!(text.contains(&"ab".repeat(32)));
    assert_eq!(NodeConfig::from_toml(&text).unwrap().chain.top_hash, [0xAB; 32]);
}

#[test]
fn test_example_config_parses() {
    let text = NodeConfig::example_config();
    let parsed = NodeConfig::from_toml(&text).expect("example config parses");
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_save_and_load_file() {
    let path = std::env::temp_dir().join(format!("levin-p2p-config-{}.toml", std::process::id()));
    let config = NodeConfig::default_with_overrides(|c| c.p2p.max_connections = 32);
    config.save_to_file(&path).expect("save");

    let loaded = NodeConfig::from_file(&path).expect("load");
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.p2p.max_connections, 32);
}

#[test]
fn test_env_overrides() {
    std::env::set_var("LEVIN_P2P_PORT", "28080");
    std::env::set_var("LEVIN_P2P_POLLING_INTERVAL_MS", "250");
    std::env::set_var("LEVIN_P2P_TIMED_SYNC_INTERVAL_SECS", "30");
    let config = NodeConfig::from_env().unwrap();
    assert_eq!(config.p2p.port, 28080);
    assert_eq!(config.p2p.polling_interval, Duration::from_millis(250));
    assert_eq!(config.p2p.timed_sync_interval, Duration::from_secs(30));

    std::env::set_var("LEVIN_P2P_PORT", "not-a-port");
    assert!(matches!(
        NodeConfig::from_env(),
        Err(ProtocolError::ConfigError(_))
    ));
    std::env::remove_var("LEVIN_P2P_PORT");

    for (key, bad) in [
        ("LEVIN_P2P_MAX_CONNECTIONS", "many"),
        ("LEVIN_P2P_POLLING_INTERVAL_MS", "-5"),
        ("LEVIN_P2P_TIMED_SYNC_INTERVAL_SECS", "1.5"),
    ] {
        let saved = std::env::var(key).ok();
        std::env::set_var(key, bad);
        assert!(
            matches!(NodeConfig::from_env(), Err(ProtocolError::ConfigError(_))),
            "{key}={bad} accepted"
        );
        match saved {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }

    for key in [
        "LEVIN_P2P_POLLING_INTERVAL_MS",
        "LEVIN_P2P_TIMED_SYNC_INTERVAL_SECS",
    ] {
        std::env::remove_var(key);
    }
}
