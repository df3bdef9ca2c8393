//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be serialized, written to disk,
//! and loaded back with identical field values.

use gatelink_client::ClientOptions;
use gatelink_core::config::Config;
use gatelink_core::SecretString;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, config.gateway.url);
    assert_eq!(loaded.gateway.request_timeout_ms, 30_000);
    assert_eq!(loaded.reconnect, config.reconnect);
    assert_eq!(loaded.client, config.client);
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let mut config = Config::default();
    config.gateway.url = "wss://gateway.example.com".to_string();
    config.gateway.token = Some(SecretString::new("tok"));
    config.reconnect.max_delay_ms = 5_000;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, "wss://gateway.example.com");
    assert_eq!(loaded.gateway.token.as_ref().map(|t| t.expose_secret()), Some("tok"));
    assert_eq!(loaded.reconnect.max_delay_ms, 5_000);
}

#[test]
fn test_hand_written_json5_drives_client_options() {
    let config = Config::parse(
        r#"{
            // comments and trailing commas are fine
            gateway: { url: "ws://10.0.0.5:18789", challenge_timeout_ms: 2500, },
            reconnect: { initial_delay_ms: 250 },
        }"#,
    )
    .unwrap();
    config.validate().unwrap();

    let options = ClientOptions::from_config(&config);
    assert_eq!(options.url, "ws://10.0.0.5:18789");
    assert_eq!(options.challenge_timeout, Duration::from_millis(2500));
    assert_eq!(options.request_timeout, Duration::from_secs(30));
    assert_eq!(options.reconnect.initial_delay_ms, 250);
    assert_eq!(options.reconnect.max_delay_ms, 30_000);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/gatelink.json5"));
    assert!(result.is_err());
}

#[test]
fn test_config_parse_invalid() {
    let result = Config::parse("not valid json");
    assert!(result.is_err());
}

#[test]
fn test_invalid_values_rejected() {
    let config = Config::parse(r#"{ gateway: { url: "http://nope" }, reconnect: { multiplier: 0.5 } }"#)
        .unwrap();
    assert!(config.validate().is_err());
}
