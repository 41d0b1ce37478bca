use super::*;
use crate::schema::{ComponentConfig, ConnectionConfig};
use serde_json::Value;

fn component(class: &str, name: &str) -> ComponentConfig {
    ComponentConfig {
        class: class.to_string(),
        name: name.to_string(),
        args: Value::Null,
        configure: None,
    }
}

#[test]
fn test_validate_default_config() {
    let config = Config::default();
    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.is_empty());
}

#[test]
fn test_validate_empty_process_name() {
    let mut config = Config::default();
    config.process.name = String::new();

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "process.name"));
}

#[test]
fn test_validate_remote_requires_endpoint() {
    let mut config = Config::default();
    config.global.mode = GlobalMode::Remote;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
    assert!(result.errors.iter().any(|e| e.path == "global.endpoint"));
}

#[test]
fn test_validate_remote_bad_endpoint() {
    let mut config = Config::default();
    config.global.mode = GlobalMode::Remote;
    config.global.endpoint = Some("http://gcm".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "global.endpoint"));
}

#[test]
fn test_validate_remote_without_listen_warns() {
    let mut config = Config::default();
    config.global.mode = GlobalMode::Remote;
    config.global.endpoint = Some("tcp://127.0.0.1:7400".to_string());

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.is_valid());
    assert!(result.warnings.iter().any(|w| w.path == "process.listen"));
}

#[test]
fn test_validate_zero_retry_count() {
    let mut config = Config::default();
    config.connect.retry_count = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "connect.retry_count"));
}

#[test]
fn test_validate_backoff_below_one() {
    let mut config = Config::default();
    config.connect.backoff_multiplier = 0.5;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "connect.backoff_multiplier"));
}

#[test]
fn test_validate_zero_mailbox() {
    let mut config = Config::default();
    config.mailbox.default_size = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(!result.is_valid());
}

#[test]
fn test_validate_duplicate_components() {
    let mut config = Config::default();
    config.components = vec![component("Counter", "c"), component("Printer", "c")];

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.message.contains("Duplicate")));
}

#[test]
fn test_validate_connection_addresses() {
    let mut config = Config::default();
    config.components = vec![component("Counter", "counter")];
    config.connections = vec![
        ConnectionConfig {
            client: "printer:Input".to_string(),
            server: "counter:Output".to_string(),
        },
        ConnectionConfig {
            client: "bad".to_string(),
            server: "other:counter:Output".to_string(),
        },
    ];

    let result = ConfigValidator::validate(&config).unwrap();
    assert!(result.errors.iter().any(|e| e.path == "connections[1].client"));
    assert!(
        result
            .warnings
            .iter()
            .any(|w| w.path == "connections[0].client")
    );
    assert!(!result.warnings.iter().any(|w| w.path == "connections[1].server"));
}

#[test]
fn test_into_result_reports_first_error() {
    let mut config = Config::default();
    config.connect.retry_count = 0;

    let result = ConfigValidator::validate(&config).unwrap();
    let err = result.into_result().unwrap_err();
    assert!(err.to_string().contains("connect.retry_count"));
}
