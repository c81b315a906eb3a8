//! Integration tests for configuration validation

#![allow(clippy::expect_used)]

use machine_protocol::config::{
    AuthConfig, LoggingConfig, NetworkConfig, ServerConfig, StatusConfig, TransportConfig,
    MAX_FRAME_SIZE,
};
use std::time::Duration;
use tracing::Level;

fn has_error(errors: &[String], needle: &str) -> bool {
    errors.iter().any(|e| e.contains(needle))
}

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_defaults_match_vanilla_server() {
    let config = NetworkConfig::default();
    assert_eq!(config.server.address, "0.0.0.0:25565");
    assert!(config.auth.online_mode);
    assert!(config.auth.encrypts());
    assert_eq!(config.transport.compression(), Some(256));
    assert_eq!(config.transport.max_frame_size, MAX_FRAME_SIZE);
    assert_eq!(config.status.max_players, 20);
    assert!(config.status.legacy_ping);
    assert!(!config.server.accepts_transfers);
}

#[test]
fn test_negative_threshold_disables_compression() {
    let mut config = NetworkConfig::default();
    config.transport.compression_threshold = -1;
    assert_eq!(config.transport.compression(), None);
    assert!(config.validate().is_empty());

    config.transport.compression_threshold = 0;
    assert_eq!(config.transport.compression(), Some(0));
}

#[test]
fn test_offline_mode_encrypts_only_when_enforced() {
    let mut auth = AuthConfig {
        online_mode: false,
        ..Default::default()
    };
    assert!(!auth.encrypts());
    auth.enforce_encryption = true;
    assert!(auth.encrypts());
}

#[test]
fn test_empty_server_address() {
    let mut config = NetworkConfig::default();
    config.server.address = String::new();

    let errors = config.validate();
    assert!(has_error(&errors, "Server address cannot be empty"));
}

#[test]
fn test_invalid_server_address() {
    let mut config = NetworkConfig::default();
    config.server.address = "localhost".to_string();

    let errors = config.validate();
    assert!(has_error(&errors, "Invalid server address format"));
}

#[test]
fn test_zero_max_connections() {
    let mut config = NetworkConfig::default();
    config.server.max_connections = 0;

    let errors = config.validate();
    assert!(has_error(&errors, "Max connections must be greater than 0"));
}

#[test]
fn test_high_max_connections_warning() {
    let mut config = NetworkConfig::default();
    config.server.max_connections = 150_000;

    let errors = config.validate();
    assert!(has_error(&errors, "Max connections very high"));
}

#[test]
fn test_zero_backpressure_limit() {
    let mut config = NetworkConfig::default();
    config.server.backpressure_limit = 0;

    let errors = config.validate();
    assert!(has_error(&errors, "Backpressure limit must be greater than 0"));
}

#[test]
fn test_tick_slower_than_keepalive() {
    let mut config = NetworkConfig::default();
    config.server.tick_interval = Duration::from_secs(20);

    let errors = config.validate();
    assert!(has_error(&errors, "Tick interval cannot exceed the keepalive interval"));
}

#[test]
fn test_keepalive_timeout_shorter_than_interval() {
    let server = ServerConfig {
        keepalive_interval: Duration::from_secs(10),
        keepalive_timeout: Duration::from_secs(5),
        ..Default::default()
    };

    let errors = server.validate();
    assert!(has_error(&errors, "Keepalive timeout must be at least the keepalive interval"));
}

#[test]
fn test_read_timeout_bounds() {
    let mut config = NetworkConfig::default();
    config.server.read_timeout = Duration::from_millis(50);
    assert!(has_error(&config.validate(), "Read timeout too short"));

    config.server.read_timeout = Duration::from_secs(400);
    assert!(has_error(&config.validate(), "Read timeout too long"));
}

#[test]
fn test_shutdown_timeout_bounds() {
    let mut config = NetworkConfig::default();
    config.server.shutdown_timeout = Duration::from_millis(500);
    assert!(has_error(&config.validate(), "Shutdown timeout too short"));

    config.server.shutdown_timeout = Duration::from_secs(120);
    assert!(has_error(&config.validate(), "Shutdown timeout too long"));
}

#[test]
fn test_session_server_must_be_http() {
    let mut config = NetworkConfig::default();
    config.auth.session_server = "ftp://sessions.example".to_string();
    assert!(has_error(&config.validate(), "Session server must be an http(s) URL"));

    // offline servers never call it
    config.auth.online_mode = false;
    assert!(config.validate().is_empty());
}

#[test]
fn test_invalid_key_size() {
    let auth = AuthConfig {
        key_bits: 256,
        ..Default::default()
    };
    assert!(has_error(&auth.validate(), "Invalid key size"));
}

#[test]
fn test_identity_request_timeout_bounds() {
    let mut auth = AuthConfig {
        request_timeout: Duration::from_millis(10),
        ..Default::default()
    };
    assert!(has_error(&auth.validate(), "Identity request timeout too short"));

    auth.request_timeout = Duration::from_secs(90);
    assert!(has_error(&auth.validate(), "Identity request timeout too long"));
}

#[test]
fn test_tiny_max_frame_size() {
    let transport = TransportConfig {
        max_frame_size: 512,
        ..Default::default()
    };
    assert!(has_error(&transport.validate(), "Max frame size too small"));
}

#[test]
fn test_frame_size_beyond_three_byte_prefix() {
    let transport = TransportConfig {
        max_frame_size: MAX_FRAME_SIZE + 1,
        ..Default::default()
    };
    assert!(has_error(&transport.validate(), "Max frame size too large"));
}

#[test]
fn test_invalid_compression_level() {
    let transport = TransportConfig {
        compression_level: 12,
        ..Default::default()
    };
    assert!(has_error(&transport.validate(), "Invalid compression level"));
}

#[test]
fn test_compression_threshold_larger_than_max_frame() {
    let transport = TransportConfig {
        max_frame_size: 4096,
        compression_threshold: 8192,
        ..Default::default()
    };
    assert!(has_error(
        &transport.validate(),
        "Compression threshold cannot be larger than max frame size"
    ));
}

#[test]
fn test_empty_version_name() {
    let status = StatusConfig {
        version_name: String::new(),
        ..Default::default()
    };
    assert!(has_error(&status.validate(), "Version name cannot be empty"));
}

#[test]
fn test_favicon_must_be_png_data_uri() {
    let mut status = StatusConfig {
        favicon: Some("http://example.com/icon.png".to_string()),
        ..Default::default()
    };
    assert!(has_error(&status.validate(), "Favicon must be a base64 PNG data URI"));

    status.favicon = Some("data:image/png;base64,iVBORw0KGgo=".to_string());
    assert!(status.validate().is_empty());
}

#[test]
fn test_empty_app_name() {
    let logging = LoggingConfig {
        app_name: String::new(),
        ..Default::default()
    };
    assert!(has_error(&logging.validate(), "Application name cannot be empty"));
}

#[test]
fn test_long_app_name() {
    let logging = LoggingConfig {
        app_name: "a".repeat(100),
        ..Default::default()
    };
    assert!(has_error(&logging.validate(), "Application name too long"));
}

#[test]
fn test_log_to_file_without_path() {
    let logging = LoggingConfig {
        log_to_file: true,
        log_file_path: None,
        ..Default::default()
    };
    assert!(has_error(
        &logging.validate(),
        "log_file_path must be specified when log_to_file is true"
    ));
}

#[test]
fn test_no_logging_output() {
    let logging = LoggingConfig {
        log_to_console: false,
        log_to_file: false,
        ..Default::default()
    };
    assert!(has_error(
        &logging.validate(),
        "At least one logging output (console or file) must be enabled"
    ));
}

#[test]
fn test_multiple_validation_errors() {
    let mut config = NetworkConfig::default();
    config.server.max_connections = 0;
    config.server.backpressure_limit = 0;
    config.auth.key_bits = 64;
    config.transport.compression_level = 20;

    let errors = config.validate();
    assert!(errors.len() >= 4, "Expected at least 4 errors, got: {:?}", errors);
}

#[test]
fn test_validate_strict_lists_every_problem() {
    let mut config = NetworkConfig::default();
    config.server.max_connections = 0;
    config.status.version_name = String::new();

    let message = config.validate_strict().expect_err("invalid config").to_string();
    assert!(message.contains("Configuration validation failed"));
    assert!(message.contains("Max connections must be greater than 0"));
    assert!(message.contains("Version name cannot be empty"));
    assert!(NetworkConfig::default().validate_strict().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        [server]
        address = "127.0.0.1:25566"
        keepalive_interval = 10000

        [auth]
        online_mode = false

        [transport]
        compression_threshold = -1

        [status]
        motd = "Hello"

        [logging]
        log_level = "debug"
        "#,
    )
    .expect("valid toml");

    assert_eq!(config.server.address, "127.0.0.1:25566");
    assert_eq!(config.server.keepalive_interval, Duration::from_secs(10));
    assert_eq!(config.server.max_connections, 1000);
    assert!(!config.auth.online_mode);
    assert_eq!(config.transport.compression(), None);
    assert_eq!(config.status.motd, "Hello");
    assert_eq!(config.status.max_players, 20);
    assert_eq!(config.logging.log_level, Level::DEBUG);
    assert!(config.validate().is_empty());
}

#[test]
fn test_invalid_log_level_in_toml() {
    let err = NetworkConfig::from_toml("[logging]\nlog_level = \"loud\"\n").expect_err("bad level");
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_example_config_round_trips() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).expect("example parses");
    assert_eq!(parsed.server.address, NetworkConfig::default().server.address);
    assert_eq!(parsed.transport.compression_threshold, 256);
}

#[test]
fn test_default_with_overrides() {
    let config = NetworkConfig::default_with_overrides(|config| {
        config.server.accepts_transfers = true;
        config.status.motd = "Overridden".to_string();
    });
    assert!(config.server.accepts_transfers);
    assert_eq!(config.status.motd, "Overridden");
    assert_eq!(config.auth.key_bits, AuthConfig::default().key_bits);
}
