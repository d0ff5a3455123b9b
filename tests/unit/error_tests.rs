//! `AppError` display format and conversions.

use agent_relay::AppError;

#[test]
fn display_uses_kind_prefix() {
    assert_eq!(AppError::Config("bad".into()).to_string(), "config: bad");
    assert_eq!(AppError::Ledger("bad".into()).to_string(), "ledger: bad");
    assert_eq!(AppError::Remote("bad".into()).to_string(), "remote: bad");
    assert_eq!(AppError::Tool("bad".into()).to_string(), "tool: bad");
    assert_eq!(AppError::Template("bad".into()).to_string(), "template: bad");
    assert_eq!(AppError::NotFound("bad".into()).to_string(), "not found: bad");
    assert_eq!(AppError::Io("bad".into()).to_string(), "io: bad");
}

#[test]
fn error_message_no_trailing_period() {
    let s = AppError::Remote("http://127.0.0.1:4096 returned 500".into()).to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(_)));
}

#[test]
fn toml_error_converts_to_config() {
    let parse: Result<toml::Value, _> = toml::from_str("x = ");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn json_error_converts() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: AppError = parse.expect_err("invalid json").into();
    assert!(matches!(err, AppError::Ledger(_)));
}
