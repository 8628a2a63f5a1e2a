use pdf_renderer::{ErrorCategory, RenderError};
use std::time::Duration;

#[test]
fn config_error_display_includes_message() {
    let err = RenderError::Config("port must be a number".to_string());

    assert_eq!(format!("{}", err), "Configuration error: port must be a number");
}

#[test]
fn io_error_display_wraps_source() {
    let io_err = std::io::Error::other("address in use");
    let err: RenderError = io_err.into();
    let rendered = format!("{}", err);

    assert!(rendered.starts_with("IO error: "));
    assert!(rendered.contains("address in use"));
}

#[test]
fn validation_helper_uses_message() {
    let err = RenderError::validation("missing url parameter");

    assert_eq!(format!("{}", err), "Invalid request: missing url parameter");
    assert_eq!(err.status_code(), 400);
}

#[test]
fn navigation_timeout_mentions_duration() {
    let err = RenderError::NavigationTimeout(Duration::from_secs(30));

    assert_eq!(format!("{}", err), "Navigation timed out after 30s");
    assert_eq!(err.category(), ErrorCategory::NavigationTimeout);
    assert_eq!(err.status_code(), 500);
}

#[test]
fn launch_failure_becomes_unavailable() {
    let err = RenderError::EngineLaunch("chrome not found".to_string()).into_unavailable();

    assert!(matches!(err, RenderError::ServiceUnavailable(_)));
    assert!(err.to_string().contains("chrome not found"));
}

#[test]
fn payload_serializes_category_and_message() {
    let payload = RenderError::export("Printing failed").to_payload();
    let json = serde_json::to_value(&payload).unwrap();

    assert_eq!(json["error"], "export_error");
    assert_eq!(json["message"], "PDF export failed: Printing failed");
}
