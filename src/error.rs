use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Browser engine failed to launch: {0}")]
    EngineLaunch(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(std::time::Duration),

    #[error("PDF export failed: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn validation(message: impl Into<String>) -> Self {
        RenderError::Validation(message.into())
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        RenderError::Navigation(message.into())
    }

    pub fn export(message: impl Into<String>) -> Self {
        RenderError::Export(message.into())
    }

    /// Short, stable category string reported in the `error` field.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RenderError::Validation(_) => ErrorCategory::ValidationError,
            RenderError::EngineLaunch(_) | RenderError::ServiceUnavailable(_) => {
                ErrorCategory::ServiceUnavailable
            }
            RenderError::Navigation(_) => ErrorCategory::NavigationError,
            RenderError::NavigationTimeout(_) => ErrorCategory::NavigationTimeout,
            RenderError::Export(_) => ErrorCategory::ExportError,
            RenderError::Config(_) | RenderError::Io(_) => ErrorCategory::InternalError,
        }
    }

    /// HTTP status for this failure: client input problems are 400, everything
    /// that happens after validation is 500.
    pub fn status_code(&self) -> u16 {
        match self {
            RenderError::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Engine launch failures surface to callers as service unavailability.
    pub fn into_unavailable(self) -> Self {
        match self {
            RenderError::EngineLaunch(msg) => RenderError::ServiceUnavailable(format!(
                "browser engine is not available: {}",
                msg
            )),
            other => other,
        }
    }

    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.category(), self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ValidationError,
    PayloadTooLarge,
    ServiceUnavailable,
    NavigationError,
    NavigationTimeout,
    ExportError,
    InternalError,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ValidationError => "validation_error",
            ErrorCategory::PayloadTooLarge => "payload_too_large",
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::NavigationError => "navigation_error",
            ErrorCategory::NavigationTimeout => "navigation_timeout",
            ErrorCategory::ExportError => "export_error",
            ErrorCategory::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: ErrorCategory,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(error: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}
