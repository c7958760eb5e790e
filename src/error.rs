//! Error taxonomy shared across the core.
//!
//! Every fallible path produces an [`AppError`]; the view layer decides
//! presentation from its kind and severity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    Authorization,
    Validation,
    NotFound,
    RateLimited,
    Conflict,
    Storage,
    Serialization,
    Deserialization,
    #[cfg(feature = "camera")]
    Camera,
    #[cfg(feature = "camera")]
    CameraPermissionDenied,
    #[cfg(feature = "push")]
    NotificationsPermissionDenied,
    InvalidState,
    Internal,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Log only, no user-visible surface.
    Info,
    /// Non-blocking toast.
    Warning,
    /// Blocking banner until dismissed or resolved.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind:?}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub severity: ErrorSeverity,
    pub is_retryable: bool,
    pub context: Option<String>,
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let (severity, is_retryable) = match kind {
            ErrorKind::Network | ErrorKind::Timeout => (ErrorSeverity::Warning, true),
            ErrorKind::RateLimited => (ErrorSeverity::Warning, true),
            ErrorKind::Authentication => (ErrorSeverity::Error, false),
            ErrorKind::Authorization => (ErrorSeverity::Error, false),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict => {
                (ErrorSeverity::Warning, false)
            }
            ErrorKind::Storage => (ErrorSeverity::Error, true),
            ErrorKind::Serialization | ErrorKind::Deserialization => (ErrorSeverity::Error, false),
            #[cfg(feature = "camera")]
            ErrorKind::Camera => (ErrorSeverity::Warning, true),
            #[cfg(feature = "camera")]
            ErrorKind::CameraPermissionDenied => (ErrorSeverity::Warning, false),
            #[cfg(feature = "push")]
            ErrorKind::NotificationsPermissionDenied => (ErrorSeverity::Info, false),
            ErrorKind::InvalidState | ErrorKind::Internal | ErrorKind::Unknown => {
                (ErrorSeverity::Error, false)
            }
        };

        Self {
            kind,
            message,
            severity,
            is_retryable,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn retryable(mut self) -> Self {
        self.is_retryable = true;
        self
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Classify an HTTP status from the PathQuest API or the auth broker.
    #[must_use]
    pub fn from_http_status(status: u16, body_hint: Option<&str>) -> Self {
        let detail = body_hint.unwrap_or("").trim();
        let message = if detail.is_empty() {
            format!("Request failed with status {status}")
        } else {
            format!("Request failed with status {status}: {detail}")
        };

        match status {
            401 => Self::new(ErrorKind::Authentication, message),
            403 => Self::new(ErrorKind::Authorization, message),
            404 => Self::new(ErrorKind::NotFound, message),
            409 => Self::new(ErrorKind::Conflict, message),
            422 | 400 => Self::new(ErrorKind::Validation, message),
            429 => Self::new(ErrorKind::RateLimited, message),
            500..=599 => Self::new(ErrorKind::Network, message),
            _ => Self::new(ErrorKind::Unknown, message),
        }
    }

    /// Message suitable for direct display; never leaks internals.
    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Network => "Can't reach PathQuest. Check your connection.".into(),
            ErrorKind::Timeout => "The request timed out. Try again.".into(),
            ErrorKind::Authentication => "Your session has expired. Please reconnect.".into(),
            ErrorKind::Authorization => "You don't have access to that.".into(),
            ErrorKind::Validation => self.message.clone(),
            ErrorKind::NotFound => "That peak or challenge is no longer available.".into(),
            ErrorKind::RateLimited => "Too many requests. Give it a moment.".into(),
            ErrorKind::Conflict => "Already recorded.".into(),
            ErrorKind::Storage => "Couldn't save your data on this device.".into(),
            ErrorKind::Serialization | ErrorKind::Deserialization => {
                "Something went wrong reading data. Try updating the app.".into()
            }
            #[cfg(feature = "camera")]
            ErrorKind::Camera => "The camera isn't available right now.".into(),
            #[cfg(feature = "camera")]
            ErrorKind::CameraPermissionDenied => {
                "Camera access is off. Enable it in Settings to add summit photos.".into()
            }
            #[cfg(feature = "push")]
            ErrorKind::NotificationsPermissionDenied => {
                "Notifications are off. Enable them in Settings to hear about new summits.".into()
            }
            ErrorKind::InvalidState | ErrorKind::Internal | ErrorKind::Unknown => {
                "Something went wrong. Try again.".into()
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Deserialization, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            AppError::from_http_status(401, None).kind,
            ErrorKind::Authentication
        );
        assert_eq!(
            AppError::from_http_status(429, None).kind,
            ErrorKind::RateLimited
        );
        assert_eq!(
            AppError::from_http_status(409, None).kind,
            ErrorKind::Conflict
        );
        assert_eq!(
            AppError::from_http_status(503, None).kind,
            ErrorKind::Network
        );
        assert!(AppError::from_http_status(503, None).is_retryable);
        assert!(!AppError::from_http_status(422, None).is_retryable);
    }

    #[test]
    fn body_hint_appears_in_message_but_not_user_text() {
        let err = AppError::from_http_status(500, Some("stack trace here"));
        assert!(err.message.contains("stack trace here"));
        assert!(!err.user_facing_message().contains("stack trace"));
    }

    #[test]
    fn builders_compose() {
        let err = AppError::validation("Report is too long")
            .with_context("trip_report")
            .with_severity(ErrorSeverity::Error);
        assert_eq!(err.severity, ErrorSeverity::Error);
        assert_eq!(err.context.as_deref(), Some("trip_report"));
        assert_eq!(err.user_facing_message(), "Report is too long");
    }
}
