//! Error types for encore-core

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using encore-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in encore-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input, rejected before any network call
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend responded with a non-success status
    #[error("Backend error: {message} ({status})")]
    Api { status: u16, message: String },

    /// Remote call exceeded its fixed timeout
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Client is offline or the change feed dropped
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// Terminal conflict such as a repeated vote
    #[error("{0}")]
    Conflict(String),

    /// Operator-only action attempted without privilege
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Same logical operation is already in flight
    #[error("Already in progress: {0}")]
    AlreadyInProgress(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid engine or backend configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Session was stopped while the operation was suspended
    #[error("Sync session stopped")]
    Stopped,
}

/// Error taxonomy surfaced to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Validation,
    TransientNetwork,
    Conflict,
    Authorization,
    /// The same operation is still in flight; retry once it settles
    Busy,
    /// The session stopped before the operation could finish
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::TransientNetwork => "network",
            Self::Conflict => "conflict",
            Self::Authorization => "authorization",
            Self::Busy => "busy",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Classify this error for presentation.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) | Self::Serialization(_) | Self::InvalidConfiguration(_) => {
                ErrorClass::Validation
            }
            Self::Http(_) | Self::Timeout(_) | Self::Disconnected(_) => {
                ErrorClass::TransientNetwork
            }
            Self::AlreadyInProgress(_) => ErrorClass::Busy,
            Self::Stopped => ErrorClass::Cancelled,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::Unauthorized(_) => ErrorClass::Authorization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorClass::Authorization,
                409 => ErrorClass::Conflict,
                400..=499 => ErrorClass::Validation,
                _ => ErrorClass::TransientNetwork,
            },
        }
    }

    /// Whether the retry scheduler may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::TransientNetwork
    }
}

/// An error already classified for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub message: String,
}

impl From<&Error> for ClassifiedError {
    fn from(error: &Error) -> Self {
        Self {
            class: error.class(),
            message: error.to_string(),
        }
    }
}

impl From<Error> for ClassifiedError {
    fn from(error: Error) -> Self {
        Self::from(&error)
    }
}

/// Cache served data past its TTL because a refresh failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleDataWarning {
    pub collection: String,
    pub reason: String,
}

/// Result of a UI-facing operation; never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub error: Option<ClassifiedError>,
    pub warning: Option<StaleDataWarning>,
}

impl Outcome {
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
            warning: None,
        }
    }

    pub fn failed(error: impl Into<ClassifiedError>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            warning: None,
        }
    }

    #[must_use]
    pub fn with_warning(mut self, warning: Option<StaleDataWarning>) -> Self {
        self.warning = warning;
        self
    }

    pub fn error_class(&self) -> Option<ErrorClass> {
        self.error.as_ref().map(|error| error.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_status_maps_onto_taxonomy() {
        let api = |status| Error::Api {
            status,
            message: "boom".to_string(),
        };
        assert_eq!(api(401).class(), ErrorClass::Authorization);
        assert_eq!(api(403).class(), ErrorClass::Authorization);
        assert_eq!(api(409).class(), ErrorClass::Conflict);
        assert_eq!(api(422).class(), ErrorClass::Validation);
        assert_eq!(api(503).class(), ErrorClass::TransientNetwork);
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(Error::Timeout("requests").is_retryable());
        assert!(Error::Disconnected("offline".to_string()).is_retryable());
        assert!(!Error::Conflict("already voted".to_string()).is_retryable());
        assert!(!Error::Validation("title".to_string()).is_retryable());
        assert!(!Error::AlreadyInProgress("submit".to_string()).is_retryable());
        assert!(!Error::Stopped.is_retryable());
    }

    #[test]
    fn in_flight_and_stopped_are_not_network_faults() {
        let busy = ClassifiedError::from(Error::AlreadyInProgress("vote:abc".to_string()));
        assert_eq!(busy.class, ErrorClass::Busy);
        assert_eq!(busy.class.to_string(), "busy");
        assert_eq!(Error::Stopped.class(), ErrorClass::Cancelled);
        assert_eq!(
            serde_json::to_string(&ErrorClass::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
