//! Error types for the export engine.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid staging path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// The instance lock is held by another operation.
    #[error("instance is locked for administrative operations")]
    Locked,

    #[error("instance is not locked for administrative operations")]
    NotLocked,

    #[error("{component}: {message}")]
    Component { component: String, message: String },

    /// A task faulted at runtime and the fault was recovered.
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task cancelled")]
    Cancelled,
}

impl ExportError {
    /// Error reported by a collaborator about its own work.
    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        ExportError::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Build a [`ExportError::Panicked`] from a payload returned by a panic.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ExportError::Panicked(message)
    }
}

impl From<tokio::task::JoinError> for ExportError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            ExportError::from_panic(err.into_panic())
        } else {
            ExportError::Cancelled
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payload_string() {
        let err = ExportError::from_panic(Box::new(String::from("index out of bounds")));
        assert_eq!(err.to_string(), "Task panicked: index out of bounds");
    }

    #[test]
    fn test_panic_payload_unknown() {
        let err = ExportError::from_panic(Box::new(42u32));
        assert!(matches!(err, ExportError::Panicked(ref m) if m == "unknown panic payload"));
    }

    #[tokio::test]
    async fn test_join_error_conversion() {
        let handle = tokio::spawn(async { panic!("boom") });
        let err: ExportError = handle.await.unwrap_err().into();
        assert!(matches!(err, ExportError::Panicked(ref m) if m == "boom"));
    }
}
