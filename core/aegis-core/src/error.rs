//! Error types for aegis-core operations.

use std::path::PathBuf;

use crate::session::PendingCommand;

/// All errors that can occur in aegis-core operations.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Invalid project name {name:?}: {reason}")]
    InvalidProjectName { name: String, reason: String },

    #[error("Scanner command already in flight: {pending}")]
    Busy { pending: PendingCommand },

    #[error("Cannot {action} while session is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Backend Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Backend request failed: {context}: {source}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend rejected {context} ({status}): {message}")]
    Backend {
        context: String,
        status: u16,
        message: String,
    },

    #[error("Backend response malformed: {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Log stream failed: {0}")]
    Stream(String),

    #[error("Invalid backend URL {url:?}: {details}")]
    InvalidUrl { url: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for Results using ConsoleError.
pub type Result<T> = std::result::Result<T, ConsoleError>;

impl From<ConsoleError> for String {
    fn from(err: ConsoleError) -> String {
        err.to_string()
    }
}
