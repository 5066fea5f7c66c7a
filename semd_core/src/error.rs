//! Error taxonomy shared by every layer of the daemon.
//!
//! Each variant maps to a stable kind tag (used in the JSON error envelope)
//! and an HTTP status code.

use std::sync::Arc;
use thiserror::Error;

/// Result alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the daemon can surface to a caller.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A request arrived before the backend finished its handshake, or while
    /// it is being restarted.
    #[error("Server is initializing. Please wait.")]
    ServerNotInitialized,

    #[error("Server is not running.")]
    ServerNotRunning,

    /// The backend did not start or did not answer `initialize` in time.
    #[error("Timed out waiting for server to connect")]
    ConnectionTimeout,

    #[error("Server failed to start: {0}")]
    ServerFailedToStart(String),

    /// No response arrived before the per-call deadline.
    #[error("Response timeout")]
    Timeout,

    /// The connection died while the call was outstanding.
    #[error("Connection to server lost")]
    ConnectionLost,

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Cannot jump to location")]
    CannotJumpToLocation,

    #[error("No definition found")]
    NoDefinitionFound,

    #[error("No documentation available.")]
    NoDocumentationAvailable,

    #[error("Unknown type.")]
    UnknownType,

    /// Carries the full help text listing the supported commands.
    #[error("{0}")]
    UnknownSubcommand(String),

    #[error("Diagnostics are not ready yet.")]
    DiagnosticsNotReady,

    #[error("No semantic completer exists for filetypes: {0:?}")]
    NoCompleterForFiletype(Vec<String>),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized, received bad HMAC.")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    /// Error object returned by the backend, passed through verbatim.
    #[error("{message}")]
    Backend { code: i64, message: String },

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(Arc::new(e))
    }
}

impl Error {
    /// Stable tag used as the `exception.TYPE` field of error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ServerNotInitialized => "ServerNotInitialized",
            Error::ServerNotRunning => "ServerNotRunning",
            Error::ConnectionTimeout => "ConnectionTimeout",
            Error::ServerFailedToStart(_) => "ServerFailedToStart",
            Error::Timeout => "Timeout",
            Error::ConnectionLost => "ConnectionLost",
            Error::MalformedFrame(_) => "MalformedFrame",
            Error::CannotJumpToLocation => "CannotJumpToLocation",
            Error::NoDefinitionFound => "NoDefinitionFound",
            Error::NoDocumentationAvailable => "NoDocumentationAvailable",
            Error::UnknownType => "UnknownType",
            Error::UnknownSubcommand(_) => "UnknownSubcommand",
            Error::DiagnosticsNotReady => "DiagnosticsNotReady",
            Error::NoCompleterForFiletype(_) => "NoCompleterForFiletype",
            Error::BadRequest(_) => "BadRequest",
            Error::Unauthorized => "Unauthorized",
            Error::NotFound(_) => "NotFound",
            Error::Backend { .. } => "BackendError",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }

    /// HTTP status code for this error.
    ///
    /// Request-shaped problems (bad arguments, nothing at the cursor, no
    /// completer) are 4xx; lifecycle, transport and backend failures are 500.
    pub fn status(&self) -> u16 {
        match self {
            Error::Unauthorized => 401,
            Error::NotFound(_) => 404,
            Error::BadRequest(_)
            | Error::UnknownSubcommand(_)
            | Error::NoCompleterForFiletype(_)
            | Error::CannotJumpToLocation
            | Error::NoDefinitionFound
            | Error::NoDocumentationAvailable
            | Error::UnknownType
            | Error::DiagnosticsNotReady => 400,
            _ => 500,
        }
    }

    /// Whether this error means the backend connection is gone.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionLost | Error::MalformedFrame(_) | Error::ServerNotRunning
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::Unauthorized.status(), 401);
        assert_eq!(Error::NotFound("/nope".into()).status(), 404);
        assert_eq!(Error::UnknownSubcommand("x".into()).status(), 400);
        assert_eq!(Error::NoCompleterForFiletype(vec!["foo".into()]).status(), 400);
        assert_eq!(Error::Timeout.status(), 500);
        assert_eq!(Error::ConnectionLost.status(), 500);
        assert_eq!(
            Error::Backend {
                code: -32603,
                message: "boom".into()
            }
            .status(),
            500
        );
    }

    #[test]
    fn test_backend_message_passes_through() {
        let e = Error::Backend {
            code: -32602,
            message: "invalid params".into(),
        };
        assert_eq!(e.to_string(), "invalid params");
        assert_eq!(e.kind(), "BackendError");
    }

    #[test]
    fn test_io_error_converts() {
        let e: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert_eq!(e.kind(), "IoError");
        assert!(e.to_string().contains("pipe"));
    }

    #[test]
    fn test_no_completer_message() {
        let e = Error::NoCompleterForFiletype(vec!["cobol".into()]);
        assert_eq!(
            e.to_string(),
            "No semantic completer exists for filetypes: [\"cobol\"]"
        );
    }
}
