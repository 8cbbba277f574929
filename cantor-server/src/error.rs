//! Error types for cantor-server
//!
//! Every core operation returns [`Result`]. The HTTP layer
//! (`api::error::ApiError`) is the only place a failure becomes a status code.

use serde::Serialize;
use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stable failure kind reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    MissingInput,
    InvalidProject,
    NoActiveProject,
    UnsupportedFormat,
    PermissionDenied,
    DestinationBusy,
    ExportWriteFailed,
    RenderFailed,
    NotFound,
    RenderInProgress,
    Cancelled,
}

impl ErrorKind {
    /// Upper-snake code used in response bodies and events
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::MissingInput => "MISSING_INPUT",
            ErrorKind::InvalidProject => "INVALID_PROJECT",
            ErrorKind::NoActiveProject => "NO_ACTIVE_PROJECT",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::DestinationBusy => "DESTINATION_BUSY",
            ErrorKind::ExportWriteFailed => "EXPORT_WRITE_FAILED",
            ErrorKind::RenderFailed => "RENDER_FAILED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::RenderInProgress => "RENDER_IN_PROGRESS",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Core error taxonomy
#[derive(Debug, Error)]
pub enum Error {
    /// Required request input absent
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Project content is malformed or structurally invalid
    #[error("Invalid project: {0}")]
    InvalidProject(String),

    #[error("No project is loaded")]
    NoActiveProject,

    /// Score file of an unrecognized type (carries the file name)
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Destination file is locked by another writer
    #[error("Destination is busy: {0}")]
    DestinationBusy(String),

    #[error("Export write failed: {0}")]
    ExportWriteFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    /// File absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// An export is already running for this session
    #[error("An export is already in progress")]
    RenderInProgress,

    /// Mixdown was cancelled by the caller
    #[error("Export cancelled")]
    Cancelled,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingInput(_) => ErrorKind::MissingInput,
            Error::InvalidProject(_) => ErrorKind::InvalidProject,
            Error::NoActiveProject => ErrorKind::NoActiveProject,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::DestinationBusy(_) => ErrorKind::DestinationBusy,
            Error::ExportWriteFailed(_) => ErrorKind::ExportWriteFailed,
            Error::RenderFailed(_) => ErrorKind::RenderFailed,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::RenderInProgress => ErrorKind::RenderInProgress,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }
}
