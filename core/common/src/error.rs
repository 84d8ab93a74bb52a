//! Common error types for AccrediFy evidence storage.

use thiserror::Error;

/// Top-level error type for evidence storage operations.
///
/// Every variant is terminal for the operation that raised it. Nothing in
/// this workspace retries automatically; the caller decides whether to
/// offer the action to the operator again.
#[derive(Debug, Error)]
pub enum Error {
    /// The operator cancelled consent or the authorization server refused it.
    #[error("Authorization denied: {0}")]
    AuthDenied(String),

    /// The identity service could not be reached or configured.
    #[error("Authorization unavailable: {0}")]
    AuthUnavailable(String),

    /// The operator dismissed the folder picker.
    #[error("Folder selection cancelled")]
    SelectionCancelled,

    /// The folder picker could not be initialized.
    #[error("Folder picker unavailable: {0}")]
    PickerUnavailable(String),

    /// Looking up a folder by name failed.
    #[error("Folder lookup failed: {0}")]
    FolderLookupFailed(String),

    /// Creating a folder failed.
    #[error("Folder creation failed: {0}")]
    FolderCreateFailed(String),

    /// The provider rejected an upload.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// The project link record could not be read or written.
    #[error("Link persistence failed: {0}")]
    LinkPersistenceFailed(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Whether the error came from an operator action rather than a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::SelectionCancelled | Error::AuthDenied(_))
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
