//! Error types for URIFS

use thiserror::Error;

/// Result type alias
pub type UrifsResult<T> = Result<T, UrifsError>;

/// Main error type
///
/// The first three variants are raised while resolving a URI to a backend.
/// Everything else originates in a backend operation and is passed through
/// the facade untouched.
#[derive(Error, Debug)]
pub enum UrifsError {
    #[error("Malformed URI: {0}")]
    MalformedUri(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Failed to construct {scheme}://{authority} backend: {source}")]
    BackendConstruction {
        scheme: String,
        authority: String,
        #[source]
        source: Box<UrifsError>,
    },

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid backend parameters: {0}")]
    InvalidParams(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl UrifsError {
    /// True for errors raised while resolving a URI rather than by a backend.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            UrifsError::MalformedUri(_)
                | UrifsError::UnsupportedScheme(_)
                | UrifsError::BackendConstruction { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            UrifsError::NotFound(_) => true,
            UrifsError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
