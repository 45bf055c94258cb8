//! VFS error types.

use std::io;
use thiserror::Error;

/// Boxed cause reported by a native client.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// VFS error type.
///
/// Attribute reads never surface these; they degrade to defaults instead.
/// Listing and every mutating operation return them to the caller.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File, directory or container not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (bad or missing credential, revoked access).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Malformed location identifier.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// No backend registered for a scheme.
    #[error("no backend for scheme: {0}")]
    UnknownScheme(String),

    /// Operation the backend cannot perform.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Remote failure, with the backend's cause attached.
    #[error("{context}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(what: impl Into<String>) -> Self {
        Self::PermissionDenied(what.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(what: impl Into<String>) -> Self {
        Self::NotADirectory(what.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(what: impl Into<String>) -> Self {
        Self::IsADirectory(what.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(what: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(what.into())
    }

    /// Create an InvalidLocation error.
    pub fn invalid_location(what: impl Into<String>) -> Self {
        Self::InvalidLocation(what.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Wrap a backend failure with a message naming the operation.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True when the error means the target is absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            VfsError::Backend { source, .. } => source
                .downcast_ref::<VfsError>()
                .is_some_and(VfsError::is_not_found),
            _ => false,
        }
    }

    /// True when the error means the credential was refused.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            VfsError::PermissionDenied(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            VfsError::Backend { source, .. } => source
                .downcast_ref::<VfsError>()
                .is_some_and(VfsError::is_permission_denied),
            _ => false,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::InvalidLocation(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::UnknownScheme(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::Io(e) => e,
            other => io::Error::other(other.to_string()),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
