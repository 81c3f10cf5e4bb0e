//! Errors raised by the metadata store, object store and publisher

use std::fmt;
use std::io;
use std::time::Duration;

/// Collaborator failure
#[derive(Debug)]
pub enum StoreError {
    /// The addressed object does not exist
    NotFound(String),
    /// Local I/O failure
    IoError(io::Error),
    /// Stored data could not be encoded or decoded
    Serialization(String),
    /// The path or identifier cannot be stored safely
    InvalidPath(String),
    /// The backend rejected or failed the request
    Backend(String),
    /// The operation did not finish in time
    Timeout(Duration),
}

impl StoreError {
    /// Whether the same request might succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(_) | StoreError::Timeout(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
            StoreError::IoError(e) => write!(f, "I/O error: {}", e),
            StoreError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            StoreError::InvalidPath(path) => write!(f, "Invalid path: {}", path),
            StoreError::Backend(msg) => write!(f, "Backend error: {}", msg),
            StoreError::Timeout(after) => write!(f, "Timed out after {:?}", after),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        if error.kind() == io::ErrorKind::NotFound {
            StoreError::NotFound(error.to_string())
        } else {
            StoreError::IoError(error)
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::Serialization(error.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
