//! Error types for VSR operations

use thiserror::Error;

/// Main error type for VSR operations
#[derive(Error, Debug)]
pub enum VsrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrong root or array suffix (`.vsr`, `.zarr`)
    #[error("Invalid path format: {0}")]
    InvalidFormat(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown {kind} label '{label}', valid labels: {valid:?}")]
    UnknownLabel {
        kind: String,
        label: String,
        valid: Vec<String>,
    },

    #[error("Axis '{axis}' does not exist in a {ndim}-dimensional array")]
    AxisNotPresent { axis: String, ndim: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transform {edge} is not in {path}")]
    TransformNotFound { edge: String, path: String },

    #[error("Unsupported transform kind: type '{kind}', format '{format}'")]
    UnsupportedTransformKind { kind: String, format: String },

    /// Chunk store failure reported by `zarrs`
    #[error("Storage error: {0}")]
    Storage(#[from] zarrs::storage::StorageError),

    #[error("Array error: {0}")]
    Array(#[from] zarrs::array::ArrayError),

    /// Array metadata that `zarrs` cannot open (unknown codec, data type, ...)
    #[error("Array metadata error: {0}")]
    ArrayCreate(#[from] zarrs::array::ArrayCreateError),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Specialized Result type for VSR operations
pub type Result<T> = std::result::Result<T, VsrError>;

impl From<serde_json::Error> for VsrError {
    fn from(err: serde_json::Error) -> Self {
        VsrError::Serialization(err.to_string())
    }
}

impl VsrError {
    /// Map an I/O error on `path` to a typed error, keeping `NotFound` and
    /// `AlreadyExists` distinguishable for callers.
    pub fn from_io(err: std::io::Error, path: impl std::fmt::Display) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => VsrError::NotFound(path.to_string()),
            std::io::ErrorKind::AlreadyExists => VsrError::AlreadyExists(path.to_string()),
            _ => VsrError::Io(err),
        }
    }
}
