//! Error types for tflite-rs.

use std::path::PathBuf;
use thiserror::Error;

use crate::status::Status;
use crate::tensor::ElementType;

/// Result type alias for tflite-rs operations.
pub type Result<T> = std::result::Result<T, TfliteError>;

/// Direction of a tensor copy across the engine boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Local buffer into the engine tensor.
    ToEngine,
    /// Engine tensor into the local buffer.
    FromEngine,
}

impl std::fmt::Display for CopyDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToEngine => write!(f, "to TFLite"),
            Self::FromEngine => write!(f, "from TFLite"),
        }
    }
}

/// Errors surfaced by model loading, interpreter construction and inference.
///
/// Failures reported by the engine carry the failing operation, the decoded
/// status and whatever the engine wrote to the session error log.
#[derive(Debug, Error)]
pub enum TfliteError {
    /// The engine rejected the model bytes.
    #[error("Failed to create tflite model. {log}")]
    ModelCreationFailed { log: String },

    /// The engine could not build an interpreter for the model.
    #[error("Failed to create tflite interpreter. {log}")]
    InterpreterCreationFailed { log: String },

    /// Tensor allocation failed.
    #[error("Failed to allocate tensors: {}. {log}", .status.describe())]
    TensorAllocationFailed { status: Status, log: String },

    /// The tensor has an element type that cannot be exposed as a buffer.
    #[error("Tensor '{name}' has unsupported type '{element_type}'")]
    UnsupportedTensorType {
        name: String,
        element_type: ElementType,
    },

    /// Descriptor and engine disagree about a tensor.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The delegate refused an option.
    #[error("Failed to set delegate options: {}. {log}", .status.describe())]
    DelegateOptionRejected {
        key: String,
        status: Status,
        log: String,
    },

    /// The delegate library could not be loaded or refused to start.
    #[error("Failed to create delegate from '{path}': {reason}")]
    DelegateCreationFailed { path: String, reason: String },

    /// Copying a tensor across the boundary failed.
    #[error("Failed to copy tensor '{name}' data {direction}: {reason}")]
    CopyFailed {
        name: String,
        direction: CopyDirection,
        reason: String,
    },

    /// Invocation failed.
    #[error("Failed to invoke interpreter: {}. {log}", .status.describe())]
    InvokeFailed { status: Status, log: String },

    /// A caller-supplied option object is malformed.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// Host data does not match the tensor's element count.
    #[error("Tensor '{name}' expects {expected} elements, got {actual}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Tensor index out of range.
    #[error("Tensor index {requested} out of range (have {available})")]
    InvalidIndex { requested: usize, available: usize },

    /// The engine library or one of its symbols could not be loaded.
    #[error("Failed to load TFLite library: {0}")]
    LibraryLoad(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found.
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Fetching a remote model failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TfliteError {
    /// Create an invalid option error.
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::InvalidOption(msg.into())
    }

    /// Create an invariant violation error.
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a library loading error.
    pub fn library(msg: impl Into<String>) -> Self {
        Self::LibraryLoad(msg.into())
    }
}
