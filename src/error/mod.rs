//! Error types for onnx-layout-optimizer
//!
//! The optimizer itself is fail-open (handlers signal "no change" with a
//! plain `false`); these errors surface from the io layer and from explicit
//! validation entry points.

use thiserror::Error;

/// Main error type for graph transformation operations
#[derive(Error, Debug)]
pub enum TransformError {
    /// Invalid node configuration
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// Invalid model
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Unsupported opset version
    #[error("Unsupported opset version: {version}, expected {min}..={max}")]
    UnsupportedOpset {
        /// Actual version
        version: i64,
        /// Minimum supported
        min: i64,
        /// Maximum supported
        max: i64,
    },

    /// Invalid tensor data type
    #[error("Invalid data type: {0}")]
    InvalidDataType(i32),

    /// Tensor payload does not match its declared shape
    #[error("Tensor data mismatch: {0}")]
    TensorDataMismatch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Protobuf decode error
    #[error("Protobuf decode error: {0}")]
    ProtoDecode(#[from] prost::DecodeError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ONNX operations
pub type OnnxResult<T> = Result<T, TransformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransformError::InvalidNode("transpose_0".to_string());
        assert!(err.to_string().contains("transpose_0"));
    }

    #[test]
    fn test_unsupported_opset() {
        let err = TransformError::UnsupportedOpset {
            version: 5,
            min: 7,
            max: 17,
        };
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains("7..=17"));
    }
}
