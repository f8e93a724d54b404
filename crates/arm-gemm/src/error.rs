//! Error types for GEMM configuration.

use gemm_types::DataType;
use thiserror::Error;

/// Errors reported while validating, configuring or preparing a GEMM.
///
/// Problems found inside the execution loop are contract violations and
/// panic instead.
#[derive(Debug, Error)]
pub enum GemmError {
    /// Tensor or matrix shapes are inconsistent.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The input/output type pair has no GEMM.
    #[error("Unsupported data type combination: {input} -> {output}")]
    UnsupportedDataType { input: DataType, output: DataType },

    /// A tensor's element type differs from the one the operator was built for.
    #[error("Data type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: DataType, found: DataType },

    /// Method selection found no implementation.
    #[error("No GEMM implementation available: {0}")]
    NoImplementation(String),

    /// A buffer is shorter than its shape and strides require.
    #[error("Buffer too small: {required} elements required, {len} available")]
    OutOfBounds { required: usize, len: usize },

    /// A quantized output was requested without requantization parameters.
    #[error("Quantized output requires a requantizing output stage")]
    MissingOutputStage,

    /// The worker pool could not be created.
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Result type for GEMM operations.
pub type Result<T> = std::result::Result<T, GemmError>;
