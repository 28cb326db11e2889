//! Tensor utilities for ONNX models
//!
//! This module provides utilities for working with ONNX initializers:
//! - Data type mappings (`dtype`)
//! - Payload access and permutation (`convert`)
//!
//! # Example
//!
//! ```ignore
//! use onnx_layout_optimizer::tensor::{tensor_int64_data, transpose_tensor_data};
//!
//! // Read the axes of a Squeeze node from its constant input
//! let axes = tensor_int64_data(&tensor)?;
//!
//! // Permute a weight initializer in place
//! transpose_tensor_data(&mut weights, &[0, 2, 3, 1])?;
//! ```

pub mod convert;
pub mod dtype;

// Re-export commonly used items
pub use convert::{
    is_permutable, make_int32_tensor, make_int64_tensor, numel, tensor_int32_data,
    tensor_int64_data, tensor_int_data, transpose_tensor_data,
};
pub use dtype::{dtype_size, i32_to_dtype, is_int_type, is_small_int};
