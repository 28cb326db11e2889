//! ONNX data type mappings
//!
//! Maps between ONNX TensorProto data types and Rust types.

use crate::error::{OnnxResult, TransformError};
use crate::proto::onnx::tensor_proto::DataType;

/// Size in bytes for each ONNX data type
pub fn dtype_size(dtype: DataType) -> OnnxResult<usize> {
    match dtype {
        DataType::Float => Ok(4),
        DataType::Uint8 => Ok(1),
        DataType::Int8 => Ok(1),
        DataType::Uint16 => Ok(2),
        DataType::Int16 => Ok(2),
        DataType::Int32 => Ok(4),
        DataType::Int64 => Ok(8),
        DataType::Bool => Ok(1),
        DataType::Float16 => Ok(2),
        DataType::Double => Ok(8),
        DataType::Uint32 => Ok(4),
        DataType::Uint64 => Ok(8),
        DataType::Bfloat16 => Ok(2),
        _ => Err(TransformError::InvalidDataType(dtype as i32)),
    }
}

/// Convert i32 to DataType enum
pub fn i32_to_dtype(value: i32) -> OnnxResult<DataType> {
    DataType::try_from(value).map_err(|_| TransformError::InvalidDataType(value))
}

/// Check if data type is integer
pub fn is_int_type(dtype: DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::Uint8
            | DataType::Uint16
            | DataType::Uint32
            | DataType::Uint64
    )
}

/// Check if data type is a single-byte quantized integer (int8/uint8)
pub fn is_small_int(dtype: DataType) -> bool {
    matches!(dtype, DataType::Int8 | DataType::Uint8)
}
