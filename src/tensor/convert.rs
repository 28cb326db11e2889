//! Initializer payload access and permutation
//!
//! Reads integer data out of TensorProto initializers (axes, pads, repeats)
//! and permutes constant payloads in place when a transpose is folded into
//! an initializer.

use ndarray::{ArrayD, IxDyn};

use crate::error::{OnnxResult, TransformError};
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::TensorProto;

use super::dtype::{dtype_size, i32_to_dtype};

/// Calculate total number of elements from shape
pub fn numel(shape: &[i64]) -> usize {
    if shape.is_empty() {
        1 // scalar
    } else {
        shape.iter().map(|&d| d.max(0) as usize).product()
    }
}

/// Read int64 data from a tensor of dtype INT64
///
/// Handles both raw_data and the int64_data field.
pub fn tensor_int64_data(tensor: &TensorProto) -> OnnxResult<Vec<i64>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    if dtype != DataType::Int64 {
        return Err(TransformError::InvalidDataType(tensor.data_type));
    }
    let expected = numel(&tensor.dims);

    let data: Vec<i64> = if tensor.has_raw_data() {
        if tensor.raw_data.len() != expected * 8 {
            return Err(TransformError::TensorDataMismatch(format!(
                "raw data size {} does not match {} int64 elements",
                tensor.raw_data.len(),
                expected
            )));
        }
        tensor
            .raw_data
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect()
    } else {
        tensor.int64_data.clone()
    };

    if data.len() != expected {
        return Err(TransformError::TensorDataMismatch(format!(
            "data length {} does not match shape {:?}",
            data.len(),
            tensor.dims
        )));
    }
    Ok(data)
}

/// Read int32 data from a tensor of dtype INT32
pub fn tensor_int32_data(tensor: &TensorProto) -> OnnxResult<Vec<i32>> {
    let dtype = i32_to_dtype(tensor.data_type)?;
    if dtype != DataType::Int32 {
        return Err(TransformError::InvalidDataType(tensor.data_type));
    }
    let expected = numel(&tensor.dims);

    let data: Vec<i32> = if tensor.has_raw_data() {
        if tensor.raw_data.len() != expected * 4 {
            return Err(TransformError::TensorDataMismatch(format!(
                "raw data size {} does not match {} int32 elements",
                tensor.raw_data.len(),
                expected
            )));
        }
        tensor
            .raw_data
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    } else {
        tensor.int32_data.clone()
    };

    if data.len() != expected {
        return Err(TransformError::TensorDataMismatch(format!(
            "data length {} does not match shape {:?}",
            data.len(),
            tensor.dims
        )));
    }
    Ok(data)
}

/// Read integer data from an INT32 or INT64 tensor, widened to i64
///
/// Slice accepts either dtype for its starts/ends/axes/steps inputs.
pub fn tensor_int_data(tensor: &TensorProto) -> OnnxResult<Vec<i64>> {
    match i32_to_dtype(tensor.data_type)? {
        DataType::Int64 => tensor_int64_data(tensor),
        DataType::Int32 => Ok(tensor_int32_data(tensor)?
            .into_iter()
            .map(i64::from)
            .collect()),
        _ => Err(TransformError::InvalidDataType(tensor.data_type)),
    }
}

/// Create an INT64 TensorProto with the given dims
pub fn make_int64_tensor(name: &str, dims: Vec<i64>, data: Vec<i64>) -> TensorProto {
    TensorProto {
        dims,
        data_type: DataType::Int64 as i32,
        int64_data: data,
        name: name.to_string(),
        ..Default::default()
    }
}

/// Create an INT32 TensorProto with the given dims
pub fn make_int32_tensor(name: &str, dims: Vec<i64>, data: Vec<i32>) -> TensorProto {
    TensorProto {
        dims,
        data_type: DataType::Int32 as i32,
        int32_data: data,
        name: name.to_string(),
        ..Default::default()
    }
}

/// Check whether transpose_tensor_data can permute this tensor's payload
pub fn is_permutable(tensor: &TensorProto) -> bool {
    let dtype = match i32_to_dtype(tensor.data_type) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let elem_size = match dtype_size(dtype) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let count = numel(&tensor.dims);
    if count <= 1 {
        return true;
    }
    if tensor.has_raw_data() {
        return tensor.raw_data.len() == count * elem_size;
    }
    typed_field_len(tensor, dtype) == count
}

/// Permute a tensor's payload and dims in place: dims'[i] = dims[perm[i]]
///
/// perm must be a valid permutation of the tensor's rank.
pub fn transpose_tensor_data(tensor: &mut TensorProto, perm: &[i64]) -> OnnxResult<()> {
    if perm.len() != tensor.dims.len() {
        return Err(TransformError::TensorDataMismatch(format!(
            "perm of length {} applied to rank {}",
            perm.len(),
            tensor.dims.len()
        )));
    }

    let dims: Vec<usize> = tensor.dims.iter().map(|&d| d.max(0) as usize).collect();
    let axes: Vec<usize> = perm.iter().map(|&p| p as usize).collect();
    let new_dims: Vec<i64> = perm.iter().map(|&p| tensor.dims[p as usize]).collect();
    let count = numel(&tensor.dims);
    let dtype = i32_to_dtype(tensor.data_type)?;

    if count > 1 {
        if tensor.has_raw_data() {
            let elem_size = dtype_size(dtype)?;
            let raw = std::mem::take(&mut tensor.raw_data);
            tensor.raw_data = permute_raw(&dims, raw, elem_size, &axes)?;
        } else if typed_field_len(tensor, dtype) == count {
            permute_typed_field(tensor, dtype, &dims, &axes)?;
        } else {
            return Err(TransformError::TensorDataMismatch(format!(
                "initializer {} has no payload matching shape {:?}",
                tensor.name, tensor.dims
            )));
        }
    }

    tensor.dims = new_dims;
    Ok(())
}

// ============================================================================
// Internal helpers
// ============================================================================

fn typed_field_len(tensor: &TensorProto, dtype: DataType) -> usize {
    match dtype {
        DataType::Float => tensor.float_data.len(),
        DataType::Double => tensor.double_data.len(),
        DataType::Int64 => tensor.int64_data.len(),
        DataType::Uint32 | DataType::Uint64 => tensor.uint64_data.len(),
        // Small integer types, bool and 16-bit floats are stored widened in
        // int32_data when not serialized as raw bytes.
        _ => tensor.int32_data.len(),
    }
}

fn permute_typed_field(
    tensor: &mut TensorProto,
    dtype: DataType,
    dims: &[usize],
    axes: &[usize],
) -> OnnxResult<()> {
    match dtype {
        DataType::Float => {
            let data = std::mem::take(&mut tensor.float_data);
            tensor.float_data = permute_vec(dims, data, axes)?;
        }
        DataType::Double => {
            let data = std::mem::take(&mut tensor.double_data);
            tensor.double_data = permute_vec(dims, data, axes)?;
        }
        DataType::Int64 => {
            let data = std::mem::take(&mut tensor.int64_data);
            tensor.int64_data = permute_vec(dims, data, axes)?;
        }
        DataType::Uint32 | DataType::Uint64 => {
            let data = std::mem::take(&mut tensor.uint64_data);
            tensor.uint64_data = permute_vec(dims, data, axes)?;
        }
        _ => {
            let data = std::mem::take(&mut tensor.int32_data);
            tensor.int32_data = permute_vec(dims, data, axes)?;
        }
    }
    Ok(())
}

fn permute_vec<T: Clone>(dims: &[usize], data: Vec<T>, axes: &[usize]) -> OnnxResult<Vec<T>> {
    let arr = ArrayD::from_shape_vec(IxDyn(dims), data)
        .map_err(|e| TransformError::TensorDataMismatch(e.to_string()))?;
    Ok(arr.permuted_axes(IxDyn(axes)).iter().cloned().collect())
}

fn permute_raw(
    dims: &[usize],
    raw: Vec<u8>,
    elem_size: usize,
    axes: &[usize],
) -> OnnxResult<Vec<u8>> {
    match elem_size {
        1 => permute_vec(dims, raw, axes),
        2 => {
            let elems: Vec<u16> = raw
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect();
            Ok(permute_vec(dims, elems, axes)?
                .into_iter()
                .flat_map(u16::to_le_bytes)
                .collect())
        }
        4 => {
            let elems: Vec<u32> = raw
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            Ok(permute_vec(dims, elems, axes)?
                .into_iter()
                .flat_map(u32::to_le_bytes)
                .collect())
        }
        8 => {
            let elems: Vec<u64> = raw
                .chunks_exact(8)
                .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect();
            Ok(permute_vec(dims, elems, axes)?
                .into_iter()
                .flat_map(u64::to_le_bytes)
                .collect())
        }
        n => Err(TransformError::TensorDataMismatch(format!(
            "unsupported element size {n}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[1, 1, 1]), 1);
        assert_eq!(numel(&[]), 1); // scalar
    }

    #[test]
    fn test_tensor_int64_data_typed() {
        let tensor = make_int64_tensor("axes", vec![3], vec![0, 2, 3]);
        assert_eq!(tensor_int64_data(&tensor).unwrap(), vec![0, 2, 3]);
    }

    #[test]
    fn test_tensor_int64_data_raw() {
        let raw: Vec<u8> = [4i64, 5].iter().flat_map(|v| v.to_le_bytes()).collect();
        let tensor = TensorProto {
            dims: vec![2],
            data_type: DataType::Int64 as i32,
            raw_data: raw,
            ..Default::default()
        };
        assert_eq!(tensor_int64_data(&tensor).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_tensor_int64_data_wrong_dtype() {
        let tensor = make_int32_tensor("axes", vec![1], vec![7]);
        assert!(tensor_int64_data(&tensor).is_err());
    }

    #[test]
    fn test_tensor_int_data_widens_int32() {
        let tensor = make_int32_tensor("axes", vec![2], vec![1, -1]);
        assert_eq!(tensor_int_data(&tensor).unwrap(), vec![1, -1]);
    }

    #[test]
    fn test_transpose_int64_payload() {
        // [[1, 2, 3], [4, 5, 6]] -> transpose -> [[1, 4], [2, 5], [3, 6]]
        let mut tensor = make_int64_tensor("t", vec![2, 3], vec![1, 2, 3, 4, 5, 6]);
        transpose_tensor_data(&mut tensor, &[1, 0]).unwrap();

        assert_eq!(tensor.dims, vec![3, 2]);
        assert_eq!(tensor.int64_data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_transpose_raw_f32_payload() {
        let raw: Vec<u8> = [1.0f32, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|f| f.to_le_bytes())
            .collect();
        let mut tensor = TensorProto {
            dims: vec![2, 2],
            data_type: DataType::Float as i32,
            raw_data: raw,
            ..Default::default()
        };

        transpose_tensor_data(&mut tensor, &[1, 0]).unwrap();

        let values: Vec<f32> = tensor
            .raw_data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(tensor.dims, vec![2, 2]);
        assert_eq!(values, vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_transpose_rank3_payload() {
        // shape [2, 1, 3], perm [2, 0, 1] -> shape [3, 2, 1]
        let mut tensor = make_int64_tensor("t", vec![2, 1, 3], vec![1, 2, 3, 4, 5, 6]);
        transpose_tensor_data(&mut tensor, &[2, 0, 1]).unwrap();

        assert_eq!(tensor.dims, vec![3, 2, 1]);
        assert_eq!(tensor.int64_data, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_transpose_scalar_is_noop() {
        let mut tensor = make_int64_tensor("s", vec![], vec![42]);
        transpose_tensor_data(&mut tensor, &[]).unwrap();
        assert_eq!(tensor.int64_data, vec![42]);
    }

    #[test]
    fn test_is_permutable() {
        let tensor = make_int64_tensor("t", vec![2, 2], vec![1, 2, 3, 4]);
        assert!(is_permutable(&tensor));

        let missing_payload = TensorProto {
            dims: vec![2, 2],
            data_type: DataType::Float as i32,
            ..Default::default()
        };
        assert!(!is_permutable(&missing_payload));

        let strings = TensorProto {
            dims: vec![2],
            data_type: DataType::String as i32,
            ..Default::default()
        };
        assert!(!is_permutable(&strings));
    }
}
