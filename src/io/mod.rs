//! Model serialization
//!
//! Loading and saving ONNX ModelProto files via prost. The optimizer
//! operates on a [`GraphContext`](crate::graph::GraphContext); round-trip
//! through it with `GraphContext::from_model` and
//! `GraphContext::export_graph`.

use std::fs;
use std::path::Path;

use prost::Message;

use crate::error::{OnnxResult, TransformError};
use crate::proto::ModelProto;

/// Load an ONNX model from a file
pub fn load_model<P: AsRef<Path>>(path: P) -> OnnxResult<ModelProto> {
    let bytes = fs::read(path.as_ref())?;
    load_model_from_bytes(&bytes)
}

/// Decode an ONNX model from serialized bytes
pub fn load_model_from_bytes(bytes: &[u8]) -> OnnxResult<ModelProto> {
    let model = ModelProto::decode(bytes)?;
    if !model.has_graph() {
        return Err(TransformError::InvalidModel(
            "model has no graph".to_string(),
        ));
    }
    Ok(model)
}

/// Serialize a model to bytes
pub fn model_to_bytes(model: &ModelProto) -> Vec<u8> {
    model.encode_to_vec()
}

/// Save a model to a file
pub fn save_model<P: AsRef<Path>>(path: P, model: &ModelProto) -> OnnxResult<()> {
    fs::write(path.as_ref(), model_to_bytes(model))?;
    Ok(())
}
