//! Extension methods for ONNX protobuf types
//!
//! Provides convenient helper methods for working with ONNX protobuf types.

use super::onnx::*;

// ============================================================================
// ModelProto extensions
// ============================================================================

impl ModelProto {
    /// Get the opset version for the default domain
    pub fn get_opset_version(&self) -> Option<i64> {
        self.opset_import
            .iter()
            .find(|op| op.domain.is_empty() || op.domain == "ai.onnx")
            .map(|op| op.version)
    }

    /// Check if the model has a graph
    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Get mutable reference to graph, creating if necessary
    pub fn graph_mut(&mut self) -> &mut GraphProto {
        self.graph.get_or_insert_with(GraphProto::default)
    }
}

// ============================================================================
// NodeProto extensions
// ============================================================================

impl NodeProto {
    /// Get attribute by name
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|attr| attr.name == name)
    }

    /// Get integer attribute value if present
    pub fn get_attribute_int(&self, name: &str) -> Option<i64> {
        self.get_attribute(name).map(|a| a.i)
    }

    /// Get integer attribute value with default
    pub fn get_attribute_int_default(&self, name: &str, default: i64) -> i64 {
        self.get_attribute_int(name).unwrap_or(default)
    }

    /// Get repeated int attribute
    pub fn get_attribute_ints(&self, name: &str) -> Option<&[i64]> {
        self.get_attribute(name).map(|a| a.ints.as_slice())
    }

    /// Set or update an integer attribute
    pub fn set_attribute_int(&mut self, name: &str, value: i64) {
        for attr in &mut self.attribute {
            if attr.name == name {
                attr.i = value;
                attr.r#type = attribute_proto::AttributeType::Int as i32;
                return;
            }
        }
        self.attribute.push(AttributeProto::new_int(name, value));
    }

    /// Set or update an ints attribute
    pub fn set_attribute_ints(&mut self, name: &str, values: Vec<i64>) {
        for attr in &mut self.attribute {
            if attr.name == name {
                attr.ints = values;
                attr.r#type = attribute_proto::AttributeType::Ints as i32;
                return;
            }
        }
        self.attribute.push(AttributeProto::new_ints(name, values));
    }

    /// Remove an attribute by name
    pub fn clear_attribute(&mut self, name: &str) -> Option<AttributeProto> {
        let pos = self.attribute.iter().position(|a| a.name == name)?;
        Some(self.attribute.remove(pos))
    }

    /// Copy all attributes from another node, replacing same-named ones
    pub fn copy_attributes_from(&mut self, other: &NodeProto) {
        for attr in &other.attribute {
            self.attribute.retain(|a| a.name != attr.name);
            self.attribute.push(attr.clone());
        }
    }

    /// Check if this node has a specific op type
    pub fn is_op(&self, op_type: &str) -> bool {
        self.op_type == op_type
    }

    /// Check if this node's op type is in the given list
    pub fn is_op_in(&self, op_types: &[&str]) -> bool {
        op_types.contains(&self.op_type.as_str())
    }
}

// ============================================================================
// ValueInfoProto extensions
// ============================================================================

impl ValueInfoProto {
    /// Get the shape dimensions if available
    ///
    /// Symbolic dimensions are reported as -1.
    pub fn get_shape(&self) -> Option<Vec<i64>> {
        self.r#type.as_ref().and_then(|t| {
            t.value.as_ref().and_then(|v| match v {
                type_proto::Value::TensorType(tensor) => tensor.shape.as_ref().map(|s| {
                    s.dim
                        .iter()
                        .map(|d| match &d.value {
                            Some(tensor_shape_proto::dimension::Value::DimValue(v)) => *v,
                            Some(tensor_shape_proto::dimension::Value::DimParam(_)) => -1,
                            None => -1,
                        })
                        .collect()
                }),
            })
        })
    }

    /// Get the element type if this is a tensor type
    pub fn get_elem_type(&self) -> Option<i32> {
        self.r#type.as_ref().and_then(|t| {
            t.value.as_ref().and_then(|v| match v {
                type_proto::Value::TensorType(tensor) => Some(tensor.elem_type),
            })
        })
    }

    fn shape_dims_mut(&mut self) -> Option<&mut Vec<tensor_shape_proto::Dimension>> {
        let ty = self.r#type.as_mut()?;
        match ty.value.as_mut()? {
            type_proto::Value::TensorType(tensor) => tensor.shape.as_mut().map(|s| &mut s.dim),
        }
    }

    /// Replace the shape with the given concrete dims, creating a tensor type
    /// record if one is missing
    pub fn set_shape_dims(&mut self, dims: &[i64]) {
        let shape = TensorShapeProto {
            dim: dims
                .iter()
                .map(|&d| tensor_shape_proto::Dimension {
                    value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                    denotation: String::new(),
                })
                .collect(),
        };

        let ty = self.r#type.get_or_insert_with(TypeProto::default);
        match ty.value.as_mut() {
            Some(type_proto::Value::TensorType(tensor)) => tensor.shape = Some(shape),
            None => {
                ty.value = Some(type_proto::Value::TensorType(type_proto::Tensor {
                    elem_type: 0,
                    shape: Some(shape),
                }));
            }
        }
    }

    /// Reorder shape dims by perm: dim'[i] = dim[perm[i]]
    ///
    /// Symbolic dimensions survive the reorder. No-op if the rank is unknown
    /// or does not match the perm length.
    pub fn permute_shape_dims(&mut self, perm: &[i64]) {
        if let Some(dims) = self.shape_dims_mut() {
            if dims.len() == perm.len() {
                let old = dims.clone();
                for (i, &p) in perm.iter().enumerate() {
                    dims[i] = old[p as usize].clone();
                }
            }
        }
    }

    /// Insert 1-dims at each position in axes (positions refer to the new rank)
    ///
    /// No-op if the rank is unknown. Axes must be normalized and unique.
    pub fn unsqueeze_shape_dims(&mut self, axes: &[i64]) {
        if let Some(dims) = self.shape_dims_mut() {
            let new_rank = dims.len() + axes.len();
            let mut is_added = vec![false; new_rank];
            for &a in axes {
                is_added[a as usize] = true;
            }

            let mut old = std::mem::take(dims).into_iter();
            for added in is_added {
                if added {
                    dims.push(tensor_shape_proto::Dimension {
                        value: Some(tensor_shape_proto::dimension::Value::DimValue(1)),
                        denotation: String::new(),
                    });
                } else if let Some(d) = old.next() {
                    dims.push(d);
                }
            }
        }
    }
}

// ============================================================================
// TensorProto extensions
// ============================================================================

impl TensorProto {
    /// Get the total number of elements
    pub fn num_elements(&self) -> usize {
        if self.dims.is_empty() {
            1 // scalar
        } else {
            self.dims.iter().map(|&d| d.max(0) as usize).product()
        }
    }

    /// Check if this tensor has raw_data
    pub fn has_raw_data(&self) -> bool {
        !self.raw_data.is_empty()
    }

    /// Get data type enum value
    pub fn data_type_enum(&self) -> tensor_proto::DataType {
        tensor_proto::DataType::try_from(self.data_type)
            .unwrap_or(tensor_proto::DataType::Undefined)
    }
}

// ============================================================================
// AttributeProto extensions
// ============================================================================

impl AttributeProto {
    /// Create a new integer attribute
    pub fn new_int(name: &str, value: i64) -> Self {
        Self {
            name: name.to_string(),
            i: value,
            r#type: attribute_proto::AttributeType::Int as i32,
            ..Default::default()
        }
    }

    /// Create a new ints attribute
    pub fn new_ints(name: &str, values: Vec<i64>) -> Self {
        Self {
            name: name.to_string(),
            ints: values,
            r#type: attribute_proto::AttributeType::Ints as i32,
            ..Default::default()
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Create a new ValueInfoProto for a tensor
pub fn make_tensor_value_info(name: &str, elem_type: i32, shape: &[i64]) -> ValueInfoProto {
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type,
                shape: Some(TensorShapeProto {
                    dim: shape
                        .iter()
                        .map(|&d| tensor_shape_proto::Dimension {
                            value: Some(tensor_shape_proto::dimension::Value::DimValue(d)),
                            denotation: String::new(),
                        })
                        .collect(),
                }),
            })),
            denotation: String::new(),
        }),
        doc_string: String::new(),
    }
}

/// Create a new NodeProto
pub fn make_node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> NodeProto {
    NodeProto {
        op_type: op_type.to_string(),
        input: inputs.iter().map(|s| s.to_string()).collect(),
        output: outputs.iter().map(|s| s.to_string()).collect(),
        name: name.to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_attribute_roundtrip() {
        let mut node = make_node("Concat", &["a", "b"], &["y"], "concat_0");
        node.set_attribute_int("axis", 1);

        assert_eq!(node.get_attribute_int("axis"), Some(1));
        assert_eq!(node.get_attribute_int_default("axis", 0), 1);
        assert_eq!(node.get_attribute_int("missing"), None);
        assert_eq!(node.get_attribute_int_default("missing", 99), 99);

        node.set_attribute_int("axis", 2);
        assert_eq!(node.get_attribute_int("axis"), Some(2));

        assert!(node.clear_attribute("axis").is_some());
        assert_eq!(node.get_attribute_int("axis"), None);
    }

    #[test]
    fn test_copy_attributes() {
        let mut src = make_node("MaxPool", &["x"], &["y"], "pool_0");
        src.set_attribute_ints("kernel_shape", vec![3, 3]);
        src.set_attribute_int("storage_order", 1);

        let mut dst = make_node("NhwcMaxPool", &["x"], &["y2"], "pool_1");
        dst.copy_attributes_from(&src);

        assert_eq!(dst.get_attribute_ints("kernel_shape"), Some(&[3, 3][..]));
        assert_eq!(dst.get_attribute_int("storage_order"), Some(1));
    }

    #[test]
    fn test_make_tensor_value_info() {
        let vi = make_tensor_value_info("test", 1, &[1, 3, 224, 224]);
        assert_eq!(vi.name, "test");
        assert_eq!(vi.get_shape(), Some(vec![1, 3, 224, 224]));
        assert_eq!(vi.get_elem_type(), Some(1));
    }

    #[test]
    fn test_permute_shape_dims() {
        let mut vi = make_tensor_value_info("t", 1, &[2, 3, 4]);
        vi.permute_shape_dims(&[0, 2, 1]);
        assert_eq!(vi.get_shape(), Some(vec![2, 4, 3]));
    }

    #[test]
    fn test_permute_preserves_symbolic_dims() {
        let mut vi = make_tensor_value_info("t", 1, &[2, 3, 4]);
        // Replace dim 0 with a symbolic batch dimension
        if let Some(TypeProto {
            value: Some(type_proto::Value::TensorType(t)),
            ..
        }) = vi.r#type.as_mut()
        {
            t.shape.as_mut().unwrap().dim[0].value = Some(
                tensor_shape_proto::dimension::Value::DimParam("N".to_string()),
            );
        }

        vi.permute_shape_dims(&[2, 0, 1]);
        assert_eq!(vi.get_shape(), Some(vec![4, -1, 3]));
    }

    #[test]
    fn test_unsqueeze_shape_dims() {
        let mut vi = make_tensor_value_info("t", 1, &[5, 7]);
        vi.unsqueeze_shape_dims(&[0, 3]);
        assert_eq!(vi.get_shape(), Some(vec![1, 5, 7, 1]));
    }

    #[test]
    fn test_set_shape_dims() {
        let mut vi = ValueInfoProto {
            name: "t".to_string(),
            ..Default::default()
        };
        vi.set_shape_dims(&[3]);
        assert_eq!(vi.get_shape(), Some(vec![3]));
    }
}
