//! Graph mutation operations
//!
//! Methods for modifying the graph structure: adding and removing nodes,
//! moving outputs, and editing value info and initializers. Every method
//! keeps the producer/consumer maps consistent with the node table, and the
//! node table stays in a valid topological order (callers position newly
//! added nodes with `move_node_before`/`move_node_after`).

use crate::proto::{NodeProto, TensorProto, ValueInfoProto};
use crate::tensor::{is_permutable, make_int32_tensor, make_int64_tensor, transpose_tensor_data};

use super::context::GraphContext;

impl GraphContext {
    // ========================================================================
    // Name generation
    // ========================================================================

    /// Generate a value name not used anywhere in the graph
    pub fn fresh_value_name(&mut self, hint: &str) -> String {
        loop {
            self.name_counter += 1;
            let candidate = format!("{hint}_{}", self.name_counter);
            if !self.producer_map.contains_key(&candidate)
                && !self.initializer_map.contains_key(&candidate)
                && !self.value_info_map.contains_key(&candidate)
                && !self.graph_inputs.contains(&candidate)
            {
                return candidate;
            }
        }
    }

    fn fresh_node_name(&mut self, op_type: &str) -> String {
        let base = op_type.to_lowercase();
        loop {
            self.name_counter += 1;
            let candidate = format!("{base}_{}", self.name_counter);
            if !self.node_map.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Create a node with generated name and output names, appended to the
    /// node table. Returns the node name.
    ///
    /// Inputs may contain empty strings for absent optional inputs. Each
    /// output gets an empty value-info record; callers fill it via
    /// `copy_value_info` and the dim editors.
    pub fn add_node(
        &mut self,
        op_type: &str,
        inputs: Vec<String>,
        num_outputs: usize,
        domain: &str,
    ) -> String {
        let name = self.fresh_node_name(op_type);

        let mut outputs = Vec::with_capacity(num_outputs);
        for k in 0..num_outputs {
            let out = self.fresh_value_name(&format!("{name}_out_{k}"));
            self.producer_map.insert(out.clone(), name.clone());
            self.value_info_map.insert(
                out.clone(),
                ValueInfoProto {
                    name: out.clone(),
                    ..Default::default()
                },
            );
            outputs.push(out);
        }

        for input in &inputs {
            if !input.is_empty() {
                self.consumer_map
                    .entry(input.clone())
                    .or_default()
                    .push(name.clone());
            }
        }

        let node = NodeProto {
            op_type: op_type.to_string(),
            domain: domain.to_string(),
            input: inputs,
            output: outputs,
            name: name.clone(),
            ..Default::default()
        };
        self.node_map.insert(name.clone(), node);
        name
    }

    /// Remove a node. Its outputs must no longer be consumed.
    pub fn remove_node(&mut self, name: &str) -> Option<NodeProto> {
        let node = self.node_map.shift_remove(name)?;

        for output in &node.output {
            if !output.is_empty() {
                self.producer_map.remove(output);
                if !self.graph_outputs.contains(output) {
                    self.value_info_map.shift_remove(output);
                }
            }
        }

        for input in &node.input {
            if let Some(consumers) = self.consumer_map.get_mut(input) {
                if let Some(pos) = consumers.iter().position(|n| n == name) {
                    consumers.remove(pos);
                }
            }
        }

        Some(node)
    }

    /// Move a node to sit immediately before `anchor` in the table
    pub fn move_node_before(&mut self, name: &str, anchor: &str) -> bool {
        let (Some(from), Some(anchor_idx)) = (
            self.node_map.get_index_of(name),
            self.node_map.get_index_of(anchor),
        ) else {
            return false;
        };
        let to = if from < anchor_idx {
            anchor_idx - 1
        } else {
            anchor_idx
        };
        self.node_map.move_index(from, to);
        true
    }

    /// Move a node to the front of the table
    ///
    /// Valid for nodes whose inputs are all graph inputs or initializers.
    pub fn move_node_to_front(&mut self, name: &str) -> bool {
        let Some(from) = self.node_map.get_index_of(name) else {
            return false;
        };
        self.node_map.move_index(from, 0);
        true
    }

    /// Move a node to sit immediately after `anchor` in the table
    pub fn move_node_after(&mut self, name: &str, anchor: &str) -> bool {
        let (Some(from), Some(anchor_idx)) = (
            self.node_map.get_index_of(name),
            self.node_map.get_index_of(anchor),
        ) else {
            return false;
        };
        let to = if from < anchor_idx {
            anchor_idx
        } else {
            anchor_idx + 1
        };
        self.node_map.move_index(from, to);
        true
    }

    /// Update a node's input at the given index, extending the input list
    /// with empty slots if needed. An empty string detaches the slot.
    pub fn update_node_input(&mut self, node_name: &str, index: usize, new_input: &str) -> bool {
        let old_input = {
            let Some(node) = self.node_map.get_mut(node_name) else {
                return false;
            };
            if node.input.len() <= index {
                node.input.resize(index + 1, String::new());
            }
            std::mem::replace(&mut node.input[index], new_input.to_string())
        };

        if !old_input.is_empty() {
            if let Some(consumers) = self.consumer_map.get_mut(&old_input) {
                // One entry per consuming slot; drop a single occurrence
                if let Some(pos) = consumers.iter().position(|n| n == node_name) {
                    consumers.remove(pos);
                }
            }
        }
        if !new_input.is_empty() {
            self.consumer_map
                .entry(new_input.to_string())
                .or_default()
                .push(node_name.to_string());
        }
        true
    }

    /// Replace references to `old` in the input slots of the listed nodes
    ///
    /// Never touches outputs or initializers.
    pub fn replace_value_references(&mut self, nodes: &[String], old: &str, new: &str) {
        for name in nodes {
            let Some(node) = self.node_map.get(name) else {
                continue;
            };
            let slots: Vec<usize> = node
                .input
                .iter()
                .enumerate()
                .filter(|(_, v)| *v == old)
                .map(|(i, _)| i)
                .collect();
            for i in slots {
                self.update_node_input(name, i, new);
            }
        }
    }

    /// Move output `i` of `src` onto output slot `j` of `dst`
    ///
    /// `src` gets a fresh internal output name (with an empty value-info
    /// record); `dst`'s previous output name at `j` is dropped from the
    /// graph. Downstream references to the moved name are untouched and now
    /// resolve to `dst`.
    pub fn move_output(&mut self, src: &str, i: usize, dst: &str, j: usize) -> bool {
        let moved = match self.node_map.get(src).and_then(|n| n.output.get(i)) {
            Some(v) if !v.is_empty() => v.clone(),
            _ => return false,
        };
        if self.node_map.get(dst).map_or(true, |n| n.output.len() <= j) {
            return false;
        }

        let fresh = self.fresh_value_name(&format!("{src}_out"));
        if let Some(node) = self.node_map.get_mut(src) {
            node.output[i] = fresh.clone();
        }
        let old_dst = match self.node_map.get_mut(dst) {
            Some(node) => std::mem::replace(&mut node.output[j], moved.clone()),
            None => return false,
        };

        self.producer_map.insert(moved, dst.to_string());
        self.producer_map.insert(fresh.clone(), src.to_string());
        if !old_dst.is_empty() {
            self.producer_map.remove(&old_dst);
            if !self.graph_outputs.contains(&old_dst) {
                self.value_info_map.shift_remove(&old_dst);
            }
        }
        self.value_info_map.insert(
            fresh.clone(),
            ValueInfoProto {
                name: fresh,
                ..Default::default()
            },
        );
        true
    }

    // ========================================================================
    // Value info mutation
    // ========================================================================

    /// Copy the value info of `src` onto `dst` (creating `dst`'s record)
    pub fn copy_value_info(&mut self, src: &str, dst: &str) {
        let mut vi = self.value_info_map.get(src).cloned().unwrap_or_default();
        vi.name = dst.to_string();
        self.value_info_map.insert(dst.to_string(), vi);
    }

    /// Reorder the shape dims of a value by perm
    pub fn permute_value_dims(&mut self, name: &str, perm: &[i64]) {
        if let Some(vi) = self.value_info_map.get_mut(name) {
            vi.permute_shape_dims(perm);
        }
    }

    /// Insert 1-dims into the shape of a value at the given axes
    pub fn unsqueeze_value_dims(&mut self, name: &str, axes: &[i64]) {
        if let Some(vi) = self.value_info_map.get_mut(name) {
            vi.unsqueeze_shape_dims(axes);
        }
    }

    /// Set a value's shape to the given concrete dims
    pub fn set_value_shape(&mut self, name: &str, dims: &[i64]) {
        let vi = self
            .value_info_map
            .entry(name.to_string())
            .or_insert_with(|| ValueInfoProto {
                name: name.to_string(),
                ..Default::default()
            });
        vi.set_shape_dims(dims);
    }

    // ========================================================================
    // Initializer mutation
    // ========================================================================

    /// Add an INT64 initializer with a generated name. Returns the name.
    pub fn add_initializer_int64(&mut self, dims: Vec<i64>, data: Vec<i64>) -> String {
        let name = self.fresh_value_name("const");
        let tensor = make_int64_tensor(&name, dims, data);
        self.initializer_map.insert(name.clone(), tensor);
        name
    }

    /// Add an INT32 initializer with a generated name. Returns the name.
    pub fn add_initializer_int32(&mut self, dims: Vec<i64>, data: Vec<i32>) -> String {
        let name = self.fresh_value_name("const");
        let tensor = make_int32_tensor(&name, dims, data);
        self.initializer_map.insert(name.clone(), tensor);
        name
    }

    /// Replace an initializer's dims, leaving the payload untouched
    ///
    /// Used for unsqueeze-style reshapes where the element count is
    /// unchanged.
    pub fn reshape_initializer(&mut self, name: &str, dims: Vec<i64>) -> bool {
        let Some(tensor) = self.initializer_map.get_mut(name) else {
            return false;
        };
        tensor.dims = dims.clone();
        if self.value_info_map.contains_key(name) {
            self.set_value_shape(name, &dims);
        }
        true
    }

    /// Permute an initializer's payload and dims in place
    pub fn transpose_initializer(&mut self, name: &str, perm: &[i64]) -> bool {
        let Some(tensor) = self.initializer_map.get_mut(name) else {
            return false;
        };
        if !is_permutable(tensor) || transpose_tensor_data(tensor, perm).is_err() {
            return false;
        }
        let dims = tensor.dims.clone();
        if self.value_info_map.contains_key(name) {
            self.set_value_shape(name, &dims);
        }
        true
    }

    /// Remove an initializer
    pub fn remove_initializer(&mut self, name: &str) -> Option<TensorProto> {
        let tensor = self.initializer_map.shift_remove(name)?;
        if !self.graph_inputs.contains(name) && !self.graph_outputs.contains(name) {
            self.value_info_map.shift_remove(name);
        }
        Some(tensor)
    }
}
