//! Graph context for ONNX model manipulation
//!
//! `GraphContext` is the central structure for working with ONNX graphs.
//! It maintains efficient maps for node lookup, traversal, and manipulation,
//! and is the mutation boundary for every optimizer pass: all structural
//! edits go through its methods so that producer/consumer links and value
//! info stay consistent.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{OnnxResult, TransformError};
use crate::proto::onnx::tensor_proto::DataType;
use crate::proto::{GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};

use super::maps::{
    build_consumer_map, build_initializer_map, build_producer_map, build_value_info_map,
    ConsumerMap, InitializerMap, NodeMap, ProducerMap, ValueConsumers, ValueInfoMap,
};

/// Graph context for efficient graph operations
///
/// Node order in the table is topological order; ONNX requires nodes to be
/// serialized in a valid evaluation order and every mutation here preserves
/// that property.
#[derive(Debug)]
pub struct GraphContext {
    /// Maps node name → NodeProto (preserves insertion order)
    pub node_map: NodeMap,

    /// Maps output tensor name → producer node name
    pub producer_map: ProducerMap,

    /// Maps tensor name → consumer node names
    pub consumer_map: ConsumerMap,

    /// Maps initializer name → TensorProto
    pub initializer_map: InitializerMap,

    /// Maps tensor name → ValueInfoProto (inputs + outputs + value_info)
    pub value_info_map: ValueInfoMap,

    /// Graph input names, in declaration order
    pub(crate) input_order: Vec<String>,

    /// Graph output names, in declaration order
    pub(crate) output_order: Vec<String>,

    pub(crate) graph_inputs: FxHashSet<String>,
    pub(crate) graph_outputs: FxHashSet<String>,

    /// Opset imports: domain → version
    pub(crate) opset_import: FxHashMap<String, i64>,

    pub(crate) graph_name: String,

    /// Counter backing fresh node/value name generation
    pub(crate) name_counter: u64,
}

impl GraphContext {
    /// Create a new GraphContext from a GraphProto
    ///
    /// Nodes with empty or duplicate names are assigned fresh unique names;
    /// all context operations address nodes by name.
    pub fn new(graph: &GraphProto) -> Self {
        let mut node_map = NodeMap::new();
        for node in &graph.node {
            let mut node = node.clone();
            if node.name.is_empty() || node_map.contains_key(&node.name) {
                let base = node.op_type.to_lowercase();
                let mut i = node_map.len();
                node.name = loop {
                    let candidate = format!("{base}_{i}");
                    if !node_map.contains_key(&candidate) {
                        break candidate;
                    }
                    i += 1;
                };
            }
            node_map.insert(node.name.clone(), node);
        }

        let producer_map = build_producer_map(&node_map);
        let consumer_map = build_consumer_map(&node_map);

        Self {
            producer_map,
            consumer_map,
            initializer_map: build_initializer_map(&graph.initializer),
            value_info_map: build_value_info_map(&graph.input, &graph.output, &graph.value_info),
            input_order: graph.input.iter().map(|vi| vi.name.clone()).collect(),
            output_order: graph.output.iter().map(|vi| vi.name.clone()).collect(),
            graph_inputs: graph.input.iter().map(|vi| vi.name.clone()).collect(),
            graph_outputs: graph.output.iter().map(|vi| vi.name.clone()).collect(),
            opset_import: FxHashMap::default(),
            graph_name: graph.name.clone(),
            name_counter: 0,
            node_map,
        }
    }

    /// Create from a ModelProto, capturing its opset imports
    pub fn from_model(model: &ModelProto) -> OnnxResult<Self> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| TransformError::MissingField("model.graph".to_string()))?;

        let mut ctx = Self::new(graph);
        for opset in &model.opset_import {
            ctx.opset_import.insert(opset.domain.clone(), opset.version);
        }
        Ok(ctx)
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by name
    pub fn get_node(&self, name: &str) -> Option<&NodeProto> {
        self.node_map.get(name)
    }

    /// Get a mutable node by name
    pub fn get_node_mut(&mut self, name: &str) -> Option<&mut NodeProto> {
        self.node_map.get_mut(name)
    }

    /// Check if a node exists
    pub fn has_node(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    /// Iterate over all nodes in order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeProto> {
        self.node_map.values()
    }

    /// Snapshot of node names in topological order
    ///
    /// The snapshot stays valid across mutation: a name that was removed
    /// simply stops resolving.
    pub fn node_names(&self) -> Vec<String> {
        self.node_map.keys().cloned().collect()
    }

    // ========================================================================
    // Graph traversal
    // ========================================================================

    /// Get the producer node name for a tensor
    pub fn get_producer_name(&self, tensor_name: &str) -> Option<&String> {
        self.producer_map.get(tensor_name)
    }

    /// Get the node producing a tensor
    pub fn get_node_producing_output(&self, tensor_name: &str) -> Option<&NodeProto> {
        self.producer_map
            .get(tensor_name)
            .and_then(|name| self.get_node(name))
    }

    /// Get consumer node names for a tensor
    pub fn get_consumer_names(&self, tensor_name: &str) -> &[String] {
        self.consumer_map
            .get(tensor_name)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Enumerate the consumers of a tensor
    ///
    /// The enumeration is comprehensive unless the value is a graph output,
    /// in which case external readers exist that cannot be listed.
    pub fn get_value_consumers(&self, tensor_name: &str) -> ValueConsumers {
        ValueConsumers {
            nodes: self.get_consumer_names(tensor_name).to_vec(),
            comprehensive: !self.is_graph_output(tensor_name),
        }
    }

    /// Check whether anything reads a tensor (a node input or the graph output list)
    pub fn has_value_consumers(&self, tensor_name: &str) -> bool {
        !self.get_consumer_names(tensor_name).is_empty() || self.is_graph_output(tensor_name)
    }

    /// Check if a tensor is a graph input
    pub fn is_graph_input(&self, name: &str) -> bool {
        self.graph_inputs.contains(name)
    }

    /// Check if a tensor is a graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.graph_outputs.contains(name)
    }

    /// Check if a tensor is an initializer
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer_map.contains_key(name)
    }

    // ========================================================================
    // Value info, initializer and opset accessors
    // ========================================================================

    /// Get value info for a tensor
    pub fn get_value_info(&self, name: &str) -> Option<&ValueInfoProto> {
        self.value_info_map.get(name)
    }

    /// Get the shape of a tensor, from value info or initializer dims
    ///
    /// Symbolic dimensions are reported as -1; `None` means unknown rank.
    pub fn get_value_shape(&self, name: &str) -> Option<Vec<i64>> {
        if let Some(vi) = self.value_info_map.get(name) {
            if let Some(shape) = vi.get_shape() {
                return Some(shape);
            }
        }
        self.initializer_map.get(name).map(|t| t.dims.clone())
    }

    /// Get the element type of a tensor, from value info or initializer
    pub fn get_value_dtype(&self, name: &str) -> Option<DataType> {
        let raw = if let Some(elem) = self
            .value_info_map
            .get(name)
            .and_then(|vi| vi.get_elem_type())
        {
            elem
        } else {
            self.initializer_map.get(name)?.data_type
        };
        DataType::try_from(raw).ok()
    }

    /// Get a constant tensor usable for in-place rewrites
    ///
    /// Initializers that are also graph inputs are excluded: callers may
    /// override them at run time, so their payload must not be rewritten.
    pub fn get_constant(&self, name: &str) -> Option<&TensorProto> {
        if self.is_graph_input(name) {
            return None;
        }
        self.initializer_map.get(name)
    }

    /// Get the imported opset version for a domain
    pub fn opset(&self, domain: &str) -> Option<i64> {
        self.opset_import.get(domain).copied()
    }

    /// Set the imported opset version for a domain
    pub fn set_opset(&mut self, domain: &str, version: i64) {
        self.opset_import.insert(domain.to_string(), version);
    }

    /// Graph name
    pub fn graph_name(&self) -> &str {
        &self.graph_name
    }

    /// Graph output names in declaration order
    pub fn output_names(&self) -> &[String] {
        &self.output_order
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Rebuild a GraphProto from the current context state
    ///
    /// Node and initializer order are preserved; inputs and outputs keep
    /// their declaration order with their current value info.
    pub fn export_graph(&self) -> GraphProto {
        let value_info_for = |name: &String| {
            self.value_info_map
                .get(name)
                .cloned()
                .unwrap_or_else(|| ValueInfoProto {
                    name: name.clone(),
                    ..Default::default()
                })
        };

        GraphProto {
            node: self.node_map.values().cloned().collect(),
            name: self.graph_name.clone(),
            initializer: self.initializer_map.values().cloned().collect(),
            input: self.input_order.iter().map(value_info_for).collect(),
            output: self.output_order.iter().map(value_info_for).collect(),
            value_info: self
                .value_info_map
                .values()
                .filter(|vi| {
                    !self.graph_inputs.contains(&vi.name) && !self.graph_outputs.contains(&vi.name)
                })
                .cloned()
                .collect(),
            ..Default::default()
        }
    }
}
