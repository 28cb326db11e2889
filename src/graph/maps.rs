//! Graph map types and builders
//!
//! Defines the core data structures for efficient graph traversal.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::proto::{NodeProto, TensorProto, ValueInfoProto};

/// Type alias for the node table: node_name → NodeProto (order preserved)
pub type NodeMap = IndexMap<String, NodeProto>;

/// Type alias for producer map: output_name → node_name
pub type ProducerMap = FxHashMap<String, String>;

/// Type alias for consumer map: tensor_name → [consumer_node_names]
/// SmallVec optimized for common case of 1-4 consumers
pub type ConsumerMap = FxHashMap<String, SmallVec<[String; 4]>>;

/// Type alias for initializer map: name → TensorProto (order preserved for export)
pub type InitializerMap = IndexMap<String, TensorProto>;

/// Type alias for value info map: name → ValueInfoProto (order preserved for export)
pub type ValueInfoMap = IndexMap<String, ValueInfoProto>;

/// Consumers of a named value
///
/// `comprehensive` is true when `nodes` is known to be every consumer; it is
/// false for graph outputs, whose external readers cannot be enumerated.
#[derive(Debug, Clone, Default)]
pub struct ValueConsumers {
    /// Names of consumer nodes, in node-table order
    pub nodes: Vec<String>,
    /// Whether `nodes` lists every consumer
    pub comprehensive: bool,
}

/// Build producer map from the node table
///
/// Maps each output tensor name to the node that produces it.
pub fn build_producer_map(nodes: &NodeMap) -> ProducerMap {
    let mut map = FxHashMap::default();

    for (name, node) in nodes {
        for output in &node.output {
            if !output.is_empty() {
                map.insert(output.clone(), name.clone());
            }
        }
    }

    map
}

/// Build consumer map from the node table
///
/// Maps each tensor name to the list of nodes that consume it.
pub fn build_consumer_map(nodes: &NodeMap) -> ConsumerMap {
    let mut map: ConsumerMap = FxHashMap::default();

    for (name, node) in nodes {
        for input in &node.input {
            if !input.is_empty() {
                map.entry(input.clone()).or_default().push(name.clone());
            }
        }
    }

    map
}

/// Build value info map from inputs, outputs and intermediate value_info
pub fn build_value_info_map(
    inputs: &[ValueInfoProto],
    outputs: &[ValueInfoProto],
    value_info: &[ValueInfoProto],
) -> ValueInfoMap {
    let mut map = IndexMap::new();

    for vi in inputs.iter().chain(outputs).chain(value_info) {
        map.insert(vi.name.clone(), vi.clone());
    }

    map
}

/// Build initializer map from graph initializers
pub fn build_initializer_map(initializers: &[TensorProto]) -> InitializerMap {
    initializers
        .iter()
        .map(|t| (t.name.clone(), t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::make_node;

    fn make_node_map() -> NodeMap {
        let mut map = IndexMap::new();
        map.insert(
            "transpose_0".to_string(),
            make_node("Transpose", &["X"], &["t_out"], "transpose_0"),
        );
        map.insert(
            "relu_0".to_string(),
            make_node("Relu", &["t_out"], &["Y"], "relu_0"),
        );
        map
    }

    #[test]
    fn test_build_producer_map() {
        let nodes = make_node_map();
        let map = build_producer_map(&nodes);

        assert_eq!(map.get("t_out"), Some(&"transpose_0".to_string()));
        assert_eq!(map.get("Y"), Some(&"relu_0".to_string()));
        assert!(map.get("X").is_none()); // graph input, not produced by a node
    }

    #[test]
    fn test_build_consumer_map() {
        let nodes = make_node_map();
        let map = build_consumer_map(&nodes);

        assert_eq!(
            map.get("t_out").map(|v| v.as_slice()),
            Some(&["relu_0".to_string()][..])
        );
        assert_eq!(
            map.get("X").map(|v| v.as_slice()),
            Some(&["transpose_0".to_string()][..])
        );
        assert!(map.get("Y").is_none());
    }

    #[test]
    fn test_build_value_info_map_order() {
        let inputs = vec![ValueInfoProto {
            name: "X".to_string(),
            ..Default::default()
        }];
        let outputs = vec![ValueInfoProto {
            name: "Y".to_string(),
            ..Default::default()
        }];
        let inner = vec![ValueInfoProto {
            name: "t_out".to_string(),
            ..Default::default()
        }];

        let map = build_value_info_map(&inputs, &outputs, &inner);
        let keys: Vec<_> = map.keys().collect();
        assert_eq!(keys, vec!["X", "Y", "t_out"]);
    }
}
