//! Optimization heuristics
//!
//! A transpose is pushed when the total number of transposes above the node
//! strictly decreases. To favor transposing smaller tensors, the measure is
//! the number of transposed non-trivial dimensions: dims of size 1 are free
//! to permute.

use crate::graph::GraphContext;
use crate::proto::NodeProto;

use super::handlers::get_handler;
use super::perm::get_perm_attr_if_valid;

/// Rank of a value excluding dims of size 1. Returns 5 if the rank is
/// unknown, a default that neither always wins nor always loses.
pub(crate) fn estimate_value_rank(graph: &GraphContext, input: &str) -> i64 {
    match graph.get_value_shape(input) {
        Some(shape) => shape.iter().filter(|&&d| d != 1).count() as i64,
        None => 5,
    }
}

/// True if the transpose is only consumed by nodes it can likely be pushed
/// through (every consumer known and handled, extended set included)
pub(crate) fn can_likely_remove_transpose(graph: &GraphContext, transpose: &NodeProto) -> bool {
    let Some(output) = transpose.output.first() else {
        return false;
    };
    let consumers = graph.get_value_consumers(output);
    if !consumers.comprehensive {
        return false;
    }
    consumers.nodes.iter().all(|name| {
        graph
            .get_node(name)
            .is_some_and(|node| get_handler(node, true).is_some())
    })
}

/// Cost of transposing one input. Negative when an existing transpose is
/// removed, zero for constants and for transposes that merely compose.
///
/// `perm` is the permutation of the transpose being pushed; a producing
/// Transpose carrying exactly this perm cancels against the push.
pub(crate) fn estimate_transpose_value_cost(
    graph: &GraphContext,
    input: &str,
    perm: &[i64],
) -> i64 {
    // Transposing constants costs nothing
    if graph.get_constant(input).is_some() {
        return 0;
    }

    // Transposing a transpose either cancels it or composes the permutations
    if let Some(node) = graph.get_node_producing_output(input) {
        if node.is_op("Transpose") {
            if let Some(perm2) = get_perm_attr_if_valid(node) {
                if perm2 == perm && can_likely_remove_transpose(graph, node) {
                    return -estimate_value_rank(graph, input);
                }
                return 0;
            }
        }
    }

    // A new transpose will likely be added
    estimate_value_rank(graph, input)
}

/// Total cost of transposing the listed inputs. Negative when transposing
/// is beneficial.
pub(crate) fn estimate_transpose_inputs_cost(
    graph: &GraphContext,
    node: &NodeProto,
    perm: &[i64],
    input_indices: &[usize],
) -> i64 {
    input_indices
        .iter()
        .filter_map(|&j| node.input.get(j))
        .map(|input| estimate_transpose_value_cost(graph, input, perm))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::GraphProto;
    use crate::tensor::make_int64_tensor;

    fn transpose_node(name: &str, input: &str, output: &str, perm: &[i64]) -> NodeProto {
        let mut node = make_node("Transpose", &[input], &[output], name);
        node.set_attribute_ints("perm", perm.to_vec());
        node
    }

    #[test]
    fn test_estimate_value_rank() {
        let graph = GraphContext::new(&GraphProto {
            input: vec![
                make_tensor_value_info("a", 1, &[2, 1, 4]),
                make_tensor_value_info("b", 1, &[1, 1]),
            ],
            ..Default::default()
        });

        assert_eq!(estimate_value_rank(&graph, "a"), 2);
        assert_eq!(estimate_value_rank(&graph, "b"), 0);
        // Unknown rank gets the conservative default
        assert_eq!(estimate_value_rank(&graph, "unknown"), 5);
    }

    #[test]
    fn test_constant_costs_nothing() {
        let graph = GraphContext::new(&GraphProto {
            node: vec![make_node("Add", &["x", "W"], &["y"], "add_0")],
            input: vec![make_tensor_value_info("x", 1, &[2, 3])],
            initializer: vec![make_int64_tensor("W", vec![2, 3], vec![0; 6])],
            ..Default::default()
        });

        assert_eq!(estimate_transpose_value_cost(&graph, "W", &[1, 0]), 0);
        assert_eq!(estimate_transpose_value_cost(&graph, "x", &[1, 0]), 2);
    }

    #[test]
    fn test_cancelling_transpose_is_negative() {
        let graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[1, 0]),
                make_node("Relu", &["t_out"], &["y"], "relu_0"),
            ],
            input: vec![make_tensor_value_info("x", 1, &[2, 3])],
            output: vec![make_tensor_value_info("y", 1, &[3, 2])],
            value_info: vec![make_tensor_value_info("t_out", 1, &[3, 2])],
            ..Default::default()
        });

        // Producer perm matches the pushed perm: it cancels
        assert_eq!(estimate_transpose_value_cost(&graph, "t_out", &[1, 0]), -2);
        // Different perm: the permutations compose at no extra cost
        assert_eq!(estimate_transpose_value_cost(&graph, "t_out", &[0, 1]), 0);
    }

    #[test]
    fn test_unsupported_consumer_blocks_removal_credit() {
        let graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[1, 0]),
                make_node("CustomOp", &["t_out"], &["y"], "custom_0"),
            ],
            input: vec![make_tensor_value_info("x", 1, &[2, 3])],
            output: vec![make_tensor_value_info("y", 1, &[3, 2])],
            ..Default::default()
        });

        let transpose = graph.get_node("transpose_0").unwrap();
        assert!(!can_likely_remove_transpose(&graph, transpose));
        // No removal credit: cost is 0, not negative
        assert_eq!(estimate_transpose_value_cost(&graph, "t_out", &[1, 0]), 0);
    }

    #[test]
    fn test_graph_output_blocks_removal_credit() {
        let graph = GraphContext::new(&GraphProto {
            node: vec![transpose_node("transpose_0", "x", "t_out", &[1, 0])],
            input: vec![make_tensor_value_info("x", 1, &[2, 3])],
            output: vec![make_tensor_value_info("t_out", 1, &[3, 2])],
            ..Default::default()
        });

        let transpose = graph.get_node("transpose_0").unwrap();
        assert!(!can_likely_remove_transpose(&graph, transpose));
    }

    #[test]
    fn test_inputs_cost_sums() {
        let graph = GraphContext::new(&GraphProto {
            node: vec![make_node("Add", &["a", "b"], &["y"], "add_0")],
            input: vec![
                make_tensor_value_info("a", 1, &[2, 3, 4]),
                make_tensor_value_info("b", 1, &[2, 3, 4]),
            ],
            ..Default::default()
        });

        let add = graph.get_node("add_0").unwrap();
        assert_eq!(
            estimate_transpose_inputs_cost(&graph, add, &[0, 2, 1], &[0, 1]),
            6
        );
    }
}
