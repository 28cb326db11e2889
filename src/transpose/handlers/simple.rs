//! Shared handler templates
//!
//! The simple template transposes eligible inputs by perm_inv and outputs by
//! perm; the broadcast variant aligns input ranks first; the axis variant
//! additionally remaps an `axis` attribute through the perm.

use crate::graph::GraphContext;

use super::super::edits::{normalize_input_ranks, transpose_inputs, transpose_outputs};
use super::super::perm::normalize_and_validate_axis;
use super::HandlerArgs;

pub(crate) fn handle_simple_node_base(
    graph: &mut GraphContext,
    args: &HandlerArgs,
    broadcast_inputs: bool,
) -> bool {
    let rank = args.perm.len();
    if broadcast_inputs
        && !normalize_input_ranks(graph, args.ctx, &args.node, rank, &args.transposible_inputs)
    {
        return false;
    }
    transpose_inputs(graph, &args.node, &args.perm_inv, &args.transposible_inputs);
    transpose_outputs(graph, &args.node, &args.perm);
    true
}

/// Transposes eligible inputs and all outputs
pub(crate) fn handle_simple_node(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    handle_simple_node_base(graph, args, false)
}

/// Simple template for nodes with broadcastable inputs
pub(crate) fn handle_simple_node_broadcast(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    handle_simple_node_base(graph, args, true)
}

/// Simple template plus an axis attribute remapped through the perm
///
/// `default_axis` is None for ops where the attribute is required (Concat).
pub(crate) fn handle_simple_node_with_axis(
    graph: &mut GraphContext,
    args: &HandlerArgs,
    default_axis: Option<i64>,
) -> bool {
    let rank = args.perm.len();
    let Some(node) = graph.get_node(&args.node) else {
        return false;
    };

    let mut axis = match node.get_attribute_int("axis") {
        Some(axis) => axis,
        None => match default_axis {
            Some(default) => default,
            None => return false,
        },
    };
    if !normalize_and_validate_axis(&mut axis, rank) {
        return false;
    }

    if !handle_simple_node_base(graph, args, false) {
        return false;
    }

    let new_axis = args.perm[axis as usize];
    if let Some(node) = graph.get_node_mut(&args.node) {
        node.set_attribute_int("axis", new_axis);
    }
    true
}

pub(crate) fn handle_split(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    handle_simple_node_with_axis(graph, args, Some(0))
}

/// Concat (and QLinearConcat): the axis attribute has no default
pub(crate) fn handle_concat(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    handle_simple_node_with_axis(graph, args, None)
}

/// Softmax, Hardmax and LogSoftmax
///
/// Below opset 13 these coerce the input to 2D about `axis` and expand back
/// afterwards; the transpose can only be pushed if it moves no dim across
/// that boundary, and the axis needs no update.
pub(crate) fn handle_soft_hard_max(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    if args.ctx.opset >= 13 {
        return handle_simple_node_with_axis(graph, args, Some(-1));
    }

    let rank = args.perm.len();
    let Some(node) = graph.get_node(&args.node) else {
        return false;
    };
    let mut axis = node.get_attribute_int_default("axis", 1);
    if !normalize_and_validate_axis(&mut axis, rank) {
        return false;
    }

    for i in 0..rank {
        let to_lhs = (i as i64) < axis;
        let from_lhs = args.perm[i] < axis;
        if to_lhs != from_lhs {
            return false;
        }
    }

    handle_simple_node(graph, args)
}

#[cfg(test)]
mod tests {
    use crate::graph::GraphContext;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::{GraphProto, NodeProto};
    use crate::transpose::handlers::test_util::apply;

    fn transpose_node(name: &str, input: &str, output: &str, perm: &[i64]) -> NodeProto {
        let mut node = make_node("Transpose", &[input], &[output], name);
        node.set_attribute_ints("perm", perm.to_vec());
        node
    }

    #[test]
    fn test_concat_axis_remapped() {
        let mut concat = make_node("Concat", &["t_out", "c"], &["Y"], "concat_0");
        concat.set_attribute_int("axis", 1);

        let mut graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[2, 0, 1]),
                concat,
            ],
            input: vec![
                make_tensor_value_info("x", 1, &[2, 3, 4]),
                make_tensor_value_info("c", 1, &[4, 5, 3]),
            ],
            output: vec![make_tensor_value_info("Y", 1, &[4, 7, 3])],
            ..Default::default()
        });

        assert!(apply(&mut graph, 13, "transpose_0", "concat_0"));

        let concat = graph.get_node("concat_0").unwrap();
        // axis 1 maps through perm to 0
        assert_eq!(concat.get_attribute_int("axis"), Some(0));
        assert_eq!(concat.input[0], "x");

        // The second input gets a fresh transpose by the inverse perm
        let second = graph.get_node_producing_output(&concat.input[1]).unwrap();
        assert!(second.is_op("Transpose"));
        assert_eq!(second.get_attribute_ints("perm"), Some(&[1, 2, 0][..]));
        assert_eq!(second.input[0], "c");

        let trailing = graph.get_node_producing_output("Y").unwrap();
        assert!(trailing.is_op("Transpose"));
        assert_eq!(trailing.get_attribute_ints("perm"), Some(&[2, 0, 1][..]));
    }

    #[test]
    fn test_concat_without_axis_rejected() {
        // Concat's axis attribute has no default
        let mut graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[1, 0]),
                make_node("Concat", &["t_out"], &["Y"], "concat_0"),
            ],
            input: vec![make_tensor_value_info("x", 1, &[2, 3])],
            output: vec![make_tensor_value_info("Y", 1, &[3, 2])],
            ..Default::default()
        });

        assert!(!apply(&mut graph, 13, "transpose_0", "concat_0"));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_split_uses_default_axis() {
        let mut graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[0, 2, 1]),
                make_node("Split", &["t_out"], &["A", "B"], "split_0"),
            ],
            input: vec![make_tensor_value_info("x", 1, &[2, 3, 4])],
            output: vec![
                make_tensor_value_info("A", 1, &[1, 4, 3]),
                make_tensor_value_info("B", 1, &[1, 4, 3]),
            ],
            ..Default::default()
        });

        assert!(apply(&mut graph, 13, "transpose_0", "split_0"));

        let split = graph.get_node("split_0").unwrap();
        assert_eq!(split.input[0], "x");
        // Default axis 0 maps to perm[0] = 0
        assert_eq!(split.get_attribute_int("axis"), Some(0));

        // Every output gets its own trailing transpose
        for name in ["A", "B"] {
            let trailing = graph.get_node_producing_output(name).unwrap();
            assert!(trailing.is_op("Transpose"));
            assert_eq!(trailing.get_attribute_ints("perm"), Some(&[0, 2, 1][..]));
        }
    }

    #[test]
    fn test_softmax_pre13_boundary() {
        let build = |perm: &[i64]| {
            let mut softmax = make_node("Softmax", &["t_out"], &["Y"], "softmax_0");
            softmax.set_attribute_int("axis", 1);
            GraphContext::new(&GraphProto {
                node: vec![transpose_node("transpose_0", "x", "t_out", perm), softmax],
                input: vec![make_tensor_value_info("x", 1, &[2, 3, 4])],
                output: vec![make_tensor_value_info("Y", 1, &[2, 4, 3])],
                ..Default::default()
            })
        };

        // [0, 2, 1] keeps dims on their side of the axis-1 boundary
        let mut graph = build(&[0, 2, 1]);
        assert!(apply(&mut graph, 11, "transpose_0", "softmax_0"));
        let softmax = graph.get_node("softmax_0").unwrap();
        assert_eq!(softmax.input[0], "x");
        // The flattening axis is untouched below opset 13
        assert_eq!(softmax.get_attribute_int("axis"), Some(1));

        // [1, 0, 2] moves a dim across the boundary: no push
        let mut graph = build(&[1, 0, 2]);
        assert!(!apply(&mut graph, 11, "transpose_0", "softmax_0"));
        assert!(graph.has_node("transpose_0"));
    }

    #[test]
    fn test_softmax_13_default_axis_remapped() {
        let mut graph = GraphContext::new(&GraphProto {
            node: vec![
                transpose_node("transpose_0", "x", "t_out", &[2, 0, 1]),
                make_node("Softmax", &["t_out"], &["Y"], "softmax_0"),
            ],
            input: vec![make_tensor_value_info("x", 1, &[2, 3, 4])],
            output: vec![make_tensor_value_info("Y", 1, &[4, 2, 3])],
            ..Default::default()
        });

        assert!(apply(&mut graph, 13, "transpose_0", "softmax_0"));

        let softmax = graph.get_node("softmax_0").unwrap();
        // Default axis -1 normalizes to 2 and maps to perm[2] = 1
        assert_eq!(softmax.get_attribute_int("axis"), Some(1));
        assert_eq!(softmax.input[0], "x");
    }
}
