//! Reduce-family handlers
//!
//! The generic handler covers the attribute-axes reduce ops (and
//! QLinearReduceMean); ReduceSum moved its axes to input 1 in opset 13 and
//! gets its own path.

use crate::graph::GraphContext;
use crate::tensor::tensor_int64_data;

use super::super::edits::{transpose_first_input, transpose_outputs};
use super::super::perm::{
    normalize_and_validate_axes, sorted_axes_for_transposed_input, squeeze_perm,
};
use super::HandlerArgs;

/// Reduce ops with an axes attribute
///
/// Absent axes mean reduce-over-all: with keepdims the output keeps the full
/// rank (transpose by perm), without it the output is rank 0 (no transpose).
pub(crate) fn handle_reduce_op(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };
    let keepdims = node.get_attribute_int_default("keepdims", 1);

    let out_perm: Vec<i64> = match node.get_attribute_ints("axes") {
        None => {
            if keepdims == 0 {
                Vec::new()
            } else {
                args.perm.clone()
            }
        }
        Some(axes) => {
            let mut axes = axes.to_vec();
            if !normalize_and_validate_axes(&mut axes, args.perm.len()) {
                return false;
            }

            let new_axes = sorted_axes_for_transposed_input(&axes, &args.perm);
            if let Some(node) = graph.get_node_mut(&args.node) {
                node.set_attribute_ints("axes", new_axes.clone());
            }

            if keepdims == 0 {
                squeeze_perm(&new_axes, &args.perm)
            } else {
                args.perm.clone()
            }
        }
    };

    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &out_perm);
    true
}

/// ReduceSum: axes moved to input 1 in opset 13
pub(crate) fn handle_reduce_sum(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    if args.ctx.opset < 13 {
        return handle_reduce_op(graph, args);
    }

    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };
    let keepdims = node.get_attribute_int_default("keepdims", 1) != 0;

    let axes_input = node.input.get(1).filter(|s| !s.is_empty()).cloned();
    let axes_const = axes_input
        .as_ref()
        .and_then(|name| graph.get_constant(name))
        .cloned();

    let empty_axes = match (&axes_input, &axes_const) {
        (None, _) => true,
        (Some(_), Some(tensor)) => tensor_int64_data(tensor).is_ok_and(|d| d.is_empty()),
        (Some(_), None) => false,
    };

    // Case 1: empty axes (a no-op or a reduce over all dims)
    if empty_axes {
        let noop_with_empty_axes = node.get_attribute_int_default("noop_with_empty_axes", 0) != 0;
        transpose_first_input(graph, &args.node, &args.perm_inv);
        if noop_with_empty_axes || keepdims {
            // The original rank is maintained
            transpose_outputs(graph, &args.node, &args.perm);
        }
        return true;
    }

    // Case 2: non-constant axes cannot be rewritten
    let (Some(axes_input), Some(axes_const)) = (axes_input, axes_const) else {
        return false;
    };

    // Case 3: constant axes
    let Ok(mut axes) = tensor_int64_data(&axes_const) else {
        return false;
    };
    if !normalize_and_validate_axes(&mut axes, args.perm.len()) {
        return false;
    }

    let new_axes = sorted_axes_for_transposed_input(&axes, &args.perm);
    let new_axes_const = graph.add_initializer_int64(vec![new_axes.len() as i64], new_axes.clone());
    graph.update_node_input(&args.node, 1, &new_axes_const);
    if !graph.has_value_consumers(&axes_input) {
        graph.remove_initializer(&axes_input);
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    if keepdims {
        transpose_outputs(graph, &args.node, &args.perm);
    } else {
        transpose_outputs(graph, &args.node, &squeeze_perm(&new_axes, &args.perm));
    }
    true
}
