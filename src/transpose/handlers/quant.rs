//! Quantization-adjacent handlers
//!
//! QuantizeLinear/DequantizeLinear (per-axis scales from opset 13),
//! ArgMin/ArgMax, the QLinear pooling channels_last toggle, and the
//! MaxPool → NhwcMaxPool rewrite.

use crate::graph::GraphContext;
use crate::opset::EXTENDED_DOMAIN;
use crate::tensor::is_small_int;

use super::super::edits::{transpose_first_input, transpose_inputs, transpose_outputs};
use super::super::perm::{
    channel_last_to_first_perm, normalize_and_validate_axis, squeeze_perm,
};
use super::HandlerArgs;

/// QuantizeLinear / DequantizeLinear
///
/// From opset 13 a non-scalar scale makes the op per-axis; that axis must be
/// remapped through the perm.
pub(crate) fn handle_quantize_dequantize_linear(
    graph: &mut GraphContext,
    args: &HandlerArgs,
) -> bool {
    let rank = args.perm.len();

    if args.ctx.opset >= 13 {
        let Some(node) = graph.get_node(&args.node).cloned() else {
            return false;
        };
        let Some(scale_input) = node.input.get(1) else {
            return false;
        };
        let scalar_params = graph
            .get_value_shape(scale_input)
            .is_some_and(|shape| shape.is_empty());

        if !scalar_params {
            let mut axis = node.get_attribute_int_default("axis", 1);
            if !normalize_and_validate_axis(&mut axis, rank) {
                return false;
            }
            let new_axis = args.perm[axis as usize];
            if let Some(node) = graph.get_node_mut(&args.node) {
                node.set_attribute_int("axis", new_axis);
            }
        }
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &args.perm);
    true
}

/// ArgMin / ArgMax: remap the axis; without keepdims the output transpose
/// drops the reduced dim
pub(crate) fn handle_arg_min_max(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let rank = args.perm.len();
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };

    let keepdims = node.get_attribute_int_default("keepdims", 1);
    let mut axis = node.get_attribute_int_default("axis", 0);
    if !normalize_and_validate_axis(&mut axis, rank) {
        return false;
    }

    let new_axis = args.perm[axis as usize];
    if let Some(node) = graph.get_node_mut(&args.node) {
        node.set_attribute_int("axis", new_axis);
    }

    transpose_inputs(graph, &args.node, &args.perm_inv, &args.transposible_inputs);
    if keepdims != 0 {
        transpose_outputs(graph, &args.node, &args.perm);
    } else {
        transpose_outputs(graph, &args.node, &squeeze_perm(&[new_axis], &args.perm));
    }
    true
}

/// QLinearAveragePool / QLinearGlobalAveragePool
///
/// These carry a channels_last attribute, so the push is a toggle; it only
/// applies when the perm is exactly the channel-last/first swap.
pub(crate) fn handle_qlinear_pool_op(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let rank = args.perm.len();
    if rank < 2 {
        return false;
    }
    let Some(node) = graph.get_node(&args.node) else {
        return false;
    };
    let channels_last = node.get_attribute_int_default("channels_last", 1);

    let channel_perm = channel_last_to_first_perm(rank);
    let applies = (channels_last == 0 && args.perm == channel_perm)
        || (channels_last != 0 && args.perm_inv == channel_perm);
    if !applies {
        return false;
    }

    if let Some(node) = graph.get_node_mut(&args.node) {
        node.set_attribute_int("channels_last", 1 - channels_last);
    }
    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &args.perm);
    true
}

/// MaxPool → NhwcMaxPool (contrib domain)
///
/// NhwcMaxPool only supports int8/uint8 and has no indices output or
/// storage_order attribute.
pub(crate) fn handle_max_pool(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };

    if node.output.len() == 2 && !node.output[1].is_empty() {
        // The optional indices output has no NHWC counterpart
        return false;
    }
    let Some(output) = node.output.first() else {
        return false;
    };
    match graph.get_value_dtype(output) {
        Some(dtype) if is_small_int(dtype) => {}
        _ => return false,
    }

    let rank = args.perm.len();
    if args.perm != channel_last_to_first_perm(rank) {
        return false;
    }

    let new_node = graph.add_node("NhwcMaxPool", node.input.clone(), 1, EXTENDED_DOMAIN);
    graph.move_node_before(&new_node, &args.node);
    if let Some(nhwc) = graph.get_node_mut(&new_node) {
        nhwc.copy_attributes_from(&node);
        // Only relevant for the indices output; prohibited for NhwcMaxPool
        nhwc.clear_attribute("storage_order");
    }
    graph.move_output(&args.node, 0, &new_node, 0);
    graph.remove_node(&args.node);

    transpose_first_input(graph, &new_node, &args.perm_inv);
    transpose_outputs(graph, &new_node, &args.perm);
    true
}
