//! Graph-edit primitives
//!
//! The building blocks handlers use to move transposes around: wrapping an
//! input in an Unsqueeze or Transpose (folding into constants and canceling
//! against existing transposes where possible), inserting a Transpose after
//! an output, and rank normalization for broadcast inputs. These keep value
//! info current and never leave dangling references.

use crate::graph::GraphContext;
use crate::proto::NodeProto;
use crate::tensor::tensor_int64_data;

use super::perm::{
    get_perm_attr_if_valid, invert_perm, is_identity_perm, unsqueeze_perm, unsqueeze_shape,
};
use super::OptimizerCtx;

/// First output name of a node, or "" if the node is gone
pub(crate) fn single_output(graph: &GraphContext, node: &str) -> String {
    graph
        .get_node(node)
        .and_then(|n| n.output.first())
        .cloned()
        .unwrap_or_default()
}

fn make_node_1attr(
    graph: &mut GraphContext,
    op_type: &str,
    input: &str,
    attr_name: &str,
    attr_val: Vec<i64>,
) -> String {
    let name = graph.add_node(op_type, vec![input.to_string()], 1, "");
    if let Some(node) = graph.get_node_mut(&name) {
        node.set_attribute_ints(attr_name, attr_val);
    }
    name
}

/// Create a Transpose node. Does not update output value info.
pub(crate) fn make_transpose(graph: &mut GraphContext, input: &str, perm: &[i64]) -> String {
    make_node_1attr(graph, "Transpose", input, "perm", perm.to_vec())
}

/// Create a Squeeze/Unsqueeze node: axes attribute below opset 13, axes
/// initializer input from 13 on. Does not update output value info.
pub(crate) fn make_squeeze_or_unsqueeze(
    graph: &mut GraphContext,
    opset: i64,
    op_type: &str,
    input: &str,
    axes: &[i64],
) -> String {
    if opset < 13 {
        return make_node_1attr(graph, op_type, input, "axes", axes.to_vec());
    }

    let axes_initializer = graph.add_initializer_int64(vec![axes.len() as i64], axes.to_vec());
    graph.add_node(
        op_type,
        vec![input.to_string(), axes_initializer],
        1,
        "",
    )
}

/// Read int64 values from an attribute (below `opset`) or a constant input
/// (from `opset` on)
pub(crate) fn read_from_attr_or_input(
    graph: &GraphContext,
    ctx: OptimizerCtx,
    node: &NodeProto,
    attr_name: &str,
    inp_index: usize,
    opset: i64,
) -> Option<Vec<i64>> {
    if ctx.opset < opset {
        node.get_attribute_ints(attr_name).map(|v| v.to_vec())
    } else {
        let input = node.input.get(inp_index)?;
        if input.is_empty() {
            return None;
        }
        let constant = graph.get_constant(input)?;
        tensor_int64_data(constant).ok()
    }
}

/// Replace the ith input with an unsqueezed view of itself
///
/// Reshapes a constant in place, strips a matching upstream Squeeze, or
/// inserts an Unsqueeze node. Used to align ranks before transposing the
/// inputs of a broadcasting node.
pub(crate) fn unsqueeze_input(
    graph: &mut GraphContext,
    ctx: OptimizerCtx,
    node_name: &str,
    i: usize,
    axes: &[i64],
) {
    let Some(input) = graph
        .get_node(node_name)
        .and_then(|n| n.input.get(i))
        .cloned()
    else {
        return;
    };
    // Remove this node as a consumer while rewiring
    graph.update_node_input(node_name, i, "");

    let constant_shape = graph.get_constant(&input).map(|t| t.dims.clone());
    let consumers = graph.get_value_consumers(&input);

    // Case 1: input is a constant with a known list of consumer nodes.
    // Reshape the initializer itself; existing consumers keep their view
    // through an inserted Squeeze, which cancels if they unsqueeze later.
    if let Some(shape) = constant_shape {
        if consumers.comprehensive {
            if !consumers.nodes.is_empty() {
                let squeeze = make_squeeze_or_unsqueeze(graph, ctx.opset, "Squeeze", &input, axes);
                graph.move_node_to_front(&squeeze);
                let sq_out = single_output(graph, &squeeze);
                graph.copy_value_info(&input, &sq_out);
                graph.replace_value_references(&consumers.nodes, &input, &sq_out);
            }
            graph.reshape_initializer(&input, unsqueeze_shape(&shape, axes));
            graph.update_node_input(node_name, i, &input);
            return;
        }
    }

    let producer = graph.get_node_producing_output(&input).cloned();

    // Case 2: input is a Squeeze with matching axes; strip it
    if let Some(inp_node) = &producer {
        if inp_node.is_op("Squeeze") {
            let squeeze_axes = read_from_attr_or_input(graph, ctx, inp_node, "axes", 1, 13);
            if squeeze_axes.as_deref() == Some(axes) {
                let inp_node_inputs = inp_node.input.clone();
                if consumers.comprehensive && consumers.nodes.is_empty() {
                    graph.remove_node(&inp_node.name);
                    if ctx.opset >= 13 {
                        if let Some(axes_input) = inp_node_inputs.get(1) {
                            if !axes_input.is_empty() && !graph.has_value_consumers(axes_input) {
                                graph.remove_initializer(axes_input);
                            }
                        }
                    }
                }
                let pre = inp_node_inputs.first().cloned().unwrap_or_default();
                graph.update_node_input(node_name, i, &pre);
                return;
            }
            // Axes don't match; fall through to Case 3.
        }
    }

    // Case 3: add an Unsqueeze node
    let unsqueeze = make_squeeze_or_unsqueeze(graph, ctx.opset, "Unsqueeze", &input, axes);
    graph.move_node_before(&unsqueeze, node_name);
    let sq_out = single_output(graph, &unsqueeze);
    graph.copy_value_info(&input, &sq_out);
    graph.unsqueeze_value_dims(&sq_out, axes);

    // Optimization runs in a single pass; adding an Unsqueeze violates the
    // traversal order, so a Transpose feeding it must be pushed through here.
    if let Some(inp_node) = &producer {
        if inp_node.is_op("Transpose") {
            if let Some(perm) = get_perm_attr_if_valid(inp_node) {
                let perm_inv = invert_perm(&perm);
                let new_input = help_handle_unsqueeze(graph, &unsqueeze, &perm, &perm_inv, axes);
                graph.update_node_input(node_name, i, &new_input);
                return;
            }
        }
    }

    graph.update_node_input(node_name, i, &sq_out);
}

/// Replace the ith input with a transposed view of itself
///
/// Transposes a constant in place, cancels against or composes with a
/// producing Transpose, reuses an equivalent sibling Transpose, or inserts
/// a new one.
pub(crate) fn transpose_input(
    graph: &mut GraphContext,
    node_name: &str,
    i: usize,
    perm: &[i64],
    perm_inv: &[i64],
) {
    let Some(input) = graph
        .get_node(node_name)
        .and_then(|n| n.input.get(i))
        .cloned()
    else {
        return;
    };
    if input.is_empty() {
        return;
    }
    // Remove this node as a consumer while rewiring
    graph.update_node_input(node_name, i, "");

    let is_foldable_constant = graph
        .get_constant(&input)
        .is_some_and(crate::tensor::is_permutable);
    let consumers = graph.get_value_consumers(&input);

    // Case 1: input is a constant with a known list of consumer nodes.
    // Transpose the initializer; other consumers keep their view through a
    // counter-transpose with perm_inv, which may cancel later.
    if is_foldable_constant && consumers.comprehensive {
        if !consumers.nodes.is_empty() {
            let counter = make_transpose(graph, &input, perm_inv);
            graph.move_node_to_front(&counter);
            let counter_out = single_output(graph, &counter);
            graph.copy_value_info(&input, &counter_out);
            graph.replace_value_references(&consumers.nodes, &input, &counter_out);
        }
        graph.transpose_initializer(&input, perm);
        graph.update_node_input(node_name, i, &input);
        return;
    }

    // Case 2: input is produced by a Transpose
    let producer = graph.get_node_producing_output(&input).cloned();
    if let Some(inp_node) = &producer {
        if inp_node.is_op("Transpose") {
            if let Some(perm2) = get_perm_attr_if_valid(inp_node) {
                let pre_transpose_value = inp_node.input.first().cloned().unwrap_or_default();

                if perm2 == perm_inv {
                    // The transposes cancel; use the pre-transpose value
                    if consumers.comprehensive && consumers.nodes.is_empty() {
                        graph.remove_node(&inp_node.name);
                    }
                    graph.update_node_input(node_name, i, &pre_transpose_value);
                    return;
                }

                // Compose both permutations over the pre-transpose value.
                // Cost is unchanged and the old Transpose may become unused.
                let combined = super::perm::compose_perm(&perm2, perm);
                let new_transpose = make_transpose(graph, &pre_transpose_value, &combined);
                graph.move_node_before(&new_transpose, node_name);
                let out = single_output(graph, &new_transpose);
                graph.copy_value_info(&input, &out);
                graph.permute_value_dims(&out, perm);
                if consumers.comprehensive && consumers.nodes.is_empty() {
                    graph.remove_node(&inp_node.name);
                }
                graph.update_node_input(node_name, i, &out);
                return;
            }
        }
    }

    // Case 3: an equivalent Transpose may already exist on this value
    for consumer_name in &consumers.nodes {
        let Some(consumer) = graph.get_node(consumer_name) else {
            continue;
        };
        if consumer.is_op("Transpose") && get_perm_attr_if_valid(consumer).as_deref() == Some(perm)
        {
            if let Some(out) = consumer.output.first().cloned() {
                graph.update_node_input(node_name, i, &out);
                return;
            }
        }
    }

    // Case 4: add a new Transpose
    let new_transpose = make_transpose(graph, &input, perm);
    graph.move_node_before(&new_transpose, node_name);
    let out = single_output(graph, &new_transpose);
    graph.copy_value_info(&input, &out);
    graph.permute_value_dims(&out, perm);
    graph.update_node_input(node_name, i, &out);
}

/// Transpose the listed inputs according to perm
///
/// If a Transpose sits above one of the inputs, passing the inverse of its
/// permutation here cancels it.
pub(crate) fn transpose_inputs(
    graph: &mut GraphContext,
    node_name: &str,
    perm: &[i64],
    input_indices: &[usize],
) {
    let perm_inv = invert_perm(perm);
    for &j in input_indices {
        transpose_input(graph, node_name, j, perm, &perm_inv);
    }
}

/// Transpose input 0 according to perm
pub(crate) fn transpose_first_input(graph: &mut GraphContext, node_name: &str, perm: &[i64]) {
    transpose_inputs(graph, node_name, perm, &[0]);
}

/// Insert a Transpose on the ith output; returns the transposed output name
///
/// The node keeps producing the (now pre-transpose) value under a fresh
/// internal name whose shape is updated with perm_inv; the original output
/// name moves onto the Transpose so downstream references see an unchanged
/// value.
pub(crate) fn transpose_output(
    graph: &mut GraphContext,
    node_name: &str,
    i: usize,
    perm: &[i64],
    perm_inv: &[i64],
) -> String {
    // Make the transpose without an input first to avoid a cyclic reference
    let transpose = make_transpose(graph, "", perm);
    graph.move_node_after(&transpose, node_name);

    graph.move_output(node_name, i, &transpose, 0);
    let new_output = graph
        .get_node(node_name)
        .and_then(|n| n.output.get(i))
        .cloned()
        .unwrap_or_default();
    graph.update_node_input(&transpose, 0, &new_output);

    let old_output = single_output(graph, &transpose);
    graph.copy_value_info(&old_output, &new_output);
    graph.permute_value_dims(&new_output, perm_inv);
    old_output
}

/// Insert a Transpose on every output. Skips if perm is identity.
pub(crate) fn transpose_outputs(graph: &mut GraphContext, node_name: &str, perm: &[i64]) {
    if is_identity_perm(perm) {
        return;
    }
    let perm_inv = invert_perm(perm);
    let num_outputs = graph.get_node(node_name).map_or(0, |n| n.output.len());
    for j in 0..num_outputs {
        transpose_output(graph, node_name, j, perm, &perm_inv);
    }
}

/// Unsqueeze the listed inputs to a uniform rank
///
/// Returns false (without mutation) if any input rank is unknown or exceeds
/// the target.
pub(crate) fn normalize_input_ranks(
    graph: &mut GraphContext,
    ctx: OptimizerCtx,
    node_name: &str,
    target_rank: usize,
    input_indices: &[usize],
) -> bool {
    let Some(inputs) = graph.get_node(node_name).map(|n| n.input.clone()) else {
        return false;
    };

    // Validate ranks before touching anything
    let mut ranks = Vec::with_capacity(input_indices.len());
    for &i in input_indices {
        let Some(input) = inputs.get(i) else {
            return false;
        };
        match graph.get_value_shape(input) {
            Some(shape) if shape.len() <= target_rank => ranks.push(shape.len()),
            _ => return false,
        }
    }

    for (k, &i) in input_indices.iter().enumerate() {
        let rank_diff = target_rank - ranks[k];
        if rank_diff > 0 {
            let axes: Vec<i64> = (0..rank_diff as i64).collect();
            unsqueeze_input(graph, ctx, node_name, i, &axes);
        }
    }
    true
}

/// Push a transpose through an Unsqueeze node and return the final output
///
/// The Unsqueeze keeps its axes; the output transpose uses the perm mapped
/// through the added 1-dims. Also used by unsqueeze_input to fix up a
/// freshly created Unsqueeze fed by a Transpose.
pub(crate) fn help_handle_unsqueeze(
    graph: &mut GraphContext,
    node_name: &str,
    perm: &[i64],
    perm_inv: &[i64],
    axes: &[i64],
) -> String {
    transpose_first_input(graph, node_name, perm_inv);
    let new_perm = unsqueeze_perm(axes, perm);
    let new_perm_inv = invert_perm(&new_perm);
    transpose_output(graph, node_name, 0, &new_perm, &new_perm_inv)
}
