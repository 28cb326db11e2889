//! Handlers for shape-observing and axis-carrying ops
//!
//! Shape, Pad, Squeeze, Unsqueeze, Slice and Tile all carry axis or
//! per-dimension information that must be remapped when a transpose is
//! pushed through them.

use crate::graph::GraphContext;
use crate::proto::onnx::tensor_proto::DataType;
use crate::tensor::{tensor_int64_data, tensor_int_data};

use super::super::edits::{
    help_handle_unsqueeze, read_from_attr_or_input, single_output, transpose_first_input,
    transpose_inputs, transpose_outputs,
};
use super::super::perm::{
    axes_for_transposed_input, normalize_and_validate_axes, permute_pads, sorted_axes_for_transposed_input,
    squeeze_perm,
};
use super::HandlerArgs;

/// Shape(Transpose(x, perm)) => Gather(Shape(x), perm)
///
/// From opset 15 the start/end attributes trim the result; they move into
/// the Gather indices (perm[start:end]) and are cleared from the node.
pub(crate) fn handle_shape(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    transpose_inputs(graph, &args.node, &args.perm_inv, &args.transposible_inputs);

    let rank = args.perm.len();
    let rank_int = rank as i64;

    let new_perm: Vec<i64> = if args.ctx.opset >= 15 {
        let (mut start, mut end) = match graph.get_node(&args.node) {
            Some(node) => (
                node.get_attribute_int_default("start", 0),
                node.get_attribute_int_default("end", rank_int),
            ),
            None => return false,
        };
        if start < 0 {
            start += rank_int;
        }
        if end < 0 {
            end += rank_int;
        }
        let start_idx = start.clamp(0, rank_int) as usize;
        let end_idx = end.clamp(0, rank_int) as usize;

        if let Some(node) = graph.get_node_mut(&args.node) {
            node.clear_attribute("start");
            node.clear_attribute("end");
        }

        (start_idx..end_idx).map(|i| args.perm[i]).collect()
    } else {
        args.perm.clone()
    };

    let trimmed = new_perm.len() != rank;
    let perm_const = graph.add_initializer_int64(vec![new_perm.len() as i64], new_perm);

    let gather = graph.add_node("Gather", vec![String::new(), perm_const], 1, "");
    if let Some(node) = graph.get_node_mut(&gather) {
        node.set_attribute_int("axis", 0);
    }
    graph.move_node_after(&gather, &args.node);

    graph.move_output(&args.node, 0, &gather, 0);
    let new_output = match graph.get_node(&args.node).and_then(|n| n.output.first()) {
        Some(out) => out.clone(),
        None => return true,
    };
    graph.update_node_input(&gather, 0, &new_output);

    let gather_out = single_output(graph, &gather);
    graph.copy_value_info(&gather_out, &new_output);
    if trimmed {
        // With start/end gone, the Shape node emits the full rank again
        graph.set_value_shape(&new_output, &[rank_int]);
    }
    true
}

enum PadsPlan {
    Attr(Vec<i64>),
    Constant { input: String, data: Vec<i64> },
    Gather { input: String },
}

/// Pad: reorder the per-dimension pads (all starts then all ends) by perm_inv
///
/// Below opset 11 the pads live in an attribute; from 11 they are input 1,
/// rewritten in place when constant or reordered with a Gather otherwise.
pub(crate) fn handle_pad(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let rank = args.perm.len();

    let plan = {
        let Some(node) = graph.get_node(&args.node) else {
            return false;
        };
        if args.ctx.opset < 11 {
            match node.get_attribute_ints("pads") {
                Some(pads) if pads.len() == rank * 2 => PadsPlan::Attr(pads.to_vec()),
                _ => return false,
            }
        } else {
            let Some(pads_input) = node.input.get(1).filter(|s| !s.is_empty()).cloned() else {
                return false;
            };
            match graph.get_constant(&pads_input) {
                Some(tensor) => match tensor_int64_data(tensor) {
                    Ok(data) if data.len() == rank * 2 => PadsPlan::Constant {
                        input: pads_input,
                        data,
                    },
                    _ => return false,
                },
                None => PadsPlan::Gather { input: pads_input },
            }
        }
    };

    if let PadsPlan::Attr(pads) = &plan {
        let new_pads = permute_pads(pads, &args.perm_inv);
        if let Some(node) = graph.get_node_mut(&args.node) {
            node.set_attribute_ints("pads", new_pads);
        }
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &args.perm);

    let pads_shape = vec![rank as i64 * 2];
    match plan {
        PadsPlan::Attr(_) => {}
        PadsPlan::Constant { input, data } => {
            let new_pads = permute_pads(&data, &args.perm_inv);
            let new_pads_const = graph.add_initializer_int64(pads_shape, new_pads);
            graph.update_node_input(&args.node, 1, &new_pads_const);
            if !graph.has_value_consumers(&input) {
                graph.remove_initializer(&input);
            }
        }
        PadsPlan::Gather { input } => {
            // Reorder the computed pads with indices [perm_inv, perm_inv + r]
            let mut gather_indices = args.perm_inv.clone();
            gather_indices.extend(args.perm_inv.iter().map(|&p| p + rank as i64));
            let indices_const = graph.add_initializer_int64(pads_shape, gather_indices);

            let gather = graph.add_node("Gather", vec![input.clone(), indices_const], 1, "");
            graph.move_node_before(&gather, &args.node);
            let gather_out = single_output(graph, &gather);
            graph.copy_value_info(&input, &gather_out);
            if let Some(node) = graph.get_node_mut(&gather) {
                node.set_attribute_int("axis", 0);
            }
            graph.update_node_input(&args.node, 1, &gather_out);
        }
    }
    true
}

/// Squeeze: axes sorted and remapped through the perm; output transpose uses
/// the squeezed perm
pub(crate) fn handle_squeeze(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };

    // Unset axes leave the output rank unknown; skip those (and invalid axes)
    let Some(mut axes) = read_from_attr_or_input(graph, args.ctx, &node, "axes", 1, 13) else {
        return false;
    };
    if !normalize_and_validate_axes(&mut axes, args.perm.len()) {
        return false;
    }

    let new_axes = sorted_axes_for_transposed_input(&axes, &args.perm);

    if args.ctx.opset < 13 {
        if let Some(node) = graph.get_node_mut(&args.node) {
            node.set_attribute_ints("axes", new_axes.clone());
        }
    } else {
        let Some(axes_input) = node.input.get(1).cloned() else {
            return false;
        };
        let new_axes_const =
            graph.add_initializer_int64(vec![new_axes.len() as i64], new_axes.clone());
        graph.update_node_input(&args.node, 1, &new_axes_const);
        if !graph.has_value_consumers(&axes_input) {
            graph.remove_initializer(&axes_input);
        }
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    let new_perm = squeeze_perm(&new_axes, &args.perm);
    transpose_outputs(graph, &args.node, &new_perm);
    true
}

/// Unsqueeze: axes stay unchanged; the output transpose uses the perm mapped
/// through the added 1-dims
pub(crate) fn handle_unsqueeze(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };

    let Some(mut axes) = read_from_attr_or_input(graph, args.ctx, &node, "axes", 1, 13) else {
        return false;
    };
    let total_len = args.perm.len() + axes.len();
    if !normalize_and_validate_axes(&mut axes, total_len) {
        return false;
    }

    help_handle_unsqueeze(graph, &args.node, &args.perm, &args.perm_inv, &axes);
    true
}

fn add_int_initializer_matching_dtype(
    graph: &mut GraphContext,
    values: Vec<i64>,
    dtype: DataType,
) -> String {
    let shape = vec![values.len() as i64];
    if dtype == DataType::Int32 {
        let values_int32 = values.into_iter().map(|v| v as i32).collect();
        graph.add_initializer_int32(shape, values_int32)
    } else {
        graph.add_initializer_int64(shape, values)
    }
}

/// Slice: remap the axes, preserving their order so they stay lined up with
/// starts/ends/steps
///
/// Below opset 10 the axes are an attribute. From 10 they are (optional)
/// input 3, int32 or int64: synthesized as perm[0..len(starts)) when absent,
/// rewritten at the same dtype when constant, rejected otherwise.
pub(crate) fn handle_slice(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let rank = args.perm.len();
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };

    if args.ctx.opset < 10 {
        let mut axes = match node.get_attribute_ints("axes") {
            Some(axes) => axes.to_vec(),
            // Axes default to [0, 1, ..., len(starts))
            None => match node.get_attribute_ints("starts") {
                Some(starts) => (0..starts.len() as i64).collect(),
                None => return false,
            },
        };
        if !normalize_and_validate_axes(&mut axes, rank) {
            return false;
        }

        let new_axes = axes_for_transposed_input(&axes, &args.perm);
        if let Some(node) = graph.get_node_mut(&args.node) {
            node.set_attribute_ints("axes", new_axes);
        }
        transpose_first_input(graph, &args.node, &args.perm_inv);
        transpose_outputs(graph, &args.node, &args.perm);
        return true;
    }

    // Inputs are data, starts, ends, [axes, steps]
    if node.input.len() < 4 || node.input[3].is_empty() {
        // Axes missing; synthesize from the length of starts
        let Some(starts_input) = node.input.get(1).filter(|s| !s.is_empty()) else {
            return false;
        };
        let dtype = graph
            .get_value_dtype(starts_input)
            .unwrap_or(DataType::Int64);
        let ndims = match graph.get_value_shape(starts_input) {
            Some(shape) if shape.len() == 1 && shape[0] >= 0 => shape[0] as usize,
            _ => return false,
        };
        if ndims > rank {
            return false;
        }

        let new_axes: Vec<i64> = args.perm[..ndims].to_vec();
        let new_axes_const = add_int_initializer_matching_dtype(graph, new_axes, dtype);
        graph.update_node_input(&args.node, 3, &new_axes_const);
    } else {
        let axes_input = node.input[3].clone();
        let Some(axes_const) = graph.get_constant(&axes_input) else {
            return false;
        };
        let dtype = axes_const.data_type_enum();
        let Ok(mut axes) = tensor_int_data(axes_const) else {
            return false;
        };
        if !normalize_and_validate_axes(&mut axes, rank) {
            return false;
        }

        // Leave the order unchanged to line up with starts/ends/steps
        let new_axes = axes_for_transposed_input(&axes, &args.perm);
        let new_axes_const = add_int_initializer_matching_dtype(graph, new_axes, dtype);
        graph.update_node_input(&args.node, 3, &new_axes_const);
        if !graph.has_value_consumers(&axes_input) {
            graph.remove_initializer(&axes_input);
        }
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &args.perm);
    true
}

/// Tile: reorder the repeats (input 1) by perm_inv, in place when constant
/// or with a Gather when computed
pub(crate) fn handle_tile(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let rank = args.perm.len();
    let perm_shape = vec![rank as i64];
    let Some(node) = graph.get_node(&args.node).cloned() else {
        return false;
    };
    let Some(repeats_input) = node.input.get(1).filter(|s| !s.is_empty()).cloned() else {
        return false;
    };

    if let Some(repeats_const) = graph.get_constant(&repeats_input) {
        let Ok(repeats) = tensor_int64_data(repeats_const) else {
            return false;
        };
        if repeats.len() != rank {
            return false;
        }
        let new_repeats: Vec<i64> = args
            .perm_inv
            .iter()
            .map(|&p| repeats[p as usize])
            .collect();
        let new_repeats_const = graph.add_initializer_int64(perm_shape, new_repeats);
        graph.update_node_input(&args.node, 1, &new_repeats_const);
        if !graph.has_value_consumers(&repeats_input) {
            graph.remove_initializer(&repeats_input);
        }
    } else {
        // Repeats are computed; reorder them with a Gather
        let perm_inv_const = graph.add_initializer_int64(perm_shape, args.perm_inv.clone());
        let gather = graph.add_node(
            "Gather",
            vec![repeats_input.clone(), perm_inv_const],
            1,
            "",
        );
        graph.move_node_before(&gather, &args.node);
        let gather_out = single_output(graph, &gather);
        graph.copy_value_info(&repeats_input, &gather_out);
        graph.update_node_input(&args.node, 1, &gather_out);
    }

    transpose_first_input(graph, &args.node, &args.perm_inv);
    transpose_outputs(graph, &args.node, &args.perm);
    true
}
