//! Optimization driver
//!
//! Walks nodes in topological order; whenever a node input comes from a
//! Transpose with a valid perm, the cost gate decides whether pushing it
//! through is beneficial and the op handler performs the local rewrite.

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::graph::GraphContext;
use crate::opset::{default_domain_opset, extended_ops_available, is_supported_opset};

use super::cost::{estimate_transpose_inputs_cost, estimate_value_rank};
use super::handlers::{get_handler, HandlerArgs};
use super::perm::{get_perm_attr_if_valid, invert_perm};
use super::OptimizerCtx;

/// Build the optimizer context, rejecting unsupported opset ranges
///
/// Extended ops are silently disabled unless the contrib domain is imported
/// at version 1.
pub(crate) fn make_optimizer_ctx(
    graph: &GraphContext,
    allow_extended_ops: bool,
) -> Option<OptimizerCtx> {
    let opset = default_domain_opset(graph)?;
    if !is_supported_opset(opset) {
        return None;
    }
    let allow_extended_ops = allow_extended_ops && extended_ops_available(graph);
    Some(OptimizerCtx {
        opset,
        allow_extended_ops,
        skip_cost_check: false,
    })
}

/// Find a handler for the node, estimate the push cost, and perform the
/// push when beneficial
pub(crate) fn process_transpose(
    graph: &mut GraphContext,
    ctx: OptimizerCtx,
    transpose_name: &str,
    node_name: &str,
    perm: &[i64],
    transpose_input_index: usize,
    outputs_leading_to_transpose: &FxHashSet<String>,
) -> bool {
    let Some(node) = graph.get_node(node_name).cloned() else {
        return false;
    };
    let Some(info) = get_handler(&node, ctx.allow_extended_ops) else {
        return false;
    };

    let input_indices = (info.transposible_inputs_fn)(graph, &node);
    if !input_indices.contains(&transpose_input_index) {
        // Transpose is not on an eligible input
        return false;
    }

    // Transpose and MaxPool are pushed whenever a handler is available:
    // composing transposes never loses, and the NHWC MaxPool variant is
    // faster when supported.
    if !ctx.skip_cost_check && !node.is_op("Transpose") && !node.is_op("MaxPool") {
        // The input cost must strictly decrease so the optimization is
        // stable; repeated runs must not toggle a transpose between two
        // inputs of a binary op.
        let mut cost = estimate_transpose_inputs_cost(graph, &node, perm, &input_indices);

        if cost < 0 && info.transposes_outputs {
            // If the output will be transposed and won't ultimately cancel,
            // factor that in. Multiple outputs are rare (Split) and their
            // total size tracks the largest input, so take the max rank.
            let mut has_output_leading_to_transpose = false;
            let mut out_cost = 0;
            for out in &node.output {
                out_cost = out_cost.max(estimate_value_rank(graph, out));
                if outputs_leading_to_transpose.contains(out) {
                    has_output_leading_to_transpose = true;
                }
            }
            if !has_output_leading_to_transpose {
                cost += out_cost;
            }
        }

        if cost >= 0 {
            return false;
        }
    }

    let args = HandlerArgs {
        ctx,
        transpose: transpose_name.to_string(),
        node: node_name.to_string(),
        perm: perm.to_vec(),
        perm_inv: invert_perm(perm),
        transposible_inputs: input_indices,
    };
    let pushed = (info.handler_fn)(graph, &args);
    if pushed {
        trace!(node = node_name, op = %node.op_type, "pushed transpose");
    }
    pushed
}

pub(crate) fn optimize_impl(graph: &mut GraphContext, ctx: OptimizerCtx) -> bool {
    let nodes = graph.node_names();

    // Reverse pass: find outputs with paths through supported ops to
    // transpose nodes. Pushes are steered toward these outputs, since the
    // resulting output transposes are expected to cancel there.
    let mut outputs_leading_to_transpose: FxHashSet<String> = FxHashSet::default();
    for name in nodes.iter().rev() {
        let Some(node) = graph.get_node(name) else {
            continue;
        };
        if node.is_op("Transpose") {
            if let Some(input) = node.input.first() {
                if !input.is_empty() {
                    outputs_leading_to_transpose.insert(input.clone());
                }
            }
            continue;
        }

        if node
            .output
            .iter()
            .any(|out| outputs_leading_to_transpose.contains(out))
        {
            if let Some(info) = get_handler(node, ctx.allow_extended_ops) {
                // Only ops that produce transposed outputs extend a path
                if info.transposes_outputs {
                    for j in (info.transposible_inputs_fn)(graph, node) {
                        if let Some(input) = node.input.get(j) {
                            if !input.is_empty() {
                                outputs_leading_to_transpose.insert(input.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    // Forward pass over the snapshot. Nodes are modified during iteration
    // but never deleted before the loop reaches them; new nodes are not
    // visited this pass.
    let mut changed = false;
    for name in &nodes {
        let Some(inputs) = graph.get_node(name).map(|n| n.input.clone()) else {
            continue;
        };
        for (j, input) in inputs.iter().enumerate() {
            if input.is_empty() {
                continue;
            }
            let Some(producer) = graph.get_node_producing_output(input) else {
                continue;
            };
            if !producer.is_op("Transpose") {
                continue;
            }
            let producer_name = producer.name.clone();
            let Some(perm) = get_perm_attr_if_valid(producer) else {
                continue;
            };

            if process_transpose(
                graph,
                ctx,
                &producer_name,
                name,
                &perm,
                j,
                &outputs_leading_to_transpose,
            ) {
                changed = true;
                // Remaining inputs may have shifted and the node may be gone
                break;
            }
        }
    }

    debug!(changed, nodes = nodes.len(), "transpose elimination pass");
    changed
}

/// Push transposes through the graph wherever the rank heuristic predicts a
/// net win; cancel and compose pairs along the way.
///
/// Returns whether anything changed. Unsupported opset ranges are rejected
/// (returning false); `allow_extended_ops` enables the contrib-domain
/// handlers when the graph imports that domain at version 1.
pub fn optimize(graph: &mut GraphContext, allow_extended_ops: bool) -> bool {
    let Some(ctx) = make_optimizer_ctx(graph, allow_extended_ops) else {
        return false;
    };
    optimize_impl(graph, ctx)
}

#[cfg(test)]
pub(crate) fn optimize_skipping_cost_check(graph: &mut GraphContext, allow_extended_ops: bool) -> bool {
    let Some(mut ctx) = make_optimizer_ctx(graph, allow_extended_ops) else {
        return false;
    };
    ctx.skip_cost_check = true;
    optimize_impl(graph, ctx)
}
