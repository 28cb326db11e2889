//! Transpose-of-transpose handler
//!
//! `args.transpose` is the first transpose, `args.node` the second. If the
//! permutations cancel, the pair is removed (preserving graph-output names
//! via an output move or an Identity); otherwise the second absorbs the
//! composition and reads the pre-transpose value directly.

use crate::graph::GraphContext;

use super::super::edits::single_output;
use super::super::perm::{compose_perm, get_perm_attr_if_valid};
use super::HandlerArgs;

pub(crate) fn handle_transpose(graph: &mut GraphContext, args: &HandlerArgs) -> bool {
    let node_perm = match graph.get_node(&args.node).and_then(get_perm_attr_if_valid) {
        Some(perm) => perm,
        None => return false,
    };

    // Input to the 1st transpose and output of the 2nd
    let Some(transpose_input) = graph
        .get_node(&args.transpose)
        .and_then(|n| n.input.first())
        .cloned()
    else {
        return false;
    };
    let Some(node_output) = graph
        .get_node(&args.node)
        .and_then(|n| n.output.first())
        .cloned()
    else {
        return false;
    };

    if args.perm_inv == node_perm {
        // The permutations cancel
        let consumers = graph.get_value_consumers(&node_output);
        if consumers.comprehensive {
            // Rewire consumers of the 2nd transpose to the pre-transpose value
            graph.replace_value_references(&consumers.nodes, &node_output, &transpose_input);
        } else {
            // The 2nd transpose is a graph output: its name must survive.
            // Try to move that name onto the producer of the pre-transpose
            // value.
            let inp_consumers = graph.get_value_consumers(&transpose_input);
            let inp_producer = graph.get_producer_name(&transpose_input).cloned();

            let moved = match (inp_producer, inp_consumers.comprehensive) {
                (Some(producer_name), true) => {
                    let slot = graph.get_node(&producer_name).and_then(|n| {
                        n.output.iter().position(|out| *out == transpose_input)
                    });
                    match slot {
                        Some(i) => {
                            graph.update_node_input(&args.node, 0, "");
                            graph.replace_value_references(
                                &inp_consumers.nodes,
                                &transpose_input,
                                &node_output,
                            );
                            graph.move_output(&args.node, 0, &producer_name, i)
                        }
                        None => false,
                    }
                }
                _ => false,
            };

            if !moved {
                // Both names are graph outputs computing the same value;
                // bridge them with an Identity
                let identity = graph.add_node("Identity", vec![String::new()], 1, "");
                graph.move_node_before(&identity, &args.node);
                graph.move_output(&args.node, 0, &identity, 0);
                graph.update_node_input(&identity, 0, &transpose_input);
            }
        }

        // In any case, the 2nd transpose goes away
        graph.remove_node(&args.node);
    } else {
        // Compose the permutations into the 2nd transpose and bypass the 1st
        let new_perm = compose_perm(&args.perm, &node_perm);
        if let Some(node) = graph.get_node_mut(&args.node) {
            node.set_attribute_ints("perm", new_perm);
        }
        graph.update_node_input(&args.node, 0, &transpose_input);
    }

    // The 2nd transpose no longer reads the 1st; drop the 1st if unused
    let transpose_out = single_output(graph, &args.transpose);
    if !transpose_out.is_empty() && !graph.has_value_consumers(&transpose_out) {
        graph.remove_node(&args.transpose);
    }
    true
}
