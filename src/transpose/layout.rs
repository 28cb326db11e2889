//! Layout transformation
//!
//! Wraps a configurable set of ops in channel-order transposes (optionally
//! swapping the op for a layout-specific variant), then runs the
//! elimination pass so the wrappers are absorbed into neighboring ops.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::graph::GraphContext;
use crate::proto::NodeProto;

use super::edits::{transpose_first_input, transpose_outputs};
use super::optimize::{make_optimizer_ctx, optimize_impl};
use super::perm::{channel_last_to_first_perm, invert_perm};

/// A layout handler's verdict for one node
#[derive(Debug, Clone, Default)]
pub struct LayoutHandlerResult {
    /// Whether this node's layout should change
    pub should_change_layout: bool,
    /// Replacement op type, if the layout variant is a different op
    pub new_op_type: Option<String>,
    /// Replacement domain, if the layout variant lives elsewhere
    pub new_domain: Option<String>,
    /// Rank of the data tensor; determines the wrapping permutation
    pub rank: usize,
}

/// Per-op decision function for layout changes
pub type LayoutHandler = fn(&GraphContext, &NodeProto) -> LayoutHandlerResult;

/// Maps op types to their layout handlers
pub type LayoutHandlerMap = FxHashMap<String, LayoutHandler>;

fn change_layout(
    graph: &mut GraphContext,
    layout_handler_map: &LayoutHandlerMap,
    last_to_first: bool,
    allow_extended_ops: bool,
) -> bool {
    let Some(ctx) = make_optimizer_ctx(graph, allow_extended_ops) else {
        return false;
    };

    let nodes = graph.node_names();
    let mut changed = false;

    for name in &nodes {
        let Some(node) = graph.get_node(name).cloned() else {
            continue;
        };
        let Some(handler) = layout_handler_map.get(&node.op_type) else {
            continue;
        };

        let result = handler(graph, &node);
        if !result.should_change_layout {
            continue;
        }

        let mut target = name.clone();
        if result.new_op_type.is_some() || result.new_domain.is_some() {
            // The layout variant is a different op; build the replacement
            // with the same inputs, outputs and attributes.
            let new_op_type = result.new_op_type.as_deref().unwrap_or(&node.op_type);
            let new_domain = result.new_domain.as_deref().unwrap_or(&node.domain);

            let new_name =
                graph.add_node(new_op_type, node.input.clone(), node.output.len(), new_domain);
            graph.move_node_before(&new_name, name);
            for j in 0..node.output.len() {
                if !node.output[j].is_empty() {
                    graph.move_output(name, j, &new_name, j);
                }
            }
            if let Some(new_node) = graph.get_node_mut(&new_name) {
                new_node.copy_attributes_from(&node);
            }
            graph.remove_node(name);
            target = new_name;
        }

        let mut perm = channel_last_to_first_perm(result.rank);
        let mut perm_inv = invert_perm(&perm);
        if last_to_first {
            std::mem::swap(&mut perm, &mut perm_inv);
        }

        // [Op] becomes [Transpose -> Op' -> Transpose] with identical
        // behavior; the elimination pass then absorbs the wrappers.
        transpose_first_input(graph, &target, &perm_inv);
        transpose_outputs(graph, &target, &perm);
        changed = true;
    }

    debug!(changed, last_to_first, "layout change pass");
    if changed {
        optimize_impl(graph, ctx);
    }
    changed
}

/// Rewrite the selected ops from channel-last to channel-first layout, then
/// run transpose elimination
pub fn channel_last_to_channel_first(
    graph: &mut GraphContext,
    layout_handler_map: &LayoutHandlerMap,
    allow_extended_ops: bool,
) -> bool {
    change_layout(graph, layout_handler_map, true, allow_extended_ops)
}

/// Rewrite the selected ops from channel-first to channel-last layout, then
/// run transpose elimination
pub fn channel_first_to_channel_last(
    graph: &mut GraphContext,
    layout_handler_map: &LayoutHandlerMap,
    allow_extended_ops: bool,
) -> bool {
    change_layout(graph, layout_handler_map, false, allow_extended_ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::{GraphProto, OperatorSetIdProto};

    fn with_opset(graph: GraphProto, opset: i64) -> GraphContext {
        let model = crate::proto::ModelProto {
            graph: Some(graph),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            ..Default::default()
        };
        GraphContext::from_model(&model).unwrap()
    }

    fn rank4_layout_handler(graph: &GraphContext, node: &NodeProto) -> LayoutHandlerResult {
        let rank = node
            .input
            .first()
            .and_then(|input| graph.get_value_shape(input))
            .map_or(0, |shape| shape.len());
        LayoutHandlerResult {
            should_change_layout: rank == 4,
            new_op_type: None,
            new_domain: None,
            rank,
        }
    }

    fn renaming_layout_handler(_graph: &GraphContext, _node: &NodeProto) -> LayoutHandlerResult {
        LayoutHandlerResult {
            should_change_layout: true,
            new_op_type: Some("NhwcConv".to_string()),
            new_domain: Some("com.microsoft".to_string()),
            rank: 4,
        }
    }

    #[test]
    fn test_layout_wraps_node_in_transposes() {
        let mut map: LayoutHandlerMap = FxHashMap::default();
        map.insert("Conv".to_string(), rank4_layout_handler);

        let mut graph = with_opset(
            GraphProto {
                node: vec![make_node("Conv", &["X", "W"], &["Y"], "conv_0")],
                input: vec![make_tensor_value_info("X", 1, &[1, 3, 8, 8])],
                output: vec![make_tensor_value_info("Y", 1, &[1, 16, 8, 8])],
                initializer: vec![crate::tensor::make_int64_tensor(
                    "W",
                    vec![16, 3, 1, 1],
                    vec![0; 48],
                )],
                ..Default::default()
            },
            13,
        );

        assert!(channel_first_to_channel_last(&mut graph, &map, false));

        // Conv has no push handler, so the wrapping transposes stay:
        // X -> Transpose(perm_inv) -> Conv -> Transpose(perm) -> Y
        let conv = graph.get_node("conv_0").unwrap();
        let pre = graph.get_node_producing_output(&conv.input[0]).unwrap();
        assert!(pre.is_op("Transpose"));
        // first-to-last: the input is wrapped with the inverse of
        // channel-last-to-first = [0, 2, 3, 1]
        assert_eq!(pre.get_attribute_ints("perm"), Some(&[0, 2, 3, 1][..]));
        assert_eq!(pre.input[0], "X");

        let post = graph.get_node_producing_output("Y").unwrap();
        assert!(post.is_op("Transpose"));
        assert_eq!(post.get_attribute_ints("perm"), Some(&[0, 3, 1, 2][..]));

        // Input shape info flows through the wrappers
        assert_eq!(
            graph.get_value_shape(&conv.input[0]),
            Some(vec![1, 8, 8, 3])
        );
    }

    #[test]
    fn test_layout_skips_when_handler_declines() {
        let mut map: LayoutHandlerMap = FxHashMap::default();
        map.insert("Conv".to_string(), rank4_layout_handler);

        let mut graph = with_opset(
            GraphProto {
                // Rank-3 input: the handler declines
                node: vec![make_node("Conv", &["X", "W"], &["Y"], "conv_0")],
                input: vec![make_tensor_value_info("X", 1, &[1, 3, 8])],
                output: vec![make_tensor_value_info("Y", 1, &[1, 16, 8])],
                ..Default::default()
            },
            13,
        );

        assert!(!channel_first_to_channel_last(&mut graph, &map, false));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_layout_replaces_op_type_and_domain() {
        let mut map: LayoutHandlerMap = FxHashMap::default();
        map.insert("Conv".to_string(), renaming_layout_handler);

        let mut graph = with_opset(
            GraphProto {
                node: vec![make_node("Conv", &["X", "W"], &["Y"], "conv_0")],
                input: vec![make_tensor_value_info("X", 1, &[1, 3, 8, 8])],
                output: vec![make_tensor_value_info("Y", 1, &[1, 16, 8, 8])],
                initializer: vec![crate::tensor::make_int64_tensor(
                    "W",
                    vec![16, 3, 1, 1],
                    vec![0; 48],
                )],
                ..Default::default()
            },
            13,
        );

        assert!(channel_first_to_channel_last(&mut graph, &map, false));

        assert!(!graph.has_node("conv_0"));
        let post = graph.get_node_producing_output("Y").unwrap();
        assert!(post.is_op("Transpose"));
        let replaced = graph.get_node_producing_output(&post.input[0]).unwrap();
        assert_eq!(replaced.op_type, "NhwcConv");
        assert_eq!(replaced.domain, "com.microsoft");
    }

    #[test]
    fn test_back_to_back_layout_wrappers_cancel() {
        // Two wrapped ops in a row: the inner transposes cancel during the
        // trailing optimize pass, leaving one pre- and one post-transpose.
        let mut map: LayoutHandlerMap = FxHashMap::default();
        map.insert("Conv".to_string(), rank4_layout_handler);

        let mut graph = with_opset(
            GraphProto {
                node: vec![
                    make_node("Conv", &["X", "W"], &["mid"], "conv_0"),
                    make_node("Conv", &["mid", "W"], &["Y"], "conv_1"),
                ],
                input: vec![make_tensor_value_info("X", 1, &[1, 3, 8, 8])],
                output: vec![make_tensor_value_info("Y", 1, &[1, 3, 8, 8])],
                value_info: vec![make_tensor_value_info("mid", 1, &[1, 3, 8, 8])],
                initializer: vec![crate::tensor::make_int64_tensor(
                    "W",
                    vec![3, 3, 1, 1],
                    vec![0; 9],
                )],
                ..Default::default()
            },
            13,
        );

        assert!(channel_first_to_channel_last(&mut graph, &map, false));

        // Transposes remaining: one above conv_0, one below conv_1. The
        // pair between them cancels.
        let transpose_count = graph
            .nodes()
            .filter(|node| node.is_op("Transpose"))
            .count();
        assert_eq!(transpose_count, 2);
        assert_eq!(graph.node_count(), 4);

        let conv_1 = graph.get_node("conv_1").unwrap();
        let between = graph.get_node_producing_output(&conv_1.input[0]).unwrap();
        assert!(between.is_op("Conv"), "inner transposes should cancel");
    }
}
