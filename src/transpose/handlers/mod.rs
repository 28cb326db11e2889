//! Op-specific push rules
//!
//! A handler is called on a node that has a Transpose producing one of its
//! eligible inputs, after the cost gate has decided the push is beneficial.
//! Handlers return false if and only if no mutation occurred, do all
//! feasibility checks before mutating, and leave value info current.
//!
//! Things to watch when adding a handler:
//! - Ops have multiple opset versions; check `args.ctx.opset` against the
//!   version that changed the signature.
//! - Optional inputs arrive as empty strings and attributes as `None`.
//! - The registry's eligibility function is authoritative for which input
//!   slots a transpose may be pushed through.

mod quant;
mod reduce;
mod shuffle;
mod simple;
mod transpose;

use crate::graph::GraphContext;
use crate::opset::EXTENDED_DOMAIN;
use crate::proto::NodeProto;

use super::OptimizerCtx;

/// Everything a handler needs: the transpose being pushed, the node it is
/// pushed through, both permutations, and the cached eligible input set.
pub(crate) struct HandlerArgs {
    pub ctx: OptimizerCtx,
    /// Name of the Transpose node above the input
    pub transpose: String,
    /// Name of the node the transpose is pushed through
    pub node: String,
    pub perm: Vec<i64>,
    pub perm_inv: Vec<i64>,
    /// Cached result of the registry's eligibility function
    pub transposible_inputs: Vec<usize>,
}

/// Determines which input indices are eligible for pushing. Static for most
/// ops, dynamic for Concat/QLinearConcat and the broadcast set.
pub(crate) type TransposibleInputsFn = fn(&GraphContext, &NodeProto) -> Vec<usize>;

/// Performs the push. Returns false iff the graph was not modified.
pub(crate) type HandlerFn = fn(&mut GraphContext, &HandlerArgs) -> bool;

/// Registry record for one op family
pub(crate) struct HandlerInfo {
    pub transposible_inputs_fn: TransposibleInputsFn,
    pub handler_fn: HandlerFn,
    /// Whether the handler inserts transposes on the outputs; used by the
    /// cost estimator and the reverse marking pass.
    pub transposes_outputs: bool,
}

// ============================================================================
// Eligibility functions
// ============================================================================

fn all_inputs(_graph: &GraphContext, node: &NodeProto) -> Vec<usize> {
    (0..node.input.len()).collect()
}

fn first_input(_graph: &GraphContext, _node: &NodeProto) -> Vec<usize> {
    vec![0]
}

fn non_scalar_inputs(graph: &GraphContext, node: &NodeProto) -> Vec<usize> {
    node.input
        .iter()
        .enumerate()
        .filter(|(_, input)| {
            !input.is_empty()
                && graph
                    .get_value_shape(input)
                    .map_or(true, |shape| !shape.is_empty())
        })
        .map(|(i, _)| i)
        .collect()
}

fn qlinear_concat_inputs(_graph: &GraphContext, node: &NodeProto) -> Vec<usize> {
    // Inputs are [Y_scale, Y_zero_point, tensor, scale, zero_point, ...]:
    // every third input from index 2 is a data tensor.
    (2..node.input.len()).step_by(3).collect()
}

fn qlinear_binary_inputs(_graph: &GraphContext, _node: &NodeProto) -> Vec<usize> {
    // Inputs are [A, A_scale, A_zero_point, B, B_scale, B_zero_point,
    // C_scale, C_zero_point]; the data tensors are A and B.
    vec![0, 3]
}

// ============================================================================
// Registry
// ============================================================================

static SIMPLE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: all_inputs,
    handler_fn: simple::handle_simple_node,
    transposes_outputs: true,
};

static BROADCAST: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: non_scalar_inputs,
    handler_fn: simple::handle_simple_node_broadcast,
    transposes_outputs: true,
};

static FIRST_INPUT_SIMPLE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: simple::handle_simple_node,
    transposes_outputs: true,
};

static SPLIT: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: simple::handle_split,
    transposes_outputs: true,
};

static CONCAT: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: all_inputs,
    handler_fn: simple::handle_concat,
    transposes_outputs: true,
};

static SOFT_HARD_MAX: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: simple::handle_soft_hard_max,
    transposes_outputs: true,
};

static SHAPE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_shape,
    transposes_outputs: false,
};

static PAD: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_pad,
    transposes_outputs: true,
};

static REDUCE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: reduce::handle_reduce_op,
    transposes_outputs: true,
};

static REDUCE_SUM: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: reduce::handle_reduce_sum,
    transposes_outputs: true,
};

static ARG_MIN_MAX: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: quant::handle_arg_min_max,
    transposes_outputs: true,
};

static SQUEEZE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_squeeze,
    transposes_outputs: true,
};

static UNSQUEEZE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_unsqueeze,
    transposes_outputs: true,
};

static SLICE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_slice,
    transposes_outputs: true,
};

static TILE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: shuffle::handle_tile,
    transposes_outputs: true,
};

static TRANSPOSE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: transpose::handle_transpose,
    transposes_outputs: false,
};

static QUANTIZE_DEQUANTIZE: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: quant::handle_quantize_dequantize_linear,
    transposes_outputs: true,
};

static QLINEAR_CONCAT: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: qlinear_concat_inputs,
    handler_fn: simple::handle_concat,
    transposes_outputs: true,
};

static QLINEAR_BINARY: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: qlinear_binary_inputs,
    handler_fn: simple::handle_simple_node_broadcast,
    transposes_outputs: true,
};

static QLINEAR_POOL: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: quant::handle_qlinear_pool_op,
    transposes_outputs: true,
};

static MAX_POOL: HandlerInfo = HandlerInfo {
    transposible_inputs_fn: first_input,
    handler_fn: quant::handle_max_pool,
    transposes_outputs: true,
};

fn base_handler(op_type: &str) -> Option<&'static HandlerInfo> {
    Some(match op_type {
        "Cast" | "Exp" | "Identity" | "LeakyRelu" | "Log" | "Reciprocal" | "Relu" | "Sigmoid"
        | "Sqrt" | "Tanh" | "Abs" | "Not" | "Ceil" | "Floor" | "Neg" | "Erf" | "HardSigmoid"
        | "Round" | "IsInf" | "IsNaN" | "Selu" | "Shrink" | "Sign" | "Softplus" | "Softsign"
        | "ThresholdedRelu" | "Celu" | "HardSwish" | "Sin" | "Cos" | "Tan" | "Sinh" | "Cosh"
        | "Asin" | "Acos" | "Atan" | "Asinh" | "Acosh" | "Atanh" => &SIMPLE,

        "Add" | "Max" | "Min" | "Mul" | "Sub" | "Div" | "And" | "Or" | "Xor" | "Mod" | "PRelu"
        | "BitShift" | "Equal" | "Greater" | "Less" | "GreaterOrEqual" | "LessOrEqual" | "Mean"
        | "Sum" | "Pow" | "Where" => &BROADCAST,

        "Clip" | "CastLike" => &FIRST_INPUT_SIMPLE,

        "Transpose" => &TRANSPOSE,
        "Concat" => &CONCAT,
        "Split" => &SPLIT,
        "Shape" => &SHAPE,
        "Pad" => &PAD,
        "ReduceSum" => &REDUCE_SUM,

        "ReduceLogSum" | "ReduceLogSumExp" | "ReduceMax" | "ReduceMean" | "ReduceMin"
        | "ReduceProd" | "ReduceSumSquare" | "ReduceL1" | "ReduceL2" => &REDUCE,

        "ArgMin" | "ArgMax" => &ARG_MIN_MAX,

        "Squeeze" => &SQUEEZE,
        "Unsqueeze" => &UNSQUEEZE,
        "Slice" => &SLICE,
        "Tile" => &TILE,

        "Softmax" | "Hardmax" | "LogSoftmax" => &SOFT_HARD_MAX,

        "QuantizeLinear" | "DequantizeLinear" => &QUANTIZE_DEQUANTIZE,

        _ => return None,
    })
}

fn extended_base_handler(op_type: &str) -> Option<&'static HandlerInfo> {
    // Default-domain ops whose rewrite targets a contrib op
    match op_type {
        "MaxPool" => Some(&MAX_POOL),
        _ => None,
    }
}

fn contrib_handler(op_type: &str) -> Option<&'static HandlerInfo> {
    Some(match op_type {
        "QLinearReduceMean" => &REDUCE,
        "QLinearSigmoid" | "QLinearLeakyRelu" => &FIRST_INPUT_SIMPLE,
        "QLinearConcat" => &QLINEAR_CONCAT,
        "QLinearAdd" | "QLinearMul" => &QLINEAR_BINARY,
        "QLinearAveragePool" | "QLinearGlobalAveragePool" => &QLINEAR_POOL,
        _ => return None,
    })
}

/// Resolve the handler for a node, if any
///
/// The empty domain and "ai.onnx" are equivalent; contrib ops and the
/// MaxPool rewrite are only reachable with extended ops enabled.
pub(crate) fn get_handler(node: &NodeProto, allow_extended_ops: bool) -> Option<&'static HandlerInfo> {
    match node.domain.as_str() {
        "" | "ai.onnx" => base_handler(&node.op_type).or_else(|| {
            if allow_extended_ops {
                extended_base_handler(&node.op_type)
            } else {
                None
            }
        }),
        domain if domain == EXTENDED_DOMAIN && allow_extended_ops => {
            contrib_handler(&node.op_type)
        }
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::extensions::{make_node, make_tensor_value_info};
    use crate::proto::GraphProto;

    #[test]
    fn test_base_lookup() {
        let relu = make_node("Relu", &["x"], &["y"], "relu_0");
        assert!(get_handler(&relu, false).is_some());

        let mut aliased = relu.clone();
        aliased.domain = "ai.onnx".to_string();
        assert!(get_handler(&aliased, false).is_some());

        let unknown = make_node("Conv", &["x", "w"], &["y"], "conv_0");
        assert!(get_handler(&unknown, true).is_none());
    }

    #[test]
    fn test_maxpool_requires_extended() {
        let pool = make_node("MaxPool", &["x"], &["y"], "pool_0");
        assert!(get_handler(&pool, false).is_none());
        assert!(get_handler(&pool, true).is_some());
    }

    #[test]
    fn test_contrib_requires_extended() {
        let mut qadd = make_node("QLinearAdd", &["a"], &["y"], "qadd_0");
        qadd.domain = EXTENDED_DOMAIN.to_string();
        assert!(get_handler(&qadd, false).is_none());
        assert!(get_handler(&qadd, true).is_some());

        let mut foreign = qadd.clone();
        foreign.domain = "com.example".to_string();
        assert!(get_handler(&foreign, true).is_none());
    }

    #[test]
    fn test_eligibility_sets() {
        let graph = GraphContext::new(&GraphProto {
            input: vec![
                make_tensor_value_info("a", 1, &[2, 3]),
                make_tensor_value_info("s", 1, &[]),
            ],
            ..Default::default()
        });

        let add = make_node("Add", &["a", "s"], &["y"], "add_0");
        // Scalars are excluded from the broadcast set
        assert_eq!(non_scalar_inputs(&graph, &add), vec![0]);

        let mystery = make_node("Add", &["a", "u"], &["y"], "add_1");
        // Unknown shapes stay eligible; rank normalization rejects them later
        assert_eq!(non_scalar_inputs(&graph, &mystery), vec![0, 1]);

        let qconcat = make_node(
            "QLinearConcat",
            &["ys", "yzp", "t0", "s0", "zp0", "t1", "s1", "zp1"],
            &["y"],
            "qc_0",
        );
        assert_eq!(qlinear_concat_inputs(&graph, &qconcat), vec![2, 5]);

        assert_eq!(qlinear_binary_inputs(&graph, &qconcat), vec![0, 3]);
        assert_eq!(all_inputs(&graph, &qconcat).len(), 8);
        assert_eq!(first_input(&graph, &qconcat), vec![0]);
    }
}
