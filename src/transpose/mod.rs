//! Transpose elimination and layout transformation
//!
//! The optimizer pushes rank-permutation (Transpose) nodes past consumer
//! ops whenever the estimated number of transposed non-trivial dimensions
//! strictly decreases. Inverse pairs cancel, compatible runs compose, and
//! permutations fold into constant initializers. The layout pass wraps a
//! chosen op set in channel-order transposes and then lets the elimination
//! pass absorb them.
//!
//! # Example
//!
//! ```ignore
//! use onnx_layout_optimizer::graph::GraphContext;
//! use onnx_layout_optimizer::transpose::optimize;
//!
//! let mut graph = GraphContext::from_model(&model)?;
//! if optimize(&mut graph, false) {
//!     *model.graph_mut() = graph.export_graph();
//! }
//! ```

mod cost;
mod edits;
mod handlers;
mod layout;
mod optimize;
pub mod perm;

pub use layout::{
    channel_first_to_channel_last, channel_last_to_channel_first, LayoutHandler, LayoutHandlerMap,
    LayoutHandlerResult,
};
pub use optimize::optimize;

/// Settings shared by every handler invocation during one pass
#[derive(Debug, Clone, Copy)]
pub(crate) struct OptimizerCtx {
    /// Default-domain opset version of the graph
    pub opset: i64,
    /// Whether the contrib-domain handlers are active
    pub allow_extended_ops: bool,
    /// Push unconditionally wherever a handler exists
    pub skip_cost_check: bool,
}
