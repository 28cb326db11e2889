//! # ONNX Layout Optimizer
//!
//! Transpose elimination and NCHW/NHWC layout transformation for ONNX
//! computation graphs.
//!
//! The core pass pushes explicit Transpose nodes past their consumers
//! whenever the estimated number of transposed non-trivial dimensions
//! strictly decreases: inverse pairs cancel, compatible runs compose, and
//! permutations fold into constant initializers. A companion layout pass
//! wraps a configurable op set in channel-order transposes and reruns the
//! elimination pass so the wrappers are absorbed into neighboring ops.
//!
//! ## Example
//!
//! ```ignore
//! use onnx_layout_optimizer::prelude::*;
//!
//! let mut model = load_model("model.onnx")?;
//! let mut graph = GraphContext::from_model(&model)?;
//! if optimize(&mut graph, false) {
//!     *model.graph_mut() = graph.export_graph();
//!     save_model("model.opt.onnx", &model)?;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod graph;
pub mod io;
pub mod opset;
pub mod proto;
pub mod tensor;
pub mod transpose;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use onnx_layout_optimizer::prelude::*`
pub mod prelude {
    pub use crate::error::{OnnxResult, TransformError};
    pub use crate::graph::GraphContext;
    pub use crate::io::{load_model, load_model_from_bytes, model_to_bytes, save_model};
    pub use crate::opset::{MAX_SUPPORTED_OPSET, MIN_SUPPORTED_OPSET};
    pub use crate::proto::onnx::*;
    pub use crate::transpose::{
        channel_first_to_channel_last, channel_last_to_channel_first, optimize, LayoutHandler,
        LayoutHandlerMap, LayoutHandlerResult,
    };
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{OnnxResult, TransformError};
pub use graph::GraphContext;
pub use transpose::{
    channel_first_to_channel_last, channel_last_to_channel_first, optimize, LayoutHandler,
    LayoutHandlerMap, LayoutHandlerResult,
};

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_supported_opset_range() {
        assert!(opset::MIN_SUPPORTED_OPSET <= opset::MAX_SUPPORTED_OPSET);
    }
}
