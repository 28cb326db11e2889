//! Graph manipulation module for ONNX models
//!
//! This module provides the core infrastructure for working with ONNX graphs:
//!
//! - [`GraphContext`]: Central structure for graph operations with O(1) lookups
//! - [`maps`]: Type definitions and builders for graph maps
//!
//! # Overview
//!
//! `GraphContext` is the mutation boundary for the optimizer: node edits,
//! output moves, value-info updates and initializer rewrites all go through
//! it, keeping the producer/consumer maps consistent and the node table in
//! topological order.
//!
//! # Example
//!
//! ```ignore
//! use onnx_layout_optimizer::graph::GraphContext;
//!
//! // Create context from a model
//! let mut ctx = GraphContext::from_model(&model)?;
//!
//! // Traverse the graph
//! let producer = ctx.get_node_producing_output("conv_out");
//! let consumers = ctx.get_value_consumers("conv_out");
//!
//! // Mutate it
//! let name = ctx.add_node("Transpose", vec!["conv_out".into()], 1, "");
//! ```
//!
//! # Maps
//!
//! The context maintains several maps for O(1) lookups:
//!
//! | Map | Description |
//! |-----|-------------|
//! | `node_map` | node_name → NodeProto (order preserved) |
//! | `producer_map` | output_name → producer node name |
//! | `consumer_map` | tensor_name → consumer node names |
//! | `initializer_map` | name → TensorProto |
//! | `value_info_map` | name → ValueInfoProto |

pub mod context;
pub mod maps;
pub mod mutators;

// Re-export main types
pub use context::GraphContext;
pub use maps::{ConsumerMap, InitializerMap, NodeMap, ProducerMap, ValueConsumers, ValueInfoMap};
