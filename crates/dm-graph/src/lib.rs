//! # dm-graph
//!
//! The model graph for DagMC.
//!
//! A [`Model`] owns an arena of [`DagNode`]s: constants, stochastic nodes
//! (random variables, possibly clamped to data) and deterministic nodes.
//! Edges are [`NodeId`] indices, which keeps deep copies and subgraph
//! extraction a matter of remapping integers.
//!
//! The sampling protocol lives on the model:
//! - `touch` / `set_value` mark a node and its descendants dirty
//! - `ln_probability` recomputes dirty caches
//! - `keep` commits and `restore` rolls back to the pre-touch baseline

pub mod builder;
pub mod function;
pub mod model;
pub mod node;
pub mod value;

pub use builder::ModelBuilder;
pub use function::Function;
pub use model::Model;
pub use node::{DagNode, Freshness, NodeId, NodeKind};
pub use value::Value;
