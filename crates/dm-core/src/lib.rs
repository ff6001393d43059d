//! # dm-core
//!
//! Shared error and summary types for DagMC.
//!
//! Every other crate in the workspace reports failures through [`Error`] and
//! exchanges log-probability partitions and move statistics through the types
//! defined here.

#![warn(missing_docs)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{LnPartition, MoveSummary};
