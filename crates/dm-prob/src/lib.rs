//! Probability building blocks for DagMC.
//!
//! Stochastic graph nodes treat these as opaque probability contributors:
//! - base distributions (log-density and sampling)
//! - the [`density::Density`] tag dispatching over them
//! - small numeric helpers (parameter checks, computability)

pub mod beta;
pub mod density;
pub mod exponential;
pub mod gamma;
pub mod math;
pub mod normal;
pub mod uniform;

pub use density::Density;
