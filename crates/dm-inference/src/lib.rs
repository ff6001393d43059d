//! # dm-inference
//!
//! Metropolis-Hastings MCMC over DagMC model graphs.
//!
//! This crate provides:
//! - proposals (slide, scale, vector-element slide) wrapped into tunable moves
//! - move schedules (weighted random, single random, sequential)
//! - the [`Mcmc`] chain driver with heated acceptance and monitors
//! - a Rayon multi-chain runner

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Acceptance counters and Metropolis step-size tuning.
pub mod adapt;
/// Multi-chain parallel runner.
pub mod chain;
/// The chain driver.
pub mod mcmc;
/// Monitors and the in-memory trace.
pub mod monitor;
/// Moves: proposal + weight + counters.
pub mod moves;
/// Perturbation operators.
pub mod proposal;
/// Move schedules.
pub mod schedule;

pub use chain::{ChainResult, run_chains};
pub use mcmc::{Mcmc, McmcConfig};
pub use monitor::{Monitor, Trace, TraceMonitor, TraceRow, TraceSink};
pub use moves::Move;
pub use proposal::{Proposal, ScaleProposal, SlideProposal, VectorElementSlideProposal};
pub use schedule::{MoveSchedule, ScheduleType};
