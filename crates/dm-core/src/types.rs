//! Common data types for DagMC

use serde::{Deserialize, Serialize};

/// Joint log-probability split into its likelihood and prior partitions.
///
/// The likelihood partition is the sum over clamped (observed) nodes, the prior
/// partition the sum over every other node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LnPartition {
    /// Sum over clamped nodes.
    pub likelihood: f64,
    /// Sum over all other nodes.
    pub prior: f64,
}

impl LnPartition {
    /// Create a partition from its two parts.
    pub fn new(likelihood: f64, prior: f64) -> Self {
        Self { likelihood, prior }
    }

    /// Unheated joint log-probability.
    pub fn total(&self) -> f64 {
        self.likelihood + self.prior
    }

    /// Tempered log-probability: `posterior_heat * (likelihood_heat * lnL + lnPrior)`.
    pub fn heated(&self, likelihood_heat: f64, posterior_heat: f64) -> f64 {
        posterior_heat * (likelihood_heat * self.likelihood + self.prior)
    }
}

/// Per-move acceptance statistics (the operator summary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveSummary {
    /// Proposal name, e.g. `"Slide"`.
    pub name: String,
    /// Names of the nodes the move operates on.
    pub nodes: Vec<String>,
    /// Relative call frequency.
    pub weight: f64,
    /// Times the move was tried since the last reset.
    pub tried: u64,
    /// Times the move was accepted since the last reset.
    pub accepted: u64,
    /// Tuning parameters, e.g. `lambda = 0.5`.
    pub parameters: String,
}

impl MoveSummary {
    /// Accepted / tried, or `0.0` when never tried.
    pub fn acceptance_ratio(&self) -> f64 {
        if self.tried == 0 { 0.0 } else { self.accepted as f64 / self.tried as f64 }
    }
}
