//! Multi-chain runner.

use crate::mcmc::{Mcmc, McmcConfig};
use crate::monitor::Monitor;
use crate::moves::Move;
use dm_core::{MoveSummary, Result};
use dm_graph::Model;
use serde::Serialize;

/// Outcome of one chain.
#[derive(Debug, Clone, Serialize)]
pub struct ChainResult {
    /// Position in the ensemble.
    pub chain_index: usize,
    /// Seed the chain's RNG was created from.
    pub seed: u64,
    /// Whether the chain wrote to its monitors.
    pub active: bool,
    /// Sampling generations completed.
    pub generations: u64,
    /// Joint log-probability of the final state.
    pub final_ln_probability: f64,
    /// Per-move acceptance statistics of the sampling phase.
    pub operator_summary: Vec<MoveSummary>,
}

/// Run independent chains in parallel via Rayon.
///
/// Each chain gets seed `config.seed + chain_index`. Chain 0 is the active
/// chain and the only one writing to monitors.
pub fn run_chains(
    template: &Model,
    moves: &[Move],
    monitors: &[Box<dyn Monitor>],
    config: &McmcConfig,
    n_chains: usize,
    burnin: u64,
    generations: u64,
) -> Result<Vec<ChainResult>> {
    use rayon::prelude::*;

    let results: Vec<Result<ChainResult>> = (0..n_chains)
        .into_par_iter()
        .map(|chain_index| {
            let seed = config.seed.wrapping_add(chain_index as u64);
            let chain_config = McmcConfig { seed, ..config.clone() };
            let mut mcmc = Mcmc::new(template, moves, monitors, chain_config)?;
            mcmc.set_chain_index(chain_index);
            mcmc.set_chain_active(chain_index == 0);
            mcmc.initialize_sampler()?;
            mcmc.burnin(burnin, config.tuning_interval)?;
            mcmc.reset();
            mcmc.run(generations)?;
            Ok(ChainResult {
                chain_index,
                seed,
                active: mcmc.is_chain_active(),
                generations: mcmc.generation(),
                final_ln_probability: mcmc.model_ln_probability()?,
                operator_summary: mcmc.operator_summary(),
            })
        })
        .collect();

    results.into_iter().collect()
}
