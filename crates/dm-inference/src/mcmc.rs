//! Metropolis-Hastings chain driver.
//!
//! A chain owns a private clone of the model, moves rebound onto that clone,
//! its monitors and its RNG. Nothing is shared with other chains except a
//! monitor's output sink.
//!
//! ## Lifecycle
//!
//! 1. [`Mcmc::new`] clones the template model and rebinds moves and monitors by node name.
//! 2. [`Mcmc::initialize_sampler`] searches a computable starting state
//!    (redrawing unclamped stochastic nodes on failure) and builds the schedule.
//! 3. [`Mcmc::burnin`] / [`Mcmc::run`] call [`Mcmc::next_cycle`] repeatedly.

use crate::monitor::Monitor;
use crate::moves::Move;
use crate::schedule::{MoveSchedule, ScheduleType};
use dm_core::{Error, LnPartition, MoveSummary, Result};
use dm_graph::{Model, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Largest allowed gap between the incrementally maintained joint
/// log-probability and a full recompute.
pub const CONSISTENCY_TOLERANCE: f64 = 1e-8;

/// Chain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct McmcConfig {
    /// Move schedule variant.
    pub schedule: ScheduleType,
    /// Attempts at finding a computable starting state.
    pub max_init_attempts: usize,
    /// RNG seed.
    pub seed: u64,
    /// Ignore clamped nodes (sample from the prior).
    pub prior_only: bool,
    /// After every proposal, compare the incremental joint against a full recompute.
    pub check_consistency: bool,
    /// Generations between tuning steps during burn-in (0 disables tuning).
    pub tuning_interval: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleType::Random,
            max_init_attempts: 100,
            seed: 42,
            prior_only: false,
            check_consistency: false,
            tuning_interval: 100,
        }
    }
}

/// A single Metropolis-Hastings chain.
#[derive(Debug)]
pub struct Mcmc {
    model: Model,
    moves: Vec<Move>,
    monitors: Vec<Box<dyn Monitor>>,
    schedule: Option<Box<dyn MoveSchedule>>,
    schedule_type: ScheduleType,
    config: McmcConfig,
    rng: StdRng,
    generation: u64,
    chain_active: bool,
    chain_index: usize,
    likelihood_heat: f64,
    posterior_heat: f64,
    consistency_mismatches: u64,
}

impl Mcmc {
    /// Build a chain over a private clone of `template`.
    ///
    /// Moves and monitors are bound to nodes of `template`; their clones are
    /// rebound onto the chain's model by node name.
    pub fn new(
        template: &Model,
        moves: &[Move],
        monitors: &[Box<dyn Monitor>],
        config: McmcConfig,
    ) -> Result<Self> {
        let mut model = template.try_clone()?;
        model.set_prior_only(config.prior_only)?;
        let (moves, monitors) = replace_dag(template, &model, moves, monitors)?;
        Ok(Self {
            model,
            moves,
            monitors,
            schedule: None,
            schedule_type: config.schedule,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            generation: 0,
            chain_active: true,
            chain_index: 0,
            likelihood_heat: 1.0,
            posterior_heat: 1.0,
            consistency_mismatches: 0,
        })
    }

    /// Independent copy with its own model clone, rebound moves and monitors
    /// and an identical RNG state.
    pub fn try_clone(&self) -> Result<Self> {
        let model = self.model.try_clone()?;
        let (moves, monitors) = replace_dag(&self.model, &model, &self.moves, &self.monitors)?;
        let schedule = self.schedule.as_ref().map(|_| self.schedule_type.build(&moves));
        Ok(Self {
            model,
            moves,
            monitors,
            schedule,
            schedule_type: self.schedule_type,
            config: self.config.clone(),
            rng: self.rng.clone(),
            generation: self.generation,
            chain_active: self.chain_active,
            chain_index: self.chain_index,
            likelihood_heat: self.likelihood_heat,
            posterior_heat: self.posterior_heat,
            consistency_mismatches: 0,
        })
    }

    // ----------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------

    /// The chain's model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The chain's moves.
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    /// The chain's monitors.
    pub fn monitors(&self) -> &[Box<dyn Monitor>] {
        &self.monitors
    }

    /// Settings the chain was built with.
    pub fn config(&self) -> &McmcConfig {
        &self.config
    }

    /// Completed sampling generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the sampler has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.schedule.is_some()
    }

    /// Whether this chain writes to its monitors.
    pub fn is_chain_active(&self) -> bool {
        self.chain_active
    }

    /// Only the active chain of an ensemble writes to monitors.
    pub fn set_chain_active(&mut self, active: bool) {
        self.chain_active = active;
    }

    /// Position in an ensemble.
    pub fn chain_index(&self) -> usize {
        self.chain_index
    }

    /// Set the position in an ensemble.
    pub fn set_chain_index(&mut self, index: usize) {
        self.chain_index = index;
    }

    /// Exponent on the likelihood partition.
    pub fn likelihood_heat(&self) -> f64 {
        self.likelihood_heat
    }

    /// Set the exponent on the likelihood partition.
    pub fn set_likelihood_heat(&mut self, heat: f64) {
        self.likelihood_heat = heat;
    }

    /// Exponent on the whole posterior.
    pub fn posterior_heat(&self) -> f64 {
        self.posterior_heat
    }

    /// Set the exponent on the whole posterior.
    pub fn set_posterior_heat(&mut self, heat: f64) {
        self.posterior_heat = heat;
    }

    /// Current schedule variant.
    pub fn schedule_type(&self) -> ScheduleType {
        self.schedule_type
    }

    /// Change the schedule variant. An initialized chain switches immediately.
    pub fn set_schedule_type(&mut self, schedule_type: ScheduleType) {
        self.schedule_type = schedule_type;
        if self.schedule.is_some() {
            self.schedule = Some(schedule_type.build(&self.moves));
        }
    }

    /// Forward a parallelism hint to the model.
    pub fn set_number_of_processes(&mut self, n: usize, offset: usize) {
        self.model.set_number_of_processes(n, offset);
    }

    /// Proposals after which the incremental joint disagreed with a full recompute.
    pub fn consistency_mismatches(&self) -> u64 {
        self.consistency_mismatches
    }

    /// Attach a monitor bound to this chain's model.
    pub fn add_monitor(&mut self, monitor: Box<dyn Monitor>) -> Result<()> {
        if let Some(id) = monitor.nodes().iter().find(|id| id.index() >= self.model.len()) {
            return Err(Error::Configuration(format!(
                "monitor '{}' refers to node {} which is not part of this chain's model",
                monitor.name(),
                id
            )));
        }
        self.monitors.push(monitor);
        Ok(())
    }

    /// Detach all monitors.
    pub fn remove_monitors(&mut self) {
        self.monitors.clear();
    }

    // ----------------------------------------------------------------------
    // Initialization
    // ----------------------------------------------------------------------

    /// Find a starting state with a computable joint probability, keep it,
    /// build the move schedule and reset the generation counter.
    ///
    /// Every attempt touches all nodes and sums their log-probabilities. A
    /// non-finite sum or a computation error triggers a redraw of all unclamped
    /// stochastic nodes in topological order. Inactive chains redraw before the
    /// first attempt too.
    pub fn initialize_sampler(&mut self) -> Result<()> {
        if self.moves.is_empty() {
            return Err(Error::Configuration("the sampler has no moves".into()));
        }
        let schedule = self.schedule_type.build(&self.moves);
        let proposals = schedule.moves_per_iteration().round();
        if proposals < 1.0 {
            return Err(Error::Configuration(format!(
                "the {} move schedule performs zero moves per iteration",
                self.schedule_type
            )));
        }

        let ordered = self.model.ordered_stochastic_nodes();
        let max_attempts = self.config.max_init_attempts.max(1);
        let mut found = None;
        for attempt in 0..max_attempts {
            let redraw = attempt > 0 || !self.chain_active;
            match self.try_starting_state(redraw, &ordered) {
                Ok(p) if p.total().is_finite() => {
                    found = Some(p);
                    break;
                }
                Ok(p) => log::debug!(
                    "chain {}: starting state {} has lnProb {}",
                    self.chain_index,
                    attempt + 1,
                    p.total()
                ),
                Err(e) if e.is_recoverable_by_redraw() => {
                    log::debug!("chain {}: starting state {} failed: {}", self.chain_index, attempt + 1, e)
                }
                Err(e) => return Err(e),
            }
        }
        let Some(partition) = found else {
            log::warn!("chain {}: no computable starting state", self.chain_index);
            return Err(Error::Computation(format!(
                "Unable to find a starting state with computable probability after {} tries",
                max_attempts
            )));
        };

        self.model.keep_touched()?;
        log::info!(
            "chain {}: initial lnProb {:.6} (likelihood {:.6}, prior {:.6}); {}",
            self.chain_index,
            partition.total(),
            partition.likelihood,
            partition.prior,
            self.strategy_description()
        );
        self.schedule = Some(schedule);
        self.generation = 0;
        Ok(())
    }

    fn try_starting_state(&mut self, redraw: bool, ordered: &[NodeId]) -> Result<LnPartition> {
        if redraw {
            for &id in ordered {
                self.model.redraw(id, &mut self.rng)?;
            }
        }
        self.model.recompute_all()
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if self.schedule.is_none() {
            self.initialize_sampler()?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Sampling
    // ----------------------------------------------------------------------

    /// Perform one iteration: `round(moves per iteration)` proposals.
    ///
    /// The generation counter only advances when `advance` is set (sampling,
    /// as opposed to burn-in).
    pub fn next_cycle(&mut self, advance: bool) -> Result<()> {
        let schedule = self
            .schedule
            .as_mut()
            .ok_or_else(|| Error::Configuration("the sampler has not been initialized".into()))?;
        let proposals = schedule.moves_per_iteration().round() as usize;
        for _ in 0..proposals {
            let i = schedule.next_move(self.generation, &mut self.rng)?;
            let mv = &mut self.moves[i];
            perform(mv, &mut self.model, &mut self.rng, self.likelihood_heat, self.posterior_heat)?;
            if self.config.check_consistency && !consistent(&mut self.model, mv.name())? {
                self.consistency_mismatches += 1;
            }
        }
        if advance {
            self.generation += 1;
        }
        Ok(())
    }

    /// Zero all move counters.
    pub fn reset(&mut self) {
        for mv in &mut self.moves {
            mv.reset_counters();
        }
    }

    /// Tune every move from its acceptance rate in the current period.
    pub fn tune(&mut self) {
        for mv in &mut self.moves {
            mv.auto_tune();
        }
    }

    /// Run `generations` burn-in cycles, tuning every `tuning_interval`
    /// cycles (0 disables tuning). Counters are reset first; the generation
    /// counter does not advance.
    pub fn burnin(&mut self, generations: u64, tuning_interval: u64) -> Result<()> {
        self.ensure_initialized()?;
        log::info!("chain {}: burn-in for {} generations", self.chain_index, generations);
        self.reset();
        for k in 1..=generations {
            self.next_cycle(false)?;
            if tuning_interval != 0 && k % tuning_interval == 0 {
                self.tune();
            }
        }
        Ok(())
    }

    /// Start the monitors, record generation 0 if nothing has been sampled yet,
    /// then run `generations` sampling cycles with monitoring after each.
    pub fn run(&mut self, generations: u64) -> Result<()> {
        self.ensure_initialized()?;
        log::info!("chain {}: sampling for {} generations", self.chain_index, generations);
        self.start_monitors(generations)?;
        if self.generation == 0 {
            self.monitor(0)?;
        }
        for _ in 0..generations {
            self.next_cycle(true)?;
            self.monitor(self.generation)?;
        }
        Ok(())
    }

    /// Reset every monitor; on the active chain also open streams and print headers.
    pub fn start_monitors(&mut self, num_cycles: u64) -> Result<()> {
        for m in &mut self.monitors {
            m.reset(num_cycles);
            if self.chain_active {
                m.open_stream()?;
                m.print_header(&self.model)?;
            }
        }
        Ok(())
    }

    /// Hand the current state to every monitor. Inactive chains stay silent.
    pub fn monitor(&mut self, generation: u64) -> Result<()> {
        if !self.chain_active {
            return Ok(());
        }
        for m in &mut self.monitors {
            m.monitor(generation, &self.model)?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Reporting
    // ----------------------------------------------------------------------

    /// Unheated joint log-probability of the current state.
    pub fn model_ln_probability(&mut self) -> Result<f64> {
        Ok(self.model.ln_partition()?.total())
    }

    /// One-line description of the move schedule.
    pub fn strategy_description(&self) -> String {
        let n = self.moves.len();
        let per_iteration = match &self.schedule {
            Some(s) => s.moves_per_iteration(),
            None => self.schedule_type.build(&self.moves).moves_per_iteration(),
        };
        match self.schedule_type {
            ScheduleType::Single => format!(
                "The simulator uses {} different moves, with a single move picked randomly per iteration",
                n
            ),
            ScheduleType::Random => format!(
                "The simulator uses {} different moves in a random move schedule with {} moves per iteration",
                n, per_iteration
            ),
            ScheduleType::Sequential => format!(
                "The simulator uses {} different moves in a sequential move schedule with {} moves per iteration",
                n, per_iteration
            ),
        }
    }

    /// Per-move acceptance statistics.
    pub fn operator_summary(&self) -> Vec<MoveSummary> {
        self.moves.iter().map(|m| m.summary(&self.model)).collect()
    }

    /// Operator summary as a fixed-width table.
    pub fn format_operator_summary(&self) -> String {
        let mut out = format!(
            "{:<20} | {:<16} | {:>8} | {:>8} | {:>8} | {:>10} | Parameters\n",
            "Name", "Param", "Weight", "Tried", "Accepted", "Acc. Ratio"
        );
        out.push_str(&"=".repeat(100));
        out.push('\n');
        for s in self.operator_summary() {
            out.push_str(&format!(
                "{:<20} | {:<16} | {:>8.2} | {:>8} | {:>8} | {:>10.4} | {}\n",
                s.name,
                s.nodes.join(","),
                s.weight,
                s.tried,
                s.accepted,
                s.acceptance_ratio(),
                s.parameters
            ));
        }
        out
    }
}

/// Clone `moves` and `monitors` and rebind them from `source` onto `target`
/// by node name.
fn replace_dag(
    source: &Model,
    target: &Model,
    moves: &[Move],
    monitors: &[Box<dyn Monitor>],
) -> Result<(Vec<Move>, Vec<Box<dyn Monitor>>)> {
    let mut new_moves = Vec::with_capacity(moves.len());
    for mv in moves {
        let mut mv = mv.clone();
        let owner = format!("move '{}'", mv.name());
        let nodes = rebind_nodes(source, target, &owner, &mv.nodes())?;
        mv.rebind(&nodes)?;
        new_moves.push(mv);
    }
    let mut new_monitors = Vec::with_capacity(monitors.len());
    for mon in monitors {
        let mut mon = mon.clone();
        let owner = format!("monitor '{}'", mon.name());
        let nodes = rebind_nodes(source, target, &owner, mon.nodes())?;
        mon.rebind(&nodes)?;
        new_monitors.push(mon);
    }
    Ok((new_moves, new_monitors))
}

fn rebind_nodes(source: &Model, target: &Model, owner: &str, nodes: &[NodeId]) -> Result<Vec<NodeId>> {
    nodes
        .iter()
        .map(|&old| {
            let node = source.nodes().get(old.index()).ok_or_else(|| {
                Error::Configuration(format!("{} refers to unknown node {}", owner, old))
            })?;
            if node.name().is_empty() {
                return Err(Error::Configuration(format!(
                    "Could not rebind {}: variable name was lost",
                    owner
                )));
            }
            target.find(node.name())
        })
        .collect()
}

/// `ln` acceptance ratio of the tempered target, `-inf` when either partition
/// change rules the proposal out.
fn heated_ratio(delta: LnPartition, likelihood_heat: f64, posterior_heat: f64, ln_hastings: f64) -> f64 {
    if delta.prior == f64::NEG_INFINITY || ln_hastings == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let ln_likelihood = if likelihood_heat == 0.0 { 0.0 } else { likelihood_heat * delta.likelihood };
    posterior_heat * (ln_likelihood + delta.prior) + ln_hastings
}

fn perform(
    mv: &mut Move,
    model: &mut Model,
    rng: &mut dyn RngCore,
    likelihood_heat: f64,
    posterior_heat: f64,
) -> Result<()> {
    let outcome = propose_and_decide(mv, model, rng, likelihood_heat, posterior_heat);
    if outcome.is_err() {
        // Leave the move idle and the model at its last kept state.
        if let Err(e) = mv.abort(model) {
            log::warn!("could not undo move '{}' after a failed proposal: {}", mv.name(), e);
        }
        model.restore_touched();
    }
    outcome
}

fn propose_and_decide(
    mv: &mut Move,
    model: &mut Model,
    rng: &mut dyn RngCore,
    likelihood_heat: f64,
    posterior_heat: f64,
) -> Result<()> {
    mv.prepare(model, rng)?;
    let ln_hastings = mv.apply(model, rng)?;
    let delta = model.touched_delta()?;
    let ln_ratio = heated_ratio(delta, likelihood_heat, posterior_heat, ln_hastings);
    if ln_ratio.is_nan() {
        return Err(Error::Computation(format!(
            "acceptance ratio of move '{}' is NaN (delta {:?}, ln Hastings {})",
            mv.name(),
            delta,
            ln_hastings
        )));
    }
    let accept = ln_ratio >= 0.0 || rng.random::<f64>().ln() < ln_ratio;
    if accept {
        model.keep_touched()?;
        mv.accept(model)
    } else {
        mv.reject(model)?;
        model.restore_touched();
        Ok(())
    }
}

/// Compare the kept joint against a full recompute, leaving the model clean.
fn consistent(model: &mut Model, move_name: &str) -> Result<bool> {
    let shortcut = model.cached_partition();
    let full = model.recompute_all()?;
    model.keep_touched()?;
    let ok = (shortcut.total() - full.total()).abs() <= CONSISTENCY_TOLERANCE;
    if !ok {
        log::warn!(
            "lnProb mismatch after move '{}': shortcut {} (lnL {}, prior {}), full {} (lnL {}, prior {})",
            move_name,
            shortcut.total(),
            shortcut.likelihood,
            shortcut.prior,
            full.total(),
            full.likelihood,
            full.prior
        );
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heated_ratio() {
        let d = LnPartition::new(-2.0, 1.0);
        assert_eq!(heated_ratio(d, 1.0, 1.0, 0.0), -1.0);
        assert_eq!(heated_ratio(d, 0.5, 1.0, 0.0), 0.0);
        assert_eq!(heated_ratio(d, 1.0, 0.5, 0.25), -0.25);
    }

    #[test]
    fn test_heated_ratio_impossible_moves() {
        let d = LnPartition::new(f64::NEG_INFINITY, 0.0);
        assert_eq!(heated_ratio(d, 1.0, 1.0, 0.0), f64::NEG_INFINITY);
        // A cold likelihood ignores its partition entirely.
        assert_eq!(heated_ratio(d, 0.0, 1.0, 0.0), 0.0);
        let d = LnPartition::new(0.0, f64::NEG_INFINITY);
        assert_eq!(heated_ratio(d, 1.0, 1.0, 5.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_config_defaults_and_partial_json() {
        let c: McmcConfig = serde_json::from_str(r#"{"schedule": "single", "seed": 7}"#).unwrap();
        assert_eq!(c.schedule, ScheduleType::Single);
        assert_eq!(c.seed, 7);
        assert_eq!(c.max_init_attempts, 100);
        assert_eq!(c.tuning_interval, 100);
        assert!(serde_json::from_str::<McmcConfig>(r#"{"schedule": "greedy"}"#).is_err());
    }
}
