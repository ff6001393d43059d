//! Moves: a proposal plus weight, tuning flag, counters and call-order checks.

use crate::adapt::AcceptanceCounter;
use crate::proposal::Proposal;
use dm_core::{Error, MoveSummary, Result};
use dm_graph::{Model, NodeId};
use rand::RngCore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveState {
    Idle,
    Prepared,
    Applied,
}

/// A weighted, auto-tuning Metropolis-Hastings move.
///
/// Calls must follow `prepare -> apply -> (accept | reject)`; anything else is
/// a validation error.
#[derive(Debug, Clone)]
pub struct Move {
    proposal: Box<dyn Proposal>,
    weight: f64,
    auto_tune: bool,
    total: AcceptanceCounter,
    period: AcceptanceCounter,
    state: MoveState,
}

impl Move {
    /// Wrap a proposal. Auto-tuning is on.
    pub fn new(proposal: impl Proposal + 'static, weight: f64) -> Self {
        Self::from_boxed(Box::new(proposal), weight)
    }

    /// Wrap an already boxed proposal.
    pub fn from_boxed(proposal: Box<dyn Proposal>, weight: f64) -> Self {
        Self {
            proposal,
            weight,
            auto_tune: true,
            total: AcceptanceCounter::default(),
            period: AcceptanceCounter::default(),
            state: MoveState::Idle,
        }
    }

    /// Enable or disable tuning.
    pub fn with_auto_tune(mut self, auto_tune: bool) -> Self {
        self.auto_tune = auto_tune;
        self
    }

    /// Proposal name.
    pub fn name(&self) -> &'static str {
        self.proposal.name()
    }

    /// Target nodes.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.proposal.nodes()
    }

    /// Relative call frequency. Moves with weight `<= 0` are never scheduled.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Whether [`Move::auto_tune`] adjusts the proposal.
    pub fn is_auto_tuned(&self) -> bool {
        self.auto_tune
    }

    /// The wrapped proposal.
    pub fn proposal(&self) -> &dyn Proposal {
        self.proposal.as_ref()
    }

    /// Times tried since the last counter reset.
    pub fn tried(&self) -> u64 {
        self.total.tried
    }

    /// Times accepted since the last counter reset.
    pub fn accepted(&self) -> u64 {
        self.total.accepted
    }

    /// Accepted / tried since the last counter reset.
    pub fn acceptance_ratio(&self) -> f64 {
        self.total.rate().unwrap_or(0.0)
    }

    /// Repoint the proposal at another model's nodes (parallel to [`Move::nodes`]).
    pub fn rebind(&mut self, nodes: &[NodeId]) -> Result<()> {
        self.proposal.rebind(nodes)
    }

    fn expect_state(&self, expected: MoveState, call: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::Validation(format!(
                "move '{}': {} called in state {:?}, expected {:?}",
                self.name(),
                call,
                self.state,
                expected
            )));
        }
        Ok(())
    }

    /// Idle -> prepared.
    pub fn prepare(&mut self, model: &Model, rng: &mut dyn RngCore) -> Result<()> {
        self.expect_state(MoveState::Idle, "prepare")?;
        self.proposal.prepare(model, rng)?;
        self.state = MoveState::Prepared;
        Ok(())
    }

    /// Prepared -> applied. Returns `ln` of the Hastings ratio.
    pub fn apply(&mut self, model: &mut Model, rng: &mut dyn RngCore) -> Result<f64> {
        self.expect_state(MoveState::Prepared, "apply")?;
        let ln_hastings = self.proposal.apply(model, rng)?;
        self.state = MoveState::Applied;
        Ok(ln_hastings)
    }

    /// Applied -> idle after acceptance; counts the move as tried and accepted.
    pub fn accept(&mut self, model: &mut Model) -> Result<()> {
        self.expect_state(MoveState::Applied, "accept")?;
        self.proposal.cleanup(model)?;
        self.record(true);
        self.state = MoveState::Idle;
        Ok(())
    }

    /// Applied -> idle after rejection; undoes the proposal and counts it as tried.
    pub fn reject(&mut self, model: &mut Model) -> Result<()> {
        self.expect_state(MoveState::Applied, "reject")?;
        self.proposal.undo(model)?;
        self.record(false);
        self.state = MoveState::Idle;
        Ok(())
    }

    /// Back to idle from any state after a failed proposal, undoing whatever was
    /// applied. Counters are not touched.
    pub fn abort(&mut self, model: &mut Model) -> Result<()> {
        if self.state == MoveState::Idle {
            return Ok(());
        }
        self.state = MoveState::Idle;
        self.proposal.undo(model)
    }

    fn record(&mut self, accepted: bool) {
        self.total.record(accepted);
        self.period.record(accepted);
    }

    /// Zero all counters.
    pub fn reset_counters(&mut self) {
        self.total.reset();
        self.period.reset();
    }

    /// Tune the proposal from the acceptance rate of the current period, then
    /// start a new period. No-op when tuning is off or nothing was tried.
    pub fn auto_tune(&mut self) {
        if !self.auto_tune {
            return;
        }
        if let Some(rate) = self.period.rate() {
            self.proposal.tune(rate);
            log::debug!(
                "tuned {} (rate {:.3}): {}",
                self.name(),
                rate,
                self.proposal.parameter_summary()
            );
        }
        self.period.reset();
    }

    /// Operator summary row, with node names resolved against `model`.
    pub fn summary(&self, model: &Model) -> MoveSummary {
        MoveSummary {
            name: self.name().to_string(),
            nodes: self.nodes().into_iter().map(|id| model.label(id)).collect(),
            weight: self.weight,
            tried: self.total.tried,
            accepted: self.total.accepted,
            parameters: self.proposal.parameter_summary(),
        }
    }
}
