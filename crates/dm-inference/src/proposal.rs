//! Proposals: perturbation operators with exact undo and a Hastings term.
//!
//! A proposal never decides acceptance. It mutates its target through the
//! model (which touches the affected subtree), reports `ln` of the Hastings
//! ratio, and on rejection restores the target exactly.

use crate::adapt::tune_step;
use dm_core::{Error, Result};
use dm_graph::{Model, NodeId, Value};
use rand::{Rng, RngCore};
use std::fmt::Debug;

/// Upper bound for the scale proposal's tuning parameter.
pub const MAX_SCALE_LAMBDA: f64 = 10_000.0;

/// A perturbation operator.
pub trait Proposal: Send + Sync + Debug {
    /// Proposal name used in summaries, e.g. `"Slide"`.
    fn name(&self) -> &'static str;

    /// Target nodes, in the order [`Proposal::rebind`] expects them.
    fn nodes(&self) -> Vec<NodeId>;

    /// Repoint the proposal at the corresponding nodes of another model.
    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()>;

    /// Pre-apply bookkeeping, e.g. choosing which element to perturb.
    fn prepare(&mut self, _model: &Model, _rng: &mut dyn RngCore) -> Result<()> {
        Ok(())
    }

    /// Perturb the target and return `ln` of the Hastings ratio.
    fn apply(&mut self, model: &mut Model, rng: &mut dyn RngCore) -> Result<f64>;

    /// Discard undo state after acceptance.
    fn cleanup(&mut self, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    /// Restore the target exactly after rejection.
    fn undo(&mut self, model: &mut Model) -> Result<()>;

    /// Adjust the tuning parameter from an observed acceptance rate.
    fn tune(&mut self, acceptance_rate: f64);

    /// Tuning parameters for summaries, e.g. `"delta = 1"`.
    fn parameter_summary(&self) -> String;

    /// Clone into a box.
    fn box_clone(&self) -> Box<dyn Proposal>;
}

impl Clone for Box<dyn Proposal> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

fn rebind_single(name: &str, target: &mut NodeId, nodes: &[NodeId]) -> Result<()> {
    match nodes {
        [id] => {
            *target = *id;
            Ok(())
        }
        _ => Err(Error::Configuration(format!(
            "{} proposal operates on exactly one node, got {}",
            name,
            nodes.len()
        ))),
    }
}

fn check_step(name: &str, step: f64) -> Result<()> {
    if !step.is_finite() || step <= 0.0 {
        return Err(Error::Validation(format!("{} tuning parameter must be finite and > 0, got {}", name, step)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Slide
// ---------------------------------------------------------------------------

/// Symmetric sliding window on a scalar: `x' = x + delta * (u - 1/2)`.
#[derive(Debug, Clone)]
pub struct SlideProposal {
    node: NodeId,
    delta: f64,
}

impl SlideProposal {
    /// Slide `node` with window width `delta`.
    pub fn new(node: NodeId, delta: f64) -> Result<Self> {
        check_step("Slide", delta)?;
        Ok(Self { node, delta })
    }

    /// Current window width.
    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Proposal for SlideProposal {
    fn name(&self) -> &'static str {
        "Slide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()> {
        rebind_single(self.name(), &mut self.node, nodes)
    }

    fn apply(&mut self, model: &mut Model, rng: &mut dyn RngCore) -> Result<f64> {
        let x = model.value(self.node).as_real()?;
        let u: f64 = rng.random();
        model.set_value(self.node, Value::Real(x + self.delta * (u - 0.5)))?;
        Ok(0.0)
    }

    fn undo(&mut self, model: &mut Model) -> Result<()> {
        model.restore(self.node)
    }

    fn tune(&mut self, acceptance_rate: f64) {
        self.delta = tune_step(self.delta, acceptance_rate);
    }

    fn parameter_summary(&self) -> String {
        format!("delta = {:.4}", self.delta)
    }

    fn box_clone(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// Multiplier on a positive scalar: `x' = x * exp(lambda * (u - 1/2))`.
#[derive(Debug, Clone)]
pub struct ScaleProposal {
    node: NodeId,
    lambda: f64,
}

impl ScaleProposal {
    /// Scale `node` with tuning parameter `lambda`.
    pub fn new(node: NodeId, lambda: f64) -> Result<Self> {
        check_step("Scale", lambda)?;
        Ok(Self { node, lambda: lambda.min(MAX_SCALE_LAMBDA) })
    }

    /// Current tuning parameter.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Proposal for ScaleProposal {
    fn name(&self) -> &'static str {
        "Scale"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()> {
        rebind_single(self.name(), &mut self.node, nodes)
    }

    fn apply(&mut self, model: &mut Model, rng: &mut dyn RngCore) -> Result<f64> {
        let x = model.value(self.node).as_real()?;
        let u: f64 = rng.random();
        let log_factor = self.lambda * (u - 0.5);
        model.set_value(self.node, Value::Real(x * log_factor.exp()))?;
        // Jacobian of the multiplicative move.
        Ok(log_factor)
    }

    fn undo(&mut self, model: &mut Model) -> Result<()> {
        model.restore(self.node)
    }

    fn tune(&mut self, acceptance_rate: f64) {
        self.lambda = tune_step(self.lambda, acceptance_rate).min(MAX_SCALE_LAMBDA);
    }

    fn parameter_summary(&self) -> String {
        format!("lambda = {:.4}", self.lambda)
    }

    fn box_clone(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Vector element slide
// ---------------------------------------------------------------------------

/// Sliding window on one element of a vector node.
///
/// With a fixed index the same element is always perturbed; otherwise
/// [`Proposal::prepare`] picks one uniformly at random.
#[derive(Debug, Clone)]
pub struct VectorElementSlideProposal {
    node: NodeId,
    delta: f64,
    fixed_index: Option<usize>,
    index: Option<usize>,
}

impl VectorElementSlideProposal {
    /// Slide a random element of `node` per proposal.
    pub fn new(node: NodeId, delta: f64) -> Result<Self> {
        check_step("VectorElementSlide", delta)?;
        Ok(Self { node, delta, fixed_index: None, index: None })
    }

    /// Always slide element `index` of `node`.
    pub fn fixed(node: NodeId, index: usize, delta: f64) -> Result<Self> {
        check_step("VectorElementSlide", delta)?;
        Ok(Self { node, delta, fixed_index: Some(index), index: None })
    }

    /// Current window width.
    pub fn delta(&self) -> f64 {
        self.delta
    }
}

impl Proposal for VectorElementSlideProposal {
    fn name(&self) -> &'static str {
        "VectorElementSlide"
    }

    fn nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }

    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()> {
        rebind_single(self.name(), &mut self.node, nodes)
    }

    fn prepare(&mut self, model: &Model, rng: &mut dyn RngCore) -> Result<()> {
        let len = model.value(self.node).len();
        let index = match self.fixed_index {
            Some(i) => i,
            None if len > 0 => rng.random_range(0..len),
            None => len,
        };
        if index >= len {
            return Err(Error::Validation(format!(
                "element {} out of range for node '{}' with {} element(s)",
                index,
                model.label(self.node),
                len
            )));
        }
        self.index = Some(index);
        Ok(())
    }

    fn apply(&mut self, model: &mut Model, rng: &mut dyn RngCore) -> Result<f64> {
        let i = self.index.ok_or_else(|| {
            Error::Validation("VectorElementSlide applied before an element was chosen".into())
        })?;
        let u: f64 = rng.random();
        let shift = self.delta * (u - 0.5);
        model.update_value(self.node, |v| v.elements_mut()[i] += shift)?;
        Ok(0.0)
    }

    fn cleanup(&mut self, _model: &mut Model) -> Result<()> {
        self.index = None;
        Ok(())
    }

    fn undo(&mut self, model: &mut Model) -> Result<()> {
        self.index = None;
        model.restore(self.node)
    }

    fn tune(&mut self, acceptance_rate: f64) {
        self.delta = tune_step(self.delta, acceptance_rate);
    }

    fn parameter_summary(&self) -> String {
        match self.fixed_index {
            Some(i) => format!("delta = {:.4}, index = {}", self.delta, i),
            None => format!("delta = {:.4}", self.delta),
        }
    }

    fn box_clone(&self) -> Box<dyn Proposal> {
        Box::new(self.clone())
    }
}
