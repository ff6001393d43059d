//! `dagmc run` / `dagmc check` configuration and model assembly.

use anyhow::Result;
use dm_graph::{Function, Model, ModelBuilder, NodeId, Value};
use dm_inference::{
    McmcConfig, Move, ScaleProposal, SlideProposal, TraceMonitor, VectorElementSlideProposal,
};
use dm_prob::Density;
use serde::Deserialize;
use std::path::Path;

/// A run configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Graph nodes, parents before children.
    pub nodes: Vec<NodeSpec>,
    /// Moves over the unclamped stochastic nodes.
    pub moves: Vec<MoveSpec>,
    /// Trace monitor. Defaults to every unclamped stochastic node, every generation.
    #[serde(default)]
    pub monitor: Option<MonitorSpec>,
    /// Burn-in generations (with tuning).
    #[serde(default = "default_burnin")]
    pub burnin: u64,
    /// Sampling generations.
    #[serde(default = "default_generations")]
    pub generations: u64,
    /// Overrides `mcmc.tuning_interval` when given.
    #[serde(default)]
    pub tuning_interval: Option<u64>,
    /// Chain settings.
    #[serde(default)]
    pub mcmc: McmcConfig,
}

fn default_burnin() -> u64 {
    1_000
}

fn default_generations() -> u64 {
    10_000
}

fn default_step() -> f64 {
    1.0
}

fn default_weight() -> f64 {
    1.0
}

fn default_tune() -> bool {
    true
}

fn default_print_every() -> u64 {
    1
}

/// A parent reference: another node's name, or a literal that becomes an
/// anonymous constant.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ParentRef {
    /// Literal value.
    Literal(f64),
    /// Named node.
    Name(String),
}

/// One graph node.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSpec {
    Constant {
        name: String,
        value: Value,
    },
    Stochastic {
        name: String,
        density: Density,
        parents: Vec<ParentRef>,
        value: Value,
        #[serde(default)]
        observed: bool,
    },
    Deterministic {
        name: String,
        function: Function,
        parents: Vec<ParentRef>,
    },
}

/// One move.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MoveSpec {
    Slide {
        node: String,
        #[serde(default = "default_step")]
        delta: f64,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_tune")]
        tune: bool,
    },
    Scale {
        node: String,
        #[serde(default = "default_step")]
        lambda: f64,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_tune")]
        tune: bool,
    },
    VectorElementSlide {
        node: String,
        #[serde(default = "default_step")]
        delta: f64,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default = "default_weight")]
        weight: f64,
        #[serde(default = "default_tune")]
        tune: bool,
    },
}

/// Trace monitor settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSpec {
    /// Monitored node names.
    pub nodes: Vec<String>,
    /// Record every n-th generation.
    #[serde(default = "default_print_every")]
    pub print_every: u64,
}

impl RunConfig {
    /// Tuning interval in effect.
    pub fn tuning_interval(&self) -> u64 {
        self.tuning_interval.unwrap_or(self.mcmc.tuning_interval)
    }
}

/// Read a run configuration: `.json` as JSON, anything else as YAML.
pub fn read_run_config(path: &Path) -> Result<RunConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let cfg: RunConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    if cfg.nodes.is_empty() {
        anyhow::bail!("config has no nodes");
    }
    Ok(cfg)
}

fn resolve_parents(b: &mut ModelBuilder, node: &str, parents: &[ParentRef]) -> Result<Vec<NodeId>> {
    parents
        .iter()
        .map(|p| match p {
            ParentRef::Literal(x) => Ok(b.constant("", *x)?),
            ParentRef::Name(name) => b
                .id(name)
                .ok_or_else(|| anyhow::anyhow!("unknown parent '{}' of node '{}'", name, node)),
        })
        .collect()
}

/// Assemble the model graph.
pub fn build_model(cfg: &RunConfig) -> Result<Model> {
    let mut b = ModelBuilder::new();
    for spec in &cfg.nodes {
        match spec {
            NodeSpec::Constant { name, value } => {
                b.constant(name, value.clone())?;
            }
            NodeSpec::Stochastic { name, density, parents, value, observed } => {
                let parents = resolve_parents(&mut b, name, parents)?;
                if *observed {
                    b.observed(name, *density, &parents, value.clone())?;
                } else {
                    b.stochastic(name, *density, &parents, value.clone())?;
                }
            }
            NodeSpec::Deterministic { name, function, parents } => {
                let parents = resolve_parents(&mut b, name, parents)?;
                b.deterministic(name, *function, &parents)?;
            }
        }
    }
    let model = b.build()?;
    tracing::info!(
        nodes = model.len(),
        stochastic = model.ordered_stochastic_nodes().len(),
        "model assembled"
    );
    Ok(model)
}

/// Bind the configured moves to `model`.
pub fn build_moves(cfg: &RunConfig, model: &Model) -> Result<Vec<Move>> {
    if cfg.moves.is_empty() {
        anyhow::bail!("config has no moves");
    }
    cfg.moves
        .iter()
        .map(|spec| {
            let mv = match spec {
                MoveSpec::Slide { node, delta, weight, tune } => {
                    Move::new(SlideProposal::new(model.find(node)?, *delta)?, *weight).with_auto_tune(*tune)
                }
                MoveSpec::Scale { node, lambda, weight, tune } => {
                    Move::new(ScaleProposal::new(model.find(node)?, *lambda)?, *weight).with_auto_tune(*tune)
                }
                MoveSpec::VectorElementSlide { node, delta, index, weight, tune } => {
                    let id = model.find(node)?;
                    let proposal = match index {
                        Some(i) => VectorElementSlideProposal::fixed(id, *i, *delta)?,
                        None => VectorElementSlideProposal::new(id, *delta)?,
                    };
                    Move::new(proposal, *weight).with_auto_tune(*tune)
                }
            };
            Ok(mv)
        })
        .collect()
}

/// Trace monitor over the configured nodes (or all unclamped stochastic nodes).
pub fn build_monitor(cfg: &RunConfig, model: &Model) -> Result<TraceMonitor> {
    match &cfg.monitor {
        Some(spec) => {
            let nodes = spec.nodes.iter().map(|n| model.find(n)).collect::<dm_core::Result<Vec<_>>>()?;
            Ok(TraceMonitor::new(nodes, spec.print_every))
        }
        None => Ok(TraceMonitor::new(model.ordered_stochastic_nodes(), 1)),
    }
}
