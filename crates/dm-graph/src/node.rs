//! Graph nodes: identity, kind, value, cached log-probability and freshness.
//!
//! A node on its own only holds state. The touch/keep/restore protocol needs
//! parent values and descendant sets, so it lives on [`crate::Model`].

use crate::function::Function;
use crate::value::Value;
use dm_prob::Density;
use serde::{Deserialize, Serialize};

/// Index of a node inside one model's arena.
///
/// Indices are only meaningful for the model that issued them; use node names
/// to match nodes across models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl NodeId {
    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is and how it evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Fixed value, contributes nothing.
    Constant,
    /// Random variable with a density parameterized by its parents.
    Stochastic {
        /// Density family.
        density: Density,
        /// Value fixed by data: counts toward the likelihood partition and is never redrawn.
        clamped: bool,
    },
    /// Value is a pure function of the parents, contributes nothing.
    Deterministic {
        /// Function applied to the parent values.
        function: Function,
    },
}

/// Freshness of a node's cached log-probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Kept: the cache is valid and there is nothing to roll back.
    Clean,
    /// Dirty: the cache must be recomputed before it is read.
    Touched,
    /// Recomputed since the last touch but not yet kept or restored.
    Computed,
}

/// Rollback baseline captured when a clean node is first touched.
#[derive(Debug, Clone)]
pub(crate) struct Stored {
    pub(crate) value: Value,
    pub(crate) ln_prob: f64,
}

/// A node of the model graph.
#[derive(Debug, Clone)]
pub struct DagNode {
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) value: Value,
    pub(crate) ln_prob: f64,
    pub(crate) freshness: Freshness,
    pub(crate) stored: Option<Stored>,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl DagNode {
    pub(crate) fn new(name: String, kind: NodeKind, value: Value, parents: Vec<NodeId>) -> Self {
        Self {
            name,
            kind,
            value,
            ln_prob: f64::NAN,
            freshness: Freshness::Touched,
            stored: None,
            parents,
            children: Vec::new(),
        }
    }

    /// Stable identifier used to match nodes across cloned models. May be empty
    /// for anonymous constants and deterministic nodes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node kind.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Value that `restore` would reinstate, if the node is dirty.
    pub fn stored_value(&self) -> Option<&Value> {
        self.stored.as_ref().map(|s| &s.value)
    }

    /// Current freshness.
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// Cached log-probability if it is not stale.
    pub fn cached_ln_probability(&self) -> Option<f64> {
        match self.freshness {
            Freshness::Touched => None,
            Freshness::Clean | Freshness::Computed => Some(self.ln_prob),
        }
    }

    /// Parents in argument order.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Random variable (clamped or not).
    pub fn is_stochastic(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { .. })
    }

    /// Observed stochastic node.
    pub fn is_clamped(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { clamped: true, .. })
    }

    /// Constant node.
    pub fn is_constant(&self) -> bool {
        matches!(self.kind, NodeKind::Constant)
    }

    /// Deterministic node.
    pub fn is_deterministic(&self) -> bool {
        matches!(self.kind, NodeKind::Deterministic { .. })
    }

    /// Unclamped stochastic node, i.e. one initialization may redraw.
    pub fn is_redrawable(&self) -> bool {
        matches!(self.kind, NodeKind::Stochastic { clamped: false, .. })
    }

    /// Short label for messages: the name, or the kind for anonymous nodes.
    pub(crate) fn label(&self) -> String {
        if self.name.is_empty() {
            match &self.kind {
                NodeKind::Constant => "<constant>".to_string(),
                NodeKind::Stochastic { density, .. } => format!("<{}>", density),
                NodeKind::Deterministic { function } => format!("<{}>", function),
            }
        } else {
            self.name.clone()
        }
    }
}
