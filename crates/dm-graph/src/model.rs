//! The model: an arena owning a complete, self-contained set of graph nodes.
//!
//! Nodes are addressed by [`NodeId`]; edges are index pairs. Node indices are
//! always in topological order (every parent has a smaller index than its
//! children), so sorting a set of ids yields a dependency-safe order.
//!
//! ## Dirty tracking
//!
//! - [`Model::touch`] marks a node and all its descendants dirty, capturing a
//!   rollback baseline for every node that was clean, and re-evaluates
//!   deterministic descendants.
//! - [`Model::ln_probability`] recomputes a dirty node's cache.
//! - [`Model::keep`] commits, [`Model::restore`] rolls back to the baseline.
//!
//! The model also tracks its current dirty set, so a driver can commit or roll
//! back exactly what a proposal touched ([`Model::keep_touched`],
//! [`Model::restore_touched`]).

use crate::node::{DagNode, Freshness, NodeId, NodeKind, Stored};
use crate::value::Value;
use dm_core::{Error, LnPartition, Result};
use rand::RngCore;
use rayon::prelude::*;
use std::collections::HashMap;

/// Below this many elements per worker, vector densities are summed serially.
const MIN_PARALLEL_CHUNK: usize = 64;

/// A directed acyclic model graph.
#[derive(Debug)]
pub struct Model {
    nodes: Vec<DagNode>,
    names: HashMap<String, NodeId>,
    touched: Vec<NodeId>,
    prior_only: bool,
    n_processes: usize,
    process_offset: usize,
}

impl Model {
    pub(crate) fn from_nodes(nodes: Vec<DagNode>) -> Result<Self> {
        check_structure(&nodes)?;
        let mut names = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            if n.name.is_empty() {
                continue;
            }
            if names.insert(n.name.clone(), NodeId(i)).is_some() {
                return Err(Error::Configuration(format!("duplicate node name '{}'", n.name)));
            }
        }
        let touched = (0..nodes.len())
            .filter(|&i| nodes[i].freshness != Freshness::Clean)
            .map(NodeId)
            .collect();
        Ok(Self { nodes, names, touched, prior_only: false, n_processes: 1, process_offset: 0 })
    }

    // ----------------------------------------------------------------------
    // Lookup
    // ----------------------------------------------------------------------

    /// All nodes in topological order.
    pub fn nodes(&self) -> &[DagNode] {
        &self.nodes
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the model has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in topological order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Node by id.
    ///
    /// # Panics
    /// If `id` was not issued by this model.
    pub fn node(&self, id: NodeId) -> &DagNode {
        &self.nodes[id.0]
    }

    /// Current value of a node.
    ///
    /// # Panics
    /// If `id` was not issued by this model.
    pub fn value(&self, id: NodeId) -> &Value {
        &self.nodes[id.0].value
    }

    /// Id of the node with the given stable name.
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Id of the node with the given stable name, or a configuration error.
    pub fn find(&self, name: &str) -> Result<NodeId> {
        self.id_of(name).ok_or_else(|| {
            Error::Configuration(format!("Cannot find node with name '{}' in the model", name))
        })
    }

    /// Display label of a node (its name, or its kind if anonymous).
    pub fn label(&self, id: NodeId) -> String {
        self.nodes.get(id.0).map(|n| n.label()).unwrap_or_else(|| id.to_string())
    }

    /// Unclamped stochastic nodes in parents-before-children order.
    pub fn ordered_stochastic_nodes(&self) -> Vec<NodeId> {
        self.node_ids().filter(|id| self.nodes[id.0].is_redrawable()).collect()
    }

    /// Nodes currently dirty (touched or recomputed but not yet kept/restored).
    pub fn touched_nodes(&self) -> &[NodeId] {
        &self.touched
    }

    /// Whether any node is dirty.
    pub fn is_dirty(&self) -> bool {
        !self.touched.is_empty()
    }

    fn check_id(&self, id: NodeId) -> Result<()> {
        if id.0 >= self.nodes.len() {
            return Err(Error::Validation(format!(
                "node id {} out of range for a model with {} nodes",
                id,
                self.nodes.len()
            )));
        }
        Ok(())
    }

    /// `id` and all of its descendants, sorted (topological order).
    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![id];
        let mut out = Vec::new();
        while let Some(x) = stack.pop() {
            if seen[x.0] {
                continue;
            }
            seen[x.0] = true;
            out.push(x);
            stack.extend(self.nodes[x.0].children.iter().copied());
        }
        out.sort_unstable();
        out
    }

    // ----------------------------------------------------------------------
    // Touch / keep / restore
    // ----------------------------------------------------------------------

    fn mark_dirty(&mut self, affected: &[NodeId]) {
        for &id in affected {
            let node = &mut self.nodes[id.0];
            if node.freshness == Freshness::Clean {
                node.stored = Some(Stored { value: node.value.clone(), ln_prob: node.ln_prob });
                self.touched.push(id);
            }
            node.freshness = Freshness::Touched;
        }
    }

    fn refresh_deterministic(&mut self, affected: &[NodeId]) -> Result<()> {
        for &id in affected {
            let function = match &self.nodes[id.0].kind {
                NodeKind::Deterministic { function } => *function,
                _ => continue,
            };
            let result = {
                let args: Vec<&Value> =
                    self.nodes[id.0].parents.iter().map(|p| &self.nodes[p.0].value).collect();
                function.evaluate(&args)
            };
            let value = result.map_err(|e| {
                Error::Computation(format!(
                    "could not evaluate deterministic node '{}': {}",
                    self.nodes[id.0].label(),
                    e
                ))
            })?;
            self.nodes[id.0].value = value;
        }
        Ok(())
    }

    /// Mark a node and all of its descendants dirty.
    ///
    /// Touching an already-dirty subtree leaves it as it is. Deterministic
    /// descendants are re-evaluated from their parents; no stochastic value changes.
    pub fn touch(&mut self, id: NodeId) -> Result<()> {
        self.check_id(id)?;
        let affected = self.descendants(id);
        self.mark_dirty(&affected);
        self.refresh_deterministic(&affected)
    }

    /// Mark every node dirty.
    pub fn touch_all(&mut self) -> Result<()> {
        let all: Vec<NodeId> = self.node_ids().collect();
        self.mark_dirty(&all);
        self.refresh_deterministic(&all)
    }

    fn check_writable(&self, id: NodeId, value: Option<&Value>) -> Result<()> {
        self.check_id(id)?;
        let node = &self.nodes[id.0];
        match node.kind {
            NodeKind::Deterministic { .. } => {
                return Err(Error::Validation(format!(
                    "value of deterministic node '{}' is derived from its parents",
                    node.label()
                )));
            }
            NodeKind::Stochastic { clamped: true, .. } => {
                return Err(Error::Validation(format!(
                    "node '{}' is clamped to observed data",
                    node.label()
                )));
            }
            _ => {}
        }
        if let Some(v) = value {
            if v.is_vector() != node.value.is_vector() || v.len() != node.value.len() {
                return Err(Error::Validation(format!(
                    "shape mismatch for node '{}': expected {} element(s), got {}",
                    node.label(),
                    node.value.len(),
                    v.len()
                )));
            }
        }
        Ok(())
    }

    /// Replace a node's value and touch it.
    ///
    /// The previous value becomes the rollback baseline if the node was clean.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<()> {
        self.check_writable(id, Some(&value))?;
        let affected = self.descendants(id);
        self.mark_dirty(&affected);
        self.nodes[id.0].value = value;
        self.refresh_deterministic(&affected)
    }

    /// Mutate a node's value in place and touch it.
    pub fn update_value<F>(&mut self, id: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Value),
    {
        self.check_writable(id, None)?;
        let affected = self.descendants(id);
        self.mark_dirty(&affected);
        f(&mut self.nodes[id.0].value);
        self.refresh_deterministic(&affected)
    }

    /// Fix a stochastic node to observed data (outside of any sampling cycle).
    pub fn clamp(&mut self, id: NodeId, data: Value) -> Result<()> {
        self.check_id(id)?;
        let label = self.nodes[id.0].label();
        match &mut self.nodes[id.0].kind {
            NodeKind::Stochastic { clamped, .. } => *clamped = true,
            _ => {
                return Err(Error::Validation(format!("only stochastic nodes can be clamped ('{}')", label)));
            }
        }
        let affected = self.descendants(id);
        self.mark_dirty(&affected);
        self.nodes[id.0].value = data;
        self.refresh_deterministic(&affected)
    }

    /// Log-probability of a node, recomputed first if dirty.
    ///
    /// Constants and deterministic nodes contribute `0`. `-inf` is a valid
    /// result (zero density); NaN or an invalid parameterization is a
    /// computation error naming the node.
    pub fn ln_probability(&mut self, id: NodeId) -> Result<f64> {
        self.check_id(id)?;
        if self.nodes[id.0].freshness == Freshness::Touched {
            let lp = self.compute_ln_probability(id)?;
            let node = &mut self.nodes[id.0];
            node.ln_prob = lp;
            node.freshness = Freshness::Computed;
        }
        Ok(self.nodes[id.0].ln_prob)
    }

    fn compute_ln_probability(&self, id: NodeId) -> Result<f64> {
        let node = &self.nodes[id.0];
        let density = match node.kind {
            NodeKind::Stochastic { density, clamped } => {
                if clamped && self.prior_only {
                    return Ok(0.0);
                }
                density
            }
            _ => return Ok(0.0),
        };
        let fail = |e: Error| {
            Error::Computation(format!("could not compute lnProb for node '{}': {}", node.label(), e))
        };
        let params = node
            .parents
            .iter()
            .map(|p| self.nodes[p.0].value.as_real())
            .collect::<Result<Vec<f64>>>()
            .map_err(fail)?;

        let xs = node.value.elements();
        let lp = if self.n_processes > 1 && xs.len() >= self.n_processes * MIN_PARALLEL_CHUNK {
            let chunk = xs.len().div_ceil(self.n_processes);
            xs.par_chunks(chunk)
                .map(|c| density.logpdf_iid(c, &params))
                .collect::<Result<Vec<f64>>>()
                .map(|parts| parts.iter().sum())
        } else {
            density.logpdf_iid(xs, &params)
        }
        .map_err(fail)?;

        if lp.is_nan() {
            return Err(Error::Computation(format!(
                "lnProb for node '{}' is NaN (value {})",
                node.label(),
                node.value
            )));
        }
        Ok(lp)
    }

    fn keep_nodes(&mut self, ids: &[NodeId]) -> Result<()> {
        for &id in ids {
            if self.nodes[id.0].freshness == Freshness::Clean {
                continue;
            }
            // The cache must be valid before it becomes the baseline.
            self.ln_probability(id)?;
            let node = &mut self.nodes[id.0];
            node.stored = None;
            node.freshness = Freshness::Clean;
        }
        self.touched.retain(|id| self.nodes[id.0].freshness != Freshness::Clean);
        Ok(())
    }

    fn restore_nodes(&mut self, ids: &[NodeId]) {
        for &id in ids {
            let node = &mut self.nodes[id.0];
            // A node that was never kept has no baseline and stays dirty.
            if let Some(stored) = node.stored.take() {
                node.value = stored.value;
                node.ln_prob = stored.ln_prob;
                node.freshness = Freshness::Clean;
            }
        }
        self.touched.retain(|id| self.nodes[id.0].freshness != Freshness::Clean);
    }

    fn sorted_touched(&self) -> Vec<NodeId> {
        let mut ids = self.touched.clone();
        ids.sort_unstable();
        ids
    }

    /// Commit a node and its dirty descendants as the new baseline.
    pub fn keep(&mut self, id: NodeId) -> Result<()> {
        self.check_id(id)?;
        let affected = self.descendants(id);
        self.keep_nodes(&affected)
    }

    /// Roll a node and its dirty descendants back to their baselines.
    pub fn restore(&mut self, id: NodeId) -> Result<()> {
        self.check_id(id)?;
        let affected = self.descendants(id);
        self.restore_nodes(&affected);
        Ok(())
    }

    /// Commit every dirty node.
    pub fn keep_touched(&mut self) -> Result<()> {
        let ids = self.sorted_touched();
        self.keep_nodes(&ids)
    }

    /// Roll back every dirty node.
    pub fn restore_touched(&mut self) {
        let ids = self.sorted_touched();
        self.restore_nodes(&ids);
    }

    /// Replace an unclamped stochastic node's value with a fresh draw from its
    /// own density. The node is left dirty.
    pub fn redraw(&mut self, id: NodeId, rng: &mut dyn RngCore) -> Result<()> {
        self.check_id(id)?;
        let node = &self.nodes[id.0];
        let density = match node.kind {
            NodeKind::Stochastic { density, clamped: false } => density,
            _ => {
                return Err(Error::Validation(format!(
                    "node '{}' is not an unclamped stochastic node and cannot be redrawn",
                    node.label()
                )));
            }
        };
        let fail = |e: Error| {
            Error::Computation(format!("could not redraw node '{}': {}", node.label(), e))
        };
        let params = node
            .parents
            .iter()
            .map(|p| self.nodes[p.0].value.as_real())
            .collect::<Result<Vec<f64>>>()
            .map_err(fail)?;
        let mut draws = Vec::with_capacity(node.value.len());
        for _ in 0..node.value.len() {
            draws.push(density.sample(&params, rng).map_err(fail)?);
        }
        let value = node.value.with_shape_of(draws);
        self.set_value(id, value)
    }

    // ----------------------------------------------------------------------
    // Joint probability
    // ----------------------------------------------------------------------

    /// Joint log-probability split into likelihood (clamped) and prior partitions,
    /// recomputing dirty nodes.
    pub fn ln_partition(&mut self) -> Result<LnPartition> {
        let mut p = LnPartition::default();
        for i in 0..self.nodes.len() {
            let lp = self.ln_probability(NodeId(i))?;
            if self.nodes[i].is_clamped() {
                p.likelihood += lp;
            } else {
                p.prior += lp;
            }
        }
        Ok(p)
    }

    /// Sum of the cached log-probabilities without recomputing anything.
    ///
    /// Only meaningful when the model is clean.
    pub fn cached_partition(&self) -> LnPartition {
        let mut p = LnPartition::default();
        for n in &self.nodes {
            if n.is_clamped() {
                p.likelihood += n.ln_prob;
            } else {
                p.prior += n.ln_prob;
            }
        }
        p
    }

    /// Touch every node and recompute the joint log-probability from scratch.
    ///
    /// Leaves the model dirty; follow with [`Model::keep_touched`] or
    /// [`Model::restore_touched`].
    pub fn recompute_all(&mut self) -> Result<LnPartition> {
        self.touch_all()?;
        self.ln_partition()
    }

    /// Change in log-probability of the dirty nodes relative to their baselines.
    ///
    /// Unclamped nodes are evaluated first, in topological order. The first one
    /// at `-inf` ends the evaluation: its descendants are left unevaluated (their
    /// parameters may be out of support) and the prior change is `-inf` with a
    /// likelihood change of `0`.
    pub fn touched_delta(&mut self) -> Result<LnPartition> {
        let ids = self.sorted_touched();
        let mut delta = LnPartition::default();
        for clamped_pass in [false, true] {
            for &id in &ids {
                if self.nodes[id.0].is_clamped() != clamped_pass {
                    continue;
                }
                let new = self.ln_probability(id)?;
                if new == f64::INFINITY {
                    return Err(Error::Computation(format!(
                        "lnProb for node '{}' is +inf",
                        self.nodes[id.0].label()
                    )));
                }
                let Some(old) = self.nodes[id.0].stored.as_ref().map(|s| s.ln_prob) else {
                    return Err(Error::Configuration(format!(
                        "node '{}' has no kept state; initialize the model before proposing",
                        self.nodes[id.0].label()
                    )));
                };
                if new == f64::NEG_INFINITY {
                    if clamped_pass {
                        delta.likelihood = f64::NEG_INFINITY;
                        continue;
                    }
                    return Ok(LnPartition::new(0.0, f64::NEG_INFINITY));
                }
                if clamped_pass {
                    delta.likelihood += new - old;
                } else {
                    delta.prior += new - old;
                }
            }
        }
        Ok(delta)
    }

    // ----------------------------------------------------------------------
    // Settings
    // ----------------------------------------------------------------------

    /// Whether clamped nodes are ignored (sampling from the prior).
    pub fn prior_only(&self) -> bool {
        self.prior_only
    }

    /// Ignore (or stop ignoring) the likelihood. Touches every clamped node.
    pub fn set_prior_only(&mut self, prior_only: bool) -> Result<()> {
        if self.prior_only == prior_only {
            return Ok(());
        }
        self.prior_only = prior_only;
        let clamped: Vec<NodeId> = self.node_ids().filter(|id| self.nodes[id.0].is_clamped()).collect();
        for id in clamped {
            self.touch(id)?;
        }
        Ok(())
    }

    /// Parallelism hint for nodes whose evaluation can be split across workers.
    ///
    /// With `n > 1`, i.i.d. vector nodes sum their log-density in `n` chunks on
    /// the rayon pool. `offset` identifies this model's slot among cooperating
    /// processes and is kept for callers.
    pub fn set_number_of_processes(&mut self, n: usize, offset: usize) {
        self.n_processes = n.max(1);
        self.process_offset = offset;
        log::debug!("model evaluation split across {} process(es), offset {}", self.n_processes, offset);
    }

    /// `(processes, offset)` as last set.
    pub fn number_of_processes(&self) -> (usize, usize) {
        (self.n_processes, self.process_offset)
    }

    // ----------------------------------------------------------------------
    // Clone and rewire
    // ----------------------------------------------------------------------

    /// Deep copy with all edges rewired onto the new arena.
    ///
    /// Node names, values, caches and freshness are preserved.
    pub fn try_clone(&self) -> Result<Model> {
        let all: Vec<NodeId> = self.node_ids().collect();
        self.copy_nodes(&all)
    }

    /// New model holding every node connected (through parents or children) to
    /// one of the named roots.
    pub fn subgraph(&self, roots: &[&str]) -> Result<Model> {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = roots.iter().map(|r| self.find(r)).collect::<Result<Vec<_>>>()?;
        while let Some(x) = stack.pop() {
            if seen[x.0] {
                continue;
            }
            seen[x.0] = true;
            let n = &self.nodes[x.0];
            stack.extend(n.parents.iter().chain(n.children.iter()).copied());
        }
        let selected: Vec<NodeId> = (0..self.nodes.len()).filter(|&i| seen[i]).map(NodeId).collect();
        self.copy_nodes(&selected)
    }

    fn copy_nodes(&self, selected: &[NodeId]) -> Result<Model> {
        let nodes = rewire(&self.nodes, selected)?;
        let mut model = Model::from_nodes(nodes)?;
        model.prior_only = self.prior_only;
        model.n_processes = self.n_processes;
        model.process_offset = self.process_offset;
        Ok(model)
    }

    /// Check parent/child consistency and topological ordering.
    pub fn validate(&self) -> Result<()> {
        check_structure(&self.nodes)
    }
}

/// Duplicate `selected` (sorted ascending) into a fresh arena, then map every
/// edge through the old-to-new correspondence.
fn rewire(source: &[DagNode], selected: &[NodeId]) -> Result<Vec<DagNode>> {
    let mut remap: Vec<Option<NodeId>> = vec![None; source.len()];
    for (new, old) in selected.iter().enumerate() {
        remap[old.0] = Some(NodeId(new));
    }

    let mut out: Vec<DagNode> = selected
        .iter()
        .map(|old| {
            let src = &source[old.0];
            DagNode {
                name: src.name.clone(),
                kind: src.kind.clone(),
                value: src.value.clone(),
                ln_prob: src.ln_prob,
                freshness: src.freshness,
                stored: src.stored.clone(),
                parents: Vec::with_capacity(src.parents.len()),
                children: Vec::with_capacity(src.children.len()),
            }
        })
        .collect();

    for (new, &old) in selected.iter().enumerate() {
        let src = &source[old.0];
        for &p in &src.parents {
            if !source[p.0].children.contains(&old) {
                return Err(Error::Structure(format!(
                    "'{}' lists '{}' as parent, but is not among its children",
                    src.label(),
                    source[p.0].label()
                )));
            }
            let np = remap[p.0].ok_or_else(|| {
                Error::Structure(format!(
                    "parent '{}' of '{}' is not part of the copied graph",
                    source[p.0].label(),
                    src.label()
                ))
            })?;
            out[new].parents.push(np);
        }
        for &c in &src.children {
            if !source[c.0].parents.contains(&old) {
                return Err(Error::Structure(format!(
                    "'{}' lists '{}' as child, but is not among its parents",
                    src.label(),
                    source[c.0].label()
                )));
            }
            let nc = remap[c.0].ok_or_else(|| {
                Error::Structure(format!(
                    "child '{}' of '{}' is not part of the copied graph",
                    source[c.0].label(),
                    src.label()
                ))
            })?;
            out[new].children.push(nc);
        }
    }
    Ok(out)
}

fn check_structure(nodes: &[DagNode]) -> Result<()> {
    for (i, n) in nodes.iter().enumerate() {
        for &p in &n.parents {
            if p.0 >= i {
                return Err(Error::Structure(format!(
                    "parent {} of '{}' does not precede it",
                    p,
                    n.label()
                )));
            }
            if !nodes[p.0].children.contains(&NodeId(i)) {
                return Err(Error::Structure(format!(
                    "'{}' is a parent of '{}' but does not list it as a child",
                    nodes[p.0].label(),
                    n.label()
                )));
            }
        }
        for &c in &n.children {
            if c.0 <= i || c.0 >= nodes.len() {
                return Err(Error::Structure(format!(
                    "child {} of '{}' does not follow it",
                    c,
                    n.label()
                )));
            }
            if !nodes[c.0].parents.contains(&NodeId(i)) {
                return Err(Error::Structure(format!(
                    "'{}' is a child of '{}' but does not list it as a parent",
                    nodes[c.0].label(),
                    n.label()
                )));
            }
        }
    }
    Ok(())
}
