//! Incremental model construction.

use crate::function::Function;
use crate::model::Model;
use crate::node::{DagNode, NodeId, NodeKind};
use crate::value::Value;
use dm_core::{Error, Result};
use dm_prob::Density;
use std::collections::HashMap;

/// Builds a [`Model`] one node at a time.
///
/// Parents must be added before their children, so the arena is always in
/// topological order. Names are optional but must be unique when given.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    nodes: Vec<DagNode>,
    names: HashMap<String, NodeId>,
}

impl ModelBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of a previously added named node.
    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node has been added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn register(&mut self, name: &str, kind: NodeKind, value: Value, parents: &[NodeId]) -> Result<NodeId> {
        if !name.is_empty() && self.names.contains_key(name) {
            return Err(Error::Configuration(format!("duplicate node name '{}'", name)));
        }
        if let Some(p) = parents.iter().find(|p| p.0 >= self.nodes.len()) {
            return Err(Error::Validation(format!("unknown parent {} for node '{}'", p, name)));
        }
        let id = NodeId(self.nodes.len());
        for p in parents {
            let children = &mut self.nodes[p.0].children;
            if !children.contains(&id) {
                children.push(id);
            }
        }
        self.nodes.push(DagNode::new(name.to_string(), kind, value, parents.to_vec()));
        if !name.is_empty() {
            self.names.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Add a constant node.
    pub fn constant(&mut self, name: &str, value: impl Into<Value>) -> Result<NodeId> {
        self.register(name, NodeKind::Constant, value.into(), &[])
    }

    /// Add an unclamped random variable with an initial value.
    pub fn stochastic(
        &mut self,
        name: &str,
        density: Density,
        parents: &[NodeId],
        initial: impl Into<Value>,
    ) -> Result<NodeId> {
        check_density_arity(name, density, parents)?;
        self.register(name, NodeKind::Stochastic { density, clamped: false }, initial.into(), parents)
    }

    /// Add a random variable clamped to observed data.
    pub fn observed(
        &mut self,
        name: &str,
        density: Density,
        parents: &[NodeId],
        data: impl Into<Value>,
    ) -> Result<NodeId> {
        check_density_arity(name, density, parents)?;
        self.register(name, NodeKind::Stochastic { density, clamped: true }, data.into(), parents)
    }

    /// Add a deterministic node, evaluated immediately from its parents.
    pub fn deterministic(&mut self, name: &str, function: Function, parents: &[NodeId]) -> Result<NodeId> {
        if parents.len() != function.arity() {
            return Err(Error::Validation(format!(
                "function '{}' of node '{}' takes {} argument(s), got {}",
                function,
                name,
                function.arity(),
                parents.len()
            )));
        }
        if let Some(p) = parents.iter().find(|p| p.0 >= self.nodes.len()) {
            return Err(Error::Validation(format!("unknown parent {} for node '{}'", p, name)));
        }
        let args: Vec<&Value> = parents.iter().map(|p| &self.nodes[p.0].value).collect();
        let value = function
            .evaluate(&args)
            .map_err(|e| Error::Validation(format!("node '{}': {}", name, e)))?;
        self.register(name, NodeKind::Deterministic { function }, value, parents)
    }

    /// Clamp an already added stochastic node to data.
    pub fn clamp(&mut self, id: NodeId, data: impl Into<Value>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id.0)
            .ok_or_else(|| Error::Validation(format!("unknown node {}", id)))?;
        match &mut node.kind {
            NodeKind::Stochastic { clamped, .. } => *clamped = true,
            _ => {
                return Err(Error::Validation(format!(
                    "only stochastic nodes can be clamped ('{}')",
                    node.label()
                )));
            }
        }
        node.value = data.into();
        Ok(())
    }

    /// Finish. Every node starts dirty; keep or initialize before sampling.
    pub fn build(self) -> Result<Model> {
        Model::from_nodes(self.nodes)
    }
}

fn check_density_arity(name: &str, density: Density, parents: &[NodeId]) -> Result<()> {
    if parents.len() != density.n_params() {
        return Err(Error::Validation(format!(
            "{} node '{}' needs {} parent(s) ({}), got {}",
            density,
            name,
            density.n_params(),
            density.param_names().join(", "),
            parents.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_rejected() {
        let mut b = ModelBuilder::new();
        b.constant("a", 1.0).unwrap();
        let err = b.constant("a", 2.0).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        // Anonymous nodes may repeat.
        b.constant("", 1.0).unwrap();
        b.constant("", 1.0).unwrap();
    }

    #[test]
    fn test_density_arity_checked() {
        let mut b = ModelBuilder::new();
        let one = b.constant("one", 1.0).unwrap();
        assert!(b.stochastic("x", Density::Normal, &[one], 0.0).is_err());
        assert!(b.stochastic("x", Density::Exponential, &[one], 0.0).is_ok());
    }

    #[test]
    fn test_deterministic_evaluated_on_insert() {
        let mut b = ModelBuilder::new();
        let a = b.constant("a", 2.0).unwrap();
        let c = b.constant("c", vec![1.0, 2.0]).unwrap();
        let d = b.deterministic("d", Function::Mul, &[a, c]).unwrap();
        let m = b.build().unwrap();
        assert_eq!(m.value(d), &Value::Vector(vec![2.0, 4.0]));
        assert_eq!(m.node(a).children(), &[d]);
    }

    #[test]
    fn test_unknown_parent() {
        let mut b = ModelBuilder::new();
        assert!(b.stochastic("x", Density::Exponential, &[NodeId(3)], 1.0).is_err());
    }

    #[test]
    fn test_clamp_constant_fails() {
        let mut b = ModelBuilder::new();
        let a = b.constant("a", 2.0).unwrap();
        assert!(b.clamp(a, 1.0).is_err());
        let x = b.stochastic("x", Density::Exponential, &[a], 1.0).unwrap();
        b.clamp(x, 0.25).unwrap();
        let m = b.build().unwrap();
        assert!(m.node(x).is_clamped());
        assert!(m.ordered_stochastic_nodes().is_empty());
    }
}
