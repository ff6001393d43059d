//! Monitors: observers invoked by the chain after each generation.

use dm_core::{Error, Result};
use dm_graph::{Model, NodeId};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

/// Observer of a chain's model.
///
/// Only the active chain of an ensemble opens streams, prints headers and
/// records samples; the driver enforces this.
pub trait Monitor: Send + Sync + Debug {
    /// Monitor name for messages.
    fn name(&self) -> &str;

    /// Monitored nodes, in the order [`Monitor::rebind`] expects them.
    fn nodes(&self) -> &[NodeId];

    /// Repoint the monitor at the corresponding nodes of another model.
    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()>;

    /// Prepare for a run of `num_cycles` generations.
    fn reset(&mut self, num_cycles: u64);

    /// Open (or truncate) the output.
    fn open_stream(&mut self) -> Result<()>;

    /// Write the column header.
    fn print_header(&mut self, model: &Model) -> Result<()>;

    /// Record the state at `generation`.
    fn monitor(&mut self, generation: u64, model: &Model) -> Result<()>;

    /// Clone into a box.
    fn box_clone(&self) -> Box<dyn Monitor>;
}

impl Clone for Box<dyn Monitor> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// One recorded sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRow {
    /// Generation number.
    pub generation: u64,
    /// Joint log-probability (likelihood + prior).
    pub posterior: f64,
    /// Likelihood partition.
    pub likelihood: f64,
    /// Prior partition.
    pub prior: f64,
    /// Monitored values, vectors flattened in order.
    pub values: Vec<f64>,
}

/// In-memory trace written by [`TraceMonitor`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Trace {
    /// Column names for [`TraceRow::values`]; vector elements are `name[i]` (1-based).
    pub columns: Vec<String>,
    /// Recorded rows in generation order.
    pub rows: Vec<TraceRow>,
}

impl Trace {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row has been recorded.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All recorded values of one column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().filter_map(|r| r.values.get(j).copied()).collect())
    }

    /// `(mean, sd)` of a column over rows with `generation >= from`.
    pub fn mean_sd(&self, name: &str, from: u64) -> Option<(f64, f64)> {
        let j = self.columns.iter().position(|c| c == name)?;
        let xs: Vec<f64> = self
            .rows
            .iter()
            .filter(|r| r.generation >= from)
            .filter_map(|r| r.values.get(j).copied())
            .collect();
        if xs.is_empty() {
            return None;
        }
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = if xs.len() > 1 {
            xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0)
        } else {
            0.0
        };
        Some((mean, var.sqrt()))
    }
}

/// Shared handle to a [`Trace`].
pub type TraceSink = Arc<Mutex<Trace>>;

/// Records the joint probability and node values every `print_every` generations.
///
/// Clones write to the same sink, so a monitor handed to several chains is
/// read back from one place.
#[derive(Debug, Clone)]
pub struct TraceMonitor {
    nodes: Vec<NodeId>,
    print_every: u64,
    sink: TraceSink,
}

impl TraceMonitor {
    /// Monitor `nodes` every `print_every` generations (at least 1).
    pub fn new(nodes: Vec<NodeId>, print_every: u64) -> Self {
        Self { nodes, print_every: print_every.max(1), sink: TraceSink::default() }
    }

    /// Shared sink this monitor writes to.
    pub fn sink(&self) -> TraceSink {
        Arc::clone(&self.sink)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Trace>> {
        self.sink
            .lock()
            .map_err(|_| Error::Computation("trace sink lock poisoned".into()))
    }
}

impl Monitor for TraceMonitor {
    fn name(&self) -> &str {
        "Trace"
    }

    fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    fn rebind(&mut self, nodes: &[NodeId]) -> Result<()> {
        if nodes.len() != self.nodes.len() {
            return Err(Error::Configuration(format!(
                "Trace monitor watches {} node(s), got {} to rebind",
                self.nodes.len(),
                nodes.len()
            )));
        }
        self.nodes = nodes.to_vec();
        Ok(())
    }

    fn reset(&mut self, num_cycles: u64) {
        let expected = (num_cycles / self.print_every + 1) as usize;
        if let Ok(mut trace) = self.sink.lock() {
            trace.rows.reserve(expected);
        }
    }

    fn open_stream(&mut self) -> Result<()> {
        let mut trace = self.lock()?;
        trace.rows.clear();
        trace.columns.clear();
        Ok(())
    }

    fn print_header(&mut self, model: &Model) -> Result<()> {
        let mut columns = Vec::new();
        for &id in &self.nodes {
            let name = model.label(id);
            let value = model.value(id);
            if value.is_vector() {
                columns.extend((1..=value.len()).map(|i| format!("{}[{}]", name, i)));
            } else {
                columns.push(name);
            }
        }
        self.lock()?.columns = columns;
        Ok(())
    }

    fn monitor(&mut self, generation: u64, model: &Model) -> Result<()> {
        if generation % self.print_every != 0 {
            return Ok(());
        }
        let p = model.cached_partition();
        let values = self.nodes.iter().flat_map(|&id| model.value(id).elements().iter().copied()).collect();
        self.lock()?.rows.push(TraceRow {
            generation,
            posterior: p.total(),
            likelihood: p.likelihood,
            prior: p.prior,
            values,
        });
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Monitor> {
        Box::new(self.clone())
    }
}
