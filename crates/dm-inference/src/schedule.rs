//! Move schedules: which move runs next, and how many run per iteration.

use crate::moves::Move;
use dm_core::{Error, Result};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;

/// Policy choosing moves.
///
/// Schedules only hold weights; they return indices into the move list they
/// were built from.
pub trait MoveSchedule: Send + Debug {
    /// Index of the next move to perform.
    fn next_move(&mut self, generation: u64, rng: &mut dyn RngCore) -> Result<usize>;

    /// Proposals per iteration (the driver rounds this to an integer).
    fn moves_per_iteration(&self) -> f64;

    /// Which variant this is.
    fn schedule_type(&self) -> ScheduleType;
}

/// Schedule variants, named as in run configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    /// Weighted random draws, `round(sum of weights)` per iteration.
    #[default]
    Random,
    /// One weighted random draw per iteration.
    Single,
    /// Every positive-weight move once per iteration, in order.
    Sequential,
}

impl ScheduleType {
    /// Configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Random => "random",
            ScheduleType::Single => "single",
            ScheduleType::Sequential => "sequential",
        }
    }

    /// Build a schedule of this type over `moves`.
    pub fn build(self, moves: &[Move]) -> Box<dyn MoveSchedule> {
        match self {
            ScheduleType::Random => Box::new(RandomMoveSchedule::new(moves)),
            ScheduleType::Single => Box::new(SingleRandomMoveSchedule::new(moves)),
            ScheduleType::Sequential => Box::new(SequentialMoveSchedule::new(moves)),
        }
    }
}

impl FromStr for ScheduleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "random" => Ok(ScheduleType::Random),
            "single" => Ok(ScheduleType::Single),
            "sequential" => Ok(ScheduleType::Sequential),
            other => Err(Error::Configuration(format!(
                "unknown move schedule '{}' (expected random, single or sequential)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(index, weight)` for every move with weight `> 0`.
fn positive_weights(moves: &[Move]) -> Vec<(usize, f64)> {
    moves
        .iter()
        .enumerate()
        .filter(|(_, m)| m.weight() > 0.0)
        .map(|(i, m)| (i, m.weight()))
        .collect()
}

/// Weighted draw over positive weights.
fn draw_weighted(weights: &[(usize, f64)], total: f64, rng: &mut dyn RngCore) -> Result<usize> {
    let Some(&(last, _)) = weights.last() else {
        return Err(Error::Configuration("no move with a positive weight to schedule".into()));
    };
    let u: f64 = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for &(i, w) in weights {
        acc += w;
        if u < acc {
            return Ok(i);
        }
    }
    Ok(last)
}

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

/// Weighted random schedule performing `round(sum of weights)` draws per iteration.
#[derive(Debug, Clone)]
pub struct RandomMoveSchedule {
    weights: Vec<(usize, f64)>,
    total: f64,
}

impl RandomMoveSchedule {
    /// Schedule over `moves`.
    pub fn new(moves: &[Move]) -> Self {
        let weights = positive_weights(moves);
        let total = weights.iter().map(|(_, w)| w).sum();
        Self { weights, total }
    }
}

impl MoveSchedule for RandomMoveSchedule {
    fn next_move(&mut self, _generation: u64, rng: &mut dyn RngCore) -> Result<usize> {
        draw_weighted(&self.weights, self.total, rng)
    }

    fn moves_per_iteration(&self) -> f64 {
        self.total
    }

    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::Random
    }
}

// ---------------------------------------------------------------------------
// Single
// ---------------------------------------------------------------------------

/// One weighted random draw per iteration.
#[derive(Debug, Clone)]
pub struct SingleRandomMoveSchedule {
    weights: Vec<(usize, f64)>,
    total: f64,
}

impl SingleRandomMoveSchedule {
    /// Schedule over `moves`.
    pub fn new(moves: &[Move]) -> Self {
        let weights = positive_weights(moves);
        let total = weights.iter().map(|(_, w)| w).sum();
        Self { weights, total }
    }
}

impl MoveSchedule for SingleRandomMoveSchedule {
    fn next_move(&mut self, _generation: u64, rng: &mut dyn RngCore) -> Result<usize> {
        draw_weighted(&self.weights, self.total, rng)
    }

    fn moves_per_iteration(&self) -> f64 {
        if self.weights.is_empty() { 0.0 } else { 1.0 }
    }

    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::Single
    }
}

// ---------------------------------------------------------------------------
// Sequential
// ---------------------------------------------------------------------------

/// Cycles through the positive-weight moves in list order.
#[derive(Debug, Clone)]
pub struct SequentialMoveSchedule {
    order: Vec<usize>,
    next: usize,
}

impl SequentialMoveSchedule {
    /// Schedule over `moves`.
    pub fn new(moves: &[Move]) -> Self {
        let order = positive_weights(moves).into_iter().map(|(i, _)| i).collect();
        Self { order, next: 0 }
    }
}

impl MoveSchedule for SequentialMoveSchedule {
    fn next_move(&mut self, _generation: u64, _rng: &mut dyn RngCore) -> Result<usize> {
        if self.order.is_empty() {
            return Err(Error::Configuration("no move with a positive weight to schedule".into()));
        }
        let i = self.order[self.next % self.order.len()];
        self.next = (self.next + 1) % self.order.len();
        Ok(i)
    }

    fn moves_per_iteration(&self) -> f64 {
        self.order.len() as f64
    }

    fn schedule_type(&self) -> ScheduleType {
        ScheduleType::Sequential
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proposal::SlideProposal;
    use dm_graph::NodeId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn moves(weights: &[f64]) -> Vec<Move> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Move::new(SlideProposal::new(NodeId(i), 1.0).unwrap(), w))
            .collect()
    }

    #[test]
    fn test_moves_per_iteration() {
        let m = moves(&[2.0, 3.0, 5.0]);
        assert_eq!(ScheduleType::Random.build(&m).moves_per_iteration(), 10.0);
        assert_eq!(ScheduleType::Single.build(&m).moves_per_iteration(), 1.0);
        assert_eq!(ScheduleType::Sequential.build(&moves(&[1.0, 7.0, 0.5, 2.0])).moves_per_iteration(), 4.0);
    }

    #[test]
    fn test_empty_list_reports_zero() {
        for t in [ScheduleType::Random, ScheduleType::Single, ScheduleType::Sequential] {
            let mut s = t.build(&[]);
            assert_eq!(s.moves_per_iteration(), 0.0);
            let mut rng = StdRng::seed_from_u64(0);
            assert!(matches!(s.next_move(0, &mut rng), Err(Error::Configuration(_))));
        }
    }

    #[test]
    fn test_non_positive_weight_never_selected() {
        let m = moves(&[1.0, 0.0, -2.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut random = ScheduleType::Random.build(&m);
        let mut seq = ScheduleType::Sequential.build(&m);
        for g in 0..500 {
            let i = random.next_move(g, &mut rng).unwrap();
            assert!(i == 0 || i == 3);
            let j = seq.next_move(g, &mut rng).unwrap();
            assert!(j == 0 || j == 3);
        }
    }

    #[test]
    fn test_weighted_frequencies() {
        let m = moves(&[1.0, 3.0]);
        let mut rng = StdRng::seed_from_u64(123);
        let mut s = ScheduleType::Random.build(&m);
        let n = 20_000;
        let hits = (0..n).filter(|&g| s.next_move(g, &mut rng).unwrap() == 1).count();
        let frac = hits as f64 / n as f64;
        assert!((frac - 0.75).abs() < 0.02, "frac = {}", frac);
    }

    #[test]
    fn test_sequential_order() {
        let m = moves(&[1.0, 1.0, 1.0]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut s = ScheduleType::Sequential.build(&m);
        let picks: Vec<usize> = (0..5).map(|g| s.next_move(g, &mut rng).unwrap()).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_parse_schedule_type() {
        assert_eq!("single".parse::<ScheduleType>().unwrap(), ScheduleType::Single);
        assert!(matches!("greedy".parse::<ScheduleType>(), Err(Error::Configuration(_))));
        let t: ScheduleType = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(t, ScheduleType::Sequential);
    }
}
