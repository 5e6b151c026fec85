//! Solution candidates and run results.

use crate::model::ComponentInstance;
use std::cmp::Ordering;
use std::time::Duration;

/// A distinct, successfully evaluated configuration.
#[derive(Debug, Clone)]
pub struct SolutionCandidate {
    pub instance: ComponentInstance,
    /// Search-phase score; lower is better.
    pub score: f64,
    /// Time the evaluator spent on this candidate.
    pub eval_time: Duration,
    /// Structural identity, see [`ComponentInstance::structure_key`].
    pub structure: String,
    /// Time since the start of the run at which the candidate was found.
    pub found_at: Duration,
}

impl SolutionCandidate {
    /// Orders candidates by score, best first.
    pub fn cmp_score(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The whole search graph was explored.
    Exhausted,
    TimedOut,
    Cancelled,
}

/// Summary of an orchestrated search run.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    /// The best candidate seen, if any evaluation succeeded.
    pub best: Option<SolutionCandidate>,

    pub termination: Termination,

    /// Number of node expansions.
    pub expansions: usize,

    /// Distinct successfully evaluated candidates.
    pub candidates: usize,

    /// Distinct component structures among the candidates.
    pub distinct_structures: usize,

    /// Upper bound on distinct structures; `None` if unbounded.
    pub structure_bound: Option<u64>,

    pub elapsed: Duration,

    /// Best score after each improvement, in order.
    pub best_history: Vec<f64>,
}
