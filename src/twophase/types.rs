//! Optimizer lifecycle, results and the materialization hook.

use super::config::TimeBudget;
use crate::error::EvaluationError;
use crate::model::ComponentInstance;
use crate::orchestrator::{OrchestratorResult, SolutionCandidate};
use std::fmt;
use std::time::Duration;

/// Lifecycle of a [`TwoPhaseOptimizer`](super::TwoPhaseOptimizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerState {
    /// Constructed, not yet validated.
    Created,
    /// Validated and ready to run.
    Active,
    /// Finished (successfully or not). Terminal.
    Inactive,
}

impl fmt::Display for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizerState::Created => "CREATED",
            OptimizerState::Active => "ACTIVE",
            OptimizerState::Inactive => "INACTIVE",
        };
        f.write_str(name)
    }
}

/// Builds the final artifact (e.g. a trained model) from the winner.
pub trait Materializer: Send + Sync {
    type Output;

    fn materialize(&self, instance: &ComponentInstance) -> Result<Self::Output, EvaluationError>;
}

impl<F, T> Materializer for F
where
    F: Fn(&ComponentInstance) -> Result<T, EvaluationError> + Send + Sync,
{
    type Output = T;

    fn materialize(&self, instance: &ComponentInstance) -> Result<T, EvaluationError> {
        self(instance)
    }
}

/// A shortlisted candidate and its selection-phase outcome.
#[derive(Debug, Clone)]
pub struct ShortlistEntry {
    pub candidate: SolutionCandidate,
    pub selection: Result<f64, EvaluationError>,
    pub selection_time: Duration,
}

/// Outcome of a successful two-phase run.
#[derive(Debug, Clone)]
pub struct TwoPhaseResult {
    /// The chosen candidate.
    pub selected: SolutionCandidate,

    /// Its selection-phase score; `None` when selection was skipped.
    pub selection_score: Option<f64>,

    /// Shortlisted candidates in evaluation order. Empty when selection
    /// was skipped.
    pub shortlist: Vec<ShortlistEntry>,

    /// Summary of the search phase.
    pub search: OrchestratorResult,

    pub budget: TimeBudget,

    /// The search phase was stopped to leave room for selection.
    pub search_stopped_early: bool,

    pub elapsed: Duration,
}
