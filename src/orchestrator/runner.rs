//! Orchestrated search execution.

use super::config::OrchestratorConfig;
use super::types::{OrchestratorResult, SolutionCandidate, Termination};
use crate::error::ConfigurationError;
use crate::reduction::{reduce, ConfigurationProblem};
use crate::search::{
    CancelHandle, CandidateEvaluator, GraphSearch, NodeEvaluator, ObjectEvaluator, SearchSolution,
    SearchStep,
};
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

type SolutionListener = Box<dyn Fn(&SolutionCandidate) + Send + Sync>;

#[derive(Default)]
struct OrchestratorState {
    best: Option<SolutionCandidate>,
    candidates: Vec<SolutionCandidate>,
    /// Hashes of the instances recorded so far.
    seen: HashSet<u64>,
    hasher: RandomState,
    structures: HashSet<String>,
    best_history: Vec<f64>,
}

/// Drives a best-first search and tracks what it finds.
///
/// Every ground instance the search reaches is evaluated (once, through
/// the cache), turned into a [`SolutionCandidate`] and posted to the
/// registered listeners. The best candidate only changes on a strictly
/// better score. All methods take `&self`, so an orchestrator shared
/// through `Arc` can be cancelled and inspected from other threads while
/// [`run`](Self::run) is in progress.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_configsearch::error::EvaluationError;
/// use u_configsearch::model::{Catalog, Component, ComponentInstance};
/// use u_configsearch::orchestrator::{OrchestratorConfig, SearchOrchestrator, Termination};
/// use u_configsearch::reduction::ConfigurationProblem;
/// use u_configsearch::refinement::RefinementConfigMap;
///
/// let catalog = Catalog::new([
///     Component::new("A").provides("Root"),
///     Component::new("B").provides("Root"),
/// ]).unwrap();
/// let problem = ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new()).unwrap();
/// let evaluator = Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
///     Ok(if inst.component().name == "A" { 1.0 } else { 0.5 })
/// });
///
/// let orchestrator = SearchOrchestrator::new(problem, evaluator, OrchestratorConfig::default()).unwrap();
/// let result = orchestrator.run(None);
/// assert_eq!(result.termination, Termination::Exhausted);
/// assert_eq!(result.best.unwrap().instance.component().name, "B");
/// ```
pub struct SearchOrchestrator {
    search: Mutex<GraphSearch>,
    evaluator: Arc<CandidateEvaluator>,
    state: Mutex<OrchestratorState>,
    listeners: Mutex<Vec<SolutionListener>>,
    cancel: CancelHandle,
    structure_bound: Option<u64>,
    retain_all: bool,
}

impl SearchOrchestrator {
    /// Reduces `problem` and prepares the search.
    pub fn new(
        problem: ConfigurationProblem,
        evaluator: Arc<dyn ObjectEvaluator>,
        config: OrchestratorConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate().map_err(ConfigurationError::InvalidConfig)?;
        let structure_bound = problem.count_unparametrized_compositions();
        let cancel = CancelHandle::new();
        let evaluator = Arc::new(CandidateEvaluator::new(evaluator, &config.search, cancel.clone())?);
        let graph = reduce(problem);
        let search = GraphSearch::new(graph, Arc::clone(&evaluator), None, &config.search, cancel.clone());
        Ok(Self {
            search: Mutex::new(search),
            evaluator,
            state: Mutex::new(OrchestratorState::default()),
            listeners: Mutex::new(Vec::new()),
            cancel,
            structure_bound,
            retain_all: config.retain_all_candidates,
        })
    }

    /// Sets a preferred node evaluator consulted before random completion.
    pub fn with_node_evaluator(self, node_evaluator: Arc<dyn NodeEvaluator>) -> Self {
        self.search.lock().set_node_evaluator(Some(node_evaluator));
        self
    }

    /// Registers a listener for new solution candidates.
    ///
    /// Listeners are called synchronously on the thread running the
    /// search, in registration order, and must not register further
    /// listeners from within the callback.
    pub fn on_solution<F>(&self, listener: F)
    where
        F: Fn(&SolutionCandidate) + Send + Sync + 'static,
    {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Runs the search until the graph is exhausted, `timeout` elapses or
    /// the run is cancelled.
    ///
    /// Calling `run` again resumes where the previous call stopped.
    pub fn run(&self, timeout: Option<Duration>) -> OrchestratorResult {
        let started = Instant::now();
        let mut search = self.search.lock();
        search.set_deadline(timeout.map(|t| started + t));
        info!(
            timeout = ?timeout,
            structure_bound = ?self.structure_bound,
            "search started"
        );

        let termination = loop {
            match search.step() {
                SearchStep::Expanded { .. } => {}
                SearchStep::Solution(solution) => self.record(solution, started.elapsed()),
                SearchStep::Exhausted => break Termination::Exhausted,
                SearchStep::TimedOut => break Termination::TimedOut,
                SearchStep::Cancelled => break Termination::Cancelled,
            }
        };

        let state = self.state.lock();
        let result = OrchestratorResult {
            best: state.best.clone(),
            termination,
            expansions: search.expansions(),
            candidates: state.seen.len(),
            distinct_structures: state.structures.len(),
            structure_bound: self.structure_bound,
            elapsed: started.elapsed(),
            best_history: state.best_history.clone(),
        };
        info!(
            ?termination,
            expansions = result.expansions,
            candidates = result.candidates,
            best = ?result.best.as_ref().map(|b| b.score),
            "search finished"
        );
        result
    }

    fn record(&self, solution: SearchSolution, found_at: Duration) {
        let candidate = {
            let mut state = self.state.lock();
            let key = state.hasher.hash_one(&solution.instance);
            if !state.seen.insert(key) {
                return;
            }
            let candidate = SolutionCandidate {
                structure: solution.instance.structure_key(),
                instance: solution.instance,
                score: solution.score,
                eval_time: solution.eval_time,
                found_at,
            };
            state.structures.insert(candidate.structure.clone());
            if self.retain_all {
                state.candidates.push(candidate.clone());
            }
            let improved = state
                .best
                .as_ref()
                .map_or(true, |best| candidate.score < best.score);
            if improved {
                info!(score = candidate.score, instance = %candidate.instance, "new best solution");
                state.best_history.push(candidate.score);
                state.best = Some(candidate.clone());
            } else {
                debug!(score = candidate.score, "solution candidate");
            }
            candidate
        };
        for listener in self.listeners.lock().iter() {
            listener(&candidate);
        }
    }

    /// Requests cancellation; the run stops before its next expansion
    /// and outstanding evaluations are abandoned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// The best candidate seen so far.
    pub fn best(&self) -> Option<SolutionCandidate> {
        self.state.lock().best.clone()
    }

    /// Every distinct candidate seen so far, in discovery order.
    ///
    /// Empty unless the orchestrator retains all candidates.
    pub fn all_candidates(&self) -> Vec<SolutionCandidate> {
        self.state.lock().candidates.clone()
    }

    /// Upper bound on distinct component structures; `None` if unbounded.
    pub fn structure_bound(&self) -> Option<u64> {
        self.structure_bound
    }

    pub fn evaluator(&self) -> &Arc<CandidateEvaluator> {
        &self.evaluator
    }
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("structure_bound", &self.structure_bound)
            .field("retain_all", &self.retain_all)
            .finish()
    }
}
