//! Two-phase execution: search, then select.

use super::config::{TimeBudget, TwoPhaseConfig};
use super::types::{Materializer, OptimizerState, ShortlistEntry, TwoPhaseResult};
use crate::error::{ConfigurationError, EvaluationError, OptimizerError};
use crate::model::ComponentInstance;
use crate::orchestrator::{OrchestratorConfig, SearchOrchestrator, SolutionCandidate, Termination};
use crate::reduction::ConfigurationProblem;
use crate::search::{CancelHandle, CandidateEvaluator, NodeEvaluator, ObjectEvaluator};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct Inner {
    state: OptimizerState,
    problem: Option<ConfigurationProblem>,
    orchestrator: Option<Arc<SearchOrchestrator>>,
    running: bool,
}

/// Search with a cheap evaluator, then pick among the best candidates
/// with an expensive one.
///
/// Phase 1 runs a [`SearchOrchestrator`] for the search share of the time
/// budget. Phase 2 re-scores a shortlist of the best phase-1 candidates
/// with the selection evaluator and returns the one scoring best there.
/// Without a selection evaluator the phase-1 best is returned.
///
/// The optimizer moves `CREATED -> ACTIVE -> INACTIVE` and runs once.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use u_configsearch::error::EvaluationError;
/// use u_configsearch::model::{Catalog, Component, ComponentInstance};
/// use u_configsearch::reduction::ConfigurationProblem;
/// use u_configsearch::refinement::RefinementConfigMap;
/// use u_configsearch::twophase::{OptimizerState, TwoPhaseConfig, TwoPhaseOptimizer};
///
/// let catalog = Catalog::new([
///     Component::new("A").provides("Root"),
///     Component::new("B").provides("Root"),
/// ]).unwrap();
/// let problem = ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new()).unwrap();
/// let search = Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
///     Ok(if inst.component().name == "A" { 0.1 } else { 0.2 })
/// });
/// let selection = Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
///     Ok(if inst.component().name == "A" { 0.9 } else { 0.3 })
/// });
///
/// let config = TwoPhaseConfig::default()
///     .with_timeout(Duration::from_secs(10))
///     .with_shortlist_size(2)
///     .with_max_margin_from_best(None);
/// let optimizer = TwoPhaseOptimizer::new(problem, search, config).with_selection_evaluator(selection);
/// let result = optimizer.call().unwrap();
/// assert_eq!(result.selected.instance.component().name, "B");
/// assert_eq!(optimizer.state(), OptimizerState::Inactive);
/// ```
pub struct TwoPhaseOptimizer {
    config: TwoPhaseConfig,
    search_evaluator: Arc<dyn ObjectEvaluator>,
    selection_evaluator: Option<Arc<dyn ObjectEvaluator>>,
    node_evaluator: Option<Arc<dyn NodeEvaluator>>,
    inner: Mutex<Inner>,
    cancel: CancelHandle,
}

impl TwoPhaseOptimizer {
    pub fn new(
        problem: ConfigurationProblem,
        search_evaluator: Arc<dyn ObjectEvaluator>,
        config: TwoPhaseConfig,
    ) -> Self {
        Self {
            config,
            search_evaluator,
            selection_evaluator: None,
            node_evaluator: None,
            inner: Mutex::new(Inner {
                state: OptimizerState::Created,
                problem: Some(problem),
                orchestrator: None,
                running: false,
            }),
            cancel: CancelHandle::new(),
        }
    }

    /// Enables the selection phase.
    pub fn with_selection_evaluator(mut self, evaluator: Arc<dyn ObjectEvaluator>) -> Self {
        self.selection_evaluator = Some(evaluator);
        self
    }

    /// Preferred node evaluator for the search phase.
    pub fn with_node_evaluator(mut self, evaluator: Arc<dyn NodeEvaluator>) -> Self {
        self.node_evaluator = Some(evaluator);
        self
    }

    pub fn state(&self) -> OptimizerState {
        self.inner.lock().state
    }

    pub fn config(&self) -> &TwoPhaseConfig {
        &self.config
    }

    /// The time budget split between the phases.
    pub fn budget(&self) -> TimeBudget {
        if self.selection_evaluator.is_some() {
            self.config.budget()
        } else {
            TimeBudget::search_only(self.config.timeout)
        }
    }

    /// Validates the configuration and prepares the search phase.
    ///
    /// Only allowed in [`OptimizerState::Created`]. A failed validation
    /// leaves the optimizer inactive.
    pub fn init(&self) -> Result<(), OptimizerError> {
        let mut inner = self.inner.lock();
        if inner.state != OptimizerState::Created {
            return Err(OptimizerError::InvalidState {
                state: inner.state.to_string(),
                action: "init".into(),
            });
        }
        match self.prepare(&mut inner) {
            Ok(()) => {
                inner.state = OptimizerState::Active;
                Ok(())
            }
            Err(e) => {
                inner.state = OptimizerState::Inactive;
                Err(e)
            }
        }
    }

    fn prepare(&self, inner: &mut Inner) -> Result<(), OptimizerError> {
        self.config
            .validate()
            .map_err(ConfigurationError::InvalidConfig)?;
        let problem = inner
            .problem
            .take()
            .ok_or_else(|| ConfigurationError::InvalidConfig("problem already consumed".into()))?;
        let orchestrator_config = OrchestratorConfig::default()
            .with_search(self.config.search.clone())
            .with_retain_all_candidates(true);
        let mut orchestrator = SearchOrchestrator::new(
            problem,
            Arc::clone(&self.search_evaluator),
            orchestrator_config,
        )?;
        if let Some(node_evaluator) = &self.node_evaluator {
            orchestrator = orchestrator.with_node_evaluator(Arc::clone(node_evaluator));
        }
        let budget = self.budget();
        info!(
            total = ?budget.total,
            search = ?budget.search,
            selection = ?budget.reserved_for_selection,
            blow_up = self.config.blow_up(),
            "two-phase optimizer initialized"
        );
        inner.orchestrator = Some(Arc::new(orchestrator));
        Ok(())
    }

    /// Runs both phases.
    ///
    /// Initializes first if still created. Fails with
    /// [`OptimizerError::InvalidState`] once the optimizer is inactive.
    pub fn call(&self) -> Result<TwoPhaseResult, OptimizerError> {
        let started = Instant::now();
        if self.state() == OptimizerState::Created {
            self.init()?;
        }
        let orchestrator = {
            let mut inner = self.inner.lock();
            let orchestrator = match (&inner.orchestrator, inner.state, inner.running) {
                (Some(orchestrator), OptimizerState::Active, false) => Arc::clone(orchestrator),
                _ => {
                    return Err(OptimizerError::InvalidState {
                        state: inner.state.to_string(),
                        action: "call".into(),
                    })
                }
            };
            inner.running = true;
            orchestrator
        };
        if self.cancel.is_cancelled() {
            orchestrator.cancel();
        }
        let result = self.run(&orchestrator, started);

        let mut inner = self.inner.lock();
        inner.state = OptimizerState::Inactive;
        inner.running = false;
        inner.orchestrator = None;
        result
    }

    /// Runs both phases and materializes the winner.
    pub fn call_and_materialize<M: Materializer>(
        &self,
        materializer: &M,
    ) -> Result<(TwoPhaseResult, M::Output), OptimizerError> {
        let result = self.call()?;
        let artifact = materializer
            .materialize(&result.selected.instance)
            .map_err(OptimizerError::Materialization)?;
        Ok((result, artifact))
    }

    /// Requests cancellation of a running or future call.
    pub fn cancel(&self) {
        self.cancel.cancel();
        if let Some(orchestrator) = &self.inner.lock().orchestrator {
            orchestrator.cancel();
        }
    }

    fn run(&self, orchestrator: &Arc<SearchOrchestrator>, started: Instant) -> Result<TwoPhaseResult, OptimizerError> {
        let budget = self.budget();
        let deadline = started + budget.total;
        let stopped_early = Arc::new(AtomicBool::new(false));
        if self.selection_evaluator.is_some() {
            self.install_phase1_monitor(orchestrator, deadline, Arc::clone(&stopped_early));
        }

        let search_time = search_time_left(started, &budget, Instant::now());
        info!(budget = ?budget.search, remaining = ?search_time, "search phase started");
        let search = orchestrator.run(Some(search_time));
        if self.cancel.is_cancelled() {
            return Err(OptimizerError::Cancelled);
        }
        let candidates = orchestrator.all_candidates();
        let Some(best) = search.best.clone() else {
            return Err(match search.termination {
                Termination::TimedOut => OptimizerError::TimedOut,
                Termination::Cancelled => OptimizerError::Cancelled,
                Termination::Exhausted => OptimizerError::NoSolution,
            });
        };

        let Some(selection_evaluator) = &self.selection_evaluator else {
            info!(score = best.score, instance = %best.instance, "selection disabled; returning search best");
            return Ok(TwoPhaseResult {
                selected: best,
                selection_score: None,
                shortlist: Vec::new(),
                search,
                budget,
                search_stopped_early: false,
                elapsed: started.elapsed(),
            });
        };

        let mut rng = StdRng::seed_from_u64(self.config.search.seed.unwrap_or_else(rand::random));
        let shortlist = select_shortlist(
            &candidates,
            self.config.shortlist_size,
            self.config.max_margin_from_best,
            &mut rng,
        );
        info!(
            candidates = candidates.len(),
            shortlisted = shortlist.len(),
            remaining = ?deadline.saturating_duration_since(Instant::now()),
            "selection phase started"
        );

        let entries = self.select(selection_evaluator, shortlist, deadline)?;
        let winner = entries
            .iter()
            .filter_map(|e| e.selection.as_ref().ok().map(|s| (e, *s)))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((winner, selection_score)) = winner else {
            let last_error = entries
                .iter()
                .rev()
                .find_map(|e| e.selection.clone().err())
                .unwrap_or(EvaluationError::Cancelled);
            warn!(attempted = entries.len(), error = %last_error, "selection failed for every candidate");
            return Err(if self.cancel.is_cancelled() {
                OptimizerError::Cancelled
            } else {
                OptimizerError::SelectionFailed {
                    attempted: entries.len(),
                    last_error,
                }
            });
        };
        let selected = winner.candidate.clone();
        info!(
            selection_score,
            search_score = selected.score,
            instance = %selected.instance,
            "candidate selected"
        );
        Ok(TwoPhaseResult {
            selected,
            selection_score: Some(selection_score),
            shortlist: entries,
            search,
            budget,
            search_stopped_early: stopped_early.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        })
    }

    /// Stops the search phase once selecting among the current shortlist
    /// would no longer fit into the remaining time.
    fn install_phase1_monitor(
        &self,
        orchestrator: &Arc<SearchOrchestrator>,
        deadline: Instant,
        stopped_early: Arc<AtomicBool>,
    ) {
        let k = self.config.shortlist_size;
        let best_k = Mutex::new(BestK::new(k));
        let blow_up = self.config.blow_up();
        let parallelism = self.config.search.cpus.min(k).max(1) as f64;
        let margin = self.config.phase1_safety_margin;
        let handle = orchestrator.cancel_handle();
        orchestrator.on_solution(move |candidate| {
            let shortlist_time = best_k.lock().push(candidate.score, candidate.eval_time);
            let expected = shortlist_time.mul_f64(blow_up / parallelism) + margin;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if expected > remaining && !stopped_early.swap(true, Ordering::Relaxed) {
                info!(?expected, ?remaining, "stopping search phase to leave time for selection");
                handle.cancel();
            }
        });
    }

    fn select(
        &self,
        evaluator: &Arc<dyn ObjectEvaluator>,
        shortlist: Vec<SolutionCandidate>,
        deadline: Instant,
    ) -> Result<Vec<ShortlistEntry>, OptimizerError> {
        let blow_up = self.config.blow_up();
        let mut selection_config = self.config.search.clone();
        selection_config.candidate_timeout = self
            .config
            .search
            .candidate_timeout
            .map(|t| t.mul_f64(blow_up * (1.0 + self.config.selection_timeout_tolerance)));
        let selection = CandidateEvaluator::new(Arc::clone(evaluator), &selection_config, self.cancel.clone())?;
        let instances: Vec<ComponentInstance> = shortlist.iter().map(|c| c.instance.clone()).collect();
        let records = selection.evaluate_batch(&instances, Some(deadline));
        Ok(shortlist
            .into_iter()
            .zip(records)
            .map(|(candidate, record)| {
                if let Err(e) = &record.score {
                    warn!(instance = %candidate.instance, error = %e, "selection evaluation failed");
                }
                ShortlistEntry {
                    candidate,
                    selection: record.score,
                    selection_time: record.eval_time,
                }
            })
            .collect())
    }
}

/// Time left for the search phase, measured from the start of the call
/// so that time spent initializing comes out of the search share.
fn search_time_left(started: Instant, budget: &TimeBudget, now: Instant) -> Duration {
    (started + budget.search).saturating_duration_since(now)
}

#[derive(Debug, Clone, Copy)]
struct Ranked {
    score: f64,
    eval_time: Duration,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.score.total_cmp(&other.score)
    }
}

/// The `k` best-scoring candidates seen so far; the worst sits on top of
/// the heap and is evicted first.
struct BestK {
    k: usize,
    heap: BinaryHeap<Ranked>,
}

impl BestK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    /// Adds a candidate and returns the summed evaluation time of the
    /// current best `k`.
    fn push(&mut self, score: f64, eval_time: Duration) -> Duration {
        self.heap.push(Ranked { score, eval_time });
        if self.heap.len() > self.k {
            self.heap.pop();
        }
        self.heap.iter().map(|r| r.eval_time).sum()
    }
}

/// Picks up to `k` candidates for the selection phase.
///
/// The best `ceil(k / 2)` candidates by score are always included. The
/// rest is drawn at random among the remaining candidates scoring within
/// `margin` of the best (all remaining candidates if `margin` is `None`).
pub fn select_shortlist(
    candidates: &[SolutionCandidate],
    k: usize,
    margin: Option<f64>,
    rng: &mut StdRng,
) -> Vec<SolutionCandidate> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(SolutionCandidate::cmp_score);
    if sorted.len() <= k {
        return sorted;
    }
    let top = k.div_ceil(2);
    let best = sorted[0].score;
    let mut rest: Vec<SolutionCandidate> = sorted
        .split_off(top)
        .into_iter()
        .filter(|c| margin.map_or(true, |m| c.score <= best + m))
        .collect();
    rest.shuffle(rng);
    sorted.extend(rest.into_iter().take(k - top));
    sorted
}

impl std::fmt::Debug for TwoPhaseOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoPhaseOptimizer")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("selection", &self.selection_evaluator.is_some())
            .finish()
    }
}
