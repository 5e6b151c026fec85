//! Best-first search over planning states.

use super::completion::RandomCompletion;
use super::config::SearchConfig;
use super::evaluation::{CandidateEvaluator, EvaluationRecord};
use super::types::{CancelHandle, NodeEvaluator, NodeScore};
use crate::model::ComponentInstance;
use crate::reduction::{DecompositionProblem, PlanningState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A ground instance found by the search, with its evaluation.
#[derive(Debug, Clone)]
pub struct SearchSolution {
    pub instance: ComponentInstance,
    pub score: f64,
    pub eval_time: Duration,
}

/// Outcome of a single [`GraphSearch::step`].
#[derive(Debug, Clone)]
pub enum SearchStep {
    /// A node was expanded; `children` successors were generated.
    Expanded { children: usize },
    /// A successfully evaluated ground instance.
    Solution(SearchSolution),
    /// The open list is empty.
    Exhausted,
    Cancelled,
    TimedOut,
}

struct OpenNode {
    f: f64,
    seq: u64,
    state: Arc<PlanningState>,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    // BinaryHeap is a max-heap: the lowest f (then the oldest) ranks highest.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Best-first search with random-completion node scoring.
///
/// Nodes are expanded in order of their f-value, lowest first, ties in
/// insertion order; the root has f = 0. A child is scored by the
/// preferred node evaluator if one is set and has an opinion, otherwise
/// by random completion. A child that is its parent's only successor
/// inherits the parent's f. Nodes scored [`NodeScore::Failed`] are
/// pruned. Every ground instance reached, as a goal child or as a random
/// completion, is reported once through [`step`](Self::step).
pub struct GraphSearch {
    graph: DecompositionProblem,
    evaluator: Arc<CandidateEvaluator>,
    node_evaluator: Option<Arc<dyn NodeEvaluator>>,
    completion: RandomCompletion,
    open: BinaryHeap<OpenNode>,
    pending: VecDeque<SearchSolution>,
    rng: StdRng,
    seq: u64,
    expansions: usize,
    cancel: CancelHandle,
    deadline: Option<Instant>,
}

impl GraphSearch {
    pub fn new(
        graph: DecompositionProblem,
        evaluator: Arc<CandidateEvaluator>,
        node_evaluator: Option<Arc<dyn NodeEvaluator>>,
        config: &SearchConfig,
        cancel: CancelHandle,
    ) -> Self {
        let completion = RandomCompletion::new(
            graph.clone(),
            Arc::clone(&evaluator),
            config.completion_samples,
            config.completion_max_draws,
            config.max_completion_depth,
            config.node_timeout,
        );
        let rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        let mut search = Self {
            graph,
            evaluator,
            node_evaluator,
            completion,
            open: BinaryHeap::new(),
            pending: VecDeque::new(),
            rng,
            seq: 0,
            expansions: 0,
            cancel,
            deadline: None,
        };
        let root = search.graph.root_state();
        search.push(root, 0.0);
        search
    }

    /// Replaces the preferred node evaluator.
    pub fn set_node_evaluator(&mut self, node_evaluator: Option<Arc<dyn NodeEvaluator>>) {
        self.node_evaluator = node_evaluator;
    }

    /// Stops the search at `deadline`.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub fn expansions(&self) -> usize {
        self.expansions
    }

    pub fn open_len(&self) -> usize {
        self.open.len()
    }

    pub fn graph(&self) -> &DecompositionProblem {
        &self.graph
    }

    fn push(&mut self, state: Arc<PlanningState>, f: f64) {
        self.open.push(OpenNode {
            f,
            seq: self.seq,
            state,
        });
        self.seq += 1;
    }

    fn queue_solution(&mut self, instance: ComponentInstance, record: &EvaluationRecord) {
        if let Ok(score) = record.score {
            self.pending.push_back(SearchSolution {
                instance,
                score,
                eval_time: record.eval_time,
            });
        }
    }

    /// Performs one unit of work.
    ///
    /// Pending solutions are reported first, one per call. Otherwise the
    /// best open node is expanded. Cancellation and the deadline are
    /// checked before each expansion.
    pub fn step(&mut self) -> SearchStep {
        if let Some(solution) = self.pending.pop_front() {
            return SearchStep::Solution(solution);
        }
        if self.cancel.is_cancelled() {
            return SearchStep::Cancelled;
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return SearchStep::TimedOut;
        }
        let Some(node) = self.open.pop() else {
            return SearchStep::Exhausted;
        };
        self.expansions += 1;

        let children = self.graph.successors(&node.state);
        trace!(
            depth = node.state.depth(),
            f = node.f,
            children = children.len(),
            "expanding node"
        );
        let count = children.len();
        let (goals, inner): (Vec<_>, Vec<_>) = children.into_iter().partition(|c| c.is_goal());

        let goal_instances: Vec<ComponentInstance> = goals
            .iter()
            .filter_map(|g| self.graph.instance_for_state(g, true))
            .collect();
        let records = self.evaluator.evaluate_batch(&goal_instances, self.deadline);
        for (instance, record) in goal_instances.into_iter().zip(records) {
            self.queue_solution(instance, &record);
        }

        for child in inner {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.score_child(&child, node.f, count == 1) {
                Some(f) => self.push(child, f),
                None => trace!(depth = child.depth(), "node pruned"),
            }
        }
        SearchStep::Expanded { children: count }
    }

    /// The f-value of `child`, or `None` if it is pruned.
    fn score_child(&mut self, child: &Arc<PlanningState>, parent_f: f64, only_child: bool) -> Option<f64> {
        if let Some(preferred) = &self.node_evaluator {
            let partial = self.graph.instance_for_state(child, false);
            match preferred.evaluate(child, partial.as_ref()) {
                NodeScore::Scored(f) => return Some(f),
                NodeScore::Failed(reason) => {
                    debug!(%reason, "preferred node evaluator rejected node");
                    return None;
                }
                NodeScore::Deferred => {}
            }
        }
        if only_child {
            return Some(parent_f);
        }
        let outcome = self.completion.estimate(child, &mut self.rng, self.deadline);
        for (instance, record) in outcome.samples {
            self.queue_solution(instance, &record);
        }
        match outcome.score {
            NodeScore::Scored(f) => Some(f),
            NodeScore::Failed(reason) => {
                debug!(%reason, "random completion pruned node");
                None
            }
            NodeScore::Deferred => Some(parent_f),
        }
    }
}

impl std::fmt::Debug for GraphSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphSearch")
            .field("open", &self.open.len())
            .field("pending", &self.pending.len())
            .field("expansions", &self.expansions)
            .finish()
    }
}
