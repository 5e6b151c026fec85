//! Node scoring by random completion.

use super::evaluation::{CandidateEvaluator, EvaluationRecord};
use super::types::NodeScore;
use crate::error::EvaluationError;
use crate::model::ComponentInstance;
use crate::reduction::{DecompositionProblem, PlanningState};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of sampling completions below a node.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    /// Best sampled score, [`NodeScore::Failed`] if every draw failed,
    /// [`NodeScore::Deferred`] if nothing could be drawn in time.
    pub score: NodeScore,
    /// Every ground instance reached, with its evaluation.
    pub samples: Vec<(ComponentInstance, EvaluationRecord)>,
    pub draws: usize,
}

/// Estimates a node's f-value by completing it randomly.
///
/// Draws random paths from the node down to goal states (uniform choice
/// among successors at every step), evaluates the resulting ground
/// instances and reports the best score. Sampling stops once the desired
/// number of successful samples is reached, after the maximum number of
/// draws, or at the node deadline.
#[derive(Debug)]
pub struct RandomCompletion {
    graph: DecompositionProblem,
    evaluator: Arc<CandidateEvaluator>,
    samples: usize,
    max_draws: usize,
    max_depth: usize,
    node_timeout: Option<Duration>,
}

impl RandomCompletion {
    pub fn new(
        graph: DecompositionProblem,
        evaluator: Arc<CandidateEvaluator>,
        samples: usize,
        max_draws: usize,
        max_depth: usize,
        node_timeout: Option<Duration>,
    ) -> Self {
        Self {
            graph,
            evaluator,
            samples,
            max_draws: max_draws.max(samples),
            max_depth,
            node_timeout,
        }
    }

    /// Samples completions of `state`.
    ///
    /// `deadline` is the global search deadline; the node deadline is
    /// derived from it and the configured node timeout.
    pub fn estimate(
        &self,
        state: &Arc<PlanningState>,
        rng: &mut StdRng,
        deadline: Option<Instant>,
    ) -> CompletionOutcome {
        let started = Instant::now();
        let node_deadline = match (self.node_timeout.map(|t| started + t), deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut samples = Vec::new();
        let mut draws = 0usize;
        let mut successes = 0usize;
        let mut failures = 0usize;
        let mut best: Option<f64> = None;
        let mut last_error: Option<String> = None;

        while successes < self.samples && draws < self.max_draws {
            if node_deadline.is_some_and(|d| Instant::now() >= d)
                || self.evaluator.cancel_handle().is_cancelled()
            {
                break;
            }
            let batch = (self.samples - successes).min(self.max_draws - draws);
            let mut instances = Vec::with_capacity(batch);
            for _ in 0..batch {
                draws += 1;
                match self
                    .random_walk(state, rng)
                    .and_then(|goal| self.graph.instance_for_state(&goal, true))
                {
                    Some(instance) => instances.push(instance),
                    None => {
                        failures += 1;
                        last_error = Some("random walk reached a dead end".into());
                    }
                }
            }

            let records = self.evaluator.evaluate_batch(&instances, node_deadline);
            for (instance, record) in instances.into_iter().zip(records) {
                match &record.score {
                    Ok(score) => {
                        successes += 1;
                        best = Some(best.map_or(*score, |b| b.min(*score)));
                    }
                    // Interrupted draws say nothing about the node.
                    Err(EvaluationError::Cancelled) => draws -= 1,
                    Err(e) => {
                        failures += 1;
                        last_error = Some(e.to_string());
                    }
                }
                samples.push((instance, record));
            }
        }

        let score = match best {
            Some(f) => NodeScore::Scored(f),
            None if draws > 0 && failures == draws => NodeScore::Failed(format!(
                "all {draws} random completions failed: {}",
                last_error.unwrap_or_default()
            )),
            None => NodeScore::Deferred,
        };
        debug!(
            depth = state.depth(),
            draws,
            successes,
            failures,
            elapsed = ?started.elapsed(),
            "random completion"
        );
        CompletionOutcome {
            score,
            samples,
            draws,
        }
    }

    /// Follows uniformly random successors from `state` to a goal.
    ///
    /// Returns `None` on a dead end or when `max_depth` steps do not
    /// reach a goal.
    pub fn random_walk(&self, state: &Arc<PlanningState>, rng: &mut StdRng) -> Option<Arc<PlanningState>> {
        let mut current = Arc::clone(state);
        for _ in 0..self.max_depth {
            if current.is_goal() {
                return Some(current);
            }
            let children = self.graph.successors(&current);
            current = Arc::clone(children.choose(rng)?);
        }
        current.is_goal().then_some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Catalog, Component, Parameter};
    use crate::reduction::{reduce, ConfigurationProblem};
    use crate::refinement::{RefinementConfig, RefinementConfigMap};
    use crate::search::{CancelHandle, ObjectEvaluator, SearchConfig};
    use rand::SeedableRng;

    fn graph() -> DecompositionProblem {
        let catalog = Catalog::new([
            Component::new("A")
                .provides("Root")
                .with_parameter(Parameter::numeric("p", 0.0, 10.0, 5.0)),
            Component::new("B").provides("Root"),
        ])
        .unwrap();
        reduce(
            ConfigurationProblem::new(
                catalog,
                "Root",
                RefinementConfigMap::new().with("A", "p", RefinementConfig::linear(1.0, 4)),
            )
            .unwrap(),
        )
    }

    fn completion(evaluator: Arc<dyn ObjectEvaluator>, samples: usize, draws: usize) -> RandomCompletion {
        let eval = CandidateEvaluator::new(evaluator, &SearchConfig::default(), CancelHandle::new()).unwrap();
        RandomCompletion::new(graph(), Arc::new(eval), samples, draws, 100, None)
    }

    #[test]
    fn test_random_walk_reaches_goal() {
        let rc = completion(Arc::new(|_: &ComponentInstance| Ok::<f64, EvaluationError>(0.0)), 1, 1);
        let mut rng = StdRng::seed_from_u64(7);
        let root = rc.graph.root_state();
        for _ in 0..20 {
            let goal = rc.random_walk(&root, &mut rng).expect("goal reachable");
            assert!(goal.is_goal());
        }
    }

    #[test]
    fn test_estimate_takes_best_sample() {
        let rc = completion(
            Arc::new(|inst: &ComponentInstance| -> Result<f64, EvaluationError> {
                Ok(inst.numeric_value("p").unwrap_or(100.0))
            }),
            5,
            5,
        );
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = rc.estimate(&rc.graph.root_state(), &mut rng, None);
        let NodeScore::Scored(f) = outcome.score else {
            panic!("expected a score, got {:?}", outcome.score);
        };
        let min = outcome
            .samples
            .iter()
            .filter_map(|(_, r)| r.score.clone().ok())
            .fold(f64::INFINITY, f64::min);
        assert_eq!(f, min);
        assert_eq!(outcome.draws, 5);
    }

    #[test]
    fn test_all_failures_prune() {
        let rc = completion(
            Arc::new(|_: &ComponentInstance| -> Result<f64, EvaluationError> {
                Err(EvaluationError::failed("always"))
            }),
            2,
            4,
        );
        let mut rng = StdRng::seed_from_u64(3);
        let outcome = rc.estimate(&rc.graph.root_state(), &mut rng, None);
        assert!(matches!(outcome.score, NodeScore::Failed(_)));
        assert_eq!(outcome.draws, 4, "keeps drawing up to the cap");
    }

    #[test]
    fn test_expired_deadline_defers() {
        let rc = completion(Arc::new(|_: &ComponentInstance| Ok::<f64, EvaluationError>(0.0)), 3, 3);
        let mut rng = StdRng::seed_from_u64(3);
        let past = Instant::now() - Duration::from_millis(1);
        let outcome = rc.estimate(&rc.graph.root_state(), &mut rng, Some(past));
        assert_eq!(outcome.score, NodeScore::Deferred);
        assert_eq!(outcome.draws, 0);
    }
}
