//! Evaluator traits, node scores and the cancellation handle.

use crate::error::EvaluationError;
use crate::model::ComponentInstance;
use crate::reduction::PlanningState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of scoring a search node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeScore {
    /// The node's f-value; lower is better.
    Scored(f64),
    /// No opinion; the next evaluator in line decides.
    Deferred,
    /// The node cannot lead to a usable solution and is pruned.
    Failed(String),
}

/// Scores an inner node of the search graph.
///
/// Receives the state together with the (possibly partial) component
/// instance it describes, if the root interface is already resolved.
///
/// # Examples
///
/// ```
/// use u_configsearch::search::{NodeEvaluator, NodeScore};
/// use u_configsearch::reduction::PlanningState;
/// use u_configsearch::model::ComponentInstance;
///
/// // Leave component choices to random completion.
/// let preferred = |state: &PlanningState, _: Option<&ComponentInstance>| {
///     if state.in_structural_phase() { NodeScore::Deferred } else { NodeScore::Scored(0.0) }
/// };
/// let root = PlanningState::root("Root");
/// assert_eq!(preferred.evaluate(&root, None), NodeScore::Deferred);
/// ```
pub trait NodeEvaluator: Send + Sync {
    fn evaluate(&self, state: &PlanningState, instance: Option<&ComponentInstance>) -> NodeScore;
}

impl<F> NodeEvaluator for F
where
    F: Fn(&PlanningState, Option<&ComponentInstance>) -> NodeScore + Send + Sync,
{
    fn evaluate(&self, state: &PlanningState, instance: Option<&ComponentInstance>) -> NodeScore {
        self(state, instance)
    }
}

/// Scores a fully resolved component instance; lower is better.
///
/// Implementations may be called concurrently from worker threads.
pub trait ObjectEvaluator: Send + Sync {
    fn evaluate(&self, instance: &ComponentInstance) -> Result<f64, EvaluationError>;
}

impl<F> ObjectEvaluator for F
where
    F: Fn(&ComponentInstance) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, instance: &ComponentInstance) -> Result<f64, EvaluationError> {
        self(instance)
    }
}

/// Cooperative cancellation flag shared between a run and its callers.
///
/// Cloning shares the flag. Cancelling more than once has no further
/// effect.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing flag.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// The underlying flag.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Component;

    #[test]
    fn test_cancel_is_shared_and_idempotent() {
        let a = CancelHandle::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_closure_object_evaluator() {
        let eval = |inst: &ComponentInstance| -> Result<f64, EvaluationError> {
            Ok(inst.component().name.len() as f64)
        };
        let inst = ComponentInstance::new(Arc::new(Component::new("Tree")));
        assert_eq!(ObjectEvaluator::evaluate(&eval, &inst), Ok(4.0));
    }
}
