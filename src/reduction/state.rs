//! Planning facts, tasks and states.

use crate::model::Component;
use std::fmt;
use std::sync::Arc;

/// Identifier of a component object introduced during planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

/// A single decision recorded in a planning state.
#[derive(Debug, Clone, PartialEq)]
pub enum Fact {
    /// `object` is an instance of `component`, filling `slot` of `parent`
    /// (or the requested root interface when `parent` is `None`).
    Resolves {
        parent: Option<ObjectId>,
        slot: String,
        component: Arc<Component>,
        object: ObjectId,
    },
    /// Current value of a parameter: an interval string or a value.
    /// Later facts override earlier ones.
    ParameterValue {
        object: ObjectId,
        parameter: String,
        value: String,
    },
    /// The parameter will not be refined any further.
    Closed { object: ObjectId, parameter: String },
    /// Point around which log-scale refinement of the parameter is dense.
    ParameterFocus {
        object: ObjectId,
        parameter: String,
        focus: f64,
    },
}

/// An open task of a planning state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Task {
    /// Choose a component providing `interface` for `slot` of `parent`.
    ResolveInterface {
        parent: Option<ObjectId>,
        slot: String,
        interface: String,
    },
    /// Narrow the domain of one parameter of `object`.
    RefineParameter { object: ObjectId, parameter: String },
}

impl Task {
    pub fn is_structural(&self) -> bool {
        matches!(self, Task::ResolveInterface { .. })
    }
}

/// A node of the search graph.
///
/// A state only stores the facts added by the step that produced it and
/// points to its parent for the rest, so siblings share their common
/// history. States are immutable once built and shared through `Arc`.
#[derive(Debug)]
pub struct PlanningState {
    parent: Option<Arc<PlanningState>>,
    added: Vec<Fact>,
    tasks: Vec<Task>,
    next_object: u32,
    depth: usize,
}

impl PlanningState {
    /// The initial state: a single task resolving `root_interface`.
    pub fn root(root_interface: impl Into<String>) -> Self {
        Self {
            parent: None,
            added: Vec::new(),
            tasks: vec![Task::ResolveInterface {
                parent: None,
                slot: String::new(),
                interface: root_interface.into(),
            }],
            next_object: 0,
            depth: 0,
        }
    }

    pub(crate) fn derive(
        parent: &Arc<PlanningState>,
        added: Vec<Fact>,
        tasks: Vec<Task>,
        next_object: u32,
    ) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            added,
            tasks,
            next_object,
            depth: parent.depth + 1,
        }
    }

    pub fn parent(&self) -> Option<&Arc<PlanningState>> {
        self.parent.as_ref()
    }

    /// Facts added by the step that produced this state.
    pub fn added_facts(&self) -> &[Fact] {
        &self.added
    }

    /// All facts from the root to this state, oldest first.
    pub fn facts(&self) -> Vec<&Fact> {
        let mut chain = Vec::with_capacity(self.depth + 1);
        let mut cursor = Some(self);
        while let Some(state) = cursor {
            chain.push(state);
            cursor = state.parent.as_deref();
        }
        chain.iter().rev().flat_map(|s| s.added.iter()).collect()
    }

    /// Open tasks; the first one is worked on next.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub(crate) fn next_object(&self) -> u32 {
        self.next_object
    }

    /// Number of steps from the root.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// No open tasks remain: the state describes a complete configuration.
    pub fn is_goal(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether the next decision is a component choice rather than a
    /// parameter refinement.
    pub fn in_structural_phase(&self) -> bool {
        self.tasks.first().is_some_and(Task::is_structural)
    }
}
