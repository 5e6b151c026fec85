//! Task reduction.
//!
//! Reduces a configuration problem to a search graph. A planning state
//! records the decisions taken so far as facts (which component fills
//! which slot, the current interval or value of each parameter, which
//! parameters are closed) together with the tasks still open. Resolving
//! a required interface branches over the providing components;
//! refining a parameter branches over the sub-domains produced by the
//! [`refinement`](crate::refinement) algebra.
//!
//! # Key Types
//!
//! - [`ConfigurationProblem`]: validated catalog, root interface and refinement settings
//! - [`DecompositionProblem`]: the induced search graph
//! - [`PlanningState`]: an immutable node of that graph

mod decomposition;
mod problem;
mod state;

pub use decomposition::{reduce, DecompositionProblem};
pub use problem::ConfigurationProblem;
pub use state::{Fact, ObjectId, PlanningState, Task};
