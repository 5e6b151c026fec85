//! Error taxonomy.
//!
//! Three families, matching the three places where things can go wrong:
//!
//! - [`ConfigurationError`]: the catalog or the run configuration is
//!   unusable. Raised at construction time only, never mid-search.
//! - [`EvaluationError`]: a single candidate could not be scored. Always
//!   local to that candidate; the search continues.
//! - [`OptimizerError`]: terminal outcome of a two-phase run that did not
//!   produce a selected candidate.

use std::time::Duration;
use thiserror::Error;

/// The configuration problem (catalog, refinement settings, budgets) is invalid.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("no refinement configuration for numeric parameter `{parameter}` of component `{component}`")]
    MissingRefinementConfig { component: String, parameter: String },

    #[error("invalid refinement configuration for `{component}.{parameter}`: {reason}")]
    InvalidRefinementConfig {
        component: String,
        parameter: String,
        reason: String,
    },

    #[error("required interface `{interface}` (slot `{slot}`) of component `{component}` is not provided by any component")]
    UnsatisfiableInterface {
        component: String,
        slot: String,
        interface: String,
    },

    #[error("no component provides the requested interface `{0}`")]
    NoProviderForRoot(String),

    #[error("malformed dependency on component `{component}`: {reason}")]
    MalformedDependency { component: String, reason: String },

    #[error("invalid parameter `{parameter}` of component `{component}`: {reason}")]
    InvalidParameter {
        component: String,
        parameter: String,
        reason: String,
    },

    #[error("component `{0}` is defined more than once")]
    DuplicateComponent(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A single candidate evaluation did not yield a score.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("evaluation failed: {0}")]
    Failed(String),

    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("instance is not fully resolved: {0}")]
    Incomplete(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvaluationError {
    /// Convenience constructor for evaluator implementations.
    pub fn failed(reason: impl Into<String>) -> Self {
        EvaluationError::Failed(reason.into())
    }
}

/// Terminal failure of a two-phase optimization.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("optimizer cannot {action} in state {state}")]
    InvalidState { state: String, action: String },

    #[error("time budget exhausted before any candidate was found")]
    TimedOut,

    #[error("optimization cancelled")]
    Cancelled,

    #[error("search space exhausted without a successfully evaluated candidate")]
    NoSolution,

    #[error("selection phase failed for all {attempted} shortlisted candidates (last error: {last_error})")]
    SelectionFailed {
        attempted: usize,
        last_error: EvaluationError,
    },

    #[error("materialization of the selected candidate failed: {0}")]
    Materialization(EvaluationError),
}
