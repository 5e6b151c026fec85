//! Best-first graph search with random-completion node evaluation.
//!
//! Explores the search graph of a
//! [`DecompositionProblem`](crate::reduction::DecompositionProblem) in order
//! of an estimated f-value. Inner nodes are scored by an optional
//! preferred [`NodeEvaluator`] and otherwise by drawing random paths to
//! ground configurations and evaluating them with the user's
//! [`ObjectEvaluator`]. Evaluations are cached per instance and run on a
//! worker pool with per-candidate timeouts.
//!
//! # References
//!
//! - Mohr, Wever & Hüllermeier (2018), "ML-Plan: Automated machine learning
//!   via hierarchical planning" (random completion node evaluation)
//! - Pearl (1984), "Heuristics: Intelligent Search Strategies for Computer
//!   Problem Solving"

mod completion;
mod config;
mod evaluation;
mod runner;
mod types;

pub use completion::{CompletionOutcome, RandomCompletion};
pub use config::SearchConfig;
pub use evaluation::{CandidateEvaluator, EvaluationRecord};
pub use runner::{GraphSearch, SearchSolution, SearchStep};
pub use types::{CancelHandle, NodeEvaluator, NodeScore, ObjectEvaluator};
