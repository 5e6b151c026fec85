//! Two-phase optimization: search, then select.
//!
//! The search phase explores the configuration space with a cheap
//! evaluator for most of the time budget. The selection phase re-evaluates
//! a shortlist of the best candidates with a more expensive, more reliable
//! evaluator and returns the winner there. The budget held back for
//! selection scales with how much more expensive the selection evaluator
//! is, and the search phase is cut short when selecting among its current
//! best candidates would no longer fit into the remaining time.
//!
//! # References
//!
//! - Mohr, Wever & Hüllermeier (2018), "ML-Plan: Automated machine learning
//!   via hierarchical planning" (search and selection phases)

mod config;
mod runner;
mod types;

pub use config::{blow_up_factor, EvaluatorProfile, TimeBudget, TwoPhaseConfig};
pub use runner::{select_shortlist, TwoPhaseOptimizer};
pub use types::{Materializer, OptimizerState, ShortlistEntry, TwoPhaseResult};
