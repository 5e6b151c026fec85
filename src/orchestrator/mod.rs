//! Search orchestration.
//!
//! Runs a [`GraphSearch`](crate::search::GraphSearch) to completion or
//! timeout, turns every evaluated ground instance into a
//! [`SolutionCandidate`], keeps the best one and posts candidates to
//! listeners as they are found.

mod config;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use runner::SearchOrchestrator;
pub use types::{OrchestratorResult, SolutionCandidate, Termination};
