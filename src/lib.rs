//! Hierarchical software configuration search.
//!
//! Finds a good configuration of a component-based software system: which
//! component fills each required interface, recursively, and which value
//! each component parameter takes. Candidate configurations are scored by
//! a user-supplied evaluator (lower is better).
//!
//! - **Model**: Components with provided/required interfaces, numeric and
//!   categorical parameters, and parameter dependencies.
//! - **Refinement**: Interval refinement of numeric domains (linear or
//!   logarithmic around a focus point) and one-step categorical fixing.
//! - **Reduction**: Turns a configuration problem into a search graph of
//!   immutable planning states.
//! - **Search**: Best-first search with random-completion node evaluation,
//!   a shared evaluation cache and a parallel worker pool.
//! - **Orchestrator**: Runs a search under a timeout, tracks the best
//!   candidate and notifies listeners of every new candidate.
//! - **Two-phase**: Search with a cheap evaluator, then re-evaluate a
//!   shortlist with an expensive one and select the winner.
//!
//! # Architecture
//!
//! The layers build strictly on each other: `model` → `refinement` →
//! `reduction` → `search` → `orchestrator` → `twophase`. Nothing in this
//! crate knows what a component *is*; evaluation and materialization are
//! supplied by the caller.

pub mod error;
pub mod model;
pub mod orchestrator;
pub mod reduction;
pub mod refinement;
pub mod search;
pub mod twophase;
