//! Parameter domain refinement.
//!
//! Numeric parameters are searched by repeatedly narrowing an interval
//! rather than by sampling a value directly. Each refinement step splits
//! the current interval into a bounded number of sub-intervals, linearly
//! or geometrically around a focus point, until the interval is short
//! enough to be *atomic*. Categorical parameters are fixed in a single
//! step. Dependencies between parameters restrict domains further once
//! their premises are met.
//!
//! # Key Types
//!
//! - [`RefinementConfig`]: per-parameter refinement settings
//! - [`RefinementConfigMap`]: settings for a whole catalog
//!
//! # References
//!
//! - Mohr, Wever & Hüllermeier (2018), "ML-Plan: Automated machine learning
//!   via hierarchical planning"

mod config;
mod dependency;
mod refine;

pub use config::{RefinementConfig, RefinementConfigMap};
pub use dependency::{effective_domains, is_refinement_complete, parse_numeric_value};
pub use refine::{
    is_atomic, refine_categorical, refine_linear, refine_log, refine_numeric,
    MIN_LOG_INTERVAL_LENGTH,
};
