//! Component model.
//!
//! Static description of what can be configured: components with their
//! provided and required interfaces, parameters with numeric or
//! categorical domains, and dependencies between parameters. The catalog
//! is loaded once and never mutated; [`ComponentInstance`] trees are the
//! only objects created during search.
//!
//! # Key Types
//!
//! - [`Component`], [`Parameter`], [`Dependency`]: catalog entries
//! - [`Catalog`]: validated, shareable set of components
//! - [`ComponentInstance`]: a configuration tree
//! - [`Interval`], [`ParameterDomain`]: value domains

mod component;
mod domain;
mod instance;

pub use component::{Catalog, Component, Dependency, Parameter, ParameterValue, RequiredInterface};
pub use domain::{CategoricalDomain, Interval, NumericDomain, ParameterDomain};
pub use instance::ComponentInstance;
