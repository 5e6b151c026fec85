//! Refinement configuration for numeric parameters.

use crate::error::ConfigurationError;
use crate::model::Catalog;
use std::collections::HashMap;

/// How a numeric parameter's interval is narrowed during search.
///
/// # Examples
///
/// ```
/// use u_configsearch::refinement::RefinementConfig;
///
/// let linear = RefinementConfig::linear(1.0, 5);
/// assert!(linear.validate().is_ok());
///
/// let log = RefinementConfig::logarithmic(0.05, 8, 2.0)
///     .with_include_endpoints(true)
///     .with_focus_point(1e-3);
/// assert!(log.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefinementConfig {
    /// Intervals whose (absolute or relative) length is at most this
    /// value are atomic and no longer split.
    pub interval_length: f64,

    /// Maximum number of children a single refinement step produces.
    pub refinements_per_step: usize,

    /// Refine on a logarithmic scale: the first split is geometric around
    /// the focus point, and atomicity is measured by relative length.
    pub log_scale: bool,

    /// Growth factor of consecutive sub-intervals on a log scale. Must be
    /// strictly greater than 1 when `log_scale` is set.
    pub log_basis: f64,

    /// On the first refinement of a parameter, also offer the two
    /// endpoints as point intervals.
    pub include_endpoints: bool,

    /// Point around which log-scale refinement concentrates resolution.
    /// Defaults to the lower bound of the parameter's domain.
    pub focus_point: Option<f64>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            interval_length: 0.1,
            refinements_per_step: 8,
            log_scale: false,
            log_basis: 2.0,
            include_endpoints: false,
            focus_point: None,
        }
    }
}

impl RefinementConfig {
    /// Linear-scale refinement.
    pub fn linear(interval_length: f64, refinements_per_step: usize) -> Self {
        Self {
            interval_length,
            refinements_per_step,
            ..Self::default()
        }
    }

    /// Log-scale refinement with the given basis.
    pub fn logarithmic(interval_length: f64, refinements_per_step: usize, log_basis: f64) -> Self {
        Self {
            interval_length,
            refinements_per_step,
            log_scale: true,
            log_basis,
            ..Self::default()
        }
    }

    pub fn with_interval_length(mut self, length: f64) -> Self {
        self.interval_length = length;
        self
    }

    pub fn with_refinements_per_step(mut self, n: usize) -> Self {
        self.refinements_per_step = n;
        self
    }

    pub fn with_log_scale(mut self, basis: f64) -> Self {
        self.log_scale = true;
        self.log_basis = basis;
        self
    }

    pub fn with_include_endpoints(mut self, include: bool) -> Self {
        self.include_endpoints = include;
        self
    }

    pub fn with_focus_point(mut self, focus: f64) -> Self {
        self.focus_point = Some(focus);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.interval_length > 0.0) || !self.interval_length.is_finite() {
            return Err(format!(
                "interval_length must be positive and finite, got {}",
                self.interval_length
            ));
        }
        if self.refinements_per_step < 2 {
            return Err(format!(
                "refinements_per_step must be at least 2, got {}",
                self.refinements_per_step
            ));
        }
        if self.include_endpoints && self.refinements_per_step < 4 {
            return Err(format!(
                "refinements_per_step must be at least 4 when endpoints are included, got {}",
                self.refinements_per_step
            ));
        }
        if self.log_scale && (!(self.log_basis > 1.0) || !self.log_basis.is_finite()) {
            return Err(format!(
                "log_basis must be finite and greater than 1, got {}",
                self.log_basis
            ));
        }
        if let Some(focus) = self.focus_point {
            if !focus.is_finite() {
                return Err("focus_point must be finite".into());
            }
        }
        Ok(())
    }
}

/// Refinement configurations per (component, numeric parameter).
#[derive(Debug, Clone, Default)]
pub struct RefinementConfigMap {
    configs: HashMap<String, HashMap<String, RefinementConfig>>,
}

impl RefinementConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(
        mut self,
        component: impl Into<String>,
        parameter: impl Into<String>,
        config: RefinementConfig,
    ) -> Self {
        self.insert(component, parameter, config);
        self
    }

    pub fn insert(
        &mut self,
        component: impl Into<String>,
        parameter: impl Into<String>,
        config: RefinementConfig,
    ) {
        self.configs
            .entry(component.into())
            .or_default()
            .insert(parameter.into(), config);
    }

    pub fn get(&self, component: &str, parameter: &str) -> Option<&RefinementConfig> {
        self.configs.get(component)?.get(parameter)
    }

    /// Ensures every numeric parameter in the catalog has a valid configuration.
    pub fn check_catalog(&self, catalog: &Catalog) -> Result<(), ConfigurationError> {
        for component in catalog.iter() {
            for param in component.parameters.iter().filter(|p| p.is_numeric()) {
                let config = self.get(&component.name, &param.name).ok_or_else(|| {
                    ConfigurationError::MissingRefinementConfig {
                        component: component.name.clone(),
                        parameter: param.name.clone(),
                    }
                })?;
                config
                    .validate()
                    .map_err(|reason| ConfigurationError::InvalidRefinementConfig {
                        component: component.name.clone(),
                        parameter: param.name.clone(),
                        reason,
                    })?;
            }
        }
        Ok(())
    }
}
