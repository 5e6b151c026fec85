//! Two-phase configuration and time budgeting.

use crate::search::SearchConfig;
use std::time::Duration;

/// How expensive an evaluator is relative to a single model fit.
///
/// An evaluator that repeats a holdout validation `repeats` times on a
/// holdout of `holdout_fraction` of the data costs roughly
/// `repeats / holdout_fraction` units.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluatorProfile {
    pub repeats: usize,
    pub holdout_fraction: f64,
}

impl Default for EvaluatorProfile {
    fn default() -> Self {
        Self {
            repeats: 1,
            holdout_fraction: 0.3,
        }
    }
}

impl EvaluatorProfile {
    pub fn new(repeats: usize, holdout_fraction: f64) -> Self {
        Self {
            repeats,
            holdout_fraction,
        }
    }

    /// Relative cost `repeats / holdout_fraction`.
    pub fn cost_weight(&self) -> f64 {
        self.repeats as f64 / self.holdout_fraction
    }

    /// Validates the profile.
    pub fn validate(&self) -> Result<(), String> {
        if self.repeats == 0 {
            return Err("evaluator repeats must be at least 1".into());
        }
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction <= 1.0) {
            return Err(format!(
                "holdout_fraction must be in (0, 1], got {}",
                self.holdout_fraction
            ));
        }
        Ok(())
    }
}

/// How much more expensive one selection evaluation is than one search
/// evaluation. Never below 1.
pub fn blow_up_factor(search: &EvaluatorProfile, selection: &EvaluatorProfile) -> f64 {
    (selection.cost_weight() / search.cost_weight()).max(1.0)
}

/// Split of the global timeout between the two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeBudget {
    pub total: Duration,
    /// Time granted to the search phase.
    pub search: Duration,
    /// Time held back for the selection phase.
    pub reserved_for_selection: Duration,
}

impl TimeBudget {
    /// Reserves `min(max_fraction, reserve_fraction * blow_up)` of `total`
    /// for selection and gives the rest to search.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use u_configsearch::twophase::TimeBudget;
    ///
    /// let budget = TimeBudget::split(Duration::from_secs(100), 2.0, 0.1, 0.5);
    /// assert_eq!(budget.reserved_for_selection, Duration::from_secs(20));
    /// assert_eq!(budget.search, Duration::from_secs(80));
    /// ```
    pub fn split(total: Duration, blow_up: f64, reserve_fraction: f64, max_fraction: f64) -> Self {
        let fraction = (reserve_fraction * blow_up.max(1.0))
            .min(max_fraction)
            .clamp(0.0, 1.0);
        let reserved = total.mul_f64(fraction).min(total);
        Self {
            total,
            search: total.saturating_sub(reserved),
            reserved_for_selection: reserved,
        }
    }

    /// A budget without a selection phase.
    pub fn search_only(total: Duration) -> Self {
        Self {
            total,
            search: total,
            reserved_for_selection: Duration::ZERO,
        }
    }
}

/// Configuration of the two-phase optimizer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_configsearch::twophase::{EvaluatorProfile, TwoPhaseConfig};
///
/// let config = TwoPhaseConfig::default()
///     .with_timeout(Duration::from_secs(3600))
///     .with_shortlist_size(5)
///     .with_search_profile(EvaluatorProfile::new(3, 0.3))
///     .with_selection_profile(EvaluatorProfile::new(10, 0.3));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TwoPhaseConfig {
    /// Global timeout covering both phases.
    pub timeout: Duration,

    /// Search-phase settings. Its CPU count also bounds selection
    /// parallelism.
    pub search: SearchConfig,

    /// Number of candidates re-evaluated in the selection phase.
    pub shortlist_size: usize,

    /// Candidates beyond the top half of the shortlist must score within
    /// this distance of the best. `None` = no restriction.
    pub max_margin_from_best: Option<f64>,

    /// Share of the timeout reserved for selection per unit of blow-up.
    pub selection_reserve_fraction: f64,

    /// Upper bound on the share of the timeout reserved for selection.
    pub max_selection_fraction: f64,

    /// Slack kept free when deciding to stop the search phase early.
    pub phase1_safety_margin: Duration,

    /// Extra share a selection evaluation may take beyond its expected
    /// duration before it is abandoned.
    pub selection_timeout_tolerance: f64,

    pub search_profile: EvaluatorProfile,
    pub selection_profile: EvaluatorProfile,
}

impl Default for TwoPhaseConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            search: SearchConfig::default(),
            shortlist_size: 1,
            max_margin_from_best: Some(0.03),
            selection_reserve_fraction: 0.1,
            max_selection_fraction: 0.5,
            phase1_safety_margin: Duration::from_millis(500),
            selection_timeout_tolerance: 0.1,
            search_profile: EvaluatorProfile::default(),
            selection_profile: EvaluatorProfile::default(),
        }
    }
}

impl TwoPhaseConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_shortlist_size(mut self, k: usize) -> Self {
        self.shortlist_size = k;
        self
    }

    pub fn with_max_margin_from_best(mut self, margin: Option<f64>) -> Self {
        self.max_margin_from_best = margin;
        self
    }

    pub fn with_selection_reserve_fraction(mut self, fraction: f64) -> Self {
        self.selection_reserve_fraction = fraction;
        self
    }

    pub fn with_max_selection_fraction(mut self, fraction: f64) -> Self {
        self.max_selection_fraction = fraction;
        self
    }

    pub fn with_phase1_safety_margin(mut self, margin: Duration) -> Self {
        self.phase1_safety_margin = margin;
        self
    }

    pub fn with_selection_timeout_tolerance(mut self, tolerance: f64) -> Self {
        self.selection_timeout_tolerance = tolerance;
        self
    }

    pub fn with_search_profile(mut self, profile: EvaluatorProfile) -> Self {
        self.search_profile = profile;
        self
    }

    pub fn with_selection_profile(mut self, profile: EvaluatorProfile) -> Self {
        self.selection_profile = profile;
        self
    }

    pub fn blow_up(&self) -> f64 {
        blow_up_factor(&self.search_profile, &self.selection_profile)
    }

    /// The split of [`timeout`](Self::timeout) between the phases.
    pub fn budget(&self) -> TimeBudget {
        TimeBudget::split(
            self.timeout,
            self.blow_up(),
            self.selection_reserve_fraction,
            self.max_selection_fraction,
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be positive".into());
        }
        self.search.validate()?;
        if self.shortlist_size == 0 {
            return Err("shortlist_size must be at least 1".into());
        }
        if let Some(margin) = self.max_margin_from_best {
            if !(margin >= 0.0) {
                return Err(format!("max_margin_from_best must be non-negative, got {margin}"));
            }
        }
        for (name, value) in [
            ("selection_reserve_fraction", self.selection_reserve_fraction),
            ("max_selection_fraction", self.max_selection_fraction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        if !(self.selection_timeout_tolerance >= 0.0) {
            return Err("selection_timeout_tolerance must be non-negative".into());
        }
        self.search_profile.validate()?;
        self.selection_profile.validate()?;
        Ok(())
    }
}
