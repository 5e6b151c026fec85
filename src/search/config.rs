//! Search configuration.

use std::time::Duration;

/// Configuration of the best-first search and its evaluation pool.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use u_configsearch::search::SearchConfig;
///
/// let config = SearchConfig::default()
///     .with_seed(42)
///     .with_cpus(4)
///     .with_candidate_timeout(Duration::from_secs(30))
///     .with_completion_samples(3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchConfig {
    /// Random seed for random completions and tie-free reproducibility.
    pub seed: Option<u64>,

    /// Worker threads used for candidate evaluations.
    pub cpus: usize,

    /// Per-candidate evaluation timeout. `None` = unlimited.
    pub candidate_timeout: Option<Duration>,

    /// Time allowed for scoring a single node by random completion.
    pub node_timeout: Option<Duration>,

    /// Successful random completions wanted per node. 0 disables
    /// random completion; unscored nodes then inherit their parent's f.
    pub completion_samples: usize,

    /// Maximum random completions drawn per node, failed ones included.
    pub completion_max_draws: usize,

    /// Random walks longer than this are abandoned as dead ends.
    pub max_completion_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            seed: None,
            cpus: 1,
            candidate_timeout: None,
            node_timeout: None,
            completion_samples: 3,
            completion_max_draws: 10,
            max_completion_depth: 10_000,
        }
    }
}

impl SearchConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_cpus(mut self, cpus: usize) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_candidate_timeout(mut self, timeout: Duration) -> Self {
        self.candidate_timeout = Some(timeout);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    /// Sets the desired successful samples; the draw cap is raised to
    /// at least that many.
    pub fn with_completion_samples(mut self, n: usize) -> Self {
        self.completion_samples = n;
        self.completion_max_draws = self.completion_max_draws.max(n);
        self
    }

    pub fn with_completion_max_draws(mut self, n: usize) -> Self {
        self.completion_max_draws = n;
        self
    }

    pub fn with_max_completion_depth(mut self, depth: usize) -> Self {
        self.max_completion_depth = depth;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cpus == 0 {
            return Err("cpus must be at least 1".into());
        }
        if self.completion_max_draws < self.completion_samples {
            return Err(format!(
                "completion_max_draws ({}) must be at least completion_samples ({})",
                self.completion_max_draws, self.completion_samples
            ));
        }
        if self.max_completion_depth == 0 {
            return Err("max_completion_depth must be positive".into());
        }
        if self.candidate_timeout.is_some_and(|t| t.is_zero()) {
            return Err("candidate_timeout must be positive".into());
        }
        if self.node_timeout.is_some_and(|t| t.is_zero()) {
            return Err("node_timeout must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_valid() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_cpus() {
        assert!(SearchConfig::default().with_cpus(0).validate().is_err());
    }

    #[test]
    fn test_samples_raise_draw_cap() {
        let config = SearchConfig::default().with_completion_samples(25);
        assert_eq!(config.completion_max_draws, 25);
        assert!(config.validate().is_ok());
        assert!(config.with_completion_max_draws(5).validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        assert!(SearchConfig::default()
            .with_candidate_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SearchConfig::default()
            .with_node_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
