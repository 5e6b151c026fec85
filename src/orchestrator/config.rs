//! Orchestrator configuration.

use crate::search::SearchConfig;

/// Configuration of a single-phase search run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrchestratorConfig {
    /// Search and evaluation settings.
    pub search: SearchConfig,

    /// Keep every distinct evaluated candidate, not only the best.
    pub retain_all_candidates: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            retain_all_candidates: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_retain_all_candidates(mut self, retain: bool) -> Self {
        self.retain_all_candidates = retain;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.search.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retains_candidates() {
        let config = OrchestratorConfig::default();
        assert!(config.retain_all_candidates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_search_config_propagates() {
        let config = OrchestratorConfig::default().with_search(SearchConfig::default().with_cpus(0));
        assert!(config.validate().is_err());
    }
}
