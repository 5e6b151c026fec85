//! The configuration problem and its validation.

use crate::error::ConfigurationError;
use crate::model::Catalog;
use crate::refinement::RefinementConfigMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What to configure: a catalog, the interface the result must provide
/// and how numeric parameters are refined.
#[derive(Debug, Clone)]
pub struct ConfigurationProblem {
    catalog: Arc<Catalog>,
    root_interface: String,
    refinement: Arc<RefinementConfigMap>,
}

impl ConfigurationProblem {
    /// Builds and validates a problem.
    ///
    /// Fails when no component provides the root interface, when a
    /// required interface of any component has no provider, or when a
    /// numeric parameter lacks a valid refinement configuration.
    pub fn new(
        catalog: Catalog,
        root_interface: impl Into<String>,
        refinement: RefinementConfigMap,
    ) -> Result<Self, ConfigurationError> {
        let root_interface = root_interface.into();
        if catalog.providers_of(&root_interface).is_empty() {
            return Err(ConfigurationError::NoProviderForRoot(root_interface));
        }
        for component in catalog.iter() {
            for req in &component.required_interfaces {
                if catalog.providers_of(&req.interface).is_empty() {
                    return Err(ConfigurationError::UnsatisfiableInterface {
                        component: component.name.clone(),
                        slot: req.slot.clone(),
                        interface: req.interface.clone(),
                    });
                }
            }
        }
        refinement.check_catalog(&catalog)?;
        Ok(Self {
            catalog: Arc::new(catalog),
            root_interface,
            refinement: Arc::new(refinement),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn root_interface(&self) -> &str {
        &self.root_interface
    }

    pub fn refinement(&self) -> &Arc<RefinementConfigMap> {
        &self.refinement
    }

    /// Number of distinct component structures that provide the root
    /// interface, ignoring parameters.
    ///
    /// Returns `None` when the interface graph is recursive (the number
    /// is unbounded). Saturates at `u64::MAX`.
    pub fn count_unparametrized_compositions(&self) -> Option<u64> {
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        count_for_interface(&self.catalog, &self.root_interface, &mut memo, &mut visiting)
    }
}

fn count_for_interface(
    catalog: &Catalog,
    interface: &str,
    memo: &mut HashMap<String, u64>,
    visiting: &mut HashSet<String>,
) -> Option<u64> {
    if let Some(&n) = memo.get(interface) {
        return Some(n);
    }
    if !visiting.insert(interface.to_string()) {
        return None;
    }
    let mut total: u64 = 0;
    for provider in catalog.providers_of(interface) {
        let mut product: u64 = 1;
        for req in &provider.required_interfaces {
            let n = count_for_interface(catalog, &req.interface, memo, visiting)?;
            product = product.saturating_mul(n);
        }
        total = total.saturating_add(product);
    }
    visiting.remove(interface);
    memo.insert(interface.to_string(), total);
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Parameter};
    use crate::refinement::RefinementConfig;

    fn nested_catalog() -> Catalog {
        Catalog::new([
            Component::new("Pipeline")
                .provides("Root")
                .requires("pre", "Pre")
                .requires("learner", "Learner"),
            Component::new("Scaler").provides("Pre"),
            Component::new("Pca").provides("Pre"),
            Component::new("Tree").provides("Learner"),
            Component::new("Svm").provides("Learner"),
            Component::new("Knn").provides("Learner").provides("Root"),
        ])
        .unwrap()
    }

    #[test]
    fn test_no_provider_for_root() {
        let result = ConfigurationProblem::new(nested_catalog(), "Missing", RefinementConfigMap::new());
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::NoProviderForRoot("Missing".into())
        );
    }

    #[test]
    fn test_unsatisfiable_interface() {
        let catalog = Catalog::new([Component::new("A").provides("Root").requires("x", "Nothing")]).unwrap();
        let result = ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new());
        assert!(matches!(
            result,
            Err(ConfigurationError::UnsatisfiableInterface { ref interface, .. }) if interface == "Nothing"
        ));
    }

    #[test]
    fn test_missing_refinement_config_fails_fast() {
        let catalog = Catalog::new([Component::new("A")
            .provides("Root")
            .with_parameter(Parameter::numeric("p", 0.0, 1.0, 0.5))])
        .unwrap();
        let result = ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new());
        assert!(matches!(
            result,
            Err(ConfigurationError::MissingRefinementConfig { .. })
        ));

        let ok = ConfigurationProblem::new(
            Catalog::new([Component::new("A")
                .provides("Root")
                .with_parameter(Parameter::numeric("p", 0.0, 1.0, 0.5))])
            .unwrap(),
            "Root",
            RefinementConfigMap::new().with("A", "p", RefinementConfig::linear(0.1, 4)),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_count_compositions() {
        let problem = ConfigurationProblem::new(nested_catalog(), "Root", RefinementConfigMap::new()).unwrap();
        // Pipeline: 2 preprocessors x 3 learners, plus Knn on its own
        assert_eq!(problem.count_unparametrized_compositions(), Some(7));
    }

    #[test]
    fn test_count_recursive_is_unbounded() {
        let catalog = Catalog::new([
            Component::new("Ensemble").provides("Learner").requires("base", "Learner"),
            Component::new("Tree").provides("Learner"),
        ])
        .unwrap();
        let problem = ConfigurationProblem::new(catalog, "Learner", RefinementConfigMap::new()).unwrap();
        assert_eq!(problem.count_unparametrized_compositions(), None);
    }
}
