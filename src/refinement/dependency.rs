//! Effective parameter domains under explicit values and dependencies.

use super::config::RefinementConfigMap;
use super::refine::is_atomic;
use crate::model::{
    CategoricalDomain, ComponentInstance, Interval, NumericDomain, Parameter, ParameterDomain,
};
use std::collections::BTreeMap;

/// Computes the current domain of every parameter of `instance`'s component.
///
/// Starts from the declared domains, narrows each explicitly set
/// parameter to its value (an interval string or a number for numeric
/// parameters, a singleton for categorical ones) and then applies every
/// dependency whose premise holds. Conclusions never touch a parameter
/// that is explicitly set, so a value fixed by refinement stays fixed.
///
/// Returns an error when an explicit value cannot be interpreted in the
/// parameter's domain.
pub fn effective_domains(
    instance: &ComponentInstance,
) -> Result<BTreeMap<String, ParameterDomain>, String> {
    let component = instance.component();
    let mut domains = BTreeMap::new();
    for param in &component.parameters {
        let domain = match instance.parameter_value(&param.name) {
            Some(value) => explicit_domain(param, value)?,
            None => param.domain.clone(),
        };
        domains.insert(param.name.clone(), domain);
    }

    for dep in &component.dependencies {
        let holds = dep.premise.iter().any(|conjunction| {
            conjunction.iter().all(|(name, required)| {
                domains
                    .get(name)
                    .is_some_and(|current| required.subsumes(current))
            })
        });
        if !holds {
            continue;
        }
        for (name, restricted) in &dep.conclusion {
            if instance.is_explicitly_set(name) {
                continue;
            }
            let restricted = match (restricted, domains.get(name)) {
                (ParameterDomain::Numeric(r), Some(ParameterDomain::Numeric(declared))) => {
                    ParameterDomain::Numeric(NumericDomain::new(r.min, r.max, declared.is_integer))
                }
                _ => restricted.clone(),
            };
            domains.insert(name.clone(), restricted);
        }
    }
    Ok(domains)
}

fn explicit_domain(param: &Parameter, value: &str) -> Result<ParameterDomain, String> {
    match &param.domain {
        ParameterDomain::Numeric(declared) => {
            let interval = parse_numeric_value(value)
                .ok_or_else(|| format!("`{value}` is not a numeric value of `{}`", param.name))?;
            Ok(ParameterDomain::Numeric(declared.with_interval(interval)))
        }
        ParameterDomain::Categorical(_) => {
            Ok(ParameterDomain::Categorical(CategoricalDomain::singleton(value)))
        }
    }
}

/// Interprets a numeric parameter value: either `"[min, max]"` or a number.
pub fn parse_numeric_value(value: &str) -> Option<Interval> {
    let trimmed = value.trim();
    if trimmed.starts_with('[') {
        trimmed.parse().ok()
    } else {
        trimmed.parse::<f64>().ok().map(Interval::point)
    }
}

/// Whether every parameter in the tree is fixed to an atomic domain.
///
/// Categorical parameters count as atomic once explicitly set, numeric
/// ones when their effective domain satisfies [`is_atomic`] under the
/// parameter's configuration. A numeric parameter without a
/// configuration is atomic only if its domain is a single point.
pub fn is_refinement_complete(instance: &ComponentInstance, configs: &RefinementConfigMap) -> bool {
    instance.nodes().into_iter().all(|node| {
        let Ok(domains) = effective_domains(node) else {
            return false;
        };
        let component = node.component();
        component.parameters.iter().all(|param| match domains.get(&param.name) {
            Some(ParameterDomain::Numeric(d)) => match configs.get(&component.name, &param.name) {
                Some(config) => is_atomic(d, config),
                None => d.interval().is_point(),
            },
            Some(ParameterDomain::Categorical(_)) => node.is_explicitly_set(&param.name),
            None => false,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, Dependency};
    use crate::refinement::RefinementConfig;
    use std::sync::Arc;

    fn svm() -> Arc<Component> {
        Arc::new(
            Component::new("SVM")
                .provides("Learner")
                .with_parameter(Parameter::categorical("kernel", ["rbf", "poly"], "rbf"))
                .with_parameter(Parameter::numeric("gamma", 0.0, 10.0, 1.0))
                .with_parameter(Parameter::integer("degree", 1, 5, 3))
                .with_dependency(
                    Dependency::new()
                        .when([(
                            "kernel",
                            ParameterDomain::Categorical(CategoricalDomain::singleton("rbf")),
                        )])
                        .then("gamma", ParameterDomain::Numeric(NumericDomain::real(0.1, 1.0)))
                        .then("degree", ParameterDomain::Numeric(NumericDomain::real(1.0, 1.0))),
                ),
        )
    }

    #[test]
    fn test_declared_domains_without_values() {
        let inst = ComponentInstance::new(svm());
        let d = effective_domains(&inst).unwrap();
        assert_eq!(d["gamma"], ParameterDomain::Numeric(NumericDomain::real(0.0, 10.0)));
    }

    #[test]
    fn test_dependency_applies_when_premise_holds() {
        let inst = ComponentInstance::new(svm()).with_parameter("kernel", "rbf");
        let d = effective_domains(&inst).unwrap();
        assert_eq!(d["gamma"], ParameterDomain::Numeric(NumericDomain::real(0.1, 1.0)));
        // integer flag is kept from the declaration
        assert_eq!(d["degree"], ParameterDomain::Numeric(NumericDomain::integer(1.0, 1.0)));
    }

    #[test]
    fn test_dependency_ignored_when_premise_fails() {
        let inst = ComponentInstance::new(svm()).with_parameter("kernel", "poly");
        let d = effective_domains(&inst).unwrap();
        assert_eq!(d["gamma"], ParameterDomain::Numeric(NumericDomain::real(0.0, 10.0)));
    }

    #[test]
    fn test_dependency_does_not_override_explicit_value() {
        let inst = ComponentInstance::new(svm())
            .with_parameter("kernel", "rbf")
            .with_parameter("gamma", "[5, 10]");
        let d = effective_domains(&inst).unwrap();
        assert_eq!(d["gamma"], ParameterDomain::Numeric(NumericDomain::real(5.0, 10.0)));
    }

    #[test]
    fn test_unparsable_value_is_error() {
        let inst = ComponentInstance::new(svm()).with_parameter("gamma", "lots");
        assert!(effective_domains(&inst).is_err());
    }

    #[test]
    fn test_parse_numeric_value() {
        assert_eq!(parse_numeric_value("[1, 2]"), Some(Interval::new(1.0, 2.0)));
        assert_eq!(parse_numeric_value(" 3.5 "), Some(Interval::point(3.5)));
        assert_eq!(parse_numeric_value("x"), None);
    }

    #[test]
    fn test_refinement_complete() {
        let configs = RefinementConfigMap::new()
            .with("SVM", "gamma", RefinementConfig::linear(0.5, 4))
            .with("SVM", "degree", RefinementConfig::linear(0.5, 4));
        let partial = ComponentInstance::new(svm()).with_parameter("kernel", "poly");
        assert!(!is_refinement_complete(&partial, &configs));

        let complete = ComponentInstance::new(svm())
            .with_parameter("kernel", "poly")
            .with_parameter("gamma", "[1, 1.25]")
            .with_parameter("degree", "2");
        assert!(is_refinement_complete(&complete, &configs));
    }
}
