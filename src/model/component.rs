//! Static catalog description: components, parameters, dependencies.

use super::domain::{CategoricalDomain, NumericDomain, ParameterDomain};
use crate::error::ConfigurationError;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Default value of a parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParameterValue {
    Numeric(f64),
    Categorical(String),
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Numeric(v) => write!(f, "{v}"),
            ParameterValue::Categorical(v) => write!(f, "{v}"),
        }
    }
}

/// A configurable parameter of a component.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::Parameter;
///
/// let c = Parameter::numeric("C", 0.01, 100.0, 1.0);
/// let k = Parameter::categorical("kernel", ["rbf", "linear"], "rbf");
/// assert!(c.is_numeric());
/// assert!(!k.is_numeric());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    pub name: String,
    /// The declared (default) domain.
    pub domain: ParameterDomain,
    pub default: ParameterValue,
}

impl Parameter {
    /// A real-valued parameter in `[min, max]`.
    pub fn numeric(name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            domain: ParameterDomain::Numeric(NumericDomain::real(min, max)),
            default: ParameterValue::Numeric(default),
        }
    }

    /// An integer-valued parameter in `[min, max]`.
    pub fn integer(name: impl Into<String>, min: i64, max: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            domain: ParameterDomain::Numeric(NumericDomain::integer(min as f64, max as f64)),
            default: ParameterValue::Numeric(default as f64),
        }
    }

    /// A categorical parameter.
    pub fn categorical<I, S>(name: impl Into<String>, values: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            domain: ParameterDomain::Categorical(CategoricalDomain::new(values)),
            default: ParameterValue::Categorical(default.into()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.domain.is_numeric()
    }

    fn validate(&self, component: &str) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidParameter {
            component: component.to_string(),
            parameter: self.name.clone(),
            reason,
        };
        match (&self.domain, &self.default) {
            (ParameterDomain::Numeric(d), ParameterValue::Numeric(v)) => {
                if !d.min.is_finite() || !d.max.is_finite() {
                    return Err(invalid("domain bounds must be finite".into()));
                }
                if d.min > d.max {
                    return Err(invalid(format!("min {} exceeds max {}", d.min, d.max)));
                }
                if !d.interval().contains(*v) {
                    return Err(invalid(format!("default {v} lies outside {}", d.interval())));
                }
            }
            (ParameterDomain::Categorical(d), ParameterValue::Categorical(v)) => {
                if d.values.is_empty() {
                    return Err(invalid("categorical domain has no values".into()));
                }
                if !d.contains(v) {
                    return Err(invalid(format!("default `{v}` is not among the values")));
                }
            }
            _ => return Err(invalid("default value kind does not match the domain".into())),
        }
        Ok(())
    }
}

/// A named slot through which a component requires another component.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequiredInterface {
    /// Slot identifier, unique within the requiring component.
    pub slot: String,
    /// Interface a filling component must provide.
    pub interface: String,
}

/// A conditional restriction of parameter domains.
///
/// The premise is a disjunction of conjunctions of `(parameter,
/// required domain)` pairs. A conjunction holds when each referenced
/// parameter's *current effective* domain is subsumed by the required
/// domain. When the premise holds, each conclusion narrows its parameter
/// to the given domain unless that parameter was already fixed.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::{Dependency, ParameterDomain, CategoricalDomain, NumericDomain};
///
/// // if kernel = rbf then gamma in [0.1, 1]
/// let dep = Dependency::new()
///     .when([("kernel", ParameterDomain::Categorical(CategoricalDomain::singleton("rbf")))])
///     .then("gamma", ParameterDomain::Numeric(NumericDomain::real(0.1, 1.0)));
/// assert_eq!(dep.premise.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dependency {
    pub premise: Vec<Vec<(String, ParameterDomain)>>,
    pub conclusion: Vec<(String, ParameterDomain)>,
}

impl Dependency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one alternative (conjunction) to the premise.
    pub fn when<I, S>(mut self, conjunction: I) -> Self
    where
        I: IntoIterator<Item = (S, ParameterDomain)>,
        S: Into<String>,
    {
        self.premise
            .push(conjunction.into_iter().map(|(p, d)| (p.into(), d)).collect());
        self
    }

    /// Adds a conclusion.
    pub fn then(mut self, parameter: impl Into<String>, domain: ParameterDomain) -> Self {
        self.conclusion.push((parameter.into(), domain));
        self
    }

    fn validate(&self, component: &Component) -> Result<(), ConfigurationError> {
        let malformed = |reason: String| ConfigurationError::MalformedDependency {
            component: component.name.clone(),
            reason,
        };
        if self.premise.is_empty() {
            return Err(malformed("premise has no alternatives".into()));
        }
        if self.conclusion.is_empty() {
            return Err(malformed("conclusion is empty".into()));
        }
        let pairs = self.premise.iter().flatten().chain(self.conclusion.iter());
        for (name, domain) in pairs {
            let Some(param) = component.parameter(name) else {
                return Err(malformed(format!("unknown parameter `{name}`")));
            };
            if param.domain.is_numeric() != domain.is_numeric() {
                return Err(malformed(format!(
                    "domain {domain} does not match the kind of parameter `{name}`"
                )));
            }
        }
        Ok(())
    }
}

/// An immutable catalog entry.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::{Component, Parameter};
///
/// let pipeline = Component::new("Pipeline")
///     .provides("Classifier")
///     .requires("preprocessor", "Preprocessor")
///     .requires("learner", "BaseLearner");
/// let svm = Component::new("SVM")
///     .provides("BaseLearner")
///     .with_parameter(Parameter::numeric("C", 0.01, 100.0, 1.0));
/// assert!(pipeline.provides_interface("Classifier"));
/// assert_eq!(svm.parameters.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Component {
    pub name: String,
    pub provided_interfaces: Vec<String>,
    pub required_interfaces: Vec<RequiredInterface>,
    pub parameters: Vec<Parameter>,
    pub dependencies: Vec<Dependency>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provided_interfaces: Vec::new(),
            required_interfaces: Vec::new(),
            parameters: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn provides(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.provided_interfaces.contains(&interface) {
            self.provided_interfaces.push(interface);
        }
        self
    }

    pub fn requires(mut self, slot: impl Into<String>, interface: impl Into<String>) -> Self {
        self.required_interfaces.push(RequiredInterface {
            slot: slot.into(),
            interface: interface.into(),
        });
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn provides_interface(&self, interface: &str) -> bool {
        self.provided_interfaces.iter().any(|i| i == interface)
    }

    /// Checks parameters, slots and dependencies for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut names = HashSet::new();
        for p in &self.parameters {
            if !names.insert(p.name.as_str()) {
                return Err(ConfigurationError::InvalidParameter {
                    component: self.name.clone(),
                    parameter: p.name.clone(),
                    reason: "parameter name is declared twice".into(),
                });
            }
            p.validate(&self.name)?;
        }
        let mut slots = HashSet::new();
        for r in &self.required_interfaces {
            if !slots.insert(r.slot.as_str()) {
                return Err(ConfigurationError::InvalidConfig(format!(
                    "component `{}` declares slot `{}` twice",
                    self.name, r.slot
                )));
            }
        }
        for d in &self.dependencies {
            d.validate(self)?;
        }
        Ok(())
    }
}

/// The read-only set of components a problem draws from.
///
/// Shared across worker threads; components are handed out as
/// `Arc<Component>` so instances can refer to them cheaply.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    components: Vec<Arc<Component>>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog, validating every component.
    pub fn new<I>(components: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = Component>,
    {
        let mut catalog = Catalog::default();
        for c in components {
            c.validate()?;
            if catalog.index.contains_key(&c.name) {
                return Err(ConfigurationError::DuplicateComponent(c.name));
            }
            catalog.index.insert(c.name.clone(), catalog.components.len());
            catalog.components.push(Arc::new(c));
        }
        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Component>> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    /// Components providing `interface`, in catalog order.
    pub fn providers_of(&self, interface: &str) -> Vec<&Arc<Component>> {
        self.components
            .iter()
            .filter(|c| c.provides_interface(interface))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Component>> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
