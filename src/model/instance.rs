//! Configuration trees built from catalog components.

use super::component::Component;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A (possibly partial) configuration tree.
///
/// Each node refers to a catalog [`Component`], holds the parameter
/// values set explicitly so far (a concrete value, or an interval string
/// `"[min, max]"` while a numeric parameter is still being refined) and
/// the child instances filling its required-interface slots.
///
/// Children are owned exclusively; `clone` is a deep copy. Equality and
/// hashing are structural (component names, parameter values, children),
/// which makes an instance usable as a cache key.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use u_configsearch::model::{Component, ComponentInstance};
///
/// let learner = Arc::new(Component::new("Tree").provides("Learner"));
/// let pipeline = Arc::new(Component::new("Pipeline").provides("Root").requires("learner", "Learner"));
///
/// let mut root = ComponentInstance::new(pipeline);
/// assert!(root.check_resolved().is_err());
/// root.set_child("learner", ComponentInstance::new(learner));
/// assert!(root.check_resolved().is_ok());
/// assert_eq!(root.structure_key(), "Pipeline(learner=Tree)");
/// ```
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    component: Arc<Component>,
    parameter_values: BTreeMap<String, String>,
    children: BTreeMap<String, ComponentInstance>,
}

impl ComponentInstance {
    pub fn new(component: Arc<Component>) -> Self {
        Self {
            component,
            parameter_values: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_parameter_value(name, value);
        self
    }

    pub fn with_child(mut self, slot: impl Into<String>, child: ComponentInstance) -> Self {
        self.set_child(slot, child);
        self
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn parameter_values(&self) -> &BTreeMap<String, String> {
        &self.parameter_values
    }

    pub fn children(&self) -> &BTreeMap<String, ComponentInstance> {
        &self.children
    }

    pub fn child(&self, slot: &str) -> Option<&ComponentInstance> {
        self.children.get(slot)
    }

    pub fn parameter_value(&self, name: &str) -> Option<&str> {
        self.parameter_values.get(name).map(String::as_str)
    }

    /// The value of a parameter parsed as a number, if set and numeric.
    pub fn numeric_value(&self, name: &str) -> Option<f64> {
        self.parameter_value(name)?.trim().parse().ok()
    }

    pub fn is_explicitly_set(&self, name: &str) -> bool {
        self.parameter_values.contains_key(name)
    }

    pub fn set_parameter_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameter_values.insert(name.into(), value.into());
    }

    pub fn set_child(&mut self, slot: impl Into<String>, child: ComponentInstance) {
        self.children.insert(slot.into(), child);
    }

    /// Verifies that every required slot in the tree is filled.
    ///
    /// Evaluators must never be handed a partial tree; the evaluation
    /// layer calls this before dispatching.
    pub fn check_resolved(&self) -> Result<(), String> {
        for req in &self.component.required_interfaces {
            match self.children.get(&req.slot) {
                Some(child) => child.check_resolved()?,
                None => {
                    return Err(format!(
                        "slot `{}` of `{}` is unresolved",
                        req.slot, self.component.name
                    ))
                }
            }
        }
        Ok(())
    }

    /// Identity of the component structure, ignoring parameter values.
    ///
    /// Two instances with the same components in the same slots share a
    /// structure key regardless of how their parameters are set.
    pub fn structure_key(&self) -> String {
        let mut out = String::new();
        self.write_structure(&mut out);
        out
    }

    fn write_structure(&self, out: &mut String) {
        out.push_str(&self.component.name);
        if self.children.is_empty() {
            return;
        }
        out.push('(');
        for (i, (slot, child)) in self.children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(slot);
            out.push('=');
            child.write_structure(out);
        }
        out.push(')');
    }

    /// All instances of the tree in pre-order (self first).
    pub fn nodes(&self) -> Vec<&ComponentInstance> {
        let mut out = vec![self];
        for child in self.children.values() {
            out.extend(child.nodes());
        }
        out
    }
}

impl PartialEq for ComponentInstance {
    fn eq(&self, other: &Self) -> bool {
        self.component.name == other.component.name
            && self.parameter_values == other.parameter_values
            && self.children == other.children
    }
}

impl Eq for ComponentInstance {}

impl Hash for ComponentInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.component.name.hash(state);
        self.parameter_values.hash(state);
        self.children.hash(state);
    }
}

impl fmt::Display for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.component.name)?;
        if !self.parameter_values.is_empty() {
            write!(f, "{{")?;
            for (i, (k, v)) in self.parameter_values.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, "}}")?;
        }
        if !self.children.is_empty() {
            write!(f, "(")?;
            for (i, (slot, child)) in self.children.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{slot}={child}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
