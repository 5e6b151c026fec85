//! Task decomposition: successor generation and instance extraction.

use super::problem::ConfigurationProblem;
use super::state::{Fact, ObjectId, PlanningState, Task};
use crate::model::{Component, ComponentInstance, Parameter, ParameterDomain};
use crate::refinement::{
    effective_domains, is_atomic, parse_numeric_value, refine_categorical, refine_numeric,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Turns a configuration problem into a search graph.
///
/// # Examples
///
/// ```
/// use u_configsearch::model::{Catalog, Component};
/// use u_configsearch::reduction::{reduce, ConfigurationProblem};
/// use u_configsearch::refinement::RefinementConfigMap;
///
/// let catalog = Catalog::new([
///     Component::new("A").provides("Root"),
///     Component::new("B").provides("Root"),
/// ]).unwrap();
/// let problem = ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new()).unwrap();
/// let graph = reduce(problem);
///
/// let root = graph.root_state();
/// let children = graph.successors(&root);
/// assert_eq!(children.len(), 2);
/// assert!(children.iter().all(|c| graph.is_goal(c)));
/// ```
pub fn reduce(problem: ConfigurationProblem) -> DecompositionProblem {
    info!(
        components = problem.catalog().len(),
        root = problem.root_interface(),
        "configuration problem reduced"
    );
    DecompositionProblem {
        problem: Arc::new(problem),
    }
}

/// The search graph induced by a [`ConfigurationProblem`].
///
/// Each open required interface is a task whose resolution picks a
/// providing component and opens tasks for that component's required
/// interfaces (worked on first) and parameters (worked on after every
/// interface is resolved). A state with no open tasks is a goal.
#[derive(Debug, Clone)]
pub struct DecompositionProblem {
    problem: Arc<ConfigurationProblem>,
}

impl DecompositionProblem {
    pub fn problem(&self) -> &ConfigurationProblem {
        &self.problem
    }

    pub fn root_state(&self) -> Arc<PlanningState> {
        Arc::new(PlanningState::root(self.problem.root_interface()))
    }

    pub fn is_goal(&self, state: &PlanningState) -> bool {
        state.is_goal()
    }

    /// The states reachable by working on `state`'s first open task.
    ///
    /// Returns an empty list for goal states and for dead ends, e.g. a
    /// categorical parameter whose effective domain became empty.
    pub fn successors(&self, state: &Arc<PlanningState>) -> Vec<Arc<PlanningState>> {
        let Some((task, rest)) = state.tasks().split_first() else {
            return Vec::new();
        };
        match task {
            Task::ResolveInterface {
                parent,
                slot,
                interface,
            } => self.resolve_interface(state, *parent, slot, interface, rest),
            Task::RefineParameter { object, parameter } => {
                self.refine_parameter(state, task, *object, parameter, rest)
            }
        }
    }

    fn resolve_interface(
        &self,
        state: &Arc<PlanningState>,
        parent: Option<ObjectId>,
        slot: &str,
        interface: &str,
        rest: &[Task],
    ) -> Vec<Arc<PlanningState>> {
        let configs = self.problem.refinement();
        let object = ObjectId(state.next_object());
        self.problem
            .catalog()
            .providers_of(interface)
            .into_iter()
            .map(|component| {
                let mut added = vec![Fact::Resolves {
                    parent,
                    slot: slot.to_string(),
                    component: Arc::clone(component),
                    object,
                }];
                let mut tasks: Vec<Task> = component
                    .required_interfaces
                    .iter()
                    .map(|req| Task::ResolveInterface {
                        parent: Some(object),
                        slot: req.slot.clone(),
                        interface: req.interface.clone(),
                    })
                    .collect();
                tasks.extend(rest.iter().cloned());

                // Categorical parameters are decided before numeric ones so
                // that dependency premises settle before intervals are split.
                let (categorical, numeric): (Vec<&Parameter>, Vec<&Parameter>) =
                    component.parameters.iter().partition(|p| !p.is_numeric());
                for param in categorical.into_iter().chain(numeric) {
                    if let ParameterDomain::Numeric(declared) = &param.domain {
                        if let Some(config) = configs.get(&component.name, &param.name) {
                            if config.log_scale {
                                added.push(Fact::ParameterFocus {
                                    object,
                                    parameter: param.name.clone(),
                                    focus: config.focus_point.unwrap_or(declared.min),
                                });
                            }
                        }
                    }
                    tasks.push(Task::RefineParameter {
                        object,
                        parameter: param.name.clone(),
                    });
                }
                Arc::new(PlanningState::derive(state, added, tasks, object.0 + 1))
            })
            .collect()
    }

    fn refine_parameter(
        &self,
        state: &Arc<PlanningState>,
        task: &Task,
        object: ObjectId,
        parameter: &str,
        rest: &[Task],
    ) -> Vec<Arc<PlanningState>> {
        let facts = state.facts();
        let objects = collect_objects(&facts);
        let Some(record) = objects.records.get(&object) else {
            warn!(%object, "refinement task refers to an unknown object");
            return Vec::new();
        };
        let node = record.bare_instance();
        let domains = match effective_domains(&node) {
            Ok(domains) => domains,
            Err(reason) => {
                warn!(%object, %reason, "cannot compute effective domains");
                return Vec::new();
            }
        };
        let Some(domain) = domains.get(parameter) else {
            return Vec::new();
        };
        let already_set = node.is_explicitly_set(parameter);
        let next_object = state.next_object();
        let closed = || Fact::Closed {
            object,
            parameter: parameter.to_string(),
        };
        let value = |value: String| Fact::ParameterValue {
            object,
            parameter: parameter.to_string(),
            value,
        };
        let close_only =
            || vec![Arc::new(PlanningState::derive(state, vec![closed()], rest.to_vec(), next_object))];

        match domain {
            ParameterDomain::Numeric(current) => {
                let Some(config) = self.problem.refinement().get(&record.component.name, parameter)
                else {
                    return close_only();
                };
                let focus = focus_of(&facts, object, parameter).unwrap_or(current.min);
                let children = refine_numeric(current, config, focus, already_set);
                if children.is_empty() {
                    return close_only();
                }
                children
                    .into_iter()
                    .map(|interval| {
                        let mut added = vec![value(interval.to_string())];
                        let mut tasks = rest.to_vec();
                        if is_atomic(&current.with_interval(interval), config) {
                            added.push(closed());
                        } else {
                            tasks.push(task.clone());
                        }
                        Arc::new(PlanningState::derive(state, added, tasks, next_object))
                    })
                    .collect()
            }
            ParameterDomain::Categorical(current) => {
                if already_set {
                    return close_only();
                }
                refine_categorical(current, already_set)
                    .into_iter()
                    .filter_map(|single| single.values.into_iter().next())
                    .map(|v| {
                        Arc::new(PlanningState::derive(
                            state,
                            vec![value(v), closed()],
                            rest.to_vec(),
                            next_object,
                        ))
                    })
                    .collect()
            }
        }
    }

    /// The component instance described by `state`.
    ///
    /// Returns `None` before the root interface is resolved. Slots that
    /// are still open are absent from the tree. With `resolve_intervals`,
    /// numeric parameters holding an interval are replaced by a concrete
    /// value: integer parameters take the rounded midpoint, real ones the
    /// default value if it lies inside the interval and the midpoint
    /// otherwise.
    pub fn instance_for_state(
        &self,
        state: &PlanningState,
        resolve_intervals: bool,
    ) -> Option<ComponentInstance> {
        let facts = state.facts();
        let objects = collect_objects(&facts);
        let root = objects.root?;
        Some(objects.build(root, resolve_intervals))
    }
}

struct ObjectRecord {
    component: Arc<Component>,
    values: BTreeMap<String, String>,
    children: Vec<(String, ObjectId)>,
}

impl ObjectRecord {
    fn bare_instance(&self) -> ComponentInstance {
        self.values.iter().fold(
            ComponentInstance::new(Arc::clone(&self.component)),
            |inst, (k, v)| inst.with_parameter(k.clone(), v.clone()),
        )
    }
}

struct Objects {
    root: Option<ObjectId>,
    records: HashMap<ObjectId, ObjectRecord>,
}

impl Objects {
    fn build(&self, id: ObjectId, resolve: bool) -> ComponentInstance {
        let record = &self.records[&id];
        let mut instance = ComponentInstance::new(Arc::clone(&record.component));
        for (name, value) in &record.values {
            let value = match record.component.parameter(name) {
                Some(param) if resolve => resolve_value(param, value),
                _ => value.clone(),
            };
            instance.set_parameter_value(name.clone(), value);
        }
        for (slot, child) in &record.children {
            if self.records.contains_key(child) {
                instance.set_child(slot.clone(), self.build(*child, resolve));
            }
        }
        instance
    }
}

fn collect_objects(facts: &[&Fact]) -> Objects {
    let mut objects = Objects {
        root: None,
        records: HashMap::new(),
    };
    for fact in facts {
        match fact {
            Fact::Resolves {
                parent,
                slot,
                component,
                object,
            } => {
                match parent {
                    Some(p) => {
                        if let Some(parent_record) = objects.records.get_mut(p) {
                            parent_record.children.push((slot.clone(), *object));
                        }
                    }
                    None => objects.root = Some(*object),
                }
                objects.records.insert(
                    *object,
                    ObjectRecord {
                        component: Arc::clone(component),
                        values: BTreeMap::new(),
                        children: Vec::new(),
                    },
                );
            }
            Fact::ParameterValue {
                object,
                parameter,
                value,
            } => {
                if let Some(record) = objects.records.get_mut(object) {
                    record.values.insert(parameter.clone(), value.clone());
                }
            }
            Fact::Closed { .. } | Fact::ParameterFocus { .. } => {}
        }
    }
    objects
}

fn focus_of(facts: &[&Fact], object: ObjectId, parameter: &str) -> Option<f64> {
    facts.iter().rev().find_map(|fact| match fact {
        Fact::ParameterFocus {
            object: o,
            parameter: p,
            focus,
        } if *o == object && p == parameter => Some(*focus),
        _ => None,
    })
}

fn resolve_value(param: &Parameter, value: &str) -> String {
    let ParameterDomain::Numeric(declared) = &param.domain else {
        return value.to_string();
    };
    let Some(interval) = parse_numeric_value(value) else {
        return value.to_string();
    };
    if declared.is_integer {
        let v = interval.midpoint().round().clamp(declared.min, declared.max);
        return format!("{}", v as i64);
    }
    let default = match &param.default {
        crate::model::ParameterValue::Numeric(d) => Some(*d),
        crate::model::ParameterValue::Categorical(_) => None,
    };
    let v = match default {
        Some(d) if interval.contains(d) => d,
        _ => interval.midpoint(),
    };
    format!("{v}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Catalog, CategoricalDomain, Dependency, NumericDomain};
    use crate::refinement::{RefinementConfig, RefinementConfigMap};

    fn single_numeric(config: RefinementConfig) -> DecompositionProblem {
        let catalog = Catalog::new([Component::new("A")
            .provides("Root")
            .with_parameter(Parameter::numeric("p", 0.0, 10.0, 5.0))])
        .unwrap();
        reduce(
            ConfigurationProblem::new(
                catalog,
                "Root",
                RefinementConfigMap::new().with("A", "p", config),
            )
            .unwrap(),
        )
    }

    fn walk_first(graph: &DecompositionProblem) -> Arc<PlanningState> {
        let mut state = graph.root_state();
        while !graph.is_goal(&state) {
            let children = graph.successors(&state);
            assert!(!children.is_empty(), "dead end at depth {}", state.depth());
            state = Arc::clone(&children[0]);
        }
        state
    }

    #[test]
    fn test_structural_phase_comes_first() {
        let catalog = Catalog::new([
            Component::new("P")
                .provides("Root")
                .requires("l", "L")
                .with_parameter(Parameter::categorical("mode", ["x", "y"], "x")),
            Component::new("T").provides("L"),
        ])
        .unwrap();
        let graph = reduce(ConfigurationProblem::new(catalog, "Root", RefinementConfigMap::new()).unwrap());
        let root = graph.root_state();
        let after_p = &graph.successors(&root)[0];
        assert!(after_p.in_structural_phase(), "child slot must be resolved before parameters");
        let after_t = &graph.successors(after_p)[0];
        assert!(!after_t.in_structural_phase());
        let goals = graph.successors(after_t);
        assert_eq!(goals.len(), 2);
        assert!(goals.iter().all(|g| g.is_goal()));
    }

    #[test]
    fn test_numeric_refinement_reaches_goal() {
        let graph = single_numeric(RefinementConfig::linear(1.0, 5));
        let goal = walk_first(&graph);
        let raw = graph.instance_for_state(&goal, false).unwrap();
        let interval: crate::model::Interval = raw.parameter_value("p").unwrap().parse().unwrap();
        assert!(interval.length() <= 1.0);
        assert_eq!(interval.min, 0.0);

        let resolved = graph.instance_for_state(&goal, true).unwrap();
        let p = resolved.numeric_value("p").unwrap();
        assert!(interval.contains(p), "{p} outside {interval}");
    }

    #[test]
    fn test_resolution_prefers_default() {
        let catalog = Catalog::new([Component::new("A")
            .provides("Root")
            .with_parameter(Parameter::numeric("p", 0.0, 10.0, 5.0))
            .with_parameter(Parameter::integer("k", 0, 100, 3))])
        .unwrap();
        let param_p = catalog.get("A").unwrap().parameter("p").unwrap().clone();
        let param_k = catalog.get("A").unwrap().parameter("k").unwrap().clone();
        assert_eq!(resolve_value(&param_p, "[4, 6]"), "5");
        assert_eq!(resolve_value(&param_p, "[6, 8]"), "7");
        assert_eq!(resolve_value(&param_k, "[10, 13]"), "12");
        assert_eq!(resolve_value(&param_k, "7"), "7");
    }

    #[test]
    fn test_endpoints_offered_first() {
        let graph = single_numeric(RefinementConfig::linear(1.0, 6).with_include_endpoints(true));
        let root = graph.root_state();
        let resolved = &graph.successors(&root)[0];
        let children = graph.successors(resolved);
        assert_eq!(children.len(), 6);
        let first = graph.instance_for_state(&children[0], false).unwrap();
        assert_eq!(first.parameter_value("p"), Some("[0, 0]"));
        assert!(children[0].is_goal(), "point interval closes the parameter");
    }

    #[test]
    fn test_log_focus_recorded() {
        let graph = single_numeric(RefinementConfig::logarithmic(0.5, 4, 2.0).with_focus_point(10.0));
        let root = graph.root_state();
        let resolved = &graph.successors(&root)[0];
        assert!(resolved
            .added_facts()
            .iter()
            .any(|f| matches!(f, Fact::ParameterFocus { focus, .. } if *focus == 10.0)));
        let children = graph.successors(resolved);
        let first: crate::model::Interval = graph
            .instance_for_state(&children[0], false)
            .unwrap()
            .parameter_value("p")
            .unwrap()
            .parse()
            .unwrap();
        let last: crate::model::Interval = graph
            .instance_for_state(children.last().unwrap(), false)
            .unwrap()
            .parameter_value("p")
            .unwrap()
            .parse()
            .unwrap();
        assert!(last.length() < first.length(), "parts shrink towards the focus");
    }

    #[test]
    fn test_dependency_narrows_before_refinement() {
        let catalog = Catalog::new([Component::new("A")
            .provides("Root")
            .with_parameter(Parameter::numeric("p", 0.0, 10.0, 5.0))
            .with_parameter(Parameter::categorical("mode", ["narrow", "wide"], "wide"))
            .with_dependency(
                Dependency::new()
                    .when([(
                        "mode",
                        ParameterDomain::Categorical(CategoricalDomain::singleton("narrow")),
                    )])
                    .then("p", ParameterDomain::Numeric(NumericDomain::real(2.0, 2.5))),
            )])
        .unwrap();
        let graph = reduce(
            ConfigurationProblem::new(
                catalog,
                "Root",
                RefinementConfigMap::new().with("A", "p", RefinementConfig::linear(1.0, 4)),
            )
            .unwrap(),
        );
        let goal = walk_first(&graph);
        let inst = graph.instance_for_state(&goal, false).unwrap();
        assert_eq!(inst.parameter_value("mode"), Some("narrow"));
        assert_eq!(inst.parameter_value("p"), Some("[2, 2.5]"));
    }

    #[test]
    fn test_explicit_value_not_refixed() {
        let graph = single_numeric(RefinementConfig::linear(1.0, 2));
        let mut state = graph.root_state();
        let mut last_value: Option<crate::model::Interval> = None;
        while !graph.is_goal(&state) {
            let children = graph.successors(&state);
            state = Arc::clone(children.last().unwrap());
            if let Some(v) = graph
                .instance_for_state(&state, false)
                .and_then(|i| i.parameter_value("p").map(str::to_string))
            {
                let iv: crate::model::Interval = v.parse().unwrap();
                if let Some(prev) = last_value {
                    assert!(prev.contains_interval(&iv), "{iv} must narrow {prev}");
                }
                last_value = Some(iv);
            }
        }
        assert!(last_value.unwrap().length() <= 1.0);
    }

    #[test]
    fn test_instance_before_root_resolution() {
        let graph = single_numeric(RefinementConfig::linear(1.0, 5));
        assert!(graph.instance_for_state(&graph.root_state(), false).is_none());
    }
}
