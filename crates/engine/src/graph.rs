//! Static step dependency graph.
//!
//! [`FlowGraph`] is the validated, immutable form of a [`FlowDocument`]:
//! every referenced step id exists, no step depends on itself, the edges
//! form a DAG (checked by topological sort), every automatic step has a
//! request template, and every substitution rule parses into a
//! [`StepReference`]. The graph also answers the scheduling question: given
//! the current session state, which steps are eligible to run.

use indexmap::IndexMap;

use tokex_types::{FlowDocument, StepDefinition, StepReference};

use crate::{
    error::{ConfigError, InvariantError},
    session::SessionState,
};

/// One placeholder-to-upstream-value mapping declared for a step.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SubstitutionRule {
    /// Literal placeholder token as it appears in the template.
    pub placeholder: String,
    /// Parsed upstream reference the placeholder resolves from.
    pub reference: StepReference,
}

/// Validated, immutable flow graph.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    steps: Vec<StepDefinition>,
    dependencies: IndexMap<String, Vec<String>>,
    dependents: IndexMap<String, Vec<String>>,
    templates: IndexMap<String, String>,
    rules: IndexMap<String, Vec<SubstitutionRule>>,
    extractions: IndexMap<String, Vec<String>>,
    endpoint_defaults: IndexMap<String, String>,
    execution_order: Vec<String>,
}

impl FlowGraph {
    /// Validates a flow document and builds the graph.
    ///
    /// Returns the first fatal [`ConfigError`] encountered; no partial
    /// graph is ever produced.
    pub fn from_document(document: FlowDocument) -> Result<Self, ConfigError> {
        let mut known_ids: IndexMap<&str, &StepDefinition> = IndexMap::new();
        for step in &document.steps {
            if known_ids.insert(step.id.as_str(), step).is_some() {
                return Err(ConfigError::DuplicateStep { id: step.id.clone() });
            }
        }

        let mut dependencies: IndexMap<String, Vec<String>> = IndexMap::new();
        for step in &document.steps {
            dependencies.insert(step.id.clone(), Vec::new());
        }
        for (step_id, declared) in &document.dependencies {
            if !known_ids.contains_key(step_id.as_str()) {
                return Err(ConfigError::UnknownStepReference {
                    section: "dependencies".into(),
                    id: step_id.clone(),
                });
            }
            let entry = dependencies.get_mut(step_id).expect("dependency entry exists");
            for dependency in declared {
                if dependency == step_id {
                    return Err(ConfigError::SelfDependency { id: step_id.clone() });
                }
                if !known_ids.contains_key(dependency.as_str()) {
                    return Err(ConfigError::UnknownStepReference {
                        section: "dependencies".into(),
                        id: dependency.clone(),
                    });
                }
                if !entry.contains(dependency) {
                    entry.push(dependency.clone());
                }
            }
        }

        for step_id in document.curl_templates.keys() {
            if !known_ids.contains_key(step_id.as_str()) {
                return Err(ConfigError::UnknownStepReference {
                    section: "curl_templates".into(),
                    id: step_id.clone(),
                });
            }
        }
        for step_id in document.extractions.keys() {
            if !known_ids.contains_key(step_id.as_str()) {
                return Err(ConfigError::UnknownStepReference {
                    section: "extractions".into(),
                    id: step_id.clone(),
                });
            }
        }

        let mut rules: IndexMap<String, Vec<SubstitutionRule>> = IndexMap::new();
        for (step_id, declared_rules) in &document.substitution_rules {
            if !known_ids.contains_key(step_id.as_str()) {
                return Err(ConfigError::UnknownStepReference {
                    section: "substitution_rules".into(),
                    id: step_id.clone(),
                });
            }
            let mut parsed_rules = Vec::with_capacity(declared_rules.len());
            for (placeholder, raw_reference) in declared_rules {
                let reference = StepReference::parse(raw_reference).ok_or_else(|| ConfigError::MalformedReference {
                    id: step_id.clone(),
                    reference: raw_reference.clone(),
                })?;
                if !known_ids.contains_key(reference.step_id.as_str()) {
                    return Err(ConfigError::UnknownStepReference {
                        section: "substitution_rules".into(),
                        id: reference.step_id.clone(),
                    });
                }
                parsed_rules.push(SubstitutionRule {
                    placeholder: placeholder.clone(),
                    reference,
                });
            }
            rules.insert(step_id.clone(), parsed_rules);
        }

        for step in &document.steps {
            if !step.manual && !document.curl_templates.contains_key(&step.id) {
                return Err(ConfigError::MissingTemplate { id: step.id.clone() });
            }
        }

        let mut dependents: IndexMap<String, Vec<String>> = IndexMap::new();
        for step in &document.steps {
            dependents.insert(step.id.clone(), Vec::new());
        }
        for (step_id, declared) in &dependencies {
            for dependency in declared {
                dependents.get_mut(dependency).expect("dependent entry exists").push(step_id.clone());
            }
        }

        let execution_order = topological_order(&document.steps, &dependencies, &dependents)?;

        Ok(Self {
            steps: document.steps,
            dependencies,
            dependents,
            templates: document.curl_templates,
            rules,
            extractions: document.extractions,
            endpoint_defaults: document.endpoint_defaults,
            execution_order,
        })
    }

    /// All steps in declared order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Looks up a step by id.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == step_id)
    }

    /// Direct dependencies of a step.
    pub fn dependencies_of(&self, step_id: &str) -> &[String] {
        self.dependencies.get(step_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Request template for a step, when one is declared.
    pub fn template(&self, step_id: &str) -> Option<&str> {
        self.templates.get(step_id).map(String::as_str)
    }

    /// Parsed substitution rules for a step.
    pub fn rules_for(&self, step_id: &str) -> &[SubstitutionRule] {
        self.rules.get(step_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Response fields to extract after the step succeeds.
    pub fn extraction_keys(&self, step_id: &str) -> &[String] {
        self.extractions.get(step_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fallback endpoint paths from the document.
    pub fn endpoint_defaults(&self) -> &IndexMap<String, String> {
        &self.endpoint_defaults
    }

    /// One valid topological ordering of the steps. Used for previews; the
    /// scheduler itself re-derives eligibility from session state.
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Computes the steps currently eligible to run: every step whose
    /// dependencies are all completed and which is not itself completed.
    /// Manual steps are included so the caller can surface them, but the
    /// engine never executes them.
    ///
    /// The result is in declared step order, which makes runs reproducible;
    /// correctness does not depend on that order. A completed step with an
    /// incomplete dependency means the session state was corrupted by a
    /// caller, which is reported instead of being silently repaired.
    pub fn eligible_steps<'graph>(&'graph self, state: &SessionState) -> Result<Vec<&'graph StepDefinition>, InvariantError> {
        for step in &self.steps {
            if !state.is_completed(&step.id) {
                continue;
            }
            for dependency in self.dependencies_of(&step.id) {
                if !state.is_completed(dependency) {
                    return Err(InvariantError::InconsistentCompletion {
                        id: step.id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        Ok(self
            .steps
            .iter()
            .filter(|step| !state.is_completed(&step.id))
            .filter(|step| self.dependencies_of(&step.id).iter().all(|dependency| state.is_completed(dependency)))
            .collect())
    }

    /// Every step that transitively depends on the given step.
    pub fn transitive_dependents(&self, step_id: &str) -> Vec<String> {
        let mut queue: Vec<&str> = self.dependents.get(step_id).map(|d| d.iter().map(String::as_str).collect()).unwrap_or_default();
        let mut collected: Vec<String> = Vec::new();

        while let Some(current) = queue.pop() {
            if collected.iter().any(|seen| seen == current) {
                continue;
            }
            collected.push(current.to_string());
            if let Some(children) = self.dependents.get(current) {
                queue.extend(children.iter().map(String::as_str));
            }
        }

        // Report in declared order for stable output.
        let mut ordered: Vec<String> = Vec::with_capacity(collected.len());
        for step in &self.steps {
            if collected.iter().any(|id| id == &step.id) {
                ordered.push(step.id.clone());
            }
        }
        ordered
    }

    /// Clears a step's result and cascades the invalidation to every
    /// transitive dependent, so no dependent can keep a value substituted
    /// from the old result.
    pub fn reset_with_dependents(&self, state: &mut SessionState, step_id: &str) {
        let dependents = self.transitive_dependents(step_id);
        state.clear_steps(std::iter::once(step_id).chain(dependents.iter().map(String::as_str)));
    }
}

/// Kahn's algorithm over the declared steps. Any node left unvisited sits
/// on a cycle; those ids are reported sorted for a stable error message.
fn topological_order(
    steps: &[StepDefinition],
    dependencies: &IndexMap<String, Vec<String>>,
    dependents: &IndexMap<String, Vec<String>>,
) -> Result<Vec<String>, ConfigError> {
    let mut in_degrees: IndexMap<&str, usize> = steps
        .iter()
        .map(|step| (step.id.as_str(), dependencies.get(&step.id).map(Vec::len).unwrap_or(0)))
        .collect();

    let mut queue: std::collections::VecDeque<&str> = steps
        .iter()
        .filter(|step| in_degrees.get(step.id.as_str()).copied().unwrap_or(0) == 0)
        .map(|step| step.id.as_str())
        .collect();

    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(step_id) = queue.pop_front() {
        ordered.push(step_id.to_string());
        if let Some(children) = dependents.get(step_id) {
            for child in children {
                let degree = in_degrees.get_mut(child.as_str()).expect("dependent step has a degree entry");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child.as_str());
                }
            }
        }
    }

    if ordered.len() != steps.len() {
        let mut remaining: Vec<String> = in_degrees
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id.to_string())
            .collect();
        remaining.sort();
        return Err(ConfigError::CyclicDependency { steps: remaining });
    }

    Ok(ordered)
}
