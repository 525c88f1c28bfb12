//! Flow document schema.
//!
//! A flow document declares the whole walkthrough as pure data: the steps,
//! the dependency edges between them, the curl-style request template for
//! each automatic step, the substitution rules that feed upstream outputs
//! into downstream templates, and fallback endpoint paths used when server
//! discovery does not advertise an endpoint.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Describes a fully authored flow, including metadata, steps, and the
/// per-step request plumbing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FlowDocument {
    /// Canonical flow identifier (for example, `token_exchange`).
    #[serde(default)]
    pub flow: Option<String>,
    /// Optional human-readable title for display surfaces.
    #[serde(default)]
    pub title: Option<String>,
    /// Ordered list of steps; declaration order is the stable tie-break
    /// when several steps become eligible at once.
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    /// Dependency edges: step id to the ids that must complete first.
    #[serde(default = "default_string_list_map")]
    pub dependencies: IndexMap<String, Vec<String>>,
    /// Curl-style request template per automatic step. Templates may contain
    /// `{endpoint_name}` tokens and `<placeholder>` value tokens.
    #[serde(default = "default_string_map")]
    pub curl_templates: IndexMap<String, String>,
    /// Substitution rules per step: placeholder token to a
    /// `step.<source_id>.<field>` reference string.
    #[serde(default = "default_rule_map")]
    pub substitution_rules: IndexMap<String, IndexMap<String, String>>,
    /// Response fields to capture per step once its request succeeds.
    #[serde(default = "default_string_list_map")]
    pub extractions: IndexMap<String, Vec<String>>,
    /// Fallback endpoint paths, appended to the server base URL when the
    /// discovery document does not advertise the endpoint.
    #[serde(default = "default_string_map")]
    pub endpoint_defaults: IndexMap<String, String>,
}

/// Describes a single step within a flow.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StepDefinition {
    /// Unique step identifier referenced by dependencies and rules.
    pub id: String,
    /// Short label shown in listings.
    pub title: String,
    /// Longer descriptive copy shown when the step is surfaced.
    #[serde(default)]
    pub description: String,
    /// Manual steps are completed by an external actor instead of by
    /// executing an HTTP request.
    #[serde(default)]
    pub manual: bool,
}

fn default_string_map() -> IndexMap<String, String> {
    IndexMap::new()
}

fn default_string_list_map() -> IndexMap<String, Vec<String>> {
    IndexMap::new()
}

fn default_rule_map() -> IndexMap<String, IndexMap<String, String>> {
    IndexMap::new()
}
