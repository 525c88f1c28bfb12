//! Template substitution.
//!
//! Rendering turns a step's curl template into an executable
//! [`RenderedRequest`] in three passes: endpoint tokens (`{token_endpoint}`)
//! are resolved against discovered endpoints with a fallback to configured
//! defaults, placeholder tokens (`<device-code>`) are replaced verbatim with
//! values extracted from completed upstream steps, and a final scan rejects
//! anything left unresolved. Rendering is pure: no I/O, no state mutation,
//! identical inputs produce identical output.

use indexmap::IndexMap;
use serde_json::Value;

use crate::{
    error::SubstitutionError,
    graph::FlowGraph,
    request::{RenderedRequest, parse_curl_command},
    session::SessionState,
};

/// Endpoint lookup used during rendering: discovered endpoints win, then
/// configured default paths appended to the server base URL.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
    discovered: IndexMap<String, String>,
    defaults: IndexMap<String, String>,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>, discovered: IndexMap<String, String>, defaults: IndexMap<String, String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            discovered,
            defaults,
        }
    }

    /// Resolves an endpoint name to a full URL, or `None` when it is
    /// neither discovered nor defaulted.
    pub fn resolve(&self, name: &str) -> Option<String> {
        if let Some(url) = self.discovered.get(name) {
            return Some(url.clone());
        }
        self.defaults.get(name).map(|path| format!("{}{}", self.base_url, path))
    }
}

/// Renders a step's request template against the current session state.
///
/// Fails with a [`SubstitutionError`] naming the exact token or upstream
/// reference at fault; a partial or garbled render is never produced.
pub fn render(
    step_id: &str,
    graph: &FlowGraph,
    state: &SessionState,
    endpoints: &Endpoints,
) -> Result<RenderedRequest, SubstitutionError> {
    let template = graph.template(step_id).ok_or_else(|| SubstitutionError::MalformedTemplate {
        reason: format!("step '{step_id}' has no request template"),
    })?;

    let mut rendered = resolve_endpoint_tokens(template, endpoints)?;

    for rule in graph.rules_for(step_id) {
        let source = state
            .result(&rule.reference.step_id)
            .filter(|result| result.is_completed())
            .ok_or_else(|| SubstitutionError::MissingUpstreamValue {
                placeholder: rule.placeholder.clone(),
                reference: rule.reference.to_string(),
            })?;

        let value = lookup_field(&source.fields, &rule.reference.field_path).ok_or_else(|| SubstitutionError::MissingUpstreamValue {
            placeholder: rule.placeholder.clone(),
            reference: rule.reference.to_string(),
        })?;

        rendered = rendered.replace(&rule.placeholder, &format_field_value(&value));
    }

    if let Some(token) = find_unbound_token(&rendered) {
        return Err(SubstitutionError::UnboundPlaceholder { token });
    }

    parse_curl_command(&rendered)
}

/// Replaces every `{identifier}` endpoint token. A `{` not followed by an
/// identifier and a closing `}` is left alone, so JSON braces in template
/// bodies never trip the scanner.
fn resolve_endpoint_tokens(template: &str, endpoints: &Endpoints) -> Result<String, SubstitutionError> {
    let mut output = String::with_capacity(template.len());
    let mut remainder = template;

    while let Some(start) = remainder.find('{') {
        let (before, after_brace) = remainder.split_at(start);
        output.push_str(before);
        let after_brace = &after_brace[1..];

        match split_endpoint_identifier(after_brace) {
            Some((token, rest)) => {
                let url = endpoints
                    .resolve(token)
                    .ok_or_else(|| SubstitutionError::UnresolvedEndpoint { token: token.to_string() })?;
                output.push_str(&url);
                remainder = rest;
            }
            None => {
                output.push('{');
                remainder = after_brace;
            }
        }
    }

    output.push_str(remainder);
    Ok(output)
}

/// Splits `identifier}rest` off the front of the input, or `None` when the
/// input does not start with a well-formed endpoint token body.
fn split_endpoint_identifier(input: &str) -> Option<(&str, &str)> {
    let end = input.find('}')?;
    let identifier = &input[..end];

    let mut characters = identifier.chars();
    let first = characters.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !characters.all(|character| character.is_ascii_alphanumeric() || character == '_') {
        return None;
    }

    Some((identifier, &input[end + 1..]))
}

/// Finds the first remaining placeholder-looking token: either a
/// `<kebab-or-snake-token>` value token or a leftover `{identifier}`.
fn find_unbound_token(rendered: &str) -> Option<String> {
    let mut remainder = rendered;
    while let Some(start) = remainder.find('<') {
        let after = &remainder[start + 1..];
        if let Some(end) = after.find('>') {
            let candidate = &after[..end];
            let well_formed = !candidate.is_empty()
                && candidate
                    .chars()
                    .all(|character| character.is_ascii_alphanumeric() || character == '-' || character == '_');
            if well_formed {
                return Some(format!("<{candidate}>"));
            }
        }
        remainder = after;
    }

    let mut remainder = rendered;
    while let Some(start) = remainder.find('{') {
        let after = &remainder[start + 1..];
        if let Some((identifier, _)) = split_endpoint_identifier(after) {
            return Some(format!("{{{identifier}}}"));
        }
        remainder = after;
    }

    None
}

/// Looks up a dotted field path: the first segment keys into the extracted
/// fields, the rest navigates nested JSON objects and array indices.
fn lookup_field(fields: &IndexMap<String, Value>, field_path: &str) -> Option<Value> {
    let (first, rest) = match field_path.split_once('.') {
        Some((first, rest)) => (first, Some(rest)),
        None => (field_path, None),
    };

    let mut current = fields.get(first)?;
    if let Some(rest) = rest {
        for segment in rest.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
    }
    if current.is_null() {
        return None;
    }
    Some(current.clone())
}

/// Values are inserted verbatim: strings as-is, scalars via their display
/// form, structures as compact JSON. The template author is responsible
/// for quoting.
fn format_field_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(boolean) => boolean.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestBody;
    use crate::session::StepResult;
    use indexmap::indexmap;
    use serde_json::json;
    use tokex_types::{FlowDocument, StepDefinition};

    fn graph() -> FlowGraph {
        let document = FlowDocument {
            steps: vec![
                StepDefinition {
                    id: "a".into(),
                    title: "Register".into(),
                    description: String::new(),
                    manual: false,
                },
                StepDefinition {
                    id: "b".into(),
                    title: "Exchange".into(),
                    description: String::new(),
                    manual: false,
                },
            ],
            dependencies: indexmap! { "b".into() => vec!["a".into()] },
            curl_templates: indexmap! {
                "a".into() => "curl -X POST {registration_endpoint} -H \"Content-Type: application/json\" -d '{\"redirect_uris\": []}'".into(),
                "b".into() => "curl -X POST {token_endpoint} -H \"Content-Type: application/x-www-form-urlencoded\" -d \"client_id=<backend-client-id>\"".into(),
            },
            substitution_rules: indexmap! {
                "b".into() => indexmap! { "<backend-client-id>".into() => "step.a.client_id".into() },
            },
            ..FlowDocument::default()
        };
        FlowGraph::from_document(document).expect("valid document")
    }

    fn endpoints() -> Endpoints {
        Endpoints::new(
            "https://auth.example.org/",
            indexmap! { "token_endpoint".into() => "https://auth.example.org/oauth/token".into() },
            indexmap! {
                "registration_endpoint".into() => "/register".into(),
                "token_endpoint".into() => "/token".into(),
            },
        )
    }

    fn state_with_a_completed() -> SessionState {
        let mut state = SessionState::new();
        let fields = indexmap! { "client_id".to_string() => json!("C1") };
        state
            .record("a", StepResult::completed(201, json!({"client_id": "C1"}), fields))
            .expect("record a");
        state
    }

    #[test]
    fn discovered_endpoint_wins_over_default() {
        let rendered = render("b", &graph(), &state_with_a_completed(), &endpoints()).expect("render b");
        assert_eq!(rendered.url, "https://auth.example.org/oauth/token");
    }

    #[test]
    fn default_endpoint_is_appended_to_base_url() {
        let rendered = render("a", &graph(), &SessionState::new(), &endpoints()).expect("render a");
        assert_eq!(rendered.url, "https://auth.example.org/register");
        assert_eq!(rendered.body, Some(RequestBody::Json(json!({"redirect_uris": []}))));
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let empty = Endpoints::new("https://auth.example.org", IndexMap::new(), IndexMap::new());
        let error = render("a", &graph(), &SessionState::new(), &empty).expect_err("must fail");
        assert_eq!(
            error,
            SubstitutionError::UnresolvedEndpoint {
                token: "registration_endpoint".into()
            }
        );
    }

    #[test]
    fn substitutes_upstream_value_verbatim() {
        let rendered = render("b", &graph(), &state_with_a_completed(), &endpoints()).expect("render b");
        assert_eq!(rendered.body, Some(RequestBody::Form("client_id=C1".into())));
        let serialized = serde_json::to_string(&rendered).expect("serialize");
        assert!(!serialized.contains("<backend-client-id>"), "no literal placeholder survives");
    }

    #[test]
    fn rendering_before_source_completion_is_rejected() {
        let error = render("b", &graph(), &SessionState::new(), &endpoints()).expect_err("must fail");
        assert_eq!(
            error,
            SubstitutionError::MissingUpstreamValue {
                placeholder: "<backend-client-id>".into(),
                reference: "step.a.client_id".into(),
            }
        );
    }

    #[test]
    fn missing_extracted_field_is_rejected() {
        let mut state = SessionState::new();
        state
            .record("a", StepResult::completed(201, json!({}), IndexMap::new()))
            .expect("record a");
        let error = render("b", &graph(), &state, &endpoints()).expect_err("must fail");
        assert!(matches!(error, SubstitutionError::MissingUpstreamValue { .. }));
    }

    #[test]
    fn rendering_is_pure() {
        let graph = graph();
        let state = state_with_a_completed();
        let endpoints = endpoints();

        let first = render("b", &graph, &state, &endpoints).expect("first render");
        let second = render("b", &graph, &state, &endpoints).expect("second render");
        assert_eq!(
            serde_json::to_string(&first).expect("serialize"),
            serde_json::to_string(&second).expect("serialize"),
            "identical inputs render byte-identically"
        );
    }

    #[test]
    fn unbound_placeholder_is_rejected() {
        let document = FlowDocument {
            steps: vec![StepDefinition {
                id: "x".into(),
                title: "X".into(),
                description: String::new(),
                manual: false,
            }],
            curl_templates: indexmap! {
                "x".into() => "curl -X GET {token_endpoint} -H \"Authorization: Bearer <unmapped-token>\"".into(),
            },
            ..FlowDocument::default()
        };
        let graph = FlowGraph::from_document(document).expect("valid document");

        let error = render("x", &graph, &SessionState::new(), &endpoints()).expect_err("must fail");
        assert_eq!(
            error,
            SubstitutionError::UnboundPlaceholder {
                token: "<unmapped-token>".into()
            }
        );
    }

    #[test]
    fn json_braces_do_not_trip_the_endpoint_scanner() {
        let rendered = render("a", &graph(), &SessionState::new(), &endpoints()).expect("render a");
        assert_eq!(rendered.body, Some(RequestBody::Json(json!({"redirect_uris": []}))));
    }

    #[test]
    fn dotted_field_paths_navigate_nested_values() {
        let fields = indexmap! { "token".to_string() => json!({"access_token": "T1", "ids": ["first", "second"]}) };
        assert_eq!(lookup_field(&fields, "token.access_token"), Some(json!("T1")));
        assert_eq!(lookup_field(&fields, "token.ids.1"), Some(json!("second")));
        assert_eq!(lookup_field(&fields, "token.missing"), None);
    }
}
