//! Flow document loading.
//!
//! Loads a declarative flow document from disk with format detection based
//! on the file extension (`.json` is JSON, everything else is YAML) and
//! validates it into an immutable [`FlowGraph`]. Loading has no side
//! effects beyond returning the graph; nothing is executed.

use std::{fs, path::Path};

use tracing::info;

use tokex_types::FlowDocument;

use crate::{error::ConfigError, graph::FlowGraph};

/// Loads and validates a flow document from the filesystem.
pub fn load_flow_from_file(path: impl AsRef<Path>) -> Result<FlowGraph, ConfigError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;

    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let document: FlowDocument = if is_json {
        serde_json::from_str(&raw).map_err(|error| ConfigError::Parse(error.to_string()))?
    } else {
        serde_yaml::from_str(&raw).map_err(|error| ConfigError::Parse(error.to_string()))?
    };

    let graph = FlowGraph::from_document(document)?;
    info!(path = %path.display(), steps = graph.steps().len(), "flow document loaded");
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_FLOW: &str = r#"
flow: demo
steps:
  - id: a
    title: First
  - id: b
    title: Second
dependencies:
  b: [a]
curl_templates:
  a: curl -X GET {token_endpoint}
  b: curl -X GET {token_endpoint}
"#;

    #[test]
    fn loads_yaml_document() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("flow.yaml");
        std::fs::write(&path, MINIMAL_FLOW).expect("write flow");

        let graph = load_flow_from_file(&path).expect("load");
        assert_eq!(graph.steps().len(), 2);
        assert_eq!(graph.dependencies_of("b"), ["a"]);
    }

    #[test]
    fn loads_json_document() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("flow.json");
        std::fs::write(
            &path,
            r#"{"steps": [{"id": "a", "title": "A"}], "curl_templates": {"a": "curl -X GET {token_endpoint}"}}"#,
        )
        .expect("write flow");

        let graph = load_flow_from_file(&path).expect("load");
        assert_eq!(graph.steps().len(), 1);
    }

    #[test]
    fn reports_parse_errors() {
        let directory = tempfile::tempdir().expect("tempdir");
        let path = directory.path().join("broken.yaml");
        std::fs::write(&path, "steps: {not: [a list").expect("write flow");

        let error = load_flow_from_file(&path).expect_err("must fail");
        assert!(matches!(error, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let error = load_flow_from_file("/nonexistent/flow.yaml").expect_err("must fail");
        assert!(matches!(error, ConfigError::Io(_)));
    }

    #[test]
    fn shipped_token_exchange_flow_validates() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../flows/token_exchange.yaml");
        let graph = load_flow_from_file(path).expect("shipped flow must validate");

        assert_eq!(graph.steps().len(), 10);
        assert_eq!(graph.dependencies_of("g"), ["a", "d", "f"]);
        assert!(graph.step("f").expect("step f").manual);
        assert!(graph.template("f").is_none());
        assert_eq!(graph.extraction_keys("a"), ["client_id", "client_secret"]);
        assert_eq!(graph.execution_order().len(), 10);
    }
}
