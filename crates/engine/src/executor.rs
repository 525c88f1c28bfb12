//! Step execution.
//!
//! `StepRunner` abstracts how a rendered request is carried out so tests
//! and previews can run without a network. The real implementation issues
//! the HTTP call through reqwest with a bounded timeout. [`execute`] wraps
//! a runner: it classifies the outcome, extracts the step's declared output
//! fields, and writes the [`StepResult`] into the session state — the sole
//! mutation point for automatic step completion.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{
    error::{InvariantError, StepFailure},
    request::{RenderedRequest, RequestBody},
    session::{SessionState, StepResult, StepStatus},
};

/// Response seen by the executor: the HTTP status and the parsed body.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

/// Carries out a rendered request.
///
/// Implementations return `Ok` for any response the server produced
/// (including error statuses — the executor classifies those) and
/// `Err(StepFailure::Transport)` when no response was obtained at all.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(&self, request: &RenderedRequest) -> Result<HttpResponse, StepFailure>;
}

/// Runner that issues real HTTP requests with a bounded timeout.
pub struct HttpStepRunner {
    http: reqwest::Client,
}

impl HttpStepRunner {
    /// Default request timeout when the configuration supplies none.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build().context("build http client")?;
        Ok(Self { http })
    }
}

#[async_trait]
impl StepRunner for HttpStepRunner {
    async fn run(&self, request: &RenderedRequest) -> Result<HttpResponse, StepFailure> {
        let method =
            Method::from_str(&request.method).map_err(|_| StepFailure::Transport(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        match &request.body {
            Some(RequestBody::Json(value)) => builder = builder.json(value),
            Some(RequestBody::Form(payload)) => {
                if request.header("content-type").is_none() {
                    builder = builder.header("Content-Type", "application/x-www-form-urlencoded");
                }
                builder = builder.body(payload.clone());
            }
            Some(RequestBody::Text(payload)) => builder = builder.body(payload.clone()),
            None => {}
        }

        let response = builder.send().await.map_err(|error| StepFailure::Transport(error.to_string()))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|error| StepFailure::Transport(error.to_string()))?;
        // Non-JSON bodies are kept, wrapped, so the caller still sees them.
        let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| json!({ "response": text }));

        Ok(HttpResponse { status, body })
    }
}

/// Runner backed by canned responses keyed by request URL. Useful for
/// tests and previews; unknown URLs answer 404 so failure paths stay
/// exercised deterministically.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, HttpResponse>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the response returned for requests to `url`.
    pub fn respond(mut self, url: impl Into<String>, status: u16, body: Value) -> Self {
        self.responses.insert(url.into(), HttpResponse { status, body });
        self
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn run(&self, request: &RenderedRequest) -> Result<HttpResponse, StepFailure> {
        Ok(self.responses.get(&request.url).cloned().unwrap_or(HttpResponse {
            status: 404,
            body: json!({ "error": "no scripted response" }),
        }))
    }
}

/// Executes a rendered request and records the outcome under `step_id`.
///
/// Non-2xx statuses and transport failures mark the step failed with the
/// reason attached; there is no automatic retry. On success the step's
/// declared extraction keys are pulled from the response body — an absent
/// key is non-fatal and merely leaves the field unset, so any downstream
/// rule depending on it fails cleanly at render time.
pub async fn execute(
    step_id: &str,
    request: &RenderedRequest,
    extraction_keys: &[String],
    runner: &dyn StepRunner,
    state: &mut SessionState,
) -> Result<StepStatus, InvariantError> {
    debug!(step = step_id, method = %request.method, url = %request.url, "executing step");

    let result = match runner.run(request).await {
        Err(failure) => {
            warn!(step = step_id, %failure, "step execution failed");
            StepResult::failed(failure.to_string(), None, Value::Null)
        }
        Ok(response) if !(200..300).contains(&response.status) => {
            let failure = StepFailure::Http { status: response.status };
            warn!(step = step_id, status = response.status, "step returned error status");
            StepResult::failed(failure.to_string(), Some(response.status), response.body)
        }
        Ok(response) => {
            let fields = extract_fields(step_id, &response.body, extraction_keys);
            debug!(step = step_id, status = response.status, extracted = fields.len(), "step completed");
            StepResult::completed(response.status, response.body, fields)
        }
    };

    let status = result.status;
    state.record(step_id, result)?;
    Ok(status)
}

/// Pulls the declared keys out of the response body. Dotted keys navigate
/// nested objects and array indices.
fn extract_fields(step_id: &str, body: &Value, extraction_keys: &[String]) -> IndexMap<String, Value> {
    let mut fields = IndexMap::new();
    for key in extraction_keys {
        match select_path(body, key) {
            Some(value) => {
                fields.insert(key.clone(), value);
            }
            None => {
                warn!(step = step_id, field = %key, "declared extraction key absent from response");
            }
        }
    }
    fields
}

fn select_path(body: &Value, path: &str) -> Option<Value> {
    let mut current = body;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        return None;
    }
    Some(current.clone())
}
