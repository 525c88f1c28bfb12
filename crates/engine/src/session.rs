//! Per-session execution state.
//!
//! A [`SessionState`] holds the results of every step attempted so far in
//! one walkthrough session. It is exclusively owned by that session and is
//! mutated from exactly two places: the executor (after an HTTP attempt)
//! and the manual-completion handler. Completed results are written once;
//! re-running a step requires an explicit reset, which cascades to every
//! transitive dependent so stale substituted values cannot linger.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokex_types::StepDefinition;

use crate::error::InvariantError;

/// Lifecycle status of a step within a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// No attempt recorded yet.
    Pending,
    /// An attempt is in flight. Only observable to drivers that execute
    /// steps concurrently; the sequential driver never stores it.
    Running,
    /// The step finished and its outputs are available to dependents.
    Completed,
    /// The step was attempted and failed; dependents stay blocked.
    Failed,
}

/// Outcome of one step attempt, including the extracted output fields used
/// by downstream substitution rules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// Final status of the attempt.
    pub status: StepStatus,
    /// HTTP status code, when the request reached the server.
    pub http_status: Option<u16>,
    /// Raw response body. Non-JSON bodies are wrapped as
    /// `{"response": <text>}`.
    pub body: Value,
    /// Named values extracted from the response per the step's declared
    /// extraction keys, or supplied by the user for manual steps.
    pub fields: IndexMap<String, Value>,
    /// Failure reason, present only when `status` is `Failed`.
    pub error: Option<String>,
}

impl StepResult {
    /// Successful result with extracted fields.
    pub fn completed(http_status: u16, body: Value, fields: IndexMap<String, Value>) -> Self {
        Self {
            status: StepStatus::Completed,
            http_status: Some(http_status),
            body,
            fields,
            error: None,
        }
    }

    /// Failed result carrying the reason and whatever response was seen.
    pub fn failed(error: impl Into<String>, http_status: Option<u16>, body: Value) -> Self {
        Self {
            status: StepStatus::Failed,
            http_status,
            body,
            fields: IndexMap::new(),
            error: Some(error.into()),
        }
    }

    /// Synthetic completed result injected for a manual step.
    pub fn manual(fields: IndexMap<String, Value>) -> Self {
        Self {
            status: StepStatus::Completed,
            http_status: None,
            body: Value::Null,
            fields,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// Mutable state for one walkthrough session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    results: IndexMap<String, StepResult>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded result for a step, if any.
    pub fn result(&self, step_id: &str) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    /// Returns the current status of a step (`Pending` when unattempted).
    pub fn status_of(&self, step_id: &str) -> StepStatus {
        self.results.get(step_id).map(|result| result.status).unwrap_or(StepStatus::Pending)
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.results.get(step_id).map(StepResult::is_completed).unwrap_or(false)
    }

    /// Iterates over all recorded results in insertion order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &StepResult)> {
        self.results.iter().map(|(id, result)| (id.as_str(), result))
    }

    /// Records a step result. Completed results are write-once: recording
    /// over an existing completed result is an invariant violation. Failed
    /// results may be replaced so the caller can re-trigger a failed step.
    pub fn record(&mut self, step_id: &str, result: StepResult) -> Result<(), InvariantError> {
        if let Some(existing) = self.results.get(step_id)
            && existing.is_completed()
        {
            return Err(InvariantError::DuplicateResult { id: step_id.to_string() });
        }
        self.results.insert(step_id.to_string(), result);
        Ok(())
    }

    /// Injects a synthetic completed result for a manual step. The supplied
    /// fields become available to downstream substitution rules.
    pub fn complete_manual(&mut self, step: &StepDefinition, fields: IndexMap<String, Value>) -> Result<(), InvariantError> {
        if !step.manual {
            return Err(InvariantError::NotManual { id: step.id.clone() });
        }
        self.record(&step.id, StepResult::manual(fields))
    }

    /// Clears the results of the given steps. Used by the cascade reset:
    /// the caller passes a step plus its transitive dependents.
    pub fn clear_steps<'a>(&mut self, step_ids: impl IntoIterator<Item = &'a str>) {
        for step_id in step_ids {
            self.results.shift_remove(step_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manual_step(id: &str) -> StepDefinition {
        StepDefinition {
            id: id.into(),
            title: format!("Step {id}"),
            description: String::new(),
            manual: true,
        }
    }

    #[test]
    fn records_and_reads_results() {
        let mut state = SessionState::new();
        assert_eq!(state.status_of("a"), StepStatus::Pending);

        let mut fields = IndexMap::new();
        fields.insert("client_id".to_string(), json!("C1"));
        state
            .record("a", StepResult::completed(201, json!({"client_id": "C1"}), fields))
            .expect("record");

        assert!(state.is_completed("a"));
        assert_eq!(state.result("a").unwrap().fields["client_id"], json!("C1"));
    }

    #[test]
    fn completed_results_are_write_once() {
        let mut state = SessionState::new();
        state
            .record("a", StepResult::completed(200, Value::Null, IndexMap::new()))
            .expect("first write");

        let error = state
            .record("a", StepResult::completed(200, Value::Null, IndexMap::new()))
            .expect_err("second write must fail");
        assert_eq!(error, InvariantError::DuplicateResult { id: "a".into() });
    }

    #[test]
    fn failed_results_may_be_replaced() {
        let mut state = SessionState::new();
        state
            .record("a", StepResult::failed("HTTP 500", Some(500), Value::Null))
            .expect("record failure");
        assert_eq!(state.status_of("a"), StepStatus::Failed);

        state
            .record("a", StepResult::completed(200, Value::Null, IndexMap::new()))
            .expect("retry after failure");
        assert!(state.is_completed("a"));
    }

    #[test]
    fn manual_completion_requires_manual_step() {
        let mut state = SessionState::new();
        let mut automatic = manual_step("x");
        automatic.manual = false;

        let error = state.complete_manual(&automatic, IndexMap::new()).expect_err("must reject");
        assert_eq!(error, InvariantError::NotManual { id: "x".into() });

        state.complete_manual(&manual_step("f"), IndexMap::new()).expect("manual ok");
        assert!(state.is_completed("f"));
    }

    #[test]
    fn clear_steps_removes_results() {
        let mut state = SessionState::new();
        state
            .record("a", StepResult::completed(200, Value::Null, IndexMap::new()))
            .expect("record a");
        state
            .record("b", StepResult::completed(200, Value::Null, IndexMap::new()))
            .expect("record b");

        state.clear_steps(["a"]);
        assert_eq!(state.status_of("a"), StepStatus::Pending);
        assert!(state.is_completed("b"));
    }
}
