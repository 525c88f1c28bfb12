//! Session driving loop.
//!
//! The driver repeatedly asks the graph for eligible steps and, for each
//! automatic one, renders and executes it, recording the outcome into the
//! session. Manual steps are surfaced to the caller instead of being run.
//! A call terminates when a full pass completes no further step: either the
//! flow is done, or the remaining steps wait on a manual completion or a
//! failed prerequisite — waiting is not an error state.
//!
//! There is no automatic retry: a step failed in an earlier call is
//! attempted again only because the caller chose to invoke the driver
//! again, which is the explicit re-trigger the flow author gets.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    error::InvariantError,
    executor::{StepRunner, execute},
    graph::FlowGraph,
    render::{Endpoints, render},
    session::{SessionState, StepResult, StepStatus},
};

/// What a driving pass accomplished and what it is now waiting for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Steps completed during this call, in execution order.
    pub completed: Vec<String>,
    /// Steps attempted during this call that failed (execution or
    /// rendering); the reason is on the step's recorded result.
    pub failed: Vec<String>,
    /// Eligible manual steps awaiting an external completion signal.
    pub awaiting_manual: Vec<String>,
}

impl DriveOutcome {
    /// True when the session can only progress through a manual completion.
    pub fn is_waiting_on_manual(&self) -> bool {
        !self.awaiting_manual.is_empty()
    }
}

/// Drives one session against a fixed graph, endpoint set, and runner.
pub struct SessionDriver<'a> {
    graph: &'a FlowGraph,
    endpoints: Endpoints,
    runner: &'a dyn StepRunner,
}

impl<'a> SessionDriver<'a> {
    pub fn new(graph: &'a FlowGraph, endpoints: Endpoints, runner: &'a dyn StepRunner) -> Self {
        Self { graph, endpoints, runner }
    }

    /// Runs eligible automatic steps until no further progress is possible.
    ///
    /// Each step is attempted at most once per call. Substitution failures
    /// mark the step failed exactly like execution failures, so every
    /// problem is attached to its step and visible to the next evaluation.
    pub async fn run_until_blocked(&self, state: &mut SessionState) -> Result<DriveOutcome, InvariantError> {
        let mut outcome = DriveOutcome::default();
        let mut attempted: HashSet<String> = HashSet::new();

        loop {
            let eligible_ids: Vec<String> = self
                .graph
                .eligible_steps(state)?
                .into_iter()
                .filter(|step| !step.manual)
                .map(|step| step.id.clone())
                .collect();

            let mut progressed = false;
            for step_id in eligible_ids {
                if !attempted.insert(step_id.clone()) {
                    continue;
                }

                match render(&step_id, self.graph, state, &self.endpoints) {
                    Ok(request) => {
                        let keys = self.graph.extraction_keys(&step_id);
                        let status = execute(&step_id, &request, keys, self.runner, state).await?;
                        match status {
                            StepStatus::Completed => {
                                info!(step = %step_id, "step completed");
                                outcome.completed.push(step_id);
                                progressed = true;
                            }
                            _ => outcome.failed.push(step_id),
                        }
                    }
                    Err(substitution_error) => {
                        warn!(step = %step_id, error = %substitution_error, "step could not be rendered");
                        state.record(&step_id, StepResult::failed(substitution_error.to_string(), None, Value::Null))?;
                        outcome.failed.push(step_id);
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        outcome.awaiting_manual = self
            .graph
            .eligible_steps(state)?
            .into_iter()
            .filter(|step| step.manual)
            .map(|step| step.id.clone())
            .collect();

        debug!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            awaiting_manual = outcome.awaiting_manual.len(),
            "driving pass finished"
        );
        Ok(outcome)
    }
}
