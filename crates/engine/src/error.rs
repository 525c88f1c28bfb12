//! Engine error taxonomy.
//!
//! Four families, matching how failures surface to callers:
//!
//! - [`ConfigError`] is fatal at load time; no partial graph is served.
//! - [`SubstitutionError`] is per-step and recoverable: the step is marked
//!   failed, dependents stay blocked, and re-rendering after upstream state
//!   changes is allowed.
//! - [`StepFailure`] covers transport and HTTP-level execution failures.
//! - [`InvariantError`] signals engine-internal state corruption and is
//!   fatal to the session.

use thiserror::Error;

/// Fatal configuration errors raised while loading a flow document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read flow document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse flow document: {0}")]
    Parse(String),

    #[error("duplicate step identifier '{id}'")]
    DuplicateStep { id: String },

    #[error("'{section}' references unknown step '{id}'")]
    UnknownStepReference { section: String, id: String },

    #[error("step '{id}' cannot depend on itself")]
    SelfDependency { id: String },

    #[error("cycle detected in step dependencies involving: {}", steps.join(", "))]
    CyclicDependency { steps: Vec<String> },

    #[error("automatic step '{id}' has no request template")]
    MissingTemplate { id: String },

    #[error("substitution rule for step '{id}' has malformed reference '{reference}'")]
    MalformedReference { id: String, reference: String },
}

/// Per-step rendering errors. Rendering is pure, so these carry everything
/// the caller needs to explain the failure.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SubstitutionError {
    #[error("no endpoint available for '{{{token}}}'")]
    UnresolvedEndpoint { token: String },

    #[error("value for '{placeholder}' is not available yet (from {reference})")]
    MissingUpstreamValue { placeholder: String, reference: String },

    #[error("template still contains unresolved token '{token}'")]
    UnboundPlaceholder { token: String },

    #[error("request template could not be parsed: {reason}")]
    MalformedTemplate { reason: String },
}

/// Execution failures surfaced by a step runner.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum StepFailure {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("HTTP {status}")]
    Http { status: u16 },
}

/// Violations of the engine's own state invariants. These should never
/// occur under correct driving logic; when they do, the session is treated
/// as corrupt rather than silently repaired.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum InvariantError {
    #[error("step '{id}' already has a recorded result")]
    DuplicateResult { id: String },

    #[error("step '{id}' is completed but its dependency '{dependency}' is not")]
    InconsistentCompletion { id: String, dependency: String },

    #[error("step '{id}' is not a manual step")]
    NotManual { id: String },

    #[error("unknown step '{id}'")]
    UnknownStep { id: String },
}
