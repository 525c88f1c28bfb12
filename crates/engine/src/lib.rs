//! # Tokex Engine
//!
//! Execution engine for templated HTTP step graphs: a flow document
//! declares steps, dependency edges, curl-style request templates, and
//! substitution rules; the engine validates the graph, computes which
//! steps are eligible against per-session state, renders templates by
//! substituting endpoint and upstream-value tokens, executes the rendered
//! requests, and propagates extracted response fields to dependent steps.
//!
//! ## Architecture
//!
//! - **`config`**: document loading and format detection
//! - **`graph`**: validated DAG, eligibility, cascade invalidation
//! - **`render`**: pure template substitution
//! - **`request`**: curl-style template parsing
//! - **`executor`**: step runners and result recording
//! - **`session`**: per-session state with a write-once contract
//! - **`driver`**: the run-until-blocked scheduling loop
//!
//! The engine never assumes successful OAuth semantics; it is populated
//! with OAuth2 steps but executes any graph of templated HTTP calls.

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod graph;
pub mod render;
pub mod request;
pub mod session;

pub use config::load_flow_from_file;
pub use driver::{DriveOutcome, SessionDriver};
pub use error::{ConfigError, InvariantError, StepFailure, SubstitutionError};
pub use executor::{HttpResponse, HttpStepRunner, ScriptedRunner, StepRunner, execute};
pub use graph::{FlowGraph, SubstitutionRule};
pub use render::{Endpoints, render};
pub use request::{RenderedRequest, RequestBody, parse_curl_command};
pub use session::{SessionState, StepResult, StepStatus};
