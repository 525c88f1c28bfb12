//! Strongly typed schema definitions shared across the tokex loader, engine, and CLI.
//!
//! The models defined here mirror the declarative flow document format: an
//! ordered list of steps, a dependency mapping, per-step request templates,
//! substitution rules, and endpoint defaults. Authoring order is preserved
//! (via `IndexMap`) so the walkthrough renders steps in a predictable
//! sequence.

pub mod discovery;
pub mod flow;
pub mod reference;

pub use discovery::DiscoveryDocument;
pub use flow::{FlowDocument, StepDefinition};
pub use reference::StepReference;
