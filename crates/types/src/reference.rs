//! Step output references.
//!
//! Substitution rules point at upstream values with strings of the form
//! `step.<source_id>.<field>`. The field part may itself contain dots to
//! navigate nested JSON (for example `step.d.token.access_token`).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Parsed form of a `step.<source_id>.<field>` reference string.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct StepReference {
    /// Identifier of the step that produces the value.
    pub step_id: String,
    /// Dotted path into the producing step's extracted fields.
    pub field_path: String,
}

impl StepReference {
    /// Parses a reference string, returning `None` when it does not match
    /// the `step.<source_id>.<field>` shape.
    ///
    /// The step identifier accepts ASCII alphanumerics plus `_` and `-`;
    /// the field path must be non-empty and may contain further dots.
    pub fn parse(raw: &str) -> Option<Self> {
        let remainder = raw.trim().strip_prefix("step.")?;
        let (step_id, field_path) = remainder.split_once('.')?;

        if step_id.is_empty() || field_path.is_empty() {
            return None;
        }
        let valid_id = step_id
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-');
        if !valid_id {
            return None;
        }

        Some(Self {
            step_id: step_id.to_string(),
            field_path: field_path.to_string(),
        })
    }
}

impl fmt::Display for StepReference {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "step.{}.{}", self.step_id, self.field_path)
    }
}
