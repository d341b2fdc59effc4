use thiserror::Error;

use crate::schema::{format_issues, Issue};

/// Errors raised by the sandbox. These are returned to the agent as
/// retryable tool failures; they never surface to the caller directly.
#[derive(Error, Debug, Clone)]
pub enum EvalError {
    /// The evaluated code threw.
    #[error("{name}: {message}")]
    Runtime {
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// The `set_result` value failed schema validation.
    #[error("result failed validation: {}", format_issues(issues))]
    Validation { issues: Vec<Issue> },

    /// The caller-supplied validator rejected the value.
    #[error("result rejected: {0}")]
    Validator(String),

    /// The evaluated expression produced a promise that never settled.
    #[error("evaluated expression never settled")]
    DidNotSettle,

    /// The engine thread is gone or misbehaved. Infrastructure-level;
    /// unlike the others this one does surface to the caller.
    #[error("eval engine failure: {0}")]
    Engine(String),
}

impl EvalError {
    /// Message and stack the tool surface records in the transcript.
    pub fn to_recorded(&self) -> (String, Option<String>) {
        match self {
            EvalError::Runtime { stack, .. } => (self.to_string(), stack.clone()),
            other => (other.to_string(), None),
        }
    }
}
