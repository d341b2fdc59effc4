use thiserror::Error;

use crate::{agent::AgentError, eval::EvalError};

/// Failures surfaced to the caller of [`implement`](crate::implement) or
/// [`investigate`](crate::investigate).
///
/// Sandbox and validation errors never appear here; those are returned to
/// the agent so it can retry.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Agent could not complete the task: {0}")]
    Bail(String),

    #[error("agent exited without completing the task")]
    AgentExit,

    #[error("task cancelled")]
    Cancelled,

    #[error("no cached transcript found for this task and the cache mode requires one")]
    CacheRequired,

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
}
