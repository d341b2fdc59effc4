use std::sync::Arc;

use serde_json::{json, Value};

use crate::context::Context as TaskContext;
use crate::error::TaskError;
use crate::schema::Schema;

use super::engine::Engine;
use super::{Completion, ConsoleEntry, EvalError};

/// Caller-supplied result check, run after schema validation.
pub type ResultValidator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// What `eval` hands back to the agent: the serialized value plus any
/// captured console output.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutput {
    pub result: Value,
    pub console: Vec<ConsoleEntry>,
}

impl EvalOutput {
    /// The JSON the agent sees. `console` is omitted when nothing was
    /// printed.
    pub fn to_json(&self) -> Value {
        if self.console.is_empty() {
            json!({ "result": self.result })
        } else {
            json!({ "result": self.result, "console": self.console })
        }
    }
}

/// The per-request sandbox: executes agent code against the frozen
/// `context` and the mutable `vars`, owns the completion promise.
pub struct Evaluator {
    engine: Engine,
    schema: Option<Schema>,
    validator: Option<ResultValidator>,
    completion: Arc<Completion>,
}

impl Evaluator {
    pub fn new(
        context: &TaskContext,
        schema: Option<Schema>,
        validator: Option<ResultValidator>,
    ) -> Result<Self, EvalError> {
        Ok(Self {
            engine: Engine::start(context)?,
            schema,
            validator,
            completion: Arc::new(Completion::new()),
        })
    }

    /// Execute `(<code>)()`, await it, serialize the value. A throw from
    /// the code comes back as `EvalError::Runtime`; the tool surface is
    /// the one that records it.
    pub async fn eval(&self, code: &str) -> Result<EvalOutput, EvalError> {
        let envelope = self.engine.eval_expression(code).await?;
        match envelope.err {
            Some(error) => Err(EvalError::Runtime {
                name: error.name,
                message: error.message,
                stack: error.stack,
            }),
            None => Ok(EvalOutput {
                result: envelope.ok.unwrap_or(Value::Null),
                console: envelope.console,
            }),
        }
    }

    /// Execute the final expression and validate the value. Success
    /// resolves the completion promise; a failing call leaves it
    /// unsettled so the agent can try again.
    pub async fn set_result(&self, code: &str) -> Result<Value, EvalError> {
        let output = self.eval(code).await?;
        let value = output.result;

        if let Some(schema) = &self.schema {
            schema
                .validate(&value)
                .map_err(|issues| EvalError::Validation { issues })?;
        }
        if let Some(validator) = &self.validator {
            validator(&value).map_err(EvalError::Validator)?;
        }

        // No-op when the promise already settled (e.g. after a bail).
        self.completion.resolve(value.clone());
        Ok(value)
    }

    /// Reject the completion promise on the agent's behalf.
    pub fn set_bail_error(&self, message: &str) {
        self.completion.reject(TaskError::Bail(message.to_string()));
    }

    /// Await the completion promise: the validated result of the first
    /// successful `set_result`, or the failure that settled the request.
    /// Observable exactly once; a second await reports the request as
    /// ended.
    pub async fn await_completion(&self) -> Result<Value, TaskError> {
        match self.completion.take_receiver() {
            Some(rx) => rx.await.unwrap_or(Err(TaskError::AgentExit)),
            None => Err(TaskError::AgentExit),
        }
    }

    pub(crate) fn completion(&self) -> Arc<Completion> {
        self.completion.clone()
    }
}
