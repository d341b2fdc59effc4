use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::eval::Evaluator;
use crate::schema::{ObjectField, StringField};
use crate::transcript::{Recorder, ToolCallRecord, ToolOutcome};

use super::Tool;

/// Invoked after every tool call, before the result goes back to the
/// agent. The transcript recorder is the bundled implementation.
#[async_trait]
pub trait ToolCallObserver: Send + Sync {
    async fn on_tool_call(&self, tool: &str, code: &str, outcome: &ToolOutcome);
}

#[async_trait]
impl ToolCallObserver for Recorder {
    async fn on_tool_call(&self, tool: &str, code: &str, outcome: &ToolOutcome) {
        self.record_call(ToolCallRecord {
            tool: tool.to_string(),
            code: code.to_string(),
            result: outcome.clone(),
        })
        .await;
    }
}

/// The tool set for an `implement` run.
pub fn task_tools(
    evaluator: Arc<Evaluator>,
    observer: Arc<dyn ToolCallObserver>,
) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(EvalTool {
            evaluator: evaluator.clone(),
            observer: observer.clone(),
        }),
        Arc::new(SetResultTool {
            evaluator: evaluator.clone(),
            observer: observer.clone(),
        }),
        Arc::new(BailTool {
            evaluator,
            observer,
        }),
    ]
}

/// The tool set for an `investigate` run: exploration only.
pub fn investigate_tools(
    evaluator: Arc<Evaluator>,
    observer: Arc<dyn ToolCallObserver>,
) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(EvalTool {
        evaluator,
        observer,
    })]
}

fn string_param(input: &Value, field: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    match input {
        Value::String(text) => Ok(text.clone()),
        Value::Object(map) => map
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| format!("missing `{}` parameter", field).into()),
        _ => Err(format!("missing `{}` parameter", field).into()),
    }
}

fn code_parameters(description: &str) -> ObjectField {
    ObjectField::new(
        "input",
        [StringField::new("code").description(description).into()],
    )
    .additional_properties(false)
}

pub struct EvalTool {
    evaluator: Arc<Evaluator>,
    observer: Arc<dyn ToolCallObserver>,
}

#[async_trait]
impl Tool for EvalTool {
    fn name(&self) -> String {
        "eval".into()
    }

    fn description(&self) -> String {
        "Execute a code expression against `context` and `vars` and return its value. \
         Use it to explore the context before committing a result. \
         Assign into `vars` to keep state for later calls."
            .into()
    }

    fn parameters(&self) -> ObjectField {
        code_parameters(
            "An expression of the form `async () => { ... }`; it is invoked and awaited",
        )
    }

    async fn call(&self, input: Value) -> Result<String, Box<dyn Error + Send + Sync>> {
        let code = string_param(&input, "code")?;
        match self.evaluator.eval(&code).await {
            Ok(output) => {
                let value = output.to_json();
                self.observer
                    .on_tool_call("eval", &code, &ToolOutcome::ok(value.clone()))
                    .await;
                Ok(value.to_string())
            }
            Err(error) => {
                let (message, stack) = error.to_recorded();
                self.observer
                    .on_tool_call("eval", &code, &ToolOutcome::err(message.clone(), stack))
                    .await;
                Err(message.into())
            }
        }
    }
}

pub struct SetResultTool {
    evaluator: Arc<Evaluator>,
    observer: Arc<dyn ToolCallObserver>,
}

#[async_trait]
impl Tool for SetResultTool {
    fn name(&self) -> String {
        "set_result".into()
    }

    fn description(&self) -> String {
        "Commit the final expression that produces the task result. \
         The value is validated against the result schema; on a validation \
         failure you may call set_result again with revised code."
            .into()
    }

    fn parameters(&self) -> ObjectField {
        code_parameters(
            "An expression of the form `async () => { ... }` returning the final result value",
        )
    }

    async fn call(&self, input: Value) -> Result<String, Box<dyn Error + Send + Sync>> {
        let code = string_param(&input, "code")?;
        match self.evaluator.set_result(&code).await {
            Ok(value) => {
                self.observer
                    .on_tool_call("set_result", &code, &ToolOutcome::ok(value))
                    .await;
                Ok("Result computed".into())
            }
            Err(error) => {
                let (message, stack) = error.to_recorded();
                self.observer
                    .on_tool_call("set_result", &code, &ToolOutcome::err(message.clone(), stack))
                    .await;
                Err(message.into())
            }
        }
    }
}

pub struct BailTool {
    evaluator: Arc<Evaluator>,
    observer: Arc<dyn ToolCallObserver>,
}

#[async_trait]
impl Tool for BailTool {
    fn name(&self) -> String {
        "bail".into()
    }

    fn description(&self) -> String {
        "Give up on the task. Only use this when the task cannot be \
         completed with the available context; explain why."
            .into()
    }

    fn parameters(&self) -> ObjectField {
        ObjectField::new(
            "input",
            [StringField::new("message")
                .description("Why the task cannot be completed")
                .into()],
        )
        .additional_properties(false)
    }

    async fn call(&self, input: Value) -> Result<String, Box<dyn Error + Send + Sync>> {
        let message = string_param(&input, "message")?;
        self.evaluator.set_bail_error(&message);
        self.observer
            .on_tool_call("bail", &message, &ToolOutcome::ok(Value::Null))
            .await;
        Err(format!("Implementation failed: {}", message).into())
    }
}
