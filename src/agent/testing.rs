use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::tools::Tool;

use super::{AgentAdapter, AgentError, AgentMessage, MessageStream};

/// A deterministic stand-in for a real agent: issues a fixed sequence of
/// tool calls, then a closing text message.
pub(crate) struct ScriptedAgent {
    pub calls: Vec<(String, Value)>,
    pub final_text: Option<String>,
    pub runs: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(calls: Vec<(&str, Value)>) -> Self {
        Self {
            calls: calls
                .into_iter()
                .map(|(tool, input)| (tool.to_string(), input))
                .collect(),
            final_text: None,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_final_text(mut self, text: impl Into<String>) -> Self {
        self.final_text = Some(text.into());
        self
    }

    /// How many times the orchestrator actually invoked the agent.
    pub fn run_counter(&self) -> Arc<AtomicUsize> {
        self.runs.clone()
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    async fn run(
        &self,
        _prompt: String,
        tools: Vec<Arc<dyn Tool>>,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let calls = self.calls.clone();
        let final_text = self.final_text.clone();

        let stream = stream! {
            for (name, input) in calls {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(tool) = tools.iter().find(|tool| tool.name() == name) else {
                    yield Err(AgentError::OtherError(format!("scripted call to unknown tool {name}")));
                    return;
                };
                let observation = match tool.call(input.clone()).await {
                    Ok(result) => result,
                    Err(error) => format!("Tool call failed: {}", error),
                };
                yield Ok(AgentMessage(json!({
                    "role": "assistant",
                    "tool": name,
                    "observation": observation,
                })));
            }
            if let Some(text) = final_text {
                if !cancel.is_cancelled() {
                    yield Ok(AgentMessage(json!({ "role": "assistant", "content": text })));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
