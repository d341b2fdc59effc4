use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::tools::Tool;

use super::AgentError;

/// An opaque blob of agent output. The orchestrator stores these in the
/// transcript for diagnostic reading; replay never consults them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage(pub Value);

impl AgentMessage {
    /// The message's text content, when it has any.
    pub fn text(&self) -> Option<&str> {
        self.0.get("content").and_then(Value::as_str)
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = Result<AgentMessage, AgentError>> + Send>>;

/// The seam to the external agent. An adapter drives whatever agent
/// runtime it likes; the contract is that every tool invocation the
/// agent makes reaches one of `tools` exactly once, in agent-issued
/// order, and that the stream winds down promptly once `cancel` fires.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    async fn run(
        &self,
        prompt: String,
        tools: Vec<Arc<dyn Tool>>,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError>;
}
