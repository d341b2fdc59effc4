use std::sync::Arc;

use async_openai::config::{Config, OpenAIConfig};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_stream::stream;
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::tools::Tool;

use super::{AgentAdapter, AgentError, AgentMessage, MessageStream};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// The bundled agent: an OpenAI-compatible chat-completions tool loop.
/// Each round sends the conversation with the tool declarations,
/// executes whatever tool calls come back, and feeds the observations
/// into the next round. The loop ends when the model stops calling
/// tools, the iteration cap is hit, tool calls keep failing
/// back-to-back, or the orchestrator cancels.
#[derive(Clone)]
pub struct OpenAiAgent<C: Config + Clone = OpenAIConfig> {
    client: Client<C>,
    model: String,
    max_iterations: usize,
    max_consecutive_fails: usize,
}

impl<C: Config + Clone> OpenAiAgent<C> {
    pub fn new<S>(client: Client<C>, model: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            client,
            model: model.into(),
            max_iterations: 10,
            max_consecutive_fails: 3,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_consecutive_fails(mut self, max_consecutive_fails: usize) -> Self {
        self.max_consecutive_fails = max_consecutive_fails;
        self
    }
}

impl Default for OpenAiAgent<OpenAIConfig> {
    fn default() -> Self {
        Self::new(Client::default(), DEFAULT_MODEL)
    }
}

fn message_blob(content: &Option<String>, tool_calls: &Option<Vec<ChatCompletionMessageToolCall>>) -> Value {
    json!({
        "role": "assistant",
        "content": content,
        "tool_calls": tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "name": call.function.name,
                        "arguments": call.function.arguments,
                    })
                })
                .collect::<Vec<_>>()
        }),
    })
}

#[async_trait]
impl<C: Config + Clone + Send + Sync + 'static> AgentAdapter for OpenAiAgent<C> {
    async fn run(
        &self,
        prompt: String,
        tools: Vec<Arc<dyn Tool>>,
        cancel: CancellationToken,
    ) -> Result<MessageStream, AgentError> {
        let client = self.client.clone();
        let model = self.model.clone();
        let max_iterations = self.max_iterations;
        let max_consecutive_fails = self.max_consecutive_fails;
        let tool_declarations = tools
            .iter()
            .map(|tool| tool.try_into_openai_tool())
            .collect::<Result<Vec<ChatCompletionTool>, _>>()?;

        let stream = stream! {
            let user_message = match ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
            {
                Ok(message) => message,
                Err(error) => {
                    yield Err(AgentError::OpenAI(error));
                    return;
                }
            };
            let mut messages: Vec<ChatCompletionRequestMessage> = vec![user_message.into()];
            let mut consecutive_fails: usize = 0;

            for iteration in 0..max_iterations {
                if cancel.is_cancelled() {
                    break;
                }

                let request = match CreateChatCompletionRequestArgs::default()
                    .model(&model)
                    .messages(messages.clone())
                    .tools(tool_declarations.clone())
                    .build()
                {
                    Ok(request) => request,
                    Err(error) => {
                        yield Err(AgentError::OpenAI(error));
                        return;
                    }
                };

                let chat = client.chat();
                let response = tokio::select! {
                    _ = cancel.cancelled() => break,
                    response = chat.create(request) => match response {
                        Ok(response) => response,
                        Err(error) => {
                            yield Err(AgentError::OpenAI(error));
                            return;
                        }
                    },
                };

                let Some(choice) = response.choices.into_iter().next() else {
                    yield Err(AgentError::InvalidResponse("response carried no choices".into()));
                    return;
                };
                let assistant = choice.message;

                yield Ok(AgentMessage(message_blob(&assistant.content, &assistant.tool_calls)));

                let Some(tool_calls) = assistant.tool_calls else {
                    // No tool use: the model considers itself done.
                    break;
                };

                let assistant_message = match ChatCompletionRequestAssistantMessageArgs::default()
                    .content(assistant.content.unwrap_or_default())
                    .tool_calls(tool_calls.clone())
                    .build()
                {
                    Ok(message) => message,
                    Err(error) => {
                        yield Err(AgentError::OpenAI(error));
                        return;
                    }
                };
                messages.push(assistant_message.into());

                for tool_call in tool_calls {
                    let tool_name = tool_call.function.name.to_lowercase().replace(" ", "_");

                    let observation = match tools.iter().find(|tool| tool.name() == tool_name) {
                        None => {
                            consecutive_fails += 1;
                            log::warn!(
                                "agent tried to use nonexistent tool {} ({} consecutive fails)",
                                tool_name,
                                consecutive_fails
                            );
                            format!("Unknown tool: {}", tool_name)
                        }
                        Some(tool) => {
                            let arguments: Value =
                                serde_json::from_str(&tool_call.function.arguments)
                                    .unwrap_or(Value::String(tool_call.function.arguments.clone()));

                            match tool.call(arguments).await {
                                Ok(result) => {
                                    consecutive_fails = 0;
                                    result
                                }
                                Err(error) => {
                                    consecutive_fails += 1;
                                    log::warn!(
                                        "Tool '{}' encountered an error: {} ({} consecutive fails)",
                                        tool_name,
                                        error,
                                        consecutive_fails
                                    );
                                    format!("Tool call failed: {}", error)
                                }
                            }
                        }
                    };

                    log::debug!("Tool {} result:\n{}", tool_name, observation);

                    let tool_message = match ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(tool_call.id.clone())
                        .content(observation)
                        .build()
                    {
                        Ok(message) => message,
                        Err(error) => {
                            yield Err(AgentError::OpenAI(error));
                            return;
                        }
                    };
                    messages.push(tool_message.into());

                    if consecutive_fails >= max_consecutive_fails {
                        log::error!(
                            "Too many consecutive fails ({} in a row), aborting",
                            consecutive_fails
                        );
                        yield Err(AgentError::OtherError("Too many consecutive fails".into()));
                        return;
                    }
                }

                if iteration + 1 == max_iterations {
                    log::warn!("agent hit the iteration cap ({})", max_iterations);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
