use thiserror::Error;

use async_openai::error::OpenAIError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    OpenAI(#[from] OpenAIError),

    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    #[error("Serde json error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Error: {0}")]
    OtherError(String),
}
