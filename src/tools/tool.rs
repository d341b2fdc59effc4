use std::error::Error;

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType, FunctionObjectArgs,
};
use async_trait::async_trait;
use indoc::indoc;
use serde_json::Value;

use crate::schema::{ObjectField, SchemaField, StringField};

#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the name of the tool.
    fn name(&self) -> String;

    /// Provides a description of what the tool does and when to use it.
    fn description(&self) -> String;

    /// Parameter declaration, reusing the schema field descriptors.
    ///
    /// If not implemented, it will default to a single required `input`
    /// string.
    fn parameters(&self) -> ObjectField {
        ObjectField::new(
            "input",
            [StringField::new("input")
                .description("The input for the tool")
                .into()],
        )
        .additional_properties(false)
    }

    /// Executes the tool. `Err` is returned to the agent flagged as an
    /// error so it can retry; `Ok` is the tool's textual output.
    async fn call(&self, input: Value) -> Result<String, Box<dyn Error + Send + Sync>>;

    fn to_plain_description(&self) -> String {
        format!(
            indoc! {"
            > {}: {}
            The input for this tool MUST be in the following format:
            {}"},
            self.name(),
            self.description(),
            self.parameters().properties_description()
        )
    }

    fn try_into_openai_tool(&self) -> Result<ChatCompletionTool, OpenAIError> {
        let function = FunctionObjectArgs::default()
            .name(self.name().replace(" ", "_"))
            .description(self.description())
            .parameters(self.parameters().to_json_schema())
            .build()?;

        ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(function)
            .build()
    }
}
