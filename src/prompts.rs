use indoc::indoc;
use serde_json::Value;

use crate::context::ContextDescriptor;

fn render_context(context: &[ContextDescriptor]) -> String {
    if context.is_empty() {
        return "(none)".into();
    }
    context
        .iter()
        .map(|descriptor| match &descriptor.description {
            Some(description) => format!(
                "- {} ({}): {}",
                descriptor.name, descriptor.type_tag, description
            ),
            None => format!("- {} ({})", descriptor.name, descriptor.type_tag),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn implement_prompt(
    instruction: &str,
    schema: &Value,
    context: &[ContextDescriptor],
) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());

    format!(
        indoc! {r#"
        You are implementing a task by executing code against live variables.

        <TASK>
        {instruction}
        </TASK>

        The result MUST be a value matching this JSON schema:
        {schema}

        These variables are available on the `context` object:
        {context}

        <INSTRUCTIONS>
        - Use the `eval` tool to explore `context` before committing to anything
        - Every code argument MUST be an expression of the form `async () => {{ ... }}`; it is invoked and awaited
        - `context` is read-only; assign into `vars` to carry state between calls
        - When you can produce the result, call `set_result` with an expression returning it
        - If `set_result` reports a validation failure, revise the code and call it again
        - If the task cannot be completed with the available context, call `bail` and explain why
        </INSTRUCTIONS>
        "#},
        instruction = instruction,
        schema = schema,
        context = render_context(context),
    )
}

pub fn investigate_prompt(context: &[ContextDescriptor]) -> String {
    format!(
        indoc! {r#"
        You are investigating a failure. Diagnose what went wrong using the
        live variables below and report your conclusion as plain text.

        These variables are available on the `context` object:
        {context}

        <INSTRUCTIONS>
        - Use the `eval` tool to inspect `context`; every code argument MUST be an expression of the form `async () => {{ ... }}`
        - Assign into `vars` to carry state between calls
        - When you are confident in the diagnosis, reply with your findings instead of calling a tool
        </INSTRUCTIONS>
        "#},
        context = render_context(context),
    )
}
