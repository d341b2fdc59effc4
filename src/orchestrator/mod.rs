mod options;
pub use options::*;

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{AgentAdapter, AgentMessage, MessageStream, OpenAiAgent};
use crate::cache::{cache_key, CacheMode, Store};
use crate::context::{describe_context, Context as TaskContext};
use crate::error::TaskError;
use crate::eval::{Evaluator, ResultValidator};
use crate::prompts;
use crate::replay;
use crate::schema::Schema;
use crate::tools::{investigate_tools, task_tools};
use crate::trace;
use crate::transcript::{Recorder, TaskRecord};

/// Drive an agent to produce a value of the given shape from the live
/// context, replaying a cached transcript instead whenever one exists
/// for the same `(instruction, schema)` pair.
pub async fn implement(
    instruction: &str,
    context: &TaskContext,
    schema: Schema,
    options: ImplementOptions,
) -> Result<Value, TaskError> {
    let request_id = Uuid::new_v4();
    let descriptors = describe_context(context);
    let key = cache_key(instruction, &schema.canonical_json());
    let store = match &options.cache_dir {
        Some(dir) => Store::new(dir.clone()),
        None => Store::from_env(),
    };
    let mode = if options.force_use_cache {
        CacheMode::ForceUse
    } else {
        CacheMode::from_env()
    };
    trace::trace(format!(
        "implement {}: key={} mode={:?}",
        request_id, key, mode
    ));

    if mode != CacheMode::Ignore {
        match store.lookup(&key).await {
            Some(transcript) => {
                let evaluator =
                    Evaluator::new(context, Some(schema.clone()), options.validator.clone())?;
                match replay::replay(&transcript, &evaluator).await {
                    Ok(value) => {
                        log::debug!("request {} served from cache", request_id);
                        trace::trace(format!("implement {}: replayed", request_id));
                        return Ok(value);
                    }
                    Err(error) => {
                        // Silent fallback: the caller never sees this.
                        log::debug!(
                            "request {} replay failed, going live: {}",
                            request_id,
                            error
                        );
                        trace::trace(format!("implement {}: {}", request_id, error));
                    }
                }
            }
            None if mode == CacheMode::ForceUse => {
                trace::trace(format!("implement {}: cache required but missing", request_id));
                return Err(TaskError::CacheRequired);
            }
            None => {}
        }
    }

    let schema_value = schema.to_json_schema();
    let prompt = prompts::implement_prompt(instruction, &schema_value, &descriptors);
    let task = TaskRecord {
        prompt: prompt.clone(),
        schema: schema_value,
        context: descriptors,
    };

    let outcome = run_live(
        context,
        schema,
        options.validator.clone(),
        prompt,
        task,
        (store, key),
        adapter_of(options.adapter),
        options.cancel,
    )
    .await;
    trace::trace(format!(
        "implement {}: {}",
        request_id,
        if outcome.is_ok() { "ok" } else { "failed" }
    ));
    outcome
}

fn adapter_of(adapter: Option<Arc<dyn AgentAdapter>>) -> Arc<dyn AgentAdapter> {
    adapter.unwrap_or_else(|| Arc::new(OpenAiAgent::default()))
}

#[allow(clippy::too_many_arguments)]
async fn run_live(
    context: &TaskContext,
    schema: Schema,
    validator: Option<ResultValidator>,
    prompt: String,
    task: TaskRecord,
    sink: (Store, String),
    adapter: Arc<dyn AgentAdapter>,
    cancel: CancellationToken,
) -> Result<Value, TaskError> {
    let evaluator = Arc::new(Evaluator::new(context, Some(schema), validator)?);
    let completion = evaluator.completion();
    let mut completion_rx = completion
        .take_receiver()
        .expect("fresh evaluator always has its receiver");
    let recorder = Arc::new(Recorder::new(task, Some(sink)));
    let tools = task_tools(evaluator.clone(), recorder.clone());

    let agent_cancel = cancel.child_token();
    let mut stream = adapter.run(prompt, tools, agent_cancel.clone()).await?;

    let outcome = loop {
        tokio::select! {
            // Polled in order: a settled promise outranks cancellation,
            // which outranks more agent output.
            biased;
            settled = &mut completion_rx => {
                // Result or bail. Stop the agent, then let it wind down
                // so the in-flight call finishes recording.
                agent_cancel.cancel();
                drain(&mut stream, &recorder).await;
                break settled.unwrap_or(Err(TaskError::AgentExit));
            }
            _ = cancel.cancelled() => {
                agent_cancel.cancel();
                completion.reject(TaskError::Cancelled);
                drain(&mut stream, &recorder).await;
                break Err(TaskError::Cancelled);
            }
            message = stream.next() => match message {
                Some(Ok(message)) => recorder.push_message(message.0),
                Some(Err(error)) => {
                    agent_cancel.cancel();
                    break Err(TaskError::Agent(error));
                }
                None => {
                    // The agent exited on its own; the promise may have
                    // settled during its final tool call.
                    break match completion_rx.try_recv() {
                        Ok(settled) => settled,
                        Err(_) => Err(TaskError::AgentExit),
                    };
                }
            },
        }
    };

    match outcome {
        Ok(value) => {
            recorder.finalize(true).await;
            Ok(value)
        }
        Err(error) => {
            recorder.finalize(false).await;
            Err(error)
        }
    }
}

async fn drain(stream: &mut MessageStream, recorder: &Recorder) {
    while let Some(message) = stream.next().await {
        if let Ok(message) = message {
            recorder.push_message(message.0);
        }
    }
}

/// The outcome of an [`investigate`] run: the agent's final free-form
/// text plus every message it produced along the way.
#[derive(Debug, Clone)]
pub struct Investigation {
    pub text: String,
    pub messages: Vec<AgentMessage>,
}

impl Investigation {
    pub fn summary(&self) -> &str {
        &self.text
    }
}

/// Drive an agent to diagnose the live context (typically a caught
/// error) with the same eval machinery, producing free-form text. No
/// schema, no `set_result`, no cache.
pub async fn investigate(
    context: &TaskContext,
    options: InvestigateOptions,
) -> Result<Investigation, TaskError> {
    let request_id = Uuid::new_v4();
    let descriptors = describe_context(context);
    let prompt = prompts::investigate_prompt(&descriptors);
    trace::trace(format!("investigate {}", request_id));

    let evaluator = Arc::new(Evaluator::new(context, None, None)?);
    let recorder = Arc::new(Recorder::new(
        TaskRecord {
            prompt: prompt.clone(),
            schema: Value::Null,
            context: descriptors,
        },
        None,
    ));
    let tools = investigate_tools(evaluator, recorder.clone());

    let agent_cancel = options.cancel.child_token();
    let adapter = adapter_of(options.adapter);
    let mut stream = adapter.run(prompt, tools, agent_cancel.clone()).await?;

    let mut messages: Vec<AgentMessage> = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => {
                agent_cancel.cancel();
                return Err(TaskError::Cancelled);
            }
            message = stream.next() => match message {
                Some(Ok(message)) => {
                    if let Some(status) = &options.status {
                        let _ = status.send(message.clone());
                    }
                    messages.push(message);
                }
                Some(Err(error)) => return Err(TaskError::Agent(error)),
                None => break,
            },
        }
    }

    let text = messages
        .iter()
        .rev()
        .find_map(|message| message.text().map(str::to_string))
        .ok_or(TaskError::AgentExit)?;

    Ok(Investigation { text, messages })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::agent::testing::ScriptedAgent;
    use crate::cache::cache_key;
    use crate::context::ContextValue;
    use crate::schema::{ArrayField, NumberField, Schema};

    fn number_context() -> TaskContext {
        let mut context = TaskContext::new();
        context.insert("numbers".into(), ContextValue::json(json!([1, 2, 3, 4, 5])));
        context
    }

    fn doubled_schema() -> Schema {
        Schema::new([ArrayField::new_number_array("doubled").into()])
    }

    fn sum_schema() -> Schema {
        Schema::new([NumberField::new("sum").into()])
    }

    #[tokio::test]
    async fn test_simple_scalar_computation() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new(vec![
            (
                "eval",
                json!({"code": "async () => context.numbers.length"}),
            ),
            (
                "set_result",
                json!({"code": "async () => ({ doubled: context.numbers.map((n) => n * 2) })"}),
            ),
        ]);

        let value = implement(
            "Double each number in the input array.",
            &number_context(),
            doubled_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();

        assert_eq!(value, json!({"doubled": [2, 4, 6, 8, 10]}));
    }

    #[tokio::test]
    async fn test_vars_persist_and_transcript_records_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let instruction = "Add two stashed numbers.";
        let agent = ScriptedAgent::new(vec![
            ("eval", json!({"code": "async () => { vars.x = 10; return vars.x; }"})),
            ("eval", json!({"code": "async () => { vars.y = 20; return vars.y; }"})),
            (
                "set_result",
                json!({"code": "async () => { return { sum: vars.x + vars.y }; }"}),
            ),
        ]);

        let value = implement(
            instruction,
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"sum": 30}));

        let key = cache_key(instruction, &sum_schema().canonical_json());
        let transcript = Store::new(dir.path()).lookup(&key).await.unwrap();
        assert!(transcript.success);
        let tools = transcript
            .calls
            .iter()
            .map(|call| call.tool.as_str())
            .collect::<Vec<_>>();
        assert_eq!(tools, vec!["eval", "eval", "set_result"]);
        assert_eq!(
            transcript.calls[0].result.ok_value().unwrap(),
            &json!({"result": 10})
        );
    }

    #[tokio::test]
    async fn test_schema_violation_then_retry() {
        let dir = tempfile::tempdir().unwrap();
        let instruction = "Pick a non-negative number.";
        let schema = Schema::new([NumberField::new("n").min(0.0).into()]);
        let agent = ScriptedAgent::new(vec![
            ("set_result", json!({"code": "async () => ({ n: -1 })"})),
            ("set_result", json!({"code": "async () => ({ n: 1 })"})),
        ]);

        let value = implement(
            instruction,
            &TaskContext::new(),
            schema.clone(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"n": 1}));

        let key = cache_key(instruction, &schema.canonical_json());
        let transcript = Store::new(dir.path()).lookup(&key).await.unwrap();
        assert_eq!(transcript.calls.len(), 2);
        assert!(!transcript.calls[0].result.is_ok());
        assert!(transcript.calls[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_bail_rejects_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new(vec![(
            "bail",
            json!({"message": "cannot satisfy impossible constraint"}),
        )]);

        let error = implement(
            "Do the impossible.",
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, TaskError::Bail(_)));
        assert!(error
            .to_string()
            .contains("Agent could not complete the task: cannot satisfy impossible constraint"));

        // Failed transcripts are persisted but never consumed.
        let key = cache_key("Do the impossible.", &sum_schema().canonical_json());
        assert!(Store::new(dir.path()).lookup(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let instruction = "Add two stashed numbers.";
        let calls = vec![
            ("eval", json!({"code": "async () => { vars.x = 10; return vars.x; }"})),
            ("eval", json!({"code": "async () => { vars.y = 20; return vars.y; }"})),
            (
                "set_result",
                json!({"code": "async () => ({ sum: vars.x + vars.y })"}),
            ),
        ];

        let first_agent = ScriptedAgent::new(calls.clone());
        let value = implement(
            instruction,
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(first_agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"sum": 30}));

        let second_agent = ScriptedAgent::new(calls);
        let runs = second_agent.run_counter();
        let value = implement(
            instruction,
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(second_agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"sum": 30}));
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replay_mismatch_falls_back_silently() {
        let dir = tempfile::tempdir().unwrap();
        let instruction = "Count the rows.";

        // First run against a healthy handle; the transcript records the
        // fetch.
        let mut healthy = TaskContext::new();
        healthy.insert(
            "fetchRows".into(),
            ContextValue::function(|_| Ok(json!([10, 20, 30]))),
        );
        let first_agent = ScriptedAgent::new(vec![
            (
                "eval",
                json!({"code": "async () => { vars.rows = context.fetchRows(); return vars.rows; }"}),
            ),
            (
                "set_result",
                json!({"code": "async () => ({ sum: vars.rows.length })"}),
            ),
        ]);
        let value = implement(
            instruction,
            &healthy,
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(first_agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"sum": 3}));

        // Same task, but the handle now refuses the connection. Replay
        // fails and the agent runs live; the caller sees only the fresh
        // value.
        let mut refusing = TaskContext::new();
        refusing.insert(
            "fetchRows".into(),
            ContextValue::function(|_| Err("connection refused".into())),
        );
        let fallback_agent = ScriptedAgent::new(vec![(
            "set_result",
            json!({"code": "async () => ({ sum: 99 })"}),
        )]);
        let runs = fallback_agent.run_counter();

        let value = implement(
            instruction,
            &refusing,
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(fallback_agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap();
        assert_eq!(value, json!({"sum": 99}));
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_use_without_cache_rejects_before_agent_work() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new(vec![(
            "set_result",
            json!({"code": "async () => ({ sum: 1 })"}),
        )]);
        let runs = agent.run_counter();

        let error = implement(
            "Never cached.",
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path())
                .with_force_use_cache(true),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, TaskError::CacheRequired));
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_agent_exit_without_completion() {
        let dir = tempfile::tempdir().unwrap();
        let agent = ScriptedAgent::new(vec![(
            "eval",
            json!({"code": "async () => 1"}),
        )]);

        let error = implement(
            "Wander off.",
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path()),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, TaskError::AgentExit));
    }

    #[tokio::test]
    async fn test_cancellation_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let agent = ScriptedAgent::new(vec![(
            "set_result",
            json!({"code": "async () => ({ sum: 1 })"}),
        )]);

        let error = implement(
            "Cancelled before it starts.",
            &TaskContext::new(),
            sum_schema(),
            ImplementOptions::new()
                .with_adapter(agent)
                .with_cache_dir(dir.path())
                .with_cancel(cancel),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, TaskError::Cancelled));
    }

    #[tokio::test]
    async fn test_investigate_returns_final_text_and_streams_status() {
        let mut context = TaskContext::new();
        context.insert(
            "lastError".into(),
            ContextValue::error("TypeError", "x is not a function", None),
        );
        let agent = ScriptedAgent::new(vec![(
            "eval",
            json!({"code": "async () => context.lastError.message"}),
        )])
        .with_final_text("The handler was passed a number where a callback was expected.");

        let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel();
        let investigation = investigate(
            &context,
            InvestigateOptions::new()
                .with_adapter(agent)
                .with_status(status_tx),
        )
        .await
        .unwrap();

        assert_eq!(
            investigation.summary(),
            "The handler was passed a number where a callback was expected."
        );
        assert_eq!(investigation.messages.len(), 2);

        // The status stream saw the same messages live.
        let mut streamed = Vec::new();
        while let Ok(message) = status_rx.try_recv() {
            streamed.push(message);
        }
        assert_eq!(streamed, investigation.messages);
    }
}
