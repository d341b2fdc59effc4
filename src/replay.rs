use serde_json::Value;
use thiserror::Error;

use crate::eval::Evaluator;
use crate::transcript::Transcript;

/// Replay is all-or-nothing: any step that no longer behaves as
/// recorded aborts it, and the orchestrator falls back to a live run on
/// a fresh evaluator. The caller never sees these.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("environment mismatch during replay: {0}")]
    Mismatch(String),

    #[error("transcript has no successful set_result to replay")]
    NoFinalCall,
}

/// Re-execute a cached transcript against a live evaluator: every
/// successful `eval` in recorded order, then the last successful
/// `set_result` through the validating path.
pub async fn replay(transcript: &Transcript, evaluator: &Evaluator) -> Result<Value, ReplayError> {
    let final_call = transcript.final_call().ok_or(ReplayError::NoFinalCall)?;

    for call in &transcript.calls {
        if call.tool != "eval" || !call.result.is_ok() {
            continue;
        }
        match evaluator.eval(&call.code).await {
            Ok(output) => {
                // Recorded Ok that now evaluates to a serialized error
                // counts as a mismatch even though nothing threw.
                if output.result.get("__error").and_then(Value::as_bool) == Some(true) {
                    log::debug!("replay: recorded eval now yields an error value");
                    return Err(ReplayError::Mismatch(
                        "recorded eval now yields an error value".into(),
                    ));
                }
            }
            Err(error) => {
                log::debug!("replay: recorded eval failed: {}", error);
                return Err(ReplayError::Mismatch(error.to_string()));
            }
        }
    }

    evaluator
        .set_result(&final_call.code)
        .await
        .map_err(|error| {
            log::debug!("replay: final set_result failed: {}", error);
            ReplayError::Mismatch(error.to_string())
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::{Context as TaskContext, ContextValue};
    use crate::schema::{NumberField, Schema};
    use crate::transcript::{TaskRecord, ToolCallRecord, ToolOutcome};

    fn transcript_with(calls: Vec<ToolCallRecord>) -> Transcript {
        let mut transcript = Transcript::new(TaskRecord {
            prompt: "p".into(),
            schema: json!({}),
            context: vec![],
        });
        transcript.success = true;
        transcript.calls = calls;
        transcript
    }

    fn sum_schema() -> Schema {
        Schema::new([NumberField::new("sum").into()])
    }

    #[tokio::test]
    async fn test_replay_reproduces_result() {
        let transcript = transcript_with(vec![
            ToolCallRecord {
                tool: "eval".into(),
                code: "async () => { vars.x = 10; return vars.x; }".into(),
                result: ToolOutcome::ok(json!({"result": 10})),
            },
            ToolCallRecord {
                tool: "eval".into(),
                code: "async () => { vars.y = 20; return vars.y; }".into(),
                result: ToolOutcome::ok(json!({"result": 20})),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "async () => ({ sum: vars.x + vars.y })".into(),
                result: ToolOutcome::ok(json!({"sum": 30})),
            },
        ]);

        let evaluator = Evaluator::new(&TaskContext::new(), Some(sum_schema()), None).unwrap();
        let value = replay(&transcript, &evaluator).await.unwrap();
        assert_eq!(value, json!({"sum": 30}));
        assert!(evaluator.completion().is_settled());
    }

    #[tokio::test]
    async fn test_replay_skips_failed_calls() {
        let transcript = transcript_with(vec![
            ToolCallRecord {
                tool: "eval".into(),
                code: "async () => { throw new Error(\"exploratory dead end\"); }".into(),
                result: ToolOutcome::err("exploratory dead end", None),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "async () => ({ sum: -1 })".into(),
                result: ToolOutcome::err("validation failed", None),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "async () => ({ sum: 30 })".into(),
                result: ToolOutcome::ok(json!({"sum": 30})),
            },
        ]);

        let evaluator = Evaluator::new(&TaskContext::new(), Some(sum_schema()), None).unwrap();
        let value = replay(&transcript, &evaluator).await.unwrap();
        assert_eq!(value, json!({"sum": 30}));
    }

    #[tokio::test]
    async fn test_replay_mismatch_on_throw() {
        let transcript = transcript_with(vec![
            ToolCallRecord {
                tool: "eval".into(),
                code: "async () => context.fetchRows()".into(),
                result: ToolOutcome::ok(json!({"result": [1, 2]})),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "async () => ({ sum: 3 })".into(),
                result: ToolOutcome::ok(json!({"sum": 3})),
            },
        ]);

        // The handle that used to answer now refuses the connection.
        let mut context = TaskContext::new();
        context.insert(
            "fetchRows".into(),
            ContextValue::function(|_| Err("connection refused".into())),
        );

        let evaluator = Evaluator::new(&context, Some(sum_schema()), None).unwrap();
        let error = replay(&transcript, &evaluator).await.unwrap_err();
        assert!(matches!(error, ReplayError::Mismatch(_)));
    }

    #[tokio::test]
    async fn test_replay_mismatch_on_error_value() {
        let transcript = transcript_with(vec![
            ToolCallRecord {
                tool: "eval".into(),
                code: "async () => new Error(\"degraded\")".into(),
                result: ToolOutcome::ok(json!({"result": 7})),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "async () => ({ sum: 7 })".into(),
                result: ToolOutcome::ok(json!({"sum": 7})),
            },
        ]);

        let evaluator = Evaluator::new(&TaskContext::new(), Some(sum_schema()), None).unwrap();
        let error = replay(&transcript, &evaluator).await.unwrap_err();
        assert!(matches!(error, ReplayError::Mismatch(_)));
    }

    #[tokio::test]
    async fn test_replay_mismatch_on_validation_failure() {
        // Schema disagrees with the recorded result; a caller validator
        // changing its mind looks the same.
        let transcript = transcript_with(vec![ToolCallRecord {
            tool: "set_result".into(),
            code: "async () => ({ sum: -5 })".into(),
            result: ToolOutcome::ok(json!({"sum": -5})),
        }]);

        let schema = Schema::new([NumberField::new("sum").min(0.0).into()]);
        let evaluator = Evaluator::new(&TaskContext::new(), Some(schema), None).unwrap();
        let error = replay(&transcript, &evaluator).await.unwrap_err();
        assert!(matches!(error, ReplayError::Mismatch(_)));
    }

    #[tokio::test]
    async fn test_replay_without_final_call() {
        let transcript = transcript_with(vec![ToolCallRecord {
            tool: "eval".into(),
            code: "async () => 1".into(),
            result: ToolOutcome::ok(json!({"result": 1})),
        }]);

        let evaluator = Evaluator::new(&TaskContext::new(), None, None).unwrap();
        let error = replay(&transcript, &evaluator).await.unwrap_err();
        assert!(matches!(error, ReplayError::NoFinalCall));
    }
}
