use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::Store;
use crate::context::ContextDescriptor;

/// Result of one recorded tool call. `Ok` carries the serialized value
/// the tool produced; `Err` carries the failure text and, when the
/// sandbox threw, the stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Ok {
        ok: Value,
    },
    Err {
        error: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl ToolOutcome {
    pub fn ok(value: Value) -> Self {
        ToolOutcome::Ok { ok: value }
    }

    pub fn err(message: impl Into<String>, stack: Option<String>) -> Self {
        ToolOutcome::Err {
            error: true,
            message: message.into(),
            stack,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }

    pub fn ok_value(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Ok { ok } => Some(ok),
            ToolOutcome::Err { .. } => None,
        }
    }
}

/// One tool invocation, in agent-issued order. For `bail` the `code`
/// field carries the message argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub code: String,
    pub result: ToolOutcome,
}

/// The task header: what the agent was asked to do. Context is recorded
/// as descriptors only; live values never reach disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub prompt: String,
    pub schema: Value,
    pub context: Vec<ContextDescriptor>,
}

/// The persisted record of one request. Unknown fields survive a
/// load-then-save cycle via `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub success: bool,
    pub task: TaskRecord,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub calls: Vec<ToolCallRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transcript {
    pub fn new(task: TaskRecord) -> Self {
        Self {
            success: false,
            task,
            messages: Vec::new(),
            calls: Vec::new(),
            extra: Map::new(),
        }
    }

    /// The last successful `set_result`, if any — what replay re-runs.
    pub fn final_call(&self) -> Option<&ToolCallRecord> {
        self.calls
            .iter()
            .rev()
            .find(|call| call.tool == "set_result" && call.result.is_ok())
    }
}

/// Append-only transcript state for a live request. After every tool
/// call the transcript is flushed with `success=false`; the orchestrator
/// issues the final write with the authoritative flag.
pub struct Recorder {
    transcript: Mutex<Transcript>,
    sink: Option<(Store, String)>,
}

impl Recorder {
    pub fn new(task: TaskRecord, sink: Option<(Store, String)>) -> Self {
        Self {
            transcript: Mutex::new(Transcript::new(task)),
            sink,
        }
    }

    pub async fn record_call(&self, call: ToolCallRecord) {
        let snapshot = {
            let mut transcript = self.transcript.lock().expect("transcript lock poisoned");
            transcript.calls.push(call);
            self.sink.is_some().then(|| transcript.clone())
        };
        if let (Some((store, key)), Some(snapshot)) = (&self.sink, snapshot) {
            store.save(key, &snapshot).await;
        }
    }

    pub fn push_message(&self, message: Value) {
        self.transcript
            .lock()
            .expect("transcript lock poisoned")
            .messages
            .push(message);
    }

    pub fn snapshot(&self, success: bool) -> Transcript {
        let mut transcript = self
            .transcript
            .lock()
            .expect("transcript lock poisoned")
            .clone();
        transcript.success = success;
        transcript
    }

    /// Final write with the authoritative `success` flag. Best-effort,
    /// like every other store write.
    pub async fn finalize(&self, success: bool) {
        if let Some((store, key)) = &self.sink {
            let snapshot = self.snapshot(success);
            store.save(key, &snapshot).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn task() -> TaskRecord {
        TaskRecord {
            prompt: "Double each number".into(),
            schema: json!({"type": "object"}),
            context: vec![ContextDescriptor {
                name: "numbers".into(),
                type_tag: "array".into(),
                description: None,
            }],
        }
    }

    #[test]
    fn test_tool_outcome_wire_shape() {
        let ok = ToolOutcome::ok(json!({"result": 10}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"ok": {"result": 10}})
        );

        let err = ToolOutcome::err("boom", Some("at <eval>:1".into()));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"error": true, "message": "boom", "stack": "at <eval>:1"})
        );

        let parsed: ToolOutcome = serde_json::from_value(json!({"ok": [1, 2]})).unwrap();
        assert!(parsed.is_ok());
        let parsed: ToolOutcome =
            serde_json::from_value(json!({"error": true, "message": "boom"})).unwrap();
        assert!(!parsed.is_ok());
    }

    #[test]
    fn test_transcript_round_trip_preserves_unknown_fields() {
        let raw = json!({
            "success": true,
            "task": {"prompt": "p", "schema": {}, "context": []},
            "calls": [],
            "someFutureField": {"kept": true}
        });

        let transcript: Transcript = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&transcript).unwrap(), raw);
    }

    #[test]
    fn test_final_call_picks_last_successful_set_result() {
        let mut transcript = Transcript::new(task());
        transcript.calls = vec![
            ToolCallRecord {
                tool: "set_result".into(),
                code: "bad".into(),
                result: ToolOutcome::err("validation failed", None),
            },
            ToolCallRecord {
                tool: "set_result".into(),
                code: "good".into(),
                result: ToolOutcome::ok(json!({"n": 1})),
            },
        ];

        assert_eq!(transcript.final_call().unwrap().code, "good");
    }

    #[tokio::test]
    async fn test_recorder_accumulates_in_order() {
        let recorder = Recorder::new(task(), None);
        recorder
            .record_call(ToolCallRecord {
                tool: "eval".into(),
                code: "a".into(),
                result: ToolOutcome::ok(json!(1)),
            })
            .await;
        recorder
            .record_call(ToolCallRecord {
                tool: "eval".into(),
                code: "b".into(),
                result: ToolOutcome::ok(json!(2)),
            })
            .await;
        recorder.push_message(json!({"role": "assistant"}));

        let snapshot = recorder.snapshot(true);
        assert!(snapshot.success);
        assert_eq!(snapshot.calls.len(), 2);
        assert_eq!(snapshot.calls[0].code, "a");
        assert_eq!(snapshot.messages.len(), 1);
    }
}
