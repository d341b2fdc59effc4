use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TaskError;

/// The single synchronization point of a request: resolved by a
/// successful `set_result`, rejected by `bail`, cancellation, or the
/// agent exiting early. Settles at most once; later settles are no-ops.
pub(crate) struct Completion {
    tx: Mutex<Option<oneshot::Sender<Result<Value, TaskError>>>>,
    rx: Mutex<Option<oneshot::Receiver<Result<Value, TaskError>>>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Resolve with the validated result. Returns false if already
    /// settled.
    pub(crate) fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with a failure. Returns false if already settled.
    pub(crate) fn reject(&self, error: TaskError) -> bool {
        self.settle(Err(error))
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.tx.lock().expect("completion lock poisoned").is_none()
    }

    /// The receiving half. Observable exactly once; the second take
    /// returns None.
    pub(crate) fn take_receiver(&self) -> Option<oneshot::Receiver<Result<Value, TaskError>>> {
        self.rx.lock().expect("completion lock poisoned").take()
    }

    fn settle(&self, outcome: Result<Value, TaskError>) -> bool {
        let Some(tx) = self.tx.lock().expect("completion lock poisoned").take() else {
            return false;
        };
        // The receiver may already be dropped (e.g. cancellation raced
        // ahead); the promise still counts as settled.
        let _ = tx.send(outcome);
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_completion_resolves_once() {
        let completion = Completion::new();
        assert!(!completion.is_settled());

        assert!(completion.resolve(json!({"sum": 30})));
        assert!(completion.is_settled());

        // Later settles are no-ops.
        assert!(!completion.resolve(json!({"sum": 31})));
        assert!(!completion.reject(TaskError::AgentExit));

        let rx = completion.take_receiver().unwrap();
        let value = rx.await.unwrap().unwrap();
        assert_eq!(value, json!({"sum": 30}));
    }

    #[tokio::test]
    async fn test_completion_rejects() {
        let completion = Completion::new();
        assert!(completion.reject(TaskError::Bail("no way".into())));

        let rx = completion.take_receiver().unwrap();
        let error = rx.await.unwrap().unwrap_err();
        assert!(error
            .to_string()
            .contains("Agent could not complete the task: no way"));
    }

    #[test]
    fn test_receiver_taken_once() {
        let completion = Completion::new();
        assert!(completion.take_receiver().is_some());
        assert!(completion.take_receiver().is_none());
    }
}
