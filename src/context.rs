use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::json_type_name;

/// A synchronous host callable exposed to the sandbox. The engine runs on
/// its own thread, so a handle that needs async work may block inside the
/// closure.
pub type HostFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;

/// A live value the caller lends to the sandbox for the duration of one
/// request.
#[derive(Clone)]
pub enum ContextValue {
    /// Plain data, injected into the sandbox as-is.
    Json(Value),
    /// A callable handle. Invocations dispatch back to the host closure.
    Function {
        description: Option<String>,
        call: HostFn,
    },
    /// A caught error, reconstructed as an `Error` object in the sandbox.
    /// This is what `investigate` runs on.
    Error {
        name: String,
        message: String,
        stack: Option<String>,
    },
}

impl ContextValue {
    pub fn json(value: impl Into<Value>) -> Self {
        ContextValue::Json(value.into())
    }

    pub fn function<F>(call: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        ContextValue::Function {
            description: None,
            call: Arc::new(call),
        }
    }

    pub fn function_with_description<F>(description: impl Into<String>, call: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        ContextValue::Function {
            description: Some(description.into()),
            call: Arc::new(call),
        }
    }

    pub fn error(
        name: impl Into<String>,
        message: impl Into<String>,
        stack: Option<String>,
    ) -> Self {
        ContextValue::Error {
            name: name.into(),
            message: message.into(),
            stack,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            ContextValue::Json(value) => json_type_name(value),
            ContextValue::Function { .. } => "function",
            ContextValue::Error { .. } => "error",
        }
    }

    pub fn describe(&self, name: &str) -> ContextDescriptor {
        let description = match self {
            ContextValue::Json(_) => None,
            ContextValue::Function { description, .. } => description.clone(),
            ContextValue::Error { message, stack, .. } => Some(match stack {
                Some(stack) => format!("{}\n{}", message, stack),
                None => message.clone(),
            }),
        };

        ContextDescriptor {
            name: name.to_string(),
            type_tag: self.type_tag().to_string(),
            description,
        }
    }
}

/// The bag of live values for one request, keyed by the identifier the
/// sandbox sees them under.
pub type Context = BTreeMap<String, ContextValue>;

/// What gets rendered into the prompt and recorded in the transcript.
/// Live values never leave the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

pub fn describe_context(context: &Context) -> Vec<ContextDescriptor> {
    context
        .iter()
        .map(|(name, value)| value.describe(name))
        .collect()
}
