use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentAdapter, AgentMessage};
use crate::eval::ResultValidator;

/// Knobs for one [`implement`](crate::implement) request.
pub struct ImplementOptions {
    pub(crate) cancel: CancellationToken,
    pub(crate) validator: Option<ResultValidator>,
    pub(crate) force_use_cache: bool,
    pub(crate) adapter: Option<Arc<dyn AgentAdapter>>,
    pub(crate) cache_dir: Option<PathBuf>,
}

impl Default for ImplementOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            validator: None,
            force_use_cache: false,
            adapter: None,
            cache_dir: None,
        }
    }
}

impl ImplementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cooperative cancellation handle. On cancel the agent is asked to
    /// stop and the request rejects.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extra result check run after schema validation. A rejection is
    /// returned to the agent as a retryable failure.
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Alias for `KLENDATHU_CACHE_MODE=force-use`: replay or fail, never
    /// invoke the agent.
    pub fn with_force_use_cache(mut self, force_use_cache: bool) -> Self {
        self.force_use_cache = force_use_cache;
        self
    }

    /// Swap in a different agent. Defaults to the bundled
    /// [`OpenAiAgent`](crate::agent::OpenAiAgent).
    pub fn with_adapter<A>(mut self, adapter: A) -> Self
    where
        A: AgentAdapter + 'static,
    {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Cache directory override, taking precedence over
    /// `KLENDATHU_CACHE`.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }
}

/// Knobs for one [`investigate`](crate::investigate) request.
pub struct InvestigateOptions {
    pub(crate) cancel: CancellationToken,
    pub(crate) adapter: Option<Arc<dyn AgentAdapter>>,
    pub(crate) status: Option<UnboundedSender<AgentMessage>>,
}

impl Default for InvestigateOptions {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            adapter: None,
            status: None,
        }
    }
}

impl InvestigateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_adapter<A>(mut self, adapter: A) -> Self
    where
        A: AgentAdapter + 'static,
    {
        self.adapter = Some(Arc::new(adapter));
        self
    }

    /// Live status feed: every agent message is sent here as it arrives.
    pub fn with_status(mut self, status: UnboundedSender<AgentMessage>) -> Self {
        self.status = Some(status);
        self
    }
}
