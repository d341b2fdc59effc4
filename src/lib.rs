pub mod agent;
pub mod cache;
pub mod context;
pub mod error;
pub mod eval;
pub mod orchestrator;
pub mod prompts;
pub mod replay;
pub mod schema;
pub mod tools;
pub mod transcript;

pub(crate) mod trace;

pub use context::{ContextDescriptor, ContextValue};
pub use error::TaskError;
pub use orchestrator::{implement, investigate, ImplementOptions, InvestigateOptions, Investigation};
pub use schema::Schema;
