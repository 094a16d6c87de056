//! The Goldi generation pipeline.
//!
//! Each workflow loads the persisted project context, asks the generation
//! capability ([`LlmClient`]) for new candidates, merges them with the rows a
//! user has locked, writes the result in one storage snapshot, and appends a
//! sequence-numbered state event. [`WorkflowRunner`] is the entry point.

pub mod candidates;
pub mod config;
pub mod context;
pub mod coverage;
pub mod curation;
pub mod error;
pub mod events;
pub mod fanout;
pub mod llm;
pub mod persist;
pub mod prompts;
pub mod reconcile;
pub mod scope;
pub mod stage;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::WorkflowError;
pub use llm::{CompletionRequest, LlmClient, LlmError, Message};
pub use stage::{Generator, Stage};
pub use workflow::WorkflowRunner;

#[cfg(feature = "anthropic")]
pub use llm::AnthropicClient;

/// A fresh UUID v4 row id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
