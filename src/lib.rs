//! ragrouter - Hybrid retrieval routing for conversational agents
//!
//! Routes each question to a local knowledge base, live web search, or both:
//! - Keyword-table query classification with an optional relevance probe
//! - Token-budgeted knowledge-base context assembly
//! - Topic-aware merging of knowledge-base and web context
//! - Bounded conversation memory with durable session snapshots

pub mod types;
pub mod error;
pub mod config;
pub mod collaborators;
pub mod classifier;
pub mod assembler;
pub mod combiner;
pub mod memory;
pub mod orchestrator;
pub mod http_retriever;
pub mod web_search;
pub mod language_model;
pub mod server;

pub use types::*;
pub use error::RouterError;
pub use config::RouterConfig;
pub use collaborators::{
    FailingRetriever, LanguageModel, Retriever, ScriptedModel, StaticRetriever, StaticWebSearch, WebSearch,
};
pub use classifier::QueryClassifier;
pub use assembler::ContextAssembler;
pub use combiner::combine;
pub use memory::{ConversationMemory, SnapshotStore};
pub use orchestrator::Orchestrator;
pub use http_retriever::HttpRetriever;
pub use web_search::SerperSearch;
pub use language_model::GeminiModel;

#[cfg(test)]
mod tests;
