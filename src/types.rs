//! Core type definitions for hybrid retrieval routing

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Free-form session context (location, preferences, ...)
pub type ContextMap = serde_json::Map<String, serde_json::Value>;

/// Which sources a turn should consult, plus the per-source queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub use_knowledge_base: bool,
    pub use_web_search: bool,
    pub knowledge_query: String,
    pub web_query: String,
    pub rationale: String,
}

impl RoutingDecision {
    /// Start with no sources enabled and both queries equal to the input
    pub fn new(query: &str) -> Self {
        Self {
            use_knowledge_base: false,
            use_web_search: false,
            knowledge_query: query.to_string(),
            web_query: query.to_string(),
            rationale: String::new(),
        }
    }

    pub fn uses_any_source(&self) -> bool {
        self.use_knowledge_base || self.use_web_search
    }

    pub(crate) fn note(&mut self, clause: &str) {
        self.rationale.push_str(clause);
        self.rationale.push(' ');
    }
}

/// Raw hit as returned by a `Retriever`: text, metadata, distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Retrieval hit with a bounded similarity score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalHit {
    pub text: String,
    pub source_label: String,
    pub relevance: f32, // (0.0, 1.0]
}

impl From<ScoredChunk> for RetrievalHit {
    fn from(chunk: ScoredChunk) -> Self {
        Self {
            relevance: similarity(chunk.distance),
            source_label: chunk
                .metadata
                .source
                .unwrap_or_else(|| "Unknown".to_string()),
            text: chunk.text,
        }
    }
}

/// Convert a distance into a similarity in (0, 1]
pub fn similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Sources that can contribute to a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    KnowledgeBase,
    WebSearch,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::KnowledgeBase => "Knowledge Base",
            SourceKind::WebSearch => "Current Web Data",
        }
    }
}

/// Ranked web result entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Structured web search result; `error` set means the search failed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub organic: Vec<SearchEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResults {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            organic: Vec::new(),
            error: Some(reason.into()),
        }
    }

    /// `"<title>: <snippet>"` for the top `n` entries, newline-joined.
    /// Empty when the search reported an error.
    pub fn format_top(&self, n: usize) -> String {
        if self.error.is_some() {
            return String::new();
        }
        self.organic
            .iter()
            .take(n)
            .map(|entry| format!("{}: {}", entry.title, entry.snippet))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One user/agent exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    #[serde(rename = "user")]
    pub user_text: String,
    #[serde(rename = "agent")]
    pub agent_text: String,
    pub timestamp: f64,
    #[serde(rename = "sources", default)]
    pub sources_used: String,
}

impl Exchange {
    pub fn new(user_text: impl Into<String>, agent_text: impl Into<String>, sources_used: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            agent_text: agent_text.into(),
            timestamp: unix_now(),
            sources_used: sources_used.into(),
        }
    }
}

/// Durable on-disk form of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub conversation_memory: Vec<Exchange>,
    #[serde(rename = "json_context", default)]
    pub context: ContextMap,
    pub timestamp: f64,
}

/// Seconds since the unix epoch as a float
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
