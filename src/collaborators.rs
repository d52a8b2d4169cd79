//! External collaborators consulted during a turn

use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Most recent inputs kept by the recording collaborators
pub const RECORD_LIMIT: usize = 64;

fn record<T>(log: &Mutex<VecDeque<T>>, item: T) {
    if let Ok(mut log) = log.lock() {
        if log.len() == RECORD_LIMIT {
            log.pop_front();
        }
        log.push_back(item);
    }
}

/// Semantic nearest-neighbour search over the knowledge base
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranked `(text, metadata, distance)` hits; empty means no match
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// Cheap relevance check used by the classifier fallback
    async fn probe(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.search(query, k).await
    }
}

/// Keyword web search returning ranked snippets
#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &'static str;

    async fn query(&self, text: &str, location: Option<&str>) -> Result<SearchResults>;
}

/// Text-in/text-out completion
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Retriever over a fixed hit list
#[derive(Default)]
pub struct StaticRetriever {
    chunks: Vec<ScoredChunk>,
    calls: AtomicUsize,
}

impl StaticRetriever {
    pub fn new(chunks: Vec<ScoredChunk>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    /// Convenience builder: `(text, source, distance)` triples
    pub fn from_triples(triples: &[(&str, &str, f32)]) -> Self {
        Self::new(
            triples
                .iter()
                .map(|(text, source, distance)| ScoredChunk {
                    text: text.to_string(),
                    metadata: ChunkMetadata {
                        source: Some(source.to_string()),
                        category: None,
                    },
                    distance: *distance,
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn search(&self, _query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.chunks.iter().take(k).cloned().collect())
    }
}

/// Retriever whose every call fails
#[derive(Default)]
pub struct FailingRetriever;

#[async_trait]
impl Retriever for FailingRetriever {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<ScoredChunk>> {
        anyhow::bail!("index unavailable")
    }
}

/// Web search with canned results; records the last `RECORD_LIMIT` queries
#[derive(Default)]
pub struct StaticWebSearch {
    results: SearchResults,
    fail: bool,
    queries: Mutex<VecDeque<(String, Option<String>)>>,
    calls: AtomicUsize,
}

impl StaticWebSearch {
    pub fn new(results: SearchResults) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<(String, Option<String>)> {
        self.queries.lock().map(|q| q.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for StaticWebSearch {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn query(&self, text: &str, location: Option<&str>) -> Result<SearchResults> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        record(&self.queries, (text.to_string(), location.map(str::to_string)));
        if self.fail {
            anyhow::bail!("search backend timed out");
        }
        Ok(self.results.clone())
    }
}

/// Model that replays scripted replies and records the last `RECORD_LIMIT` prompts.
/// Falls back to a fixed reply once the script runs out.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    prompts: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            prompts: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
        self
    }

    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(reason.into()));
        }
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        record(&self.prompts, prompt.to_string());
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(reason)) => Err(anyhow::anyhow!(reason)),
            None => Ok(self.fallback.clone()),
        }
    }
}
