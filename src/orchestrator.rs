//! Per-turn orchestration: classify, retrieve, combine, generate, record

use crate::assembler::ContextAssembler;
use crate::classifier::QueryClassifier;
use crate::collaborators::{LanguageModel, Retriever, WebSearch};
use crate::combiner::combine;
use crate::config::RouterConfig;
use crate::error::Result;
use crate::memory::{ConversationMemory, SnapshotStore};
use crate::types::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub const EMPTY_INPUT_REPLY: &str = "I'm here to help! What would you like to know about real estate?";
pub const FAREWELL_REPLY: &str =
    "Thanks for chatting! Feel free to reach out anytime for real estate help. Have a great day!";
pub const APOLOGY_REPLY: &str =
    "I apologize for the technical issue. Let me try to help you with that question again.";

const EXIT_KEYWORDS: &[&str] = &["exit", "quit", "bye", "goodbye"];

const RESPONSE_INSTRUCTIONS: &str = "Instructions:
- Provide a comprehensive, natural response using all available information
- Be specific with numbers, prices, and data when available
- If information comes from different time periods, blend them naturally
- Maintain a helpful, professional tone
- Don't mention sources explicitly unless asked";

/// Stages of a turn, used for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Routing,
    Retrieving,
    Combining,
    Generating,
    Recording,
    Error,
    Done,
}

pub fn is_exit_command(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    EXIT_KEYWORDS.contains(&lowered.as_str())
}

/// Owns conversation memory for one session and runs turns against it
pub struct Orchestrator {
    classifier: QueryClassifier,
    assembler: ContextAssembler,
    web_search: Arc<dyn WebSearch>,
    model: Arc<dyn LanguageModel>,
    memory: ConversationMemory,
    context: ContextMap,
    store: SnapshotStore,
    config: RouterConfig,
}

impl Orchestrator {
    /// New session; the snapshot file is named after the session start time
    pub fn new(
        retriever: Arc<dyn Retriever>,
        web_search: Arc<dyn WebSearch>,
        model: Arc<dyn LanguageModel>,
        config: RouterConfig,
    ) -> Self {
        let store = SnapshotStore::for_session(&config.snapshot_dir, unix_now());
        Self {
            classifier: QueryClassifier::with_probe(
                retriever.clone(),
                config.relevance_threshold,
                config.probe_k,
            ),
            assembler: ContextAssembler::with_k(retriever, config.retrieval_k),
            web_search,
            model,
            memory: ConversationMemory::new(config.memory_capacity),
            context: ContextMap::new(),
            store,
            config,
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn context(&self) -> &ContextMap {
        &self.context
    }

    pub fn snapshot_path(&self) -> &Path {
        self.store.path()
    }

    /// Merge key/values into the session context; later keys win
    pub fn update_context(&mut self, data: ContextMap) {
        for (key, value) in data {
            self.context.insert(key, value);
        }
        debug!("Session context now has {} keys", self.context.len());
    }

    /// Fill in context keys that are not already set
    pub fn seed_context(&mut self, defaults: ContextMap) {
        for (key, value) in defaults {
            self.context.entry(key).or_insert(value);
        }
        debug!("Session context now has {} keys", self.context.len());
    }

    /// Continue an earlier session from its snapshot file
    pub fn resume(&mut self, path: &Path) -> Result<()> {
        let (memory, context) = ConversationMemory::restore(path, self.config.memory_capacity)?;
        info!("Resumed session with {} exchanges from {}", memory.len(), path.display());
        self.memory = memory;
        self.context = context;
        self.store = SnapshotStore::new(path);
        Ok(())
    }

    /// Persist the session now. Failures are logged, never returned.
    pub fn shutdown(&self) {
        let snapshot = self.memory.snapshot(&self.context);
        if let Err(e) = self.store.save(&snapshot) {
            warn!("Failed to save session snapshot: {}", e);
        }
    }

    /// Run one turn. Always produces a reply.
    pub async fn turn(&mut self, user_text: &str) -> String {
        let start = Instant::now();
        let user_text = user_text.trim();

        if user_text.is_empty() {
            return EMPTY_INPUT_REPLY.to_string();
        }
        if is_exit_command(user_text) {
            self.shutdown();
            return FAREWELL_REPLY.to_string();
        }

        debug!("Turn state: {:?}", TurnState::Routing);
        let decision = self.classifier.classify(user_text).await;

        debug!("Turn state: {:?}", TurnState::Retrieving);
        let (knowledge_text, search_text) = self.retrieve(&decision).await;

        let mut sources_used = Vec::new();
        if !knowledge_text.is_empty() {
            sources_used.push(SourceKind::KnowledgeBase.label());
        }
        if !search_text.is_empty() {
            sources_used.push(SourceKind::WebSearch.label());
        }

        debug!("Turn state: {:?}", TurnState::Combining);
        let combined = combine(&knowledge_text, &search_text, &user_text.to_lowercase());

        debug!("Turn state: {:?}", TurnState::Generating);
        let prompt = self.build_prompt(user_text, &sources_used, &combined);
        let reply = match self.model.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Generation via {} failed: {:?}", self.model.name(), e);
                debug!("Turn state: {:?}", TurnState::Error);
                return APOLOGY_REPLY.to_string();
            }
        };

        debug!("Turn state: {:?}", TurnState::Recording);
        self.memory
            .append(Exchange::new(user_text, reply.clone(), sources_used.join(", ")));
        if self.config.persist_every_turn {
            self.shutdown();
        }

        info!(
            "Turn complete in {}ms: sources=[{}], memory={}",
            start.elapsed().as_millis(),
            sources_used.join(", "),
            self.memory.len()
        );
        debug!("Turn state: {:?}", TurnState::Done);
        reply
    }

    /// Fetch both contexts concurrently; each failure degrades to empty text
    async fn retrieve(&self, decision: &RoutingDecision) -> (String, String) {
        let knowledge = async {
            if decision.use_knowledge_base {
                self.assembler
                    .assemble(&decision.knowledge_query, self.config.token_budget)
                    .await
            } else {
                String::new()
            }
        };
        let web = async {
            if decision.use_web_search {
                self.search_web(&decision.web_query).await
            } else {
                String::new()
            }
        };
        futures::future::join(knowledge, web).await
    }

    async fn search_web(&self, web_query: &str) -> String {
        let location = self.location();
        let query = match location {
            Some(loc) if !web_query.contains(loc) => format!("{} {}", web_query, loc),
            _ => web_query.to_string(),
        };

        match self.web_search.query(&query, location).await {
            Ok(results) => {
                if let Some(ref reason) = results.error {
                    warn!("Web search reported an error: {}. Continuing without web data.", reason);
                }
                results.format_top(self.config.search_top_n)
            }
            Err(e) => {
                warn!("Web search via {} failed: {:?}. Continuing without web data.", self.web_search.name(), e);
                String::new()
            }
        }
    }

    fn location(&self) -> Option<&str> {
        self.context
            .get("location")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    fn build_prompt(&self, user_text: &str, sources_used: &[&str], combined: &str) -> String {
        let sources = if sources_used.is_empty() {
            "General Knowledge".to_string()
        } else {
            sources_used.join(", ")
        };

        let mut recent = String::new();
        for exchange in self.memory.recent(self.config.prompt_history) {
            let agent: String = exchange
                .agent_text
                .chars()
                .take(self.config.history_truncate_chars)
                .collect();
            recent.push_str(&format!("\nUser: {}\nAssistant: {}...", exchange.user_text, agent));
        }
        if recent.is_empty() {
            recent = "This is the start of our conversation.".to_string();
        }

        let context = if self.context.is_empty() {
            "General inquiry".to_string()
        } else {
            serde_json::Value::Object(self.context.clone()).to_string()
        };

        format!(
            "{}\n\nInformation Sources Used: {}\n\n{}\n\nRecent Conversation:\n{}\n\nCurrent Context: {}\n\nUser Question: {}\n\n{}",
            self.config.system_prompt, sources, combined, recent, context, user_text, RESPONSE_INSTRUCTIONS
        )
    }
}
