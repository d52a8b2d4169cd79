//! Router configuration with environment overrides

use crate::error::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_SYSTEM_PROMPT: &str = "You are Agent Mira, an expert real estate AI assistant with deep knowledge of South Florida real estate.

Use the provided knowledge base context to give accurate, specific answers. Be confident and natural in your responses.
Don't mention checking documents or searching - present information as your own expertise.
Focus on being helpful, professional, and conversational.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Probe relevance above which the knowledge base is trusted outright
    pub relevance_threshold: f32,
    /// Max exchanges kept in conversation memory
    pub memory_capacity: usize,
    /// Hits requested per knowledge-base retrieval
    pub retrieval_k: usize,
    /// Hits requested by the classifier probe
    pub probe_k: usize,
    /// Approximate token budget for assembled knowledge-base context
    pub token_budget: usize,
    /// Exchanges folded into each prompt
    pub prompt_history: usize,
    /// Agent reply chars kept per exchange in the prompt
    pub history_truncate_chars: usize,
    /// Results requested from web search
    pub search_results: usize,
    /// Results used when formatting web context
    pub search_top_n: usize,
    pub snapshot_dir: PathBuf,
    pub persist_every_turn: bool,
    pub system_prompt: String,

    pub retriever_url: String,
    pub search_url: String,
    pub search_api_key: Option<String>,
    pub model_url: String,
    pub model_name: String,
    pub model_api_key: Option<String>,
    pub port: u16,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.7,
            memory_capacity: 20,
            retrieval_k: 5,
            probe_k: 1,
            token_budget: 2000,
            prompt_history: 2,
            history_truncate_chars: 200,
            search_results: 5,
            search_top_n: 3,
            snapshot_dir: PathBuf::from("."),
            persist_every_turn: false,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            retriever_url: "http://127.0.0.1:8083".to_string(),
            search_url: "https://google.serper.dev/search".to_string(),
            search_api_key: None,
            model_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model_name: "gemini-2.0-flash".to_string(),
            model_api_key: None,
            port: 8081,
        }
    }
}

impl RouterConfig {
    /// Defaults overridden by `RAGROUTER_*` variables, plus the provider keys
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        override_parsed(&lookup, "RAGROUTER_RELEVANCE_THRESHOLD", &mut cfg.relevance_threshold)?;
        override_parsed(&lookup, "RAGROUTER_MEMORY_CAPACITY", &mut cfg.memory_capacity)?;
        override_parsed(&lookup, "RAGROUTER_RETRIEVAL_K", &mut cfg.retrieval_k)?;
        override_parsed(&lookup, "RAGROUTER_TOKEN_BUDGET", &mut cfg.token_budget)?;
        override_parsed(&lookup, "RAGROUTER_PERSIST_EVERY_TURN", &mut cfg.persist_every_turn)?;
        override_parsed(&lookup, "RAGROUTER_PORT", &mut cfg.port)?;

        if let Some(dir) = lookup("RAGROUTER_SNAPSHOT_DIR") {
            cfg.snapshot_dir = PathBuf::from(dir);
        }
        if let Some(prompt) = lookup("RAGROUTER_SYSTEM_PROMPT") {
            cfg.system_prompt = prompt;
        }
        if let Some(url) = lookup("RETRIEVER_SERVICE_URL") {
            cfg.retriever_url = url;
        }
        if let Some(url) = lookup("SEARCH_SERVICE_URL") {
            cfg.search_url = url;
        }
        if let Some(model) = lookup("RAGROUTER_MODEL") {
            cfg.model_name = model;
        }
        cfg.search_api_key = lookup("SERPER_API_KEY").filter(|k| !k.is_empty());
        cfg.model_api_key = lookup("GEMINI_API_KEY").filter(|k| !k.is_empty());

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            return Err(RouterError::Config("memory_capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(RouterError::Config(format!(
                "relevance_threshold must be within [0, 1], got {}",
                self.relevance_threshold
            )));
        }
        if self.retrieval_k == 0 || self.probe_k == 0 {
            return Err(RouterError::Config("retrieval depth must be at least 1".into()));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| RouterError::Config(format!("{} has invalid value '{}'", key, raw)))?;
    }
    Ok(())
}
