//! Query classification: decides which sources a question needs.
//!
//! Three ordered keyword tables drive the decision:
//! - `STABLE_TOPICS`: time-invariant topics, answered from the knowledge base
//! - `DYNAMIC_TOPICS`: topics needing current data, answered from web search
//! - `HYBRID_TOPICS`: topics that layer extra flags on top of the other two
//!
//! Matching is lowercase substring containment. Within a table the first
//! matching category wins and the rest of the table is skipped.

use crate::collaborators::Retriever;
use crate::types::{similarity, RoutingDecision};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named keyword category
#[derive(Debug, Clone, Copy)]
pub struct TopicCategory {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    /// Appended to the web query when this category fires
    pub search_suffix: Option<&'static str>,
}

impl TopicCategory {
    pub fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|kw| lowered.contains(kw))
    }
}

/// Policy applied when a hybrid category matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridRule {
    /// Both sources, but only alongside a dynamic hit
    Neighborhood,
    /// Knowledge base always; web search unless a stable topic fired
    Comparison,
    /// Both sources unconditionally
    Investment,
    /// Knowledge base (plus web on a dynamic hit), only when a neighborhood is named
    Comprehensive,
}

#[derive(Debug, Clone, Copy)]
pub struct HybridCategory {
    pub rule: HybridRule,
    pub topic: TopicCategory,
}

const fn topic(name: &'static str, keywords: &'static [&'static str]) -> TopicCategory {
    TopicCategory {
        name,
        keywords,
        search_suffix: None,
    }
}

pub static STABLE_TOPICS: &[TopicCategory] = &[
    topic("process", &["buying process", "selling process", "closing process", "mortgage process"]),
    topic("definitions", &["what is", "explain", "define", "how does", "how do"]),
    topic("historical", &["history", "established", "founded", "originally"]),
    topic("features", &["amenities", "characteristics", "features", "lifestyle"]),
    topic("geography", &["location", "boundaries", "distance", "area"]),
];

pub static DYNAMIC_TOPICS: &[TopicCategory] = &[
    TopicCategory {
        name: "market",
        keywords: &["price", "rates", "market", "trends", "inventory", "sales"],
        search_suffix: Some("2024 real estate Miami"),
    },
    topic("temporal", &["current", "latest", "recent", "today", "now", "2024", "2025"]),
    topic("statistics", &["average", "median", "statistics", "data", "numbers"]),
    TopicCategory {
        name: "availability",
        keywords: &["available", "for sale", "listings", "on market"],
        search_suffix: Some("MLS listings"),
    },
    topic("news", &["news", "announced", "update", "happening", "events"]),
];

/// Hybrid categories, scanned in order.
///
/// The scan stops at the first category whose rule applies, so at most one
/// hybrid clause reaches the rationale. "Compare Brickell vs Aventura for
/// investment" skips neighborhoods (no dynamic hit), fires comparison, and
/// never reaches investment. Both flags still end up set because no stable
/// topic matched.
pub static HYBRID_TOPICS: &[HybridCategory] = &[
    HybridCategory {
        rule: HybridRule::Neighborhood,
        topic: topic(
            "neighborhoods",
            &["coral gables", "brickell", "wynwood", "aventura", "coconut grove", "south beach"],
        ),
    },
    HybridCategory {
        rule: HybridRule::Comparison,
        topic: topic("comparison", &["compare", "versus", "vs", "better", "difference"]),
    },
    HybridCategory {
        rule: HybridRule::Investment,
        topic: topic("investment", &["roi", "invest", "rental", "return", "yield"]),
    },
    HybridCategory {
        rule: HybridRule::Comprehensive,
        topic: topic("comprehensive", &["tell me about", "overview", "guide", "everything"]),
    },
];

/// Routes a user question to the knowledge base, the web, or both
pub struct QueryClassifier {
    probe: Option<Arc<dyn Retriever>>,
    relevance_threshold: f32,
    probe_k: usize,
}

impl QueryClassifier {
    /// Classifier without a probe capability
    pub fn new(relevance_threshold: f32) -> Self {
        Self {
            probe: None,
            relevance_threshold,
            probe_k: 1,
        }
    }

    /// Classifier that probes the knowledge base when no keyword rule fires
    pub fn with_probe(probe: Arc<dyn Retriever>, relevance_threshold: f32, probe_k: usize) -> Self {
        Self {
            probe: Some(probe),
            relevance_threshold,
            probe_k: probe_k.max(1),
        }
    }

    pub async fn classify(&self, query: &str) -> RoutingDecision {
        let lowered = query.to_lowercase();
        let mut decision = RoutingDecision::new(query);

        let stable_match = apply_stable(&lowered, &mut decision);
        let dynamic_match = apply_dynamic(query, &lowered, &mut decision);
        apply_hybrid(&lowered, stable_match, dynamic_match, &mut decision);

        if !decision.uses_any_source() {
            self.apply_default(query, &mut decision).await;
        }

        let rationale = decision.rationale.trim_end().to_string();
        decision.rationale = rationale;

        info!(
            "Routing: kb={} web={} ({})",
            decision.use_knowledge_base, decision.use_web_search, decision.rationale
        );
        decision
    }

    async fn apply_default(&self, query: &str, decision: &mut RoutingDecision) {
        decision.use_knowledge_base = true;

        let probe = match &self.probe {
            Some(probe) => probe,
            None => {
                decision.note("Default: General query, checking knowledge base.");
                return;
            }
        };

        let top_relevance = match probe.probe(query, self.probe_k).await {
            Ok(hits) => hits.first().map(|hit| similarity(hit.distance)),
            Err(e) => {
                warn!("Probe via {} failed: {:?}", probe.name(), e);
                None
            }
        };
        debug!("Probe top relevance: {:?}", top_relevance);

        match top_relevance {
            Some(relevance) if relevance > self.relevance_threshold => {
                decision.note("RAG: High relevance content found.");
            }
            _ => decision.note("Default: Checking knowledge base first."),
        }
    }
}

fn apply_stable(lowered: &str, decision: &mut RoutingDecision) -> bool {
    match STABLE_TOPICS.iter().find(|cat| cat.matches(lowered)) {
        Some(cat) => {
            decision.use_knowledge_base = true;
            decision.note(&format!("RAG: {} information is stable.", cat.name));
            true
        }
        None => false,
    }
}

fn apply_dynamic(query: &str, lowered: &str, decision: &mut RoutingDecision) -> bool {
    match DYNAMIC_TOPICS.iter().find(|cat| cat.matches(lowered)) {
        Some(cat) => {
            decision.use_web_search = true;
            decision.note(&format!("Search: {} requires current data.", cat.name));
            if let Some(suffix) = cat.search_suffix {
                decision.web_query = format!("{} {}", query, suffix);
            }
            true
        }
        None => false,
    }
}

fn apply_hybrid(lowered: &str, stable_match: bool, dynamic_match: bool, decision: &mut RoutingDecision) {
    let names_neighborhood = HYBRID_TOPICS
        .iter()
        .filter(|cat| cat.rule == HybridRule::Neighborhood)
        .any(|cat| cat.topic.matches(lowered));

    for cat in HYBRID_TOPICS {
        if !cat.topic.matches(lowered) {
            continue;
        }
        // A matched category whose condition is unmet does not end the scan
        match cat.rule {
            HybridRule::Neighborhood if dynamic_match => {
                decision.use_knowledge_base = true;
                decision.use_web_search = true;
                decision.note("Both: Neighborhood details + current market.");
            }
            HybridRule::Comparison => {
                decision.use_knowledge_base = true;
                if !stable_match {
                    decision.use_web_search = true;
                }
                decision.note("Both: Static features + current differences.");
            }
            HybridRule::Investment => {
                decision.use_knowledge_base = true;
                decision.use_web_search = true;
                decision.note("Both: Investment strategies + current yields.");
            }
            HybridRule::Comprehensive if names_neighborhood => {
                decision.use_knowledge_base = true;
                if dynamic_match {
                    decision.use_web_search = true;
                }
                decision.note("Comprehensive neighborhood information requested.");
            }
            _ => continue,
        }
        break;
    }
}
