//! Token-budgeted knowledge-base context assembly

use crate::collaborators::Retriever;
use crate::types::RetrievalHit;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_RETRIEVAL_K: usize = 5;

/// Separator placed between hits
pub const HIT_SEPARATOR: &str = "\n\n---\n\n";

/// Approximate token count: 1 token per 4 bytes, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    tokens_for_len(text.len())
}

fn tokens_for_len(len: usize) -> usize {
    (len + 3) / 4
}

/// Wraps a `Retriever` and packs its hits into a bounded text block
pub struct ContextAssembler {
    retriever: Arc<dyn Retriever>,
    k: usize,
}

impl ContextAssembler {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self::with_k(retriever, DEFAULT_RETRIEVAL_K)
    }

    pub fn with_k(retriever: Arc<dyn Retriever>, k: usize) -> Self {
        Self { retriever, k }
    }

    /// Ranked hits for `query`; retriever failures yield no hits
    pub async fn retrieve(&self, query: &str) -> Vec<RetrievalHit> {
        match self.retriever.search(query, self.k).await {
            Ok(chunks) => chunks.into_iter().map(RetrievalHit::from).collect(),
            Err(e) => {
                warn!("Retriever {} failed: {:?}. Continuing without knowledge base.", self.retriever.name(), e);
                Vec::new()
            }
        }
    }

    /// Assembled context for `query`, empty when nothing relevant fits
    pub async fn assemble(&self, query: &str, token_budget: usize) -> String {
        let hits = self.retrieve(query).await;
        let context = pack_hits(&hits, token_budget);
        debug!(
            "Assembled {} of {} hits into ~{} tokens (budget {})",
            context.matches("[From ").count(),
            hits.len(),
            estimate_tokens(&context),
            token_budget
        );
        context
    }
}

/// Greedily append tagged hits in order; stop at the first hit that would
/// push the whole block over budget. Hits are never split.
pub fn pack_hits(hits: &[RetrievalHit], token_budget: usize) -> String {
    let mut out = String::new();

    for hit in hits {
        let block = format!("[From {}]\n{}", hit.source_label, hit.text);
        let separator = if out.is_empty() { "" } else { HIT_SEPARATOR };

        let projected = out.len() + separator.len() + block.len();
        if tokens_for_len(projected) > token_budget {
            break;
        }
        out.push_str(separator);
        out.push_str(&block);
    }

    out
}
