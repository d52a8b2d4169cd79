//! Source-aware merging of knowledge-base and web context

pub const NO_INFORMATION: &str = "No relevant information found.";

/// Header framing chosen from the topic hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Market,
    Neighborhood,
    Generic,
}

impl Framing {
    pub fn for_topic(topic_hint: &str) -> Self {
        if topic_hint.contains("market") || topic_hint.contains("price") {
            Framing::Market
        } else if topic_hint.contains("neighborhood") {
            Framing::Neighborhood
        } else {
            Framing::Generic
        }
    }

    /// (title, knowledge header, web header)
    fn headers(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Framing::Market => (
                "Market Analysis:",
                "Historical Context and Fundamentals:",
                "Current Market Conditions:",
            ),
            Framing::Neighborhood => (
                "Comprehensive Information:",
                "Neighborhood Characteristics and Features:",
                "Recent Updates and Current Market:",
            ),
            Framing::Generic => (
                "Comprehensive Information:",
                "From Knowledge Base:",
                "Current Information:",
            ),
        }
    }
}

/// Merge both contexts into one prompt-ready block.
///
/// Empty inputs collapse the framing: both empty gives `NO_INFORMATION`,
/// one empty gives a single-source block.
pub fn combine(knowledge_text: &str, search_text: &str, topic_hint: &str) -> String {
    match (knowledge_text.is_empty(), search_text.is_empty()) {
        (true, true) => NO_INFORMATION.to_string(),
        (false, true) => format!("Based on knowledge base:\n{}", knowledge_text),
        (true, false) => format!("Current information:\n{}", search_text),
        (false, false) => {
            let (title, kb_header, web_header) = Framing::for_topic(topic_hint).headers();
            format!(
                "{}\n\n{}\n{}\n\n{}\n{}",
                title, kb_header, knowledge_text, web_header, search_text
            )
        }
    }
}
