//! HTTP retriever that calls an external semantic index service

use crate::collaborators::Retriever;
use crate::types::{ChunkMetadata, ScoredChunk};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request to the index service
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

/// Response from the index service
#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchCandidate>,
    #[serde(default)]
    query_time_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SearchCandidate {
    text: String,
    distance: f32,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    metadata: Option<ChunkMetadata>,
}

impl From<SearchCandidate> for ScoredChunk {
    fn from(candidate: SearchCandidate) -> Self {
        let mut metadata = candidate.metadata.unwrap_or_default();
        if metadata.source.is_none() {
            metadata.source = candidate.source;
        }
        ScoredChunk {
            text: candidate.text,
            metadata,
            distance: candidate.distance,
        }
    }
}

pub struct HttpRetriever {
    service_url: String,
    client: reqwest::Client,
}

impl HttpRetriever {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.service_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &'static str {
        "http_semantic"
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/search", self.service_url);
        let response = self
            .client
            .post(&url)
            .json(&SearchRequest { query, k })
            .send()
            .await
            .context("Failed to call semantic index service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Semantic index error ({}): {}", status, error_text);
        }

        let search_response: SearchResponse = response
            .json()
            .await
            .context("Failed to parse semantic index response")?;

        tracing::debug!(
            "Semantic search: {} hits in {:.1}ms",
            search_response.results.len(),
            search_response.query_time_ms.unwrap_or_default()
        );

        Ok(search_response.results.into_iter().map(ScoredChunk::from).collect())
    }
}
