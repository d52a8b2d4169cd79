/// HTTP client for the Serper web search API
use crate::collaborators::WebSearch;
use crate::types::SearchResults;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct SerperSearch {
    endpoint: String,
    api_key: String,
    num_results: usize,
    client: reqwest::Client,
}

impl SerperSearch {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, num_results: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            num_results,
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, text: &str, location: Option<&str>) -> Result<SearchResults> {
        let payload = SerperRequest {
            q: text,
            num: self.num_results,
            location,
        };

        debug!("Searching web for '{}' (location={:?})", text, location);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error {}: {}", status, body);
        }

        let results: SearchResults = response.json().await?;
        debug!("Retrieved {} organic results", results.organic.len());

        Ok(results)
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    fn name(&self) -> &'static str {
        "serper"
    }

    /// Transport and API failures come back in the `error` field
    async fn query(&self, text: &str, location: Option<&str>) -> Result<SearchResults> {
        match self.fetch(text, location).await {
            Ok(results) => Ok(results),
            Err(e) => Ok(SearchResults::failed(e.to_string())),
        }
    }
}
