//! Elasticsearch search index over the REST API.
//!
//! Writes use `refresh=true` so a document is searchable as soon as the call
//! returns. A 404 on get or delete means the document is absent.

use crate::SearchIndex;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use wellness_core::{
    ClientId, SearchDocument, StorageError, StoreKind, WellnessError, WellnessResult,
    SEARCH_INDEX_NAME, SEARCH_TEXT_FIELDS,
};

/// Maximum number of hits returned by one search.
const MAX_SEARCH_HITS: usize = 100;

/// Elasticsearch connection settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub url: String,
    pub index: String,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: SEARCH_INDEX_NAME.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl SearchConfig {
    /// Environment variables: `WELLNESS_ELASTICSEARCH_URL`,
    /// `WELLNESS_SEARCH_INDEX`, `WELLNESS_SEARCH_TIMEOUT_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("WELLNESS_ELASTICSEARCH_URL").unwrap_or(defaults.url),
            index: std::env::var("WELLNESS_SEARCH_INDEX").unwrap_or(defaults.index),
            timeout: std::env::var("WELLNESS_SEARCH_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: SearchDocument,
}

/// Search index backed by an Elasticsearch cluster.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    base_url: String,
    index: String,
}

fn unavailable(reason: impl Into<String>) -> WellnessError {
    StorageError::Unavailable {
        store: StoreKind::SearchIndex,
        reason: reason.into(),
    }
    .into()
}

fn failed(reason: impl Into<String>) -> WellnessError {
    StorageError::OperationFailed {
        store: StoreKind::SearchIndex,
        reason: reason.into(),
    }
    .into()
}

fn transport_error(err: reqwest::Error) -> WellnessError {
    if err.is_connect() || err.is_timeout() {
        unavailable(format!("HTTP request failed: {}", err))
    } else {
        failed(format!("HTTP request failed: {}", err))
    }
}

/// Build the `_search` body for a free-text query.
fn search_body(query: &str) -> serde_json::Value {
    json!({
        "size": MAX_SEARCH_HITS,
        "query": {
            "multi_match": {
                "query": query,
                "fields": SEARCH_TEXT_FIELDS,
                "type": "cross_fields",
                "operator": "and"
            }
        }
    })
}

impl ElasticsearchIndex {
    pub fn new(config: &SearchConfig) -> WellnessResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| failed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    fn doc_url(&self, id: ClientId) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, id)
    }

    async fn error_from(response: Response) -> WellnessError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let reason = format!("Elasticsearch returned {}: {}", status, body);
        if status.is_server_error() {
            unavailable(reason)
        } else {
            failed(reason)
        }
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn index(&self, id: ClientId, doc: &SearchDocument) -> WellnessResult<()> {
        let response = self
            .client
            .put(self.doc_url(id))
            .query(&[("refresh", "true")])
            .json(doc)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        tracing::debug!(client_id = id, index = %self.index, "document indexed");
        Ok(())
    }

    async fn get(&self, id: ClientId) -> WellnessResult<Option<SearchDocument>> {
        let response = self
            .client
            .get(self.doc_url(id))
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: GetResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse response: {}", e)))?;
        Ok(body.source.filter(|_| body.found))
    }

    async fn search(&self, query: &str) -> WellnessResult<Vec<SearchDocument>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/{}/_search", self.base_url, self.index))
            .json(&search_body(query))
            .send()
            .await
            .map_err(transport_error)?;

        // Nothing has been indexed yet.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse response: {}", e)))?;
        Ok(body.hits.hits.into_iter().map(|hit| hit.source).collect())
    }

    async fn remove(&self, id: ClientId) -> WellnessResult<bool> {
        let response = self
            .client
            .delete(self.doc_url(id))
            .query(&[("refresh", "true")])
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::error_from(response).await),
        }
    }

    async fn ping(&self) -> WellnessResult<()> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}
