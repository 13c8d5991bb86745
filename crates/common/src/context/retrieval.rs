//! Retrieval Client - Grounded completion requests against the search index
//!
//! Every request carries an `azure_search` data source built from
//! [`SearchConfig`]. Failures are not fatal: callers receive `None` and
//! continue without retrieved context.

use crate::config::SearchConfig;
use crate::llm::{
    message_citations, AzureSearchParameters, ChatMessage, ChatRequest, CompletionClient,
    DataSource,
};
use crate::metrics;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Sampling and ranking parameters of a grounded request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub strictness: u8,
    pub top_n_documents: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl RetrievalParams {
    /// Broad document search for the patient chatbot
    pub const SEARCH: Self = Self {
        strictness: 1,
        top_n_documents: 10,
        temperature: 0.0,
        top_p: 1.0,
        max_tokens: 800,
    };

    /// Strict grounded answer for the clinician assistant
    pub const GROUNDED_ANSWER: Self = Self {
        strictness: 5,
        top_n_documents: 5,
        temperature: 0.1,
        top_p: 0.6,
        max_tokens: 800,
    };
}

/// A retrieved document, numbered from `doc1` in upstream order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Ordered documents extracted from a retrieval response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub documents: Vec<RetrievedDocument>,
}

impl SearchResult {
    /// Documents from a search-index shaped body (`value`) or, failing
    /// that, from a chat-with-data body (`choices[0].message.context.citations`).
    pub fn from_response(response: &Value) -> Self {
        let items = response
            .get("value")
            .and_then(Value::as_array)
            .or_else(|| message_citations(response));

        let documents = items
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| RetrievedDocument {
                        id: format!("doc{}", idx + 1),
                        title: item.get("title").and_then(Value::as_str).map(str::to_string),
                        content: item.get("content").and_then(Value::as_str).map(str::to_string),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self { documents }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }
}

/// Client for the hybrid search + generation endpoint
#[derive(Clone)]
pub struct RetrievalClient {
    client: Arc<dyn CompletionClient>,
    search: SearchConfig,
}

impl RetrievalClient {
    pub fn new(client: Arc<dyn CompletionClient>, search: SearchConfig) -> Self {
        Self { client, search }
    }

    /// Build a grounded request; the only place the data source is assembled
    pub fn build_request(&self, messages: Vec<ChatMessage>, params: RetrievalParams) -> ChatRequest {
        ChatRequest {
            messages,
            model: None,
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            data_sources: vec![DataSource::AzureSearch(AzureSearchParameters {
                endpoint: self.search.endpoint.clone(),
                semantic_configuration: self.search.semantic_configuration.clone(),
                query_type: "semantic".to_string(),
                strictness: params.strictness,
                top_n_documents: params.top_n_documents,
                key: self.search.key.clone(),
                index_name: self.search.index.clone(),
            })],
        }
    }

    /// Search with the refined query as the sole user message
    pub async fn search(&self, query: &str) -> Option<Value> {
        self.retrieve(vec![ChatMessage::user(query)], RetrievalParams::SEARCH)
            .await
    }

    /// Send a grounded request; `None` on any upstream failure
    pub async fn retrieve(&self, messages: Vec<ChatMessage>, params: RetrievalParams) -> Option<Value> {
        let request = self.build_request(messages, params);
        let start = Instant::now();

        match self.client.complete(&request).await {
            Ok(body) => {
                metrics::record_upstream(start.elapsed().as_secs_f64(), "retrieval", true);
                tracing::debug!(
                    backend = self.client.name(),
                    documents = SearchResult::from_response(&body).len(),
                    "Retrieval completed"
                );
                Some(body)
            }
            Err(e) => {
                metrics::record_upstream(start.elapsed().as_secs_f64(), "retrieval", false);
                tracing::warn!(
                    backend = self.client.name(),
                    error = %e,
                    "Retrieval failed, continuing without documents"
                );
                None
            }
        }
    }
}
