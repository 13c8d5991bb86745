//! Chat-completion client abstraction
//!
//! One wire format serves both upstream calls of the chat pipeline:
//! - grounded retrieval (chat completion with an `azure_search` data source)
//! - plain generation against the fine-tuned model
//!
//! [`AzureOpenAIClient`] talks to the real deployment with an explicit
//! timeout and a bounded exponential-backoff retry policy;
//! [`MockCompletion`] replays scripted replies for tests and local runs.

use crate::config::{OpenAIConfig, RetryConfig};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Message author as understood by the chat-completions API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Body of a chat-completions request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub data_sources: Vec<DataSource>,
}

/// Retrieval backend attached to a grounded completion
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum DataSource {
    AzureSearch(AzureSearchParameters),
}

#[derive(Debug, Clone, Serialize)]
pub struct AzureSearchParameters {
    pub endpoint: String,
    pub semantic_configuration: String,
    pub query_type: String,
    pub strictness: u8,
    pub top_n_documents: u32,
    pub key: String,
    #[serde(rename = "indexName")]
    pub index_name: String,
}

/// `choices[0].message.content` of a completion response
pub fn message_content(response: &Value) -> Option<&str> {
    response.pointer("/choices/0/message/content")?.as_str()
}

/// `choices[0].message.context.citations` of a grounded completion response
pub fn message_citations(response: &Value) -> Option<&Vec<Value>> {
    response
        .pointer("/choices/0/message/context/citations")?
        .as_array()
}

/// Trait for chat-completion backends
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send a request and return the decoded JSON body of a successful response
    async fn complete(&self, request: &ChatRequest) -> Result<Value>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Azure OpenAI chat-completions client
pub struct AzureOpenAIClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl AzureOpenAIClient {
    /// Create a new client from configuration
    pub fn new(config: &OpenAIConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e)
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout(),
            retry: config.retry.clone(),
        })
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<Value> {
        let response = self.client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout {
                        service: "openai".to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: "openai".to_string(),
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAIClient {
    async fn complete(&self, request: &ChatRequest) -> Result<Value> {
        if !self.retry.enabled {
            return self.send_once(request).await;
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.retry.initial_interval_ms))
            .with_max_interval(Duration::from_millis(self.retry.max_interval_ms))
            .with_max_elapsed_time(Some(Duration::from_millis(self.retry.max_elapsed_ms)))
            .build();

        backoff::future::retry_notify(
            policy,
            move || async move {
                self.send_once(request).await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
            |err: AppError, wait: Duration| {
                tracing::warn!(
                    error = %err,
                    retry_in_ms = wait.as_millis() as u64,
                    "Completion request failed, retrying"
                );
            },
        )
        .await
    }

    fn name(&self) -> &str {
        "azure-openai"
    }
}

/// Scripted reply for [`MockCompletion`]
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful response body
    Json(Value),
    /// Upstream answered with this status
    Status(u16),
}

/// Mock completion backend for testing and offline development
///
/// Replays scripted replies in order; once the script is exhausted it
/// answers every request with a canned completion echoing the last user
/// message.
#[derive(Default)]
pub struct MockCompletion {
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Completion body with the given content and no citations
    pub fn reply(content: &str) -> Value {
        json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content }
            }]
        })
    }

    fn echo(request: &ChatRequest) -> Value {
        let question = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Self::reply(&format!("[mock] {}", question))
    }
}

#[async_trait]
impl CompletionClient for MockCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(MockReply::Json(body)) => Ok(body),
            Some(MockReply::Status(status)) => Err(AppError::Upstream {
                service: "mock".to_string(),
                status,
                message: "scripted failure".to_string(),
            }),
            None => Ok(Self::echo(request)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Create a completion client based on configuration
///
/// An api key of `mock` selects the offline mock backend.
pub fn create_completion_client(config: &OpenAIConfig) -> Result<Arc<dyn CompletionClient>> {
    if config.api_key == "mock" {
        tracing::warn!("Using mock completion backend");
        return Ok(Arc::new(MockCompletion::new()));
    }
    Ok(Arc::new(AzureOpenAIClient::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user("두통")],
            model: None,
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 800,
            data_sources: vec![],
        }
    }

    fn config(endpoint: String, retry: bool) -> OpenAIConfig {
        OpenAIConfig {
            endpoint,
            api_key: "test-key".to_string(),
            model: "ft".to_string(),
            timeout_secs: 5,
            retry: RetryConfig {
                enabled: retry,
                initial_interval_ms: 10,
                max_interval_ms: 20,
                max_elapsed_ms: 2_000,
            },
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/chat/completions", addr)
    }

    #[test]
    fn test_data_source_wire_shape() {
        let mut req = request();
        req.data_sources.push(DataSource::AzureSearch(AzureSearchParameters {
            endpoint: "https://search".into(),
            semantic_configuration: "sem".into(),
            query_type: "semantic".into(),
            strictness: 1,
            top_n_documents: 10,
            key: "k".into(),
            index_name: "idx".into(),
        }));

        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(body["data_sources"][0]["type"], "azure_search");
        assert_eq!(body["data_sources"][0]["parameters"]["indexName"], "idx");
        assert_eq!(body["data_sources"][0]["parameters"]["query_type"], "semantic");
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("model").is_none());
    }

    #[test]
    fn test_response_accessors() {
        let body = json!({
            "choices": [{ "message": {
                "content": "답변",
                "context": { "citations": [{ "content": "x" }] }
            }}]
        });
        assert_eq!(message_content(&body), Some("답변"));
        assert_eq!(message_citations(&body).map(|c| c.len()), Some(1));
        assert_eq!(message_content(&json!({})), None);
    }

    #[tokio::test]
    async fn test_sends_api_key_and_decodes_body() {
        let app = Router::new().route(
            "/chat/completions",
            post(|headers: axum::http::HeaderMap, Json(body): Json<Value>| async move {
                let key = headers.get("api-key").and_then(|v| v.to_str().ok()).unwrap_or("");
                let echoed = body["messages"][0]["content"].as_str().unwrap_or("").to_string();
                Json(MockCompletion::reply(&format!("{}:{}", key, echoed)))
            }),
        );
        let client = AzureOpenAIClient::new(&config(serve(app).await, false)).unwrap();

        let body = client.complete(&request()).await.unwrap();
        assert_eq!(message_content(&body), Some("test-key:두통"));
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))).into_response()
                    } else {
                        Json(MockCompletion::reply("ok")).into_response()
                    }
                }
            }),
        );
        let client = AzureOpenAIClient::new(&config(serve(app).await, true)).unwrap();

        let body = client.complete(&request()).await.unwrap();
        assert_eq!(message_content(&body), Some("ok"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }
            }),
        );
        let client = AzureOpenAIClient::new(&config(serve(app).await, true)).unwrap();

        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 401, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mock_script_then_echo() {
        let mock = MockCompletion::with_script([MockReply::Status(500)]);
        assert!(mock.complete(&request()).await.is_err());

        let body = mock.complete(&request()).await.unwrap();
        assert_eq!(message_content(&body), Some("[mock] 두통"));
        assert_eq!(mock.requests().len(), 2);
    }
}
