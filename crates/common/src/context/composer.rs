//! Response Composer - Final prompt assembly and generation
//!
//! Message order sent to the fine-tuned model:
//! 1. persona
//! 2. retrieved documents with the question
//! 3. history window
//! 4. the question with the tone instruction

use super::retrieval::SearchResult;
use crate::llm::{message_content, ChatMessage, ChatRequest, CompletionClient};
use crate::metrics;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

/// Reply used whenever no usable answer came back
pub const FALLBACK_RESPONSE: &str = "응답을 생성할 수 없습니다.";

pub const PATIENT_PERSONA: &str =
    "당신은 환자를 위한 의료 챗봇입니다. 사용자의 질문에 대해 RAG 검색된 문서를 반드시 활용하여 답변을 생성하세요.";

const NO_DOCUMENTS: &str = "검색된 문서가 없습니다.";
const UNTITLED: &str = "문서 제목 없음";
const NO_CONTENT: &str = "문서 내용 없음";

const TEMPERATURE: f64 = 0.0;
const TOP_P: f64 = 0.6;
const MAX_TOKENS: u32 = 600;

/// Render retrieved documents as `[docN] title\ncontent` blocks
pub fn render_documents(result: Option<&SearchResult>) -> String {
    match result {
        Some(result) if !result.is_empty() => result
            .documents
            .iter()
            .map(|doc| {
                format!(
                    "[{}] {}\n{}",
                    doc.id,
                    doc.title.as_deref().unwrap_or(UNTITLED),
                    doc.content.as_deref().unwrap_or(NO_CONTENT)
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => NO_DOCUMENTS.to_string(),
    }
}

/// Text of a completion response, or the fallback
pub fn reply_text(response: Option<&Value>) -> String {
    response
        .and_then(message_content)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_RESPONSE.to_string())
}

/// Builds and sends the generation request
#[derive(Clone)]
pub struct ResponseComposer {
    client: Arc<dyn CompletionClient>,
    model: String,
}

impl ResponseComposer {
    pub fn new(client: Arc<dyn CompletionClient>, model: impl Into<String>) -> Self {
        Self { client, model: model.into() }
    }

    /// Assemble the generation request
    pub fn build_request(
        &self,
        prompt: &str,
        history: Vec<ChatMessage>,
        retrieved: Option<&SearchResult>,
    ) -> ChatRequest {
        let docs = render_documents(retrieved);

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(PATIENT_PERSONA));
        messages.push(ChatMessage::system(format!(
            "🔎 다음은 검색된 문서들입니다. \n{}\n\n사용자 질문: {}",
            docs, prompt
        )));
        messages.extend(history);
        messages.push(ChatMessage::user(format!(
            "{}\n\n친절한 의사 말투로 설명해 주세요.",
            prompt
        )));

        ChatRequest {
            messages,
            model: Some(self.model.clone()),
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
            data_sources: Vec::new(),
        }
    }

    /// Generate an answer; `None` when the model could not be reached
    pub async fn compose(
        &self,
        prompt: &str,
        history: Vec<ChatMessage>,
        retrieved: Option<&SearchResult>,
    ) -> Option<Value> {
        let request = self.build_request(prompt, history, retrieved);
        let start = Instant::now();

        match self.client.complete(&request).await {
            Ok(body) => {
                metrics::record_upstream(start.elapsed().as_secs_f64(), "generation", true);
                Some(body)
            }
            Err(e) => {
                metrics::record_upstream(start.elapsed().as_secs_f64(), "generation", false);
                tracing::warn!(
                    backend = self.client.name(),
                    error = %e,
                    "Generation failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::retrieval::RetrievedDocument;
    use crate::llm::{MockCompletion, MockReply, Role};
    use serde_json::json;

    fn docs() -> SearchResult {
        SearchResult {
            documents: vec![
                RetrievedDocument {
                    id: "doc1".into(),
                    title: Some("두통".into()),
                    content: Some("긴장성 두통".into()),
                },
                RetrievedDocument { id: "doc2".into(), title: None, content: None },
            ],
        }
    }

    #[test]
    fn test_render_documents() {
        assert_eq!(
            render_documents(Some(&docs())),
            "[doc1] 두통\n긴장성 두통\n\n[doc2] 문서 제목 없음\n문서 내용 없음"
        );
        assert_eq!(render_documents(None), "검색된 문서가 없습니다.");
        assert_eq!(render_documents(Some(&SearchResult::default())), "검색된 문서가 없습니다.");
    }

    #[test]
    fn test_message_order() {
        let composer = ResponseComposer::new(Arc::new(MockCompletion::new()), "ft-model");
        let history = vec![
            ChatMessage::new(Role::User, "q0"),
            ChatMessage::new(Role::Assistant, "a0"),
        ];
        let request = composer.build_request("두통 원인", history, None);

        assert_eq!(request.messages.len(), 5);
        assert_eq!(request.messages[0], ChatMessage::system(PATIENT_PERSONA));
        assert_eq!(
            request.messages[1].content,
            "🔎 다음은 검색된 문서들입니다. \n검색된 문서가 없습니다.\n\n사용자 질문: 두통 원인"
        );
        assert_eq!(request.messages[2].content, "q0");
        assert_eq!(request.messages[3].content, "a0");
        assert_eq!(
            request.messages[4],
            ChatMessage::user("두통 원인\n\n친절한 의사 말투로 설명해 주세요.")
        );
        assert_eq!(request.model.as_deref(), Some("ft-model"));
        assert_eq!(request.max_tokens, 600);
        assert!(request.data_sources.is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_yields_fallback() {
        let mock = Arc::new(MockCompletion::with_script([MockReply::Status(503)]));
        let composer = ResponseComposer::new(mock, "ft-model");

        let response = composer.compose("두통", vec![], None).await;
        assert!(response.is_none());
        assert_eq!(reply_text(response.as_ref()), FALLBACK_RESPONSE);
    }

    #[test]
    fn test_reply_text_malformed_body() {
        assert_eq!(reply_text(Some(&json!({ "choices": [] }))), FALLBACK_RESPONSE);
        assert_eq!(reply_text(Some(&MockCompletion::reply("답변"))), "답변");
    }
}
