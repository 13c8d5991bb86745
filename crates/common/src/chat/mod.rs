//! Chat pipeline
//!
//! Wires the shaping stages into one request/response flow per
//! [`ChatVariant`]:
//!
//! - patient: redact → refine → window → search → compose → citations
//! - clinician: redact → detect → translate → window → grounded answer → citations
//!
//! Every stage is a pure transform over values; upstream failures degrade
//! to "no documents" or the fallback reply and never fail the turn.

use crate::config::{AppConfig, ChatVariant};
use crate::context::{
    create_translator, reply_text, translate_or_original, CitationExtractor, HistoryRoles,
    HistoryWindower, LanguageDetector, QueryRefiner, QueryRefinerConfig, Redactor,
    ResponseComposer, RetrievalClient, RetrievalParams, SearchResult, Translation, Translator,
    Turn, FALLBACK_RESPONSE,
};
use crate::errors::{AppError, Result};
use crate::llm::{create_completion_client, message_content, ChatMessage, CompletionClient};
use crate::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// One incoming chat turn
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatTurnRequest {
    pub prompt: String,

    /// Prior turns, oldest first, as re-submitted by the caller
    #[serde(default)]
    pub histories: Vec<Turn>,
}

/// Reply to a chat turn
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ChatReply {
    /// Input history plus this turn
    pub histories: Vec<Turn>,

    pub response: String,

    /// Rendered citation markup, empty when there is none
    pub citations: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Persona of the clinician assistant, answering in `language`
pub fn clinician_persona(language: &str) -> String {
    format!(
        "You are an assistant for medical professionals. Always answer in {}. If you cannot, switch to English. When asked about a disease, search the 'disease' section of the provided data. If found, answer based on the document.",
        language
    )
}

/// The assembled pipeline; cheap to share behind an `Arc`
pub struct ChatPipeline {
    variant: ChatVariant,
    redactor: Redactor,
    refiner: QueryRefiner,
    detector: LanguageDetector,
    translator: Option<Arc<dyn Translator>>,
    windower: HistoryWindower,
    retrieval: RetrievalClient,
    composer: ResponseComposer,
    citations: CitationExtractor,
}

impl ChatPipeline {
    /// Build from configuration with explicit upstream clients
    pub fn new(
        config: &AppConfig,
        client: Arc<dyn CompletionClient>,
        translator: Option<Arc<dyn Translator>>,
    ) -> Result<Self> {
        let variant = config.chat.variant;
        let roles = match variant {
            ChatVariant::Patient => HistoryRoles::CONVERSATIONAL,
            ChatVariant::Clinician => HistoryRoles::CONTEXT_ONLY,
        };

        let refiner = QueryRefiner::new(QueryRefinerConfig::default()).map_err(|e| {
            AppError::Configuration { message: format!("invalid filler pattern: {}", e) }
        })?;
        let citations = CitationExtractor::new(config.chat.citation_mode).map_err(|e| {
            AppError::Configuration { message: format!("invalid citation pattern: {}", e) }
        })?;

        Ok(Self {
            variant,
            redactor: Redactor::korean(),
            refiner,
            detector: LanguageDetector::default(),
            translator,
            windower: HistoryWindower::new(config.chat.history_window, roles),
            retrieval: RetrievalClient::new(client.clone(), config.search.clone()),
            composer: ResponseComposer::new(client, config.openai.model.clone()),
            citations,
        })
    }

    /// Build with the clients the configuration selects
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = create_completion_client(&config.openai)?;
        let translator = match config.chat.variant {
            ChatVariant::Clinician => create_translator(&config.translation)?,
            ChatVariant::Patient => None,
        };
        Self::new(config, client, translator)
    }

    pub fn variant(&self) -> ChatVariant {
        self.variant
    }

    /// Answer one turn
    pub async fn respond(&self, request: ChatTurnRequest) -> ChatReply {
        let start = Instant::now();
        let ChatTurnRequest { prompt, mut histories } = request;

        let redaction = self.redactor.redact(&prompt);
        tracing::info!(
            variant = ?self.variant,
            prompt_chars = redaction.text.chars().count(),
            redacted = redaction.was_redacted(),
            history_turns = histories.len(),
            "Chat turn received"
        );

        let (response, citations) = match self.variant {
            ChatVariant::Patient => self.patient_turn(&redaction.text, &histories).await,
            ChatVariant::Clinician => self.clinician_turn(&redaction.text, &histories).await,
        };

        let fallback = response == FALLBACK_RESPONSE;
        metrics::record_chat(
            start.elapsed().as_secs_f64(),
            self.variant_label(),
            redaction.was_redacted(),
            fallback,
        );
        tracing::info!(
            fallback,
            citations = !citations.is_empty(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat turn answered"
        );

        histories.push(Turn::new(redaction.text, response.clone()));
        ChatReply {
            histories,
            response,
            citations,
            warning: redaction.warning,
        }
    }

    async fn patient_turn(&self, prompt: &str, histories: &[Turn]) -> (String, String) {
        let refined = self.refiner.refine(prompt);
        tracing::debug!(refined = %refined, "Query refined");

        let history = self.windower.messages(histories);
        let retrieved = self.retrieval.search(&refined).await;
        let documents = retrieved.as_ref().map(SearchResult::from_response);

        let generated = self.composer.compose(&refined, history, documents.as_ref()).await;
        let response = reply_text(generated.as_ref());
        let citations = retrieved
            .as_ref()
            .map(|r| self.citations.citations_html(r))
            .unwrap_or_default();

        (response, citations)
    }

    async fn clinician_turn(&self, prompt: &str, histories: &[Turn]) -> (String, String) {
        let language = self.detector.detect(prompt);
        let translation =
            translate_or_original(self.translator.as_deref(), prompt, &language).await;
        tracing::debug!(
            language = %language,
            translated = matches!(translation, Translation::Translated { .. }),
            "Prompt normalized"
        );

        let mut messages = vec![ChatMessage::system(clinician_persona(&language))];
        messages.extend(self.windower.messages(histories));
        messages.push(ChatMessage::user(translation.into_text()));

        let grounded = self
            .retrieval
            .retrieve(messages, RetrievalParams::GROUNDED_ANSWER)
            .await;

        match grounded {
            Some(body) if message_content(&body).is_some() => {
                (reply_text(Some(&body)), self.citations.citations_html(&body))
            }
            _ => (FALLBACK_RESPONSE.to_string(), String::new()),
        }
    }

    fn variant_label(&self) -> &'static str {
        match self.variant {
            ChatVariant::Patient => "patient",
            ChatVariant::Clinician => "clinician",
        }
    }
}
