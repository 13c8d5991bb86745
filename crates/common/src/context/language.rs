//! Language detection and translation
//!
//! Provides:
//! - Hangul short-circuit before general language identification
//! - Best-effort translation to the working language (English)
//!
//! Translation never fails the request: on any error the original text is
//! returned, marked as [`Translation::Unchanged`] with the reason.

use crate::config::TranslationConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Name returned when no language could be identified
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Name returned for any input containing Hangul syllables
pub const KOREAN: &str = "korean";

/// Hangul syllables block, 가..=힣
fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

/// Language identifier over every language the detector supports
#[derive(Debug, Clone)]
pub struct LanguageDetector {
    min_confidence: f64,
}

impl LanguageDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Lowercase English name of the input language, `korean` when any
    /// Hangul syllable is present, `unknown` when nothing matches confidently.
    pub fn detect(&self, text: &str) -> String {
        if text.chars().any(is_hangul_syllable) {
            return KOREAN.to_string();
        }

        match whatlang::detect(text) {
            Some(info) if info.confidence() >= self.min_confidence => {
                info.lang().eng_name().to_lowercase()
            }
            _ => UNKNOWN_LANGUAGE.to_string(),
        }
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new(0.5)
    }
}

/// Why a text was passed through untranslated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum UnchangedReason {
    /// Translation is switched off or unconfigured
    Disabled,
    /// Input already in the target language
    AlreadyTarget,
    /// Nothing to translate
    Empty,
    /// The translation service failed; original text kept
    Failed(String),
}

/// Outcome of a best-effort translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Translated {
        text: String,
        source_language: Option<String>,
    },
    Unchanged {
        text: String,
        reason: UnchangedReason,
    },
}

impl Translation {
    pub fn text(&self) -> &str {
        match self {
            Translation::Translated { text, .. } | Translation::Unchanged { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Translation::Translated { text, .. } | Translation::Unchanged { text, .. } => text,
        }
    }

    /// True when the original text was kept because translation failed
    pub fn is_recovered_failure(&self) -> bool {
        matches!(
            self,
            Translation::Unchanged { reason: UnchangedReason::Failed(_), .. }
        )
    }

    fn outcome(&self) -> &'static str {
        match self {
            Translation::Translated { .. } => "translated",
            Translation::Unchanged { reason: UnchangedReason::Failed(_), .. } => "failed",
            Translation::Unchanged { .. } => "skipped",
        }
    }
}

/// Text returned by a translation backend
#[derive(Debug, Clone)]
pub struct TranslatedText {
    pub text: String,
    pub source_language: Option<String>,
}

/// Trait for translation backends
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate into the backend's target language
    async fn translate(&self, text: &str) -> Result<TranslatedText>;

    /// Target language code, e.g. `en`
    fn target(&self) -> &str;
}

/// Google Cloud Translation (v2 REST) backend
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    target: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'static str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<TranslationItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslationItem {
    translated_text: String,
    detected_source_language: Option<String>,
}

impl GoogleTranslator {
    pub fn new(config: &TranslationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            target: config.target.clone(),
        })
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<TranslatedText> {
        let mut request = self.client.post(&self.endpoint).json(&TranslateRequest {
            q: text,
            target: &self.target,
            format: "text",
        });
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: "translation".to_string(),
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let body: TranslateResponse = response.json().await?;
        body.data
            .translations
            .into_iter()
            .next()
            .map(|t| TranslatedText {
                text: t.translated_text,
                source_language: t.detected_source_language,
            })
            .ok_or_else(|| AppError::Upstream {
                service: "translation".to_string(),
                status: status.as_u16(),
                message: "Empty translation list".to_string(),
            })
    }

    fn target(&self) -> &str {
        &self.target
    }
}

/// Create a translator based on configuration, if translation is usable
pub fn create_translator(config: &TranslationConfig) -> Result<Option<Arc<dyn Translator>>> {
    if !config.enabled {
        return Ok(None);
    }
    if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        return Err(AppError::Configuration {
            message: "translation.api_key must be set when translation.enabled is true".to_string(),
        });
    }
    Ok(Some(Arc::new(GoogleTranslator::new(config)?)))
}

/// Translate `text`, falling back to the original on any failure.
///
/// `detected` is the detector's language name; English input is not sent
/// to an English-target backend.
pub async fn translate_or_original(
    translator: Option<&dyn Translator>,
    text: &str,
    detected: &str,
) -> Translation {
    let result = match translator {
        None => Translation::Unchanged {
            text: text.to_string(),
            reason: UnchangedReason::Disabled,
        },
        Some(_) if text.trim().is_empty() => Translation::Unchanged {
            text: text.to_string(),
            reason: UnchangedReason::Empty,
        },
        Some(t) if t.target() == "en" && detected == "english" => Translation::Unchanged {
            text: text.to_string(),
            reason: UnchangedReason::AlreadyTarget,
        },
        Some(t) => match t.translate(text).await {
            Ok(translated) => Translation::Translated {
                text: translated.text,
                source_language: translated.source_language,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Translation failed, using original text");
                Translation::Unchanged {
                    text: text.to_string(),
                    reason: UnchangedReason::Failed(e.to_string()),
                }
            }
        },
    };

    metrics::record_translation(result.outcome());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    struct FailingTranslator;

    #[async_trait]
    impl Translator for FailingTranslator {
        async fn translate(&self, _text: &str) -> Result<TranslatedText> {
            Err(AppError::ServiceUnavailable { message: "down".into() })
        }

        fn target(&self) -> &str {
            "en"
        }
    }

    async fn serve(app: Router) -> TranslationConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TranslationConfig {
            endpoint: format!("http://{}/translate", addr),
            api_key: Some("k".into()),
            ..TranslationConfig::default()
        }
    }

    #[test]
    fn test_hangul_short_circuit() {
        let detector = LanguageDetector::default();
        assert_eq!(detector.detect("두통 원인이 뭔가요?"), "korean");
        assert_eq!(detector.detect("MRI 결과"), "korean");
    }

    #[test]
    fn test_detects_english() {
        let detector = LanguageDetector::default();
        let text = "I have had a terrible headache for three days and the medicine from the pharmacy is not helping at all.";
        assert_eq!(detector.detect(text), "english");
    }

    #[test]
    fn test_unknown_without_letters() {
        assert_eq!(LanguageDetector::default().detect("12345 !!! ???"), UNKNOWN_LANGUAGE);
        assert_eq!(LanguageDetector::default().detect(""), UNKNOWN_LANGUAGE);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_original() {
        let result = translate_or_original(Some(&FailingTranslator), "頭痛の原因は？", "japanese").await;
        assert_eq!(result.text(), "頭痛の原因は？");
        assert!(result.is_recovered_failure());
    }

    #[tokio::test]
    async fn test_skips_when_disabled_or_english() {
        let disabled = translate_or_original(None, "headache", "english").await;
        assert_eq!(
            disabled,
            Translation::Unchanged { text: "headache".into(), reason: UnchangedReason::Disabled }
        );

        let english = translate_or_original(Some(&FailingTranslator), "headache", "english").await;
        assert!(!english.is_recovered_failure());
        assert_eq!(english.into_text(), "headache");
    }

    #[tokio::test]
    async fn test_google_translator_round_trip() {
        let app = Router::new().route(
            "/translate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["target"], "en");
                Json(json!({
                    "data": { "translations": [{
                        "translatedText": "What causes headaches?",
                        "detectedSourceLanguage": "ko"
                    }]}
                }))
            }),
        );
        let translator = GoogleTranslator::new(&serve(app).await).unwrap();

        let result = translate_or_original(Some(&translator), "두통 원인이 뭔가요?", "korean").await;
        assert_eq!(
            result,
            Translation::Translated {
                text: "What causes headaches?".into(),
                source_language: Some("ko".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_google_translator_server_error() {
        let app = Router::new().route("/translate", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let translator = GoogleTranslator::new(&serve(app).await).unwrap();

        let result = translate_or_original(Some(&translator), "두통", "korean").await;
        assert_eq!(result.text(), "두통");
        assert!(result.is_recovered_failure());
    }

    #[test]
    fn test_factory_requires_key() {
        let config = TranslationConfig::default();
        let err = create_translator(&config).err().unwrap();
        assert!(matches!(err, AppError::Configuration { .. }));
        assert!(err.to_string().contains("translation.api_key"));

        let blank = TranslationConfig { api_key: Some("  ".into()), ..config.clone() };
        assert!(create_translator(&blank).is_err());

        let keyed = TranslationConfig { api_key: Some("k".into()), ..config.clone() };
        assert!(create_translator(&keyed).unwrap().is_some());

        let disabled = TranslationConfig { enabled: false, api_key: Some("k".into()), ..config };
        assert!(create_translator(&disabled).unwrap().is_none());
    }
}
