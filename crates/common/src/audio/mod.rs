//! Audio collaborator: recording storage and speech-to-text
//!
//! Recordings are stored as block blobs named `live_audio_{timestamp}.wav`;
//! transcription downloads the blob and forwards it to the short-audio
//! speech recognition REST endpoint.

use crate::config::AudioConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Blob name for a recording captured at `now`
pub fn blob_name(now: DateTime<Utc>) -> String {
    format!("live_audio_{}.wav", now.format("%Y%m%d_%H%M%S"))
}

/// Reject names that would escape the container
fn check_blob_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(AppError::InvalidFormat {
            message: format!("invalid blob name: {:?}", name),
        });
    }
    Ok(())
}

/// Storage for recorded audio
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Store a recording, returning its blob name
    async fn upload(&self, audio: Vec<u8>) -> Result<String>;

    /// Fetch a stored recording
    async fn download(&self, blob: &str) -> Result<Vec<u8>>;
}

/// Speech-to-text over stored recordings
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, blob: &str) -> Result<String>;
}

/// Azure Blob Storage over REST with a container SAS token
pub struct AzureBlobStore {
    client: reqwest::Client,
    account_url: String,
    container: String,
    sas_token: String,
}

impl AzureBlobStore {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            account_url: config.blob_account_url.trim_end_matches('/').to_string(),
            container: config.audio_container.clone(),
            sas_token: config.blob_sas_token.trim_start_matches('?').to_string(),
        })
    }

    fn blob_url(&self, blob: &str) -> String {
        format!("{}/{}/{}?{}", self.account_url, self.container, blob, self.sas_token)
    }
}

#[async_trait]
impl AudioStore for AzureBlobStore {
    async fn upload(&self, audio: Vec<u8>) -> Result<String> {
        let name = blob_name(Utc::now());
        let start = Instant::now();

        let response = self
            .client
            .put(self.blob_url(&name))
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", "audio/wav")
            .body(audio)
            .send()
            .await;

        let result = match response {
            Ok(r) if r.status().is_success() => Ok(name),
            Ok(r) => Err(AppError::Storage {
                message: format!("upload returned {}", r.status()),
            }),
            Err(e) => Err(AppError::Storage { message: e.to_string() }),
        };
        metrics::record_upstream(start.elapsed().as_secs_f64(), "blob", result.is_ok());
        result
    }

    async fn download(&self, blob: &str) -> Result<Vec<u8>> {
        check_blob_name(blob)?;
        let start = Instant::now();
        let result = self.fetch(blob).await;
        metrics::record_upstream(start.elapsed().as_secs_f64(), "blob", result.is_ok());
        result
    }
}

impl AzureBlobStore {
    async fn fetch(&self, blob: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.blob_url(blob))
            .send()
            .await
            .map_err(|e| AppError::Storage { message: e.to_string() })?;
        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: format!("download of {} returned {}", blob, response.status()),
            });
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| AppError::Storage { message: e.to_string() })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResult {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

/// Azure Speech short-audio recognition
pub struct AzureSpeechTranscriber {
    client: reqwest::Client,
    store: Arc<dyn AudioStore>,
    endpoint: String,
    key: String,
    language: String,
}

impl AzureSpeechTranscriber {
    pub fn new(config: &AudioConfig, store: Arc<dyn AudioStore>) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            store,
            endpoint: format!(
                "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1",
                config.speech_region
            ),
            key: config.speech_key.clone(),
            language: config.speech_language.clone(),
        })
    }

    /// Point at a different recognition endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn recognize(&self, audio: Vec<u8>) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("language", self.language.as_str())])
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "audio/wav; codecs=audio/pcm; samplerate=16000")
            .body(audio)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Transcription {
                message: format!("speech service returned {}", status),
            });
        }

        let result: RecognitionResult = response.json().await?;
        match (result.recognition_status.as_str(), result.display_text) {
            ("Success", Some(text)) => Ok(text),
            (status, _) => Err(AppError::Transcription {
                message: format!("recognition status {}", status),
            }),
        }
    }
}

#[async_trait]
impl Transcriber for AzureSpeechTranscriber {
    async fn transcribe(&self, blob: &str) -> Result<String> {
        let audio = self.store.download(blob).await?;
        let start = Instant::now();
        let result = self.recognize(audio).await;
        metrics::record_upstream(start.elapsed().as_secs_f64(), "speech", result.is_ok());
        result
    }
}

/// In-process store for tests and local runs
#[derive(Default)]
pub struct MemoryAudioStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryAudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store under a fixed name
    pub fn insert(&self, name: impl Into<String>, audio: Vec<u8>) {
        if let Ok(mut blobs) = self.blobs.lock() {
            blobs.insert(name.into(), audio);
        }
    }
}

#[async_trait]
impl AudioStore for MemoryAudioStore {
    async fn upload(&self, audio: Vec<u8>) -> Result<String> {
        let name = blob_name(Utc::now());
        self.insert(name.clone(), audio);
        Ok(name)
    }

    async fn download(&self, blob: &str) -> Result<Vec<u8>> {
        check_blob_name(blob)?;
        self.blobs
            .lock()
            .ok()
            .and_then(|blobs| blobs.get(blob).cloned())
            .ok_or_else(|| AppError::Storage {
                message: format!("blob {} not found", blob),
            })
    }
}

/// Store and transcriber built from one configuration section
#[derive(Clone)]
pub struct AudioServices {
    pub store: Arc<dyn AudioStore>,
    pub transcriber: Arc<dyn Transcriber>,
}

impl AudioServices {
    pub fn from_config(config: &AudioConfig) -> Result<Self> {
        let store: Arc<dyn AudioStore> = Arc::new(AzureBlobStore::new(config)?);
        let transcriber = Arc::new(AzureSpeechTranscriber::new(config, store.clone())?);
        Ok(Self { store, transcriber })
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}
