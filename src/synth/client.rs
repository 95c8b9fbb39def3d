//! HTTP client for the generative Text-to-Speech REST API.
//!
//! Each call posts one JSON request to the `text:synthesize` endpoint and
//! decodes the base64 `audioContent` from the response. Failures are
//! classified into transient, fatal, and auth-expired so the orchestrator's
//! retry policy can act on the class rather than on status codes.

use std::sync::Arc;

use base64::Engine;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::chunk::TextSegment;
use crate::config::SynthesisConfig;
use crate::error::SynthesisResult;
use crate::synth::token::{
    CLOUD_PLATFORM_SCOPE, CredentialSource, GoogleTokenProvider, TokenHandle, TokenProvider,
};

/// Synthesis endpoint. The `v1beta1` surface is required: `input.prompt`
/// (the style prompt) is not accepted by the stable `v1` API.
pub const GOOGLE_TTS_URL: &str = "https://texttospeech.googleapis.com/v1beta1/text:synthesize";

/// Failure classes of a single synthesis call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// Timeout or retryable transport/server error.
    #[error("transient synthesis failure: {0}")]
    Transient(String),

    /// Non-retryable rejection, e.g. a malformed request.
    #[error("fatal synthesis failure: {0}")]
    Fatal(String),

    /// The access token was rejected; refresh and retry.
    #[error("authentication expired: {0}")]
    AuthExpired(String),
}

impl BackendError {
    /// Whether another attempt can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::Fatal(_))
    }
}

/// The external synthesis collaborator, seen from the orchestrator.
///
/// The orchestrator only needs two operations: synthesize one segment, and
/// refresh credentials after an auth-expiry failure. Mock implementations
/// drive every orchestrator test without network access.
#[async_trait::async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Synthesizes one segment and returns the complete audio container.
    async fn synthesize(&self, segment: &TextSegment) -> Result<Vec<u8>, BackendError>;

    /// Refreshes whatever credential subsequent calls will use. Invoked by
    /// the orchestrator before retrying an auth-expired attempt.
    async fn refresh_credentials(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Response body of a successful `text:synthesize` call.
#[derive(Debug, Deserialize)]
struct GoogleTtsResponse {
    /// Base64-encoded audio in the requested encoding.
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Synthesis client for Google's generative TTS API.
pub struct GoogleSynthesisClient {
    http: reqwest::Client,
    token: TokenHandle,
    config: SynthesisConfig,
    endpoint: String,
}

impl GoogleSynthesisClient {
    /// Builds a client from configuration, validating credentials eagerly so
    /// misconfiguration surfaces before the first segment is dispatched.
    pub fn new(config: SynthesisConfig) -> SynthesisResult<Self> {
        let source = CredentialSource::from_api_key(&config.credentials);
        let provider = GoogleTokenProvider::new(source, &[CLOUD_PLATFORM_SCOPE])?;
        Self::with_token_provider(config, Arc::new(provider))
    }

    /// Builds a client around an explicit token provider. Tests use this to
    /// avoid real credentials.
    pub fn with_token_provider(
        config: SynthesisConfig,
        provider: Arc<dyn TokenProvider>,
    ) -> SynthesisResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                crate::error::SynthesisError::InvalidConfiguration(format!(
                    "failed to build HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            http,
            token: TokenHandle::new(provider),
            config,
            endpoint: GOOGLE_TTS_URL.to_string(),
        })
    }

    /// Overrides the synthesis endpoint (integration tests point this at a
    /// local mock server).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Builds the JSON request body for one segment.
    ///
    /// Optional audio parameters are only serialized when configured, and
    /// `input.prompt` is omitted entirely when the segment carries no prompt.
    fn build_request_body(&self, segment: &TextSegment) -> serde_json::Value {
        let mut input = serde_json::Map::new();
        input.insert(
            "text".to_string(),
            serde_json::Value::String(segment.text.clone()),
        );
        if !segment.prompt.is_empty() {
            input.insert(
                "prompt".to_string(),
                serde_json::Value::String(segment.prompt.clone()),
            );
        }

        let mut voice = serde_json::Map::new();
        voice.insert(
            "languageCode".to_string(),
            serde_json::Value::String(self.config.language_code.clone()),
        );
        voice.insert(
            "name".to_string(),
            serde_json::Value::String(self.config.voice_name.clone()),
        );
        voice.insert(
            "modelName".to_string(),
            serde_json::Value::String(self.config.model_name.clone()),
        );

        let mut audio_config = serde_json::Map::new();
        audio_config.insert(
            "audioEncoding".to_string(),
            serde_json::Value::String(self.config.audio_encoding.as_str().to_string()),
        );
        if let Some(pitch) = self.config.clamped_pitch() {
            audio_config.insert(
                "pitch".to_string(),
                serde_json::Value::Number(
                    serde_json::Number::from_f64(pitch).unwrap_or_else(|| 0.into()),
                ),
            );
        }
        if let Some(rate) = self.config.clamped_speaking_rate() {
            audio_config.insert(
                "speakingRate".to_string(),
                serde_json::Value::Number(
                    serde_json::Number::from_f64(rate).unwrap_or_else(|| 1.into()),
                ),
            );
        }

        serde_json::json!({
            "input": input,
            "voice": voice,
            "audioConfig": audio_config,
        })
    }
}

/// Maps an HTTP error status to a failure class.
fn classify_status(status: StatusCode, detail: String) -> BackendError {
    let message = format!("HTTP {status}: {detail}");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::AuthExpired(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            BackendError::Transient(message)
        }
        s if s.is_server_error() => BackendError::Transient(message),
        _ => BackendError::Fatal(message),
    }
}

/// Maps a transport-level failure to a failure class.
fn classify_transport(error: reqwest::Error) -> BackendError {
    if error.is_builder() {
        BackendError::Fatal(format!("request construction failed: {error}"))
    } else {
        // Timeouts, connect failures, and mid-stream resets are all worth a
        // second attempt.
        BackendError::Transient(format!("transport error: {error}"))
    }
}

#[async_trait::async_trait]
impl SynthesisBackend for GoogleSynthesisClient {
    async fn synthesize(&self, segment: &TextSegment) -> Result<Vec<u8>, BackendError> {
        let token = self
            .token
            .current()
            .await
            .map_err(|e| BackendError::AuthExpired(e.to_string()))?;

        let body = self.build_request_body(segment);
        debug!(
            index = segment.index,
            text_bytes = segment.text.len(),
            prompt_bytes = segment.prompt.len(),
            "sending synthesis request"
        );

        let response = self
            .http
            .post(self.endpoint.as_str())
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(classify_status(status, detail));
        }

        let parsed: GoogleTtsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Fatal(format!("failed to parse synthesis response: {e}")))?;

        let audio = base64::engine::general_purpose::STANDARD
            .decode(&parsed.audio_content)
            .map_err(|e| BackendError::Fatal(format!("failed to decode base64 audio: {e}")))?;

        debug!(
            index = segment.index,
            audio_bytes = audio.len(),
            "synthesis response decoded"
        );
        Ok(audio)
    }

    async fn refresh_credentials(&self) -> Result<(), BackendError> {
        let stale = self.token.cached().await;
        self.token
            .refresh(stale.as_deref())
            .await
            .map(|_| ())
            .map_err(|e| BackendError::AuthExpired(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::token::test_support::CountingTokenProvider;

    fn test_client(config: SynthesisConfig) -> GoogleSynthesisClient {
        GoogleSynthesisClient::with_token_provider(config, Arc::new(CountingTokenProvider::new()))
            .unwrap()
    }

    fn segment(text: &str, prompt: &str) -> TextSegment {
        TextSegment {
            index: 0,
            text: text.to_string(),
            prompt: prompt.to_string(),
        }
    }

    #[test]
    fn body_includes_voice_and_model() {
        let client = test_client(SynthesisConfig::default());
        let body = client.build_request_body(&segment("Hello world.", "warm tone"));

        assert_eq!(body["input"]["text"], "Hello world.");
        assert_eq!(body["input"]["prompt"], "warm tone");
        assert_eq!(body["voice"]["languageCode"], "en-US");
        assert_eq!(body["voice"]["name"], "Achernar");
        assert_eq!(body["voice"]["modelName"], "gemini-2.5-pro-tts");
        assert_eq!(body["audioConfig"]["audioEncoding"], "LINEAR16");
        assert_eq!(body["audioConfig"]["pitch"], 0.0);
        assert_eq!(body["audioConfig"]["speakingRate"], 1.0);
    }

    #[test]
    fn empty_prompt_is_omitted_from_input() {
        let client = test_client(SynthesisConfig::default());
        let body = client.build_request_body(&segment("Hello.", ""));

        assert!(body["input"].get("prompt").is_none());
    }

    #[test]
    fn unset_audio_parameters_are_omitted() {
        let config = SynthesisConfig {
            pitch: None,
            speaking_rate: None,
            ..Default::default()
        };
        let client = test_client(config);
        let body = client.build_request_body(&segment("Hi.", ""));

        assert!(body["audioConfig"].get("pitch").is_none());
        assert!(body["audioConfig"].get("speakingRate").is_none());
    }

    #[test]
    fn out_of_range_parameters_are_clamped() {
        let config = SynthesisConfig {
            pitch: Some(-45.0),
            speaking_rate: Some(0.01),
            ..Default::default()
        };
        let client = test_client(config);
        let body = client.build_request_body(&segment("Hi.", ""));

        assert_eq!(body["audioConfig"]["pitch"], -20.0);
        assert_eq!(body["audioConfig"]["speakingRate"], 0.25);
    }

    #[test]
    fn unicode_text_survives_serialization() {
        let client = test_client(SynthesisConfig::default());
        let body = client.build_request_body(&segment("Hallo, 世界! Привет!", ""));
        assert_eq!(body["input"]["text"], "Hallo, 世界! Привет!");
    }

    #[test]
    fn status_classification_matches_retry_semantics() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "payload too large".into()),
            BackendError::Fatal(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "token expired".into()),
            BackendError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "no access".into()),
            BackendError::AuthExpired(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            BackendError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "overloaded".into()),
            BackendError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "bad endpoint".into()),
            BackendError::Fatal(_)
        ));
    }

    #[test]
    fn response_deserialization_reads_audio_content() {
        let json = r#"{"audioContent": "SGVsbG8gV29ybGQ="}"#;
        let response: GoogleTtsResponse = serde_json::from_str(json).unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&response.audio_content)
            .unwrap();
        assert_eq!(decoded, b"Hello World");
    }

    #[test]
    fn response_without_audio_content_is_an_error() {
        let json = r#"{"something_else": true}"#;
        assert!(serde_json::from_str::<GoogleTtsResponse>(json).is_err());
    }
}
