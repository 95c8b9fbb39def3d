//! Request-level configuration for the synthesis pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SynthesisError, SynthesisResult};

/// Audio encodings accepted by the synthesis service.
///
/// Only `Linear16` produces a WAV container that the reassembler can
/// concatenate; compressed encodings are passed through single-segment
/// requests only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioEncoding {
    Linear16,
    Mp3,
    OggOpus,
    Mulaw,
    Alaw,
}

impl AudioEncoding {
    /// The wire value expected by the service's `audioConfig.audioEncoding`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEncoding::Linear16 => "LINEAR16",
            AudioEncoding::Mp3 => "MP3",
            AudioEncoding::OggOpus => "OGG_OPUS",
            AudioEncoding::Mulaw => "MULAW",
            AudioEncoding::Alaw => "ALAW",
        }
    }

    /// Whether payloads in this encoding are uncompressed PCM in a WAV
    /// container and therefore eligible for multi-segment reassembly.
    pub fn is_linear_pcm(&self) -> bool {
        matches!(self, AudioEncoding::Linear16)
    }
}

/// Configuration for a synthesis pipeline instance.
///
/// `credentials` follows the same convention as the rest of the Google Cloud
/// integration: an empty string selects Application Default Credentials, a
/// string starting with `{` is inline service-account JSON, anything else is
/// a path to a credentials file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Credential source string (empty for ADC, JSON content, or file path).
    pub credentials: String,
    /// Voice to synthesize with.
    pub voice_name: String,
    /// BCP-47 language code.
    pub language_code: String,
    /// Generative TTS model name.
    pub model_name: String,
    /// Requested audio encoding.
    pub audio_encoding: AudioEncoding,
    /// Voice pitch adjustment in semitones (-20.0 to 20.0).
    pub pitch: Option<f64>,
    /// Speaking rate (0.25 to 4.0, 1.0 is normal).
    pub speaking_rate: Option<f64>,
    /// Hard combined byte ceiling for text + prompt per request.
    pub byte_ceiling: usize,
    /// Headroom subtracted from the ceiling before planning.
    pub safety_margin: usize,
    /// Maximum accepted input length in characters.
    pub max_input_chars: usize,
    /// Per-request timeout in seconds. Deliberately generous: a slow peer is
    /// not a failed peer.
    pub request_timeout_secs: u64,
    /// Lower bound of the worker pool size.
    pub min_workers: usize,
    /// Upper bound of the worker pool size.
    pub max_workers: usize,
    /// Attempts per segment before the failure becomes terminal.
    pub max_attempts: u32,
    /// Base delay of the exponential backoff schedule, in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            credentials: String::new(),
            voice_name: "Achernar".to_string(),
            language_code: "en-US".to_string(),
            model_name: "gemini-2.5-pro-tts".to_string(),
            audio_encoding: AudioEncoding::Linear16,
            pitch: Some(0.0),
            speaking_rate: Some(1.0),
            byte_ceiling: 4000,
            safety_margin: 100,
            max_input_chars: 10_000,
            request_timeout_secs: 120,
            min_workers: 10,
            max_workers: 15,
            max_attempts: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl SynthesisConfig {
    /// Pitch clamped into the range the service accepts.
    pub fn clamped_pitch(&self) -> Option<f64> {
        self.pitch.map(|p| p.clamp(-20.0, 20.0))
    }

    /// Speaking rate clamped into the range the service accepts.
    pub fn clamped_speaking_rate(&self) -> Option<f64> {
        self.speaking_rate.map(|r| r.clamp(0.25, 4.0))
    }

    /// Per-request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validates internal consistency before a pipeline is built from this
    /// configuration.
    pub fn validate(&self) -> SynthesisResult<()> {
        if self.byte_ceiling == 0 {
            return Err(SynthesisError::InvalidConfiguration(
                "byte_ceiling must be greater than 0".to_string(),
            ));
        }
        if self.safety_margin >= self.byte_ceiling {
            return Err(SynthesisError::InvalidConfiguration(format!(
                "safety_margin ({}) must be smaller than byte_ceiling ({})",
                self.safety_margin, self.byte_ceiling
            )));
        }
        if self.min_workers == 0 || self.max_workers < self.min_workers {
            return Err(SynthesisError::InvalidConfiguration(format!(
                "worker bounds must satisfy 1 <= min ({}) <= max ({})",
                self.min_workers, self.max_workers
            )));
        }
        if self.max_attempts == 0 {
            return Err(SynthesisError::InvalidConfiguration(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SynthesisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.byte_ceiling, 4000);
        assert_eq!(config.safety_margin, 100);
        assert_eq!(config.voice_name, "Achernar");
    }

    #[test]
    fn encoding_wire_values() {
        assert_eq!(AudioEncoding::Linear16.as_str(), "LINEAR16");
        assert_eq!(AudioEncoding::OggOpus.as_str(), "OGG_OPUS");
        assert!(AudioEncoding::Linear16.is_linear_pcm());
        assert!(!AudioEncoding::Mp3.is_linear_pcm());
    }

    #[test]
    fn clamping_applies_service_ranges() {
        let config = SynthesisConfig {
            pitch: Some(30.0),
            speaking_rate: Some(10.0),
            ..Default::default()
        };
        assert_eq!(config.clamped_pitch(), Some(20.0));
        assert_eq!(config.clamped_speaking_rate(), Some(4.0));
    }

    #[test]
    fn margin_must_fit_under_ceiling() {
        let config = SynthesisConfig {
            byte_ceiling: 100,
            safety_margin: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SynthesisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn worker_bounds_checked() {
        let config = SynthesisConfig {
            min_workers: 5,
            max_workers: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = SynthesisConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("LINEAR16"));
        let back: SynthesisConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.voice_name, config.voice_name);
        assert_eq!(back.audio_encoding, config.audio_encoding);
    }
}
