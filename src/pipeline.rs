//! End-to-end long-form synthesis: plan, dispatch, reassemble.

use std::sync::Arc;

use tracing::info;

use crate::audio::{ReassembledAudio, reassemble};
use crate::chunk::{ChunkPlanner, PromptAllocator, PromptPolicy};
use crate::config::SynthesisConfig;
use crate::error::{SynthesisError, SynthesisResult};
use crate::synth::client::{GoogleSynthesisClient, SynthesisBackend};
use crate::synth::orchestrator::SynthesisOrchestrator;

/// One long-form synthesis request.
#[derive(Clone)]
pub struct SynthesisRequest {
    /// The full text to read.
    pub text: String,
    /// User-supplied (or upstream-generated) style prompt.
    pub prompt: String,
    /// How the prompt is distributed across segments.
    pub policy: PromptPolicy,
}

impl SynthesisRequest {
    /// Builds a request with the default prompt policy: full prompt on the
    /// first segment, a short continuation phrase on the rest.
    pub fn new(text: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt: prompt.into(),
            policy: PromptPolicy::MinimalContinuation,
        }
    }

    pub fn with_policy(mut self, policy: PromptPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Converts arbitrarily long text into a single WAV stream by fanning
/// byte-bounded segments out to the synthesis service and stitching the
/// returned audio back together in order.
pub struct SpeechPipeline<B> {
    config: SynthesisConfig,
    planner: ChunkPlanner,
    orchestrator: SynthesisOrchestrator<B>,
}

impl SpeechPipeline<GoogleSynthesisClient> {
    /// Builds a pipeline speaking to Google's generative TTS API.
    pub fn new(config: SynthesisConfig) -> SynthesisResult<Self> {
        let backend = Arc::new(GoogleSynthesisClient::new(config.clone())?);
        Self::with_backend(config, backend)
    }
}

impl<B: SynthesisBackend + 'static> SpeechPipeline<B> {
    /// Builds a pipeline around an explicit backend. Tests inject scripted
    /// backends here; production code goes through [`SpeechPipeline::new`].
    pub fn with_backend(config: SynthesisConfig, backend: Arc<B>) -> SynthesisResult<Self> {
        config.validate()?;
        if !config.audio_encoding.is_linear_pcm() {
            return Err(SynthesisError::InvalidConfiguration(format!(
                "audio encoding {} cannot be reassembled; only LINEAR16 \
                 frames are concatenable",
                config.audio_encoding.as_str()
            )));
        }

        let planner = ChunkPlanner::new(config.byte_ceiling, config.safety_margin);
        let orchestrator = SynthesisOrchestrator::new(backend, &config);
        Ok(Self {
            config,
            planner,
            orchestrator,
        })
    }

    /// Synthesizes `request` into one audio stream.
    ///
    /// Empty (or whitespace-only) text is a no-op and returns `None`. For a
    /// single planned segment the result is the payload's own frames behind a
    /// rebuilt header; format validation applies either way.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> SynthesisResult<Option<ReassembledAudio>> {
        let char_count = request.text.chars().count();
        if char_count > self.config.max_input_chars {
            return Err(SynthesisError::InvalidInput(format!(
                "text of {char_count} characters exceeds the {} character limit",
                self.config.max_input_chars
            )));
        }

        let budget = self.config.byte_ceiling - self.config.safety_margin;
        let allocator = PromptAllocator::new(request.policy.clone(), request.prompt.clone(), budget);
        let segments = self.planner.plan(&request.text, &allocator)?;
        if segments.is_empty() {
            return Ok(None);
        }

        let payloads = self.orchestrator.run(segments).await?;
        let audio = reassemble(&payloads)?;

        info!(
            segments = payloads.len(),
            frame_count = audio.frame_count,
            duration_secs = audio.duration_secs(),
            "long-form synthesis complete"
        );
        Ok(Some(audio))
    }
}
