//! Long-form speech synthesis against a size-limited TTS service.
//!
//! The external service caps the combined byte length of text plus style
//! prompt per request, so long input is planned into byte-bounded segments,
//! synthesized concurrently with bounded retry, and the returned linear-PCM
//! containers are parsed and rebuilt into one continuous WAV stream.
//!
//! ```rust,no_run
//! use narrata::{SpeechPipeline, SynthesisConfig, SynthesisRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), narrata::SynthesisError> {
//!     let pipeline = SpeechPipeline::new(SynthesisConfig::default())?;
//!     let request = SynthesisRequest::new(
//!         "A long passage of text to read aloud...",
//!         "Read like an experienced teacher explaining to students",
//!     );
//!     if let Some(audio) = pipeline.synthesize(&request).await? {
//!         std::fs::write("speech.wav", &audio.payload).ok();
//!     }
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod chunk;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod synth;

pub use audio::{AudioFormat, ReassembledAudio, SegmentAudio};
pub use chunk::{
    CONTINUATION_PROMPT, ChunkPlanner, PromptAllocator, PromptAnalyzer, PromptPolicy, TextSegment,
};
pub use config::{AudioEncoding, SynthesisConfig};
pub use error::{SegmentFailure, SynthesisError, SynthesisResult};
pub use pipeline::{SpeechPipeline, SynthesisRequest};
pub use synth::{
    BackendError, GOOGLE_TTS_URL, GoogleSynthesisClient, RetryPolicy, SynthesisBackend,
    SynthesisOrchestrator, TokenHandle, TokenProvider,
};
