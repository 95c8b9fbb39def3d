//! Synthesis against the external text-to-speech service: credentials,
//! request client, retry policy, and the fan-out/fan-in orchestrator.

pub mod client;
pub mod orchestrator;
pub mod retry;
pub mod token;

pub use client::{BackendError, GOOGLE_TTS_URL, GoogleSynthesisClient, SynthesisBackend};
pub use orchestrator::SynthesisOrchestrator;
pub use retry::RetryPolicy;
pub use token::{CredentialSource, GoogleTokenProvider, TokenHandle, TokenProvider};
