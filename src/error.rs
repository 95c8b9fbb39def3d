//! Error taxonomy for the synthesis pipeline.
//!
//! Segment-level transient failures are retried inside the orchestrator and
//! never reach the caller unless retries are exhausted. Everything that does
//! reach the caller carries the failing segment index so an operator can tell
//! which slice of the input was responsible.

use crate::audio::AudioFormat;

/// A single segment that reached a terminal failure state.
#[derive(Debug, Clone)]
pub struct SegmentFailure {
    /// Zero-based index of the failed segment.
    pub index: usize,
    /// Number of attempts made before giving up.
    pub attempts: u32,
    /// Human-readable description of the last error.
    pub message: String,
}

/// Errors surfaced by the synthesis pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("input rejected: {0}")]
    InvalidInput(String),

    /// A planned segment plus its prompt would exceed the request ceiling.
    /// The planner guarantees this cannot happen; seeing it at dispatch time
    /// indicates a planning defect, not a recoverable condition.
    #[error("segment {index} plus prompt is {actual} bytes, over the {limit}-byte request ceiling")]
    OversizedSegment {
        index: usize,
        actual: usize,
        limit: usize,
    },

    /// Non-retryable rejection of a single segment (e.g. malformed request).
    #[error("fatal failure on segment {index}: {message}")]
    FatalFailure { index: usize, message: String },

    /// An audio payload could not be parsed as a linear-PCM WAV container.
    /// Treated as fatal for the whole batch: there is no sane fallback format
    /// to guess, so reassembly aborts instead.
    #[error("malformed audio container from segment {index}: {message}")]
    MalformedAudio { index: usize, message: String },

    /// Two successfully synthesized payloads disagree on their audio format.
    /// Linear-PCM frames of differing shape cannot be concatenated, so this
    /// aborts reassembly rather than guessing a resolution.
    #[error("audio format mismatch at segment {index}: expected {expected}, got {actual}")]
    FormatMismatch {
        index: usize,
        expected: AudioFormat,
        actual: AudioFormat,
    },

    /// One or more segments exhausted their retries. The whole request fails:
    /// partial audio without truncation markers is indistinguishable from
    /// corruption to the listener.
    #[error(
        "synthesis incomplete: segment(s) [{}] failed after exhausting retries",
        failed_indices(.failures)
    )]
    IncompleteBatch { failures: Vec<SegmentFailure> },
}

fn failed_indices(failures: &[SegmentFailure]) -> String {
    failures
        .iter()
        .map(|f| f.index.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_batch_names_failed_indices() {
        let err = SynthesisError::IncompleteBatch {
            failures: vec![
                SegmentFailure {
                    index: 5,
                    attempts: 3,
                    message: "request timed out".to_string(),
                },
                SegmentFailure {
                    index: 9,
                    attempts: 3,
                    message: "HTTP 503".to_string(),
                },
            ],
        };

        let rendered = err.to_string();
        assert!(rendered.contains('5'));
        assert!(rendered.contains('9'));
    }

    #[test]
    fn format_mismatch_renders_both_formats() {
        let err = SynthesisError::FormatMismatch {
            index: 3,
            expected: AudioFormat {
                channels: 1,
                bits_per_sample: 16,
                sample_rate: 24000,
            },
            actual: AudioFormat {
                channels: 2,
                bits_per_sample: 16,
                sample_rate: 24000,
            },
        };

        let rendered = err.to_string();
        assert!(rendered.contains("1ch"));
        assert!(rendered.contains("2ch"));
    }
}
