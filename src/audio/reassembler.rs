//! Ordered reassembly of per-segment WAV payloads into one container.
//!
//! Each payload is parsed and its raw frame region extracted using the
//! container's own declared sizes; the combined stream is then wrapped in a
//! freshly built header whose size fields reflect the true concatenated frame
//! length. Byte-skipping a fixed header length would silently corrupt
//! payloads with extension or metadata chunks.

use tracing::debug;

use crate::audio::wav::{self, AudioFormat};
use crate::audio::SegmentAudio;
use crate::error::{SynthesisError, SynthesisResult};

/// The stitched result of one synthesis batch.
#[derive(Debug, Clone)]
pub struct ReassembledAudio {
    /// Format shared by every input payload.
    pub format: AudioFormat,
    /// Total number of frames across all segments.
    pub frame_count: u64,
    /// Complete WAV container with recomputed header fields.
    pub payload: Vec<u8>,
}

impl ReassembledAudio {
    /// Playback duration derived from frame count and frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / f64::from(self.format.sample_rate)
    }
}

/// Concatenates the frame regions of `payloads` in segment-index order and
/// rebuilds a single container around them.
///
/// Every payload must parse as linear PCM and report the same
/// [`AudioFormat`] as the first; a mismatch aborts reassembly. Reassembling a
/// single payload is the identity operation on its frame content, but the
/// format validation still applies.
pub fn reassemble(payloads: &[SegmentAudio]) -> SynthesisResult<ReassembledAudio> {
    let Some(first) = payloads.first() else {
        return Err(SynthesisError::InvalidInput(
            "no audio payloads to reassemble".to_string(),
        ));
    };

    let head = parse_payload(first)?;
    let format = head.format;

    let mut parsed = Vec::with_capacity(payloads.len());
    let mut total_bytes = head.frames.len();
    parsed.push(head);

    for payload in &payloads[1..] {
        let audio = parse_payload(payload)?;
        if audio.format != format {
            return Err(SynthesisError::FormatMismatch {
                index: payload.index,
                expected: format,
                actual: audio.format,
            });
        }
        total_bytes += audio.frames.len();
        parsed.push(audio);
    }

    let mut frames = Vec::with_capacity(total_bytes);
    for audio in &parsed {
        frames.extend_from_slice(&audio.frames);
    }

    let frame_count = frames.len() as u64 / u64::from(format.block_align());
    let container = wav::write_wav(&format, &frames).map_err(|e| {
        SynthesisError::InvalidInput(format!("cannot build combined container: {e}"))
    })?;

    debug!(
        segments = payloads.len(),
        frame_count,
        bytes = container.len(),
        %format,
        "reassembled audio"
    );

    Ok(ReassembledAudio {
        format,
        frame_count,
        payload: container,
    })
}

fn parse_payload(payload: &SegmentAudio) -> SynthesisResult<wav::WavAudio> {
    wav::parse_wav(&payload.bytes).map_err(|e| SynthesisError::MalformedAudio {
        index: payload.index,
        message: e.to_string(),
    })
}
