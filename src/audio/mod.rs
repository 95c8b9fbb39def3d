//! Linear-PCM audio containers: parsing, rebuilding, and ordered reassembly.

pub mod reassembler;
pub mod wav;

pub use reassembler::{ReassembledAudio, reassemble};
pub use wav::{AudioFormat, WavAudio, WavError, parse_wav, write_wav};

/// One synthesized audio payload, correlated back to the text segment that
/// produced it. `index` is the sole ordering key; arrival order is irrelevant.
#[derive(Debug, Clone)]
pub struct SegmentAudio {
    /// Zero-based index of the originating text segment.
    pub index: usize,
    /// The complete audio container as returned by the synthesis service.
    pub bytes: Vec<u8>,
}
