//! RIFF/WAVE container parsing and rebuilding for uncompressed PCM.
//!
//! Parsing walks the chunk structure using each chunk's declared size instead
//! of assuming a fixed 44-byte header: `fmt ` may carry an extension region,
//! and metadata chunks (`LIST`, `fact`, ...) may precede `data`. Rebuilding
//! always emits the canonical 16-byte `fmt ` layout with every size field
//! recomputed from the actual frame data.

use std::fmt;
use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

/// WAVE format tag for uncompressed PCM.
const FORMAT_PCM: u16 = 1;

/// Errors raised while parsing or building a WAV container.
#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("container truncated: {0} bytes")]
    Truncated(usize),

    #[error("container I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing RIFF/WAVE signature")]
    NotRiff,

    #[error("unsupported encoding type {0}, only PCM frames can be concatenated")]
    NonPcm(u16),

    #[error("missing '{0}' chunk")]
    MissingChunk(&'static str),

    #[error("'{chunk}' chunk declares {declared} bytes but only {remaining} remain")]
    ChunkOverrun {
        chunk: String,
        declared: u32,
        remaining: usize,
    },

    #[error("inconsistent format fields: {0}")]
    InconsistentFormat(String),

    #[error("frame data of {0} bytes exceeds the 32-bit container limit")]
    Oversize(usize),
}

/// PCM sample layout shared by every payload of one synthesis batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample (per channel).
    pub bits_per_sample: u16,
    /// Frames per second.
    pub sample_rate: u32,
}

impl AudioFormat {
    /// Bytes occupied by one sample of one channel.
    pub fn bytes_per_sample(&self) -> u16 {
        self.bits_per_sample / 8
    }

    /// Bytes occupied by one frame (all channels at one instant).
    pub fn block_align(&self) -> u16 {
        self.channels * self.bytes_per_sample()
    }

    /// Bytes of frame data per second of audio.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}-bit",
            self.channels, self.sample_rate, self.bits_per_sample
        )
    }
}

/// A parsed container: the declared format plus the raw frame region.
#[derive(Debug, Clone)]
pub struct WavAudio {
    pub format: AudioFormat,
    /// The `data` chunk body, exactly as declared by the container.
    pub frames: Vec<u8>,
}

impl WavAudio {
    /// Number of complete frames in the data region.
    pub fn frame_count(&self) -> u64 {
        self.frames.len() as u64 / u64::from(self.format.block_align())
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parses a WAV container, returning its format and raw frame region.
///
/// Unknown chunks are skipped via their declared sizes. The `fmt ` chunk must
/// describe PCM and be internally consistent; the `data` chunk body is taken
/// verbatim and must hold a whole number of frames.
pub fn parse_wav(bytes: &[u8]) -> Result<WavAudio, WavError> {
    if bytes.len() < 12 {
        return Err(WavError::Truncated(bytes.len()));
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotRiff);
    }

    let mut format: Option<AudioFormat> = None;
    let mut frames: Option<Vec<u8>> = None;
    let mut pos = 12;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let declared = read_u32(bytes, pos + 4);
        let body_start = pos + 8;
        let remaining = bytes.len() - body_start;
        if declared as usize > remaining {
            return Err(WavError::ChunkOverrun {
                chunk: String::from_utf8_lossy(id).into_owned(),
                declared,
                remaining,
            });
        }
        let body = &bytes[body_start..body_start + declared as usize];

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(WavError::InconsistentFormat(format!(
                        "'fmt ' chunk is {} bytes, expected at least 16",
                        body.len()
                    )));
                }
                let encoding = read_u16(body, 0);
                if encoding != FORMAT_PCM {
                    return Err(WavError::NonPcm(encoding));
                }
                let channels = read_u16(body, 2);
                let sample_rate = read_u32(body, 4);
                let byte_rate = read_u32(body, 8);
                let block_align = read_u16(body, 12);
                let bits_per_sample = read_u16(body, 14);

                if channels == 0 || bits_per_sample == 0 || bits_per_sample % 8 != 0 {
                    return Err(WavError::InconsistentFormat(format!(
                        "channels={channels}, bits_per_sample={bits_per_sample}"
                    )));
                }
                let parsed = AudioFormat {
                    channels,
                    bits_per_sample,
                    sample_rate,
                };
                if block_align != parsed.block_align() || byte_rate != parsed.byte_rate() {
                    return Err(WavError::InconsistentFormat(format!(
                        "block_align={block_align} byte_rate={byte_rate} disagree with {parsed}"
                    )));
                }
                format = Some(parsed);
            }
            b"data" => {
                frames = Some(body.to_vec());
                // Frame data is the last region we care about.
                break;
            }
            // Metadata chunks (LIST, fact, ...) carry no sample content.
            _ => {}
        }

        // Chunk bodies are word-aligned: odd sizes are followed by a pad byte.
        pos = body_start + declared as usize + (declared as usize & 1);
    }

    let format = format.ok_or(WavError::MissingChunk("fmt "))?;
    let frames = frames.ok_or(WavError::MissingChunk("data"))?;

    if frames.len() % usize::from(format.block_align()) != 0 {
        return Err(WavError::InconsistentFormat(format!(
            "data region of {} bytes is not a whole number of {}-byte frames",
            frames.len(),
            format.block_align()
        )));
    }

    Ok(WavAudio { format, frames })
}

/// Builds a canonical WAV container around `frames`.
///
/// Both the outer RIFF size and the `data` chunk size are computed from the
/// actual frame length, never copied from a source container.
pub fn write_wav(format: &AudioFormat, frames: &[u8]) -> Result<Vec<u8>, WavError> {
    // 36 = WAVE tag + full 'fmt ' chunk + 'data' chunk header.
    let riff_size = 36u64 + frames.len() as u64;
    if riff_size > u64::from(u32::MAX) {
        return Err(WavError::Oversize(frames.len()));
    }

    let mut out = Vec::with_capacity(44 + frames.len());
    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(riff_size as u32)?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(FORMAT_PCM)?;
    out.write_u16::<LittleEndian>(format.channels)?;
    out.write_u32::<LittleEndian>(format.sample_rate)?;
    out.write_u32::<LittleEndian>(format.byte_rate())?;
    out.write_u16::<LittleEndian>(format.block_align())?;
    out.write_u16::<LittleEndian>(format.bits_per_sample)?;

    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(frames.len() as u32)?;
    out.write_all(frames)?;

    Ok(out)
}
