//! Byte-bounded text segmentation.
//!
//! The synthesis service enforces a hard ceiling on the combined UTF-8 byte
//! length of text plus prompt per request. The planner packs whole sentences
//! greedily under that budget and falls back to whitespace splitting only
//! when a single sentence alone cannot fit.

use tracing::debug;

use crate::chunk::prompt::PromptAllocator;
use crate::error::{SynthesisError, SynthesisResult};

/// One byte-bounded slice of the input text, paired with its style prompt.
///
/// Ordering is significant and immutable once planned; `index` is the sole
/// ordering key used downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Zero-based position in the planned sequence.
    pub index: usize,
    /// The text to synthesize.
    pub text: String,
    /// Style prompt transmitted alongside the text (may be empty).
    pub prompt: String,
}

impl TextSegment {
    /// UTF-8 byte length of the text alone.
    pub fn text_bytes(&self) -> usize {
        self.text.len()
    }

    /// UTF-8 byte length of text plus prompt, the quantity the service
    /// ceiling applies to.
    pub fn combined_bytes(&self) -> usize {
        self.text.len() + self.prompt.len()
    }
}

/// Splits input text into an ordered sequence of byte-bounded segments.
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    byte_ceiling: usize,
    safety_margin: usize,
}

impl ChunkPlanner {
    pub fn new(byte_ceiling: usize, safety_margin: usize) -> Self {
        Self {
            byte_ceiling,
            safety_margin,
        }
    }

    /// Combined text + prompt budget after the safety margin.
    fn effective_limit(&self) -> usize {
        self.byte_ceiling.saturating_sub(self.safety_margin)
    }

    /// Text-only budget for the segment at `index`, accounting for the bytes
    /// the allocator will spend on its prompt. A prompt too large to ever fit
    /// gets no reservation; the allocator drops it at assignment time.
    fn segment_budget(&self, prompts: &PromptAllocator, index: usize) -> usize {
        let limit = self.effective_limit();
        let reserved = prompts.reserved_bytes(index);
        if reserved >= limit {
            limit
        } else {
            limit - reserved
        }
    }

    /// Plans the segment sequence for `text` and assigns prompts.
    ///
    /// Empty (or whitespace-only) input yields zero segments. Text that fits
    /// under the budget in one piece yields exactly one segment carrying the
    /// full prompt.
    pub fn plan(
        &self,
        text: &str,
        prompts: &PromptAllocator,
    ) -> SynthesisResult<Vec<TextSegment>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut budget = self.segment_budget(prompts, 0);

        for sentence in split_sentences(text) {
            let separator = usize::from(!current.is_empty());
            if current.len() + separator + sentence.len() <= budget {
                if separator == 1 {
                    current.push(' ');
                }
                current.push_str(sentence);
                continue;
            }

            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                budget = self.segment_budget(prompts, pieces.len());
            }

            if sentence.len() <= budget {
                current.push_str(sentence);
            } else {
                // The sentence alone exceeds the budget: split at whitespace.
                self.hard_split(sentence, prompts, &mut pieces, &mut current, &mut budget);
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        let mut segments: Vec<TextSegment> = pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| TextSegment {
                index,
                text,
                prompt: String::new(),
            })
            .collect();
        prompts.assign(&mut segments);

        // The allocator's drop rule makes an over-budget segment impossible;
        // raising here means the planning logic itself is broken.
        let limit = self.effective_limit();
        for segment in &segments {
            if segment.combined_bytes() > limit {
                return Err(SynthesisError::OversizedSegment {
                    index: segment.index,
                    actual: segment.combined_bytes(),
                    limit,
                });
            }
        }

        debug!(
            segments = segments.len(),
            input_bytes = text.len(),
            "planned text segments"
        );
        Ok(segments)
    }

    /// Packs the words of an oversized sentence into budget-sized pieces.
    /// A single word larger than the whole budget is cut at character
    /// boundaries as a last resort.
    fn hard_split(
        &self,
        sentence: &str,
        prompts: &PromptAllocator,
        pieces: &mut Vec<String>,
        current: &mut String,
        budget: &mut usize,
    ) {
        for word in sentence.split_whitespace() {
            let separator = usize::from(!current.is_empty());
            if current.len() + separator + word.len() <= *budget {
                if separator == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                continue;
            }

            if !current.is_empty() {
                pieces.push(std::mem::take(current));
                *budget = self.segment_budget(prompts, pieces.len());
            }

            let mut rest = word;
            while rest.len() > *budget {
                let cut = floor_char_boundary(rest, *budget);
                pieces.push(rest[..cut].to_string());
                *budget = self.segment_budget(prompts, pieces.len());
                rest = &rest[cut..];
            }
            current.push_str(rest);
        }
    }
}

/// Largest index `<= at` that lies on a char boundary, but never zero for a
/// non-empty string (a piece must always make progress).
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut i = at.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    if i == 0 {
        i = s
            .char_indices()
            .nth(1)
            .map(|(idx, _)| idx)
            .unwrap_or(s.len());
    }
    i
}

/// Splits text into sentence-like units on terminal punctuation.
///
/// A sentence ends at `.`, `!`, `?`, or `…`, optionally followed by closing
/// quotes or brackets, when whitespace follows. Terminal punctuation inside a
/// token (`3.14`, `e.g.x`) does not split.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut after_terminal = false;

    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?' | '…') {
            after_terminal = true;
            continue;
        }
        if after_terminal {
            if matches!(c, '"' | '\'' | '\u{201D}' | '\u{2019}' | ')' | ']') {
                continue;
            }
            if c.is_whitespace() {
                let sentence = text[start..i].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = i + c.len_utf8();
            }
            after_terminal = false;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}
