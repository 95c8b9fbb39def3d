//! Prompt assignment across planned segments.
//!
//! Deciding which style prompt accompanies each segment is independent of
//! segmentation itself: the planner only needs to know how many bytes to
//! reserve per segment, and the allocator fills the actual prompt text in
//! after planning.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::chunk::planner::TextSegment;

/// Fixed phrase attached to follow-up segments under
/// [`PromptPolicy::MinimalContinuation`]. Short on purpose: every byte spent
/// on the prompt is a byte taken from the text budget.
pub const CONTINUATION_PROMPT: &str = "Continue reading in the same style.";

/// Produces a style prompt tailored to one segment's text.
///
/// The analysis itself (sentiment, tone, register) lives outside this crate;
/// implementors bridge to whatever produces those strings. Any
/// `Fn(&str) -> String` works directly.
pub trait PromptAnalyzer: Send + Sync {
    fn prompt_for(&self, segment_text: &str) -> String;
}

impl<F> PromptAnalyzer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn prompt_for(&self, segment_text: &str) -> String {
        self(segment_text)
    }
}

/// How prompts are distributed across the segments of one request.
#[derive(Clone)]
pub enum PromptPolicy {
    /// Every segment gets a prompt tailored to its own text. Highest
    /// fidelity, highest latency.
    PerSegment(Arc<dyn PromptAnalyzer>),
    /// One prompt, derived from the whole text, repeated on every segment.
    SingleShared,
    /// The full prompt goes on segment 0 only; later segments carry
    /// [`CONTINUATION_PROMPT`] to minimize byte overhead.
    MinimalContinuation,
}

impl fmt::Debug for PromptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptPolicy::PerSegment(_) => f.write_str("PerSegment"),
            PromptPolicy::SingleShared => f.write_str("SingleShared"),
            PromptPolicy::MinimalContinuation => f.write_str("MinimalContinuation"),
        }
    }
}

/// Assigns prompt text per segment index under a combined byte limit.
#[derive(Debug)]
pub struct PromptAllocator {
    policy: PromptPolicy,
    user_prompt: String,
    /// Combined text + prompt limit per request (ceiling minus safety
    /// margin).
    byte_budget: usize,
}

impl PromptAllocator {
    pub fn new(policy: PromptPolicy, user_prompt: impl Into<String>, byte_budget: usize) -> Self {
        Self {
            policy,
            user_prompt: user_prompt.into(),
            byte_budget,
        }
    }

    /// Bytes the planner must reserve for the prompt of segment `index`.
    ///
    /// Per-segment analysis output is not known until after planning, so the
    /// user prompt's length serves as its reservation.
    pub fn reserved_bytes(&self, index: usize) -> usize {
        match self.policy {
            PromptPolicy::PerSegment(_) | PromptPolicy::SingleShared => self.user_prompt.len(),
            PromptPolicy::MinimalContinuation => {
                if index == 0 {
                    self.user_prompt.len()
                } else {
                    CONTINUATION_PROMPT.len()
                }
            }
        }
    }

    /// Fills in the prompt of every planned segment.
    ///
    /// A prompt that would push the combined request over the byte budget is
    /// dropped entirely rather than failing the request: a segment read
    /// without styling beats a segment not read at all.
    pub fn assign(&self, segments: &mut [TextSegment]) {
        for (i, segment) in segments.iter_mut().enumerate() {
            let prompt = match &self.policy {
                PromptPolicy::PerSegment(analyzer) => analyzer.prompt_for(&segment.text),
                PromptPolicy::SingleShared => self.user_prompt.clone(),
                PromptPolicy::MinimalContinuation => {
                    if i == 0 {
                        self.user_prompt.clone()
                    } else {
                        CONTINUATION_PROMPT.to_string()
                    }
                }
            };

            if segment.text.len() + prompt.len() > self.byte_budget {
                warn!(
                    index = segment.index,
                    prompt_bytes = prompt.len(),
                    "dropping prompt to keep the request under the byte limit"
                );
                segment.prompt = String::new();
            } else {
                segment.prompt = prompt;
            }
        }
    }
}
