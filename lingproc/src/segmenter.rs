//! Stateful segmenter for streamed LLM output.
//!
//! The language model delivers tokens rather than sentences, so boundaries are
//! detected on each newly arrived delta. A delta containing `.`, `!`, `?` or a
//! newline closes the current buffer and turns it into a [`SpeechSegment`].
//! Every newline counts as a hard boundary, even in the middle of a clause.

use crate::speech::SpeechSegment;
use tracing::trace;

const BOUNDARIES: [char; 4] = ['.', '!', '?', '\n'];

/// Buffers text deltas and emits numbered speech segments.
///
/// Sequence numbers start at 0 and increase by one for each emitted segment
/// until [`reset`](Self::reset) starts a new turn.
///
/// ```
/// use lingproc::Segmenter;
///
/// let mut seg = Segmenter::new();
/// assert!(seg.feed("Hello").is_none());
/// let first = seg.feed(" world.").unwrap();
/// assert_eq!(first.raw_text(), "Hello world.");
/// assert_eq!(first.sequence(), 0);
/// ```
#[derive(Debug, Default)]
pub struct Segmenter {
    buf: String,
    next_sequence: u64,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `delta` and return a segment if it closed a boundary.
    pub fn feed(&mut self, delta: &str) -> Option<SpeechSegment> {
        self.buf.push_str(delta);
        if delta.contains(BOUNDARIES) {
            self.cut()
        } else {
            None
        }
    }

    /// Emit whatever remains in the buffer at end of stream.
    pub fn flush(&mut self) -> Option<SpeechSegment> {
        self.cut()
    }

    /// Drop buffered text and restart numbering for a new turn.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.next_sequence = 0;
    }

    /// Number of segments emitted since the last reset.
    pub fn issued(&self) -> u64 {
        self.next_sequence
    }

    /// Text buffered since the last boundary.
    pub fn pending(&self) -> &str {
        &self.buf
    }

    fn cut(&mut self) -> Option<SpeechSegment> {
        let text = std::mem::take(&mut self.buf);
        let text = text.trim();
        if text.chars().all(|c| c.is_ascii_punctuation() || c.is_whitespace()) {
            if !text.is_empty() {
                trace!(%text, "dropping punctuation-only fragment");
            }
            return None;
        }
        let segment = SpeechSegment::new(self.next_sequence, text);
        self.next_sequence += 1;
        Some(segment)
    }
}
