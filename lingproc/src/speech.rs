use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sanitize::{is_speakable, sanitize};

/// Progress of a [`SpeechSegment`] through synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentStatus {
    Pending,
    Synthesizing,
    Ready,
    Skipped,
    Failed,
}

impl SegmentStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Skipped | Self::Failed)
    }

    fn allows(self, next: SegmentStatus) -> bool {
        use SegmentStatus::*;
        matches!(
            (self, next),
            (Pending, Synthesizing) | (Pending, Skipped) | (Synthesizing, Ready | Skipped | Failed)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("segment {sequence}: cannot move from {from:?} to {to:?}")]
pub struct StatusError {
    pub sequence: u64,
    pub from: SegmentStatus,
    pub to: SegmentStatus,
}

/// A unit of text scheduled for independent speech synthesis.
///
/// Everything except [`status`](Self::status) is fixed at creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechSegment {
    sequence: u64,
    raw_text: String,
    sanitized_text: String,
    status: SegmentStatus,
}

impl SpeechSegment {
    /// Create a pending segment, sanitizing `raw_text` once up front.
    pub fn new(sequence: u64, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let sanitized_text = sanitize(&raw_text);
        Self {
            sequence,
            raw_text,
            sanitized_text,
            status: SegmentStatus::Pending,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn sanitized_text(&self) -> &str {
        &self.sanitized_text
    }

    pub fn status(&self) -> SegmentStatus {
        self.status
    }

    /// Whether the sanitized text survives the discard policy.
    pub fn is_speakable(&self) -> bool {
        is_speakable(&self.sanitized_text)
    }

    /// Advance the status. Transitions only move forward.
    pub fn transition(&mut self, next: SegmentStatus) -> Result<(), StatusError> {
        if !self.status.allows(next) {
            return Err(StatusError {
                sequence: self.sequence,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
