//! Linguistic processing utilities.
//!
//! This crate turns a streamed language-model reply into speakable units. It
//! provides the [`Chatter`] trait and an [`OllamaProvider`] implementation, a
//! [`Segmenter`] that cuts streamed deltas into numbered [`SpeechSegment`]s,
//! and the [`sanitize`] transform that prepares segment text for synthesis.

pub mod provider;
pub mod sanitize;
pub mod segmenter;
pub mod speech;
pub mod types;

pub use crate::provider::*;
pub use crate::sanitize::{MIN_SPEAKABLE_LEN, is_speakable, sanitize};
pub use crate::segmenter::Segmenter;
pub use crate::speech::*;
pub use crate::types::*;
