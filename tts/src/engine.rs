use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SynthesisError;

/// Voice selection passed through to the synthesis engine untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub speaker: Option<String>,
    pub language: Option<String>,
}

impl VoiceParams {
    pub fn new(speaker: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            speaker: Some(speaker.into()),
            language: Some(language.into()),
        }
    }
}

/// Mono samples produced by a synthesis engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Whether a device could sensibly play this waveform.
    pub fn is_playable(&self) -> bool {
        self.sample_rate > 0
            && !self.samples.is_empty()
            && self.samples.iter().all(|s| s.is_finite())
    }
}

/// Audio for one segment, tagged with where it belongs in the conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioClip {
    pub turn: u64,
    pub sequence: u64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(turn: u64, sequence: u64, waveform: Waveform) -> Self {
        Self {
            turn,
            sequence,
            samples: waveform.samples,
            sample_rate: waveform.sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

/// Text-to-speech engine interface.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with the given voice.
    async fn synthesize(&self, text: &str, voice: &VoiceParams)
    -> Result<Waveform, SynthesisError>;

    /// Whether several calls may run at once. Engines returning `false`
    /// are driven by a single worker.
    fn supports_concurrency(&self) -> bool {
        true
    }
}
