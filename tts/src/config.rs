use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::engine::VoiceParams;

/// Tuning knobs for a [`SpeechPipeline`](crate::SpeechPipeline).
///
/// ```
/// use std::time::Duration;
/// use tts::{PipelineConfig, VoiceParams};
///
/// let config = PipelineConfig::default()
///     .with_workers(0)
///     .with_voice(VoiceParams::new("Ana Florence", "en"))
///     .with_synthesis_timeout(Duration::from_secs(5));
/// assert_eq!(config.workers, 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of syntheses running at once.
    pub workers: usize,
    pub voice: VoiceParams,
    /// Upper bound on a single synthesis call.
    pub synthesis_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            voice: VoiceParams::default(),
            synthesis_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Set the worker count. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_voice(mut self, voice: VoiceParams) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_synthesis_timeout(mut self, timeout: Duration) -> Self {
        self.synthesis_timeout = timeout;
        self
    }
}
