//! Speak streamed LLM output with low latency.
//!
//! Text deltas are split into sentences by [`lingproc::Segmenter`], each
//! sentence is synthesized by a bounded pool of workers, and the resulting
//! clips are played strictly in order on a single audio device. See
//! [`SpeechPipeline`] for the entry point.

mod config;
mod coqui;
mod device;
mod dispatcher;
mod engine;
mod error;
mod pipeline;
mod playback;
mod reorder;

pub use config::PipelineConfig;
pub use coqui::{CoquiTts, decode_wav};
#[cfg(feature = "speaker")]
pub use device::SpeakerDevice;
pub use device::WavDirDevice;
pub use dispatcher::Dispatcher;
pub use engine::{AudioClip, Synthesizer, VoiceParams, Waveform};
pub use error::{DeviceError, PipelineError, Result, SynthesisError};
pub use pipeline::SpeechPipeline;
pub use playback::{
    AudioDevice, PlayOutcome, PlaybackControl, PlaybackEvent, PlaybackWorker, StopSignal,
    TurnReport,
};
pub use reorder::{OrderedPlaybackQueue, Outcome, PlaybackCommand, TurnTally};
