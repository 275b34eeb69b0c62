use std::time::Duration;
use thiserror::Error;

/// Failure to turn one segment's text into audio.
///
/// These never stop the pipeline: the affected sequence is marked failed
/// and playback moves on.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("nothing to synthesize")]
    EmptyInput,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("tts server returned status {0}")]
    Status(u16),
    #[error("could not decode synthesized audio: {0}")]
    Decode(#[from] hound::Error),
    #[error("synthesis engine failed: {0}")]
    Engine(String),
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
    #[error("synthesized audio is not playable")]
    Unplayable,
}

/// Failure of the audio output device while playing one clip.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("audio device unavailable: {0}")]
    Unavailable(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wav(#[from] hound::Error),
}

/// Turn-level failures reported to the caller of the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("language model stream failed: {0}")]
    Upstream(String),
    #[error("turn interrupted")]
    Interrupted,
    #[error("no turn in progress")]
    NoTurn,
    #[error("playback worker stopped")]
    PlaybackClosed,
    #[error("could not start playback worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Convenience result type used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
