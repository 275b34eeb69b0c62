use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tts::{AudioDevice, DeviceError, PipelineConfig, VoiceParams, WavDirDevice};

use crate::DEFAULT_SYSTEM_PROMPT;

/// Builds the audio device on the playback thread.
pub type DeviceFactory = Box<dyn FnOnce() -> Result<Box<dyn AudioDevice>, DeviceError> + Send>;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Voice chat with a local language model")]
pub struct Cli {
    /// Base URL of the Ollama server
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,
    /// Model used for replies
    #[arg(long, env = "OLLAMA_MODEL", default_value = "emma")]
    pub model: String,
    /// Coqui TTS endpoint
    #[arg(long, env = "COQUI_URL", default_value = "http://localhost:5002/api/tts")]
    pub tts_url: String,
    #[arg(long, env = "SPEAKER", default_value = "Ana Florence")]
    pub speaker: String,
    #[arg(long, env = "TTS_LANGUAGE", default_value = "en")]
    pub language: String,
    /// Sentences synthesized at once
    #[arg(long, env = "TTS_WORKERS", default_value_t = 2)]
    pub workers: usize,
    /// Seconds allowed for one synthesis request
    #[arg(long, env = "TTS_TIMEOUT", default_value_t = 30)]
    pub synthesis_timeout: u64,
    /// Write clips to this directory instead of the speakers
    #[arg(long, env = "WAV_DIR")]
    pub wav_dir: Option<PathBuf>,
    /// Seconds to wait for the user before listening again
    #[arg(long, env = "LISTEN_TIMEOUT", default_value_t = 300)]
    pub listen_timeout: u64,
    #[arg(long, env = "SYSTEM_PROMPT", default_value = DEFAULT_SYSTEM_PROMPT)]
    pub system_prompt: String,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::default()
            .with_workers(self.workers)
            .with_voice(VoiceParams::new(&self.speaker, &self.language))
            .with_synthesis_timeout(Duration::from_secs(self.synthesis_timeout))
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.listen_timeout)
    }

    /// Choose the output device: a WAV directory when `--wav-dir` is given,
    /// the speakers otherwise.
    pub fn device_factory(&self) -> anyhow::Result<DeviceFactory> {
        if let Some(dir) = self.wav_dir.clone() {
            return Ok(Box::new(move || {
                Ok(Box::new(WavDirDevice::new(dir)?) as Box<dyn AudioDevice>)
            }));
        }
        speaker_factory()
    }
}

#[cfg(feature = "speaker")]
fn speaker_factory() -> anyhow::Result<DeviceFactory> {
    Ok(Box::new(|| {
        Ok(Box::new(tts::SpeakerDevice::open()?) as Box<dyn AudioDevice>)
    }))
}

#[cfg(not(feature = "speaker"))]
fn speaker_factory() -> anyhow::Result<DeviceFactory> {
    anyhow::bail!("built without the `speaker` feature; pass --wav-dir to write clips to disk")
}
