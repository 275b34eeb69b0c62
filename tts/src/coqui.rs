//! Client for a Coqui TTS server.

use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use reqwest::{Client, Url};
use std::io::Cursor;
use tracing::debug;

use crate::engine::{Synthesizer, VoiceParams, Waveform};
use crate::error::SynthesisError;

/// [`Synthesizer`] that requests WAV audio from a Coqui `/api/tts` endpoint.
#[derive(Clone)]
pub struct CoquiTts {
    url: String,
    client: Client,
}

impl CoquiTts {
    /// Create a new client targeting `url` (e.g. `http://localhost:5002/api/tts`).
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
        }
    }

    fn request_url(&self, text: &str, voice: &VoiceParams) -> Result<Url, SynthesisError> {
        let mut url =
            Url::parse(&self.url).map_err(|e| SynthesisError::Engine(format!("bad url: {e}")))?;
        {
            // The server expects every parameter, even when empty.
            let mut qp = url.query_pairs_mut();
            qp.append_pair("text", text);
            qp.append_pair("speaker_id", voice.speaker.as_deref().unwrap_or(""));
            qp.append_pair("style_wav", "");
            qp.append_pair("language_id", voice.language.as_deref().unwrap_or(""));
        }
        Ok(url)
    }
}

#[async_trait]
impl Synthesizer for CoquiTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceParams,
    ) -> Result<Waveform, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::EmptyInput);
        }
        let url = self.request_url(text, voice)?;
        debug!(%url, "requesting TTS");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SynthesisError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        decode_wav(&bytes)
    }
}

/// Decode a WAV file into mono `f32` samples, averaging channels.
pub fn decode_wav(bytes: &[u8]) -> Result<Waveform, SynthesisError> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };
    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok(Waveform::new(samples, spec.sample_rate))
}
