//! [`AudioDevice`] implementations.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::engine::AudioClip;
use crate::error::DeviceError;
use crate::playback::{AudioDevice, PlayOutcome, StopSignal};

/// Writes each clip to `turn-NNNN-seg-NNNN.wav` inside a directory.
///
/// Useful on machines without a sound card and for inspecting output.
pub struct WavDirDevice {
    dir: PathBuf,
}

impl WavDirDevice {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, DeviceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a clip is written to.
    pub fn clip_path(&self, clip: &AudioClip) -> PathBuf {
        self.dir.join(format!(
            "turn-{:04}-seg-{:04}.wav",
            clip.turn, clip.sequence
        ))
    }
}

impl AudioDevice for WavDirDevice {
    fn play(&mut self, clip: &AudioClip, stop: &StopSignal) -> Result<PlayOutcome, DeviceError> {
        if stop.is_raised() {
            return Ok(PlayOutcome::Interrupted);
        }
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: clip.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = self.clip_path(clip);
        let mut writer = hound::WavWriter::create(&path, spec)?;
        for sample in &clip.samples {
            let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(scaled)?;
        }
        writer.finalize()?;
        debug!(path = %path.display(), "wrote clip");
        Ok(PlayOutcome::Completed)
    }
}

#[cfg(feature = "speaker")]
pub use speaker::SpeakerDevice;

#[cfg(feature = "speaker")]
mod speaker {
    use rodio::{OutputStream, OutputStreamHandle, Sink, buffer::SamplesBuffer};
    use std::time::Duration;

    use super::*;

    const POLL: Duration = Duration::from_millis(20);

    /// Plays clips on the default output device.
    ///
    /// The output stream is not `Send`, so construct this on the playback
    /// thread.
    pub struct SpeakerDevice {
        _stream: OutputStream,
        handle: OutputStreamHandle,
    }

    impl SpeakerDevice {
        pub fn open() -> Result<Self, DeviceError> {
            let (stream, handle) = OutputStream::try_default()
                .map_err(|e| DeviceError::Unavailable(e.to_string()))?;
            Ok(Self {
                _stream: stream,
                handle,
            })
        }
    }

    impl AudioDevice for SpeakerDevice {
        fn play(
            &mut self,
            clip: &AudioClip,
            stop: &StopSignal,
        ) -> Result<PlayOutcome, DeviceError> {
            let sink =
                Sink::try_new(&self.handle).map_err(|e| DeviceError::Playback(e.to_string()))?;
            sink.append(SamplesBuffer::new(
                1,
                clip.sample_rate,
                clip.samples.clone(),
            ));
            while !sink.empty() {
                if stop.is_raised() {
                    sink.stop();
                    return Ok(PlayOutcome::Interrupted);
                }
                std::thread::sleep(POLL);
            }
            Ok(PlayOutcome::Completed)
        }
    }
}
