//! Single consumer that plays released clips on the audio device.
//!
//! The worker runs on its own OS thread because device playback blocks. It is
//! the only code that touches the device, which is opened on that thread so
//! implementations need not be `Send`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::engine::AudioClip;
use crate::error::DeviceError;
use crate::reorder::{PlaybackCommand, TurnTally};

/// How a call to [`AudioDevice::play`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    Completed,
    Interrupted,
}

/// Audio output. `play` blocks until the clip has been heard or `stop` is
/// raised.
pub trait AudioDevice {
    fn play(&mut self, clip: &AudioClip, stop: &StopSignal) -> Result<PlayOutcome, DeviceError>;
}

/// Shared record of which turns have been cancelled.
///
/// Turns are numbered from 1 and cancellation always covers every turn up to
/// the one named, so a single watermark is enough.
#[derive(Clone, Debug, Default)]
pub struct PlaybackControl {
    cancelled_through: Arc<AtomicU64>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the clip playing for `turn` (or any earlier turn) and discard the
    /// rest of its clips.
    pub fn cancel_through(&self, turn: u64) {
        self.cancelled_through.fetch_max(turn, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self, turn: u64) -> bool {
        turn <= self.cancelled_through.load(Ordering::SeqCst)
    }

    /// Signal polled by the device while playing a clip of `turn`.
    pub fn signal(&self, turn: u64) -> StopSignal {
        StopSignal {
            turn,
            control: self.clone(),
        }
    }
}

/// Polled by devices during playback to honour cancellation.
#[derive(Clone, Debug)]
pub struct StopSignal {
    turn: u64,
    control: PlaybackControl,
}

impl StopSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        Self {
            turn: u64::MAX,
            control: PlaybackControl::new(),
        }
    }

    pub fn is_raised(&self) -> bool {
        self.turn != u64::MAX && self.control.is_cancelled(self.turn)
    }
}

/// Summary broadcast when the playback worker finishes a turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnReport {
    pub turn: u64,
    pub tally: TurnTally,
    /// Clips that played to the end.
    pub played: u64,
    pub device_errors: u64,
    pub cancelled: bool,
}

/// Progress notifications from the playback worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started { turn: u64, sequence: u64 },
    Finished { turn: u64, sequence: u64 },
    Interrupted { turn: u64, sequence: u64 },
    Discarded { turn: u64, sequence: u64 },
    DeviceFailed { turn: u64, sequence: u64, error: String },
    TurnComplete(TurnReport),
}

/// Handle to the playback thread.
pub struct PlaybackWorker {
    control: PlaybackControl,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Start the playback thread.
    ///
    /// `open_device` runs on the new thread. If it fails, every clip is
    /// reported as a device failure but turns still complete. Each finished
    /// turn is sent on `reports` as well as broadcast on `events`.
    pub fn spawn<F>(
        commands: mpsc::UnboundedReceiver<PlaybackCommand>,
        events: broadcast::Sender<PlaybackEvent>,
        reports: mpsc::UnboundedSender<TurnReport>,
        control: PlaybackControl,
        open_device: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn AudioDevice>, DeviceError> + Send + 'static,
    {
        let thread_control = control.clone();
        let outputs = Outputs { events, reports };
        let handle = std::thread::Builder::new()
            .name("playback".into())
            .spawn(move || run(commands, outputs, thread_control, open_device))?;
        Ok(Self {
            control,
            handle: Some(handle),
        })
    }

    pub fn control(&self) -> &PlaybackControl {
        &self.control
    }

    /// Wait for the thread to exit. It exits once its command channel closes.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("playback thread panicked");
            }
        }
    }
}

struct Outputs {
    events: broadcast::Sender<PlaybackEvent>,
    reports: mpsc::UnboundedSender<TurnReport>,
}

impl Outputs {
    fn event(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }
}

fn run<F>(
    mut commands: mpsc::UnboundedReceiver<PlaybackCommand>,
    out: Outputs,
    control: PlaybackControl,
    open_device: F,
) where
    F: FnOnce() -> Result<Box<dyn AudioDevice>, DeviceError>,
{
    let mut device = match open_device() {
        Ok(device) => Some(device),
        Err(e) => {
            error!(?e, "could not open audio device");
            None
        }
    };
    let mut played = 0;
    let mut device_errors = 0;

    while let Some(cmd) = commands.blocking_recv() {
        match cmd {
            PlaybackCommand::Play(clip) => {
                let (turn, sequence) = (clip.turn, clip.sequence);
                if control.is_cancelled(turn) {
                    debug!(turn, sequence, "discarding clip of cancelled turn");
                    out.event(PlaybackEvent::Discarded { turn, sequence });
                    continue;
                }
                let Some(dev) = device.as_mut() else {
                    device_errors += 1;
                    out.event(PlaybackEvent::DeviceFailed {
                        turn,
                        sequence,
                        error: "no audio device".into(),
                    });
                    continue;
                };
                out.event(PlaybackEvent::Started { turn, sequence });
                let stop = control.signal(turn);
                let result = catch_unwind(AssertUnwindSafe(|| dev.play(&clip, &stop)))
                    .unwrap_or_else(|_| Err(DeviceError::Playback("device panicked".into())));
                match result {
                    Ok(PlayOutcome::Completed) => {
                        played += 1;
                        out.event(PlaybackEvent::Finished { turn, sequence });
                    }
                    Ok(PlayOutcome::Interrupted) => {
                        info!(turn, sequence, "playback interrupted");
                        out.event(PlaybackEvent::Interrupted { turn, sequence });
                    }
                    Err(e) => {
                        warn!(turn, sequence, error = %e, "clip playback failed");
                        device_errors += 1;
                        out.event(PlaybackEvent::DeviceFailed {
                            turn,
                            sequence,
                            error: e.to_string(),
                        });
                    }
                }
            }
            PlaybackCommand::EndOfTurn {
                turn,
                tally,
                cancelled,
            } => {
                let report = TurnReport {
                    turn,
                    tally,
                    played,
                    device_errors,
                    cancelled: cancelled || control.is_cancelled(turn),
                };
                debug!(?report, "turn playback complete");
                out.event(PlaybackEvent::TurnComplete(report));
                let _ = out.reports.send(report);
                played = 0;
                device_errors = 0;
            }
        }
    }
    debug!("playback worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Waveform;

    /// Fails on odd sequences and panics on sequence 4.
    struct Flaky;

    impl AudioDevice for Flaky {
        fn play(&mut self, clip: &AudioClip, _stop: &StopSignal) -> Result<PlayOutcome, DeviceError> {
            match clip.sequence {
                4 => panic!("driver crashed"),
                s if s % 2 == 1 => Err(DeviceError::Playback("underrun".into())),
                _ => Ok(PlayOutcome::Completed),
            }
        }
    }

    fn clip(turn: u64, sequence: u64) -> PlaybackCommand {
        PlaybackCommand::Play(AudioClip::new(
            turn,
            sequence,
            Waveform::new(vec![0.0; 4], 16_000),
        ))
    }

    fn end(turn: u64) -> PlaybackCommand {
        PlaybackCommand::EndOfTurn {
            turn,
            tally: TurnTally::default(),
            cancelled: false,
        }
    }

    #[test]
    fn device_failures_skip_only_the_current_clip() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let worker = PlaybackWorker::spawn(rx, events, report_tx, PlaybackControl::new(), || {
            Ok(Box::new(Flaky) as Box<dyn AudioDevice>)
        })
        .unwrap();
        for seq in 0..6 {
            tx.send(clip(1, seq)).unwrap();
        }
        tx.send(end(1)).unwrap();
        drop(tx);
        worker.join();

        let report = reports.try_recv().unwrap();
        assert_eq!(report.played, 2);
        assert_eq!(report.device_errors, 4);
        assert!(!report.cancelled);
    }

    #[test]
    fn clips_of_cancelled_turns_are_discarded() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, mut event_rx) = broadcast::channel(64);
        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let control = PlaybackControl::new();
        control.cancel_through(1);
        let worker = PlaybackWorker::spawn(rx, events, report_tx, control, || {
            Ok(Box::new(Flaky) as Box<dyn AudioDevice>)
        })
        .unwrap();
        tx.send(clip(1, 0)).unwrap();
        tx.send(end(1)).unwrap();
        tx.send(clip(2, 0)).unwrap();
        tx.send(end(2)).unwrap();
        drop(tx);
        worker.join();

        assert_eq!(
            event_rx.try_recv().unwrap(),
            PlaybackEvent::Discarded {
                turn: 1,
                sequence: 0
            }
        );
        let first = reports.try_recv().unwrap();
        assert!(first.cancelled);
        assert_eq!(first.played, 0);
        let second = reports.try_recv().unwrap();
        assert_eq!((second.turn, second.played), (2, 1));
    }

    #[test]
    fn missing_device_still_completes_turns() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let worker = PlaybackWorker::spawn(rx, events, report_tx, PlaybackControl::new(), || {
            Err(DeviceError::Unavailable("no sound card".into()))
        })
        .unwrap();
        tx.send(clip(1, 0)).unwrap();
        tx.send(end(1)).unwrap();
        drop(tx);
        worker.join();
        assert_eq!(reports.try_recv().unwrap().device_errors, 1);
    }
}
