//! Streaming speech pipeline.
//!
//! ```text
//! deltas ─▶ Segmenter ─▶ Dispatcher (W workers) ─▶ OrderedPlaybackQueue ─▶ PlaybackWorker
//! ```
//!
//! Speech starts as soon as the first sentence has been synthesized while the
//! language model keeps streaming the rest of the reply.

use lingproc::{ChatStream, Segmenter};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::dispatcher::Dispatcher;
use crate::engine::Synthesizer;
use crate::error::{DeviceError, PipelineError, Result};
use crate::playback::{AudioDevice, PlaybackControl, PlaybackEvent, PlaybackWorker, TurnReport};
use crate::reorder::OrderedPlaybackQueue;

const EVENT_CAPACITY: usize = 256;

/// Owns every stage of the pipeline for the lifetime of a conversation.
///
/// Turns are numbered from 1. Within a turn segments are numbered from 0.
pub struct SpeechPipeline {
    segmenter: Segmenter,
    dispatcher: Dispatcher,
    queue: Arc<OrderedPlaybackQueue>,
    control: PlaybackControl,
    worker: Option<PlaybackWorker>,
    events: broadcast::Sender<PlaybackEvent>,
    reports: mpsc::UnboundedReceiver<TurnReport>,
    turn: u64,
    active: bool,
    accepting: bool,
    transcript: String,
}

impl SpeechPipeline {
    /// Build the pipeline and start its playback thread.
    ///
    /// `open_device` is called once on the playback thread.
    pub fn new<F>(config: PipelineConfig, synth: Arc<dyn Synthesizer>, open_device: F) -> Result<Self>
    where
        F: FnOnce() -> std::result::Result<Box<dyn AudioDevice>, DeviceError> + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (report_tx, reports) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let control = PlaybackControl::new();
        let worker =
            PlaybackWorker::spawn(cmd_rx, events.clone(), report_tx, control.clone(), open_device)?;
        let queue = Arc::new(OrderedPlaybackQueue::new(cmd_tx));
        let dispatcher = Dispatcher::new(synth, queue.clone(), &config);
        Ok(Self {
            segmenter: Segmenter::new(),
            dispatcher,
            queue,
            control,
            worker: Some(worker),
            events,
            reports,
            turn: 0,
            active: false,
            accepting: false,
            transcript: String::new(),
        })
    }

    /// Receive playback progress for all subsequent turns.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Current (or most recent) turn number. Zero before the first turn.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Text fed into the current turn so far.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Start a new turn, cancelling any turn still in progress.
    pub fn begin_turn(&mut self) -> u64 {
        if self.active {
            self.cancel_turn();
        }
        self.turn += 1;
        self.queue.begin_turn(self.turn);
        self.segmenter.reset();
        self.transcript.clear();
        self.active = true;
        self.accepting = true;
        info!(turn = self.turn, "turn started");
        self.turn
    }

    /// Feed one text delta. Ignored unless a turn is accepting input.
    ///
    /// # Panics
    ///
    /// A completed segment is handed to a spawned synthesis task, so this
    /// panics when called outside a Tokio runtime.
    pub fn feed(&mut self, delta: &str) {
        if !self.accepting {
            debug!(turn = self.turn, "ignoring delta outside an open turn");
            return;
        }
        self.transcript.push_str(delta);
        if let Some(segment) = self.segmenter.feed(delta) {
            debug!(turn = self.turn, sequence = segment.sequence(), "segment ready");
            self.dispatcher.dispatch(self.turn, segment);
        }
    }

    /// Close the turn and wait until all of its audio has played.
    pub async fn finish_turn(&mut self) -> Result<TurnReport> {
        if !self.active {
            return Err(PipelineError::NoTurn);
        }
        self.close_input();
        self.wait_report().await
    }

    /// Cancel the current turn: stop taking deltas, abort synthesis, stop the
    /// clip being played and drop every clip not yet heard.
    ///
    /// The turn's report still arrives; [`finish_turn`](Self::finish_turn)
    /// collects it.
    pub fn cancel_turn(&mut self) {
        if !self.active {
            return;
        }
        info!(turn = self.turn, issued = self.segmenter.issued(), "cancelling turn");
        self.accepting = false;
        self.dispatcher.abort();
        self.queue.cancel(self.turn, self.segmenter.issued());
        self.control.cancel_through(self.turn);
        self.segmenter.reset();
    }

    /// Speak a complete piece of text as its own turn.
    pub async fn speak(&mut self, text: &str) -> Result<TurnReport> {
        self.begin_turn();
        self.feed(text);
        self.finish_turn().await
    }

    /// Speak a streamed reply as one turn.
    ///
    /// If `interrupt` resolves first the turn is cancelled and
    /// [`PipelineError::Interrupted`] returned. An error item in the stream
    /// cancels the turn and is returned as [`PipelineError::Upstream`]. In
    /// every case [`transcript`](Self::transcript) holds the text received.
    pub async fn speak_stream<I>(&mut self, mut stream: ChatStream, interrupt: I) -> Result<TurnReport>
    where
        I: Future<Output = ()>,
    {
        self.begin_turn();
        tokio::pin!(interrupt);
        loop {
            tokio::select! {
                biased;
                _ = &mut interrupt => return self.abandon(PipelineError::Interrupted).await,
                item = stream.next() => match item {
                    Some(Ok(delta)) => self.feed(&delta),
                    Some(Err(e)) => {
                        warn!(turn = self.turn, error = %e, "chat stream failed");
                        return self.abandon(PipelineError::Upstream(format!("{e:#}"))).await;
                    }
                    None => break,
                },
            }
        }
        self.close_input();
        let turn = self.turn;
        tokio::select! {
            biased;
            _ = &mut interrupt => self.abandon(PipelineError::Interrupted).await,
            report = wait_for(&mut self.reports, turn) => {
                self.active = false;
                report
            }
        }
    }

    /// Stop everything and wait for the playback thread to exit.
    pub async fn shutdown(mut self) {
        self.cancel_turn();
        self.dispatcher.abort();
        self.dispatcher.wait_idle().await;
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            if tokio::task::spawn_blocking(move || worker.join()).await.is_err() {
                warn!("playback thread join failed");
            }
        }
        debug!("speech pipeline shut down");
    }

    fn close_input(&mut self) {
        if !self.accepting {
            return;
        }
        self.accepting = false;
        if let Some(segment) = self.segmenter.flush() {
            debug!(turn = self.turn, sequence = segment.sequence(), "flushed residual text");
            self.dispatcher.dispatch(self.turn, segment);
        }
        self.queue.finish(self.turn, self.segmenter.issued());
    }

    async fn abandon(&mut self, err: PipelineError) -> Result<TurnReport> {
        self.cancel_turn();
        self.wait_report().await?;
        Err(err)
    }

    async fn wait_report(&mut self) -> Result<TurnReport> {
        let report = wait_for(&mut self.reports, self.turn).await;
        self.active = false;
        report
    }
}

/// Wait for the report of `turn`, skipping those of earlier turns.
async fn wait_for(reports: &mut mpsc::UnboundedReceiver<TurnReport>, turn: u64) -> Result<TurnReport> {
    while let Some(report) = reports.recv().await {
        if report.turn == turn {
            info!(
                turn,
                played = report.played,
                failed = report.tally.failed,
                cancelled = report.cancelled,
                "turn finished"
            );
            return Ok(report);
        }
    }
    Err(PipelineError::PlaybackClosed)
}
