//! Bounded pool of synthesis workers.
//!
//! Each speakable segment gets its own task, but tasks must hold a permit
//! from a shared semaphore while they talk to the engine. Dispatching never
//! waits: tasks beyond the pool size simply queue on the semaphore.
//!
//! The runtime may poll freshly spawned tasks in any order, so each task
//! waits for its predecessor to hold a permit before asking for one. Permits
//! are therefore granted in dispatch order.

use futures::FutureExt;
use lingproc::{SegmentStatus, SpeechSegment};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::config::PipelineConfig;
use crate::engine::{AudioClip, Synthesizer, VoiceParams, Waveform};
use crate::error::SynthesisError;
use crate::reorder::{OrderedPlaybackQueue, Outcome};

/// Turns segments into outcomes on the [`OrderedPlaybackQueue`].
pub struct Dispatcher {
    synth: Arc<dyn Synthesizer>,
    voice: Arc<VoiceParams>,
    queue: Arc<OrderedPlaybackQueue>,
    permits: Arc<Semaphore>,
    workers: usize,
    timeout: Duration,
    tasks: JoinSet<()>,
    /// Fires once the most recently dispatched task holds its permit.
    last_gate: Option<oneshot::Receiver<()>>,
}

impl Dispatcher {
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        queue: Arc<OrderedPlaybackQueue>,
        config: &PipelineConfig,
    ) -> Self {
        let workers = if synth.supports_concurrency() {
            config.workers.max(1)
        } else {
            1
        };
        debug!(workers, "starting synthesis pool");
        Self {
            synth,
            voice: Arc::new(config.voice.clone()),
            queue,
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            timeout: config.synthesis_timeout,
            tasks: JoinSet::new(),
            last_gate: None,
        }
    }

    /// Size of the worker pool.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tasks spawned and not yet reaped, whether queued or running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Schedule `segment` for synthesis as part of `turn`.
    ///
    /// Unspeakable segments are recorded as skipped straight away.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime when the segment needs synthesis.
    pub fn dispatch(&mut self, turn: u64, mut segment: SpeechSegment) {
        self.reap();
        let sequence = segment.sequence();
        if !segment.is_speakable() {
            debug!(turn, sequence, raw = segment.raw_text(), "skipping unspeakable segment");
            mark(&mut segment, SegmentStatus::Skipped);
            self.queue.submit(turn, sequence, Outcome::Skipped);
            return;
        }

        let synth = self.synth.clone();
        let voice = self.voice.clone();
        let queue = self.queue.clone();
        let permits = self.permits.clone();
        let timeout = self.timeout;
        let previous = self.last_gate.take();
        let (gate, next_gate) = oneshot::channel();
        self.last_gate = Some(next_gate);
        trace!(turn, sequence, text = segment.sanitized_text(), "queueing synthesis");
        self.tasks.spawn(async move {
            if let Some(previous) = previous {
                // An error means the predecessor was aborted.
                let _ = previous.await;
            }
            let Ok(_permit) = permits.acquire_owned().await else {
                queue.submit(turn, sequence, Outcome::Failed);
                return;
            };
            let _ = gate.send(());
            mark(&mut segment, SegmentStatus::Synthesizing);
            let result = AssertUnwindSafe(synthesize(
                synth.as_ref(),
                &voice,
                segment.sanitized_text(),
                timeout,
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(SynthesisError::Engine("synthesis worker panicked".into())));
            match result {
                Ok(waveform) => {
                    mark(&mut segment, SegmentStatus::Ready);
                    debug!(turn, sequence, samples = waveform.samples.len(), "segment synthesized");
                    queue.submit(
                        turn,
                        sequence,
                        Outcome::Ready(AudioClip::new(turn, sequence, waveform)),
                    );
                }
                Err(e) => {
                    warn!(turn, sequence, error = %e, "synthesis failed");
                    mark(&mut segment, SegmentStatus::Failed);
                    queue.submit(turn, sequence, Outcome::Failed);
                }
            }
        });
    }

    /// Cancel every queued and running synthesis. Their permits return to the
    /// pool once the tasks are dropped.
    pub fn abort(&mut self) {
        if !self.tasks.is_empty() {
            debug!(tasks = self.tasks.len(), "aborting synthesis tasks");
        }
        self.tasks.abort_all();
        self.last_gate = None;
    }

    /// Wait until every spawned task has finished or been aborted.
    pub async fn wait_idle(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    fn reap(&mut self) {
        while let Some(res) = self.tasks.try_join_next() {
            if let Err(e) = res {
                if !e.is_cancelled() {
                    warn!(error = %e, "synthesis task ended abnormally");
                }
            }
        }
    }
}

async fn synthesize(
    synth: &dyn Synthesizer,
    voice: &VoiceParams,
    text: &str,
    timeout: Duration,
) -> Result<Waveform, SynthesisError> {
    let waveform = tokio::time::timeout(timeout, synth.synthesize(text, voice))
        .await
        .map_err(|_| SynthesisError::Timeout(timeout))??;
    if !waveform.is_playable() {
        return Err(SynthesisError::Unplayable);
    }
    Ok(waveform)
}

fn mark(segment: &mut SpeechSegment, status: SegmentStatus) {
    if let Err(e) = segment.transition(status) {
        warn!(error = %e, "unexpected segment status change");
    }
}
