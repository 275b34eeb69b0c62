//! Reorder buffer between synthesis and playback.
//!
//! Synthesis workers finish in whatever order their latencies dictate. The
//! [`OrderedPlaybackQueue`] holds early finishers until every earlier
//! sequence number has an outcome, then hands clips to the player strictly in
//! sequence order. Skipped and failed sequences advance the cursor without
//! producing audio.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::engine::AudioClip;

/// Fate of one sequence number.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Ready(AudioClip),
    Skipped,
    Failed,
}

/// Per-turn count of consumed outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TurnTally {
    pub ready: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Sequences terminated by cancellation before they were released.
    pub discarded: u64,
}

/// Instructions for the playback worker, in release order.
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackCommand {
    Play(AudioClip),
    EndOfTurn {
        turn: u64,
        tally: TurnTally,
        cancelled: bool,
    },
}

#[derive(Debug)]
struct ReorderState {
    turn: u64,
    next_to_play: u64,
    slots: BTreeMap<u64, Outcome>,
    end: Option<u64>,
    tally: TurnTally,
    complete: bool,
    out: Option<mpsc::UnboundedSender<PlaybackCommand>>,
}

impl ReorderState {
    fn reset(&mut self, turn: u64) {
        self.turn = turn;
        self.next_to_play = 0;
        self.slots.clear();
        self.end = None;
        self.tally = TurnTally::default();
        self.complete = false;
    }

    fn emit(&self, cmd: PlaybackCommand) {
        if let Some(out) = &self.out {
            let _ = out.send(cmd);
        }
    }

    fn release(&mut self) {
        while let Some(outcome) = self.slots.remove(&self.next_to_play) {
            let sequence = self.next_to_play;
            self.next_to_play += 1;
            match outcome {
                Outcome::Ready(clip) => {
                    self.tally.ready += 1;
                    trace!(turn = self.turn, sequence, "releasing clip");
                    self.emit(PlaybackCommand::Play(clip));
                }
                Outcome::Skipped => self.tally.skipped += 1,
                Outcome::Failed => self.tally.failed += 1,
            }
        }
        if self.end == Some(self.next_to_play) && !self.complete {
            self.complete = true;
            self.emit(PlaybackCommand::EndOfTurn {
                turn: self.turn,
                tally: self.tally,
                cancelled: false,
            });
        }
    }
}

/// Releases outcomes in sequence order regardless of submission order.
pub struct OrderedPlaybackQueue {
    state: Mutex<ReorderState>,
}

impl OrderedPlaybackQueue {
    /// Create a queue feeding `out`. It starts in turn 0 with nothing pending.
    pub fn new(out: mpsc::UnboundedSender<PlaybackCommand>) -> Self {
        Self {
            state: Mutex::new(ReorderState {
                turn: 0,
                next_to_play: 0,
                slots: BTreeMap::new(),
                end: None,
                tally: TurnTally::default(),
                complete: false,
                out: Some(out),
            }),
        }
    }

    /// Discard any previous state and start accepting outcomes for `turn`.
    pub fn begin_turn(&self, turn: u64) {
        let mut state = self.state.lock();
        if !state.slots.is_empty() {
            debug!(
                turn = state.turn,
                held = state.slots.len(),
                "dropping unreleased outcomes"
            );
        }
        state.reset(turn);
    }

    /// Record the outcome for `sequence` and release everything now in order.
    ///
    /// Outcomes for another turn, for a sequence already released, or for a
    /// sequence that already has an outcome are ignored.
    pub fn submit(&self, turn: u64, sequence: u64, outcome: Outcome) {
        let mut state = self.state.lock();
        if turn != state.turn || state.complete {
            trace!(turn, sequence, "ignoring outcome for inactive turn");
            return;
        }
        if sequence < state.next_to_play || state.slots.contains_key(&sequence) {
            trace!(turn, sequence, "ignoring duplicate outcome");
            return;
        }
        state.slots.insert(sequence, outcome);
        state.release();
    }

    /// Declare that the current turn produced `total` segments.
    ///
    /// Once sequences `0..total` have all been released the playback worker
    /// receives [`PlaybackCommand::EndOfTurn`].
    pub fn finish(&self, turn: u64, total: u64) {
        let mut state = self.state.lock();
        if turn != state.turn || state.complete {
            return;
        }
        state.end = Some(total);
        state.release();
    }

    /// Terminate every outstanding sequence below `issued` without audio and
    /// end the turn.
    pub fn cancel(&self, turn: u64, issued: u64) {
        let mut state = self.state.lock();
        if turn != state.turn || state.complete {
            return;
        }
        let outstanding = issued.saturating_sub(state.next_to_play);
        debug!(
            turn,
            next = state.next_to_play,
            outstanding,
            "cancelling outstanding sequences"
        );
        state.slots.clear();
        state.tally.discarded += outstanding;
        state.next_to_play = state.next_to_play.max(issued);
        state.complete = true;
        let tally = state.tally;
        state.emit(PlaybackCommand::EndOfTurn {
            turn,
            tally,
            cancelled: true,
        });
    }

    /// Drop the channel to the playback worker so it can drain and exit.
    pub fn close(&self) {
        self.state.lock().out = None;
    }

    /// Next sequence number the player is waiting on.
    pub fn next_to_play(&self) -> u64 {
        self.state.lock().next_to_play
    }

    /// Number of outcomes held back waiting for an earlier sequence.
    pub fn held(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Whether the current turn has been fully released or cancelled.
    pub fn is_complete(&self) -> bool {
        self.state.lock().complete
    }
}
