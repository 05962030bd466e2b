//! Paced replay of a dataset over a frame channel.
//!
//! The emitter writes a connection acknowledgement, waits a short warm-up,
//! then writes each event at `warmup + timestamp` from the start of the
//! stream, and finally writes the terminal marker. Each timer is armed from
//! the previous deadline rather than from the previous write, so slow writes
//! do not push later events back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use flowcast_core::dataset::Dataset;
use flowcast_core::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterOptions {
    pub warmup: Duration,
    pub max_playback: Duration,
    pub write_timeout: Duration,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            warmup: Duration::from_millis(100),
            max_playback: Duration::from_secs(300),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// How a playback ended. `sent` counts event frames only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed { sent: usize },
    Cancelled { sent: usize },
    WriteTimedOut { sent: usize },
    PlaybackTimedOut { sent: usize },
}

impl PlaybackOutcome {
    pub fn sent(&self) -> usize {
        match *self {
            Self::Completed { sent }
            | Self::Cancelled { sent }
            | Self::WriteTimedOut { sent }
            | Self::PlaybackTimedOut { sent } => sent,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::WriteTimedOut { .. } | Self::PlaybackTimedOut { .. })
    }
}

/// Cooperative cancellation flag shared by a playback and its owner.
///
/// Cancelling is idempotent. A cancelled playback writes nothing further.
#[derive(Debug, Clone)]
pub struct CancelFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelFlag::cancel`] has been called, including when
    /// it was called before this future was created.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

enum Write {
    Written,
    Closed,
    TimedOut,
}

/// Replays one dataset. Create one per stream.
#[derive(Debug, Clone)]
pub struct Emitter {
    dataset: Arc<Dataset>,
    options: EmitterOptions,
}

/// A spawned playback.
pub struct PlaybackHandle {
    cancel: CancelFlag,
    task: JoinHandle<PlaybackOutcome>,
}

impl PlaybackHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Wait for the playback to end. A panicked task reports as cancelled.
    pub async fn join(self) -> PlaybackOutcome {
        self.task
            .await
            .unwrap_or(PlaybackOutcome::Cancelled { sent: 0 })
    }
}

impl Emitter {
    pub fn new(dataset: Arc<Dataset>, options: EmitterOptions) -> Self {
        Self { dataset, options }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Run the playback on its own task.
    pub fn spawn(self, tx: mpsc::Sender<Frame>) -> PlaybackHandle {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let task = tokio::spawn(async move { self.run(tx, flag).await });
        PlaybackHandle { cancel, task }
    }

    /// Replay the dataset into `tx` until done, cancelled, or timed out.
    ///
    /// The channel is closed (by dropping `tx`) when this returns. Only a
    /// completed playback writes the terminal marker.
    pub async fn run(self, tx: mpsc::Sender<Frame>, cancel: CancelFlag) -> PlaybackOutcome {
        let deadline = Instant::now() + self.options.max_playback;
        let mut sent = 0usize;

        let played = tokio::time::timeout_at(deadline, self.play(&tx, &cancel, &mut sent)).await;
        let outcome = match played {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(
                    dataset = self.dataset.name(),
                    sent,
                    max_playback_ms = self.options.max_playback.as_millis() as u64,
                    "playback exceeded maximum duration"
                );
                PlaybackOutcome::PlaybackTimedOut { sent }
            }
        };

        match outcome {
            PlaybackOutcome::Completed { .. } => {
                tracing::debug!(dataset = self.dataset.name(), sent, "playback completed")
            }
            PlaybackOutcome::Cancelled { .. } => {
                tracing::debug!(dataset = self.dataset.name(), sent, "playback cancelled")
            }
            _ => {}
        }
        outcome
    }

    async fn play(
        &self,
        tx: &mpsc::Sender<Frame>,
        cancel: &CancelFlag,
        sent: &mut usize,
    ) -> PlaybackOutcome {
        if cancel.is_cancelled() {
            return PlaybackOutcome::Cancelled { sent: *sent };
        }
        match self.write(tx, Frame::Connected).await {
            Write::Written => {}
            Write::Closed => return PlaybackOutcome::Cancelled { sent: *sent },
            Write::TimedOut => return PlaybackOutcome::WriteTimedOut { sent: *sent },
        }

        let mut next_at = Instant::now() + self.options.warmup;

        for (event, delay) in self.dataset.events().iter().zip(self.dataset.delays()) {
            if cancel.is_cancelled() {
                return PlaybackOutcome::Cancelled { sent: *sent };
            }
            next_at += delay;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PlaybackOutcome::Cancelled { sent: *sent },
                _ = tx.closed() => return PlaybackOutcome::Cancelled { sent: *sent },
                _ = tokio::time::sleep_until(next_at) => {}
            }

            // The timer may have fired in the same tick as a cancel.
            if cancel.is_cancelled() {
                return PlaybackOutcome::Cancelled { sent: *sent };
            }
            match self.write(tx, Frame::Event(event.clone())).await {
                Write::Written => *sent += 1,
                Write::Closed => return PlaybackOutcome::Cancelled { sent: *sent },
                Write::TimedOut => return PlaybackOutcome::WriteTimedOut { sent: *sent },
            }
        }

        if cancel.is_cancelled() {
            return PlaybackOutcome::Cancelled { sent: *sent };
        }
        match self.write(tx, Frame::Done).await {
            Write::Written | Write::Closed => PlaybackOutcome::Completed { sent: *sent },
            Write::TimedOut => PlaybackOutcome::WriteTimedOut { sent: *sent },
        }
    }

    /// Write one frame. A closed channel is not an error: the consumer may
    /// leave at any time.
    async fn write(&self, tx: &mpsc::Sender<Frame>, frame: Frame) -> Write {
        match tokio::time::timeout(self.options.write_timeout, tx.send(frame)).await {
            Ok(Ok(())) => Write::Written,
            Ok(Err(_)) => {
                tracing::debug!(dataset = self.dataset.name(), "channel closed, dropping frame");
                Write::Closed
            }
            Err(_) => {
                tracing::warn!(
                    dataset = self.dataset.name(),
                    write_timeout_ms = self.options.write_timeout.as_millis() as u64,
                    "frame write timed out"
                );
                Write::TimedOut
            }
        }
    }
}
