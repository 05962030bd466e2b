//! Stream consumer.
//!
//! A [`FlowConsumer`] owns the graph state, the log trail and at most one
//! active session. Each [`FlowConsumer::start`] spawns a session task that
//! opens a channel through the configured [`FrameSource`], parses frames and
//! folds events into the graph in arrival order.
//!
//! Every mutation made by a session task first checks, under the state lock,
//! that the session is still the active one. A frame that was already in
//! flight when the session was stopped or replaced is therefore discarded
//! instead of leaking into the next session's state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use flowcast_core::error::{FlowcastError, StreamError};
use flowcast_core::event::FlowEvent;
use flowcast_core::fault::{ErrorCode, ErrorDetails, FaultReport};
use flowcast_core::frame::Frame;
use flowcast_core::graph::{FocusChange, FocusUpdate, GraphState, RunStatus};
use flowcast_core::log::{LogEntry, LogTrail};

use crate::config::ConsumerConfig;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{FrameSource, HttpFrameSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Terminal marker received.
    Normal,
    /// Channel-level fault.
    Error,
    /// `stop()` was called.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    Completed,
    /// Stopped, restarted or replaced before it finished.
    Stopped,
    Faulted(FaultReport),
}

/// Point-in-time copy of everything a view renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumerSnapshot {
    pub graph: GraphState,
    pub logs: Vec<LogEntry>,
    pub run_status: RunStatus,
    pub connection: ConnectionState,
    pub last_fault: Option<FaultReport>,
}

/// Handle to one started session.
///
/// Dropping it does not stop the session; use [`FlowConsumer::stop`].
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    epoch: u64,
    task: JoinHandle<SessionEnd>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to end.
    pub async fn wait(self) -> SessionEnd {
        match self.task.await {
            Ok(end) => end,
            Err(e) if e.is_cancelled() => SessionEnd::Stopped,
            Err(e) => SessionEnd::Faulted(FaultReport::from(ErrorDetails::new(
                ErrorCode::RuntimeUnexpected,
                format!("session task panicked: {e}"),
            ))),
        }
    }
}

struct ActiveSession {
    id: Uuid,
    abort: AbortHandle,
}

struct Shared {
    graph: GraphState,
    logs: LogTrail,
    connection: ConnectionState,
    last_fault: Option<FaultReport>,
    active: Option<ActiveSession>,
    /// Bumped by every start and stop, so a pending retry can tell that the
    /// user intervened.
    epoch: u64,
}

impl Shared {
    fn is_active(&self, id: Uuid) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == id)
    }
}

/// Consumes a flow stream and maintains graph state for a view.
#[derive(Clone)]
pub struct FlowConsumer {
    source: Arc<dyn FrameSource>,
    shared: Arc<Mutex<Shared>>,
    focus: Arc<watch::Sender<Option<FocusChange>>>,
    retry: RetryPolicy,
    malformed_limit: u32,
}

impl FlowConsumer {
    /// Consumer reading `config.url` over HTTP.
    pub fn new(config: ConsumerConfig) -> Self {
        let source = HttpFrameSource::new(config.url.clone());
        Self::with_source(source, config)
    }

    pub fn with_source(source: impl FrameSource + 'static, config: ConsumerConfig) -> Self {
        let (focus, _) = watch::channel(None);
        Self {
            source: Arc::new(source),
            shared: Arc::new(Mutex::new(Shared {
                graph: GraphState::new(),
                logs: LogTrail::with_capacity(config.log_capacity),
                connection: ConnectionState::Idle,
                last_fault: None,
                active: None,
                epoch: 0,
            })),
            focus: Arc::new(focus),
            retry: config.retry,
            malformed_limit: config.malformed_frame_limit,
        }
    }

    /// Begin a new session with a fresh graph.
    ///
    /// `on_event` is called on the session task for every parsed event, in
    /// order, after the event has been folded. An already active session is
    /// stopped first. Must be called within a tokio runtime.
    ///
    /// `on_event` runs outside the state lock, so it may call [`stop`] or
    /// [`restart`] itself. Frames the session reads after that are discarded.
    /// A `stop()` from another thread that lands between the fold and the
    /// call does not suppress the callback for that one event.
    ///
    /// [`stop`]: Self::stop
    /// [`restart`]: Self::restart
    pub fn start<F>(&self, on_event: F) -> Session
    where
        F: FnMut(&FlowEvent) + Send + 'static,
    {
        let id = Uuid::new_v4();
        let mut shared = self.lock();
        shared.epoch += 1;
        let epoch = shared.epoch;
        if let Some(previous) = shared.active.take() {
            previous.abort.abort();
            tracing::debug!(session = %previous.id, "replacing active session");
        }

        shared.graph = GraphState::new();
        shared.graph.set_run_status(RunStatus::Starting);
        shared.connection = ConnectionState::Connecting;
        shared.last_fault = None;
        shared.logs.info("starting flow stream");
        self.focus.send_replace(None);

        let ctx = SessionCtx {
            id,
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            focus: Arc::clone(&self.focus),
            malformed_limit: self.malformed_limit,
        };
        let task = tokio::spawn(run_session(ctx, on_event));
        shared.active = Some(ActiveSession {
            id,
            abort: task.abort_handle(),
        });
        drop(shared);

        tracing::info!(session = %id, "session started");
        Session { id, epoch, task }
    }

    /// Tear down the active session, if any. Safe to call in any state and
    /// any number of times.
    pub fn stop(&self) {
        let mut shared = self.lock();
        shared.epoch += 1;
        let Some(active) = shared.active.take() else {
            tracing::debug!("stop requested without an active session");
            return;
        };
        active.abort.abort();

        shared.connection = ConnectionState::Closed(CloseReason::Manual);
        if !shared.graph.run_status().is_finished() {
            shared.graph.set_run_status(RunStatus::Stopped);
        }
        shared.graph.clear_focus();
        self.focus.send_replace(None);
        shared.logs.warning("flow stopped manually");
        tracing::info!(session = %active.id, "session stopped");
    }

    /// Stop, clear graph and logs, then start again.
    pub fn restart<F>(&self, on_event: F) -> Session
    where
        F: FnMut(&FlowEvent) + Send + 'static,
    {
        self.stop();
        {
            let mut shared = self.lock();
            shared.graph = GraphState::new();
            shared.logs.clear();
            shared.last_fault = None;
            shared.connection = ConnectionState::Idle;
            shared.logs.info("restarting flow");
        }
        self.start(on_event)
    }

    /// Run sessions until one completes, retrying faults per the configured
    /// [`RetryPolicy`].
    ///
    /// Returns early with [`SessionEnd::Stopped`] if the consumer is stopped
    /// or restarted while waiting to retry. When retries run out the final
    /// fault is reported as not retryable.
    pub async fn run_with_retry<F>(&self, on_event: F) -> SessionEnd
    where
        F: FnMut(&FlowEvent) + Clone + Send + 'static,
    {
        let mut policy = self.retry.clone();
        loop {
            let session = self.start(on_event.clone());
            let epoch = session.epoch;
            let report = match session.wait().await {
                SessionEnd::Faulted(report) => report,
                other => {
                    policy.reset();
                    return other;
                }
            };
            if self.lock().epoch != epoch {
                return SessionEnd::Stopped;
            }

            match policy.decide(&report.details) {
                RetryDecision::Retry { attempt, delay } => {
                    self.lock().logs.warning(format!(
                        "retrying in {}s (attempt {attempt}/{})",
                        delay.as_secs_f64(),
                        report.details.max_retries
                    ));
                    tracing::warn!(
                        code = %report.details.code,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "retrying stream"
                    );
                    tokio::time::sleep(delay).await;
                    if self.lock().epoch != epoch {
                        return SessionEnd::Stopped;
                    }
                }
                RetryDecision::Exhausted { attempts } => {
                    let mut details = report.details.with_retry_count(attempts);
                    details.retryable = false;
                    let report = FaultReport::from(details);

                    {
                        let mut shared = self.lock();
                        shared.logs.error(format!(
                            "giving up after {attempts} retries: {}",
                            report.details.user_message
                        ));
                        shared.last_fault = Some(report.clone());
                    }
                    tracing::error!(code = %report.details.code, attempts, "stream retries exhausted");
                    return SessionEnd::Faulted(report);
                }
            }
        }
    }

    pub fn snapshot(&self) -> ConsumerSnapshot {
        let shared = self.lock();
        ConsumerSnapshot {
            graph: shared.graph.clone(),
            logs: shared.logs.entries().cloned().collect(),
            run_status: shared.graph.run_status(),
            connection: shared.connection,
            last_fault: shared.last_fault.clone(),
        }
    }

    pub fn run_status(&self) -> RunStatus {
        self.lock().graph.run_status()
    }

    pub fn connection(&self) -> ConnectionState {
        self.lock().connection
    }

    /// Whether a session is connecting or streaming.
    pub fn is_active(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Focus notifications. `None` means no node is focused.
    pub fn focus(&self) -> watch::Receiver<Option<FocusChange>> {
        self.focus.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }
}

// State is only mutated in short synchronous sections, so a poisoned lock
// still holds a consistent value.
fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a session task needs to touch shared state.
struct SessionCtx {
    id: Uuid,
    source: Arc<dyn FrameSource>,
    shared: Arc<Mutex<Shared>>,
    focus: Arc<watch::Sender<Option<FocusChange>>>,
    /// Consecutive malformed frames dropped before the session fails.
    malformed_limit: u32,
}

async fn run_session<F>(ctx: SessionCtx, mut on_event: F) -> SessionEnd
where
    F: FnMut(&FlowEvent) + Send + 'static,
{
    let mut stream = match ctx.source.open().await {
        Ok(stream) => stream,
        Err(err) => return ctx.fail(err),
    };
    if !ctx.opened() {
        return SessionEnd::Stopped;
    }

    let mut malformed = 0u32;
    while let Some(item) = stream.next().await {
        let payload = match item {
            Ok(payload) => payload,
            Err(err) => return ctx.fail(err),
        };
        let frame = Frame::parse(&payload);
        if frame.is_ok() {
            malformed = 0;
        }
        match frame {
            Ok(Frame::Connected) => {
                tracing::debug!(session = %ctx.id, "connection acknowledged");
            }
            Ok(Frame::Done) => return ctx.complete(),
            Ok(Frame::Event(timed)) => {
                if !ctx.fold(&timed.event) {
                    return SessionEnd::Stopped;
                }
                on_event(&timed.event);
            }
            Err(err) => {
                malformed += 1;
                if malformed > ctx.malformed_limit {
                    return ctx.fail(
                        StreamError::Parse(format!("{malformed} consecutive malformed frames, last: {err}"))
                            .into(),
                    );
                }
                if !ctx.drop_frame(&payload, &err) {
                    return SessionEnd::Stopped;
                }
            }
        }
    }

    ctx.fail(StreamError::Interrupted("stream ended before the terminal marker".into()).into())
}

impl SessionCtx {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock_shared(&self.shared)
    }

    fn opened(&self) -> bool {
        let mut shared = self.lock();
        if !shared.is_active(self.id) {
            return false;
        }
        shared.connection = ConnectionState::Open;
        shared.graph.set_run_status(RunStatus::Streaming);
        shared.logs.info("stream connected");
        tracing::info!(session = %self.id, "stream open");
        true
    }

    fn fold(&self, event: &FlowEvent) -> bool {
        let mut shared = self.lock();
        if !shared.is_active(self.id) {
            tracing::debug!(session = %self.id, kind = event.kind(), "discarding event from inactive session");
            return false;
        }
        let outcome = shared.graph.apply(event);
        outcome.write_to(&mut shared.logs);
        match outcome.focus {
            FocusUpdate::Moved(change) => {
                self.focus.send_replace(Some(change));
            }
            FocusUpdate::Cleared => {
                self.focus.send_replace(None);
            }
            FocusUpdate::Unchanged => {}
        }
        true
    }

    fn drop_frame(&self, payload: &str, err: &FlowcastError) -> bool {
        let preview: String = payload.chars().take(80).collect();
        tracing::warn!(session = %self.id, error = %err, payload = %preview, "dropping malformed frame");

        let mut shared = self.lock();
        if !shared.is_active(self.id) {
            return false;
        }
        shared.logs.warning(format!("dropped malformed frame: {err}"));
        true
    }

    fn complete(&self) -> SessionEnd {
        let mut shared = self.lock();
        if !shared.is_active(self.id) {
            return SessionEnd::Stopped;
        }
        shared.active = None;
        shared.connection = ConnectionState::Closed(CloseReason::Normal);
        shared.graph.set_run_status(RunStatus::Completed);
        shared.graph.clear_focus();
        self.focus.send_replace(None);
        shared.logs.success("stream completed");
        tracing::info!(session = %self.id, nodes = shared.graph.node_count(), "stream completed");
        SessionEnd::Completed
    }

    fn fail(&self, err: FlowcastError) -> SessionEnd {
        let details = ErrorDetails::from_error(&err).with_context("session", self.id.to_string());
        let report = FaultReport::from(details);

        let mut shared = self.lock();
        if !shared.is_active(self.id) {
            tracing::debug!(session = %self.id, error = %err, "ignoring fault of inactive session");
            return SessionEnd::Stopped;
        }
        shared.active = None;
        shared.connection = ConnectionState::Closed(CloseReason::Error);
        shared.graph.set_run_status(RunStatus::Errored);
        shared.logs.error(report.details.format_for_log());
        shared.last_fault = Some(report.clone());
        tracing::error!(
            session = %self.id,
            code = %report.details.code,
            error = %err,
            "stream session failed"
        );
        SessionEnd::Faulted(report)
    }
}
