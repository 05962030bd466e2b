#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use flowcast_client::{FrameSource, PayloadStream};
use flowcast_core::error::{Result, StreamError};
use flowcast_core::frame::{CONNECTED_PAYLOAD, DONE_PAYLOAD, Frame};
use flowcast_core::prelude::*;

pub type FrameTx = mpsc::Sender<Result<String>>;

/// Hands out one pre-made channel per `open()`. Once the queue is empty,
/// opening fails with a connection error.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    channels: Arc<Mutex<VecDeque<mpsc::Receiver<Result<String>>>>>,
}

impl ScriptedSource {
    /// A source with `n` channels, and the senders that feed them.
    pub fn with_channels(n: usize) -> (Self, Vec<FrameTx>) {
        let source = Self::default();
        let senders = (0..n).map(|_| source.push_channel()).collect();
        (source, senders)
    }

    pub fn push_channel(&self) -> FrameTx {
        let (tx, rx) = mpsc::channel(64);
        self.channels.lock().unwrap().push_back(rx);
        tx
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn open(&self) -> Result<PayloadStream> {
        let rx = self
            .channels
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StreamError::ConnectionFailed("connection refused".into()))?;
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

pub fn connected() -> Result<String> {
    Ok(CONNECTED_PAYLOAD.to_string())
}

pub fn done() -> Result<String> {
    Ok(DONE_PAYLOAD.to_string())
}

pub fn event(id: &str, event: FlowEvent) -> Result<String> {
    Frame::Event(TimedEvent::new(id, 0, event)).payload()
}

pub fn node(id: &str) -> Result<String> {
    event(id, FlowEvent::node_created(id, id.to_uppercase(), NodeStatus::Pending, 10.0, 20.0))
}

/// Collects the events passed to `on_event` and signals each arrival.
#[derive(Clone)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<FlowEvent>>>,
    notify: mpsc::UnboundedSender<()>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (notify, rx) = mpsc::unbounded_channel();
        (
            Self {
                seen: Arc::default(),
                notify,
            },
            rx,
        )
    }

    pub fn callback(&self) -> impl FnMut(&FlowEvent) + Clone + Send + 'static {
        let this = self.clone();
        move |event: &FlowEvent| {
            this.seen.lock().unwrap().push(event.clone());
            let _ = this.notify.send(());
        }
    }

    pub fn events(&self) -> Vec<FlowEvent> {
        self.seen.lock().unwrap().clone()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FlowEvent::NodeCreated(data) => Some(data.id),
                _ => None,
            })
            .collect()
    }
}
