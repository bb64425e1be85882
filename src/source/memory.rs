//! In-process channels.
//!
//! A [`MemoryHub`] owns a set of named channels. Producers push records into
//! a channel; a [`MemorySource`] subscribes to one or more channels and
//! receives every record sent after it subscribed, plus whatever backlog the
//! channel accumulated before the first subscriber arrived (the same retention
//! a broker topic gives a late consumer). The hub also keeps an outbox per
//! channel that memory sinks append to.

use super::{Polled, Record, RecordSource, SourceError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    state: Mutex<HubState>,
    published: Notify,
}

#[derive(Default)]
struct HubState {
    channels: HashMap<String, ChannelState>,
    outboxes: HashMap<String, Vec<Bytes>>,
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<mpsc::UnboundedSender<Record>>,
    backlog: Vec<Record>,
    closed: bool,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self, channel: &str) -> MemoryProducer {
        MemoryProducer {
            hub: self.clone(),
            channel: channel.to_string(),
        }
    }

    pub fn outbox(&self, channel: &str) -> MemoryOutbox {
        MemoryOutbox {
            hub: self.clone(),
            channel: channel.to_string(),
        }
    }

    /// Subscribe to `channels`, draining any backlog into the new source.
    pub fn subscribe(&self, channels: &[String]) -> MemorySource {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();

        for name in channels {
            let channel = state.channels.entry(name.clone()).or_default();
            for record in channel.backlog.drain(..) {
                let _ = tx.send(record);
            }
            if !channel.closed {
                channel.subscribers.push(tx.clone());
            }
        }

        MemorySource {
            rx,
            channels: channels.to_vec(),
        }
    }

    pub(crate) fn append(&self, channel: &str, messages: Vec<Bytes>) {
        self.lock()
            .outboxes
            .entry(channel.to_string())
            .or_default()
            .extend(messages);
        self.inner.published.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Write handle for one channel of a [`MemoryHub`].
#[derive(Clone)]
pub struct MemoryProducer {
    hub: MemoryHub,
    channel: String,
}

impl MemoryProducer {
    /// Send a payload. Returns false if the channel was already closed.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        let mut state = self.hub.lock();
        let channel = state.channels.entry(self.channel.clone()).or_default();
        if channel.closed {
            return false;
        }

        let record = Record::new(self.channel.clone(), payload);
        channel.subscribers.retain(|tx| !tx.is_closed());
        if channel.subscribers.is_empty() {
            channel.backlog.push(record);
        } else {
            for tx in &channel.subscribers {
                let _ = tx.send(record.clone());
            }
        }
        true
    }

    /// Close the channel. Subscribers see end of stream once every channel
    /// they subscribed to is closed and drained.
    pub fn close(&self) {
        let mut state = self.hub.lock();
        let channel = state.channels.entry(self.channel.clone()).or_default();
        channel.closed = true;
        channel.subscribers.clear();
    }
}

/// Read handle for the messages memory sinks published to one channel.
#[derive(Clone)]
pub struct MemoryOutbox {
    hub: MemoryHub,
    channel: String,
}

impl MemoryOutbox {
    pub fn messages(&self) -> Vec<Bytes> {
        self.hub
            .lock()
            .outboxes
            .get(&self.channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Messages decoded as UTF-8 (lossy).
    pub fn messages_as_strings(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|m| String::from_utf8_lossy(m).into_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.hub
            .lock()
            .outboxes
            .get(&self.channel)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until at least `count` messages were published or `timeout` elapsed.
    /// Returns whether the count was reached.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.hub.inner.published.notified();
            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Record>,
    channels: Vec<String>,
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn poll(&mut self, timeout: Duration) -> Result<Polled, SourceError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(record)) => Ok(Polled::Record(record)),
            Ok(None) => Ok(Polled::Closed),
            Err(_) => Ok(Polled::Empty),
        }
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.channels.join(","))
    }
}
