use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    select,
    sync::{
        Mutex as AsyncMutex,
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    },
};
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError, TransportResult};
use crate::{Message, Payload, Topic};

/// In-process loopback transport.
///
/// A publish is recorded and, when the topic is currently subscribed,
/// queued for [`receive`](Transport::receive). Messages come out in the
/// order they were published. Useful for tests and single-process setups.
///
/// The handle is cheap to clone; all clones share the same state, so a
/// clone kept outside the multiplexer can be used to inspect it.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    receiver: AsyncMutex<UnboundedReceiver<Message>>,
    closed: CancellationToken,
}

struct State {
    subscriptions: HashSet<Topic>,
    published: Vec<(Topic, Payload)>,
    /// Dropped on `finish`/`close`, which ends the message stream.
    sender: Option<UnboundedSender<Message>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    subscriptions: HashSet::new(),
                    published: Vec::new(),
                    sender: Some(sender),
                }),
                receiver: AsyncMutex::new(receiver),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Deliver a message as if a remote publisher had sent it.
    ///
    /// Returns `false` (and drops the message) when `topic` is not
    /// subscribed or the transport is closed. Not recorded in
    /// [`published`](Self::published).
    pub fn inject(&self, topic: &Topic, payload: impl Into<Payload>) -> bool {
        if self.is_closed() {
            return false;
        }
        let state = self.state();
        self.enqueue(&state, topic, payload.into())
    }

    /// Every successful publish so far, in call order.
    pub fn published(&self) -> Vec<(Topic, Payload)> {
        self.state().published.clone()
    }

    /// Currently subscribed topics, sorted by name.
    pub fn subscriptions(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.state().subscriptions.iter().cloned().collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.state().subscriptions.contains(topic)
    }

    /// Stop accepting messages without discarding queued ones.
    ///
    /// `receive` keeps returning what is already queued and then reports
    /// [`TransportError::Closed`], like a backend stream running dry.
    pub fn finish(&self) {
        self.state().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled() || self.state().sender.is_none()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(&self, state: &State, topic: &Topic, payload: Payload) -> bool {
        if !state.subscriptions.contains(topic) {
            return false;
        }
        state
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(Message::new(topic.clone(), payload)).is_ok())
    }

    fn ensure_open(&self) -> TransportResult {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("subscriptions", &self.subscriptions())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Transport for MemoryTransport {
    async fn publish(&self, topic: &Topic, payload: Payload) -> TransportResult {
        self.ensure_open()?;
        let mut state = self.state();
        state.published.push((topic.clone(), payload.clone()));
        self.enqueue(&state, topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> TransportResult {
        self.ensure_open()?;
        self.state().subscriptions.insert(topic.clone());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &Topic) -> TransportResult {
        self.ensure_open()?;
        self.state().subscriptions.remove(topic);
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Message> {
        let closed = &self.shared.closed;
        let mut receiver = select! {
            biased;
            _ = closed.cancelled() => return Err(TransportError::Closed),
            receiver = self.shared.receiver.lock() => receiver,
        };
        select! {
            biased;
            _ = closed.cancelled() => Err(TransportError::Closed),
            message = receiver.recv() => message.ok_or(TransportError::Closed),
        }
    }

    async fn ping(&self) -> TransportResult {
        self.ensure_open()
    }

    async fn close(&self) -> TransportResult {
        self.shared.closed.cancel();
        self.finish();
        Ok(())
    }
}
