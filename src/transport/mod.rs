//! The pub/sub backend the multiplexer sits on.
//!
//! The multiplexer only needs a handful of primitives from a backend:
//! publish, subscribe, unsubscribe, a blocking receive, a health probe and
//! close. [`MemoryTransport`] is an in-process loopback; `RedisTransport`
//! (feature `redis`) talks to a Redis server.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::future::Future;

pub use memory::MemoryTransport;
#[cfg(feature = "redis")]
pub use redis::RedisTransport;

use crate::{Message, Payload, Topic};

pub type TransportResult<T = ()> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl TransportError {
    pub fn is_closed(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// A publish/subscribe channel backend.
///
/// All methods take `&self`: the multiplexer calls `receive` from its
/// dispatch task while other tasks concurrently publish, subscribe and
/// unsubscribe. Implementations must make those calls individually safe.
///
/// Although the methods return futures, implementors can write them as
/// `async fn`. No `#[async_trait]` is required.
pub trait Transport: Send + Sync + 'static {
    /// Publish `payload` on `topic`.
    fn publish(
        &self,
        topic: &Topic,
        payload: Payload,
    ) -> impl Future<Output = TransportResult> + Send;

    /// Start receiving messages published on `topic`.
    fn subscribe(&self, topic: &Topic) -> impl Future<Output = TransportResult> + Send;

    /// Stop receiving messages published on `topic`.
    fn unsubscribe(&self, topic: &Topic) -> impl Future<Output = TransportResult> + Send;

    /// Wait for the next message on any subscribed topic.
    ///
    /// Returns [`TransportError::Closed`] once the transport is closed or
    /// its message stream is exhausted. A pending call must complete after
    /// [`close`](Transport::close) is invoked.
    fn receive(&self) -> impl Future<Output = TransportResult<Message>> + Send;

    /// Check that the backend is reachable.
    fn ping(&self) -> impl Future<Output = TransportResult> + Send {
        async { Ok(()) }
    }

    /// Release the backend connection.
    fn close(&self) -> impl Future<Output = TransportResult> + Send;
}
