use std::{
    collections::HashSet,
    mem,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures_util::StreamExt;
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{MultiplexedConnection, PubSubSink, PubSubStream},
};
use tokio::select;
use tokio_util::sync::CancellationToken;

use super::{Transport, TransportError, TransportResult};
use crate::{Message, Payload, Topic};

/// Redis pub/sub backend.
///
/// Uses a multiplexed connection for `PUBLISH`/`PING` and a dedicated
/// pub/sub connection, split into a command sink and a message stream, for
/// subscriptions and message receipt. `close` unsubscribes from every channel
/// and drops both connections; every later call fails with
/// [`TransportError::Closed`].
pub struct RedisTransport {
    connection: Mutex<Option<MultiplexedConnection>>,
    sink: Mutex<Option<PubSubSink>>,
    stream: tokio::sync::Mutex<Option<PubSubStream>>,
    channels: Mutex<HashSet<String>>,
    closed: CancellationToken,
}

impl RedisTransport {
    /// Connect to `address`, given as `host:port` or a `redis://` URL.
    pub async fn connect(address: &str) -> TransportResult<Self> {
        let client = Client::open(connection_url(address))?;
        let connection = client.get_multiplexed_async_connection().await?;
        let (sink, stream) = client.get_async_pubsub().await?.split();
        tracing::debug!(address, "connected to redis");
        Ok(Self {
            connection: Mutex::new(Some(connection)),
            sink: Mutex::new(Some(sink)),
            stream: tokio::sync::Mutex::new(Some(stream)),
            channels: Mutex::new(HashSet::new()),
            closed: CancellationToken::new(),
        })
    }

    fn connection(&self) -> TransportResult<MultiplexedConnection> {
        lock(&self.connection).clone().ok_or(TransportError::Closed)
    }

    fn sink(&self) -> TransportResult<PubSubSink> {
        lock(&self.sink).clone().ok_or(TransportError::Closed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connection_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}")
    }
}

impl From<RedisError> for TransportError {
    fn from(e: RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
            TransportError::Connection(e.to_string())
        } else {
            TransportError::Backend(e.to_string())
        }
    }
}

impl Transport for RedisTransport {
    async fn publish(&self, topic: &Topic, payload: Payload) -> TransportResult {
        let mut connection = self.connection()?;
        let _: () = connection.publish(topic.as_str(), payload.as_bytes()).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> TransportResult {
        self.sink()?.subscribe(topic.as_str()).await?;
        lock(&self.channels).insert(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &Topic) -> TransportResult {
        self.sink()?.unsubscribe(topic.as_str()).await?;
        lock(&self.channels).remove(topic.as_str());
        Ok(())
    }

    async fn receive(&self) -> TransportResult<Message> {
        let mut stream = select! {
            biased;
            _ = self.closed.cancelled() => return Err(TransportError::Closed),
            stream = self.stream.lock() => stream,
        };
        let stream = stream.as_mut().ok_or(TransportError::Closed)?;
        loop {
            let msg = select! {
                biased;
                _ = self.closed.cancelled() => return Err(TransportError::Closed),
                msg = stream.next() => msg.ok_or(TransportError::Closed)?,
            };
            // Messages on an empty channel name can't be routed to a listener.
            match Topic::new(msg.get_channel_name()) {
                Ok(topic) => return Ok(Message::new(topic, msg.get_payload_bytes())),
                Err(_) => continue,
            }
        }
    }

    async fn ping(&self) -> TransportResult {
        let mut connection = self.connection()?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        Ok(())
    }

    async fn close(&self) -> TransportResult {
        // Wakes a pending receive so the stream lock is released below.
        self.closed.cancel();
        let sink = lock(&self.sink).take();
        let channels: Vec<String> = mem::take(&mut *lock(&self.channels)).into_iter().collect();
        let unsubscribed = match sink {
            Some(mut sink) if !channels.is_empty() => sink.unsubscribe(channels).await,
            _ => Ok(()),
        };
        self.stream.lock().await.take();
        lock(&self.connection).take();
        tracing::debug!("redis connection closed");
        unsubscribed?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url() {
        assert_eq!(connection_url("127.0.0.1:6379"), "redis://127.0.0.1:6379");
        assert_eq!(connection_url("rediss://cache:6380"), "rediss://cache:6380");
    }

    #[tokio::test]
    #[ignore = "needs a redis server on 127.0.0.1:6379"]
    async fn test_close_releases_connection() {
        let transport = RedisTransport::connect(crate::DEFAULT_ADDRESS).await.unwrap();
        let topic = Topic::new("muxbus.close").unwrap();
        transport.subscribe(&topic).await.unwrap();
        transport.ping().await.unwrap();

        transport.close().await.unwrap();

        assert!(transport.sink.lock().unwrap().is_none());
        assert!(transport.connection.lock().unwrap().is_none());
        assert!(transport.stream.lock().await.is_none());
        assert!(transport.channels.lock().unwrap().is_empty());
        assert_eq!(transport.ping().await, Err(TransportError::Closed));
        assert_eq!(transport.subscribe(&topic).await, Err(TransportError::Closed));
        assert_eq!(
            transport.publish(&topic, "x".into()).await,
            Err(TransportError::Closed)
        );
        assert_eq!(transport.receive().await.map(|_| ()), Err(TransportError::Closed));
        assert_eq!(transport.close().await, Ok(()));
    }
}
