#![allow(dead_code)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use muxbus::{
    LoopExit, MemoryTransport, Message, Multiplexer, Payload, Topic, Transport, TransportError,
    TransportResult,
};

pub const MSG: &str = "foobar";

/// Loopback transport with switchable failures.
#[derive(Clone, Default)]
pub struct FlakyTransport {
    pub inner: MemoryTransport,
    failing_topics: Arc<Mutex<HashSet<String>>>,
    fail_receive: Arc<AtomicBool>,
}

impl FlakyTransport {
    /// Make publish/subscribe/unsubscribe fail for `topic`.
    pub fn fail_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().insert(topic.to_string());
    }

    pub fn heal_topic(&self, topic: &str) {
        self.failing_topics.lock().unwrap().remove(topic);
    }

    pub fn fail_receive(&self) {
        self.fail_receive.store(true, Ordering::SeqCst);
    }

    fn check(&self, topic: &Topic) -> TransportResult {
        if self.failing_topics.lock().unwrap().contains(topic.as_str()) {
            Err(TransportError::Backend(format!("injected failure on {topic}")))
        } else {
            Ok(())
        }
    }
}

impl Transport for FlakyTransport {
    async fn publish(&self, topic: &Topic, payload: Payload) -> TransportResult {
        self.check(topic)?;
        self.inner.publish(topic, payload).await
    }

    async fn subscribe(&self, topic: &Topic) -> TransportResult {
        self.check(topic)?;
        self.inner.subscribe(topic).await
    }

    async fn unsubscribe(&self, topic: &Topic) -> TransportResult {
        self.check(topic)?;
        self.inner.unsubscribe(topic).await
    }

    async fn receive(&self) -> TransportResult<Message> {
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("connection reset".into()));
        }
        self.inner.receive().await
    }

    async fn ping(&self) -> TransportResult {
        self.inner.ping().await
    }

    async fn close(&self) -> TransportResult {
        self.inner.close().await
    }
}

/// Shared list of received payloads, as text.
#[derive(Clone, Default)]
pub struct Received(Arc<Mutex<Vec<String>>>);

impl Received {
    pub fn push(&self, payload: &Payload) {
        let text = payload.as_str().unwrap_or("<binary>").to_string();
        self.0.lock().unwrap().push(text);
    }

    pub fn values(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Run the multiplexer, failing the test instead of hanging forever.
pub async fn run_bounded<T: Transport>(mux: &Multiplexer<T>) -> LoopExit {
    tokio::time::timeout(Duration::from_secs(5), mux.run())
        .await
        .expect("dispatch loop did not stop in time")
        .expect("run failed")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
