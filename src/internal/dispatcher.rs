use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use futures_util::FutureExt;
use tokio::{select, sync::watch};
use tokio_util::sync::CancellationToken;

use super::Registry;
use crate::{Handler, LoopExit, LoopStatus, Message, Payload, Topic, Transport, TransportError};

/// Receive-and-dispatch loop.
///
/// Takes one message at a time from the transport and awaits its handlers
/// before asking for the next one. There is no prefetch, so a handler that
/// never completes stalls every later message. Messages that arrive for a
/// topic whose listener is still being registered are not matched.
///
/// A cancelled loop closes the transport before it finishes.
pub(crate) struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    registry: Arc<Registry>,
    cancel_token: CancellationToken,
    status: watch::Sender<LoopStatus>,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        transport: Arc<T>,
        registry: Arc<Registry>,
        cancel_token: CancellationToken,
        status: watch::Sender<LoopStatus>,
    ) -> Self {
        Self {
            transport,
            registry,
            cancel_token,
            status,
        }
    }

    pub async fn run(self) -> LoopExit {
        self.status.send_replace(LoopStatus::Running);
        let exit = loop {
            let message = select! {
                biased;
                _ = self.cancel_token.cancelled() => break LoopExit::Cancelled,
                received = self.transport.receive() => match received {
                    Ok(message) => message,
                    Err(_) if self.cancel_token.is_cancelled() => break LoopExit::Cancelled,
                    Err(TransportError::Closed) => break LoopExit::TransportClosed,
                    Err(e) => break LoopExit::TransportFailed(e),
                },
            };
            self.dispatch(message).await;
        };

        match &exit {
            LoopExit::TransportFailed(e) => {
                tracing::warn!(error = %e, "Dispatch loop stopped on receive error")
            }
            other => tracing::debug!(exit = %other, "Dispatch loop stopped"),
        }
        if exit.is_cancelled() {
            if let Err(e) = self.transport.close().await {
                tracing::warn!(error = %e, "Failed to close transport");
            }
        }
        self.status.send_replace(LoopStatus::Finished(exit.clone()));
        exit
    }

    async fn dispatch(&self, message: Message) {
        let Message { topic, payload } = message;
        let handler = self.registry.lookup(&topic);
        tracing::trace!(%topic, matched = handler.is_some(), "Dispatching message");

        if let Some(handler) = handler {
            invoke(&handler, &topic, payload.clone()).await;
        }
        if let Some(any) = self.registry.any_handler() {
            invoke(&any, &topic, payload).await;
        }
    }
}

async fn invoke(handler: &Handler, topic: &Topic, payload: Payload) {
    let handled = match catch_unwind(AssertUnwindSafe(|| handler.call(payload))) {
        Ok(future) => AssertUnwindSafe(future).catch_unwind().await.is_ok(),
        Err(_) => false,
    };
    if !handled {
        tracing::error!(%topic, "Handler panicked, message skipped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::MemoryTransport;

    fn topic(name: &str) -> Topic {
        Topic::new(name).unwrap()
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler {
        let log = log.clone();
        Handler::from_fn(move |payload| {
            let text = payload.as_str().unwrap_or_default().to_string();
            log.lock().unwrap().push(format!("{tag}:{text}"));
        })
    }

    fn dispatcher(
        transport: &MemoryTransport,
        registry: &Arc<Registry>,
    ) -> (Dispatcher<MemoryTransport>, CancellationToken, watch::Receiver<LoopStatus>) {
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(LoopStatus::Idle);
        let dispatcher = Dispatcher::new(
            Arc::new(transport.clone()),
            registry.clone(),
            token.clone(),
            tx,
        );
        (dispatcher, token, rx)
    }

    #[tokio::test]
    async fn test_dispatch_topic_and_any_in_order() {
        let transport = MemoryTransport::new();
        let registry = Arc::new(Registry::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.register(&transport, topic("a"), recorder(&log, "a")).await.unwrap();
        registry.register(&transport, topic("b"), recorder(&log, "b")).await.unwrap();
        registry.register_any(recorder(&log, "any"));

        transport.publish(&topic("a"), "1".into()).await.unwrap();
        transport.publish(&topic("b"), "2".into()).await.unwrap();
        transport.finish();

        let (dispatcher, _, status) = dispatcher(&transport, &registry);
        let exit = dispatcher.run().await;

        assert_eq!(exit, LoopExit::TransportClosed);
        assert_eq!(*status.borrow(), LoopStatus::Finished(LoopExit::TransportClosed));
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "any:1", "b:2", "any:2"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_loop() {
        let transport = MemoryTransport::new();
        let registry = Arc::new(Registry::new(0));
        let (dispatcher, token, mut status) = dispatcher(&transport, &registry);

        let handle = tokio::spawn(dispatcher.run());
        status.wait_for(LoopStatus::is_running).await.unwrap();
        token.cancel();

        assert_eq!(handle.await.unwrap(), LoopExit::Cancelled);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_panicking_handler_does_not_kill_loop() {
        let transport = MemoryTransport::new();
        let registry = Arc::new(Registry::new(0));
        let log = Arc::new(Mutex::new(Vec::new()));

        registry
            .register(&transport, topic("boom"), Handler::from_fn(|_| panic!("boom")))
            .await
            .unwrap();
        registry.register(&transport, topic("ok"), recorder(&log, "ok")).await.unwrap();

        transport.publish(&topic("boom"), "x".into()).await.unwrap();
        transport.publish(&topic("ok"), "y".into()).await.unwrap();
        transport.finish();

        let (dispatcher, _, _) = dispatcher(&transport, &registry);
        assert_eq!(dispatcher.run().await, LoopExit::TransportClosed);
        assert_eq!(*log.lock().unwrap(), vec!["ok:y"]);
    }
}
