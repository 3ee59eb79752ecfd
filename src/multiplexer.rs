use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::{
    Config, Error, IntoHandler, LoopExit, LoopStatus, Payload, Result, State, Topic, Transport,
    internal::{Dispatcher, Registry},
};

/// Named-event multiplexer over a pub/sub [`Transport`].
///
/// - Register listeners with `on(name, handler)` and a catch-all with `on_any(handler)`.
/// - `start()` spawns the dispatch loop and returns immediately (non-blocking).
/// - `join()` waits for the dispatch loop to finish and tells why it stopped.
/// - `run()` combines `start()` and `join()`, blocking until the loop ends.
/// - `quit()` stops the loop and closes the transport; it is safe to call
///   from inside a handler.
/// - Publish with `emit(name, payload)`, `emit_many` and `emit_all`.
///
/// The handle is cheap to clone. Clones share the same registry, transport
/// and lifecycle, so a clone can be captured by a handler.
///
/// Dropping the last handle cancels the dispatch loop, which then closes the
/// transport. A handler that captures a strong clone keeps the multiplexer
/// alive until `quit()` is called.
///
/// ```rust
/// use muxbus::{Config, MemoryTransport, Multiplexer};
///
/// # async fn demo() -> muxbus::Result<()> {
/// let mux = Multiplexer::new(MemoryTransport::new(), Config::default());
/// let stopper = mux.clone();
/// mux.on("greeting", move |payload: muxbus::Payload| {
///     let mux = stopper.clone();
///     async move {
///         println!("{:?}", payload.as_str());
///         let _ = mux.quit().await;
///     }
/// })
/// .await?;
/// mux.emit("greeting", "hello").await?;
/// mux.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Multiplexer<T: Transport> {
    inner: Arc<Inner<T>>,
}

struct Inner<T: Transport> {
    config: Config,
    transport: Arc<T>,
    registry: Arc<Registry>,
    lifecycle: Mutex<Lifecycle>,
    cancel_token: CancellationToken,
    status: watch::Receiver<LoopStatus>,
    /// Stops the dispatch loop once the last handle is gone.
    _cancel_on_drop: DropGuard,
}

struct Lifecycle {
    state: State,
    /// Handed to the dispatch loop on start.
    status: Option<watch::Sender<LoopStatus>>,
}

impl<T: Transport> Clone for Multiplexer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> Multiplexer<T> {
    /// Create a multiplexer over an already connected transport.
    pub fn new(transport: T, config: Config) -> Self {
        let (status_tx, status_rx) = watch::channel(LoopStatus::Idle);
        let cancel_token = CancellationToken::new();
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(Registry::new(config.max_listeners)),
                config,
                transport: Arc::new(transport),
                lifecycle: Mutex::new(Lifecycle {
                    state: State::Created,
                    status: Some(status_tx),
                }),
                _cancel_on_drop: cancel_token.clone().drop_guard(),
                cancel_token,
                status: status_rx,
            }),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Check that the transport backend is reachable.
    pub async fn ping(&self) -> Result<()> {
        self.inner.transport.ping().await?;
        Ok(())
    }

    /// Listen for events published on `name`.
    ///
    /// Fails with [`Error::LimitReached`] when the listener limit is already
    /// reached. Registering a name twice is a no-op: the first handler stays.
    /// The listener is only recorded once the transport subscription
    /// succeeded. A message received between the subscription and the
    /// registry insert finds no listener and only reaches the catch-all
    /// handler.
    pub async fn on(&self, name: impl AsRef<str>, handler: impl IntoHandler) -> Result<()> {
        let topic = Topic::new(name)?;
        self.inner
            .registry
            .register(&*self.inner.transport, topic.clone(), handler.into_handler())
            .await?;
        tracing::debug!(%topic, listeners = self.inner.registry.len(), "Listener added");
        Ok(())
    }

    /// Set the catch-all handler, invoked for every received message after
    /// the topic handler. Replaces any previous catch-all handler.
    pub fn on_any(&self, handler: impl IntoHandler) {
        self.inner.registry.register_any(handler.into_handler());
        tracing::debug!("Catch-all listener set");
    }

    /// Publish `payload` on `name`. No listener is required.
    pub async fn emit(&self, name: impl AsRef<str>, payload: impl Into<Payload>) -> Result<()> {
        let topic = Topic::new(name)?;
        self.publish(topic, payload.into()).await
    }

    async fn publish(&self, topic: Topic, payload: Payload) -> Result<()> {
        match self.inner.transport.publish(&topic, payload).await {
            Ok(()) => Ok(()),
            Err(source) => Err(Error::Publish { topic, source }),
        }
    }

    /// Publish `payload` on each of `names`, in order.
    ///
    /// Best effort: failures are logged and skipped. Use [`emit`](Self::emit)
    /// to learn about individual failures.
    pub async fn emit_many<I, S>(&self, names: I, payload: impl Into<Payload>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let payload = payload.into();
        for name in names {
            if let Err(e) = self.emit(name, payload.clone()).await {
                tracing::warn!(error = %e, "emit_many: publish failed");
            }
        }
    }

    /// Publish `payload` on every registered topic, in registration order.
    /// Best effort, like [`emit_many`](Self::emit_many).
    pub async fn emit_all(&self, payload: impl Into<Payload>) {
        let payload = payload.into();
        for topic in self.inner.registry.listeners() {
            if let Err(e) = self.publish(topic, payload.clone()).await {
                tracing::warn!(error = %e, "emit_all: publish failed");
            }
        }
    }

    /// Replace the listener limit (`0` = unlimited). Existing listeners are
    /// kept even when there are more of them than the new limit.
    pub fn set_max_listeners(&self, max: usize) {
        self.inner.registry.set_max_listeners(max);
    }

    pub fn max_listeners(&self) -> usize {
        self.inner.registry.max_listeners()
    }

    /// Stop listening for `name` and unsubscribe from it.
    ///
    /// Unknown names succeed without effect. If the transport fails to
    /// unsubscribe, the listener stays registered and the error is returned.
    pub async fn remove_listener(&self, name: impl AsRef<str>) -> Result<()> {
        let name = name.as_ref();
        if self
            .inner
            .registry
            .unregister(&*self.inner.transport, name)
            .await?
        {
            tracing::debug!(
                topic = name,
                listeners = self.inner.registry.len(),
                "Listener removed"
            );
        }
        Ok(())
    }

    /// Remove every listener in `names`, in order.
    ///
    /// All names are attempted; the ones that could not be removed are
    /// reported together in [`Error::ListenersNotRemoved`].
    pub async fn remove_listeners<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut failed = Vec::new();
        for name in names {
            let name = name.as_ref();
            if let Err(e) = self.remove_listener(name).await {
                tracing::warn!(topic = name, error = %e, "Failed to remove listener");
                if let Ok(topic) = Topic::new(name) {
                    failed.push(topic);
                }
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::ListenersNotRemoved(failed))
        }
    }

    /// Start the dispatch loop in a background task. This returns immediately.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn start(&self) -> Result<()> {
        let status = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                State::Running => return Err(Error::AlreadyStarted),
                State::Stopped => return Err(Error::AlreadyStopped),
                State::Created => {}
            }
            let status = lifecycle.status.take().ok_or(Error::AlreadyStarted)?;
            lifecycle.state = State::Running;
            status
        };

        let dispatcher = Dispatcher::new(
            self.inner.transport.clone(),
            self.inner.registry.clone(),
            self.inner.cancel_token.clone(),
            status,
        );
        tokio::spawn(dispatcher.run());
        tracing::info!(listeners = self.inner.registry.len(), "Multiplexer started");
        Ok(())
    }

    /// Wait until the dispatch loop stops, and return why it stopped.
    ///
    /// Can be awaited from several tasks. Returns immediately if the loop
    /// has already finished.
    pub async fn join(&self) -> Result<LoopExit> {
        if self.state() == State::Created {
            return Err(Error::NotStarted);
        }
        let mut status = self.inner.status.clone();
        let finished = status
            .wait_for(LoopStatus::is_finished)
            .await
            .map_err(|_| Error::LoopAborted)?;
        finished.exit().cloned().ok_or(Error::LoopAborted)
    }

    /// Convenience method to start and then wait for the dispatch loop.
    /// Blocks until the loop stops.
    pub async fn run(&self) -> Result<LoopExit> {
        self.start().await?;
        self.join().await
    }

    /// Stop the dispatch loop and close the transport.
    ///
    /// Only valid while running; otherwise fails with [`Error::NotStarted`]
    /// and does nothing. Does not wait for the loop to finish, use
    /// [`join`](Self::join) for that. The message being handled when `quit`
    /// is called still completes.
    pub async fn quit(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.state != State::Running {
                return Err(Error::NotStarted);
            }
            lifecycle.state = State::Stopped;
        }
        self.inner.cancel_token.cancel();
        self.inner.transport.close().await?;
        tracing::info!("Multiplexer stopped");
        Ok(())
    }

    /// Alias of [`quit`](Self::quit).
    pub async fn stop(&self) -> Result<()> {
        self.quit().await
    }

    pub fn state(&self) -> State {
        self.lifecycle().state
    }

    /// Current state of the dispatch loop. A loop that died on a transport
    /// error shows up as [`LoopStatus::Finished`].
    pub fn status(&self) -> LoopStatus {
        (*self.inner.status.borrow()).clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Registered topics in registration order.
    pub fn listeners(&self) -> Vec<Topic> {
        self.inner.registry.listeners()
    }

    pub fn has_listener(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    pub fn has_any_listener(&self) -> bool {
        self.inner.registry.any_handler().is_some()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }
}

#[cfg(feature = "redis")]
impl Multiplexer<crate::RedisTransport> {
    /// Connect to the Redis server at [`Config::address`].
    pub async fn connect(config: Config) -> Result<Self> {
        let transport = crate::RedisTransport::connect(config.address()).await?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> std::fmt::Debug for Multiplexer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("state", &self.state())
            .field("listeners", &self.listeners())
            .field("max_listeners", &self.max_listeners())
            .finish()
    }
}
