use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::{Error, Handler, Result, Topic, Transport};

/// Listener bookkeeping shared by callers and the dispatch loop.
///
/// `state` is held only for map/sequence access, never across an await.
/// `writer` serializes `register`/`unregister` and is held across the
/// transport call, so a name is present in `handlers` exactly when the
/// transport holds a live subscription for it.
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
    writer: tokio::sync::Mutex<()>,
}

struct RegistryState {
    handlers: HashMap<Topic, Handler>,
    /// Same keys as `handlers`, in registration order, no duplicates.
    order: Vec<Topic>,
    any: Option<Handler>,
    max_listeners: usize,
}

impl Registry {
    pub fn new(max_listeners: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                handlers: HashMap::new(),
                order: Vec::new(),
                any: None,
                max_listeners,
            }),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listener for `topic` and subscribe the transport to it.
    ///
    /// The limit is checked before the duplicate check, and only rejects
    /// when the count is already equal to the limit. Re-registering a name
    /// keeps the first handler. The registry is only mutated once the
    /// transport subscription succeeded.
    pub async fn register<T: Transport>(
        &self,
        transport: &T,
        topic: Topic,
        handler: Handler,
    ) -> Result<()> {
        let _writer = self.writer.lock().await;
        {
            let state = self.state();
            let max = state.max_listeners;
            if max > 0 && state.handlers.len() == max {
                return Err(Error::LimitReached(max));
            }
            if state.handlers.contains_key(&topic) {
                return Ok(());
            }
        }

        transport.subscribe(&topic).await?;

        let mut state = self.state();
        state.order.push(topic.clone());
        state.handlers.insert(topic, handler);
        Ok(())
    }

    /// Replace the catch-all handler. Not counted against the limit and
    /// not subscribed on the transport.
    pub fn register_any(&self, handler: Handler) {
        self.state().any = Some(handler);
    }

    /// Remove the listener for `topic` after unsubscribing the transport.
    ///
    /// Unknown names succeed without touching the transport. When the
    /// unsubscribe fails the listener stays registered.
    pub async fn unregister<T: Transport>(&self, transport: &T, topic: &str) -> Result<bool> {
        let _writer = self.writer.lock().await;
        let registered = {
            let state = self.state();
            state.handlers.get_key_value(topic).map(|(k, _)| k.clone())
        };
        let Some(topic) = registered else {
            return Ok(false);
        };

        transport.unsubscribe(&topic).await?;

        let mut state = self.state();
        state.handlers.remove(&topic);
        if let Some(idx) = state.order.iter().position(|t| *t == topic) {
            state.order.remove(idx);
        }
        Ok(true)
    }

    pub fn set_max_listeners(&self, max: usize) {
        self.state().max_listeners = max;
    }

    pub fn max_listeners(&self) -> usize {
        self.state().max_listeners
    }

    pub fn lookup(&self, topic: &str) -> Option<Handler> {
        self.state().handlers.get(topic).cloned()
    }

    pub fn any_handler(&self) -> Option<Handler> {
        self.state().any.clone()
    }

    pub fn listeners(&self) -> Vec<Topic> {
        self.state().order.clone()
    }

    pub fn len(&self) -> usize {
        self.state().handlers.len()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.state().handlers.contains_key(topic)
    }

    #[cfg(test)]
    pub fn assert_consistent(&self) {
        use std::collections::HashSet;

        let state = self.state();
        let ordered: HashSet<_> = state.order.iter().collect();
        let keys: HashSet<_> = state.handlers.keys().collect();
        assert_eq!(ordered.len(), state.order.len(), "duplicate listener names");
        assert_eq!(ordered, keys, "listener order out of sync with handlers");
    }
}
