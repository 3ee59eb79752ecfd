use std::{fmt, future::Future, sync::Arc};

use futures_util::{FutureExt, future::BoxFuture};

use crate::Payload;

type HandlerFn = dyn Fn(Payload) -> BoxFuture<'static, ()> + Send + Sync;

/// A registered event callback.
///
/// Built from any async closure taking the message [`Payload`]:
///
/// ```rust
/// use muxbus::Handler;
///
/// let handler = Handler::new(|payload| async move {
///     println!("got {:?}", payload.as_str());
/// });
/// ```
///
/// The dispatch loop awaits each handler before receiving the next
/// message, so a handler that never completes stalls all dispatch.
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |payload| f(payload).boxed()))
    }

    /// Wrap a synchronous callback.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        Self::new(move |payload| {
            f(payload);
            futures_util::future::ready(())
        })
    }

    #[inline]
    pub(crate) fn call(&self, payload: Payload) -> BoxFuture<'static, ()> {
        (self.0)(payload)
    }

    /// Whether both values refer to the same registered callback.
    pub fn ptr_eq(&self, other: &Handler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").finish_non_exhaustive()
    }
}

/// Conversion into a [`Handler`], so `on` accepts both prepared handlers
/// and plain async closures.
pub trait IntoHandler {
    fn into_handler(self) -> Handler;
}

impl IntoHandler for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

impl<F, Fut> IntoHandler for F
where
    F: Fn(Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn into_handler(self) -> Handler {
        Handler::new(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_sync_handler_runs() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handler = Handler::from_fn(move |payload| {
            assert_eq!(payload, "x");
            h.fetch_add(1, Ordering::SeqCst);
        });
        handler.call("x".into()).await;
        handler.call("x".into()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ptr_eq() {
        let a = Handler::from_fn(|_| {});
        let b = a.clone();
        let c = Handler::from_fn(|_| {});
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }
}
