use crate::{Topic, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Can't add new listener, max limit of listeners {0} has been reached")]
    LimitReached(usize),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Unable to publish message to '{topic}': {source}")]
    Publish {
        topic: Topic,
        #[source]
        source: TransportError,
    },

    #[error("Multiplexer is not started.")]
    NotStarted,

    #[error("Multiplexer has already started.")]
    AlreadyStarted,

    #[error("Multiplexer has been stopped and can't be restarted.")]
    AlreadyStopped,

    #[error("Event name must not be empty.")]
    EmptyTopic,

    #[error("Failed to remove listeners: {0:?}")]
    ListenersNotRemoved(Vec<Topic>),

    #[error("Dispatch loop ended without reporting its exit.")]
    LoopAborted,
}

impl Error {
    /// Transport error behind this error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Error::Transport(e) | Error::Publish { source: e, .. } => Some(e),
            _ => None,
        }
    }
}
