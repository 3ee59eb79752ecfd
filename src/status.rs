use std::fmt;

use crate::TransportError;

/// Why the dispatch loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Stopped by [`Multiplexer::quit`](crate::Multiplexer::quit).
    Cancelled,
    /// The transport was closed or ran out of messages.
    TransportClosed,
    /// `receive` failed with an error other than a close.
    TransportFailed(TransportError),
}

impl LoopExit {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopExit::Cancelled)
    }
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Cancelled => write!(f, "cancelled"),
            LoopExit::TransportClosed => write!(f, "transport closed"),
            LoopExit::TransportFailed(e) => write!(f, "transport failed: {e}"),
        }
    }
}

/// Observable state of the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoopStatus {
    /// Not started yet.
    #[default]
    Idle,
    Running,
    Finished(LoopExit),
}

impl LoopStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, LoopStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, LoopStatus::Finished(_))
    }

    pub fn exit(&self) -> Option<&LoopExit> {
        match self {
            LoopStatus::Finished(exit) => Some(exit),
            _ => None,
        }
    }
}

/// Lifecycle of a multiplexer. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Created,
    Running,
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Created => write!(f, "Created"),
            State::Running => write!(f, "Running"),
            State::Stopped => write!(f, "Stopped"),
        }
    }
}
