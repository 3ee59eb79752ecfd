//! Muxbus - named-event multiplexer over a publish/subscribe channel
//!
//! Register async handlers for named events, publish payloads under an
//! event name, and let a background dispatch loop fan messages received
//! from the transport out to the matching handler and an optional
//! catch-all handler.
//!
//! The backend is pluggable through [`Transport`]. [`MemoryTransport`] is
//! an in-process loopback; `RedisTransport` is available with the `redis`
//! feature.
//!
//! See `demos/loopback.rs`.

mod config;
mod error;
mod handler;
mod message;
mod multiplexer;
mod payload;
mod status;
mod topic;

pub mod transport;

mod internal;

pub use config::{Config, DEFAULT_ADDRESS};
pub use error::Error;
pub use handler::{Handler, IntoHandler};
pub use message::Message;
pub use multiplexer::Multiplexer;
pub use payload::Payload;
pub use status::{LoopExit, LoopStatus, State};
pub use topic::Topic;
#[cfg(feature = "redis")]
pub use transport::RedisTransport;
pub use transport::{MemoryTransport, Transport, TransportError, TransportResult};

pub type Result<T = ()> = std::result::Result<T, Error>;
