use crate::{Payload, Topic};

/// A message delivered by the transport: the topic it was published on
/// and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Payload,
}

impl Message {
    pub fn new(topic: Topic, payload: impl Into<Payload>) -> Self {
        Self {
            topic,
            payload: payload.into(),
        }
    }
}
