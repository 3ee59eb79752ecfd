use std::{fmt, sync::Arc};

/// Opaque message body.
///
/// The multiplexer never inspects payloads; it passes them from the
/// transport to handlers as-is. Cloning shares the underlying buffer.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Payload(Arc<[u8]>);

impl Payload {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self(Arc::from(s.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self(Arc::from(s.into_bytes()))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<&str> for Payload {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Payload({s:?})"),
            None => write!(f, "Payload({} bytes)", self.0.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload() {
        let payload = Payload::from("foobar");
        assert_eq!(payload.as_str(), Some("foobar"));
        assert_eq!(payload.len(), 6);
        assert_eq!(payload, "foobar");
        assert_eq!(format!("{payload:?}"), "Payload(\"foobar\")");
    }

    #[test]
    fn test_binary_payload() {
        let payload = Payload::from(vec![0xff, 0xfe, 0x00]);
        assert_eq!(payload.as_str(), None);
        assert_eq!(payload.as_bytes(), &[0xff, 0xfe, 0x00]);
        assert_eq!(format!("{payload:?}"), "Payload(3 bytes)");
    }
}
