pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6379";

/// Multiplexer configuration.
///
/// Use the builder methods to customize, or [`Default`] for the local
/// defaults.
///
/// # Examples
///
/// ```rust
/// use muxbus::Config;
///
/// let config = Config::default()
///     .with_address("10.0.0.5:6379")
///     .with_max_listeners(16);
/// assert_eq!(config.max_listeners, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address of the pub/sub backend, `host:port` or a full URL.
    /// Default: `127.0.0.1:6379`
    pub address: String,

    /// Maximum number of distinct topic listeners. `0` means unlimited.
    /// The catch-all listener is not counted.
    /// Default: 0
    pub max_listeners: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: DEFAULT_ADDRESS.to_string(),
            max_listeners: 0,
        }
    }
}

impl Config {
    /// Set the backend address. An empty string keeps the default address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.address = if address.is_empty() {
            DEFAULT_ADDRESS.to_string()
        } else {
            address
        };
        self
    }

    /// Set the admission limit for topic listeners (`0` = unlimited).
    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }

    /// Backend address, falling back to the default when left empty.
    pub fn address(&self) -> &str {
        if self.address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            &self.address
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address(), "127.0.0.1:6379");
        assert_eq!(config.max_listeners, 0);
    }

    #[test]
    fn test_empty_address_falls_back() {
        let config = Config::default().with_address("");
        assert_eq!(config.address(), DEFAULT_ADDRESS);

        let config = Config {
            address: String::new(),
            max_listeners: 3,
        };
        assert_eq!(config.address(), DEFAULT_ADDRESS);
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_address("redis://cache:6380")
            .with_max_listeners(2);
        assert_eq!(config.address(), "redis://cache:6380");
        assert_eq!(config.max_listeners, 2);
    }
}
