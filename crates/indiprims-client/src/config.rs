use std::time::Duration;

use indiprims_transport::{ServerAddress, TcpTransport};
use indiprims_wire::{DecoderConfig, DEFAULT_MAX_FRAGMENT};

/// Bytes requested per socket read.
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

/// Default bound on one outbound message write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`crate::Connection`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to connect to. Default: `localhost:7624`.
    pub server: ServerAddress,
    /// Bound on the TCP connect. Default: 3 s.
    pub connect_timeout: Duration,
    /// Bound on writing one message. Default: 5 s.
    pub write_timeout: Duration,
    /// Bytes requested per socket read. Default: 64 KiB.
    pub read_chunk_size: usize,
    /// Largest accepted top-level element. Default: 64 MiB.
    pub max_fragment_size: usize,
    /// Reconnect right after dropping a stream that failed to decode.
    pub reconnect_on_decode_error: bool,
}

impl ClientConfig {
    /// Defaults for everything but the server.
    pub fn new(server: ServerAddress) -> Self {
        Self {
            server,
            ..Self::default()
        }
    }

    pub(crate) fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            max_fragment_size: self.max_fragment_size,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: ServerAddress::default(),
            connect_timeout: TcpTransport::DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_chunk_size: DEFAULT_READ_CHUNK,
            max_fragment_size: DEFAULT_MAX_FRAGMENT,
            reconnect_on_decode_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server.to_string(), "localhost:7624");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.read_chunk_size, 64 * 1024);
        assert!(config.reconnect_on_decode_error);
        assert_eq!(config.decoder_config().max_fragment_size, DEFAULT_MAX_FRAGMENT);
    }

    #[test]
    fn new_keeps_other_defaults() {
        let server: ServerAddress = "indi.local:7625".parse().unwrap();
        let config = ClientConfig::new(server.clone());
        assert_eq!(config.server, server);
        assert_eq!(config.write_timeout, DEFAULT_WRITE_TIMEOUT);
    }
}
