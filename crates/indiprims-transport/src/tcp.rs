use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::address::ServerAddress;
use crate::error::{Result, TransportError};
use crate::stream::IndiStream;

/// TCP transport to an INDI server.
///
/// Resolution may return several addresses (IPv4 and IPv6 for `localhost`);
/// they are tried in order and share one overall deadline.
pub struct TcpTransport;

impl TcpTransport {
    /// Default bound on a connect attempt.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

    /// Connect to `address`, waiting at most `timeout` in total (blocking).
    pub fn connect(address: &ServerAddress, timeout: Duration) -> Result<IndiStream> {
        let candidates = Self::resolve(address)?;
        let deadline = Instant::now() + timeout;
        let mut last_error = None;

        for candidate in candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(&candidate, remaining) {
                Ok(stream) => {
                    info!(%address, peer = %candidate, "connected to indi server");
                    return IndiStream::from_tcp(stream);
                }
                Err(err) => {
                    debug!(peer = %candidate, error = %err, "connect attempt failed");
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) if err.kind() != std::io::ErrorKind::TimedOut => {
                Err(TransportError::Connect {
                    address: address.to_string(),
                    source: err,
                })
            }
            _ => Err(TransportError::Timeout {
                address: address.to_string(),
                timeout,
            }),
        }
    }

    /// Resolve `address` to socket addresses.
    pub fn resolve(address: &ServerAddress) -> Result<Vec<SocketAddr>> {
        let resolved: Vec<SocketAddr> = (address.host(), address.port())
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: address.to_string(),
                source,
            })?
            .collect();

        if resolved.is_empty() {
            return Err(TransportError::Resolve {
                address: address.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ),
            });
        }
        Ok(resolved)
    }

    /// Transport name for diagnostics.
    pub fn transport_name() -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn connect_and_exchange_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut server, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            server.read_exact(&mut buf).unwrap();
            server.write_all(&buf).unwrap();
        });

        let address = ServerAddress::new("127.0.0.1", port).unwrap();
        let mut client = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap();
        client.write_all(b"hello").unwrap();
        let mut echoed = [0u8; 5];
        client.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"hello");
        assert_eq!(client.peer_addr().port(), port);

        handle.join().unwrap();
    }

    #[test]
    fn refused_connection_reports_connect_error() {
        // Bind then drop to obtain a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let address = ServerAddress::new("127.0.0.1", port).unwrap();
        let err = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout { .. }
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn unresolvable_host() {
        let address = ServerAddress::new("no-such-host.invalid", 7624).unwrap();
        let err = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn wait_readable_times_out_then_sees_data() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = ServerAddress::new("127.0.0.1", port).unwrap();
        let client = TcpTransport::connect(&address, Duration::from_secs(2)).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        assert!(!client.wait_readable(Duration::from_millis(20)).unwrap());
        server.write_all(b"x").unwrap();
        assert!(client.wait_readable(Duration::from_secs(2)).unwrap());
    }
}
