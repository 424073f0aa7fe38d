use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected INDI server stream. Implements `Read + Write`.
///
/// This is the fundamental I/O type returned by transport operations.
pub struct IndiStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl Read for IndiStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for IndiStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl IndiStream {
    /// Wrap an already connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        // Commands are small and latency matters more than batching.
        stream.set_nodelay(true)?;
        Ok(Self {
            inner: stream,
            peer,
        })
    }

    /// Address of the connected server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Switch between blocking and non-blocking reads/writes.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Wait up to `timeout` for readable data (or EOF) without consuming it.
    ///
    /// Returns `Ok(false)` when the wait timed out. The stream is left in
    /// non-blocking mode afterwards.
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        let mut peek_buf = [0u8; 1];
        self.inner.set_nonblocking(false)?;
        self.inner.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let outcome = self.inner.peek(&mut peek_buf);
        self.inner.set_read_timeout(None)?;
        self.inner.set_nonblocking(true)?;

        match outcome {
            Ok(_) => Ok(true),
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                Ok(false)
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
        })
    }

    /// Close both directions; errors on an already-dead socket are ignored.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for IndiStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndiStream")
            .field("type", &"tcp")
            .field("peer", &self.peer)
            .finish()
    }
}
