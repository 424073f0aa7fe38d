use std::io::{ErrorKind, Write};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};

use crate::encoder::encode_message;
use crate::error::{Result, WireError};
use crate::message::WireMessage;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
///
/// Each message is sent as one XML element followed by a newline. On a
/// non-blocking stream, `WouldBlock` is retried until the write timeout (if
/// any) expires.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    write_timeout: Option<Duration>,
}

impl<T: Write> MessageWriter<T> {
    /// Writer without a write timeout.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            write_timeout: None,
        }
    }

    /// Give up on a message that cannot be written within `timeout`.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Encode and send one message (blocking).
    pub fn send(&mut self, message: &WireMessage) -> Result<()> {
        self.buf.clear();
        encode_message(message, &mut self.buf)?;
        self.buf.put_u8(b'\n');

        let deadline = self.write_timeout.map(|timeout| Instant::now() + timeout);
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(WireError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => wait_or_time_out(deadline)?,
                Err(err) => return Err(WireError::Io(err)),
            }
        }

        self.flush_until(deadline)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        let deadline = self.write_timeout.map(|timeout| Instant::now() + timeout);
        self.flush_until(deadline)
    }

    fn flush_until(&mut self, deadline: Option<Instant>) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => wait_or_time_out(deadline)?,
                Err(err) => return Err(WireError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

const WOULD_BLOCK_BACKOFF: Duration = Duration::from_millis(1);

fn wait_or_time_out(deadline: Option<Instant>) -> Result<()> {
    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
        return Err(WireError::Io(std::io::Error::new(
            ErrorKind::TimedOut,
            "write timed out",
        )));
    }
    std::thread::sleep(WOULD_BLOCK_BACKOFF);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::decoder::MessageReader;
    use crate::kind::PROTOCOL_VERSION;
    use crate::message::{GetProperties, Notice};

    fn get_properties() -> WireMessage {
        WireMessage::GetProperties(GetProperties {
            version: Some(PROTOCOL_VERSION.to_string()),
            device: None,
            name: None,
        })
    }

    #[test]
    fn messages_are_newline_terminated() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&get_properties()).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire, b"<getProperties version=\"1.7\"/>\n");
    }

    #[test]
    fn written_messages_decode_in_order() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let notice = WireMessage::Message(Notice {
            device: Some("Mount".to_string()),
            message: "parked".to_string(),
            timestamp: None,
        });

        writer.send(&get_properties()).unwrap();
        writer.send(&notice).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = MessageReader::new(Cursor::new(wire));
        assert_eq!(reader.read_message().unwrap(), get_properties());
        assert_eq!(reader.read_message().unwrap(), notice);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.send(&get_properties()).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn retries_interrupted_and_would_block() {
        for kind in [ErrorKind::Interrupted, ErrorKind::WouldBlock] {
            let mut writer = MessageWriter::new(FailOnceWriter {
                kind,
                write_failed: false,
                flush_failed: false,
                data: Vec::new(),
            });
            writer.send(&get_properties()).unwrap();
            assert!(writer.get_ref().data.ends_with(b"\n"));
        }
    }

    #[test]
    fn would_block_gives_up_after_write_timeout() {
        let mut writer =
            MessageWriter::new(AlwaysWouldBlock).with_write_timeout(Duration::from_millis(20));
        let err = writer.send(&get_properties()).unwrap_err();
        assert!(matches!(err, WireError::Io(ref io) if io.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.send(&get_properties()).unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[test]
    fn other_io_errors_surface() {
        let mut writer = MessageWriter::new(BrokenPipeWriter);
        let err = writer.send(&get_properties()).unwrap_err();
        assert!(matches!(err, WireError::Io(ref io) if io.kind() == ErrorKind::BrokenPipe));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailOnceWriter {
        kind: ErrorKind,
        write_failed: bool,
        flush_failed: bool,
        data: Vec<u8>,
    }

    impl Write for FailOnceWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.write_failed {
                self.write_failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            // Short writes exercise the offset loop.
            let n = buf.len().min(7);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_failed {
                self.flush_failed = true;
                return Err(std::io::Error::from(self.kind));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct AlwaysWouldBlock;

    impl Write for AlwaysWouldBlock {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipeWriter;

    impl Write for BrokenPipeWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
