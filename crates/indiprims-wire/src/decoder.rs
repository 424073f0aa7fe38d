use std::io::{ErrorKind, Read};

use bytes::{Buf, Bytes, BytesMut};
use tracing::trace;

use crate::error::{malformed, Result, WireError};
use crate::message::WireMessage;
use crate::parse::parse_fragment;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default limit for one top-level element: 64 MiB.
///
/// Large enough for camera BLOBs, small enough to stop a runaway stream.
pub const DEFAULT_MAX_FRAGMENT: usize = 64 * 1024 * 1024;

/// Configuration for the streaming decoder.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Largest accepted top-level element in bytes. Default: 64 MiB.
    pub max_fragment_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_fragment_size: DEFAULT_MAX_FRAGMENT,
        }
    }
}

/// Markup that runs until a fixed terminator and never changes depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Comment,
    CData,
    Instruction,
    Declaration,
}

impl Skip {
    fn terminator(self) -> &'static [u8] {
        match self {
            Skip::Comment => b"-->",
            Skip::CData => b"]]>",
            Skip::Instruction => b"?>",
            Skip::Declaration => b">",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Character data between tags.
    Text,
    /// Just consumed `<`.
    Open,
    /// Consumed `<!`, plus a first `-` when `dash` is set.
    Bang { dash: bool },
    /// Inside a start or end tag.
    Tag {
        closing: bool,
        quote: Option<u8>,
        prev: u8,
    },
    /// Inside a comment, CDATA section, processing instruction or declaration.
    Skip { kind: Skip, matched: usize },
}

/// Incremental decoder for the INDI byte stream.
///
/// The stream is an endless sequence of top-level XML elements with no
/// enclosing document. Bytes are fed in arbitrary chunks; complete elements
/// are found by tracking element depth, then parsed one at a time.
///
/// After any decode error the decoder is poisoned and every later call
/// returns [`WireError::Poisoned`] until [`Decoder::reset`].
#[derive(Debug)]
pub struct Decoder {
    buf: BytesMut,
    /// Bytes of `buf` already consumed by the scanner.
    scanned: usize,
    state: Scan,
    depth: usize,
    /// Offset of the most recent `<`.
    lt_pos: usize,
    /// Offset where the current top-level element starts.
    fragment_start: Option<usize>,
    poisoned: bool,
    config: DecoderConfig,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            scanned: 0,
            state: Scan::Text,
            depth: 0,
            lt_pos: 0,
            fragment_start: None,
            poisoned: false,
            config,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Decode the next complete message, if one is buffered.
    ///
    /// Unknown top-level elements are skipped. `Ok(None)` means more bytes
    /// are needed.
    pub fn next_message(&mut self) -> Result<Option<WireMessage>> {
        loop {
            let Some(fragment) = self.next_fragment()? else {
                return Ok(None);
            };
            match parse_fragment(&fragment) {
                Ok(Some(message)) => {
                    trace!(%message, "decoded message");
                    return Ok(Some(message));
                }
                Ok(None) => continue,
                Err(err) => {
                    self.poisoned = true;
                    return Err(err);
                }
            }
        }
    }

    /// Iterate over every message currently decodable.
    pub fn pull(&mut self) -> Pull<'_> {
        Pull { decoder: self }
    }

    /// Split off the next complete top-level element.
    pub fn next_fragment(&mut self) -> Result<Option<Bytes>> {
        if self.poisoned {
            return Err(WireError::Poisoned);
        }
        match self.scan() {
            Ok(Some((start, end))) => {
                let mut fragment = self.buf.split_to(end);
                fragment.advance(start);
                self.scanned = 0;
                self.fragment_start = None;
                Ok(Some(fragment.freeze()))
            }
            Ok(None) => {
                self.compact();
                if let Some(start) = self.fragment_start {
                    let size = self.buf.len() - start;
                    if size > self.config.max_fragment_size {
                        self.poisoned = true;
                        return Err(WireError::FragmentTooLarge {
                            size,
                            max: self.config.max_fragment_size,
                        });
                    }
                }
                Ok(None)
            }
            Err(err) => {
                self.poisoned = true;
                Err(err)
            }
        }
    }

    /// Drop all buffered bytes and scanner state, clearing a poisoned decoder.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.state = Scan::Text;
        self.depth = 0;
        self.lt_pos = 0;
        self.fragment_start = None;
        self.poisoned = false;
    }

    /// Bytes held but not yet returned as messages.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Whether a previous error requires [`Decoder::reset`].
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Drop inter-element bytes that can no longer belong to a fragment.
    fn compact(&mut self) {
        let idle = self.depth == 0
            && self.fragment_start.is_none()
            && matches!(self.state, Scan::Text | Scan::Skip { .. });
        if idle && self.scanned > 0 {
            self.buf.advance(self.scanned);
            self.scanned = 0;
        }
    }

    /// Advance the scanner; returns the byte range of a completed element.
    fn scan(&mut self) -> Result<Option<(usize, usize)>> {
        while self.scanned < self.buf.len() {
            let pos = self.scanned;
            let byte = self.buf[pos];
            self.scanned += 1;

            self.state = match self.state {
                Scan::Text => {
                    if byte == b'<' {
                        self.lt_pos = pos;
                        Scan::Open
                    } else {
                        Scan::Text
                    }
                }
                Scan::Open => match byte {
                    b'/' => {
                        if self.depth == 0 {
                            return Err(malformed(
                                "end tag without matching start tag",
                                &self.buf[self.lt_pos..self.scanned],
                            ));
                        }
                        Scan::Tag {
                            closing: true,
                            quote: None,
                            prev: byte,
                        }
                    }
                    b'?' => Scan::Skip {
                        kind: Skip::Instruction,
                        matched: 0,
                    },
                    b'!' => Scan::Bang { dash: false },
                    _ if byte.is_ascii_whitespace() || byte == b'>' || byte == b'<' => {
                        return Err(malformed(
                            "invalid character after '<'",
                            &self.buf[self.lt_pos..self.scanned],
                        ));
                    }
                    _ => {
                        if self.depth == 0 {
                            self.fragment_start = Some(self.lt_pos);
                        }
                        Scan::Tag {
                            closing: false,
                            quote: None,
                            prev: byte,
                        }
                    }
                },
                Scan::Bang { dash: false } => match byte {
                    b'-' => Scan::Bang { dash: true },
                    b'[' => Scan::Skip {
                        kind: Skip::CData,
                        matched: 0,
                    },
                    b'>' => Scan::Text,
                    _ => Scan::Skip {
                        kind: Skip::Declaration,
                        matched: 0,
                    },
                },
                Scan::Bang { dash: true } => {
                    if byte != b'-' {
                        return Err(malformed(
                            "broken comment opener",
                            &self.buf[self.lt_pos..self.scanned],
                        ));
                    }
                    Scan::Skip {
                        kind: Skip::Comment,
                        matched: 0,
                    }
                }
                Scan::Skip { kind, matched } => {
                    let terminator = kind.terminator();
                    let matched = advance_match(terminator, matched, byte);
                    if matched == terminator.len() {
                        Scan::Text
                    } else {
                        Scan::Skip { kind, matched }
                    }
                }
                Scan::Tag {
                    closing,
                    quote: Some(q),
                    ..
                } => Scan::Tag {
                    closing,
                    quote: if byte == q { None } else { Some(q) },
                    prev: byte,
                },
                Scan::Tag {
                    closing,
                    quote: None,
                    prev,
                } => match byte {
                    b'"' | b'\'' => Scan::Tag {
                        closing,
                        quote: Some(byte),
                        prev: byte,
                    },
                    b'>' => {
                        if closing {
                            self.depth -= 1;
                        } else if prev != b'/' {
                            self.depth += 1;
                        }
                        if self.depth == 0 {
                            if let Some(start) = self.fragment_start {
                                self.state = Scan::Text;
                                return Ok(Some((start, self.scanned)));
                            }
                        }
                        Scan::Text
                    }
                    _ => Scan::Tag {
                        closing,
                        quote: None,
                        prev: byte,
                    },
                },
            };
        }
        Ok(None)
    }
}

/// Length of the longest terminator prefix that ends the input seen so far.
fn advance_match(terminator: &[u8], matched: usize, byte: u8) -> usize {
    if terminator[matched] == byte {
        return matched + 1;
    }
    // Fall back to shorter prefixes, e.g. "--->" after "--".
    let mut candidate = matched;
    while candidate > 0 {
        if terminator[candidate - 1] == byte
            && terminator[..candidate - 1] == terminator[matched + 1 - candidate..matched]
        {
            return candidate;
        }
        candidate -= 1;
    }
    0
}

/// Iterator returned by [`Decoder::pull`].
///
/// Stops at the first error; the decoder is poisoned from then on.
pub struct Pull<'a> {
    decoder: &'a mut Decoder,
}

impl Iterator for Pull<'_> {
    type Item = Result<WireMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.decoder.is_poisoned() {
            return None;
        }
        self.decoder.next_message().transpose()
    }
}

/// Reads complete messages from any `Read` stream.
///
/// Handles partial reads internally, so callers always get whole messages.
pub struct MessageReader<T> {
    inner: T,
    decoder: Decoder,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, DecoderConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: DecoderConfig) -> Self {
        Self {
            inner,
            decoder: Decoder::with_config(config),
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(WireError::ConnectionClosed)` when EOF is reached.
    pub fn read_message(&mut self) -> Result<WireMessage> {
        loop {
            if let Some(message) = self.decoder.next_message()? {
                return Ok(message);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(WireError::Io(err)),
            };

            if read == 0 {
                return Err(WireError::ConnectionClosed);
            }

            self.decoder.feed(&chunk[..read]);
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

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// The decoder holding any partially received element.
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }
}
