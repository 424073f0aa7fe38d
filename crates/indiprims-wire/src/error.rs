/// Errors that can occur while decoding or encoding INDI messages.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The stream contained data that is not a valid INDI message.
    ///
    /// `fragment` holds (a prefix of) the offending input for logging.
    #[error("malformed wire data: {reason} in [{fragment}]")]
    Malformed { reason: String, fragment: String },

    /// A single top-level element grew beyond the configured limit.
    #[error("fragment too large ({size} bytes, max {max})")]
    FragmentTooLarge { size: usize, max: usize },

    /// A previous error left the decoder in an unknown state; reset it.
    #[error("decoder failed earlier and must be reset")]
    Poisoned,

    /// An I/O error occurred while reading or writing messages.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed while writing.
    #[error("connection closed")]
    ConnectionClosed,
}

impl WireError {
    /// Whether this error means the inbound stream can no longer be trusted.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            WireError::Malformed { .. } | WireError::FragmentTooLarge { .. } | WireError::Poisoned
        )
    }
}

pub type Result<T> = std::result::Result<T, WireError>;

/// Longest fragment excerpt kept in a [`WireError::Malformed`].
pub(crate) const FRAGMENT_EXCERPT_LEN: usize = 512;

pub(crate) fn malformed(reason: impl Into<String>, fragment: &[u8]) -> WireError {
    let end = fragment.len().min(FRAGMENT_EXCERPT_LEN);
    let mut excerpt = String::from_utf8_lossy(&fragment[..end]).into_owned();
    if fragment.len() > end {
        excerpt.push_str("...");
    }
    WireError::Malformed {
        reason: reason.into(),
        fragment: excerpt,
    }
}
