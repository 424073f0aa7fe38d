/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (resolve, connect, socket I/O).
    #[error("transport error: {0}")]
    Transport(#[from] indiprims_transport::TransportError),

    /// Wire-level error (decode failure, write failure).
    #[error("wire error: {0}")]
    Wire(#[from] indiprims_wire::WireError),

    /// No server connection is established.
    #[error("not connected to an INDI server")]
    NotConnected,

    /// The device has not been announced by the server.
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    /// The device exists but has no such property.
    #[error("device '{device}' has no property '{property}'")]
    UnknownProperty { device: String, property: String },

    /// The device is already in the requested connection state.
    #[error("device '{device}' is already {state}")]
    AlreadyInState { device: String, state: &'static str },
}

impl ClientError {
    /// Whether the target of a command was missing from the registry.
    pub fn is_unknown_target(&self) -> bool {
        matches!(
            self,
            ClientError::UnknownDevice(_) | ClientError::UnknownProperty { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
