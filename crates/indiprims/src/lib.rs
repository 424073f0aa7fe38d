//! INDI instrument control for Rust.
//!
//! indiprims talks to INDI servers (telescope mounts, cameras, focusers and
//! other observatory hardware) over the INDI XML protocol.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connect and the server stream
//! - [`wire`]: message model, streaming decoder and serializer
//! - [`client`]: device registry, events and the client connection (behind
//!   the default `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use indiprims_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use indiprims_wire::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use indiprims_client::*;
}
