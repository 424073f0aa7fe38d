//! TCP transport for INDI clients.
//!
//! INDI servers speak a push protocol over one long-lived TCP connection
//! (default port 7624). This crate provides:
//! - [`ServerAddress`] parsing (`host`, `host:port`, `[v6]:port`)
//! - [`TcpTransport::connect`] with a bounded connect timeout
//! - [`IndiStream`], the connected `Read + Write` stream
//!
//! This is the lowest layer of indiprims. Everything else builds on top of
//! the [`IndiStream`] type provided here.

pub mod address;
pub mod error;
pub mod stream;
pub mod tcp;

pub use address::{ServerAddress, DEFAULT_PORT};
pub use error::{Result, TransportError};
pub use stream::IndiStream;
pub use tcp::TcpTransport;
