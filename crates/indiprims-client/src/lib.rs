//! INDI client engine.
//!
//! This is the "just works" layer. Connect to a server, watch devices and
//! their property vectors appear in the [`Registry`], receive
//! [`ClientEvent`]s, and send commands back to drivers.

pub mod command;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod interface;
pub mod registry;

pub use config::{ClientConfig, DEFAULT_READ_CHUNK, DEFAULT_WRITE_TIMEOUT};
pub use connection::{Connection, ConnectionState};
pub use dispatcher::dispatch;
pub use error::{ClientError, Result};
pub use events::{ClientEvent, EventBus, EventSink, SubscriptionId};
pub use registry::{Device, PropertyVector, Registry, Removed, CONNECT, CONNECTION, DISCONNECT};
