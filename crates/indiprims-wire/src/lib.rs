//! INDI wire model, streaming decoder and serializer.
//!
//! The INDI stream is an unbounded sequence of top-level XML elements with
//! no enclosing document. This crate turns arbitrary byte chunks into typed
//! [`WireMessage`]s and back:
//! - [`Decoder`] tracks element depth so chunk boundaries never matter
//! - [`encode_message`] renders commands and definitions as single elements
//! - [`MessageReader`] / [`MessageWriter`] wrap blocking `Read`/`Write` streams
//!
//! Enable the `async` feature for a `tokio_util` codec.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod kind;
pub mod message;
pub mod number;
mod parse;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::IndiCodec;
pub use decoder::{Decoder, DecoderConfig, MessageReader, Pull, DEFAULT_MAX_FRAGMENT};
pub use encoder::{encode_message, to_xml};
pub use error::{Result, WireError};
pub use kind::{BlobMode, SwitchState, VectorKind, PROTOCOL_VERSION};
pub use message::{
    BlobElement, DelProperty, Elements, EnableBlob, GetProperties, LightElement, Notice,
    NumberElement, SwitchElement, TextElement, VectorHeader, VectorMessage, WireMessage,
};
pub use number::{format_number, parse_number};
pub use writer::MessageWriter;
