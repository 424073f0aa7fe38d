//! `tokio_util` codec for framing an async stream into [`WireMessage`]s.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder as CodecDecoder, Encoder};

use crate::decoder::{Decoder, DecoderConfig};
use crate::encoder::encode_message;
use crate::error::WireError;
use crate::message::WireMessage;

/// Wraps the streaming [`Decoder`] for use with `tokio_util::codec::Framed`.
#[derive(Debug, Default)]
pub struct IndiCodec {
    decoder: Decoder,
}

impl IndiCodec {
    /// Codec with the default decoder limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with custom decoder limits.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            decoder: Decoder::with_config(config),
        }
    }
}

impl CodecDecoder for IndiCodec {
    type Item = WireMessage;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !src.is_empty() {
            let chunk = src.split();
            self.decoder.feed(&chunk);
        }
        self.decoder.next_message()
    }
}

impl Encoder<WireMessage> for IndiCodec {
    type Error = WireError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        <Self as Encoder<&WireMessage>>::encode(self, &item, dst)
    }
}

impl<'a> Encoder<&'a WireMessage> for IndiCodec {
    type Error = WireError;

    fn encode(&mut self, item: &'a WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_message(item, dst)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{DelProperty, GetProperties};

    #[test]
    fn decodes_across_calls() {
        let mut codec = IndiCodec::new();
        let mut buf = BytesMut::from(&b"<delProperty device=\"Mou"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.extend_from_slice(b"nt\"/>\n<delProperty device=\"Cam\"/>");
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.device(), Some("Mount"));
        assert_eq!(second.device(), Some("Cam"));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encodes_with_newline() {
        let mut codec = IndiCodec::new();
        let mut dst = BytesMut::new();
        let del = WireMessage::DelProperty(DelProperty {
            device: "Mount".to_string(),
            ..DelProperty::default()
        });
        codec.encode(del, &mut dst).unwrap();
        codec
            .encode(&WireMessage::GetProperties(GetProperties::default()), &mut dst)
            .unwrap();
        assert_eq!(
            &dst[..],
            b"<delProperty device=\"Mount\"/>\n<getProperties/>\n"
        );
    }
}
