//! Drive the registry from a tokio task using the async codec.
//!
//! Run with:
//!   cargo run --example async-watch --features async -- localhost:7624

use bytes::BytesMut;
use indiprims::client::{command, dispatch, ClientEvent, Registry};
use indiprims::transport::ServerAddress;
use indiprims::wire::{IndiCodec, WireMessage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server: ServerAddress = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:7624".to_string())
        .parse()?;
    let mut stream = TcpStream::connect((server.host(), server.port())).await?;
    eprintln!("Connected to {server}");

    let mut codec = IndiCodec::new();
    let mut outbound = BytesMut::new();
    Encoder::<WireMessage>::encode(&mut codec, command::get_properties(None), &mut outbound)?;
    stream.write_all(&outbound).await?;

    let mut registry = Registry::new();
    let mut events: Vec<ClientEvent> = Vec::new();
    let mut inbound = BytesMut::with_capacity(64 * 1024);

    loop {
        tokio::select! {
            read = stream.read_buf(&mut inbound) => {
                if read? == 0 {
                    eprintln!("Server closed the connection");
                    break;
                }
                while let Some(message) = codec.decode(&mut inbound)? {
                    dispatch(&mut registry, &mut events, message, true);
                }
                for event in events.drain(..) {
                    println!("{event}");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    for device in registry.all() {
        eprintln!("{}: {} properties", device.name(), device.len());
    }
    Ok(())
}
