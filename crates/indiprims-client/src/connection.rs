use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use indiprims_transport::{IndiStream, ServerAddress, TcpTransport, TransportError};
use indiprims_wire::{BlobMode, Decoder, MessageWriter, SwitchState, WireError, WireMessage};
use tracing::{debug, error, info, trace, warn};

use crate::command;
use crate::config::ClientConfig;
use crate::dispatcher::dispatch;
use crate::error::{ClientError, Result};
use crate::events::{ClientEvent, EventBus, EventSink};
use crate::registry::{Device, PropertyVector, Registry, CONNECT, CONNECTION};

type ConnectOutcome = indiprims_transport::Result<IndiStream>;

/// Lifecycle of the server link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// One INDI server session: socket, decoder, registry and event sink.
///
/// The connection is driven by its owner: call [`Connection::poll`] in a
/// loop, or [`Connection::on_readable`] / [`Connection::handle_bytes`] from
/// an external readiness source. Every event is delivered synchronously to
/// the sink `S` from inside those calls.
///
/// Command helpers come in two flavours: `try_*` returns the reason a
/// command was not sent, the plain form logs it and returns `false`.
pub struct Connection<S: EventSink = EventBus> {
    config: ClientConfig,
    state: ConnectionState,
    reader: Option<IndiStream>,
    writer: Option<MessageWriter<IndiStream>>,
    pending: Option<Receiver<ConnectOutcome>>,
    decoder: Decoder,
    registry: Registry,
    events: S,
    blob_mode: BlobMode,
    read_buf: Vec<u8>,
}

impl Connection<EventBus> {
    /// Disconnected connection publishing to a fresh [`EventBus`].
    pub fn new(config: ClientConfig) -> Self {
        Self::with_sink(config, EventBus::new())
    }
}

impl<S: EventSink> Connection<S> {
    /// Disconnected connection publishing to `events`.
    pub fn with_sink(config: ClientConfig, events: S) -> Self {
        let decoder = Decoder::with_config(config.decoder_config());
        let read_buf = vec![0u8; config.read_chunk_size.max(1)];
        Self {
            config,
            state: ConnectionState::Disconnected,
            reader: None,
            writer: None,
            pending: None,
            decoder,
            registry: Registry::new(),
            events,
            blob_mode: BlobMode::default(),
            read_buf,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the server link is up.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Server this connection targets.
    pub fn server(&self) -> &ServerAddress {
        &self.config.server
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Devices and vectors announced so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shortcut for `registry().get(name)`.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.registry.get(name)
    }

    /// Event sink.
    pub fn events(&self) -> &S {
        &self.events
    }

    /// Event sink, mutably (to subscribe or drain).
    pub fn events_mut(&mut self) -> &mut S {
        &mut self.events
    }

    /// The last BLOB policy requested through [`Connection::set_blob_mode`].
    pub fn blob_mode(&self) -> BlobMode {
        self.blob_mode
    }

    /// Change the target server. Takes effect on the next connect.
    pub fn set_server(&mut self, server: ServerAddress) {
        if self.state != ConnectionState::Disconnected {
            debug!(current = %self.config.server, next = %server, "server change deferred until reconnect");
        }
        self.config.server = server;
    }

    /// Blocking connect bounded by `connect_timeout`.
    ///
    /// Returns `true` when connected, including when already connected.
    pub fn connect(&mut self) -> bool {
        match self.try_connect() {
            Ok(()) => true,
            Err(err) => {
                warn!(server = %self.config.server, error = %err, "connect failed");
                false
            }
        }
    }

    /// Like [`Connection::connect`], returning the failure.
    pub fn try_connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.pending = None;
        self.state = ConnectionState::Connecting;
        match TcpTransport::connect(&self.config.server, self.config.connect_timeout) {
            Ok(stream) => self.establish(stream),
            Err(err) => {
                self.state = ConnectionState::Disconnected;
                Err(err.into())
            }
        }
    }

    /// Start a connect on a background thread.
    ///
    /// Returns `false` when already connected or the thread could not be
    /// spawned. Completion is reported by [`Connection::poll_connect`] (or
    /// [`Connection::poll`]).
    pub fn begin_connect(&mut self) -> bool {
        if self.is_connected() {
            return false;
        }
        if self.pending.is_some() {
            return true;
        }

        let (tx, rx) = mpsc::channel();
        let server = self.config.server.clone();
        let timeout = self.config.connect_timeout;
        let spawned = thread::Builder::new()
            .name("indi-connect".to_string())
            .spawn(move || {
                // The receiver is gone if the connection was dropped meanwhile.
                let _ = tx.send(TcpTransport::connect(&server, timeout));
            });

        match spawned {
            Ok(_) => {
                debug!(server = %self.config.server, "background connect started");
                self.pending = Some(rx);
                self.state = ConnectionState::Connecting;
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to spawn connect thread");
                false
            }
        }
    }

    /// Pick up the result of [`Connection::begin_connect`].
    ///
    /// `None` while the attempt is still running or none is pending.
    pub fn poll_connect(&mut self) -> Option<bool> {
        let outcome = match self.pending.as_ref()?.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(connect_thread_lost()),
        };
        self.pending = None;
        Some(self.finish_connect(outcome))
    }

    /// Wait up to `timeout` for progress, then process it.
    ///
    /// Returns the number of messages dispatched. While a background connect
    /// is pending this waits for its completion instead.
    pub fn poll(&mut self, timeout: Duration) -> usize {
        if let Some(rx) = self.pending.as_ref() {
            let outcome = match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => return 0,
                Err(RecvTimeoutError::Disconnected) => Err(connect_thread_lost()),
            };
            self.pending = None;
            self.finish_connect(outcome);
            return 0;
        }

        let Some(reader) = self.reader.as_ref() else {
            return 0;
        };
        match reader.wait_readable(timeout) {
            Ok(true) => self.on_readable(),
            Ok(false) => 0,
            Err(err) => {
                warn!(server = %self.config.server, error = %err, "socket wait failed");
                self.disconnect();
                0
            }
        }
    }

    /// Drain every byte currently available on the socket and dispatch the
    /// complete messages. Returns the number dispatched.
    ///
    /// End of stream or a socket error drops the connection.
    pub fn on_readable(&mut self) -> usize {
        let mut dispatched = 0;
        loop {
            let Some(reader) = self.reader.as_mut() else {
                break;
            };
            match reader.read(&mut self.read_buf) {
                Ok(0) => {
                    info!(server = %self.config.server, "server closed the connection");
                    self.disconnect();
                    break;
                }
                Ok(n) => {
                    trace!(bytes = n, "received");
                    self.decoder.feed(&self.read_buf[..n]);
                    dispatched += self.process_buffered();
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!(server = %self.config.server, error = %err, "socket read failed");
                    self.disconnect();
                    break;
                }
            }
        }
        dispatched
    }

    /// Feed bytes read by the host and dispatch the complete messages.
    ///
    /// Ignored unless connected.
    pub fn handle_bytes(&mut self, bytes: &[u8]) -> usize {
        if !self.is_connected() {
            debug!(bytes = bytes.len(), "discarding bytes while disconnected");
            return 0;
        }
        self.decoder.feed(bytes);
        self.process_buffered()
    }

    /// Drop the server link.
    ///
    /// Every known device is reported disconnected and removed, then
    /// `ServerDisconnected` is emitted and the socket closed. Returns
    /// `false` when there was nothing to disconnect. Cancelling a pending
    /// background connect emits no events.
    pub fn disconnect(&mut self) -> bool {
        let cancelled = self.pending.take().is_some();
        let Some(reader) = self.reader.take() else {
            if cancelled {
                debug!(server = %self.config.server, "background connect cancelled");
                self.state = ConnectionState::Disconnected;
            }
            return cancelled;
        };
        self.writer = None;
        self.state = ConnectionState::Disconnected;
        self.decoder.reset();

        for device in self.registry.clear() {
            self.events.emit(ClientEvent::DeviceDisconnected {
                device: device.clone(),
            });
            self.events.emit(ClientEvent::DeviceRemoved { device });
        }
        info!(server = %self.config.server, "server disconnected");
        self.events.emit(ClientEvent::ServerDisconnected {
            server: self.config.server.to_string(),
        });
        reader.shutdown();
        true
    }

    /// Write one message. A write failure drops the connection.
    pub fn send(&mut self, message: &WireMessage) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        match writer.send(message) {
            Ok(()) => {
                debug!(tag = %message.tag_name(), device = ?message.device(), "sent");
                Ok(())
            }
            Err(err) => {
                warn!(server = %self.config.server, error = %err, "send failed");
                self.disconnect();
                Err(err.into())
            }
        }
    }

    /// `getProperties`, global or for one device. The device need not be
    /// known yet.
    pub fn request_properties(&mut self, device: Option<&str>) -> bool {
        let result = self.try_request_properties(device);
        report("getProperties", result)
    }

    /// Like [`Self::request_properties`], returning the failure.
    pub fn try_request_properties(&mut self, device: Option<&str>) -> Result<()> {
        self.send(&command::get_properties(device))
    }

    /// `enableBLOB` for a known device, optionally narrowed to one property.
    pub fn set_blob_mode(&mut self, mode: BlobMode, device: &str, property: Option<&str>) -> bool {
        let result = self.try_set_blob_mode(mode, device, property);
        report("enableBLOB", result)
    }

    /// Like [`Self::set_blob_mode`], returning the failure.
    pub fn try_set_blob_mode(
        &mut self,
        mode: BlobMode,
        device: &str,
        property: Option<&str>,
    ) -> Result<()> {
        self.require_connected()?;
        self.require_device(device)?;
        self.blob_mode = mode;
        self.send(&command::enable_blob(mode, device, property))
    }

    /// `newTextVector` for a known property.
    pub fn send_text<I, K, V>(&mut self, device: &str, property: &str, elements: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let result = self.try_send_text(device, property, elements);
        report("newTextVector", result)
    }

    /// Like [`Self::send_text`], returning the failure.
    pub fn try_send_text<I, K, V>(&mut self, device: &str, property: &str, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.require_connected()?;
        self.require_property(device, property)?;
        self.send(&command::new_text_vector(device, property, elements))
    }

    /// `newNumberVector` for a known property.
    pub fn send_number<I, K>(&mut self, device: &str, property: &str, elements: I) -> bool
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let result = self.try_send_number(device, property, elements);
        report("newNumberVector", result)
    }

    /// Like [`Self::send_number`], returning the failure.
    pub fn try_send_number<I, K>(&mut self, device: &str, property: &str, elements: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.require_connected()?;
        self.require_property(device, property)?;
        self.send(&command::new_number_vector(device, property, elements))
    }

    /// `newSwitchVector` for a known property.
    pub fn send_switch<I, K, V>(&mut self, device: &str, property: &str, elements: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SwitchState>,
    {
        let result = self.try_send_switch(device, property, elements);
        report("newSwitchVector", result)
    }

    /// Like [`Self::send_switch`], returning the failure.
    pub fn try_send_switch<I, K, V>(
        &mut self,
        device: &str,
        property: &str,
        elements: I,
    ) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SwitchState>,
    {
        self.require_connected()?;
        self.require_property(device, property)?;
        self.send(&command::new_switch_vector(device, property, elements))
    }

    /// Ask the driver to connect its hardware (`CONNECTION.CONNECT` On).
    pub fn connect_device(&mut self, device: &str) -> bool {
        let result = self.try_connect_device(device);
        report("connectDevice", result)
    }

    /// Like [`Self::connect_device`], returning the failure.
    pub fn try_connect_device(&mut self, device: &str) -> Result<()> {
        self.switch_connection(device, true)
    }

    /// Ask the driver to disconnect its hardware (`CONNECTION.DISCONNECT` On).
    pub fn disconnect_device(&mut self, device: &str) -> bool {
        let result = self.try_disconnect_device(device);
        report("disconnectDevice", result)
    }

    /// Like [`Self::disconnect_device`], returning the failure.
    pub fn try_disconnect_device(&mut self, device: &str) -> Result<()> {
        self.switch_connection(device, false)
    }

    fn switch_connection(&mut self, device: &str, connect: bool) -> Result<()> {
        self.require_connected()?;
        let connected = self
            .require_property(device, CONNECTION)?
            .is_switch_on(CONNECT);
        if connected == connect {
            return Err(ClientError::AlreadyInState {
                device: device.to_string(),
                state: if connect { "connected" } else { "disconnected" },
            });
        }
        self.send(&command::connection_switch(device, connect))
    }

    fn require_connected(&self) -> Result<()> {
        if self.writer.is_some() {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn require_device(&self, device: &str) -> Result<&Device> {
        self.registry
            .get(device)
            .ok_or_else(|| ClientError::UnknownDevice(device.to_string()))
    }

    fn require_property(&self, device: &str, property: &str) -> Result<&PropertyVector> {
        self.require_device(device)?
            .property(property)
            .ok_or_else(|| ClientError::UnknownProperty {
                device: device.to_string(),
                property: property.to_string(),
            })
    }

    fn establish(&mut self, stream: IndiStream) -> Result<()> {
        let writer_stream = match split_stream(&stream) {
            Ok(writer_stream) => writer_stream,
            Err(err) => {
                stream.shutdown();
                self.state = ConnectionState::Disconnected;
                return Err(err.into());
            }
        };

        self.decoder.reset();
        self.reader = Some(stream);
        self.writer =
            Some(MessageWriter::new(writer_stream).with_write_timeout(self.config.write_timeout));
        self.state = ConnectionState::Connected;

        info!(server = %self.config.server, "server connected");
        self.events.emit(ClientEvent::ServerConnected {
            server: self.config.server.to_string(),
        });
        Ok(())
    }

    fn finish_connect(&mut self, outcome: ConnectOutcome) -> bool {
        let result = match outcome {
            Ok(stream) => self.establish(stream),
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(server = %self.config.server, error = %err, "connect failed");
                self.state = ConnectionState::Disconnected;
                false
            }
        }
    }

    fn process_buffered(&mut self) -> usize {
        let mut dispatched = 0;
        while self.is_connected() {
            match self.decoder.next_message() {
                Ok(Some(message)) => {
                    dispatch(&mut self.registry, &mut self.events, message, true);
                    dispatched += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    self.on_decode_error(err);
                    break;
                }
            }
        }
        dispatched
    }

    fn on_decode_error(&mut self, err: WireError) {
        error!(server = %self.config.server, error = %err, "undecodable server stream");
        self.disconnect();
        if self.config.reconnect_on_decode_error {
            info!(server = %self.config.server, "reconnecting after decode error");
            self.connect();
        }
    }
}

impl<S: EventSink> Drop for Connection<S> {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.shutdown();
        }
    }
}

impl<S: EventSink> std::fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.config.server)
            .field("state", &self.state)
            .field("devices", &self.registry.len())
            .field("buffered", &self.decoder.buffered_len())
            .finish()
    }
}

/// Non-blocking reader plus a cloned handle for the writer.
fn split_stream(stream: &IndiStream) -> indiprims_transport::Result<IndiStream> {
    stream.set_nonblocking(true)?;
    stream.try_clone()
}

fn connect_thread_lost() -> TransportError {
    TransportError::Io(io::Error::other("connect thread exited without a result"))
}

fn report(op: &str, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(err) if err.is_unknown_target() => {
            warn!(op, error = %err, "command target unknown, nothing sent");
            false
        }
        Err(err) => {
            warn!(op, error = %err, "command not sent");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;

    use super::*;

    fn config_for(listener: &TcpListener) -> ClientConfig {
        let port = listener.local_addr().unwrap().port();
        let mut config = ClientConfig::new(ServerAddress::new("127.0.0.1", port).unwrap());
        config.connect_timeout = Duration::from_secs(2);
        config
    }

    fn connected() -> (Connection<Vec<ClientEvent>>, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = Connection::with_sink(config_for(&listener), Vec::new());
        assert!(conn.connect());
        let (server, _) = listener.accept().unwrap();
        (conn, server)
    }

    const CONNECTION_DEF: &str = r#"<defSwitchVector device="Mount" name="CONNECTION" state="Ok" perm="rw" rule="OneOfMany"><defSwitch name="CONNECT">Off</defSwitch><defSwitch name="DISCONNECT">On</defSwitch></defSwitchVector>"#;

    #[test]
    fn connection_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Connection>();
        assert_send::<Connection<Vec<ClientEvent>>>();
    }

    #[test]
    fn commands_require_a_connection() {
        let mut conn = Connection::with_sink(ClientConfig::default(), Vec::new());
        assert!(matches!(
            conn.try_request_properties(None),
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            conn.try_send_number("Mount", "X", [("A", 1.0)]),
            Err(ClientError::NotConnected)
        ));
        assert!(!conn.connect_device("Mount"));
        assert!(!conn.disconnect());
        assert!(conn.events().is_empty());
    }

    #[test]
    fn refused_connect_emits_nothing() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let config = config_for(&listener);
        drop(listener);

        let mut conn = Connection::with_sink(config, Vec::new());
        assert!(!conn.connect());
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(conn.events().is_empty());
    }

    #[test]
    fn handle_bytes_dispatches_and_disconnect_clears() {
        let (mut conn, _server) = connected();
        let (head, tail) = CONNECTION_DEF.split_at(40);
        assert_eq!(conn.handle_bytes(head.as_bytes()), 0);
        assert_eq!(conn.handle_bytes(tail.as_bytes()), 1);
        assert!(conn.registry().vector("Mount", CONNECTION).is_some());

        assert!(conn.disconnect());
        assert!(!conn.disconnect());
        assert!(conn.registry().is_empty());

        let names: Vec<String> = conn.events().iter().map(|e| e.name().into_owned()).collect();
        assert_eq!(
            names,
            vec![
                "serverConnected",
                "deviceDiscovered",
                "deviceDisconnected",
                "propertyDefined",
                "propertyDefined.Switch",
                "deviceDisconnected",
                "deviceRemoved",
                "serverDisconnected",
            ]
        );
    }

    #[test]
    fn device_commands_check_registry_and_state() {
        let (mut conn, _server) = connected();
        conn.handle_bytes(CONNECTION_DEF.as_bytes());

        assert!(matches!(
            conn.try_set_blob_mode(BlobMode::Also, "Ghost", None),
            Err(ClientError::UnknownDevice(_))
        ));
        assert_eq!(conn.blob_mode(), BlobMode::Never);
        assert!(matches!(
            conn.try_send_text("Mount", "NOPE", [("A", "b")]),
            Err(ClientError::UnknownProperty { .. })
        ));
        assert!(matches!(
            conn.try_disconnect_device("Mount"),
            Err(ClientError::AlreadyInState { .. })
        ));
        conn.try_connect_device("Mount").unwrap();
        conn.try_set_blob_mode(BlobMode::Also, "Mount", None).unwrap();
        assert_eq!(conn.blob_mode(), BlobMode::Also);
    }

    #[test]
    fn server_hangup_disconnects() {
        let (mut conn, mut server) = connected();
        server.write_all(CONNECTION_DEF.as_bytes()).unwrap();
        drop(server);

        let mut dispatched = 0;
        for _ in 0..50 {
            dispatched += conn.poll(Duration::from_millis(100));
            if !conn.is_connected() {
                break;
            }
        }
        assert_eq!(dispatched, 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(
            conn.events().last(),
            Some(ClientEvent::ServerDisconnected { .. })
        ));
    }

    #[test]
    fn background_connect_completes_through_poll() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut conn = Connection::with_sink(config_for(&listener), Vec::new());
        assert!(conn.begin_connect());
        assert_eq!(conn.state(), ConnectionState::Connecting);

        for _ in 0..50 {
            conn.poll(Duration::from_millis(100));
            if conn.is_connected() {
                break;
            }
        }
        assert!(conn.is_connected());
        assert_eq!(conn.poll_connect(), None);
        assert!(matches!(
            conn.events().first(),
            Some(ClientEvent::ServerConnected { .. })
        ));
    }
}
