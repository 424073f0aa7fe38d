use std::borrow::Cow;
use std::fmt;
use std::sync::mpsc;

use indiprims_wire::VectorKind;
use serde::Serialize;

/// Domain events raised while processing server traffic.
///
/// Emission order follows the wire: discovery before property events, the
/// connection heuristics in element order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    ServerConnected {
        server: String,
    },
    ServerDisconnected {
        server: String,
    },
    DeviceDiscovered {
        device: String,
    },
    DeviceRemoved {
        device: String,
    },
    DeviceConnected {
        device: String,
    },
    DeviceDisconnected {
        device: String,
    },
    /// A vector was defined (any kind).
    PropertyDefined {
        device: String,
        name: String,
    },
    /// Kind-specific companion of [`ClientEvent::PropertyDefined`].
    KindDefined {
        device: String,
        name: String,
        kind: VectorKind,
    },
    /// A vector received new values.
    KindUpdated {
        device: String,
        name: String,
        kind: VectorKind,
    },
    PropertyRemoved {
        device: String,
        name: String,
    },
    /// A `message` notice; `device` is `None` for server-wide notices.
    DeviceMessage {
        device: Option<String>,
        message: String,
        timestamp: Option<String>,
    },
}

impl ClientEvent {
    /// Event name, e.g. `deviceConnected` or `propertyUpdated.Number`.
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            ClientEvent::ServerConnected { .. } => Cow::Borrowed("serverConnected"),
            ClientEvent::ServerDisconnected { .. } => Cow::Borrowed("serverDisconnected"),
            ClientEvent::DeviceDiscovered { .. } => Cow::Borrowed("deviceDiscovered"),
            ClientEvent::DeviceRemoved { .. } => Cow::Borrowed("deviceRemoved"),
            ClientEvent::DeviceConnected { .. } => Cow::Borrowed("deviceConnected"),
            ClientEvent::DeviceDisconnected { .. } => Cow::Borrowed("deviceDisconnected"),
            ClientEvent::PropertyDefined { .. } => Cow::Borrowed("propertyDefined"),
            ClientEvent::KindDefined { kind, .. } => Cow::Owned(format!("propertyDefined.{kind}")),
            ClientEvent::KindUpdated { kind, .. } => Cow::Owned(format!("propertyUpdated.{kind}")),
            ClientEvent::PropertyRemoved { .. } => Cow::Borrowed("propertyRemoved"),
            ClientEvent::DeviceMessage { .. } => Cow::Borrowed("deviceMessage"),
        }
    }

    /// Device the event concerns, if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            ClientEvent::ServerConnected { .. } | ClientEvent::ServerDisconnected { .. } => None,
            ClientEvent::DeviceDiscovered { device }
            | ClientEvent::DeviceRemoved { device }
            | ClientEvent::DeviceConnected { device }
            | ClientEvent::DeviceDisconnected { device }
            | ClientEvent::PropertyDefined { device, .. }
            | ClientEvent::KindDefined { device, .. }
            | ClientEvent::KindUpdated { device, .. }
            | ClientEvent::PropertyRemoved { device, .. } => Some(device),
            ClientEvent::DeviceMessage { device, .. } => device.as_deref(),
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        match self {
            ClientEvent::ServerConnected { server } | ClientEvent::ServerDisconnected { server } => {
                write!(f, " {server}")
            }
            ClientEvent::DeviceDiscovered { device }
            | ClientEvent::DeviceRemoved { device }
            | ClientEvent::DeviceConnected { device }
            | ClientEvent::DeviceDisconnected { device } => write!(f, " {device}"),
            ClientEvent::PropertyDefined { device, name }
            | ClientEvent::KindDefined { device, name, .. }
            | ClientEvent::KindUpdated { device, name, .. }
            | ClientEvent::PropertyRemoved { device, name } => write!(f, " {device}.{name}"),
            ClientEvent::DeviceMessage {
                device, message, ..
            } => write!(f, " [{}] {message}", device.as_deref().unwrap_or("server")),
        }
    }
}

/// Receiver of client events.
pub trait EventSink {
    fn emit(&mut self, event: ClientEvent);
}

/// Collects events; convenient for tests and batch processing.
impl EventSink for Vec<ClientEvent> {
    fn emit(&mut self, event: ClientEvent) {
        self.push(event);
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&ClientEvent) + Send>;

enum Subscriber {
    Callback(Callback),
    Channel(mpsc::Sender<ClientEvent>),
}

/// Observer list delivering each event synchronously, in subscription order.
///
/// Channel subscribers are dropped once their receiver hangs up.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
}

impl EventBus {
    /// Bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every subsequent event.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ClientEvent) + Send + 'static,
    {
        self.add(Subscriber::Callback(Box::new(callback)))
    }

    /// Receive every subsequent event over a channel.
    pub fn channel(&mut self) -> mpsc::Receiver<ClientEvent> {
        let (tx, rx) = mpsc::channel();
        self.add(Subscriber::Channel(tx));
        rx
    }

    /// Returns `false` if the id was not (or no longer) subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    fn add(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, subscriber));
        id
    }
}

impl EventSink for EventBus {
    fn emit(&mut self, event: ClientEvent) {
        self.subscribers
            .retain_mut(|(_, subscriber)| match subscriber {
                Subscriber::Callback(callback) => {
                    callback(&event);
                    true
                }
                Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
            });
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
