//! The connection capability surface the bus depends on.
//!
//! A [`Connection`] is one framed, ordered, bidirectional channel to a single
//! peer. It knows nothing about paths or routing. Concrete transports (TCP,
//! in-memory) build one from a pair of channels: frames queued on the
//! outbound side are delivered to the peer, and everything the transport
//! observes arrives as a [`ConnectionEvent`].

use crate::error::TransportError;
use crate::frame::Frame;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle and data events reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Open,
    Frame(Frame),
    Closed,
    Error(String),
}

/// A transport link to one peer.
#[derive(Debug)]
pub struct Connection {
    sender: ConnectionSender,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

/// Cloneable outbound half of a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    outbound: mpsc::UnboundedSender<Frame>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self {
            sender: ConnectionSender { outbound },
            events,
        }
    }

    /// Queue a frame for the peer. See [`ConnectionSender::send`].
    pub fn send(&self, frame: Frame) -> bool {
        self.sender.send(frame)
    }

    /// Wait for the next transport event. `None` once the transport is gone.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.events.recv().await
    }

    pub fn split(self) -> (ConnectionSender, mpsc::UnboundedReceiver<ConnectionEvent>) {
        (self.sender, self.events)
    }
}

impl ConnectionSender {
    /// Queue a frame for the peer.
    ///
    /// Never fails loudly: if the transport has gone away this returns
    /// `false` and the failure shows up as a `Closed`/`Error` event.
    pub fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// Establishes outbound connections to a (logical) parent.
///
/// Called once at start-up and again on every reconnection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection, TransportError>;
}

/// Accepts inbound connections from children.
#[async_trait]
pub trait Listener: Send + 'static {
    async fn accept(&mut self) -> Result<Connection, TransportError>;
}
