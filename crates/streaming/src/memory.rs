//! In-process connections.
//!
//! Frames still go through the JSON codec on their way across, so an
//! in-memory tree exercises the same wire format as a TCP one.
//!
//! ```text
//!  side A                                   side B
//!  send() ─► outbound ─► pump ─► codec ─► events ─► next_event()
//!  next_event() ◄─ events ◄─ codec ◄─ pump ◄─ outbound ◄─ send()
//! ```
//!
//! When one side drops its sender, the pump reports `Closed` to both sides.

use crate::codec;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use treebus_core::{Connection, ConnectionEvent, Connector, Frame, Listener, TransportError};

/// Create two connected ends. Must be called inside a tokio runtime.
pub fn pair() -> (Connection, Connection) {
    let (a_out, a_out_rx) = mpsc::unbounded_channel();
    let (b_out, b_out_rx) = mpsc::unbounded_channel();
    let (a_events, a_events_rx) = mpsc::unbounded_channel();
    let (b_events, b_events_rx) = mpsc::unbounded_channel();

    let _ = a_events.send(ConnectionEvent::Open);
    let _ = b_events.send(ConnectionEvent::Open);

    tokio::spawn(pump(a_out_rx, b_events.clone(), a_events.clone()));
    tokio::spawn(pump(b_out_rx, a_events, b_events));

    (
        Connection::new(a_out, a_events_rx),
        Connection::new(b_out, b_events_rx),
    )
}

async fn pump(
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    peer: mpsc::UnboundedSender<ConnectionEvent>,
    local: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(frame) = outbound.recv().await {
        let event = codec::encode_line(&frame)
            .and_then(|line| codec::decode_line(&line))
            .map(ConnectionEvent::Frame);
        match event {
            Ok(event) => {
                if peer.send(event).is_err() {
                    break;
                }
            }
            Err(err) => {
                let _ = local.send(ConnectionEvent::Error(err.to_string()));
            }
        }
    }
    debug!("memory connection closed");
    let _ = peer.send(ConnectionEvent::Closed);
    let _ = local.send(ConnectionEvent::Closed);
}

/// Create a connector/listener pair; every `connect` yields one `accept`.
pub fn listener() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryConnector { tx }, MemoryListener { rx })
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<Connection>,
}

#[derive(Debug)]
pub struct MemoryListener {
    rx: mpsc::UnboundedReceiver<Connection>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let (local, remote) = pair();
        self.tx
            .send(remote)
            .map_err(|_| TransportError::Refused("memory listener dropped".into()))?;
        Ok(local)
    }
}

#[async_trait]
impl Listener for MemoryListener {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }
}
