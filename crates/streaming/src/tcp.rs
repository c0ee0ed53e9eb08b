//! TCP transport: one newline-delimited JSON frame per line.
//!
//! Each stream gets a reader task and a writer task. The writer drains the
//! outbound queue; when every sender is dropped it shuts the write half
//! down, which the peer sees as end-of-stream. The reader reports frames,
//! undecodable lines (as `Error`, without closing) and end-of-stream.

use crate::codec;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use treebus_core::{Connection, ConnectionEvent, Connector, Frame, Listener, TransportError};

/// Wrap an established stream as a [`Connection`].
pub fn spawn(stream: TcpStream) -> Connection {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".into());
    let _ = stream.set_nodelay(true);
    let (read_half, mut write_half) = stream.into_split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let (events, events_rx) = mpsc::unbounded_channel();

    let _ = events.send(ConnectionEvent::Open);

    let writer_events = events.clone();
    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let line = match codec::encode_line(&frame) {
                Ok(line) => line,
                Err(err) => {
                    let _ = writer_events.send(ConnectionEvent::Error(err.to_string()));
                    continue;
                }
            };
            if let Err(err) = write_half.write_all(&line).await {
                warn!(peer = %writer_peer, error = %err, "tcp write failed");
                let _ = writer_events.send(ConnectionEvent::Error(err.to_string()));
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match codec::decode_line(line.as_bytes()) {
                    Ok(frame) => {
                        if events.send(ConnectionEvent::Frame(frame)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(peer = %peer, error = %err, "dropping undecodable frame");
                        let _ = events.send(ConnectionEvent::Error(err.to_string()));
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    let _ = events.send(ConnectionEvent::Error(err.to_string()));
                    break;
                }
            }
        }
        debug!(peer = %peer, "tcp connection closed");
        let _ = events.send(ConnectionEvent::Closed);
    });

    Connection::new(outbound, events_rx)
}

/// Dials the parent at a fixed address.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| TransportError::Refused(format!("{}: {err}", self.addr)))?;
        debug!(addr = %self.addr, "connected to parent");
        Ok(spawn(stream))
    }
}

/// Accepts child connections on a bound socket.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl Listener for TcpAcceptor {
    async fn accept(&mut self) -> Result<Connection, TransportError> {
        let (stream, addr) = self.listener.accept().await?;
        debug!(%addr, "accepted child connection");
        Ok(spawn(stream))
    }
}
