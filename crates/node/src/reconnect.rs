//! Parent-link handshake and reconnection.
//!
//! A child learns its path from the parent's `hello`. When the parent link
//! drops, the node retries forever: wait, connect, handshake; on failure
//! the delay doubles up to a ceiling.

use crate::node::{Command, NodeHandle};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use treebus_core::{BusPath, Connection, ConnectionEvent, Connector, Frame, TransportError};

/// Doubling delay with a ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            max: max.max(initial),
        }
    }

    /// The delay to wait now; the following one is doubled.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }
}

/// Wait for the parent's `hello` on a fresh connection.
pub async fn handshake(conn: &mut Connection, timeout: Duration) -> Result<BusPath, TransportError> {
    let wait = async {
        while let Some(event) = conn.next_event().await {
            match event {
                ConnectionEvent::Open => continue,
                ConnectionEvent::Frame(Frame::Hello(hello)) => return Ok(hello.path),
                ConnectionEvent::Frame(other) => {
                    return Err(TransportError::Handshake(format!(
                        "expected hello, got {}",
                        other.kind()
                    )))
                }
                ConnectionEvent::Error(message) => return Err(TransportError::Handshake(message)),
                ConnectionEvent::Closed => break,
            }
        }
        Err(TransportError::Closed)
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| TransportError::Handshake("timed out waiting for hello".into()))?
}

/// Connect and complete the handshake in one step.
pub async fn attach(
    connector: &dyn Connector,
    timeout: Duration,
) -> Result<(BusPath, Connection), TransportError> {
    let mut conn = connector.connect().await?;
    let path = handshake(&mut conn, timeout).await?;
    Ok((path, conn))
}

/// Retry until the parent is back, then hand the link to the node.
///
/// Stops early if the node shuts down in the meantime.
pub(crate) async fn reconnect(
    connector: Arc<dyn Connector>,
    handle: NodeHandle,
    mut backoff: Backoff,
    handshake_timeout: Duration,
) {
    let mut attempt: u32 = 0;
    loop {
        tokio::time::sleep(backoff.next_delay()).await;
        if handle.is_closed() {
            return;
        }
        attempt += 1;
        counter!("treebus_reconnect_attempts_total").increment(1);

        match attach(connector.as_ref(), handshake_timeout).await {
            Ok((path, conn)) => {
                info!(attempt, path = %path, "parent link re-established");
                let _ = handle.send(Command::Reattach { path, conn });
                return;
            }
            Err(err) => warn!(attempt, error = %err, "reconnect attempt failed"),
        }
    }
}
