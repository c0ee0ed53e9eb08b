//! Concrete connections for the bus.
//!
//! This crate provides the transports that turn bus frames into bytes:
//! - Newline-delimited JSON codec
//! - In-memory connection pairs and listeners (tests, single-process trees)
//! - TCP connections, connector and listener

pub mod codec;
pub mod memory;
pub mod tcp;

pub use memory::{MemoryConnector, MemoryListener};
pub use tcp::{TcpAcceptor, TcpConnector};
