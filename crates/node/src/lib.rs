//! Routing engine and public façade for the tree-structured message bus.
//!
//! A process joins the bus with [`Bus::root`] or [`Bus::connect`]. Each
//! call, signal and name update travels hop by hop between parent and
//! child links; every node decides the next hop from its own path alone.
//!
//! # Example
//!
//! ```ignore
//! use treebus_node::Bus;
//! use treebus_transport::memory;
//!
//! let (connector, listener) = memory::listener();
//! let root = Bus::root(BusConfig::default())?;
//! root.serve(listener);
//! let child = Bus::connect(Arc::new(connector), BusConfig::default()).await?;
//! assert_eq!(child.path().as_str(), "/0/");
//! ```

pub mod bus;
mod links;
pub mod node;
mod pending;
pub mod reconnect;

pub use bus::{Bus, BusBuilder, ObjectHandle};
pub use node::NodeHandle;
pub use reconnect::{attach, handshake, Backoff};
