//! Core library for the tree-structured message bus.
//!
//! This crate provides the pieces every node shares:
//! - Bus paths and the local / down / up routing decision
//! - Wire frames
//! - The connection capability surface transports implement
//! - Registered objects and their interfaces
//! - Name resolution (authoritative table and proxy)
//! - Status and signal subscription registries

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod frame;
pub mod manager;
pub mod object;
pub mod path;

pub use config::BusConfig;
pub use connection::{Connection, ConnectionEvent, ConnectionSender, Connector, Listener};
pub use error::{BusError, ConfigError, FrameError, NameError, PathError, Result, TransportError};
pub use events::{BusEvent, EventKind, SubscriptionId};
pub use frame::{Frame, Request, Response, Signal};
pub use manager::{LocalManager, Manager, ManagerService, RemoteManager, Requester, MANAGER_NAME};
pub use object::{Descriptor, Interface, Methods, RegisteredObject};
pub use path::{Address, BusPath, Route, Target};
