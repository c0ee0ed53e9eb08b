//! Name resolution.
//!
//! A Manager maps published names to the bus path that owns them. There is
//! exactly one per process, chosen when the node starts:
//!
//! - **LocalManager**: the authoritative table, held by the root node and
//!   published there under the well-known name `"Bus"`.
//! - **RemoteManager**: every other node; each operation is forwarded as one
//!   bus request to the root's `"Bus"` object.
//!
//! All mutation is therefore serialized through the root. Names change
//! rarely compared with call traffic, which never touches the Manager.

pub mod local;
pub mod remote;
pub mod service;

pub use local::LocalManager;
pub use remote::{RemoteManager, Requester};
pub use service::ManagerService;

use crate::error::NameError;
use crate::path::SEPARATOR;
use async_trait::async_trait;

/// Well-known name the authoritative manager is published under.
pub const MANAGER_NAME: &str = "Bus";

/// Name-resolution operations.
///
/// Failures are returned, never panicked; a proxied call that cannot reach
/// the root fails with [`NameError::Unavailable`].
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// Create an empty name list for `path`.
    async fn add_node(&self, path: &str) -> Result<(), NameError>;

    /// Remove every name owned directly by `path`, then the node entry.
    ///
    /// Names are removed one at a time; a failure part-way leaves the
    /// earlier removals in place. Descendants of `path` are not touched,
    /// see [`Manager::remove_subtree`].
    async fn remove_node(&self, path: &str) -> Result<(), NameError>;

    /// [`Manager::remove_node`] for `path` and every node below it, deepest
    /// first. Returns the number of node entries removed.
    async fn remove_subtree(&self, path: &str) -> Result<usize, NameError>;

    /// Bind `name` to `owner`.
    async fn add_name(&self, name: &str, owner: &str) -> Result<(), NameError>;

    async fn resolve_name(&self, name: &str) -> Result<String, NameError>;

    async fn remove_name(&self, name: &str) -> Result<(), NameError>;

    /// True for the root's table, false for proxies.
    fn is_authoritative(&self) -> bool;
}

/// True if node `candidate` is `prefix` itself or lies below it.
pub(crate) fn in_subtree(prefix: &str, candidate: &str) -> bool {
    candidate == prefix || (prefix.ends_with(SEPARATOR) && candidate.starts_with(prefix))
}
