//! Bus paths and the per-hop routing decision.
//!
//! A [`BusPath`] encodes a node's position in the tree. The root is `/`; a
//! child's path is its parent's path plus the child's slot index and a
//! trailing separator (`/0/`, `/0/3/`). An object lives at its node path
//! followed by its interface name (`/0/Echo`).
//!
//! # Routing
//!
//! Every hop makes the same three-way decision from nothing but its own path:
//!
//! ```text
//!   target directory == own path        -> Local
//!   target directory below own path     -> Child(next segment)
//!   anything else                       -> Parent
//! ```
//!
//! No node needs a topology map; the decision is deterministic given the
//! node's path.

use crate::error::PathError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path segment separator.
pub const SEPARATOR: char = '/';

/// Position of a node in the bus tree.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BusPath(String);

/// Next hop for a target path, as seen from one node.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Route {
    /// The target is served by this node.
    Local,
    /// The target is below this node, through the given child slot.
    Child(usize),
    /// The target is outside this node's subtree.
    Parent,
}

impl BusPath {
    /// The root path, `/`.
    pub fn root() -> Self {
        BusPath(SEPARATOR.to_string())
    }

    /// Parse a node path. It must start and end with the separator.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.starts_with(SEPARATOR) && raw.ends_with(SEPARATOR) && !raw.contains("//") {
            Ok(BusPath(raw.to_string()))
        } else {
            Err(PathError::Malformed(raw.to_string()))
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path assigned to the child connected at `slot`.
    pub fn child(&self, slot: usize) -> BusPath {
        BusPath(format!("{}{}{}", self.0, slot, SEPARATOR))
    }

    /// Address of an object registered on this node.
    pub fn object(&self, interface: &str) -> String {
        format!("{}{}", self.0, interface)
    }

    /// Number of segments below the root.
    pub fn depth(&self) -> usize {
        self.0.matches(SEPARATOR).count() - 1
    }

    /// Decide the next hop for `target`.
    ///
    /// `target` is split at its last separator; the part up to and including
    /// the separator is the directory that owns the target.
    ///
    /// # Errors
    ///
    /// [`PathError::Malformed`] if `target` has no separator, or if it lies
    /// below this node but the next segment is not a slot number.
    pub fn route(&self, target: &str) -> Result<Route, PathError> {
        let split = target
            .rfind(SEPARATOR)
            .ok_or_else(|| PathError::Malformed(target.to_string()))?;
        let directory = &target[..=split];

        if directory == self.0 {
            return Ok(Route::Local);
        }

        if let Some(rest) = directory.strip_prefix(self.0.as_str()) {
            let segment = rest.split(SEPARATOR).next().unwrap_or_default();
            return segment
                .parse::<usize>()
                .map(Route::Child)
                .map_err(|_| PathError::Malformed(target.to_string()));
        }

        Ok(Route::Parent)
    }
}

impl fmt::Display for BusPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BusPath {
    type Error = PathError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        BusPath::parse(&raw)
    }
}

impl From<BusPath> for String {
    fn from(path: BusPath) -> Self {
        path.0
    }
}

/// A parsed call target: `[<path>]<interface>.<member>`.
///
/// Without a path the interface is a published name that must be resolved
/// through the Manager before the call can be routed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Address {
    pub path: Option<BusPath>,
    pub interface: String,
    pub member: String,
}

impl Address {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let invalid = || PathError::InvalidAddress(raw.to_string());

        let (object, member) = raw.rsplit_once('.').ok_or_else(invalid)?;
        let (path, interface) = match object.rfind(SEPARATOR) {
            Some(split) => (
                Some(BusPath::parse(&object[..=split]).map_err(|_| invalid())?),
                &object[split + 1..],
            ),
            None => (None, object),
        };

        if interface.is_empty() || member.is_empty() {
            return Err(invalid());
        }

        Ok(Address {
            path,
            interface: interface.to_string(),
            member: member.to_string(),
        })
    }
}

/// A fully addressed call target: node path, interface and member.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Target {
    pub path: BusPath,
    pub interface: String,
    pub member: String,
}

impl Target {
    pub fn new(path: BusPath, interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            path,
            interface: interface.into(),
            member: member.into(),
        }
    }

    /// Object address carried in the request frame.
    pub fn object_path(&self) -> String {
        self.path.object(&self.interface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str) -> BusPath {
        BusPath::parse(raw).unwrap()
    }

    #[test]
    fn test_child_paths() {
        let root = BusPath::root();
        assert!(root.is_root());
        assert_eq!(root.child(0).as_str(), "/0/");
        assert_eq!(root.child(1).child(4).as_str(), "/1/4/");
        assert_eq!(root.child(1).child(4).depth(), 2);
        assert_eq!(root.depth(), 0);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert!(BusPath::parse("0/").is_err());
        assert!(BusPath::parse("/0").is_err());
        assert!(BusPath::parse("//").is_err());
        assert!(BusPath::parse("").is_err());
    }

    #[test]
    fn test_route_local() {
        assert_eq!(BusPath::root().route("/Echo"), Ok(Route::Local));
        assert_eq!(path("/0/").route("/0/Echo"), Ok(Route::Local));
        // A response addressed to the node itself.
        assert_eq!(path("/0/").route("/0/"), Ok(Route::Local));
    }

    #[test]
    fn test_route_down() {
        assert_eq!(BusPath::root().route("/3/Echo"), Ok(Route::Child(3)));
        assert_eq!(BusPath::root().route("/3/1/Echo"), Ok(Route::Child(3)));
        assert_eq!(path("/3/").route("/3/1/"), Ok(Route::Child(1)));
    }

    #[test]
    fn test_route_up() {
        assert_eq!(path("/0/").route("/Bus"), Ok(Route::Parent));
        assert_eq!(path("/0/").route("/1/Echo"), Ok(Route::Parent));
        // "/01/" is a sibling, not a descendant of "/0/".
        assert_eq!(path("/0/").route("/01/Echo"), Ok(Route::Parent));
    }

    #[test]
    fn test_route_malformed() {
        assert!(BusPath::root().route("Echo").is_err());
        assert!(BusPath::root().route("/x/Echo").is_err());
    }

    #[test]
    fn test_address_with_name() {
        let addr = Address::parse("Echo.call").unwrap();
        assert_eq!(addr.path, None);
        assert_eq!(addr.interface, "Echo");
        assert_eq!(addr.member, "call");
    }

    #[test]
    fn test_address_with_path() {
        let addr = Address::parse("/0/2/Bus.addName").unwrap();
        assert_eq!(addr.path, Some(path("/0/2/")));
        assert_eq!(addr.interface, "Bus");
        assert_eq!(addr.member, "addName");

        let dotted = Address::parse("org.demo.Clock.now").unwrap();
        assert_eq!(dotted.interface, "org.demo.Clock");
        assert_eq!(dotted.member, "now");
    }

    #[test]
    fn test_address_rejects_garbage() {
        assert!(Address::parse("Echo").is_err());
        assert!(Address::parse(".call").is_err());
        assert!(Address::parse("Echo.").is_err());
        assert!(Address::parse("/0/.call").is_err());
        assert!(Address::parse("0/Echo.call").is_err());
    }
}
