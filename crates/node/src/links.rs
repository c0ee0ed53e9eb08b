//! Connection slots of one node.
//!
//! The parent link is held on its own; children occupy numbered slots whose
//! index is also the child's last path segment. A freed slot is reused by
//! the next child that connects.

use treebus_core::path::{BusPath, Route};
use treebus_core::ConnectionSender;

/// Identity of one bound connection. Events carrying an id that is no
/// longer in the table come from a replaced or dropped link.
pub(crate) type LinkId = u64;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Slot {
    Parent,
    Child(usize),
}

/// Handshake progress of a link.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum LinkState {
    /// Bound and sent its path, peer has not confirmed yet.
    Bound,
    /// Peer confirmed; signals are flooded to it.
    Registered,
}

#[derive(Debug)]
pub(crate) struct Link {
    pub id: LinkId,
    pub sender: ConnectionSender,
    /// Path assigned to the peer; `None` for the parent link.
    pub path: Option<BusPath>,
    pub state: LinkState,
}

#[derive(Debug, Default)]
pub(crate) struct Links {
    parent: Option<Link>,
    children: Vec<Option<Link>>,
    next_id: LinkId,
}

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> LinkId {
        self.next_id += 1;
        self.next_id
    }

    /// Bind the parent link, replacing any previous one.
    pub fn set_parent(&mut self, sender: ConnectionSender) -> LinkId {
        let id = self.allocate();
        self.parent = Some(Link {
            id,
            sender,
            path: None,
            state: LinkState::Registered,
        });
        id
    }

    /// Bind a child in the lowest free slot. Returns its id, slot and path.
    pub fn add_child(&mut self, sender: ConnectionSender, own: &BusPath) -> (LinkId, usize, BusPath) {
        let id = self.allocate();
        let slot = self
            .children
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.children.len());
        let path = own.child(slot);
        let link = Link {
            id,
            sender,
            path: Some(path.clone()),
            state: LinkState::Bound,
        };
        if slot == self.children.len() {
            self.children.push(Some(link));
        } else {
            self.children[slot] = Some(link);
        }
        (id, slot, path)
    }

    pub fn slot_of(&self, id: LinkId) -> Option<Slot> {
        if self.parent.as_ref().is_some_and(|link| link.id == id) {
            return Some(Slot::Parent);
        }
        self.children
            .iter()
            .position(|link| link.as_ref().is_some_and(|link| link.id == id))
            .map(Slot::Child)
    }

    pub fn get(&self, slot: Slot) -> Option<&Link> {
        match slot {
            Slot::Parent => self.parent.as_ref(),
            Slot::Child(index) => self.children.get(index).and_then(Option::as_ref),
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Link> {
        match slot {
            Slot::Parent => self.parent.as_mut(),
            Slot::Child(index) => self.children.get_mut(index).and_then(Option::as_mut),
        }
    }

    /// Link for a non-local route.
    pub fn for_route(&self, route: Route) -> Option<&Link> {
        match route {
            Route::Local => None,
            Route::Parent => self.get(Slot::Parent),
            Route::Child(index) => self.get(Slot::Child(index)),
        }
    }

    pub fn remove(&mut self, slot: Slot) -> Option<Link> {
        let removed = match slot {
            Slot::Parent => self.parent.take(),
            Slot::Child(index) => self.children.get_mut(index).and_then(Option::take),
        };
        while matches!(self.children.last(), Some(None)) {
            self.children.pop();
        }
        removed
    }

    /// Drop every child link.
    pub fn clear_children(&mut self) -> Vec<Link> {
        self.children.drain(..).flatten().collect()
    }

    /// Registered links, parent first, then children in slot order.
    pub fn registered(&self) -> impl Iterator<Item = (Slot, &Link)> {
        let parent = self.parent.iter().map(|link| (Slot::Parent, link));
        let children = self
            .children
            .iter()
            .enumerate()
            .filter_map(|(index, link)| link.as_ref().map(|link| (Slot::Child(index), link)));
        parent
            .chain(children)
            .filter(|(_, link)| link.state == LinkState::Registered)
    }

    pub fn child_count(&self) -> usize {
        self.children.iter().flatten().count()
    }
}
