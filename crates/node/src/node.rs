//! The routing core.
//!
//! A node is one tokio task that owns its connection slots, registered
//! objects and pending requests. Everything that touches those tables
//! arrives as a [`Command`] on one queue and runs to completion before the
//! next one, so the tables need no locking:
//!
//! ```text
//!  Bus façade ──┐
//!  link readers ├──► Command queue ──► Node::handle ──► links / objects / pending
//!  timers ──────┤                          │
//!  served calls ┘                          └──► spawned work (object calls,
//!                                               manager updates, reconnects)
//! ```
//!
//! # Frame handling
//!
//! | Frame | Action |
//! |-------|--------|
//! | `req` | forward along the route, or serve from a local object |
//! | `res` | forward along the route, or resolve the pending request |
//! | `sig` | deliver to local listeners, flood to every other registered link |
//! | `hello` | only expected during the handshake, ignored afterwards |
//! | `ready` | marks a child link registered |

use crate::links::{LinkId, LinkState, Links, Slot};
use crate::pending::{PendingRequests, Reply};
use crate::reconnect::{self, Backoff};
use async_trait::async_trait;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use treebus_core::events::{publish, SignalListeners, StatusEvents};
use treebus_core::frame::{Hello, Request, Response, Signal};
use treebus_core::{
    BusConfig, BusError, BusEvent, BusPath, Connection, ConnectionEvent, ConnectionSender,
    Connector, Frame, LocalManager, Manager, ManagerService, NameError, RegisteredObject,
    RemoteManager, Requester, Route, Target, MANAGER_NAME,
};

/// State shared between a node task and its façade.
pub(crate) struct Shared {
    pub path: RwLock<BusPath>,
    pub status: StatusEvents,
    pub signals: SignalListeners,
}

impl Shared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            path: RwLock::new(BusPath::root()),
            status: StatusEvents::new(),
            signals: SignalListeners::new(),
        })
    }
}

pub(crate) enum Command {
    Call {
        target: Target,
        args: Vec<Value>,
        reply: Reply,
    },
    Register {
        object: RegisteredObject,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        name: String,
        reply: oneshot::Sender<bool>,
    },
    Objects {
        reply: oneshot::Sender<Vec<String>>,
    },
    Emit {
        signal: Signal,
    },
    Accept {
        conn: Connection,
    },
    Link {
        link: LinkId,
        event: ConnectionEvent,
    },
    Reply {
        response: Response,
    },
    Expire {
        id: u64,
    },
    Reattach {
        path: BusPath,
        conn: Connection,
    },
    Shutdown,
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl NodeHandle {
    pub(crate) fn send(&self, command: Command) -> Result<(), BusError> {
        self.commands.send(command).map_err(|_| BusError::Shutdown)
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, BusError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.map_err(|_| BusError::Shutdown)
    }

    /// Issue a request and wait for its outcome.
    pub async fn call(&self, target: Target, args: Vec<Value>) -> Result<Value, BusError> {
        self.ask(|reply| Command::Call {
            target,
            args,
            reply,
        })
        .await?
    }

    pub async fn register(&self, object: RegisteredObject) -> Result<(), BusError> {
        self.ask(|reply| Command::Register { object, reply }).await
    }

    /// Returns `false` if no object was registered under `name`.
    pub async fn unregister(&self, name: &str) -> Result<bool, BusError> {
        let name = name.to_string();
        self.ask(|reply| Command::Unregister { name, reply }).await
    }

    /// Names of the objects registered on this node, excluding `"Bus"`.
    pub async fn objects(&self) -> Result<Vec<String>, BusError> {
        self.ask(|reply| Command::Objects { reply }).await
    }

    pub fn emit(&self, signal: Signal) -> Result<(), BusError> {
        self.send(Command::Emit { signal })
    }

    /// Bind an inbound child connection.
    pub fn accept(&self, conn: Connection) -> Result<(), BusError> {
        self.send(Command::Accept { conn })
    }

    pub fn shutdown(&self) {
        let _ = self.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[async_trait]
impl Requester for NodeHandle {
    async fn call(&self, target: Target, args: Vec<Value>) -> Result<Value, BusError> {
        NodeHandle::call(self, target, args).await
    }
}

/// What [`start`] hands back to the façade.
pub(crate) struct Started {
    pub handle: NodeHandle,
    pub manager: Arc<dyn Manager>,
}

/// Start a node at `path`.
///
/// The root gets the authoritative name table and serves it as `"Bus"`;
/// any other node gets a proxy that calls the root through this node.
/// `parent` is the already handshaken link for non-root nodes, and
/// `connector` is used to re-establish it when it drops.
pub(crate) fn start(
    path: BusPath,
    parent: Option<Connection>,
    connector: Option<Arc<dyn Connector>>,
    config: BusConfig,
    shared: Arc<Shared>,
) -> Result<Started, NameError> {
    let (commands, queue) = mpsc::unbounded_channel();
    let handle = NodeHandle { commands };

    let (manager, service): (Arc<dyn Manager>, Option<RegisteredObject>) = if path.is_root() {
        let local = Arc::new(LocalManager::for_root(&path)?);
        let service = RegisteredObject::new(
            MANAGER_NAME,
            Arc::new(ManagerService::new(Arc::clone(&local))),
            None,
        );
        (local, Some(service))
    } else {
        (Arc::new(RemoteManager::new(Arc::new(handle.clone()))), None)
    };

    let mut node = Node {
        path: path.clone(),
        shared,
        links: Links::new(),
        objects: HashMap::new(),
        pending: PendingRequests::new(),
        manager: Arc::clone(&manager),
        connector,
        config,
        handle: handle.clone(),
    };
    if let Some(service) = service {
        node.objects.insert(service.name.clone(), service);
    }
    node.init(path, parent);
    tokio::spawn(node.run(queue));

    Ok(Started { handle, manager })
}

struct Node {
    path: BusPath,
    shared: Arc<Shared>,
    links: Links,
    objects: HashMap<String, RegisteredObject>,
    pending: PendingRequests,
    manager: Arc<dyn Manager>,
    connector: Option<Arc<dyn Connector>>,
    config: BusConfig,
    handle: NodeHandle,
}

impl Node {
    /// Take on `path` and, for non-root nodes, bind the parent link.
    fn init(&mut self, path: BusPath, parent: Option<Connection>) {
        self.path = path.clone();
        *self.shared.path.write() = path;
        if let Some(conn) = parent {
            let (sender, events) = conn.split();
            let link = self.links.set_parent(sender.clone());
            self.watch(link, events);
            sender.send(Frame::Ready);
        }
    }

    async fn run(mut self, mut queue: mpsc::UnboundedReceiver<Command>) {
        info!(path = %self.path, "node started");
        while let Some(command) = queue.recv().await {
            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
        }
        info!(path = %self.path, pending = self.pending.len(), "node stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Call {
                target,
                args,
                reply,
            } => self.request(target, args, reply),
            Command::Register { object, reply } => {
                debug!(path = %self.path, name = %object.name, "object registered");
                self.objects.insert(object.name.clone(), object);
                let _ = reply.send(());
            }
            Command::Unregister { name, reply } => {
                let removed = self.objects.remove(&name).is_some();
                let _ = reply.send(removed);
            }
            Command::Objects { reply } => {
                let mut names: Vec<String> = self
                    .objects
                    .keys()
                    .filter(|name| *name != MANAGER_NAME)
                    .cloned()
                    .collect();
                names.sort();
                let _ = reply.send(names);
            }
            Command::Emit { signal } => self.signal(signal, None),
            Command::Accept { conn } => self.accept(conn),
            Command::Link { link, event } => self.link_event(link, event),
            Command::Reply { response } => self.response(response),
            Command::Expire { id } => {
                if let Some(request) = self.pending.expire(id) {
                    warn!(id, path = %request.path, member = %request.member, "request timed out");
                }
            }
            Command::Reattach { path, conn } => self.reattach(path, conn),
            Command::Shutdown => {}
        }
    }

    /// Sender for the next hop towards `target`, or `None` when local.
    fn next_hop(&self, target: &str) -> Result<Option<ConnectionSender>, BusError> {
        match self.path.route(target)? {
            Route::Local => Ok(None),
            route => self
                .links
                .for_route(route)
                .map(|link| Some(link.sender.clone()))
                .ok_or_else(|| BusError::NoRoute(target.to_string())),
        }
    }

    fn forward(&self, sender: &ConnectionSender, frame: Frame) {
        let kind = frame.kind();
        if sender.send(frame) {
            counter!("treebus_frames_forwarded_total").increment(1);
        } else {
            debug!(path = %self.path, kind, "link gone, frame dropped");
        }
    }

    /// Start an outbound request on behalf of a local caller.
    fn request(&mut self, target: Target, args: Vec<Value>, reply: Reply) {
        let id = self.pending.next_id();
        let request = Request {
            id,
            path: target.object_path(),
            intf: target.interface,
            member: target.member,
            args,
            sender: self.path.to_string(),
        };

        // The caller is right here, so a first hop that cannot be resolved
        // fails the call instead of leaving it to time out.
        if let Err(err) = self.next_hop(&request.path) {
            let _ = reply.send(Err(err));
            return;
        }

        let timer = self.config.request_timeout().map(|timeout| {
            let commands = self.handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                let _ = commands.send(Command::Expire { id });
            })
            .abort_handle()
        });
        let purged = self.pending.insert(request.clone(), reply, timer);
        if purged > 0 {
            debug!(purged, "dropped abandoned requests");
        }
        gauge!("treebus_pending_requests").set(self.pending.len() as f64);

        self.dispatch(request);
    }

    /// Route a request one hop, or serve it here.
    fn dispatch(&mut self, request: Request) {
        match self.next_hop(&request.path) {
            Ok(Some(sender)) => self.forward(&sender, Frame::Request(request)),
            Ok(None) => self.serve(request),
            Err(err) => warn!(
                id = request.id,
                path = %request.path,
                sender = %request.sender,
                error = %err,
                "dropping undeliverable request"
            ),
        }
    }

    fn serve(&mut self, request: Request) {
        let Request {
            id,
            intf,
            member,
            mut args,
            sender,
            ..
        } = request;

        let object = match self.objects.get(&intf) {
            Some(object) => object,
            None => {
                let err = BusError::InterfaceNotFound(intf);
                return self.response(Response::new(id, sender, Err(err.to_string())));
            }
        };
        if !object.has_member(&member) {
            let err = BusError::MemberNotFound(format!("{intf}.{member}"));
            return self.response(Response::new(id, sender, Err(err.to_string())));
        }
        if object.append_sender {
            args.push(Value::String(sender.clone()));
        }

        counter!("treebus_requests_served_total").increment(1);
        let implementation = Arc::clone(&object.implementation);
        let commands = self.handle.clone();
        tokio::spawn(async move {
            let outcome = implementation.call(&member, args).await;
            let _ = commands.send(Command::Reply {
                response: Response::new(id, sender, outcome),
            });
        });
    }

    fn response(&mut self, response: Response) {
        match self.next_hop(&response.path) {
            Ok(Some(sender)) => self.forward(&sender, Frame::Response(response)),
            Ok(None) => {
                let id = response.id;
                let outcome = response.into_outcome().map_err(BusError::Remote);
                if !self.pending.complete(id, outcome) {
                    debug!(id, "response for unknown request dropped");
                }
                gauge!("treebus_pending_requests").set(self.pending.len() as f64);
            }
            Err(err) => warn!(
                id = response.id,
                path = %response.path,
                error = %err,
                "dropping undeliverable response"
            ),
        }
    }

    /// Deliver locally, then flood to every registered link except `origin`.
    fn signal(&mut self, signal: Signal, origin: Option<Slot>) {
        let delivered = self.shared.signals.emit(&signal.name, &signal.args);
        if delivered > 0 {
            counter!("treebus_signals_delivered_total").increment(delivered as u64);
        }
        for (slot, link) in self.links.registered() {
            if Some(slot) != origin {
                self.forward(&link.sender, Frame::Signal(signal.clone()));
            }
        }
    }

    fn accept(&mut self, conn: Connection) {
        let (sender, events) = conn.split();
        let (link, slot, path) = self.links.add_child(sender.clone(), &self.path);
        self.watch(link, events);
        sender.send(Frame::Hello(Hello { path: path.clone() }));
        info!(path = %self.path, slot, child = %path, "child connected");
        gauge!("treebus_child_links").set(self.links.child_count() as f64);
        publish(&self.shared.status, BusEvent::Child { path });
    }

    /// Feed a link's transport events into the command queue.
    fn watch(&self, link: LinkId, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
        let commands = self.handle.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let closed = event == ConnectionEvent::Closed;
                if commands.send(Command::Link { link, event }).is_err() || closed {
                    return;
                }
            }
            let _ = commands.send(Command::Link {
                link,
                event: ConnectionEvent::Closed,
            });
        });
    }

    fn link_event(&mut self, link: LinkId, event: ConnectionEvent) {
        let Some(slot) = self.links.slot_of(link) else {
            debug!(link, "event from a dropped link ignored");
            return;
        };
        match event {
            ConnectionEvent::Open => debug!(path = %self.path, ?slot, "link open"),
            ConnectionEvent::Frame(frame) => self.frame(slot, frame),
            ConnectionEvent::Error(message) => {
                warn!(path = %self.path, ?slot, error = %message, "transport error");
                publish(&self.shared.status, BusEvent::Error { message });
                self.link_lost(slot);
            }
            ConnectionEvent::Closed => self.link_lost(slot),
        }
    }

    fn frame(&mut self, slot: Slot, frame: Frame) {
        match frame {
            Frame::Request(request) => self.dispatch(request),
            Frame::Response(response) => self.response(response),
            Frame::Signal(signal) => self.signal(signal, Some(slot)),
            Frame::Ready => match (slot, self.links.get_mut(slot)) {
                (Slot::Child(_), Some(link)) => {
                    link.state = LinkState::Registered;
                    debug!(path = %self.path, ?slot, "child registered");
                }
                _ => warn!(path = %self.path, ?slot, "unexpected ready"),
            },
            Frame::Hello(hello) => {
                warn!(path = %self.path, ?slot, offered = %hello.path, "unexpected hello ignored")
            }
        }
    }

    fn link_lost(&mut self, slot: Slot) {
        let Some(link) = self.links.remove(slot) else {
            return;
        };
        match slot {
            Slot::Parent => {
                warn!(path = %self.path, "parent link lost");
                publish(&self.shared.status, BusEvent::Disconnect);
                match self.connector.clone() {
                    Some(connector) => {
                        let backoff =
                            Backoff::new(self.config.initial_backoff(), self.config.max_backoff());
                        tokio::spawn(reconnect::reconnect(
                            connector,
                            self.handle.clone(),
                            backoff,
                            self.config.handshake_timeout(),
                        ));
                    }
                    None => warn!(path = %self.path, "no connector, staying detached"),
                }
            }
            Slot::Child(_) => {
                gauge!("treebus_child_links").set(self.links.child_count() as f64);
                let Some(child) = link.path else {
                    return;
                };
                info!(path = %self.path, child = %child, "child disconnected");
                let manager = Arc::clone(&self.manager);
                tokio::spawn(async move {
                    match manager.remove_subtree(child.as_str()).await {
                        Ok(removed) => debug!(child = %child, removed, "child subtree unregistered"),
                        Err(err) => warn!(child = %child, error = %err, "failed to unregister child"),
                    }
                });
            }
        }
    }

    /// Resume under a (possibly new) path after the parent link came back.
    ///
    /// The parent dropped this whole subtree from the name table when the
    /// link closed, so every child is let go as well. Each one reconnects
    /// and re-publishes its own names, even when the path is unchanged.
    fn reattach(&mut self, path: BusPath, conn: Connection) {
        let previous = self.path.clone();
        self.init(path.clone(), Some(conn));

        let dropped = self.links.clear_children();
        if !dropped.is_empty() {
            info!(from = %previous, to = %path, children = dropped.len(), "dropping children to re-announce subtree");
            gauge!("treebus_child_links").set(0.0);
        }

        let names: Vec<String> = self
            .objects
            .keys()
            .filter(|name| *name != MANAGER_NAME)
            .cloned()
            .collect();
        let manager = Arc::clone(&self.manager);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            republish(manager.as_ref(), &path, names).await;
            info!(path = %path, "reconnected");
            publish(&shared.status, BusEvent::Reconnect { path });
        });
    }
}

/// Re-register this node and its names under `path`.
///
/// Entries that already point at `path` (left over from before the drop)
/// count as registered.
async fn republish(manager: &dyn Manager, path: &BusPath, names: Vec<String>) {
    match manager.add_node(path.as_str()).await {
        Ok(()) | Err(NameError::DuplicateNode(_)) => {}
        Err(err) => warn!(path = %path, error = %err, "failed to re-add node"),
    }
    for name in names {
        let err = match manager.add_name(&name, path.as_str()).await {
            Ok(()) => continue,
            Err(err) => err,
        };
        if matches!(err, NameError::DuplicateName(_)) {
            let owner = manager.resolve_name(&name).await;
            if owner.as_deref() == Ok(path.as_str()) {
                continue;
            }
        }
        warn!(name = %name, path = %path, error = %err, "failed to re-publish name");
    }
}
