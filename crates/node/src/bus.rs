//! Public entry point.
//!
//! A [`Bus`] is a cheap, cloneable handle to the node this process runs.
//! It is created once, either as the tree root or by connecting to a
//! parent, and passed to whatever needs to publish objects, make calls or
//! listen for signals.
//!
//! ```ignore
//! let root = Bus::root(BusConfig::default())?;
//! let echo = Methods::new().sync_method("call", |args| Ok(args[0].clone()));
//! root.register_object("Echo", Arc::new(echo), None).await?;
//!
//! let child = Bus::connect(connector, BusConfig::default()).await?;
//! assert_eq!(child.request("Echo.call", vec![json!("hi")]).await?, json!("hi"));
//! ```

use crate::node::{self, NodeHandle, Shared};
use crate::reconnect;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use treebus_core::events::publish;
use treebus_core::frame::Signal;
use treebus_core::{
    Address, BusConfig, BusEvent, BusPath, Connection, Connector, Descriptor, EventKind,
    Interface, Listener, Manager, RegisteredObject, Result, SubscriptionId, Target,
    TransportError,
};

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY: Duration = Duration::from_millis(100);

/// Collects status subscriptions that must be in place before the node
/// starts, so the initial `connect` event is not missed.
pub struct BusBuilder {
    config: BusConfig,
    shared: Arc<Shared>,
}

impl BusBuilder {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            shared: Shared::new(),
        }
    }

    pub fn on<F>(self, kind: EventKind, callback: F) -> Self
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.shared.status.subscribe(kind, callback);
        self
    }

    /// Start the root node with the authoritative name table.
    pub fn root(self) -> Result<Bus> {
        let path = BusPath::root();
        let started = node::start(
            path.clone(),
            None,
            None,
            self.config.clone(),
            Arc::clone(&self.shared),
        )?;
        let bus = Bus::assemble(started, self.shared, self.config);
        info!(path = %path, "bus root started");
        publish(&bus.inner.shared.status, BusEvent::Connect { path });
        Ok(bus)
    }

    /// Dial the parent, take the path it assigns and register with the root.
    ///
    /// `connector` is kept for reconnecting when the parent link drops.
    pub async fn connect(self, connector: Arc<dyn Connector>) -> Result<Bus> {
        let (path, conn) =
            reconnect::attach(connector.as_ref(), self.config.handshake_timeout()).await?;
        self.attached(path, conn, connector).await
    }

    async fn attached(
        self,
        path: BusPath,
        conn: Connection,
        connector: Arc<dyn Connector>,
    ) -> Result<Bus> {
        let started = node::start(
            path.clone(),
            Some(conn),
            Some(connector),
            self.config.clone(),
            Arc::clone(&self.shared),
        )?;
        let bus = Bus::assemble(started, self.shared, self.config);
        if let Err(err) = bus.inner.manager.add_node(path.as_str()).await {
            bus.shutdown();
            return Err(err.into());
        }
        info!(path = %path, "bus attached");
        publish(&bus.inner.shared.status, BusEvent::Connect { path });
        Ok(bus)
    }
}

struct Inner {
    handle: NodeHandle,
    manager: Arc<dyn Manager>,
    shared: Arc<Shared>,
    config: BusConfig,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

/// Handle to this process's node.
///
/// The node stops when the last clone is dropped.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

impl Bus {
    pub fn builder(config: BusConfig) -> BusBuilder {
        BusBuilder::new(config)
    }

    /// Start as the root of a new tree.
    pub fn root(config: BusConfig) -> Result<Self> {
        BusBuilder::new(config).root()
    }

    /// Join an existing tree through `connector`.
    pub async fn connect(connector: Arc<dyn Connector>, config: BusConfig) -> Result<Self> {
        BusBuilder::new(config).connect(connector).await
    }

    fn assemble(started: node::Started, shared: Arc<Shared>, config: BusConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle: started.handle,
                manager: started.manager,
                shared,
                config,
            }),
        }
    }

    /// Current path; changes only across a reconnection.
    pub fn path(&self) -> BusPath {
        self.inner.shared.path.read().clone()
    }

    pub fn is_root(&self) -> bool {
        self.path().is_root()
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// The name-resolution service: the authoritative table on the root, a
    /// proxy to it everywhere else.
    pub fn manager(&self) -> Arc<dyn Manager> {
        Arc::clone(&self.inner.manager)
    }

    /// Accept child connections from `listener` until it closes or the
    /// node shuts down.
    pub fn serve<L: Listener>(&self, mut listener: L) -> JoinHandle<()> {
        let handle = self.inner.handle.clone();
        tokio::spawn(async move {
            loop {
                let conn = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(TransportError::Closed) => break,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        tokio::time::sleep(ACCEPT_RETRY).await;
                        continue;
                    }
                };
                if handle.accept(conn).is_err() {
                    break;
                }
            }
            info!("listener stopped");
        })
    }

    /// Publish `name` under this node's path and serve it locally.
    ///
    /// Without a descriptor the member list comes from the implementation.
    pub async fn register_object(
        &self,
        name: &str,
        implementation: Arc<dyn Interface>,
        descriptor: Option<Descriptor>,
    ) -> Result<ObjectHandle> {
        let object = RegisteredObject::new(name, implementation, descriptor);
        self.inner
            .manager
            .add_name(name, self.path().as_str())
            .await?;
        self.inner.handle.register(object).await?;
        Ok(ObjectHandle {
            name: name.to_string(),
            bus: self.clone(),
        })
    }

    /// Unpublish `name`, then drop the local registration.
    pub async fn unregister_object(&self, name: &str) -> Result<()> {
        self.inner.manager.remove_name(name).await?;
        self.inner.handle.unregister(name).await?;
        Ok(())
    }

    /// Names of the objects registered on this node.
    pub async fn objects(&self) -> Result<Vec<String>> {
        self.inner.handle.objects().await
    }

    /// Call `name`, given as `<interface>.<member>` or
    /// `<path><interface>.<member>`.
    ///
    /// A bare interface is resolved through the manager first.
    pub async fn request(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let address = Address::parse(name)?;
        let path = match address.path {
            Some(path) => path,
            None => {
                let owner = self.inner.manager.resolve_name(&address.interface).await?;
                BusPath::parse(&owner)?
            }
        };
        self.call(Target::new(path, address.interface, address.member), args)
            .await
    }

    /// Call a fully addressed target.
    pub async fn call(&self, target: Target, args: Vec<Value>) -> Result<Value> {
        self.inner.handle.call(target, args).await
    }

    /// Broadcast a signal to every node, this one included.
    pub fn emit(&self, name: &str, args: Vec<Value>) -> Result<()> {
        self.inner.handle.emit(Signal::new(name, args))
    }

    pub fn on_signal<F>(&self, name: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .signals
            .subscribe(name.to_string(), move |args: &Vec<Value>| callback(args.as_slice()))
    }

    pub fn off_signal(&self, name: &str, id: SubscriptionId) -> bool {
        self.inner.shared.signals.unsubscribe(&name.to_string(), id)
    }

    pub fn on<F>(&self, kind: EventKind, callback: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.inner.shared.status.subscribe(kind, callback)
    }

    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner.shared.status.unsubscribe(&kind, id)
    }

    /// Observe accepted children with their assigned paths.
    pub fn on_child<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&BusPath) + Send + Sync + 'static,
    {
        self.on(EventKind::Child, move |event| {
            if let BusEvent::Child { path } = event {
                callback(path);
            }
        })
    }

    /// Stop the node. Outstanding calls fail with [`BusError::Shutdown`].
    pub fn shutdown(&self) {
        self.inner.handle.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.handle.is_closed()
    }
}

/// Returned by [`Bus::register_object`].
#[derive(Clone, Debug)]
pub struct ObjectHandle {
    name: String,
    bus: Bus,
}

impl ObjectHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Emit `<name>.<member>` with `args`.
    pub fn signal(&self, member: &str, args: Vec<Value>) -> Result<()> {
        self.bus.emit(&format!("{}.{}", self.name, member), args)
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus").field("path", &self.path()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use treebus_core::{BusError, Methods, NameError};

    fn echo() -> Arc<dyn Interface> {
        Arc::new(Methods::new().sync_method("call", |args| {
            Ok(args.into_iter().next().unwrap_or_default())
        }))
    }

    #[tokio::test]
    async fn test_root_serves_itself() {
        let bus = Bus::root(BusConfig::default()).unwrap();
        assert!(bus.is_root());
        assert!(bus.manager().is_authoritative());

        bus.register_object("Echo", echo(), None).await.unwrap();
        assert_eq!(bus.request("Echo.call", vec![json!(7)]).await.unwrap(), json!(7));
        assert_eq!(bus.request("/Echo.call", vec![json!("x")]).await.unwrap(), json!("x"));
        assert_eq!(bus.objects().await.unwrap(), vec!["Echo".to_string()]);
    }

    #[tokio::test]
    async fn test_builder_sees_connect() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let bus = Bus::builder(BusConfig::default())
            .on(EventKind::Connect, move |event| sink.lock().push(event.clone()))
            .root()
            .unwrap();
        assert_eq!(*seen.lock(), vec![BusEvent::Connect { path: bus.path() }]);
    }

    #[tokio::test]
    async fn test_request_errors() {
        let bus = Bus::root(BusConfig::default()).unwrap();
        assert!(matches!(
            bus.request("nodot", vec![]).await,
            Err(BusError::Path(_))
        ));
        assert!(matches!(
            bus.request("Nobody.call", vec![]).await,
            Err(BusError::Name(NameError::MissingName(_)))
        ));
        // No parent link to route through.
        assert!(matches!(
            bus.request("/3/Echo.call", vec![]).await,
            Err(BusError::NoRoute(_))
        ));
    }

    #[tokio::test]
    async fn test_object_handle_signals_member() {
        let bus = Bus::root(BusConfig::default()).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&got);
        bus.on_signal("Clock.tick", move |args| sink.lock().push(args.to_vec()));

        let clock = bus.register_object("Clock", echo(), None).await.unwrap();
        clock.signal("tick", vec![json!(1)]).unwrap();
        // Emission is processed by the node task; a round trip through it
        // orders the check after delivery.
        bus.objects().await.unwrap();
        assert_eq!(*got.lock(), vec![vec![json!(1)]]);
    }

    #[tokio::test]
    async fn test_shutdown_fails_calls() {
        let bus = Bus::root(BusConfig::default()).unwrap();
        bus.shutdown();
        assert!(matches!(bus.objects().await, Err(BusError::Shutdown)));
    }
}
