//! Manager proxy used by every non-root node.

use super::{Manager, MANAGER_NAME};
use crate::error::{BusError, NameError};
use crate::path::{BusPath, Target};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Something that can issue a bus request and wait for its result.
///
/// Implemented by the node handle; kept as a trait so the proxy does not
/// depend on the routing engine.
#[async_trait]
pub trait Requester: Send + Sync + 'static {
    async fn call(&self, target: Target, args: Vec<Value>) -> Result<Value, BusError>;
}

/// Forwards every operation to the `"Bus"` object on the root.
///
/// The root is the only node that ever owns `"Bus"`, so the proxy addresses
/// it directly instead of resolving the name first.
pub struct RemoteManager {
    requester: Arc<dyn Requester>,
    owner: BusPath,
}

impl RemoteManager {
    pub fn new(requester: Arc<dyn Requester>) -> Self {
        Self {
            requester,
            owner: BusPath::root(),
        }
    }

    async fn forward(&self, member: &str, args: Vec<Value>) -> Result<Value, NameError> {
        let target = Target::new(self.owner.clone(), MANAGER_NAME, member);
        self.requester
            .call(target, args)
            .await
            .map_err(|err| match err {
                BusError::Remote(message) => NameError::from_remote(&message)
                    .unwrap_or(NameError::Unavailable(message)),
                BusError::Name(err) => err,
                other => NameError::Unavailable(other.to_string()),
            })
    }
}

#[async_trait]
impl Manager for RemoteManager {
    async fn add_node(&self, path: &str) -> Result<(), NameError> {
        self.forward("addNode", vec![json!(path)]).await.map(drop)
    }

    async fn remove_node(&self, path: &str) -> Result<(), NameError> {
        self.forward("removeNode", vec![json!(path)]).await.map(drop)
    }

    async fn remove_subtree(&self, path: &str) -> Result<usize, NameError> {
        let removed = self.forward("removeSubtree", vec![json!(path)]).await?;
        removed
            .as_u64()
            .and_then(|count| usize::try_from(count).ok())
            .ok_or_else(|| {
                NameError::Unavailable(format!("unexpected removeSubtree result: {removed}"))
            })
    }

    async fn add_name(&self, name: &str, owner: &str) -> Result<(), NameError> {
        self.forward("addName", vec![json!(name), json!(owner)])
            .await
            .map(drop)
    }

    async fn resolve_name(&self, name: &str) -> Result<String, NameError> {
        match self.forward("resolveName", vec![json!(name)]).await? {
            Value::String(owner) => Ok(owner),
            other => Err(NameError::Unavailable(format!(
                "unexpected resolveName result: {other}"
            ))),
        }
    }

    async fn remove_name(&self, name: &str) -> Result<(), NameError> {
        self.forward("removeName", vec![json!(name)]).await.map(drop)
    }

    fn is_authoritative(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{LocalManager, ManagerService};
    use crate::object::Interface;
    use parking_lot::Mutex;

    /// Delivers calls straight to a root service, recording every target.
    struct Loopback {
        service: ManagerService,
        seen: Mutex<Vec<Target>>,
    }

    #[async_trait]
    impl Requester for Loopback {
        async fn call(&self, target: Target, args: Vec<Value>) -> Result<Value, BusError> {
            self.seen.lock().push(target.clone());
            self.service
                .call(&target.member, args)
                .await
                .map_err(BusError::Remote)
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Requester for Unreachable {
        async fn call(&self, target: Target, _args: Vec<Value>) -> Result<Value, BusError> {
            Err(BusError::NoRoute(target.object_path()))
        }
    }

    #[tokio::test]
    async fn test_proxy_forwards_to_root_bus_object() {
        let root = Arc::new(LocalManager::for_root(&BusPath::root()).unwrap());
        let loopback = Arc::new(Loopback {
            service: ManagerService::new(Arc::clone(&root)),
            seen: Mutex::new(Vec::new()),
        });
        let proxy = RemoteManager::new(loopback.clone());
        assert!(!proxy.is_authoritative());

        proxy.add_node("/0/").await.unwrap();
        proxy.add_name("Echo", "/0/").await.unwrap();
        assert_eq!(proxy.resolve_name("Echo").await.unwrap(), "/0/");
        assert_eq!(root.names_of("/0/"), Some(vec!["Echo".to_string()]));

        let seen = loopback.seen.lock().clone();
        assert!(seen.iter().all(|t| t.object_path() == "/Bus"));
        assert_eq!(seen[1].member, "addName");
    }

    #[tokio::test]
    async fn test_proxy_returns_typed_errors() {
        let root = Arc::new(LocalManager::for_root(&BusPath::root()).unwrap());
        let proxy = RemoteManager::new(Arc::new(Loopback {
            service: ManagerService::new(root),
            seen: Mutex::new(Vec::new()),
        }));

        assert_eq!(
            proxy.resolve_name("X").await,
            Err(NameError::MissingName("X".into()))
        );
        assert_eq!(
            proxy.add_name("Bus", "/").await,
            Err(NameError::DuplicateName("Bus".into()))
        );
        assert_eq!(
            proxy.remove_subtree("/4/").await,
            Err(NameError::MissingNode("/4/".into()))
        );
    }

    /// Answers every call with the same value.
    struct Canned(Value);

    #[async_trait]
    impl Requester for Canned {
        async fn call(&self, _target: Target, _args: Vec<Value>) -> Result<Value, BusError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_malformed_results_are_rejected() {
        let proxy = RemoteManager::new(Arc::new(Canned(json!("three"))));
        assert!(matches!(
            proxy.remove_subtree("/0/").await,
            Err(NameError::Unavailable(_))
        ));
        assert!(matches!(
            proxy.resolve_name("Echo").await,
            Err(NameError::Unavailable(_))
        ));

        let proxy = RemoteManager::new(Arc::new(Canned(json!(3))));
        assert_eq!(proxy.remove_subtree("/0/").await, Ok(3));
    }

    #[tokio::test]
    async fn test_unreachable_root() {
        let proxy = RemoteManager::new(Arc::new(Unreachable));
        assert!(matches!(
            proxy.add_node("/0/").await,
            Err(NameError::Unavailable(_))
        ));
    }
}
