//! Authoritative name table held by the root node.

use super::{in_subtree, Manager, MANAGER_NAME};
use crate::error::NameError;
use crate::path::BusPath;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Name -> owner and owner -> names, kept in step.
///
/// # Invariants
///
/// - A name resolves to exactly one path.
/// - A path may own any number of names, in registration order.
/// - Every owner in `names` has an entry in `nodes` listing that name.
#[derive(Debug, Default)]
struct NameTable {
    names: HashMap<String, String>,
    nodes: HashMap<String, Vec<String>>,
}

/// The root's name table.
///
/// Each operation takes the table lock for a single step only, so
/// `remove_node` is a sequence of independent `remove_name` steps rather
/// than one atomic change.
#[derive(Debug, Default)]
pub struct LocalManager {
    table: Mutex<NameTable>,
}

impl LocalManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table for the root at `path`, already publishing itself as `"Bus"`.
    pub fn for_root(path: &BusPath) -> Result<Self, NameError> {
        let manager = Self::new();
        manager.insert_node(path.as_str())?;
        manager.insert_name(MANAGER_NAME, path.as_str())?;
        Ok(manager)
    }

    /// Snapshot of every binding, sorted by name.
    pub fn names(&self) -> BTreeMap<String, String> {
        let table = self.table.lock();
        table
            .names
            .iter()
            .map(|(name, owner)| (name.clone(), owner.clone()))
            .collect()
    }

    /// Names owned by `path`, in registration order.
    pub fn names_of(&self, path: &str) -> Option<Vec<String>> {
        self.table.lock().nodes.get(path).cloned()
    }

    /// Every node entry, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.table.lock().nodes.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    fn insert_node(&self, path: &str) -> Result<(), NameError> {
        let mut table = self.table.lock();
        if table.nodes.contains_key(path) {
            return Err(NameError::DuplicateNode(path.to_string()));
        }
        table.nodes.insert(path.to_string(), Vec::new());
        debug!(path, "node added");
        Ok(())
    }

    fn insert_name(&self, name: &str, owner: &str) -> Result<(), NameError> {
        let mut table = self.table.lock();
        if table.names.contains_key(name) {
            return Err(NameError::DuplicateName(name.to_string()));
        }
        let owned = table
            .nodes
            .get_mut(owner)
            .ok_or_else(|| NameError::MissingNode(owner.to_string()))?;
        owned.push(name.to_string());
        table.names.insert(name.to_string(), owner.to_string());
        debug!(name, owner, "name added");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<String, NameError> {
        self.table
            .lock()
            .names
            .get(name)
            .cloned()
            .ok_or_else(|| NameError::MissingName(name.to_string()))
    }

    fn delete_name(&self, name: &str) -> Result<(), NameError> {
        let mut table = self.table.lock();
        let owner = table
            .names
            .remove(name)
            .ok_or_else(|| NameError::MissingName(name.to_string()))?;
        let owned = table
            .nodes
            .get_mut(&owner)
            .ok_or_else(|| NameError::MissingNode(owner.clone()))?;
        let index = owned
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| NameError::MissingName(name.to_string()))?;
        owned.remove(index);
        debug!(name, owner = %owner, "name removed");
        Ok(())
    }

    fn delete_node(&self, path: &str) -> Result<(), NameError> {
        let owned = self
            .names_of(path)
            .ok_or_else(|| NameError::MissingNode(path.to_string()))?;
        for name in owned {
            self.delete_name(&name)?;
        }
        self.table.lock().nodes.remove(path);
        debug!(path, "node removed");
        Ok(())
    }

    fn delete_subtree(&self, path: &str) -> Result<usize, NameError> {
        let mut doomed: Vec<String> = self
            .table
            .lock()
            .nodes
            .keys()
            .filter(|node| in_subtree(path, node))
            .cloned()
            .collect();
        if doomed.is_empty() {
            return Err(NameError::MissingNode(path.to_string()));
        }
        doomed.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        for node in &doomed {
            self.delete_node(node)?;
        }
        Ok(doomed.len())
    }
}

#[async_trait]
impl Manager for LocalManager {
    async fn add_node(&self, path: &str) -> Result<(), NameError> {
        self.insert_node(path)
    }

    async fn remove_node(&self, path: &str) -> Result<(), NameError> {
        self.delete_node(path)
    }

    async fn remove_subtree(&self, path: &str) -> Result<usize, NameError> {
        self.delete_subtree(path)
    }

    async fn add_name(&self, name: &str, owner: &str) -> Result<(), NameError> {
        self.insert_name(name, owner)
    }

    async fn resolve_name(&self, name: &str) -> Result<String, NameError> {
        self.lookup(name)
    }

    async fn remove_name(&self, name: &str) -> Result<(), NameError> {
        self.delete_name(name)
    }

    fn is_authoritative(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_root_publishes_itself() {
        let manager = LocalManager::for_root(&BusPath::root()).unwrap();
        assert_eq!(manager.resolve_name("Bus").await.unwrap(), "/");
        assert_eq!(manager.nodes(), vec!["/".to_string()]);
        assert!(manager.is_authoritative());
    }

    #[tokio::test]
    async fn test_add_node_twice() {
        let manager = LocalManager::new();
        manager.add_node("/0/").await.unwrap();
        assert_eq!(
            manager.add_node("/0/").await,
            Err(NameError::DuplicateNode("/0/".into()))
        );
    }

    #[tokio::test]
    async fn test_add_name_requires_node() {
        let manager = LocalManager::new();
        assert_eq!(
            manager.add_name("X", "/0/").await,
            Err(NameError::MissingNode("/0/".into()))
        );
        assert!(manager.names().is_empty());
    }

    #[tokio::test]
    async fn test_second_owner_is_rejected() {
        let manager = LocalManager::new();
        manager.add_node("/0").await.unwrap();
        manager.add_node("/1").await.unwrap();

        manager.add_name("X", "/0").await.unwrap();
        assert_eq!(
            manager.add_name("X", "/1").await,
            Err(NameError::DuplicateName("X".into()))
        );
        assert_eq!(manager.resolve_name("X").await.unwrap(), "/0");
        assert_eq!(manager.names_of("/1"), Some(vec![]));
    }

    #[tokio::test]
    async fn test_remove_node_drops_its_names() {
        let manager = LocalManager::new();
        manager.add_node("/0").await.unwrap();
        manager.add_name("X", "/0").await.unwrap();
        manager.remove_node("/0").await.unwrap();

        assert_eq!(
            manager.resolve_name("X").await,
            Err(NameError::MissingName("X".into()))
        );
        assert!(manager.nodes().is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown() {
        let manager = LocalManager::new();
        assert_eq!(
            manager.remove_node("/9/").await,
            Err(NameError::MissingNode("/9/".into()))
        );
        assert_eq!(
            manager.remove_name("nope").await,
            Err(NameError::MissingName("nope".into()))
        );
        assert_eq!(
            manager.resolve_name("nope").await,
            Err(NameError::MissingName("nope".into()))
        );
    }

    #[tokio::test]
    async fn test_remove_node_leaves_descendants() {
        let manager = LocalManager::new();
        manager.add_node("/0/").await.unwrap();
        manager.add_node("/0/1/").await.unwrap();
        manager.add_name("Parent", "/0/").await.unwrap();
        manager.add_name("Child", "/0/1/").await.unwrap();

        manager.remove_node("/0/").await.unwrap();

        assert!(manager.resolve_name("Parent").await.is_err());
        assert_eq!(manager.resolve_name("Child").await.unwrap(), "/0/1/");
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let manager = LocalManager::for_root(&BusPath::root()).unwrap();
        for node in ["/0/", "/0/1/", "/0/1/0/", "/01/", "/1/"] {
            manager.add_node(node).await.unwrap();
        }
        manager.add_name("A", "/0/").await.unwrap();
        manager.add_name("B", "/0/1/").await.unwrap();
        manager.add_name("C", "/0/1/0/").await.unwrap();
        manager.add_name("D", "/01/").await.unwrap();
        manager.add_name("E", "/1/").await.unwrap();

        assert_eq!(manager.remove_subtree("/0/").await.unwrap(), 3);

        for gone in ["A", "B", "C"] {
            assert!(manager.resolve_name(gone).await.is_err());
        }
        assert_eq!(manager.resolve_name("D").await.unwrap(), "/01/");
        assert_eq!(manager.resolve_name("E").await.unwrap(), "/1/");
        assert_eq!(manager.nodes(), vec!["/", "/01/", "/1/"]);

        assert_eq!(
            manager.remove_subtree("/0/").await,
            Err(NameError::MissingNode("/0/".into()))
        );
    }

    #[tokio::test]
    async fn test_register_then_unregister_restores_table() {
        let manager = LocalManager::for_root(&BusPath::root()).unwrap();
        manager.add_node("/0/").await.unwrap();
        let before = manager.names();

        manager.add_name("Echo", "/0/").await.unwrap();
        manager.remove_name("Echo").await.unwrap();

        assert_eq!(manager.names(), before);
        assert_eq!(manager.names_of("/0/"), Some(vec![]));
    }
}
