//! The root manager exposed as a bus object.
//!
//! Registered on the root under [`MANAGER_NAME`](super::MANAGER_NAME) so that
//! [`RemoteManager`](super::RemoteManager) proxies can reach it with ordinary
//! requests.

use super::{LocalManager, Manager};
use crate::object::{string_arg, Interface};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Wire names of the manager operations.
pub const MEMBERS: [&str; 6] = [
    "addNode",
    "removeNode",
    "removeSubtree",
    "addName",
    "resolveName",
    "removeName",
];

pub struct ManagerService {
    manager: Arc<LocalManager>,
}

impl ManagerService {
    pub fn new(manager: Arc<LocalManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Interface for ManagerService {
    fn members(&self) -> Vec<String> {
        MEMBERS.iter().map(|m| m.to_string()).collect()
    }

    async fn call(&self, member: &str, args: Vec<Value>) -> Result<Value, String> {
        let manager = &self.manager;
        let outcome = match member {
            "addNode" => manager.add_node(string_arg(&args, 0)?).await.map(|()| Value::Null),
            "removeNode" => manager
                .remove_node(string_arg(&args, 0)?)
                .await
                .map(|()| Value::Null),
            "removeSubtree" => manager
                .remove_subtree(string_arg(&args, 0)?)
                .await
                .map(|removed| json!(removed)),
            "addName" => manager
                .add_name(string_arg(&args, 0)?, string_arg(&args, 1)?)
                .await
                .map(|()| Value::Null),
            "resolveName" => manager
                .resolve_name(string_arg(&args, 0)?)
                .await
                .map(Value::String),
            "removeName" => manager
                .remove_name(string_arg(&args, 0)?)
                .await
                .map(|()| Value::Null),
            other => return Err(format!("member not found: {other}")),
        };
        outcome.map_err(|err| err.to_string())
    }
}
