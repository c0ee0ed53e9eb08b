//! Objects registered on a node and callable over the bus.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Implementation side of a published interface.
///
/// Errors are plain strings: they travel back to the caller in the
/// response `err` field.
#[async_trait]
pub trait Interface: Send + Sync + 'static {
    /// Members this implementation answers to.
    fn members(&self) -> Vec<String>;

    async fn call(&self, member: &str, args: Vec<Value>) -> Result<Value, String>;
}

/// Optional description supplied at registration time.
///
/// When omitted, the member list is taken from [`Interface::members`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub members: Vec<String>,
    /// Append the caller's node path as the last call argument.
    pub append_sender: bool,
}

impl Descriptor {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            append_sender: false,
        }
    }

    pub fn with_sender(mut self) -> Self {
        self.append_sender = true;
        self
    }
}

/// An interface object owned by one node.
#[derive(Clone)]
pub struct RegisteredObject {
    pub name: String,
    pub implementation: Arc<dyn Interface>,
    pub members: Vec<String>,
    pub append_sender: bool,
}

impl RegisteredObject {
    pub fn new(
        name: impl Into<String>,
        implementation: Arc<dyn Interface>,
        descriptor: Option<Descriptor>,
    ) -> Self {
        let descriptor =
            descriptor.unwrap_or_else(|| Descriptor::new(implementation.members()));
        Self {
            name: name.into(),
            implementation,
            members: descriptor.members,
            append_sender: descriptor.append_sender,
        }
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

impl fmt::Debug for RegisteredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredObject")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("append_sender", &self.append_sender)
            .finish()
    }
}

type MethodFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;
type Method = Arc<dyn Fn(Vec<Value>) -> MethodFuture + Send + Sync>;

/// Closure-backed [`Interface`].
///
/// ```ignore
/// let echo = Methods::new()
///     .sync_method("call", |args| Ok(args.into_iter().next().unwrap_or_default()));
/// bus.register_object("Echo", Arc::new(echo), None).await?;
/// ```
#[derive(Default, Clone)]
pub struct Methods {
    table: BTreeMap<String, Method>,
}

impl Methods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let method: Method = Arc::new(move |args| Box::pin(f(args)));
        self.table.insert(name.into(), method);
        self
    }

    pub fn sync_method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.method(name, move |args| {
            let f = Arc::clone(&f);
            async move { f(args) }
        })
    }
}

#[async_trait]
impl Interface for Methods {
    fn members(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    async fn call(&self, member: &str, args: Vec<Value>) -> Result<Value, String> {
        let method = self
            .table
            .get(member)
            .cloned()
            .ok_or_else(|| format!("member not found: {member}"))?;
        method(args).await
    }
}

/// Fetch string argument `index`, for implementations that take names.
pub fn string_arg(args: &[Value], index: usize) -> Result<&str, String> {
    args.get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("argument {index} must be a string"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Methods {
        Methods::new()
            .sync_method("call", |args| Ok(args.into_iter().next().unwrap_or_default()))
            .method("twice", |args| async move {
                match args.first().and_then(Value::as_i64) {
                    Some(n) => Ok(json!(n * 2)),
                    None => Err("expected a number".to_string()),
                }
            })
    }

    #[tokio::test]
    async fn test_methods_dispatch() {
        let echo = echo();
        assert_eq!(echo.members(), vec!["call".to_string(), "twice".to_string()]);
        assert_eq!(echo.call("call", vec![json!("hi")]).await, Ok(json!("hi")));
        assert_eq!(echo.call("twice", vec![json!(21)]).await, Ok(json!(42)));
        assert_eq!(
            echo.call("twice", vec![json!("x")]).await,
            Err("expected a number".to_string())
        );
        assert!(echo.call("shout", vec![]).await.is_err());
    }

    #[test]
    fn test_registered_object_members_default_to_implementation() {
        let object = RegisteredObject::new("Echo", Arc::new(echo()), None);
        assert!(object.has_member("call"));
        assert!(object.has_member("twice"));
        assert!(!object.append_sender);
    }

    #[test]
    fn test_descriptor_narrows_members() {
        let object = RegisteredObject::new(
            "Echo",
            Arc::new(echo()),
            Some(Descriptor::new(["call"]).with_sender()),
        );
        assert!(object.has_member("call"));
        assert!(!object.has_member("twice"));
        assert!(object.append_sender);
    }

    #[test]
    fn test_string_arg() {
        let args = vec![json!("a"), json!(1)];
        assert_eq!(string_arg(&args, 0), Ok("a"));
        assert!(string_arg(&args, 1).is_err());
        assert!(string_arg(&args, 2).is_err());
    }
}
