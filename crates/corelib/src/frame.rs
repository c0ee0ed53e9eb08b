//! Wire frames exchanged between adjacent nodes.
//!
//! Frames are decoded once at the transport boundary into the closed
//! [`Frame`] sum type. The JSON form is externally tagged:
//!
//! ```text
//! {"req": {"id": 7, "path": "/0/Echo", "intf": "Echo", "member": "call", "args": ["hi"], "sender": "/1/"}}
//! {"res": {"id": 7, "path": "/1/", "res": "hi"}}
//! {"res": {"id": 7, "path": "/1/", "err": "member not found: shout"}}
//! {"sig": {"name": "ping", "args": []}}
//! {"hello": {"path": "/1/"}}
//! "ready"
//! ```

use crate::error::FrameError;
use crate::path::BusPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    #[serde(rename = "req")]
    Request(Request),
    #[serde(rename = "res")]
    Response(Response),
    #[serde(rename = "sig")]
    Signal(Signal),
    /// Parent -> child: the path assigned to the child.
    #[serde(rename = "hello")]
    Hello(Hello),
    /// Child -> parent: initialization under the assigned path is complete.
    #[serde(rename = "ready")]
    Ready,
}

/// A call travelling towards the node that owns `path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    /// Object address, `<node path><interface>`.
    pub path: String,
    pub intf: String,
    pub member: String,
    #[serde(default)]
    pub args: Vec<Value>,
    /// Node path of the caller; responses are routed back to it.
    pub sender: String,
}

/// The result of a call travelling back to the caller.
///
/// Exactly one of `res` / `err` is meaningful; a missing `res` without an
/// `err` is a `null` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

/// A fire-and-forget broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub path: BusPath,
}

impl Response {
    /// Build the response for request `id`, addressed to `sender`.
    pub fn new(id: u64, sender: impl Into<String>, outcome: Result<Value, String>) -> Self {
        let (res, err) = match outcome {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        Self {
            id,
            path: sender.into(),
            res,
            err,
        }
    }

    /// Consume the response into the caller-visible outcome.
    pub fn into_outcome(self) -> Result<Value, String> {
        match self.err {
            Some(message) => Err(message),
            None => Ok(self.res.unwrap_or(Value::Null)),
        }
    }
}

impl Signal {
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl Frame {
    /// Short frame kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Request(_) => "req",
            Frame::Response(_) => "res",
            Frame::Signal(_) => "sig",
            Frame::Hello(_) => "hello",
            Frame::Ready => "ready",
        }
    }
}

/// Encode a frame to its JSON wire form.
pub fn encode(frame: &Frame) -> Result<Vec<u8>, FrameError> {
    serde_json::to_vec(frame).map_err(FrameError::Encode)
}

/// Decode a frame from its JSON wire form.
pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
    serde_json::from_slice(bytes).map_err(FrameError::Decode)
}
