//! Outbound requests waiting for their response.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use treebus_core::{BusError, Request};

pub(crate) type Reply = oneshot::Sender<Result<Value, BusError>>;

#[derive(Debug)]
struct PendingRequest {
    request: Request,
    reply: Reply,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    fn settle(self, outcome: Result<Value, BusError>) -> Request {
        if let Some(timer) = &self.timer {
            timer.abort();
        }
        let _ = self.reply.send(outcome);
        self.request
    }
}

/// Requests issued by this node, keyed by their per-node id.
///
/// Ids start at 1 and only grow. An entry leaves the table when its
/// response arrives, when it times out, or when the caller has stopped
/// waiting (purged on the next insertion). Leaving the table cancels the
/// entry's timeout task.
#[derive(Debug)]
pub(crate) struct PendingRequests {
    next_id: u64,
    entries: HashMap<u64, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Track `request`, with the task that will expire it if any. Returns
    /// how many abandoned entries were purged.
    pub fn insert(&mut self, request: Request, reply: Reply, timer: Option<AbortHandle>) -> usize {
        let purged = self.purge_cancelled();
        self.entries.insert(
            request.id,
            PendingRequest {
                request,
                reply,
                timer,
            },
        );
        purged
    }

    /// Resolve request `id`. Returns `false` for an unknown id.
    pub fn complete(&mut self, id: u64, outcome: Result<Value, BusError>) -> bool {
        match self.entries.remove(&id) {
            Some(pending) => {
                pending.settle(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail request `id` with a timeout. Returns the original request if it
    /// was still waiting.
    pub fn expire(&mut self, id: u64) -> Option<Request> {
        let pending = self.entries.remove(&id)?;
        Some(pending.settle(Err(BusError::Timeout(id))))
    }

    fn purge_cancelled(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, pending| {
            let waiting = !pending.reply.is_closed();
            if let (false, Some(timer)) = (waiting, &pending.timer) {
                timer.abort();
            }
            waiting
        });
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
