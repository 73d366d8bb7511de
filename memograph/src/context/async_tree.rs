//! The async node tree.
//!
//! Each async resolution owns a tree of nodes mirroring the request tree:
//! one node per request, children in argument order. Nodes expose a status
//! watch channel and a cancellation token derived from their parent's, so
//! cancelling any node reaches its whole subtree.

use crate::request::ErasedRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Process-unique identifier of an async node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AsyncId(u64);

static NEXT_ASYNC_ID: AtomicU64 = AtomicU64::new(1);

impl AsyncId {
    fn next() -> Self {
        Self(NEXT_ASYNC_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for AsyncId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of one in-flight request node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncStatus {
    /// Node exists; nothing has run yet.
    Created,
    /// Subrequests are resolving.
    SubsRunning,
    /// The node's own body is running.
    SelfRunning,
    /// Cancellation was requested; the node has not yet reached a
    /// suspension point.
    Cancelling,
    /// Cancellation observed; terminal.
    Cancelled,
    /// The body returned; the caller has not yet observed the result.
    AwaitingResult,
    /// Completed successfully; terminal.
    Finished,
    /// Failed; terminal, with the message captured on the node.
    Error,
}

impl AsyncStatus {
    /// Terminal states are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled | Self::Error)
    }
}

impl std::fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "Created",
            Self::SubsRunning => "SubsRunning",
            Self::SelfRunning => "SelfRunning",
            Self::Cancelling => "Cancelling",
            Self::Cancelled => "Cancelled",
            Self::AwaitingResult => "AwaitingResult",
            Self::Finished => "Finished",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

/// Whether a node stands for a request or a plain value leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Request,
    Value,
}

/// One node of an async resolution tree.
pub struct AsyncNode {
    id: AsyncId,
    parent: Option<AsyncId>,
    kind: NodeKind,
    children: Vec<AsyncId>,
    status: watch::Sender<AsyncStatus>,
    error: Mutex<Option<String>>,
    token: CancellationToken,
}

impl AsyncNode {
    pub fn id(&self) -> AsyncId {
        self.id
    }

    pub fn parent(&self) -> Option<AsyncId> {
        self.parent
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Child node ids, in argument order.
    pub fn children(&self) -> &[AsyncId] {
        &self.children
    }

    pub fn status(&self) -> AsyncStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<AsyncStatus> {
        self.status.subscribe()
    }

    /// Captured error message; present once the node reaches `Error`.
    pub fn error_message(&self) -> Option<String> {
        self.error.lock().unwrap().clone()
    }

    /// The node's cancellation token; child tokens derive from it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Applies a status transition, ignoring anything that would leave a
    /// terminal state or regress out of `Cancelling`.
    pub(crate) fn set_status(&self, new: AsyncStatus) {
        self.status.send_if_modified(|current| {
            if current.is_terminal() || *current == new {
                return false;
            }
            if *current == AsyncStatus::Cancelling && !new.is_terminal() {
                return false;
            }
            *current = new;
            true
        });
    }

    pub(crate) fn set_error(&self, message: impl Into<String>) {
        *self.error.lock().unwrap() = Some(message.into());
        self.set_status(AsyncStatus::Error);
    }
}

/// The tree of async nodes for one root resolution.
///
/// The structure is immutable after construction; only node status changes.
pub struct AsyncTree {
    root: AsyncId,
    nodes: HashMap<AsyncId, Arc<AsyncNode>>,
}

impl AsyncTree {
    /// Builds a tree mirroring `request`, depth-first, every node `Created`.
    pub fn build(request: &ErasedRequest) -> Arc<Self> {
        let mut nodes = HashMap::new();
        let root_token = CancellationToken::new();
        let root = Self::build_node(request, None, &root_token, &mut nodes);
        Arc::new(Self { root, nodes })
    }

    fn build_node(
        request: &ErasedRequest,
        parent: Option<AsyncId>,
        parent_token: &CancellationToken,
        nodes: &mut HashMap<AsyncId, Arc<AsyncNode>>,
    ) -> AsyncId {
        let id = AsyncId::next();
        let token = parent_token.child_token();
        let children: Vec<AsyncId> = request
            .subrequests()
            .iter()
            .map(|sub| Self::build_node(sub, Some(id), &token, nodes))
            .collect();
        let kind = if request.is_literal() {
            NodeKind::Value
        } else {
            NodeKind::Request
        };
        let (status, _) = watch::channel(AsyncStatus::Created);
        nodes.insert(
            id,
            Arc::new(AsyncNode {
                id,
                parent,
                kind,
                children,
                status,
                error: Mutex::new(None),
                token,
            }),
        );
        id
    }

    pub fn root(&self) -> AsyncId {
        self.root
    }

    pub fn root_node(&self) -> &Arc<AsyncNode> {
        &self.nodes[&self.root]
    }

    pub fn node(&self, id: AsyncId) -> Option<&Arc<AsyncNode>> {
        self.nodes.get(&id)
    }

    /// All node ids in the tree, unordered.
    pub fn ids(&self) -> impl Iterator<Item = AsyncId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Requests cancellation at `id`: the node and every live descendant
    /// turn `Cancelling` and their tokens fire; each transitions to
    /// `Cancelled` at its next suspension point.
    pub fn request_cancellation(&self, id: AsyncId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        self.mark_cancelling(id);
        node.token.cancel();
    }

    fn mark_cancelling(&self, id: AsyncId) {
        if let Some(node) = self.nodes.get(&id) {
            node.set_status(AsyncStatus::Cancelling);
            for child in node.children() {
                self.mark_cancelling(*child);
            }
        }
    }
}
