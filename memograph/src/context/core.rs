//! The context value threaded through resolution.

use crate::context::async_tree::{AsyncNode, AsyncStatus, AsyncTree};
use crate::context::resources::Resources;
use crate::context::tasklet::TaskletTracker;
use crate::resolve::ResolveError;
use std::sync::Arc;
use std::time::Duration;

/// Whether a resolution runs to completion inline or as an async tree with
/// per-node progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// Names the remote endpoint and domain a context dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSpec {
    /// Registered proxy name.
    pub proxy: String,
    /// Domain name sent with each submission so the server can construct a
    /// matching context.
    pub domain: String,
}

struct ContextShared {
    resources: Arc<Resources>,
    remote: Option<RemoteSpec>,
    mode: ExecutionMode,
    tasklets: Option<Arc<TaskletTracker>>,
    tree: Option<Arc<AsyncTree>>,
}

/// The runtime collaborator passed through resolution.
///
/// Contexts are cheap to clone; a subcontext shares everything but points
/// at a child async node.
#[derive(Clone)]
pub struct Context {
    shared: Arc<ContextShared>,
    node: Option<Arc<AsyncNode>>,
}

impl Context {
    pub fn builder(resources: Arc<Resources>) -> ContextBuilder {
        ContextBuilder {
            resources,
            remote: None,
            mode: ExecutionMode::Sync,
            tasklets: None,
        }
    }

    pub fn resources(&self) -> &Arc<Resources> {
        &self.shared.resources
    }

    /// Whether resolution should dispatch to a remote worker.
    pub fn remotely(&self) -> bool {
        self.shared.remote.is_some()
    }

    pub fn remote_spec(&self) -> Option<&RemoteSpec> {
        self.shared.remote.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.shared.mode == ExecutionMode::Async
    }

    /// The introspection sink, if installed.
    pub fn tasklets(&self) -> Option<&Arc<TaskletTracker>> {
        self.shared.tasklets.as_ref()
    }

    /// The async node tree, once a root resolution has been prepared.
    pub fn async_tree(&self) -> Option<&Arc<AsyncTree>> {
        self.shared.tree.as_ref()
    }

    /// The async node this context addresses.
    pub fn current_node(&self) -> Option<&Arc<AsyncNode>> {
        self.node.as_ref()
    }

    /// Prepares an async resolution up front: builds the node tree for
    /// `request` and returns the rooted context.
    ///
    /// Resolving through the returned context reuses the tree, so the
    /// caller keeps access to it — for progress monitoring and for
    /// [`request_cancellation`].
    ///
    /// [`request_cancellation`]: Context::request_cancellation
    pub fn prepare_async(&self, request: &crate::request::ErasedRequest) -> Context {
        self.with_tree(AsyncTree::build(request))
    }

    /// Derives the root context for a prepared async tree.
    pub(crate) fn with_tree(&self, tree: Arc<AsyncTree>) -> Context {
        let node = Some(Arc::clone(tree.root_node()));
        Context {
            shared: Arc::new(ContextShared {
                resources: Arc::clone(&self.shared.resources),
                remote: self.shared.remote.clone(),
                mode: self.shared.mode,
                tasklets: self.shared.tasklets.clone(),
                tree: Some(tree),
            }),
            node,
        }
    }

    /// Context for the `index`-th argument of the current node.
    pub(crate) fn subcontext(&self, index: usize) -> Context {
        let child = match (&self.shared.tree, &self.node) {
            (Some(tree), Some(node)) => node
                .children()
                .get(index)
                .and_then(|id| tree.node(*id))
                .cloned(),
            _ => None,
        };
        Context {
            shared: Arc::clone(&self.shared),
            node: child.or_else(|| self.node.clone()),
        }
    }

    /// Whether cancellation has been requested at the current node.
    pub fn is_cancellation_requested(&self) -> bool {
        self.node
            .as_ref()
            .is_some_and(|node| node.token().is_cancelled())
    }

    /// Cooperative cancellation check; cancels the current node's status
    /// and raises if its token has fired.
    pub fn throw_if_cancelled(&self) -> Result<(), ResolveError> {
        if let Some(node) = &self.node {
            if node.token().is_cancelled() {
                node.set_status(AsyncStatus::Cancelled);
                return Err(ResolveError::Cancelled);
            }
        }
        Ok(())
    }

    /// Cancellable sleep: returns `Cancelled` as soon as the current node's
    /// token fires.
    pub async fn schedule_after(&self, delay: Duration) -> Result<(), ResolveError> {
        match &self.node {
            Some(node) => {
                let token = node.token().clone();
                tokio::select! {
                    _ = token.cancelled() => {
                        node.set_status(AsyncStatus::Cancelled);
                        Err(ResolveError::Cancelled)
                    }
                    _ = tokio::time::sleep(delay) => Ok(()),
                }
            }
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    /// Requests cancellation of the current node's subtree.
    pub fn request_cancellation(&self) {
        if let (Some(tree), Some(node)) = (&self.shared.tree, &self.node) {
            tree.request_cancellation(node.id());
        }
    }

    pub(crate) fn mark_subs_running(&self) {
        if let Some(node) = &self.node {
            node.set_status(AsyncStatus::SubsRunning);
        }
    }

    pub(crate) fn mark_self_running(&self) {
        if let Some(node) = &self.node {
            node.set_status(AsyncStatus::SelfRunning);
        }
    }

    pub(crate) fn mark_awaiting_result(&self) {
        if let Some(node) = &self.node {
            node.set_status(AsyncStatus::AwaitingResult);
        }
    }

    pub(crate) fn mark_finished(&self) {
        if let Some(node) = &self.node {
            node.set_status(AsyncStatus::Finished);
        }
    }

    pub(crate) fn mark_cancelled(&self) {
        if let Some(node) = &self.node {
            node.set_status(AsyncStatus::Cancelled);
        }
    }

    pub(crate) fn mark_error(&self, message: &str) {
        if let Some(node) = &self.node {
            node.set_error(message);
        }
    }
}

/// Builder assembling a context's facets.
pub struct ContextBuilder {
    resources: Arc<Resources>,
    remote: Option<RemoteSpec>,
    mode: ExecutionMode,
    tasklets: Option<Arc<TaskletTracker>>,
}

impl ContextBuilder {
    /// Dispatches resolution to the named proxy under the named domain.
    pub fn remote(mut self, proxy: impl Into<String>, domain: impl Into<String>) -> Self {
        self.remote = Some(RemoteSpec {
            proxy: proxy.into(),
            domain: domain.into(),
        });
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Installs a tasklet introspection sink.
    pub fn introspected(mut self, tracker: Arc<TaskletTracker>) -> Self {
        self.tasklets = Some(tracker);
        self
    }

    pub fn build(self) -> Context {
        Context {
            shared: Arc::new(ContextShared {
                resources: self.resources,
                remote: self.remote,
                mode: self.mode,
                tasklets: self.tasklets,
                tree: None,
            }),
            node: None,
        }
    }
}
