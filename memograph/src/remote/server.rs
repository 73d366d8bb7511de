//! The server side of remote dispatch.
//!
//! A [`RemoteServer`] receives `(domain, serialized request)` pairs,
//! constructs a context through the domain registry, deserializes through
//! the catalog registry, and runs a normal local resolution. Async runs are
//! tracked per root node id until the client calls `finish_async`.

use crate::catalog::SeriRegistry;
use crate::codec::WireEncoding;
use crate::config::{keys, Config, ConfigError};
use crate::context::{AsyncId, AsyncNode, AsyncStatus, AsyncTree, DomainRegistry, ExecutionMode};
use crate::remote::messages::{self, RpcRequest, RpcResponse};
use crate::remote::proxy::{ResultPayload, SerializedResult};
use crate::resolve::resolve;
use crate::value::{Blob, Value};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

const DEFAULT_REQUEST_CONCURRENCY: usize = 16;
const DEFAULT_SHARED_BLOB_THRESHOLD: usize = 1024 * 1024;

struct AsyncRun {
    tree: Arc<AsyncTree>,
    /// Set once the resolution finished and its result was encoded.
    result: Mutex<Option<SerializedResult>>,
    /// Shared-file results written for this run, pending acknowledgement.
    shared_files: Mutex<Vec<PathBuf>>,
}

/// One resolution endpoint: domain construction, catalog deserialization,
/// local resolution, async-run bookkeeping.
pub struct RemoteServer {
    resources: Arc<crate::context::Resources>,
    domains: DomainRegistry,
    registry: SeriRegistry,
    semaphore: Arc<tokio::sync::Semaphore>,
    encoding: WireEncoding,
    shared_blob_threshold: usize,
    runs: Mutex<HashMap<AsyncId, Arc<AsyncRun>>>,
    node_index: Mutex<HashMap<AsyncId, AsyncId>>,
    unacked_files: Mutex<HashSet<PathBuf>>,
    next_file_id: AtomicU64,
}

impl RemoteServer {
    /// Builds a server over shared resources and the given registries.
    ///
    /// `rpclib/request_concurrency` bounds concurrent resolutions;
    /// `rpclib/shared_blob_threshold` selects when results return by
    /// shared file instead of inline.
    pub fn new(
        resources: Arc<crate::context::Resources>,
        domains: DomainRegistry,
        registry: SeriRegistry,
    ) -> Result<Arc<Self>, ConfigError> {
        let config: &Config = resources.config();
        let concurrency = config
            .get_integer(keys::RPCLIB_REQUEST_CONCURRENCY)?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_REQUEST_CONCURRENCY)
            .max(1);
        let threshold = config
            .get_integer(keys::RPCLIB_SHARED_BLOB_THRESHOLD)?
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_SHARED_BLOB_THRESHOLD);

        info!(concurrency, threshold, "remote server constructed");
        Ok(Arc::new(Self {
            resources,
            domains,
            registry,
            semaphore: Arc::new(tokio::sync::Semaphore::new(concurrency)),
            encoding: WireEncoding::Native,
            shared_blob_threshold: threshold,
            runs: Mutex::new(HashMap::new()),
            node_index: Mutex::new(HashMap::new()),
            unacked_files: Mutex::new(HashSet::new()),
            next_file_id: AtomicU64::new(1),
        }))
    }

    /// Number of async runs currently tracked.
    pub fn run_count(&self) -> usize {
        self.runs.lock().unwrap().len()
    }

    /// Dispatches one request message. Failures become `RpcResponse::Error`
    /// with the message carried verbatim to the client.
    pub async fn handle(self: &Arc<Self>, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::Ping => RpcResponse::Pong {
                version: crate::VERSION.to_string(),
            },
            RpcRequest::ResolveSync { domain, seri_req } => {
                match self.resolve_sync_op(&domain, seri_req).await {
                    Ok(result) => RpcResponse::Result(result),
                    Err(message) => RpcResponse::Error { message },
                }
            }
            RpcRequest::SubmitAsync { domain, seri_req } => {
                match self.submit_async_op(&domain, seri_req).await {
                    Ok(root_aid) => RpcResponse::Submitted { root_aid },
                    Err(message) => RpcResponse::Error { message },
                }
            }
            RpcRequest::GetSubContexts { aid } => match self.get_sub_contexts_op(aid) {
                Ok(children) => RpcResponse::SubContexts(children),
                Err(message) => RpcResponse::Error { message },
            },
            RpcRequest::GetAsyncStatus { aid } => match self.get_async_status_op(aid) {
                Ok(status) => RpcResponse::Status(status),
                Err(message) => RpcResponse::Error { message },
            },
            RpcRequest::GetAsyncErrorMessage { aid } => {
                match self.get_async_error_message_op(aid) {
                    Ok(message) => RpcResponse::ErrorMessage(message),
                    Err(message) => RpcResponse::Error { message },
                }
            }
            RpcRequest::GetAsyncResponse { root_aid } => {
                match self.get_async_response_op(root_aid) {
                    Ok(result) => RpcResponse::Result(result),
                    Err(message) => RpcResponse::Error { message },
                }
            }
            RpcRequest::RequestCancellation { aid } => match self.request_cancellation_op(aid) {
                Ok(()) => RpcResponse::Ack,
                Err(message) => RpcResponse::Error { message },
            },
            RpcRequest::FinishAsync { root_aid } => match self.finish_async_op(root_aid).await {
                Ok(()) => RpcResponse::Ack,
                Err(message) => RpcResponse::Error { message },
            },
            RpcRequest::AckResponse { path } => {
                self.ack_response_op(path).await;
                RpcResponse::Ack
            }
            RpcRequest::MockHttp { url, body } => match self.mock_http_op(url, body) {
                Ok(()) => RpcResponse::Ack,
                Err(message) => RpcResponse::Error { message },
            },
        }
    }

    async fn resolve_sync_op(
        &self,
        domain: &str,
        seri_req: Vec<u8>,
    ) -> Result<SerializedResult, String> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| "server shutting down".to_string())?;
        let domain = self.domains.find(domain).map_err(|e| e.to_string())?;
        let request = crate::request::deserialize_request(&seri_req, &self.registry)
            .map_err(|e| e.to_string())?;
        let ctx = domain.make_context(Arc::clone(&self.resources), ExecutionMode::Sync);
        let value = resolve(&ctx, &request).await.map_err(|e| e.to_string())?;
        self.encode_result(&value, None).await.map_err(|e| e.to_string())
    }

    async fn submit_async_op(
        self: &Arc<Self>,
        domain: &str,
        seri_req: Vec<u8>,
    ) -> Result<AsyncId, String> {
        let domain = self.domains.find(domain).map_err(|e| e.to_string())?;
        let request = crate::request::deserialize_request(&seri_req, &self.registry)
            .map_err(|e| e.to_string())?;
        let ctx = domain.make_context(Arc::clone(&self.resources), ExecutionMode::Async);

        let tree = AsyncTree::build(&request);
        let rooted = ctx.with_tree(Arc::clone(&tree));
        let root = tree.root();
        let run = Arc::new(AsyncRun {
            tree: Arc::clone(&tree),
            result: Mutex::new(None),
            shared_files: Mutex::new(Vec::new()),
        });

        {
            let mut runs = self.runs.lock().unwrap();
            runs.insert(root, Arc::clone(&run));
        }
        {
            let mut index = self.node_index.lock().unwrap();
            for id in tree.ids() {
                index.insert(id, root);
            }
        }

        let server = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = match server.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            debug!(root = %root, "async run started");
            match resolve(&rooted, &request).await {
                Ok(value) => match server.encode_result(&value, Some(&run)).await {
                    Ok(seri) => {
                        *run.result.lock().unwrap() = Some(seri);
                    }
                    Err(error) => {
                        run.tree.root_node().set_error(error);
                    }
                },
                // The node statuses already record failure or cancellation.
                Err(error) => debug!(root = %root, %error, "async run failed"),
            }
        });

        Ok(root)
    }

    fn find_run(&self, root: AsyncId) -> Result<Arc<AsyncRun>, String> {
        self.runs
            .lock()
            .unwrap()
            .get(&root)
            .cloned()
            .ok_or_else(|| format!("unknown async run {}", root))
    }

    fn find_node(&self, aid: AsyncId) -> Result<(Arc<AsyncRun>, Arc<AsyncNode>), String> {
        let root = self
            .node_index
            .lock()
            .unwrap()
            .get(&aid)
            .copied()
            .ok_or_else(|| format!("unknown async node {}", aid))?;
        let run = self.find_run(root)?;
        let node = run
            .tree
            .node(aid)
            .cloned()
            .ok_or_else(|| format!("unknown async node {}", aid))?;
        Ok((run, node))
    }

    fn get_sub_contexts_op(&self, aid: AsyncId) -> Result<Vec<(AsyncId, bool)>, String> {
        let (run, node) = self.find_node(aid)?;
        if node.status() == AsyncStatus::Created {
            return Err(format!("node {} has not started", aid));
        }
        Ok(node
            .children()
            .iter()
            .filter_map(|id| run.tree.node(*id))
            .map(|child| {
                (
                    child.id(),
                    child.kind() == crate::context::NodeKind::Request,
                )
            })
            .collect())
    }

    fn get_async_status_op(&self, aid: AsyncId) -> Result<AsyncStatus, String> {
        let (run, node) = self.find_node(aid)?;
        let status = node.status();
        // The root is only "finished" for the client once the result is
        // actually fetchable; in between it is awaiting observation.
        if status == AsyncStatus::Finished
            && node.id() == run.tree.root()
            && run.result.lock().unwrap().is_none()
        {
            return Ok(AsyncStatus::AwaitingResult);
        }
        Ok(status)
    }

    fn get_async_error_message_op(&self, aid: AsyncId) -> Result<String, String> {
        let (_run, node) = self.find_node(aid)?;
        if node.status() != AsyncStatus::Error {
            return Err(format!("node {} is not in error status", aid));
        }
        node.error_message()
            .ok_or_else(|| format!("node {} has no error message", aid))
    }

    fn get_async_response_op(&self, root: AsyncId) -> Result<SerializedResult, String> {
        let run = self.find_run(root)?;
        let result = run.result.lock().unwrap().clone();
        result.ok_or_else(|| format!("async run {} has not finished", root))
    }

    fn request_cancellation_op(&self, aid: AsyncId) -> Result<(), String> {
        let (run, _node) = self.find_node(aid)?;
        run.tree.request_cancellation(aid);
        Ok(())
    }

    async fn finish_async_op(&self, root: AsyncId) -> Result<(), String> {
        let run = {
            let mut runs = self.runs.lock().unwrap();
            runs.remove(&root)
        }
        .ok_or_else(|| format!("unknown async run {}", root))?;

        {
            let mut index = self.node_index.lock().unwrap();
            for id in run.tree.ids() {
                index.remove(&id);
            }
        }

        // Reclaim any shared-file results the client never acknowledged.
        let leftover: Vec<PathBuf> = run.shared_files.lock().unwrap().drain(..).collect();
        for path in leftover {
            let unacked = self.unacked_files.lock().unwrap().remove(&path);
            if unacked {
                if let Err(error) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), %error, "removing shared result file failed");
                }
            }
        }
        debug!(root = %root, "async run finished");
        Ok(())
    }

    async fn ack_response_op(&self, path: PathBuf) {
        let known = self.unacked_files.lock().unwrap().remove(&path);
        if known {
            if let Err(error) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), %error, "removing acked result file failed");
            }
        }
    }

    fn mock_http_op(&self, url: String, body: Vec<u8>) -> Result<(), String> {
        if !self.resources.is_testing() {
            return Err("testing hooks are disabled on this server".to_string());
        }
        self.resources.set_mock_http(url, Blob::from_bytes(body));
        Ok(())
    }

    /// Encodes a result value; large payloads go to a shared file the
    /// client maps and acknowledges.
    async fn encode_result(
        &self,
        value: &Value,
        run: Option<&Arc<AsyncRun>>,
    ) -> Result<SerializedResult, String> {
        let bytes = self.encoding.encode(value).map_err(|e| e.to_string())?;
        if bytes.len() < self.shared_blob_threshold {
            return Ok(SerializedResult::inline(self.encoding, bytes));
        }

        let dir = self.resources.blob_dir().clone();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| e.to_string())?;
        let file_id = self.next_file_id.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("result-{}-{}.bin", std::process::id(), file_id));
        let size = bytes.len() as u64;
        tokio::fs::write(&path, &bytes).await.map_err(|e| e.to_string())?;

        self.unacked_files.lock().unwrap().insert(path.clone());
        if let Some(run) = run {
            run.shared_files.lock().unwrap().push(path.clone());
        }
        debug!(path = %path.display(), size, "result written to shared file");
        Ok(SerializedResult {
            encoding: self.encoding,
            payload: ResultPayload::SharedFile { path, size },
        })
    }
}

/// Accept loop: one length-delimited MessagePack frame per message, one
/// response frame per request, connections handled concurrently.
pub async fn serve(listener: TcpListener, server: Arc<RemoteServer>) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr(), "remote server listening");
    loop {
        let (socket, peer) = listener.accept().await?;
        debug!(?peer, "connection accepted");
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let mut framed = Framed::new(socket, LengthDelimitedCodec::new());
            while let Some(frame) = framed.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(error) => {
                        warn!(?peer, %error, "frame read failed");
                        break;
                    }
                };
                let response = match messages::decode_request(&frame) {
                    Ok(request) => server.handle(request).await,
                    Err(error) => RpcResponse::Error {
                        message: error.to_string(),
                    },
                };
                let bytes = match messages::encode_response(&response) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        warn!(?peer, %error, "response encode failed");
                        break;
                    }
                };
                if framed.send(Bytes::from(bytes)).await.is_err() {
                    break;
                }
            }
            debug!(?peer, "connection closed");
        });
    }
}
