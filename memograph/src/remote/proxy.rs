//! The remote-proxy interface.

use crate::codec::WireEncoding;
use crate::context::{AsyncId, AsyncStatus};
use crate::request::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Communication failures and remote-side failures.
///
/// Remote-side messages are carried verbatim. Proxies never retry on their
/// own.
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    /// The transport failed (connect, send, receive).
    #[error("remote transport: {0}")]
    Transport(String),

    /// The remote reported a failure; the message is the remote's.
    #[error("remote: {0}")]
    Server(String),

    /// A frame could not be encoded or decoded, or an unexpected response
    /// arrived.
    #[error("remote protocol: {0}")]
    Protocol(String),

    /// No proxy registered under the name.
    #[error("no remote proxy registered under '{0}'")]
    UnknownProxy(String),

    /// The operation is not valid for the node's current status.
    #[error("remote operation out of order: {0}")]
    BadState(String),
}

/// How a result's payload travels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultPayload {
    /// Encoded value bytes inline in the response.
    Inline(Vec<u8>),
    /// Path of a file the server wrote; the client maps it read-only and
    /// acknowledges so the server may unlink.
    SharedFile { path: PathBuf, size: u64 },
}

/// A resolution result in wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedResult {
    pub encoding: WireEncoding,
    pub payload: ResultPayload,
}

impl SerializedResult {
    pub fn inline(encoding: WireEncoding, bytes: Vec<u8>) -> Self {
        Self {
            encoding,
            payload: ResultPayload::Inline(bytes),
        }
    }
}

/// Client-side interface to one remote resolver.
///
/// Every operation may fail with [`RemoteError`]. `finish_async` must be
/// called once a submitted resolution reaches a terminal status — also on
/// failure — so the server can release its per-run state.
pub trait RemoteProxy: Send + Sync {
    /// The name this proxy is registered under.
    fn name(&self) -> &str;

    /// Liveness check; returns the remote's version string.
    fn ping(&self) -> BoxFuture<'_, Result<String, RemoteError>>;

    /// Resolves a serialized request to completion on the remote.
    fn resolve_sync<'a>(
        &'a self,
        domain: &'a str,
        seri_req: Vec<u8>,
    ) -> BoxFuture<'a, Result<SerializedResult, RemoteError>>;

    /// Enqueues an async resolution; returns the root node id immediately.
    fn submit_async<'a>(
        &'a self,
        domain: &'a str,
        seri_req: Vec<u8>,
    ) -> BoxFuture<'a, Result<AsyncId, RemoteError>>;

    /// Children of a node, with a request/value flag per child. Valid once
    /// the node has reached `SubsRunning` or later.
    fn get_sub_contexts(
        &self,
        aid: AsyncId,
    ) -> BoxFuture<'_, Result<Vec<(AsyncId, bool)>, RemoteError>>;

    /// Current status of a node.
    fn get_async_status(&self, aid: AsyncId) -> BoxFuture<'_, Result<AsyncStatus, RemoteError>>;

    /// Error message of a node; valid only in status `Error`.
    fn get_async_error_message(
        &self,
        aid: AsyncId,
    ) -> BoxFuture<'_, Result<String, RemoteError>>;

    /// The root result; valid only in status `Finished`.
    fn get_async_response(
        &self,
        root_aid: AsyncId,
    ) -> BoxFuture<'_, Result<SerializedResult, RemoteError>>;

    /// Requests cancellation of a node's subtree.
    fn request_cancellation(&self, aid: AsyncId) -> BoxFuture<'_, Result<(), RemoteError>>;

    /// Releases server-side state for a finished run. Mandatory, even
    /// after failure.
    fn finish_async(&self, root_aid: AsyncId) -> BoxFuture<'_, Result<(), RemoteError>>;

    /// Confirms receipt of a shared-file result so the server may unlink.
    fn ack_response(&self, path: PathBuf) -> BoxFuture<'_, Result<(), RemoteError>>;

    /// Installs a canned HTTP response on the remote. Test hook; requires
    /// the remote to run with `testing` enabled.
    fn mock_http(
        &self,
        url: String,
        body: Vec<u8>,
    ) -> BoxFuture<'_, Result<(), RemoteError>>;
}
