//! In-process proxy wrapping a server directly.
//!
//! Exercises the full message protocol without a socket; used by tests and
//! by embedders that co-locate client and worker in one process.

use crate::context::{AsyncId, AsyncStatus};
use crate::remote::messages::{RpcRequest, RpcResponse};
use crate::remote::proxy::{RemoteError, RemoteProxy, SerializedResult};
use crate::remote::server::RemoteServer;
use crate::request::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;

/// A [`RemoteProxy`] that dispatches messages straight into an in-process
/// [`RemoteServer`].
pub struct LoopbackProxy {
    name: String,
    server: Arc<RemoteServer>,
}

impl LoopbackProxy {
    pub fn new(name: impl Into<String>, server: Arc<RemoteServer>) -> Self {
        Self {
            name: name.into(),
            server,
        }
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RemoteError> {
        match self.server.handle(request).await {
            RpcResponse::Error { message } => Err(RemoteError::Server(message)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: RpcResponse) -> RemoteError {
    RemoteError::Protocol(format!("unexpected response: {:?}", response))
}

impl RemoteProxy for LoopbackProxy {
    fn name(&self) -> &str {
        &self.name
    }

    fn ping(&self) -> BoxFuture<'_, Result<String, RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::Ping).await? {
                RpcResponse::Pong { version } => Ok(version),
                other => Err(unexpected(other)),
            }
        })
    }

    fn resolve_sync<'a>(
        &'a self,
        domain: &'a str,
        seri_req: Vec<u8>,
    ) -> BoxFuture<'a, Result<SerializedResult, RemoteError>> {
        Box::pin(async move {
            let request = RpcRequest::ResolveSync {
                domain: domain.to_string(),
                seri_req,
            };
            match self.call(request).await? {
                RpcResponse::Result(result) => Ok(result),
                other => Err(unexpected(other)),
            }
        })
    }

    fn submit_async<'a>(
        &'a self,
        domain: &'a str,
        seri_req: Vec<u8>,
    ) -> BoxFuture<'a, Result<AsyncId, RemoteError>> {
        Box::pin(async move {
            let request = RpcRequest::SubmitAsync {
                domain: domain.to_string(),
                seri_req,
            };
            match self.call(request).await? {
                RpcResponse::Submitted { root_aid } => Ok(root_aid),
                other => Err(unexpected(other)),
            }
        })
    }

    fn get_sub_contexts(
        &self,
        aid: AsyncId,
    ) -> BoxFuture<'_, Result<Vec<(AsyncId, bool)>, RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::GetSubContexts { aid }).await? {
                RpcResponse::SubContexts(children) => Ok(children),
                other => Err(unexpected(other)),
            }
        })
    }

    fn get_async_status(&self, aid: AsyncId) -> BoxFuture<'_, Result<AsyncStatus, RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::GetAsyncStatus { aid }).await? {
                RpcResponse::Status(status) => Ok(status),
                other => Err(unexpected(other)),
            }
        })
    }

    fn get_async_error_message(
        &self,
        aid: AsyncId,
    ) -> BoxFuture<'_, Result<String, RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::GetAsyncErrorMessage { aid }).await? {
                RpcResponse::ErrorMessage(message) => Ok(message),
                other => Err(unexpected(other)),
            }
        })
    }

    fn get_async_response(
        &self,
        root_aid: AsyncId,
    ) -> BoxFuture<'_, Result<SerializedResult, RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::GetAsyncResponse { root_aid }).await? {
                RpcResponse::Result(result) => Ok(result),
                other => Err(unexpected(other)),
            }
        })
    }

    fn request_cancellation(&self, aid: AsyncId) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::RequestCancellation { aid }).await? {
                RpcResponse::Ack => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }

    fn finish_async(&self, root_aid: AsyncId) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::FinishAsync { root_aid }).await? {
                RpcResponse::Ack => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }

    fn ack_response(&self, path: PathBuf) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::AckResponse { path }).await? {
                RpcResponse::Ack => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }

    fn mock_http(&self, url: String, body: Vec<u8>) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            match self.call(RpcRequest::MockHttp { url, body }).await? {
                RpcResponse::Ack => Ok(()),
                other => Err(unexpected(other)),
            }
        })
    }
}
