//! TCP proxy client.
//!
//! One persistent connection per proxy; requests are serialized in order
//! over a length-delimited frame stream and each request awaits its single
//! response frame.

use crate::context::{AsyncId, AsyncStatus};
use crate::remote::messages::{self, RpcRequest, RpcResponse};
use crate::remote::proxy::{RemoteError, RemoteProxy, SerializedResult};
use crate::request::BoxFuture;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::PathBuf;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// A [`RemoteProxy`] speaking the frame protocol over TCP.
pub struct TcpProxy {
    name: String,
    connection: tokio::sync::Mutex<Connection>,
}

impl TcpProxy {
    /// Connects to a server at `addr` and names the proxy.
    pub async fn connect(
        name: impl Into<String>,
        addr: impl tokio::net::ToSocketAddrs,
    ) -> Result<Self, RemoteError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let name = name.into();
        debug!(name, "proxy connected");
        Ok(Self {
            name,
            connection: tokio::sync::Mutex::new(Framed::new(stream, LengthDelimitedCodec::new())),
        })
    }

    async fn call(&self, request: RpcRequest) -> Result<RpcResponse, RemoteError> {
        let bytes = messages::encode_request(&request)?;
        let mut connection = self.connection.lock().await;
        connection
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let frame = match connection.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(error)) => return Err(RemoteError::Transport(error.to_string())),
            None => return Err(RemoteError::Transport("connection closed".to_string())),
        };
        match messages::decode_response(&frame)? {
            RpcResponse::Error { message } => Err(RemoteError::Server(message)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: RpcResponse) -> RemoteError {
    RemoteError::Protocol(format!("unexpected response: {:?}", response))
}

impl RemoteProxy for TcpProxy {
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
