//! Client-side remote resolution.

use crate::context::{AsyncStatus, Context};
use crate::remote::proxy::{RemoteError, RemoteProxy, ResultPayload, SerializedResult};
use crate::remote::registry::ProxyRegistry;
use crate::request::{serialize_request, ErasedRequest};
use crate::resolve::ResolveError;
use crate::value::{Blob, Value};
use std::time::Duration;
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Dispatches a resolution to the context's remote proxy.
pub(crate) async fn resolve_remote(
    ctx: &Context,
    request: &ErasedRequest,
) -> Result<Value, ResolveError> {
    let spec = ctx.remote_spec().cloned().ok_or_else(|| {
        ResolveError::InvalidConstraints(
            "remote resolution requires a remote proxy on the context".to_string(),
        )
    })?;
    let proxy = ProxyRegistry::global().find(&spec.proxy)?;
    let seri_req = serialize_request(request)?;

    if ctx.is_async() {
        resolve_remote_async(ctx, &*proxy, &spec.domain, seri_req).await
    } else {
        let result = proxy.resolve_sync(&spec.domain, seri_req).await?;
        decode_result(&*proxy, result).await
    }
}

/// Submit, poll to a terminal status, fetch the result, and always finish.
async fn resolve_remote_async(
    ctx: &Context,
    proxy: &dyn RemoteProxy,
    domain: &str,
    seri_req: Vec<u8>,
) -> Result<Value, ResolveError> {
    let root = proxy.submit_async(domain, seri_req).await?;
    let outcome = poll_until_terminal(ctx, proxy, root).await;
    // Mandatory cleanup, also on failure, so the server releases the run.
    if let Err(error) = proxy.finish_async(root).await {
        warn!(%error, root = %root, "finish_async failed");
    }
    outcome
}

async fn poll_until_terminal(
    ctx: &Context,
    proxy: &dyn RemoteProxy,
    root: crate::context::AsyncId,
) -> Result<Value, ResolveError> {
    let mut cancellation_forwarded = false;
    loop {
        if !cancellation_forwarded && ctx.is_cancellation_requested() {
            proxy.request_cancellation(root).await?;
            cancellation_forwarded = true;
        }
        match proxy.get_async_status(root).await? {
            AsyncStatus::Finished => {
                ctx.mark_awaiting_result();
                let result = proxy.get_async_response(root).await?;
                let value = decode_result(proxy, result).await?;
                ctx.mark_finished();
                return Ok(value);
            }
            AsyncStatus::Error => {
                let message = proxy.get_async_error_message(root).await?;
                ctx.mark_error(&message);
                return Err(ResolveError::Remote(RemoteError::Server(message)));
            }
            AsyncStatus::Cancelled => {
                ctx.mark_cancelled();
                return Err(ResolveError::Cancelled);
            }
            _ => tokio::time::sleep(POLL_INTERVAL).await,
        }
    }
}

/// Decodes a serialized result; shared-file payloads are mapped read-only
/// and acknowledged so the server may reclaim the file.
async fn decode_result(
    proxy: &dyn RemoteProxy,
    result: SerializedResult,
) -> Result<Value, ResolveError> {
    match result.payload {
        ResultPayload::Inline(bytes) => Ok(result.encoding.decode(&bytes)?),
        ResultPayload::SharedFile { path, .. } => {
            let blob = Blob::open_mapped(&path)
                .map_err(|e| RemoteError::Transport(format!("mapping {}: {}", path.display(), e)))?;
            let value = result.encoding.decode(blob.as_slice())?;
            if let Err(error) = proxy.ack_response(path).await {
                warn!(%error, "ack_response failed; server keeps the file until cleanup");
            }
            Ok(value)
        }
    }
}
