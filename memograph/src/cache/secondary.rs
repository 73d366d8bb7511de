//! The secondary-storage gateway.
//!
//! For fully-cached requests, the memory-cache factory routes through this
//! gateway: consult the blob store under the request digest before running
//! the body, and write the encoded result back afterwards. Storage errors
//! never fail a resolution — a failed read is a miss, a failed write is a
//! logged best-effort loss.

use crate::codec::{decode_value, encode_value};
use crate::context::Context;
use crate::request::{CachingLevel, ErasedRequest};
use crate::resolve::ResolveError;
use crate::value::{Blob, Value};
use tracing::warn;

/// Resolves a cached request through secondary storage when its caching
/// level asks for it; otherwise invokes the body directly.
pub async fn resolve_secondary_cached(
    ctx: &Context,
    request: &ErasedRequest,
) -> Result<Value, ResolveError> {
    if request.caching_level() != CachingLevel::Full {
        return crate::resolve::resolve_direct(ctx, request).await;
    }
    let Some(storage) = ctx.resources().secondary_storage() else {
        return crate::resolve::resolve_direct(ctx, request).await;
    };

    let key = request.digest()?.to_hex();

    match storage.read(&key).await {
        Ok(Some(blob)) => match decode_value(blob.as_slice()) {
            Ok(value) => return Ok(value),
            Err(error) => {
                warn!(%key, %error, "corrupt secondary-storage blob; recomputing");
            }
        },
        Ok(None) => {}
        Err(error) => {
            warn!(%key, %error, "secondary-storage read failed; treating as miss");
        }
    }

    let value = crate::resolve::resolve_direct(ctx, request).await?;

    let blob = Blob::from_bytes(encode_value(&value));
    if let Err(error) = storage.write(&key, blob).await {
        warn!(%key, %error, "secondary-storage write failed; result not persisted");
    }
    Ok(value)
}
