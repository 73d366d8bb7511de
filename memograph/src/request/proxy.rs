//! Proxy requests.
//!
//! A proxy request names a class whose body exists only on a remote worker.
//! It serializes like any function request, but local resolution is a
//! contradiction: the resolver always dispatches it remotely.

use crate::context::Context;
use crate::identity::{ClassId, DigestBuilder, Fingerprint, RequestDigest};
use crate::request::{
    BoxFuture, CachingLevel, ErasedRequest, Request, RequestError, RequestUuid, SerialError,
    SerialNode,
};
use crate::resolve::ResolveError;
use crate::value::{Value, ValueKind};

/// A request resolvable only by a remote worker holding the class body.
pub struct ProxyRequest {
    uuid: RequestUuid,
    value_kind: ValueKind,
    args: Vec<ErasedRequest>,
    fingerprint: Fingerprint,
}

impl ProxyRequest {
    /// Builds a proxy application of a serializable class.
    pub fn new(
        uuid: RequestUuid,
        value_kind: ValueKind,
        args: Vec<ErasedRequest>,
    ) -> Result<ErasedRequest, RequestError> {
        if !uuid.is_serializable() {
            // A proxy that cannot cross the wire can never resolve.
            return Err(RequestError::FullCachingNeedsUuid(uuid.as_str().to_string()));
        }
        let fingerprint = Fingerprint::of_class(
            ClassId::Uuid(uuid.text().clone()),
            args.iter().map(|arg| arg.fingerprint()).collect(),
        );
        Ok(ErasedRequest::new(Self {
            uuid,
            value_kind,
            args,
            fingerprint,
        }))
    }
}

impl Request for ProxyRequest {
    fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    fn caching_level(&self) -> CachingLevel {
        CachingLevel::None
    }

    fn uuid(&self) -> Option<&RequestUuid> {
        Some(&self.uuid)
    }

    fn is_proxy(&self) -> bool {
        true
    }

    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint.clone()
    }

    fn own_digest(&self) -> Result<RequestDigest, SerialError> {
        if !self.uuid.is_disk_cacheable() {
            return Err(SerialError::NotDigestible(self.uuid.as_str().to_string()));
        }
        let mut builder = DigestBuilder::new();
        builder.update_uuid(self.uuid.as_str());
        for arg in &self.args {
            arg.update_digest(&mut builder)?;
        }
        Ok(builder.finish())
    }

    fn subrequests(&self) -> &[ErasedRequest] {
        &self.args
    }

    fn resolve<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<Value, ResolveError>> {
        let uuid = self.uuid.as_str().to_string();
        Box::pin(async move {
            Err(ResolveError::NotImplemented(format!(
                "proxy request '{}' has no local body",
                uuid
            )))
        })
    }

    fn to_serial(&self) -> Result<SerialNode, SerialError> {
        Ok(SerialNode::Request {
            uuid: self.uuid.as_str().to_string(),
            args: self
                .args
                .iter()
                .map(|arg| arg.to_serial())
                .collect::<Result<_, _>>()?,
        })
    }
}
