//! Literal requests.

use crate::context::Context;
use crate::identity::{DigestBuilder, Fingerprint};
use crate::request::{
    BoxFuture, CachingLevel, ErasedRequest, Request, RequestUuid, SerialError, SerialNode,
};
use crate::resolve::ResolveError;
use crate::value::{Value, ValueKind};

/// A request that wraps a value.
///
/// Literals resolve immediately and are never cached on their own; their
/// identity is the value itself.
#[derive(Debug, Clone)]
pub struct LiteralRequest {
    value: Value,
    fingerprint: Fingerprint,
}

impl LiteralRequest {
    pub fn new(value: impl Into<Value>) -> Self {
        let value = value.into();
        let fingerprint = Fingerprint::of_value(value.clone());
        Self { value, fingerprint }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Request for LiteralRequest {
    fn value_kind(&self) -> ValueKind {
        self.value.kind()
    }

    fn caching_level(&self) -> CachingLevel {
        CachingLevel::None
    }

    fn uuid(&self) -> Option<&RequestUuid> {
        None
    }

    fn is_literal(&self) -> bool {
        true
    }

    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint.clone()
    }

    fn own_digest(&self) -> Result<crate::identity::RequestDigest, SerialError> {
        let mut builder = DigestBuilder::new();
        builder.update_value(&self.value);
        Ok(builder.finish())
    }

    // A literal argument contributes its encoded value, not a nested digest.
    fn update_digest(&self, builder: &mut DigestBuilder) -> Result<(), SerialError> {
        builder.update_value(&self.value);
        Ok(())
    }

    fn subrequests(&self) -> &[ErasedRequest] {
        &[]
    }

    fn resolve<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<Value, ResolveError>> {
        Box::pin(async move { Ok(self.value.clone()) })
    }

    fn to_serial(&self) -> Result<SerialNode, SerialError> {
        Ok(SerialNode::literal(&self.value))
    }
}
