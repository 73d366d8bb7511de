//! The polymorphic request model.
//!
//! A request is a node in a computation graph: leaves are literal values,
//! interior nodes apply named functions to subrequests. Requests are
//! composed type-erased behind the [`Request`] trait and shared through
//! [`ErasedRequest`] handles, which is what allows heterogeneous argument
//! types under one parent and serialization through the catalog.

mod function;
mod literal;
mod proxy;
mod serial;

pub use function::{FunctionBody, FunctionRequest, FunctionSpec, FunctionSpecBuilder};
pub use literal::LiteralRequest;
pub use proxy::ProxyRequest;
pub use serial::{deserialize_request, serialize_request, SerialError, SerialNode};

use crate::context::Context;
use crate::identity::{DigestBuilder, Fingerprint};
use crate::resolve::ResolveError;
use crate::value::{Value, ValueKind};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Boxed future type used by dyn-compatible async interfaces.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which cache tiers participate in resolving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CachingLevel {
    /// Always recomputed.
    None,
    /// Memoized in the in-process memory cache.
    Memory,
    /// Memory cache plus secondary storage, keyed by the request digest.
    Full,
}

/// Errors raised while declaring or composing requests.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request uuid must not be empty")]
    EmptyUuid,

    #[error("introspection title must not be empty")]
    EmptyTitle,

    #[error("full caching requires a disk-cacheable uuid (request '{0}')")]
    FullCachingNeedsUuid(String),
}

/// Stable textual identifier for a request class.
///
/// The declarations control what the class may be used for: a serializable
/// uuid can cross processes, a disk-cacheable uuid can key secondary
/// storage. A uuid that is neither still provides stable in-process
/// identity.
#[derive(Clone, Debug)]
pub struct RequestUuid {
    text: Arc<str>,
    serializable: bool,
    disk_cacheable: bool,
}

impl RequestUuid {
    /// Declares a uuid that is both serializable and disk-cacheable.
    pub fn new(text: impl Into<Arc<str>>) -> Result<Self, RequestError> {
        let text = text.into();
        if text.is_empty() {
            return Err(RequestError::EmptyUuid);
        }
        Ok(Self {
            text,
            serializable: true,
            disk_cacheable: true,
        })
    }

    /// Restricts the uuid to in-process use.
    pub fn memory_only(mut self) -> Self {
        self.serializable = false;
        self.disk_cacheable = false;
        self
    }

    pub fn with_serializable(mut self, serializable: bool) -> Self {
        self.serializable = serializable;
        self
    }

    pub fn with_disk_cacheable(mut self, disk_cacheable: bool) -> Self {
        self.disk_cacheable = disk_cacheable;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    pub fn is_disk_cacheable(&self) -> bool {
        self.disk_cacheable
    }
}

impl fmt::Display for RequestUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Outcome of consulting a request's retry policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the delay (cancellable), then retry the request.
    RetryAfter(Duration),
    /// Give up; the error propagates as a computation error.
    Propagate,
}

/// Retry declaration attached to a request class.
///
/// Consulted once per failed attempt; cancellation is never offered.
pub trait RetryPolicy: Send + Sync + 'static {
    fn handle_exception(&self, attempt: u32, error: &ResolveError) -> RetryDecision;
}

/// Retry policy backed by a fixed schedule of delays.
///
/// Attempt `n` retries after `delays[n]`; once the schedule is exhausted
/// the error propagates.
pub struct BackoffSchedule {
    delays: Vec<Duration>,
}

impl BackoffSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }
}

impl RetryPolicy for BackoffSchedule {
    fn handle_exception(&self, attempt: u32, _error: &ResolveError) -> RetryDecision {
        match self.delays.get(attempt as usize) {
            Some(delay) => RetryDecision::RetryAfter(*delay),
            None => RetryDecision::Propagate,
        }
    }
}

/// The capability set every request exposes, type-erased.
///
/// Implementations are immutable once constructed; all state lives in the
/// context and caches.
pub trait Request: Send + Sync + 'static {
    /// Kind of value this request resolves to.
    fn value_kind(&self) -> ValueKind;

    /// Which cache tiers participate.
    fn caching_level(&self) -> CachingLevel;

    /// The class uuid, if one was declared.
    fn uuid(&self) -> Option<&RequestUuid>;

    /// Whether awaits on this request are tracked by the tasklet sink.
    fn introspective(&self) -> bool {
        false
    }

    /// Human-readable title, present iff introspective.
    fn introspection_title(&self) -> Option<&str> {
        None
    }

    /// Whether the body receives the context at invocation.
    fn is_coroutine(&self) -> bool {
        false
    }

    /// Whether the body exists only on a remote; such requests always
    /// dispatch remotely.
    fn is_proxy(&self) -> bool {
        false
    }

    /// Whether this is a literal value leaf.
    fn is_literal(&self) -> bool {
        false
    }

    /// Retry declaration, if the request is retryable.
    fn retry_policy(&self) -> Option<&dyn RetryPolicy> {
        None
    }

    /// Content-derived identity; the memory-cache key.
    fn fingerprint(&self) -> Fingerprint;

    /// This request's own digest: SHA-256 over the class uuid and the
    /// arguments.
    ///
    /// Fails for requests whose class has no disk-cacheable uuid.
    fn own_digest(&self) -> Result<crate::identity::RequestDigest, SerialError>;

    /// Folds this request into a parent's digest computation.
    ///
    /// Subrequests contribute their own digest; literals override this to
    /// contribute their encoded value directly.
    fn update_digest(&self, builder: &mut DigestBuilder) -> Result<(), SerialError> {
        builder.update_digest(&self.own_digest()?);
        Ok(())
    }

    /// The argument subrequests, in order.
    fn subrequests(&self) -> &[ErasedRequest];

    /// Runs the request's own logic, recursively resolving subrequests
    /// through the context.
    fn resolve<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Value, ResolveError>>;

    /// Converts to the serialization envelope.
    ///
    /// Fails for requests whose class has no serializable uuid.
    fn to_serial(&self) -> Result<SerialNode, SerialError>;
}

/// Shared handle to a type-erased request.
#[derive(Clone)]
pub struct ErasedRequest(Arc<dyn Request>);

impl ErasedRequest {
    pub fn new(request: impl Request) -> Self {
        Self(Arc::new(request))
    }

    /// Wraps a value as a literal request.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::new(LiteralRequest::new(value.into()))
    }

    /// Computes the digest of this request tree, the secondary-storage key.
    pub fn digest(&self) -> Result<crate::identity::RequestDigest, SerialError> {
        self.own_digest()
    }
}

impl std::ops::Deref for ErasedRequest {
    type Target = dyn Request;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl fmt::Debug for ErasedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uuid() {
            Some(uuid) => write!(f, "ErasedRequest({})", uuid),
            None => write!(f, "ErasedRequest({:?})", self.fingerprint()),
        }
    }
}
