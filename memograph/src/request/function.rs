//! Function requests.
//!
//! A [`FunctionSpec`] declares a request class once (identity, caching
//! level, body); [`FunctionRequest`] applies it to argument subrequests.
//! Specs are shared, so every application of the same class carries the
//! same declarations.

use crate::context::Context;
use crate::identity::{ClassId, DigestBuilder, Fingerprint, RequestDigest};
use crate::request::{
    BoxFuture, CachingLevel, ErasedRequest, Request, RequestError, RequestUuid, RetryPolicy,
    SerialError, SerialNode,
};
use crate::resolve::ResolveError;
use crate::value::{Value, ValueKind};
use std::any::TypeId;
use std::future::Future;
use std::sync::Arc;

/// The executable body of a function request class.
pub enum FunctionBody {
    /// Pure function over resolved argument values.
    Plain(Arc<dyn Fn(Vec<Value>) -> Result<Value, ResolveError> + Send + Sync>),
    /// Coroutine receiving the context; may suspend.
    Coroutine(
        Arc<
            dyn Fn(Context, Vec<Value>) -> BoxFuture<'static, Result<Value, ResolveError>>
                + Send
                + Sync,
        >,
    ),
}

/// Immutable declaration of a function request class.
pub struct FunctionSpec {
    uuid: Option<RequestUuid>,
    title: Option<String>,
    caching: CachingLevel,
    value_kind: ValueKind,
    retry: Option<Arc<dyn RetryPolicy>>,
    class: ClassId,
    body: FunctionBody,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("uuid", &self.uuid)
            .field("title", &self.title)
            .field("caching", &self.caching)
            .field("value_kind", &self.value_kind)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

impl FunctionSpec {
    /// Starts a builder for a plain function class.
    ///
    /// Without a uuid, the class identity is the function's host type
    /// identity: memory caching only, intra-process.
    pub fn plain<F>(value_kind: ValueKind, f: F) -> FunctionSpecBuilder
    where
        F: Fn(Vec<Value>) -> Result<Value, ResolveError> + Send + Sync + 'static,
    {
        FunctionSpecBuilder::new(
            value_kind,
            ClassId::Native(TypeId::of::<F>()),
            FunctionBody::Plain(Arc::new(f)),
        )
    }

    /// Starts a builder for a coroutine function class.
    pub fn coroutine<F, Fut>(value_kind: ValueKind, f: F) -> FunctionSpecBuilder
    where
        F: Fn(Context, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ResolveError>> + Send + 'static,
    {
        FunctionSpecBuilder::new(
            value_kind,
            ClassId::Native(TypeId::of::<F>()),
            FunctionBody::Coroutine(Arc::new(move |ctx, args| Box::pin(f(ctx, args)))),
        )
    }

    pub fn uuid(&self) -> Option<&RequestUuid> {
        self.uuid.as_ref()
    }

    pub(crate) fn body(&self) -> &FunctionBody {
        &self.body
    }
}

/// Builder for [`FunctionSpec`]; validation happens in [`build`].
///
/// [`build`]: FunctionSpecBuilder::build
pub struct FunctionSpecBuilder {
    uuid: Option<RequestUuid>,
    title: Option<String>,
    caching: CachingLevel,
    value_kind: ValueKind,
    retry: Option<Arc<dyn RetryPolicy>>,
    class: ClassId,
    body: FunctionBody,
}

impl FunctionSpecBuilder {
    fn new(value_kind: ValueKind, class: ClassId, body: FunctionBody) -> Self {
        Self {
            uuid: None,
            title: None,
            caching: CachingLevel::None,
            value_kind,
            retry: None,
            class,
            body,
        }
    }

    /// Declares the class uuid; replaces the host type identity.
    pub fn uuid(mut self, uuid: RequestUuid) -> Self {
        self.class = ClassId::Uuid(uuid.text().clone());
        self.uuid = Some(uuid);
        self
    }

    /// Declares an introspection title; makes the class introspective.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn caching(mut self, caching: CachingLevel) -> Self {
        self.caching = caching;
        self
    }

    pub fn retry(mut self, policy: impl RetryPolicy) -> Self {
        self.retry = Some(Arc::new(policy));
        self
    }

    /// Validates the declarations and produces the shared spec.
    pub fn build(self) -> Result<Arc<FunctionSpec>, RequestError> {
        if matches!(&self.title, Some(t) if t.is_empty()) {
            return Err(RequestError::EmptyTitle);
        }
        if self.caching == CachingLevel::Full {
            match &self.uuid {
                Some(uuid) if uuid.is_disk_cacheable() => {}
                Some(uuid) => {
                    return Err(RequestError::FullCachingNeedsUuid(uuid.as_str().to_string()))
                }
                None => {
                    return Err(RequestError::FullCachingNeedsUuid("<no uuid>".to_string()))
                }
            }
        }
        Ok(Arc::new(FunctionSpec {
            uuid: self.uuid,
            title: self.title,
            caching: self.caching,
            value_kind: self.value_kind,
            retry: self.retry,
            class: self.class,
            body: self.body,
        }))
    }
}

/// Application of a function class to argument subrequests.
pub struct FunctionRequest {
    spec: Arc<FunctionSpec>,
    args: Vec<ErasedRequest>,
    fingerprint: Fingerprint,
}

impl FunctionRequest {
    /// Applies `spec` to `args`, producing an erased request.
    pub fn new(spec: Arc<FunctionSpec>, args: Vec<ErasedRequest>) -> ErasedRequest {
        let fingerprint = Fingerprint::of_class(
            spec.class.clone(),
            args.iter().map(|arg| arg.fingerprint()).collect(),
        );
        ErasedRequest::new(Self {
            spec,
            args,
            fingerprint,
        })
    }
}

impl Request for FunctionRequest {
    fn value_kind(&self) -> ValueKind {
        self.spec.value_kind
    }

    fn caching_level(&self) -> CachingLevel {
        self.spec.caching
    }

    fn uuid(&self) -> Option<&RequestUuid> {
        self.spec.uuid.as_ref()
    }

    fn introspective(&self) -> bool {
        self.spec.title.is_some()
    }

    fn introspection_title(&self) -> Option<&str> {
        self.spec.title.as_deref()
    }

    fn is_coroutine(&self) -> bool {
        matches!(self.spec.body, FunctionBody::Coroutine(_))
    }

    fn retry_policy(&self) -> Option<&dyn RetryPolicy> {
        self.spec.retry.as_deref()
    }

    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint.clone()
    }

    fn own_digest(&self) -> Result<RequestDigest, SerialError> {
        let uuid = match &self.spec.uuid {
            Some(uuid) if uuid.is_disk_cacheable() => uuid,
            _ => {
                return Err(SerialError::NotDigestible(
                    self.spec
                        .uuid
                        .as_ref()
                        .map(|u| u.as_str().to_string())
                        .unwrap_or_else(|| "<no uuid>".to_string()),
                ))
            }
        };
        let mut builder = DigestBuilder::new();
        builder.update_uuid(uuid.as_str());
        for arg in &self.args {
            arg.update_digest(&mut builder)?;
        }
        Ok(builder.finish())
    }

    fn subrequests(&self) -> &[ErasedRequest] {
        &self.args
    }

    fn resolve<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<Value, ResolveError>> {
        Box::pin(async move {
            ctx.throw_if_cancelled()?;
            ctx.mark_subs_running();
            // Launch every subrequest before awaiting the first so they
            // resolve concurrently; identical subrequests still share one
            // computation through the memory cache. Every subrequest runs
            // to its own terminal state before the first error surfaces,
            // so no node is left mid-flight.
            let arg_futures = self.args.iter().enumerate().map(|(index, arg)| {
                let sub_ctx = ctx.subcontext(index);
                async move { crate::resolve::resolve_sub(&sub_ctx, arg).await }
            });
            let results = futures::future::join_all(arg_futures).await;
            let mut values = Vec::with_capacity(results.len());
            for result in results {
                values.push(result?);
            }
            ctx.throw_if_cancelled()?;
            ctx.mark_self_running();
            match &self.spec.body {
                FunctionBody::Plain(f) => f(values),
                FunctionBody::Coroutine(f) => f(ctx.clone(), values).await,
            }
        })
    }

    fn to_serial(&self) -> Result<SerialNode, SerialError> {
        let uuid = match &self.spec.uuid {
            Some(uuid) if uuid.is_serializable() => uuid,
            Some(uuid) => {
                return Err(SerialError::NotSerializable(uuid.as_str().to_string()))
            }
            None => return Err(SerialError::NotSerializable("<no uuid>".to_string())),
        };
        Ok(SerialNode::Request {
            uuid: uuid.as_str().to_string(),
            args: self
                .args
                .iter()
                .map(|arg| arg.to_serial())
                .collect::<Result<_, _>>()?,
        })
    }
}
