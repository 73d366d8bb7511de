//! The dispatch core.

use crate::context::{AsyncTree, Context};
use crate::request::{CachingLevel, ErasedRequest, RetryDecision};
use crate::resolve::{ResolveError, ResolveOptions};
use crate::value::Value;
use tracing::debug;

/// Resolves a request in a context, dispatching on context state.
pub async fn resolve(ctx: &Context, request: &ErasedRequest) -> Result<Value, ResolveError> {
    resolve_with(ctx, request, ResolveOptions::default()).await
}

/// Resolves a request with call-site constraints pinned.
pub async fn resolve_with(
    ctx: &Context,
    request: &ErasedRequest,
    options: ResolveOptions,
) -> Result<Value, ResolveError> {
    options.validate(ctx, request)?;
    if request.retry_policy().is_some() {
        resolve_with_retry(ctx, request, options).await
    } else {
        resolve_one_try(ctx, request, options).await
    }
}

/// Retry wrapper: on failure, the request's policy chooses a (cancellable)
/// delay or propagation. Cancellation is never offered for retry.
async fn resolve_with_retry(
    ctx: &Context,
    request: &ErasedRequest,
    options: ResolveOptions,
) -> Result<Value, ResolveError> {
    // Root the async tree once, before the first attempt, so every attempt
    // and every retry delay shares it; cancellation then reaches the delay
    // between attempts as well as the attempts themselves.
    let prepared;
    let ctx = if wants_async(ctx, options) && ctx.current_node().is_none() {
        prepared = ctx.prepare_async(request);
        &prepared
    } else {
        ctx
    };

    let mut attempt: u32 = 0;
    loop {
        match resolve_one_try(ctx, request, options).await {
            Ok(value) => return Ok(value),
            Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
            Err(error) => {
                let Some(policy) = request.retry_policy() else {
                    return Err(error);
                };
                match policy.handle_exception(attempt, &error) {
                    RetryDecision::RetryAfter(delay) => {
                        debug!(attempt, ?delay, %error, "retrying after failure");
                        ctx.schedule_after(delay).await?;
                        attempt += 1;
                    }
                    RetryDecision::Propagate => return Err(error),
                }
            }
        }
    }
}

fn wants_async(ctx: &Context, options: ResolveOptions) -> bool {
    !options.force_sync && (options.force_async || ctx.is_async())
}

async fn resolve_one_try(
    ctx: &Context,
    request: &ErasedRequest,
    options: ResolveOptions,
) -> Result<Value, ResolveError> {
    // First decision: remotely or locally. A proxy request always
    // dispatches remotely.
    let remotely =
        request.is_proxy() || options.force_remote || (!options.force_local && ctx.remotely());
    if remotely {
        return crate::remote::resolve_remote(ctx, request).await;
    }

    // Async bootstrap at the root: build the node tree mirroring the
    // request tree. Retryable requests arrive already rooted.
    if wants_async(ctx, options) && ctx.current_node().is_none() {
        let tree = AsyncTree::build(request);
        let rooted = ctx.with_tree(tree);
        return resolve_sub(&rooted, request).await;
    }

    resolve_sub(ctx, request).await
}

/// Resolves a request (root or subrequest) past the remote/async decisions:
/// cached through the memory cache, or directly.
pub(crate) async fn resolve_sub(
    ctx: &Context,
    request: &ErasedRequest,
) -> Result<Value, ResolveError> {
    if request.caching_level() == CachingLevel::None {
        return resolve_direct(ctx, request).await;
    }

    let key = request.fingerprint();
    let factory_ctx = ctx.clone();
    let factory_req = request.clone();
    let handle = ctx.resources().memory_cache().get_or_create(&key, move || {
        Box::pin(async move {
            crate::cache::resolve_secondary_cached(&factory_ctx, &factory_req).await
        })
    });

    let result = if request.introspective() {
        let title = request.introspection_title().unwrap_or("request").to_string();
        match ctx.tasklets() {
            Some(tracker) => {
                let tasklet = tracker.spawn(title);
                tasklet.before_await("memory cache");
                let result = handle.value().await;
                tasklet.after_await();
                result
            }
            None => handle.value().await,
        }
    } else {
        handle.value().await
    };

    // A cache hit can take a node straight from Created to Finished; when
    // the factory ran in this node's context the transition is a no-op.
    match &result {
        Ok(_) => ctx.mark_finished(),
        Err(ResolveError::Cancelled) => ctx.mark_cancelled(),
        Err(error) => ctx.mark_error(&error.to_string()),
    }
    // The handle drops here, releasing the record to the eviction list once
    // no other holder pins it.
    result
}

/// Invokes the request's own resolve logic, recording the outcome on the
/// async node.
pub(crate) async fn resolve_direct(
    ctx: &Context,
    request: &ErasedRequest,
) -> Result<Value, ResolveError> {
    let result = match (request.introspective(), ctx.tasklets()) {
        (true, Some(tracker)) => {
            let title = request.introspection_title().unwrap_or("request").to_string();
            let tasklet = tracker.spawn(title);
            tasklet.before_await("call");
            let result = request.resolve(ctx).await;
            tasklet.after_await();
            result
        }
        _ => request.resolve(ctx).await,
    };
    match &result {
        Ok(_) => ctx.mark_finished(),
        Err(ResolveError::Cancelled) => ctx.mark_cancelled(),
        Err(error) => ctx.mark_error(&error.to_string()),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::{ExecutionMode, Resources};
    use crate::request::{
        BackoffSchedule, FunctionRequest, FunctionSpec, RequestUuid,
    };
    use crate::value::ValueKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn local_ctx() -> Context {
        Context::builder(Resources::new(Config::default()).unwrap()).build()
    }

    fn add_request(calls: Arc<AtomicU32>, a: ErasedRequest, b: ErasedRequest) -> ErasedRequest {
        let spec = FunctionSpec::plain(ValueKind::Integer, move |args: Vec<Value>| {
            calls.fetch_add(1, Ordering::SeqCst);
            match (&args[0], &args[1]) {
                (Value::Integer(x), Value::Integer(y)) => Ok(Value::Integer(x + y)),
                _ => Err(ResolveError::Computation("expected integers".into())),
            }
        })
        .uuid(RequestUuid::new("resolver/add@v1").unwrap())
        .caching(CachingLevel::Memory)
        .build()
        .unwrap();
        FunctionRequest::new(spec, vec![a, b])
    }

    #[tokio::test]
    async fn test_literal_resolves_to_its_value() {
        let ctx = local_ctx();
        let value = resolve(&ctx, &ErasedRequest::literal("hello")).await.unwrap();
        assert_eq!(value, Value::from("hello"));
    }

    #[tokio::test]
    async fn test_function_over_literals() {
        let ctx = local_ctx();
        let calls = Arc::new(AtomicU32::new(0));
        let req = add_request(
            Arc::clone(&calls),
            ErasedRequest::literal(2),
            ErasedRequest::literal(3),
        );

        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Memoized: a second resolution does not re-run the body.
        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_nested_composition() {
        let ctx = local_ctx();
        let calls = Arc::new(AtomicU32::new(0));
        let inner = add_request(
            Arc::clone(&calls),
            ErasedRequest::literal(2),
            ErasedRequest::literal(3),
        );
        let outer = add_request(Arc::clone(&calls), inner, ErasedRequest::literal(10));

        assert_eq!(resolve(&ctx, &outer).await.unwrap(), Value::Integer(15));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_async_mode_builds_node_tree_and_finishes() {
        let resources = Resources::new(Config::default()).unwrap();
        let ctx = Context::builder(resources)
            .mode(ExecutionMode::Async)
            .build();
        let calls = Arc::new(AtomicU32::new(0));
        let req = add_request(
            calls,
            ErasedRequest::literal(1),
            ErasedRequest::literal(2),
        );

        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(3));
    }

    #[tokio::test]
    async fn test_computation_error_propagates() {
        let ctx = local_ctx();
        let spec = FunctionSpec::plain(ValueKind::Nil, |_args: Vec<Value>| {
            Err(ResolveError::Computation("deliberate".into()))
        })
        .build()
        .unwrap();
        let req = FunctionRequest::new(spec, vec![]);

        match resolve(&ctx, &req).await {
            Err(ResolveError::Computation(msg)) => assert_eq!(msg, "deliberate"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_schedule_is_honored() {
        let ctx = local_ctx();
        let calls = Arc::new(AtomicU32::new(0));
        let body_calls = Arc::clone(&calls);
        let spec = FunctionSpec::plain(ValueKind::Nil, move |_args: Vec<Value>| {
            body_calls.fetch_add(1, Ordering::SeqCst);
            Err(ResolveError::Computation("always fails".into()))
        })
        .retry(BackoffSchedule::new(vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(4),
        ]))
        .build()
        .unwrap();
        let req = FunctionRequest::new(spec, vec![]);

        let result = resolve(&ctx, &req).await;
        assert!(matches!(result, Err(ResolveError::Computation(_))));
        // Three delays mean exactly four invocations.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        let ctx = local_ctx();
        let calls = Arc::new(AtomicU32::new(0));
        let body_calls = Arc::clone(&calls);
        let spec = FunctionSpec::plain(ValueKind::Integer, move |_args: Vec<Value>| {
            if body_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ResolveError::Computation("transient".into()))
            } else {
                Ok(Value::Integer(7))
            }
        })
        .retry(BackoffSchedule::new(vec![
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
        ]))
        .build()
        .unwrap();
        let req = FunctionRequest::new(spec, vec![]);

        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_uncached_request_reruns() {
        let ctx = local_ctx();
        let calls = Arc::new(AtomicU32::new(0));
        let body_calls = Arc::clone(&calls);
        let spec = FunctionSpec::plain(ValueKind::Integer, move |_args: Vec<Value>| {
            Ok(Value::Integer(
                body_calls.fetch_add(1, Ordering::SeqCst) as i64
            ))
        })
        .build()
        .unwrap();
        let req = FunctionRequest::new(spec, vec![]);

        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(0));
        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Integer(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_coroutine_body_receives_context() {
        let ctx = local_ctx();
        let spec = FunctionSpec::coroutine(ValueKind::Boolean, |ctx: Context, _args| async move {
            Ok(Value::Boolean(!ctx.is_async()))
        })
        .build()
        .unwrap();
        let req = FunctionRequest::new(spec, vec![]);

        assert_eq!(resolve(&ctx, &req).await.unwrap(), Value::Boolean(true));
        assert!(req.is_coroutine());
    }
}
