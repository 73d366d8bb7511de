//! Cancellation across the async engine, locally and through a proxy.

use memograph::catalog::{SeriCatalog, SeriRegistry};
use memograph::config::Config;
use memograph::context::{
    AsyncStatus, Context, DomainRegistry, ExecutionMode, NodeKind, Resources, TestingDomain,
};
use memograph::remote::{LoopbackProxy, RemoteServer};
use memograph::request::{
    BackoffSchedule, ErasedRequest, FunctionRequest, FunctionSpec, RequestUuid,
};
use memograph::resolve::{resolve, ResolveError};
use memograph::value::{Value, ValueKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Coroutine that sleeps for the number of milliseconds in its argument.
fn sleep_spec(uuid: &str) -> Arc<FunctionSpec> {
    FunctionSpec::coroutine(ValueKind::Nil, |ctx: Context, args: Vec<Value>| async move {
        let millis = match &args[0] {
            Value::Integer(ms) => *ms as u64,
            _ => return Err(ResolveError::Computation("expected integer".into())),
        };
        ctx.schedule_after(Duration::from_millis(millis)).await?;
        Ok(Value::Nil)
    })
    .uuid(RequestUuid::new(uuid).unwrap())
    .build()
    .unwrap()
}

fn async_context() -> Context {
    Context::builder(Resources::new(Config::default()).unwrap())
        .mode(ExecutionMode::Async)
        .build()
}

#[tokio::test]
async fn test_local_cancellation_interrupts_a_sleeping_body() {
    let ctx = async_context();
    let req = FunctionRequest::new(
        sleep_spec("cancel/sleep@v1"),
        vec![ErasedRequest::literal(10_000)],
    );
    let rooted = ctx.prepare_async(&req);

    let task = {
        let rooted = rooted.clone();
        let req = req.clone();
        tokio::spawn(async move { resolve(&rooted, &req).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    rooted.request_cancellation();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(
        rooted.current_node().unwrap().status(),
        AsyncStatus::Cancelled
    );
}

#[tokio::test]
async fn test_cancellation_propagates_to_live_descendants() {
    let ctx = async_context();
    let sleep = sleep_spec("propagate/sleep@v1");
    let child = |ms: i64| FunctionRequest::new(sleep.clone(), vec![ErasedRequest::literal(ms)]);

    let gather = FunctionSpec::plain(ValueKind::Nil, |_args: Vec<Value>| Ok(Value::Nil))
        .uuid(RequestUuid::new("propagate/gather@v1").unwrap())
        .build()
        .unwrap();
    let req = FunctionRequest::new(gather, vec![child(10_000), child(10_000)]);
    let rooted = ctx.prepare_async(&req);

    let task = {
        let rooted = rooted.clone();
        let req = req.clone();
        tokio::spawn(async move { resolve(&rooted, &req).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    rooted.request_cancellation();
    assert!(task.await.unwrap().is_err());

    let tree = rooted.async_tree().unwrap();
    for id in tree.ids() {
        let node = tree.node(id).unwrap();
        if node.kind() == NodeKind::Request {
            assert_eq!(node.status(), AsyncStatus::Cancelled, "node {}", id);
        }
    }
}

#[tokio::test]
async fn test_timeout_composed_from_cancellation() {
    let ctx = async_context();
    let req = FunctionRequest::new(
        sleep_spec("timeout/sleep@v1"),
        vec![ErasedRequest::literal(10_000)],
    );
    let rooted = ctx.prepare_async(&req);

    let resolve_fut = resolve(&rooted, &req);
    tokio::pin!(resolve_fut);
    let result = tokio::select! {
        result = &mut resolve_fut => result,
        _ = tokio::time::sleep(Duration::from_millis(50)) => {
            rooted.request_cancellation();
            resolve_fut.await
        }
    };

    assert!(matches!(result, Err(ResolveError::Cancelled)));
}

#[tokio::test]
async fn test_retry_delay_is_cancellable() {
    let ctx = async_context();
    let spec = FunctionSpec::plain(ValueKind::Nil, |_args: Vec<Value>| {
        Err(ResolveError::Computation("always fails".into()))
    })
    .uuid(RequestUuid::new("cancel/retry@v1").unwrap())
    .retry(BackoffSchedule::new(vec![Duration::from_secs(60)]))
    .build()
    .unwrap();
    let req = FunctionRequest::new(spec, vec![]);
    let rooted = ctx.prepare_async(&req);

    let task = {
        let rooted = rooted.clone();
        let req = req.clone();
        tokio::spawn(async move { resolve(&rooted, &req).await })
    };

    // First attempt fails immediately; the resolver is now sleeping out a
    // one-minute retry delay. Cancellation must cut that short.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = Instant::now();
    rooted.request_cancellation();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_retry_delay_cancels_without_prepared_root() {
    // The plain resolve() entry point on an async context must root the
    // tree itself, and keep it across retry attempts: the body below
    // requests cancellation through its own context, and the one-minute
    // retry delay that follows has to abort on that signal.
    let ctx = async_context();
    let spec = FunctionSpec::coroutine(ValueKind::Nil, |ctx: Context, _args: Vec<Value>| async move {
        ctx.request_cancellation();
        Err(ResolveError::Computation("transient".into()))
    })
    .uuid(RequestUuid::new("cancel/self-retry@v1").unwrap())
    .retry(BackoffSchedule::new(vec![Duration::from_secs(60)]))
    .build()
    .unwrap();
    let req = FunctionRequest::new(spec, vec![]);

    let started = Instant::now();
    let result = resolve(&ctx, &req).await;
    assert!(matches!(result, Err(ResolveError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_remote_cancellation_round_trip() {
    let registry = SeriRegistry::new();
    let mut catalog = SeriCatalog::new_in(&registry);
    catalog
        .register_function(sleep_spec("remote-cancel/sleep@v1"))
        .unwrap();

    let domains = DomainRegistry::new();
    domains.register(Arc::new(TestingDomain));
    let resources = Resources::new(Config::default()).unwrap();
    let server = RemoteServer::new(resources, domains, registry).unwrap();
    let proxy = LoopbackProxy::new("cancel-loop", server.clone());

    use memograph::remote::RemoteProxy;
    use memograph::request::serialize_request;

    let req = FunctionRequest::new(
        sleep_spec("remote-cancel/sleep@v1"),
        vec![ErasedRequest::literal(10_000)],
    );
    let root = proxy
        .submit_async("testing", serialize_request(&req).unwrap())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    proxy.request_cancellation(root).await.unwrap();

    // The node reaches Cancelled shortly after its next suspension point.
    let deadline = Instant::now() + Duration::from_secs(2);
    let status = loop {
        let status = proxy.get_async_status(root).await.unwrap();
        if status.is_terminal() {
            break status;
        }
        assert!(Instant::now() < deadline, "stuck in {:?}", status);
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(status, AsyncStatus::Cancelled);

    // Mandatory cleanup succeeds even though the run was cancelled.
    proxy.finish_async(root).await.unwrap();
    assert_eq!(server.run_count(), 0);
    assert!(proxy.get_async_status(root).await.is_err());
}
