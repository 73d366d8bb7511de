//! Remote dispatch: loopback, TCP transport, shared-file results.

use memograph::catalog::{SeriCatalog, SeriRegistry};
use memograph::config::{keys, Config};
use memograph::context::{
    AsyncStatus, Context, DomainRegistry, ExecutionMode, Resources, TestingDomain,
};
use memograph::remote::{serve, LoopbackProxy, ProxyRegistry, RemoteProxy, RemoteServer, TcpProxy};
use memograph::request::{
    serialize_request, CachingLevel, ErasedRequest, FunctionRequest, FunctionSpec, RequestUuid,
};
use memograph::resolve::{resolve, ResolveError};
use memograph::value::{Blob, Value, ValueKind};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn add_spec() -> Arc<FunctionSpec> {
    FunctionSpec::plain(ValueKind::Integer, |args: Vec<Value>| {
        match (&args[0], &args[1]) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
            _ => Err(ResolveError::Computation("expected integers".into())),
        }
    })
    .uuid(RequestUuid::new("add_v1").unwrap())
    .caching(CachingLevel::Memory)
    .build()
    .unwrap()
}

/// Server over fresh resources with `add_v1` registered; the catalog must
/// stay alive for the server's lifetime.
fn add_server(config: Config) -> (Arc<RemoteServer>, SeriCatalog) {
    let registry = SeriRegistry::new();
    let mut catalog = SeriCatalog::new_in(&registry);
    catalog.register_function(add_spec()).unwrap();

    let domains = DomainRegistry::new();
    domains.register(Arc::new(TestingDomain));
    let resources = Resources::new(config).unwrap();
    let server = RemoteServer::new(resources, domains, registry).unwrap();
    (server, catalog)
}

fn add_request(a: i64, b: i64) -> ErasedRequest {
    FunctionRequest::new(
        add_spec(),
        vec![ErasedRequest::literal(a), ErasedRequest::literal(b)],
    )
}

#[tokio::test]
async fn test_sync_round_trip_through_loopback() {
    let (server, _catalog) = add_server(Config::default());
    ProxyRegistry::global().register(Arc::new(LoopbackProxy::new("rt-sync", server)));

    let resources = Resources::new(Config::default()).unwrap();
    let ctx = Context::builder(resources)
        .remote("rt-sync", "testing")
        .build();

    let value = resolve(&ctx, &add_request(21, 21)).await.unwrap();
    assert_eq!(value, Value::Integer(42));
}

#[tokio::test]
async fn test_remote_transparency() {
    let (server, _catalog) = add_server(Config::default());
    ProxyRegistry::global().register(Arc::new(LoopbackProxy::new("rt-transparency", server)));

    let req = add_request(19, 23);

    let local_ctx = Context::builder(Resources::new(Config::default()).unwrap()).build();
    let local = resolve(&local_ctx, &req).await.unwrap();

    let remote_ctx = Context::builder(Resources::new(Config::default()).unwrap())
        .remote("rt-transparency", "testing")
        .build();
    let remote = resolve(&remote_ctx, &req).await.unwrap();

    assert_eq!(local, remote);
}

#[tokio::test]
async fn test_async_round_trip_through_loopback() {
    let (server, _catalog) = add_server(Config::default());
    ProxyRegistry::global().register(Arc::new(LoopbackProxy::new(
        "rt-async",
        Arc::clone(&server),
    )));

    let resources = Resources::new(Config::default()).unwrap();
    let ctx = Context::builder(resources)
        .remote("rt-async", "testing")
        .mode(ExecutionMode::Async)
        .build();

    let value = resolve(&ctx, &add_request(40, 2)).await.unwrap();
    assert_eq!(value, Value::Integer(42));
    // The dispatcher must have called finish_async.
    assert_eq!(server.run_count(), 0);
}

#[tokio::test]
async fn test_tcp_round_trip() {
    let (server, _catalog) = add_server(Config::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener, server).await;
    });

    let proxy = TcpProxy::connect("rt-tcp", addr).await.unwrap();
    assert_eq!(proxy.ping().await.unwrap(), memograph::VERSION);
    ProxyRegistry::global().register(Arc::new(proxy));

    let resources = Resources::new(Config::default()).unwrap();
    let ctx = Context::builder(resources)
        .remote("rt-tcp", "testing")
        .build();

    let value = resolve(&ctx, &add_request(20, 22)).await.unwrap();
    assert_eq!(value, Value::Integer(42));
}

#[tokio::test]
async fn test_large_result_travels_by_shared_file() {
    let mut config = Config::new();
    config.set(keys::RPCLIB_SHARED_BLOB_THRESHOLD, "64");
    let (server, _catalog) = {
        let registry = SeriRegistry::new();
        let mut catalog = SeriCatalog::new_in(&registry);
        let blob_spec = FunctionSpec::plain(ValueKind::Blob, |args: Vec<Value>| {
            match &args[0] {
                Value::Integer(n) => Ok(Value::Blob(Blob::from_bytes(vec![7u8; *n as usize]))),
                _ => Err(ResolveError::Computation("expected integer".into())),
            }
        })
        .uuid(RequestUuid::new("blob_v1").unwrap())
        .build()
        .unwrap();
        catalog.register_function(Arc::clone(&blob_spec)).unwrap();

        let domains = DomainRegistry::new();
        domains.register(Arc::new(TestingDomain));
        let resources = Resources::new(config).unwrap();
        (
            RemoteServer::new(resources, domains, registry).unwrap(),
            catalog,
        )
    };
    ProxyRegistry::global().register(Arc::new(LoopbackProxy::new("rt-blob", server)));

    let blob_spec = FunctionSpec::plain(ValueKind::Blob, |args: Vec<Value>| match &args[0] {
        Value::Integer(n) => Ok(Value::Blob(Blob::from_bytes(vec![7u8; *n as usize]))),
        _ => Err(ResolveError::Computation("expected integer".into())),
    })
    .uuid(RequestUuid::new("blob_v1").unwrap())
    .build()
    .unwrap();
    let req = FunctionRequest::new(blob_spec, vec![ErasedRequest::literal(1024)]);

    let resources = Resources::new(Config::default()).unwrap();
    let ctx = Context::builder(resources)
        .remote("rt-blob", "testing")
        .build();

    let value = resolve(&ctx, &req).await.unwrap();
    assert_eq!(value, Value::Blob(Blob::from_bytes(vec![7u8; 1024])));
}

#[tokio::test]
async fn test_sub_contexts_reflect_the_request_tree() {
    let registry = SeriRegistry::new();
    let mut catalog = SeriCatalog::new_in(&registry);
    catalog.register_function(add_spec()).unwrap();
    let sleep_spec =
        FunctionSpec::coroutine(ValueKind::Nil, |ctx: Context, _args: Vec<Value>| async move {
            ctx.schedule_after(Duration::from_millis(300)).await?;
            Ok(Value::Nil)
        })
        .uuid(RequestUuid::new("nap_v1").unwrap())
        .build()
        .unwrap();
    catalog.register_function(Arc::clone(&sleep_spec)).unwrap();

    let domains = DomainRegistry::new();
    domains.register(Arc::new(TestingDomain));
    let resources = Resources::new(Config::default()).unwrap();
    let server = RemoteServer::new(resources, domains, registry).unwrap();
    let proxy = LoopbackProxy::new("rt-subs", server);

    let gather = FunctionSpec::plain(ValueKind::Nil, |_args: Vec<Value>| Ok(Value::Nil))
        .uuid(RequestUuid::new("gather_v1").unwrap())
        .build()
        .unwrap();
    let napping = FunctionRequest::new(sleep_spec, vec![]);
    let req = FunctionRequest::new(gather, vec![napping, ErasedRequest::literal(5)]);

    let root = proxy
        .submit_async("testing", serialize_request(&req).unwrap())
        .await
        .unwrap();

    // Wait for the root to leave Created so the children query is valid.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let status = proxy.get_async_status(root).await.unwrap();
        if status != AsyncStatus::Created {
            break;
        }
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let children = proxy.get_sub_contexts(root).await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(children[0].1, "first child is a request node");
    assert!(!children[1].1, "second child is a value node");

    // Drain the run and release it.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = proxy.get_async_status(root).await.unwrap();
        if status == AsyncStatus::Finished {
            break;
        }
        assert!(Instant::now() < deadline, "stuck in {:?}", status);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    proxy.get_async_response(root).await.unwrap();
    proxy.finish_async(root).await.unwrap();
}

#[tokio::test]
async fn test_error_message_crosses_verbatim() {
    let registry = SeriRegistry::new();
    let mut catalog = SeriCatalog::new_in(&registry);
    let failing = FunctionSpec::plain(ValueKind::Nil, |_args: Vec<Value>| {
        Err(ResolveError::Computation("flux capacitor misaligned".into()))
    })
    .uuid(RequestUuid::new("fail_v1").unwrap())
    .build()
    .unwrap();
    catalog.register_function(failing).unwrap();

    let domains = DomainRegistry::new();
    domains.register(Arc::new(TestingDomain));
    let resources = Resources::new(Config::default()).unwrap();
    let server = RemoteServer::new(resources, domains, registry).unwrap();
    ProxyRegistry::global().register(Arc::new(LoopbackProxy::new("rt-error", server)));

    let req = catalog.construct("fail_v1", vec![]).unwrap();
    let ctx = Context::builder(Resources::new(Config::default()).unwrap())
        .remote("rt-error", "testing")
        .build();

    match resolve(&ctx, &req).await {
        Err(ResolveError::Remote(error)) => {
            assert!(error.to_string().contains("flux capacitor misaligned"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}
