//! Memograph — a compute-caching runtime.
//!
//! Clients build composable request graphs — literal leaves, named
//! function nodes — and resolve them through a [`Context`]. Results are
//! memoized at two levels: a content-addressed in-process memory cache
//! with single-flight computation per fingerprint, and an optional
//! secondary blob store keyed by a cryptographic request digest.
//! Resolution can run synchronously or as a cancellable async tree, and
//! can be dispatched to a remote worker over the bundled frame protocol.
//!
//! # Quick start
//!
//! ```ignore
//! use memograph::config::Config;
//! use memograph::context::{Context, Resources};
//! use memograph::request::{CachingLevel, ErasedRequest, FunctionRequest, FunctionSpec, RequestUuid};
//! use memograph::resolve::resolve;
//! use memograph::value::{Value, ValueKind};
//!
//! let resources = Resources::new(Config::default())?;
//! let ctx = Context::builder(resources).build();
//!
//! let add = FunctionSpec::plain(ValueKind::Integer, |args: Vec<Value>| {
//!     match (&args[0], &args[1]) {
//!         (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
//!         _ => Err(memograph::resolve::ResolveError::Computation("expected integers".into())),
//!     }
//! })
//! .uuid(RequestUuid::new("add@v1")?)
//! .caching(CachingLevel::Memory)
//! .build()?;
//!
//! let req = FunctionRequest::new(add, vec![ErasedRequest::literal(2), ErasedRequest::literal(3)]);
//! let value = resolve(&ctx, &req).await?;
//! ```
//!
//! [`Context`]: context::Context

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod context;
pub mod identity;
pub mod logging;
pub mod remote;
pub mod request;
pub mod resolve;
pub mod value;

/// Version of the memograph library and CLI.
///
/// Synchronized across all workspace components; injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
