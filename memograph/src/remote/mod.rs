//! Remote dispatch.
//!
//! A [`RemoteProxy`] is the client-side handle to one remote resolver; the
//! [`RemoteServer`] is the matching server side, reachable in-process
//! through [`LoopbackProxy`] or over TCP through [`TcpProxy`] and
//! [`serve`]. The wire carries length-delimited MessagePack frames of
//! [`RpcRequest`]/[`RpcResponse`] messages.

mod client;
mod dispatch;
mod loopback;
mod messages;
mod proxy;
mod registry;
mod server;

pub use client::TcpProxy;
pub use loopback::LoopbackProxy;
pub use messages::{RpcRequest, RpcResponse};
pub use proxy::{RemoteProxy, RemoteError, ResultPayload, SerializedResult};
pub use registry::ProxyRegistry;
pub use server::{serve, RemoteServer};

pub(crate) use dispatch::resolve_remote;
