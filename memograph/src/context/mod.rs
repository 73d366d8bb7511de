//! The runtime context passed through resolution.
//!
//! A [`Context`] carries the capability facets a resolution consults:
//! shared [`Resources`], remote/local and sync/async mode flags, optional
//! tasklet introspection, and — in async mode — the current node of an
//! [`AsyncTree`] that mirrors the request tree and drives cancellation.

mod async_tree;
mod core;
mod domain;
mod resources;
mod tasklet;

pub use self::core::{Context, ContextBuilder, ExecutionMode, RemoteSpec};
pub use async_tree::{AsyncId, AsyncNode, AsyncStatus, AsyncTree, NodeKind};
pub use domain::{Domain, DomainError, DomainRegistry, TestingDomain};
pub use resources::{ResourceError, Resources};
pub use tasklet::{Tasklet, TaskletEvent, TaskletTracker, TaskletWhat};
