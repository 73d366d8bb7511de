//! Dynamic values produced and consumed by request resolution.
//!
//! A [`Value`] is the self-describing result type every request resolves to.
//! [`Blob`] carries opaque byte payloads with shared ownership of the backing
//! storage, which may be an in-process allocation or a memory-mapped file
//! created for cross-process result sharing.

mod blob;
mod types;

pub use blob::Blob;
pub use types::{Value, ValueKind};
