//! Content identity for request trees.
//!
//! Two identities are derived from a request: a fast [`Fingerprint`] keying
//! the in-process memory cache, and a cryptographic [`RequestDigest`] keying
//! secondary storage. Fingerprints resolve hash collisions by structural
//! comparison; digests are SHA-256 over the UUID and the native encoding of
//! the arguments, stable across processes and builds.

mod digest;
mod fingerprint;

pub use digest::{DigestBuilder, RequestDigest};
pub use fingerprint::{ClassId, Fingerprint};
