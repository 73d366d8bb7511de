//! Cryptographic request digests.

use crate::codec::encode_value;
use crate::value::Value;
use sha2::{Digest as _, Sha256};
use std::fmt;

/// SHA-256 content digest of a request, used as the secondary-storage key.
///
/// Stable across processes and builds: the input is the request UUID
/// followed by the native encoding of each argument (subrequest arguments
/// contribute their own digest).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestDigest([u8; 32]);

impl RequestDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering, used as the storage key string.
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl fmt::Debug for RequestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestDigest({})", self.to_hex())
    }
}

impl fmt::Display for RequestDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Incremental digest construction, driven by the request tree walk.
#[derive(Default)]
pub struct DigestBuilder {
    hasher: Sha256,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds the request class UUID into the digest.
    pub fn update_uuid(&mut self, uuid: &str) {
        self.hasher.update(uuid.as_bytes());
    }

    /// Folds a literal argument's native encoding into the digest.
    pub fn update_value(&mut self, value: &Value) {
        self.hasher.update(encode_value(value));
    }

    /// Folds a subrequest argument's digest into this digest.
    pub fn update_digest(&mut self, digest: &RequestDigest) {
        self.hasher.update(digest.as_bytes());
    }

    pub fn finish(self) -> RequestDigest {
        RequestDigest(self.hasher.finalize().into())
    }
}
