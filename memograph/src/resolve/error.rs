//! The resolution error type.

use crate::catalog::CatalogError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::remote::RemoteError;
use crate::request::SerialError;
use crate::value::ValueKind;
use thiserror::Error;

/// Errors surfaced from resolving a request.
///
/// Cloneable so that one failure recorded on a cache record can be
/// observed by every concurrent waiter.
#[derive(Debug, Error, Clone)]
pub enum ResolveError {
    /// The resolution was cancelled; distinguished from computation errors
    /// and never retried.
    #[error("cancelled")]
    Cancelled,

    /// A request body failed.
    #[error("computation failed: {0}")]
    Computation(String),

    /// An argument value had an unexpected kind; raised by request bodies.
    #[error("argument {index}: expected {expected}, got {actual}")]
    ArgumentKind {
        index: usize,
        expected: ValueKind,
        actual: ValueKind,
    },

    /// Catalog lookup failed (unregistered uuid, conflicting registration).
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Value encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Request serialization failed.
    #[error(transparent)]
    Serial(#[from] SerialError),

    /// Communication with a remote, or a remote-side failure.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Bad configuration discovered at resolution time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested combination of constraints cannot be satisfied.
    #[error("invalid resolution constraints: {0}")]
    InvalidConstraints(String),

    /// The operation is not available in this configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl ResolveError {
    /// Helper for request bodies checking an argument's kind.
    pub fn expect_kind(
        index: usize,
        expected: ValueKind,
        value: &crate::value::Value,
    ) -> Result<(), ResolveError> {
        if value.kind() == expected {
            Ok(())
        } else {
            Err(ResolveError::ArgumentKind {
                index,
                expected,
                actual: value.kind(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_expect_kind() {
        assert!(ResolveError::expect_kind(0, ValueKind::Integer, &Value::Integer(1)).is_ok());
        let err =
            ResolveError::expect_kind(1, ValueKind::String, &Value::Integer(1)).unwrap_err();
        assert!(matches!(
            err,
            ResolveError::ArgumentKind {
                index: 1,
                expected: ValueKind::String,
                actual: ValueKind::Integer,
            }
        ));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = ResolveError::Computation("x".into());
        let clone = err.clone();
        assert_eq!(err.to_string(), clone.to_string());
    }
}
