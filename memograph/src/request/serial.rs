//! Request serialization.
//!
//! The wire envelope is a [`SerialNode`] tree: each request node carries its
//! class uuid plus recursively serialized arguments, and each literal node
//! carries its native-encoded value. The envelope itself travels as
//! MessagePack. Deserialization reconstructs requests through the catalog
//! registry, so the uuid must be registered on both sides of the wire.

use crate::catalog::{CatalogError, SeriRegistry};
use crate::codec::{decode_value, encode_value, CodecError};
use crate::request::{ErasedRequest, LiteralRequest};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from converting requests to or from their wire form.
#[derive(Debug, Error, Clone)]
pub enum SerialError {
    /// The request's class has no serializable uuid.
    #[error("request '{0}' is not serializable")]
    NotSerializable(String),

    /// The request's class has no disk-cacheable uuid, so it has no digest.
    #[error("request '{0}' has no stable digest")]
    NotDigestible(String),

    /// A literal payload failed to encode or decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The uuid could not be resolved through the catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// The MessagePack envelope failed to read or write.
    #[error("envelope: {0}")]
    Envelope(String),
}

/// Self-describing serialization envelope for a request tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SerialNode {
    /// A literal value, carried in the native encoding.
    Literal { value: Vec<u8> },
    /// A function application: class uuid plus serialized arguments.
    Request { uuid: String, args: Vec<SerialNode> },
}

impl SerialNode {
    pub(crate) fn literal(value: &Value) -> Self {
        Self::Literal {
            value: encode_value(value),
        }
    }
}

/// Serializes a request tree to wire bytes.
pub fn serialize_request(request: &ErasedRequest) -> Result<Vec<u8>, SerialError> {
    let node = request.to_serial()?;
    rmp_serde::to_vec(&node).map_err(|e| SerialError::Envelope(e.to_string()))
}

/// Reconstructs a request tree from wire bytes through the catalog.
pub fn deserialize_request(
    bytes: &[u8],
    registry: &SeriRegistry,
) -> Result<ErasedRequest, SerialError> {
    let node: SerialNode =
        rmp_serde::from_slice(bytes).map_err(|e| SerialError::Envelope(e.to_string()))?;
    build_node(&node, registry)
}

fn build_node(node: &SerialNode, registry: &SeriRegistry) -> Result<ErasedRequest, SerialError> {
    match node {
        SerialNode::Literal { value } => {
            Ok(ErasedRequest::new(LiteralRequest::new(decode_value(value)?)))
        }
        SerialNode::Request { uuid, args } => {
            let constructor = registry.lookup(uuid)?;
            let args = args
                .iter()
                .map(|arg| build_node(arg, registry))
                .collect::<Result<Vec<_>, _>>()?;
            constructor(args).map_err(SerialError::from)
        }
    }
}
