//! Wire messages for the remote transport.

use crate::context::{AsyncId, AsyncStatus};
use crate::remote::proxy::{RemoteError, SerializedResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Request messages a client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Liveness check.
    Ping,
    /// Blocking resolution of a serialized request.
    ResolveSync { domain: String, seri_req: Vec<u8> },
    /// Enqueue an async resolution.
    SubmitAsync { domain: String, seri_req: Vec<u8> },
    /// Children of a node.
    GetSubContexts { aid: AsyncId },
    /// Status of a node.
    GetAsyncStatus { aid: AsyncId },
    /// Error message of a node in `Error` status.
    GetAsyncErrorMessage { aid: AsyncId },
    /// Result of a finished run.
    GetAsyncResponse { root_aid: AsyncId },
    /// Cancel a node's subtree.
    RequestCancellation { aid: AsyncId },
    /// Release server-side state for a run.
    FinishAsync { root_aid: AsyncId },
    /// Confirm receipt of a shared-file result.
    AckResponse { path: PathBuf },
    /// Install a canned HTTP response (testing only).
    MockHttp { url: String, body: Vec<u8> },
}

/// Response messages a server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    Pong { version: String },
    Result(SerializedResult),
    Submitted { root_aid: AsyncId },
    SubContexts(Vec<(AsyncId, bool)>),
    Status(AsyncStatus),
    ErrorMessage(String),
    Ack,
    /// Any failure; the message crosses the wire verbatim.
    Error { message: String },
}

pub(crate) fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, RemoteError> {
    rmp_serde::to_vec(request).map_err(|e| RemoteError::Protocol(e.to_string()))
}

pub(crate) fn decode_request(bytes: &[u8]) -> Result<RpcRequest, RemoteError> {
    rmp_serde::from_slice(bytes).map_err(|e| RemoteError::Protocol(e.to_string()))
}

pub(crate) fn encode_response(response: &RpcResponse) -> Result<Vec<u8>, RemoteError> {
    rmp_serde::to_vec(response).map_err(|e| RemoteError::Protocol(e.to_string()))
}

pub(crate) fn decode_response(bytes: &[u8]) -> Result<RpcResponse, RemoteError> {
    rmp_serde::from_slice(bytes).map_err(|e| RemoteError::Protocol(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireEncoding;

    #[test]
    fn test_request_round_trip() {
        let messages = [
            RpcRequest::Ping,
            RpcRequest::ResolveSync {
                domain: "testing".to_string(),
                seri_req: vec![1, 2, 3],
            },
            RpcRequest::AckResponse {
                path: PathBuf::from("/tmp/x.bin"),
            },
            RpcRequest::MockHttp {
                url: "http://example/".to_string(),
                body: vec![0xDE, 0xAD],
            },
        ];
        for message in messages {
            let bytes = encode_request(&message).unwrap();
            assert_eq!(decode_request(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_response_round_trip() {
        let messages = [
            RpcResponse::Pong {
                version: "0.4.0".to_string(),
            },
            RpcResponse::Result(SerializedResult::inline(WireEncoding::Native, vec![9])),
            RpcResponse::Status(AsyncStatus::SelfRunning),
            RpcResponse::Error {
                message: "nope".to_string(),
            },
        ];
        for message in messages {
            let bytes = encode_response(&message).unwrap();
            assert_eq!(decode_response(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_garbage_frame_is_protocol_error() {
        assert!(matches!(
            decode_request(&[0xC1, 0xFF]),
            Err(RemoteError::Protocol(_))
        ));
    }
}
