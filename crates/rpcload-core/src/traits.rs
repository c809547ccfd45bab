use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an [`RpcClient`] call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    /// The transport could not deliver the request or read the reply.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The endpoint answered with an error status or a JSON-RPC error object.
    #[error("endpoint returned an error: {0}")]
    Remote(String),

    /// The call did not complete in time.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The client does not implement the requested capability.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Handle to an opened WebSocket connection.
///
/// Feature probing over WebSockets lives outside the engine; the handle only
/// carries the negotiated URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConnection {
    pub url: String,
}

/// Client interface for the endpoint under test.
///
/// Implementations must be safe for concurrent use: the engine shares one
/// client across every worker and burst.
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Issues one request for `method` and returns its round-trip time.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails or the endpoint reports an error.
    async fn call(&self, method: &str) -> Result<Duration, RpcError>;

    /// Opens a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// The default implementation always returns [`RpcError::Unsupported`].
    async fn open_websocket(&self, url: &str) -> Result<WebSocketConnection, RpcError> {
        let _ = url;
        Err(RpcError::Unsupported("websocket"))
    }
}
