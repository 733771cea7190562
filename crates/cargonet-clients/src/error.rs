//! Client-facing error type.
//!
//! Wider than [`cargonet_proto::TransportError`]: this enum is what every
//! `sendCommandAndWait`-family method returns, so it carries the server-side
//! and lifecycle failure kinds the transport layer has no notion of.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("send failed after retries exhausted")]
    SendFailed,

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("server error: {message}")]
    ServerError { message: String },

    #[error("protocol error: {detail}")]
    ProtocolError { detail: String },

    #[error("lifecycle error: {detail}")]
    LifecycleError { detail: String },

    #[error("connection lost")]
    ConnectionLost,
}

impl From<cargonet_proto::TransportError> for ClientError {
    fn from(e: cargonet_proto::TransportError) -> Self {
        use cargonet_proto::TransportError as T;
        match e {
            T::NotConnected => ClientError::NotConnected,
            T::RetriesExhausted { .. } => ClientError::SendFailed,
            T::Timeout(_) => ClientError::Timeout,
            T::InvalidBody(detail) => ClientError::ProtocolError { detail },
            T::Amqp(inner) => ClientError::ConnectionLost.with_context(inner.to_string()),
        }
    }
}

impl ClientError {
    /// Attaches extra context to a `ConnectionLost`/`ProtocolError`-shaped
    /// error without changing its variant, for error-path logging.
    fn with_context(self, context: String) -> Self {
        match self {
            ClientError::ConnectionLost => {
                tracing::debug!(detail = %context, "connection lost");
                ClientError::ConnectionLost
            }
            other => other,
        }
    }
}
