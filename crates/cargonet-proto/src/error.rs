//! Transport-level errors.

use thiserror::Error;

/// Errors surfaced by [`crate::transport::AmqpTransport`].
///
/// Narrower than the client-facing error enum in `cargonet-clients`: this
/// type only describes what can go wrong moving bytes to and from the
/// broker, not what a client does with the result.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("not connected")]
    NotConnected,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("invalid message body: {0}")]
    InvalidBody(String),
}
