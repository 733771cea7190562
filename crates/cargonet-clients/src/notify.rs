//! Event fan-out.
//!
//! `processMessage`'s "emit a typed event notification" / "emit a failure
//! notification" steps are a `tokio::sync::broadcast` channel owned by the
//! client base, one per client. Specializations subscribe to their own
//! client's receiver; there is no virtual-dispatch `handle(event)` trait
//! object anywhere in this crate.

use cargonet_proto::ConnectionState;
use serde_json::Value;

/// One fan-out notification emitted by a client base as it processes
/// inbound traffic or its own lifecycle transitions.
#[derive(Debug, Clone)]
pub enum ClientNotification {
    /// A command was published (does not imply a reply arrived).
    CommandSent { command_id: String, command: String },
    /// A reply to a previously sent command arrived.
    CommandResult {
        command_id: String,
        success: bool,
        payload: Value,
    },
    /// A broadcast (non-reply) event was registered.
    Event { name: String, payload: Value },
    /// The transport's connection state changed.
    ConnectionStateChanged(ConnectionState),
    /// Something went wrong that a caller did not directly request.
    Error(String),
}

pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;
