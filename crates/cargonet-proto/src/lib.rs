//! Wire types, AMQP transport, event registry and command tracker for the
//! CargoNetSim multi-simulator RPC client core.
//!
//! This crate is the "leaf" layer: it knows how to talk to the broker and
//! how to shape the two wire dialects (JSON envelopes for ship/train/terminal,
//! slash-delimited fields for truck) but nothing about simulator-specific
//! commands or state stores — that lives in `cargonet-clients`.

pub mod error;
pub mod health;
pub mod registry;
pub mod retry;
pub mod tracker;
pub mod transport;
pub mod truck_wire;
pub mod wire;

pub use error::TransportError;
pub use health::{ConnectionState, HealthTracker};
pub use registry::EventRegistry;
pub use retry::RetryPolicy;
pub use tracker::CommandTracker;
pub use transport::{AmqpTransport, InboundMessage, MessageDispatcher, TransportConfig};
pub use wire::{normalize_event_name, ClientKind, CommandEnvelope, EventEnvelope};
