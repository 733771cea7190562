//! Client-kind specializations, the shared JSON client base, and the truck
//! client worker-thread manager for the CargoNetSim RPC client core.

pub mod base;
pub mod error;
pub mod graph;
pub mod manager;
pub mod notify;
pub mod ship;
pub mod sim_process;
pub mod terminal;
pub mod train;
pub mod truck;

pub use base::{EventSink, JsonClientBase};
pub use error::ClientError;
pub use graph::{Path, PathSegment, TerminalGraph};
pub use manager::{ClientConfig, TruckClientManager};
pub use notify::ClientNotification;
pub use ship::{ShipClient, ShipState, ShipStateStore};
pub use sim_process::SimProcessConfig;
pub use terminal::{TerminalClient, TerminalStateStore, TransportationMode};
pub use train::{TrainClient, TrainState, TrainStateStore};
pub use truck::{TripRequest, TripResult, TruckClient, TruckStateStore};
