//! Multi-project message-relay bridge client: one connection per project
//! daemon, fanned out behind a single [`bridge::Bridge`] handle.

pub mod bridge;
pub mod connection;
pub mod error;

pub use bridge::{Bridge, BridgeEvent, BridgeOptions};
pub use connection::{ConnectionEvent, ConnectionState};
pub use error::BridgeError;
