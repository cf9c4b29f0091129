//! Broker transports for remote procedure calls.
//!
//! Provides:
//! - `Transport` trait + `TransportEvent` - the seam the client drives
//! - MQTT implementation backed by rumqttc (feature: mqtt)
//! - In-process loop-back broker (feature: memory)

pub mod traits;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "memory")]
pub mod memory;

pub use traits::{Transport, TransportError, TransportEvent};
