//! Wire-level vocabulary for remote procedure calls over MQTT.
//!
//! This crate provides the building blocks shared by clients and agents:
//! - `CallRequest` / `CallId` - call identity
//! - `topic` - the MQTT topic scheme
//! - `CallPayload` / `ReplyPayload` - the JSON envelope

pub mod call;
pub mod topic;
pub mod wire;

pub use call::{AgentInfo, AgentStatus, CallId, CallRequest, GLOBAL_CLASS};
pub use wire::{CallPayload, ReplyPayload};
