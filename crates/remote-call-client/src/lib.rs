//! Remote procedure call client over MQTT.
//!
//! Provides:
//! - `RemoteClient` - connect, invoke static functions, end the session
//! - `ClientConfig` - agent/domain/broker options
//! - `SessionState` - session lifecycle

pub mod client;
pub mod config;
pub mod session;

pub use client::{ClientError, RemoteClient};
pub use config::ClientConfig;
pub use session::SessionState;
