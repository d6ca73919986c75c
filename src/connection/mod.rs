//! Remote broker connection
//!
//! This module handles:
//! - Broker URL parsing and TLS setup
//! - The MQTT session with automatic reconnection
//! - Request subscription, response publishing and liveness announces

mod broker;
mod tls;
mod url;

pub use broker::mqtt_broker;
