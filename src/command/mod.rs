//! Command dispatch core of the bridge
//!
//! This module handles:
//! - Decoding requests from the control application
//! - Classifying them through the command table
//! - Dispatching to the control and navigation peers
//! - Forwarding peer responses, announce ticks and net-loss signals

mod dispatcher;
pub mod handlers;
pub mod peers;

pub use dispatcher::{CommandResult, Dispatcher, DispatcherHandle};
#[cfg(test)]
pub use dispatcher::DispatcherInbox;
pub use peers::{Broker, ControlPeer, NavPeer};
