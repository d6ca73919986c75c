//! Adapters for the local Unix-socket peers
//!
//! Both adapters implement the dispatcher's collaborator traits by queueing
//! onto a [`PeerLink`], which owns the socket.

mod control;
mod link;
mod nav;

pub use control::ShipControl;
pub use link::{LinkConfig, PeerLink, PeerQueue};
pub use nav::ShipNav;

use crate::command::DispatcherHandle;
use crate::config::PeerConfig;
use crate::transport::UnixConnector;

/// Build the ship-control adapter and the link task that serves it
pub fn ship_control(
    config: &PeerConfig,
    dispatcher: DispatcherHandle,
) -> (ShipControl, PeerLink<UnixConnector>) {
    let (queue, link) = PeerLink::new(
        control::TAG,
        UnixConnector::new_control(&config.socket_name),
        link_config(config),
        config.queue_size,
        dispatcher,
    );
    (ShipControl::new(queue), link)
}

/// Build the ship-nav adapter and the link task that serves it
pub fn ship_nav(
    config: &PeerConfig,
    dispatcher: DispatcherHandle,
) -> (ShipNav, PeerLink<UnixConnector>) {
    let (queue, link) = PeerLink::new(
        nav::TAG,
        UnixConnector::new_nav(&config.socket_name),
        link_config(config),
        config.queue_size,
        dispatcher,
    );
    (ShipNav::new(queue), link)
}

fn link_config(config: &PeerConfig) -> LinkConfig {
    LinkConfig {
        reply_timeout: config.reply_timeout(),
        ..Default::default()
    }
}
