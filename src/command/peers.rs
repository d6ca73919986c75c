//! Collaborator traits consumed by the dispatcher
//!
//! Every call is fire-and-forget: implementations enqueue the work and return
//! immediately. Replies come back through [`super::DispatcherHandle`].

use bytes::Bytes;
use ship_bridge_shared::Waypoint;

/// The low-level control peer (speed and steering actuation)
pub trait ControlPeer: Send + 'static {
    /// Forward an inbound request byte-for-byte
    fn send_raw_command(&self, raw: Bytes);
}

/// The navigation peer (autonomous waypoint following)
pub trait NavPeer: Send + 'static {
    fn query(&self);
    fn nav_start(&self);
    fn nav_stop(&self);
    /// Run the vehicle-side failsafe for a lost remote link
    fn net_loss(&self);
    fn set_waypoints(&self, waypoints: Vec<Waypoint>);
    fn add_waypoint(&self, waypoint: Waypoint);
    fn clear_waypoints(&self);
    fn set_home_waypoint(&self, waypoint: Waypoint);
    fn start_calibration(&self);
    fn stop_calibration(&self);
}

/// The remote broker session
pub trait Broker: Send + 'static {
    /// Publish a peer response to the control application
    fn send_response(&self, response: Bytes);
    /// Publish a liveness announcement
    fn announce(&self);
}
