//! Command handlers for the dispatcher's command categories

mod control;
mod navigation;
mod waypoints;

pub use control::handle_direct_control;
pub use navigation::{handle_calibration, handle_nav_start, handle_nav_stop, handle_query};
pub use waypoints::handle_waypoint_mutation;

use super::peers::{ControlPeer, NavPeer};

/// Context passed to command handlers
pub struct HandlerContext<'a> {
    pub control: &'a dyn ControlPeer,
    pub nav: &'a dyn NavPeer,
    /// Whether autonomous navigation is engaged
    pub auto_nav: &'a mut bool,
}
