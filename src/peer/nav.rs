//! ship-nav adapter

use super::PeerQueue;
use crate::command::NavPeer;
use ship_bridge_shared::{NavCommand, NavRequest, Waypoint};
use tracing::error;

pub(super) const TAG: &str = "NAV";

/// Encodes navigation calls as JSON requests for ship-nav
pub struct ShipNav {
    queue: PeerQueue,
}

impl ShipNav {
    pub fn new(queue: PeerQueue) -> Self {
        Self { queue }
    }

    fn send(&self, request: NavRequest) {
        match request.encode() {
            Ok(bytes) => self.queue.push(bytes),
            Err(e) => error!("[{}] failed to encode {} request: {}", TAG, request.cmd, e),
        }
    }

    fn command(&self, cmd: NavCommand) {
        self.send(NavRequest::command(cmd));
    }
}

impl NavPeer for ShipNav {
    fn query(&self) {
        self.send(NavRequest::query());
    }

    fn nav_start(&self) {
        self.command(NavCommand::NavStart);
    }

    fn nav_stop(&self) {
        self.command(NavCommand::NavStop);
    }

    fn net_loss(&self) {
        self.command(NavCommand::NetLoss);
    }

    fn set_waypoints(&self, waypoints: Vec<Waypoint>) {
        self.send(NavRequest::with_waypoints(NavCommand::SetWaypoints, waypoints));
    }

    fn add_waypoint(&self, waypoint: Waypoint) {
        self.send(NavRequest::with_waypoints(
            NavCommand::AddWaypoint,
            vec![waypoint],
        ));
    }

    fn clear_waypoints(&self) {
        self.command(NavCommand::ClearWaypoints);
    }

    fn set_home_waypoint(&self, waypoint: Waypoint) {
        self.send(NavRequest::with_waypoints(
            NavCommand::SetHomeWaypoint,
            vec![waypoint],
        ));
    }

    fn start_calibration(&self) {
        self.command(NavCommand::StartCalibration);
    }

    fn stop_calibration(&self) {
        self.command(NavCommand::StopCalibration);
    }
}
