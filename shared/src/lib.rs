//! Ship Bridge Shared Protocol Types
//!
//! This crate provides the request model, command table, waypoint parser and
//! JSON codec shared by the bridge core and its peer adapters.

pub mod codec;
pub mod command;
pub mod waypoint;

use serde::{Deserialize, Serialize};

pub use codec::{CodecError, NavRequest, Request};
pub use command::{Command, CommandCategory, NavCommand, RequestType};
pub use waypoint::{parse_waypoints, FieldFailurePolicy};

/// A single geographic point in signed decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl Waypoint {
    /// Create a new waypoint
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both coordinates are finite and inside their ranges
    pub fn is_in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl std::fmt::Display for Waypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Queue and buffer limits for the bridge
pub mod limits {
    /// Capacity of each dispatcher inbound queue
    pub const DISPATCHER_QUEUE_CAPACITY: usize = 1000;

    /// Default capacity of a peer adapter command queue
    pub const PEER_QUEUE_CAPACITY: usize = 100;

    /// Maximum size of a single peer reply
    pub const PEER_REPLY_MAX_BYTES: usize = 4096;

    /// Capacity of the broker adapter outbound queues
    pub const BROKER_QUEUE_CAPACITY: usize = 1000;
}

/// MQTT topic layout used by the bridge
pub mod topics {
    /// Topic the control application publishes requests on
    pub fn request(ship_id: &str) -> String {
        format!("ship/{}/request", ship_id)
    }

    /// Topic the bridge publishes peer responses on
    pub fn response(ship_id: &str) -> String {
        format!("ship/{}/response", ship_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waypoint_range() {
        assert!(Waypoint::new(56.348284, 43.959410).is_in_range());
        assert!(Waypoint::new(-90.0, 180.0).is_in_range());
        assert!(!Waypoint::new(91.0, 0.0).is_in_range());
        assert!(!Waypoint::new(0.0, -180.5).is_in_range());
        assert!(!Waypoint::new(f64::NAN, 0.0).is_in_range());
    }

    #[test]
    fn test_topics() {
        assert_eq!(topics::request("ship-7"), "ship/ship-7/request");
        assert_eq!(topics::response("ship-7"), "ship/ship-7/response");
    }

    #[test]
    fn test_waypoint_display() {
        let wp = Waypoint::new(1.5, -2.25);
        assert_eq!(wp.to_string(), "(1.500000, -2.250000)");
    }
}
