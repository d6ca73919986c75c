//! Command table
//!
//! Every command identifier the control application may send maps to exactly
//! one [`CommandCategory`]. The dispatcher handles a request by category only.

use serde::Serialize;

/// Request types carried in the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Cmd,
    Query,
}

impl RequestType {
    /// Look up a request type by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cmd" => Some(Self::Cmd),
            "query" => Some(Self::Query),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cmd => "cmd",
            Self::Query => "query",
        }
    }
}

/// How the dispatcher handles a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    /// Raw actuation, forwarded byte-for-byte to the control peer
    DirectControl,
    /// Engages autonomous navigation
    NavigationStart,
    /// Disengages autonomous navigation
    NavigationStop,
    /// Edits the navigation peer's waypoint list
    WaypointMutation,
    /// Compass/sensor calibration on the navigation peer
    Calibration,
}

/// Commands accepted from the control application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    SpeedUp,
    SpeedDown,
    TurnLeft,
    TurnRight,
    SetSpeed,
    SetSteering,
    NavStart,
    NavStop,
    SetWaypoints,
    AddWaypoint,
    ClearWaypoints,
    SetHomeWaypoint,
    StartCalibration,
    StopCalibration,
}

impl Command {
    pub const ALL: [Command; 14] = [
        Command::SpeedUp,
        Command::SpeedDown,
        Command::TurnLeft,
        Command::TurnRight,
        Command::SetSpeed,
        Command::SetSteering,
        Command::NavStart,
        Command::NavStop,
        Command::SetWaypoints,
        Command::AddWaypoint,
        Command::ClearWaypoints,
        Command::SetHomeWaypoint,
        Command::StartCalibration,
        Command::StopCalibration,
    ];

    /// Look up a command by its identifier
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|cmd| cmd.as_str() == id)
    }

    /// Wire identifier of this command
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SpeedUp => "speed_up",
            Command::SpeedDown => "speed_down",
            Command::TurnLeft => "turn_left",
            Command::TurnRight => "turn_right",
            Command::SetSpeed => "set_speed",
            Command::SetSteering => "set_steering",
            Command::NavStart => "nav_start",
            Command::NavStop => "nav_stop",
            Command::SetWaypoints => "set_waypoints",
            Command::AddWaypoint => "add_waypoint",
            Command::ClearWaypoints => "clear_waypoints",
            Command::SetHomeWaypoint => "set_home_waypoint",
            Command::StartCalibration => "start_calibration",
            Command::StopCalibration => "stop_calibration",
        }
    }

    pub fn category(&self) -> CommandCategory {
        match self {
            Command::SpeedUp
            | Command::SpeedDown
            | Command::TurnLeft
            | Command::TurnRight
            | Command::SetSpeed
            | Command::SetSteering => CommandCategory::DirectControl,
            Command::NavStart => CommandCategory::NavigationStart,
            Command::NavStop => CommandCategory::NavigationStop,
            Command::SetWaypoints
            | Command::AddWaypoint
            | Command::ClearWaypoints
            | Command::SetHomeWaypoint => CommandCategory::WaypointMutation,
            Command::StartCalibration | Command::StopCalibration => CommandCategory::Calibration,
        }
    }

    /// Whether the command carries a coordinate list in `data`
    pub fn needs_waypoints(&self) -> bool {
        matches!(
            self,
            Command::SetWaypoints | Command::AddWaypoint | Command::SetHomeWaypoint
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commands understood by the navigation peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    NavStart,
    NavStop,
    NetLoss,
    SetWaypoints,
    AddWaypoint,
    ClearWaypoints,
    SetHomeWaypoint,
    StartCalibration,
    StopCalibration,
}

impl NavCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavCommand::NavStart => "nav_start",
            NavCommand::NavStop => "nav_stop",
            NavCommand::NetLoss => "net_loss",
            NavCommand::SetWaypoints => "set_waypoints",
            NavCommand::AddWaypoint => "add_waypoint",
            NavCommand::ClearWaypoints => "clear_waypoints",
            NavCommand::SetHomeWaypoint => "set_home_waypoint",
            NavCommand::StartCalibration => "start_calibration",
            NavCommand::StopCalibration => "stop_calibration",
        }
    }
}
