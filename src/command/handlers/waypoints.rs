//! Waypoint mutation handler

use super::HandlerContext;
use crate::command::CommandResult;
use ship_bridge_shared::{Command, Request};
use tracing::warn;

/// Handle SET_WAYPOINTS, ADD_WAYPOINT, CLEAR_WAYPOINTS and SET_HOME_WAYPOINT
pub fn handle_waypoint_mutation(
    ctx: &mut HandlerContext<'_>,
    cmd: Command,
    request: Request,
) -> CommandResult {
    if cmd == Command::ClearWaypoints {
        ctx.nav.clear_waypoints();
        return CommandResult::Dispatched {
            message: "clear_waypoints sent to ship-nav".into(),
        };
    }

    let waypoints = request.into_waypoints();
    let Some(first) = waypoints.first().copied() else {
        return CommandResult::Rejected {
            message: format!("no waypoints provided for {} command", cmd),
        };
    };

    if let Some(wp) = waypoints.iter().find(|wp| !wp.is_in_range()) {
        warn!("[CORE] {} carries out-of-range waypoint {}", cmd, wp);
    }

    match cmd {
        Command::SetWaypoints => {
            let count = waypoints.len();
            ctx.nav.set_waypoints(waypoints);
            CommandResult::Dispatched {
                message: format!("set_waypoints sent to ship-nav ({} waypoints)", count),
            }
        }
        Command::AddWaypoint => {
            ctx.nav.add_waypoint(first);
            CommandResult::Dispatched {
                message: format!("add_waypoint {} sent to ship-nav", first),
            }
        }
        Command::SetHomeWaypoint => {
            ctx.nav.set_home_waypoint(first);
            CommandResult::Dispatched {
                message: format!("set_home_waypoint {} sent to ship-nav", first),
            }
        }
        other => CommandResult::Rejected {
            message: format!("{} is not a waypoint command", other),
        },
    }
}
