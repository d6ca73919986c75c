//! Direct-control command handler

use super::HandlerContext;
use crate::command::CommandResult;
use ship_bridge_shared::{Command, Request};
use tracing::info;

/// Handle speed and steering commands
///
/// Manual control always wins over autonomous navigation: if the navigation
/// peer is driving, it is stopped before the raw command reaches ship-control.
pub fn handle_direct_control(
    ctx: &mut HandlerContext<'_>,
    cmd: Command,
    request: &Request,
) -> CommandResult {
    if *ctx.auto_nav {
        info!("[CORE] received control command, stopping autonav");
        ctx.nav.nav_stop();
        *ctx.auto_nav = false;
    }

    ctx.control.send_raw_command(request.raw_data().clone());

    CommandResult::Dispatched {
        message: format!("{} forwarded to ship-control", cmd),
    }
}
