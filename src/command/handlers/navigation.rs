//! Navigation state, calibration and query handlers

use super::HandlerContext;
use crate::command::CommandResult;
use ship_bridge_shared::Command;
use tracing::info;

/// Handle NAV_START
pub fn handle_nav_start(ctx: &mut HandlerContext<'_>) -> CommandResult {
    ctx.nav.nav_start();
    *ctx.auto_nav = true;
    info!("[CORE] autonav engaged");

    CommandResult::Dispatched {
        message: "nav_start sent to ship-nav".into(),
    }
}

/// Handle NAV_STOP
pub fn handle_nav_stop(ctx: &mut HandlerContext<'_>) -> CommandResult {
    ctx.nav.nav_stop();
    if *ctx.auto_nav {
        info!("[CORE] autonav disengaged");
    }
    *ctx.auto_nav = false;

    CommandResult::Dispatched {
        message: "nav_stop sent to ship-nav".into(),
    }
}

/// Handle START_CALIBRATION and STOP_CALIBRATION
pub fn handle_calibration(ctx: &mut HandlerContext<'_>, cmd: Command) -> CommandResult {
    match cmd {
        Command::StartCalibration => ctx.nav.start_calibration(),
        Command::StopCalibration => ctx.nav.stop_calibration(),
        other => {
            return CommandResult::Rejected {
                message: format!("{} is not a calibration command", other),
            };
        }
    }

    CommandResult::Dispatched {
        message: format!("{} sent to ship-nav", cmd),
    }
}

/// Handle a state query. The `cmd` field is not consulted.
pub fn handle_query(ctx: &mut HandlerContext<'_>) -> CommandResult {
    ctx.nav.query();

    CommandResult::Dispatched {
        message: "query sent to ship-nav".into(),
    }
}
