use mavlink::common::MavModeFlag;

use crate::connection::SetMode;
use crate::model::{ArmedState, LandedState};

const ON_GROUND_ALTITUDE_M: f64 = 0.5;

/// ArduPilot takes the flat mode number as main mode.
pub(super) fn set_mode(mode_number: u32) -> SetMode {
    SetMode::new(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, mode_number, 0)
}

/// ArduPilot does not stream EXTENDED_SYS_STATE here. Disarmed or below half a meter above home
/// counts as on ground.
pub(super) fn approximate_landed_state(armed: ArmedState, relative_altitude: Option<f64>) -> LandedState {
    match (armed, relative_altitude) {
        (ArmedState::Disarmed, _) => LandedState::OnGround,
        (_, Some(altitude)) if altitude < ON_GROUND_ALTITUDE_M => LandedState::OnGround,
        (ArmedState::Armed, Some(_)) => LandedState::InAir,
        _ => LandedState::Undefined,
    }
}
