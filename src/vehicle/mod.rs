//! Autopilot family behavior.
//!
//! The drone core only talks to [`VehicleProfile`]. Each firmware family supplies its custom-mode
//! table, the state derivations and the mode-change commands. [`profile_for`] is the only place
//! that chooses between families.

use mavlink::common::{MavAutopilot, MavModeFlag, MavType, HEARTBEAT_DATA};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PlatformDescription;
use crate::connection::{Parameter, SetMode};
use crate::error::DroneError;
use crate::flight_plan::MavlinkFlightPlan;
use crate::model::{ArmedState, AutopilotState, DroneState, FlightSegment, LandedState};

mod ardu_copter;
mod ardu_plane;
mod ardupilot;
mod obstacle_avoidance;
mod px4;


pub use ardu_copter::{ArduCopter, CopterMode};
pub use ardu_plane::{ArduPlane, PlaneMode};
pub use obstacle_avoidance::ObstacleAvoidanceCopter;
pub use px4::{Px4, Px4AutoSubMode, Px4MainMode, Px4Mode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotFamily {
    ArduCopter,
    ArduPlane,
    QuadPlane,
    Px4,
    Px4ObstacleAvoidance,
}

/// Decoded custom mode of any supported family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum CustomMode {
    #[default]
    Undefined,
    ArduCopter(CopterMode),
    ArduPlane(PlaneMode),
    Px4(Px4Mode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeartbeatMismatch {
    #[error("Invalid autopilot type")]
    Autopilot,
    #[error("Invalid vehicle type")]
    VehicleType,
}

pub trait VehicleProfile: Send + Sync {
    fn family(&self) -> AutopilotFamily;

    fn autopilot(&self) -> MavAutopilot;

    fn accepts_vehicle_type(&self, mavtype: MavType) -> bool;

    /// Out-of-table values decode to [`CustomMode::Undefined`].
    fn decode_custom_mode(&self, custom_mode: u32) -> CustomMode;

    fn autopilot_state(&self, mode: CustomMode) -> AutopilotState;

    fn flight_segment(&self, mode: CustomMode, landed: LandedState) -> FlightSegment;

    fn land_mode(&self) -> Result<SetMode, DroneError>;

    fn mission_mode(&self) -> SetMode;

    fn loiter_mode(&self) -> SetMode;

    fn return_home_mode(&self) -> SetMode;

    fn autopilot_parameters(
        &self,
        mission: &MavlinkFlightPlan,
        platform: &PlatformDescription,
    ) -> Vec<Parameter>;

    /// Landed state comes from EXTENDED_SYS_STATE.
    fn uses_extended_sys_state(&self) -> bool {
        false
    }

    /// Landed state inferred from arming and altitude, for firmwares that do not report it.
    fn approximate_landed_state(
        &self,
        _armed: ArmedState,
        _relative_altitude: Option<f64>,
    ) -> Option<LandedState> {
        None
    }

    fn pre_arm_check(&self, _state: &DroneState) -> Result<(), DroneError> {
        Ok(())
    }

    /// Whether a status text should reach the operator.
    fn accept_status_text(&self, _text: &str) -> bool {
        true
    }

    /// Integer parameters that read 0 while the sensor is uncalibrated.
    fn calibration_parameters(&self) -> &'static [&'static str] {
        &[]
    }

    fn polls_storage(&self) -> bool {
        false
    }

    fn reports_flight_information(&self) -> bool {
        false
    }

    fn has_obstacle_avoidance(&self) -> bool {
        false
    }
}

pub fn profile_for(family: AutopilotFamily) -> Box<dyn VehicleProfile> {
    match family {
        AutopilotFamily::ArduCopter => Box::new(ArduCopter),
        AutopilotFamily::ArduPlane => Box::new(ArduPlane::fixed_wing()),
        AutopilotFamily::QuadPlane => Box::new(ArduPlane::quad_plane()),
        AutopilotFamily::Px4 => Box::new(Px4),
        AutopilotFamily::Px4ObstacleAvoidance => Box::new(ObstacleAvoidanceCopter::new(Px4)),
    }
}

/// Validates a vehicle heartbeat against the profile and decodes its custom mode.
pub fn decode_heartbeat(
    profile: &dyn VehicleProfile,
    heartbeat: &HEARTBEAT_DATA,
) -> Result<CustomMode, HeartbeatMismatch> {
    if heartbeat.autopilot != profile.autopilot() {
        return Err(HeartbeatMismatch::Autopilot);
    }

    if !profile.accepts_vehicle_type(heartbeat.mavtype) {
        return Err(HeartbeatMismatch::VehicleType);
    }

    if !heartbeat
        .base_mode
        .contains(MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED)
    {
        return Ok(CustomMode::Undefined);
    }

    Ok(profile.decode_custom_mode(heartbeat.custom_mode))
}

/// Landed state first, custom mode only decides while in the air.
pub(crate) fn segment_for(landed: LandedState, in_air: impl FnOnce() -> FlightSegment) -> FlightSegment {
    match landed {
        LandedState::OnGround => FlightSegment::OnGround,
        LandedState::Takeoff => FlightSegment::Takeoff,
        LandedState::Landing => FlightSegment::Landing,
        LandedState::InAir => in_air(),
        LandedState::Undefined => FlightSegment::Unknown,
    }
}

pub fn armed_state(heartbeat: &HEARTBEAT_DATA) -> ArmedState {
    if heartbeat
        .base_mode
        .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED)
    {
        ArmedState::Armed
    } else {
        ArmedState::Disarmed
    }
}
