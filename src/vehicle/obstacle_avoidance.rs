use mavlink::common::{MavAutopilot, MavType};

use super::{AutopilotFamily, CustomMode, VehicleProfile};
use crate::config::PlatformDescription;
use crate::connection::{Parameter, SetMode};
use crate::error::DroneError;
use crate::flight_plan::MavlinkFlightPlan;
use crate::model::{
    ArmedState, AutopilotState, DroneState, FlightSegment, LandedState, ObstacleAvoidanceStatus,
};

/// A copter carrying a distance sensor ring. Flies like its base profile and additionally
/// streams OBSTACLE_DISTANCE.
#[derive(Debug, Clone)]
pub struct ObstacleAvoidanceCopter<P> {
    base: P,
}

impl<P: VehicleProfile> ObstacleAvoidanceCopter<P> {
    pub fn new(base: P) -> Self {
        Self { base }
    }
}

impl<P: VehicleProfile> VehicleProfile for ObstacleAvoidanceCopter<P> {
    fn family(&self) -> AutopilotFamily {
        AutopilotFamily::Px4ObstacleAvoidance
    }

    fn autopilot(&self) -> MavAutopilot {
        self.base.autopilot()
    }

    fn accepts_vehicle_type(&self, mavtype: MavType) -> bool {
        self.base.accepts_vehicle_type(mavtype)
    }

    fn decode_custom_mode(&self, custom_mode: u32) -> CustomMode {
        self.base.decode_custom_mode(custom_mode)
    }

    fn autopilot_state(&self, mode: CustomMode) -> AutopilotState {
        self.base.autopilot_state(mode)
    }

    fn flight_segment(&self, mode: CustomMode, landed: LandedState) -> FlightSegment {
        self.base.flight_segment(mode, landed)
    }

    fn land_mode(&self) -> Result<SetMode, DroneError> {
        self.base.land_mode()
    }

    fn mission_mode(&self) -> SetMode {
        self.base.mission_mode()
    }

    fn loiter_mode(&self) -> SetMode {
        self.base.loiter_mode()
    }

    fn return_home_mode(&self) -> SetMode {
        self.base.return_home_mode()
    }

    fn autopilot_parameters(
        &self,
        mission: &MavlinkFlightPlan,
        platform: &PlatformDescription,
    ) -> Vec<Parameter> {
        self.base.autopilot_parameters(mission, platform)
    }

    fn uses_extended_sys_state(&self) -> bool {
        self.base.uses_extended_sys_state()
    }

    fn approximate_landed_state(
        &self,
        armed: ArmedState,
        relative_altitude: Option<f64>,
    ) -> Option<LandedState> {
        self.base.approximate_landed_state(armed, relative_altitude)
    }

    /// Arming next to an obstacle closer than the safe distance is refused.
    fn pre_arm_check(&self, state: &DroneState) -> Result<(), DroneError> {
        self.base.pre_arm_check(state)?;
        let blocked = state
            .obstacle_avoidance
            .as_ref()
            .is_some_and(|oa| !oa.stale && oa.value.status == ObstacleAvoidanceStatus::Warning);
        if blocked {
            return Err(DroneError::precondition("Obstacle within safe distance"));
        }
        Ok(())
    }

    fn accept_status_text(&self, text: &str) -> bool {
        self.base.accept_status_text(text)
    }

    fn calibration_parameters(&self) -> &'static [&'static str] {
        self.base.calibration_parameters()
    }

    fn polls_storage(&self) -> bool {
        self.base.polls_storage()
    }

    fn reports_flight_information(&self) -> bool {
        self.base.reports_flight_information()
    }

    fn has_obstacle_avoidance(&self) -> bool {
        true
    }
}
