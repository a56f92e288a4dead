use mavlink::common::{MavAutopilot, MavType};
use serde::Serialize;

use super::{ardupilot, segment_for, AutopilotFamily, CustomMode, VehicleProfile};
use crate::config::PlatformDescription;
use crate::connection::{Parameter, SetMode};
use crate::error::DroneError;
use crate::flight_plan::MavlinkFlightPlan;
use crate::model::{ArmedState, AutopilotState, FlightSegment, LandedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopterMode {
    Stabilize = 0,
    Acro = 1,
    AltHold = 2,
    Auto = 3,
    Guided = 4,
    Loiter = 5,
    Rtl = 6,
    Circle = 7,
    Land = 9,
    Drift = 11,
    Sport = 13,
    Flip = 14,
    AutoTune = 15,
    PosHold = 16,
    Brake = 17,
    Throw = 18,
    AvoidAdsb = 19,
    GuidedNoGps = 20,
    SmartRtl = 21,
    FlowHold = 22,
    Follow = 23,
    ZigZag = 24,
    SystemId = 25,
    AutoRotate = 26,
    AutoRtl = 27,
}

impl CopterMode {
    pub fn from_number(number: u32) -> Option<Self> {
        let mode = match number {
            0 => Self::Stabilize,
            1 => Self::Acro,
            2 => Self::AltHold,
            3 => Self::Auto,
            4 => Self::Guided,
            5 => Self::Loiter,
            6 => Self::Rtl,
            7 => Self::Circle,
            9 => Self::Land,
            11 => Self::Drift,
            13 => Self::Sport,
            14 => Self::Flip,
            15 => Self::AutoTune,
            16 => Self::PosHold,
            17 => Self::Brake,
            18 => Self::Throw,
            19 => Self::AvoidAdsb,
            20 => Self::GuidedNoGps,
            21 => Self::SmartRtl,
            22 => Self::FlowHold,
            23 => Self::Follow,
            24 => Self::ZigZag,
            25 => Self::SystemId,
            26 => Self::AutoRotate,
            27 => Self::AutoRtl,
            _ => return None,
        };
        Some(mode)
    }

    pub fn number(self) -> u32 {
        self as u32
    }

    fn is_autopilot(self) -> bool {
        matches!(
            self,
            Self::Auto
                | Self::Guided
                | Self::Loiter
                | Self::Rtl
                | Self::Circle
                | Self::Land
                | Self::Brake
                | Self::AvoidAdsb
                | Self::SmartRtl
                | Self::Follow
                | Self::AutoRtl
        )
    }

    fn in_air_segment(self) -> FlightSegment {
        match self {
            Self::Auto => FlightSegment::PlanRunning,
            Self::Rtl | Self::SmartRtl | Self::AutoRtl => FlightSegment::ReturnToHome,
            Self::Land => FlightSegment::Landing,
            Self::Loiter | Self::Guided | Self::PosHold | Self::Brake | Self::Circle => {
                FlightSegment::Hold
            }
            _ => FlightSegment::Unknown,
        }
    }
}

/// ArduPilot multirotors and helicopters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArduCopter;

impl VehicleProfile for ArduCopter {
    fn family(&self) -> AutopilotFamily {
        AutopilotFamily::ArduCopter
    }

    fn autopilot(&self) -> MavAutopilot {
        MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA
    }

    fn accepts_vehicle_type(&self, mavtype: MavType) -> bool {
        matches!(
            mavtype,
            MavType::MAV_TYPE_QUADROTOR
                | MavType::MAV_TYPE_HEXAROTOR
                | MavType::MAV_TYPE_OCTOROTOR
                | MavType::MAV_TYPE_TRICOPTER
                | MavType::MAV_TYPE_COAXIAL
                | MavType::MAV_TYPE_HELICOPTER
        )
    }

    fn decode_custom_mode(&self, custom_mode: u32) -> CustomMode {
        CopterMode::from_number(custom_mode).map_or(CustomMode::Undefined, CustomMode::ArduCopter)
    }

    fn autopilot_state(&self, mode: CustomMode) -> AutopilotState {
        match mode {
            CustomMode::ArduCopter(m) if m.is_autopilot() => AutopilotState::Autopilot,
            CustomMode::ArduCopter(_) => AutopilotState::Manual,
            _ => AutopilotState::Unknown,
        }
    }

    fn flight_segment(&self, mode: CustomMode, landed: LandedState) -> FlightSegment {
        segment_for(landed, || match mode {
            CustomMode::ArduCopter(m) => m.in_air_segment(),
            _ => FlightSegment::Unknown,
        })
    }

    fn land_mode(&self) -> Result<SetMode, DroneError> {
        Ok(ardupilot::set_mode(CopterMode::Land.number()))
    }

    fn mission_mode(&self) -> SetMode {
        ardupilot::set_mode(CopterMode::Auto.number())
    }

    fn loiter_mode(&self) -> SetMode {
        ardupilot::set_mode(CopterMode::Loiter.number())
    }

    fn return_home_mode(&self) -> SetMode {
        ardupilot::set_mode(CopterMode::Rtl.number())
    }

    fn autopilot_parameters(
        &self,
        mission: &MavlinkFlightPlan,
        _platform: &PlatformDescription,
    ) -> Vec<Parameter> {
        let plan = mission.flight_plan();
        let radius_cm = (mission.options().acceptance_radius_meters * 100.0) as f32;
        vec![
            Parameter::int32("RTL_ALT", (plan.safety_altitude * 100.0).round() as i32),
            Parameter::float("WPNAV_RADIUS", radius_cm),
        ]
    }

    fn approximate_landed_state(
        &self,
        armed: ArmedState,
        relative_altitude: Option<f64>,
    ) -> Option<LandedState> {
        Some(ardupilot::approximate_landed_state(armed, relative_altitude))
    }
}
