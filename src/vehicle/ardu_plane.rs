use mavlink::common::{MavAutopilot, MavType};
use serde::Serialize;

use super::{ardupilot, segment_for, AutopilotFamily, CustomMode, VehicleProfile};
use crate::config::PlatformDescription;
use crate::connection::{Parameter, SetMode};
use crate::error::DroneError;
use crate::flight_plan::MavlinkFlightPlan;
use crate::model::{ArmedState, AutopilotState, FlightSegment, LandedState};

/// MAV_TYPE_VTOL_TAILSITTER_DUOROTOR up to MAV_TYPE_VTOL_RESERVED5.
const VTOL_TYPES: std::ops::RangeInclusive<u32> = 19..=25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaneMode {
    Manual = 0,
    Circle = 1,
    Stabilize = 2,
    Training = 3,
    Acro = 4,
    FlyByWireA = 5,
    FlyByWireB = 6,
    Cruise = 7,
    AutoTune = 8,
    Auto = 10,
    Rtl = 11,
    Loiter = 12,
    Takeoff = 13,
    AvoidAdsb = 14,
    Guided = 15,
    Initializing = 16,
    QStabilize = 17,
    QHover = 18,
    QLoiter = 19,
    QLand = 20,
    QRtl = 21,
    QAutoTune = 22,
    QAcro = 23,
    Thermal = 24,
}

impl PlaneMode {
    pub fn from_number(number: u32) -> Option<Self> {
        let mode = match number {
            0 => Self::Manual,
            1 => Self::Circle,
            2 => Self::Stabilize,
            3 => Self::Training,
            4 => Self::Acro,
            5 => Self::FlyByWireA,
            6 => Self::FlyByWireB,
            7 => Self::Cruise,
            8 => Self::AutoTune,
            10 => Self::Auto,
            11 => Self::Rtl,
            12 => Self::Loiter,
            13 => Self::Takeoff,
            14 => Self::AvoidAdsb,
            15 => Self::Guided,
            16 => Self::Initializing,
            17 => Self::QStabilize,
            18 => Self::QHover,
            19 => Self::QLoiter,
            20 => Self::QLand,
            21 => Self::QRtl,
            22 => Self::QAutoTune,
            23 => Self::QAcro,
            24 => Self::Thermal,
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
                | Self::Rtl
                | Self::Loiter
                | Self::Circle
                | Self::Guided
                | Self::Takeoff
                | Self::AvoidAdsb
                | Self::QLoiter
                | Self::QLand
                | Self::QRtl
                | Self::Thermal
        )
    }

    fn in_air_segment(self) -> FlightSegment {
        match self {
            Self::Auto => FlightSegment::PlanRunning,
            Self::Rtl | Self::QRtl => FlightSegment::ReturnToHome,
            Self::QLand => FlightSegment::Landing,
            Self::Takeoff => FlightSegment::Takeoff,
            Self::Loiter | Self::Circle | Self::Guided | Self::QLoiter | Self::QHover => {
                FlightSegment::Hold
            }
            _ => FlightSegment::Unknown,
        }
    }
}

/// ArduPilot fixed wing, optionally with VTOL lift motors.
#[derive(Debug, Clone, Copy)]
pub struct ArduPlane {
    vtol: bool,
}

impl ArduPlane {
    pub fn fixed_wing() -> Self {
        Self { vtol: false }
    }

    pub fn quad_plane() -> Self {
        Self { vtol: true }
    }
}

impl VehicleProfile for ArduPlane {
    fn family(&self) -> AutopilotFamily {
        if self.vtol {
            AutopilotFamily::QuadPlane
        } else {
            AutopilotFamily::ArduPlane
        }
    }

    fn autopilot(&self) -> MavAutopilot {
        MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA
    }

    fn accepts_vehicle_type(&self, mavtype: MavType) -> bool {
        mavtype == MavType::MAV_TYPE_FIXED_WING
            || (self.vtol && VTOL_TYPES.contains(&(mavtype as u32)))
    }

    fn decode_custom_mode(&self, custom_mode: u32) -> CustomMode {
        PlaneMode::from_number(custom_mode).map_or(CustomMode::Undefined, CustomMode::ArduPlane)
    }

    fn autopilot_state(&self, mode: CustomMode) -> AutopilotState {
        match mode {
            CustomMode::ArduPlane(m) if m.is_autopilot() => AutopilotState::Autopilot,
            CustomMode::ArduPlane(_) => AutopilotState::Manual,
            _ => AutopilotState::Unknown,
        }
    }

    fn flight_segment(&self, mode: CustomMode, landed: LandedState) -> FlightSegment {
        segment_for(landed, || match mode {
            CustomMode::ArduPlane(m) => m.in_air_segment(),
            _ => FlightSegment::Unknown,
        })
    }

    /// A plane without lift motors has no land mode; it lands through a mission landing sequence.
    fn land_mode(&self) -> Result<SetMode, DroneError> {
        if self.vtol {
            Ok(ardupilot::set_mode(PlaneMode::QLand.number()))
        } else {
            Err(DroneError::not_supported("Land mode not available on fixed wing"))
        }
    }

    fn mission_mode(&self) -> SetMode {
        ardupilot::set_mode(PlaneMode::Auto.number())
    }

    fn loiter_mode(&self) -> SetMode {
        ardupilot::set_mode(PlaneMode::Loiter.number())
    }

    fn return_home_mode(&self) -> SetMode {
        ardupilot::set_mode(PlaneMode::Rtl.number())
    }

    fn autopilot_parameters(
        &self,
        mission: &MavlinkFlightPlan,
        _platform: &PlatformDescription,
    ) -> Vec<Parameter> {
        let plan = mission.flight_plan();
        let radius = mission.options().acceptance_radius_meters.round().max(1.0) as i32;
        let mut params = vec![
            Parameter::int32("ALT_HOLD_RTL", (plan.safety_altitude * 100.0).round() as i32),
            Parameter::int32("WP_RADIUS", radius),
        ];
        if self.vtol {
            params.push(Parameter::int32("Q_RTL_ALT", plan.safety_altitude.round() as i32));
        }
        params
    }

    fn approximate_landed_state(
        &self,
        armed: ArmedState,
        relative_altitude: Option<f64>,
    ) -> Option<LandedState> {
        Some(ardupilot::approximate_landed_state(armed, relative_altitude))
    }
}
