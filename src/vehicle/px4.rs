use mavlink::common::{MavAutopilot, MavModeFlag, MavType};
use serde::Serialize;
use tracing::info;

use super::{segment_for, AutopilotFamily, CustomMode, VehicleProfile};
use crate::config::PlatformDescription;
use crate::connection::{Parameter, SetMode, StatusTextFilter};
use crate::error::DroneError;
use crate::flight_plan::{EmergencyAction, MavlinkFlightPlan};
use crate::model::{AutopilotState, CalibrationStatus, DroneState, FlightSegment, LandedState};

const SUPPRESSED_STATUS_TEXT: [&str; 3] = [
    "ALL DATA LINKS LOST",
    "Data link lost",
    "Failsafe enabled: no datalink",
];

const CALIBRATION_PARAMETERS: [&str; 3] = ["CAL_MAG0_ID", "CAL_GYRO0_ID", "CAL_ACC0_ID"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Px4MainMode {
    Manual = 1,
    Altctl = 2,
    Posctl = 3,
    Auto = 4,
    Acro = 5,
    Offboard = 6,
    Stabilized = 7,
    Rattitude = 8,
    Simple = 9,
}

impl Px4MainMode {
    pub fn from_number(number: u32) -> Option<Self> {
        let mode = match number {
            1 => Self::Manual,
            2 => Self::Altctl,
            3 => Self::Posctl,
            4 => Self::Auto,
            5 => Self::Acro,
            6 => Self::Offboard,
            7 => Self::Stabilized,
            8 => Self::Rattitude,
            9 => Self::Simple,
            _ => return None,
        };
        Some(mode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Px4AutoSubMode {
    Ready = 1,
    Takeoff = 2,
    Loiter = 3,
    Mission = 4,
    Rtl = 5,
    Land = 6,
    Rtgs = 7,
    FollowTarget = 8,
    Precland = 9,
    VtolTakeoff = 10,
}

impl Px4AutoSubMode {
    pub fn from_number(number: u32) -> Option<Self> {
        let mode = match number {
            1 => Self::Ready,
            2 => Self::Takeoff,
            3 => Self::Loiter,
            4 => Self::Mission,
            5 => Self::Rtl,
            6 => Self::Land,
            7 => Self::Rtgs,
            8 => Self::FollowTarget,
            9 => Self::Precland,
            10 => Self::VtolTakeoff,
            _ => return None,
        };
        Some(mode)
    }
}

/// PX4 packs the main mode in bits 16..24 and the AUTO sub mode in bits 24..32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Px4Mode {
    pub main: Px4MainMode,
    pub sub: Option<Px4AutoSubMode>,
}

impl Px4Mode {
    pub fn decode(custom_mode: u32) -> Option<Self> {
        let main = Px4MainMode::from_number((custom_mode >> 16) & 0xff)?;
        let sub = match main {
            Px4MainMode::Auto => Some(Px4AutoSubMode::from_number((custom_mode >> 24) & 0xff)?),
            _ => None,
        };
        Some(Self { main, sub })
    }

    fn in_air_segment(self) -> FlightSegment {
        match (self.main, self.sub) {
            (Px4MainMode::Auto, Some(Px4AutoSubMode::Mission)) => FlightSegment::PlanRunning,
            (Px4MainMode::Auto, Some(Px4AutoSubMode::Rtl)) => FlightSegment::ReturnToHome,
            (Px4MainMode::Auto, Some(Px4AutoSubMode::Land | Px4AutoSubMode::Precland)) => {
                FlightSegment::Landing
            }
            (Px4MainMode::Auto, Some(Px4AutoSubMode::Takeoff | Px4AutoSubMode::VtolTakeoff)) => {
                FlightSegment::Takeoff
            }
            (Px4MainMode::Auto, Some(Px4AutoSubMode::Loiter | Px4AutoSubMode::Ready))
            | (Px4MainMode::Posctl | Px4MainMode::Offboard, _) => FlightSegment::Hold,
            _ => FlightSegment::Unknown,
        }
    }
}

fn auto_mode(sub: Px4AutoSubMode) -> SetMode {
    let base = MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
        | MavModeFlag::MAV_MODE_FLAG_STABILIZE_ENABLED
        | MavModeFlag::MAV_MODE_FLAG_GUIDED_ENABLED
        | MavModeFlag::MAV_MODE_FLAG_AUTO_ENABLED
        | MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
    SetMode::new(base, Px4MainMode::Auto as u32, sub as u32)
}

fn link_loss_action(action: EmergencyAction) -> i32 {
    match action {
        EmergencyAction::None | EmergencyAction::Warn => 0,
        EmergencyAction::Hold => 1,
        EmergencyAction::ReturnHome => 2,
        EmergencyAction::Land => 3,
    }
}

fn geofence_action(action: EmergencyAction) -> i32 {
    match action {
        EmergencyAction::None => 0,
        EmergencyAction::Warn => 1,
        EmergencyAction::Hold => 2,
        EmergencyAction::ReturnHome => 3,
        EmergencyAction::Land => 5,
    }
}

fn position_loss_action(action: EmergencyAction) -> i32 {
    match action {
        EmergencyAction::Land => 1,
        _ => 0,
    }
}

/// PX4 multirotors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Px4;

impl VehicleProfile for Px4 {
    fn family(&self) -> AutopilotFamily {
        AutopilotFamily::Px4
    }

    fn autopilot(&self) -> MavAutopilot {
        MavAutopilot::MAV_AUTOPILOT_PX4
    }

    fn accepts_vehicle_type(&self, mavtype: MavType) -> bool {
        matches!(
            mavtype,
            MavType::MAV_TYPE_QUADROTOR | MavType::MAV_TYPE_HEXAROTOR | MavType::MAV_TYPE_OCTOROTOR
        )
    }

    fn decode_custom_mode(&self, custom_mode: u32) -> CustomMode {
        Px4Mode::decode(custom_mode).map_or(CustomMode::Undefined, CustomMode::Px4)
    }

    fn autopilot_state(&self, mode: CustomMode) -> AutopilotState {
        match mode {
            CustomMode::Px4(Px4Mode {
                main: Px4MainMode::Auto,
                ..
            }) => AutopilotState::Autopilot,
            CustomMode::Px4(_) => AutopilotState::Manual,
            _ => AutopilotState::Unknown,
        }
    }

    fn flight_segment(&self, mode: CustomMode, landed: LandedState) -> FlightSegment {
        segment_for(landed, || match mode {
            CustomMode::Px4(m) => m.in_air_segment(),
            _ => FlightSegment::Unknown,
        })
    }

    fn land_mode(&self) -> Result<SetMode, DroneError> {
        Ok(auto_mode(Px4AutoSubMode::Land))
    }

    /// PX4 rejects a mission with too distant waypoints only through status text.
    fn mission_mode(&self) -> SetMode {
        auto_mode(Px4AutoSubMode::Mission)
            .failing_on(StatusTextFilter::starts_with("Distance between waypoints too far"))
    }

    fn loiter_mode(&self) -> SetMode {
        auto_mode(Px4AutoSubMode::Loiter)
    }

    fn return_home_mode(&self) -> SetMode {
        auto_mode(Px4AutoSubMode::Rtl)
    }

    fn autopilot_parameters(
        &self,
        mission: &MavlinkFlightPlan,
        platform: &PlatformDescription,
    ) -> Vec<Parameter> {
        if !platform.emergency_actions_settable {
            info!(
                "Platform {} does not allow setting PX4 emergency parameters",
                platform.name
            );
            return Vec::new();
        }

        let plan = mission.flight_plan();
        let actions = &plan.emergency_actions;
        let angle = mission.options().acceptance_angle_degrees;

        let mut params = vec![
            Parameter::float(
                "MIS_TAKEOFF_ALT",
                mission.start_altitude_position().altitude as f32,
            ),
            Parameter::float("RTL_RETURN_ALT", plan.safety_altitude as f32),
        ];
        if angle != 0.0 {
            params.push(Parameter::float("MIS_YAW_ERR", angle as f32));
        }
        params.extend([
            Parameter::int32("NAV_RCL_ACT", link_loss_action(actions.rc_link_loss)),
            Parameter::float("COM_RC_LOSS_T", actions.rc_link_loss_delay_secs as f32),
            Parameter::int32("NAV_DLL_ACT", link_loss_action(actions.primary_link_loss)),
            Parameter::int32("COM_DL_LOSS_T", actions.primary_link_loss_delay_secs as i32),
            Parameter::int32("GF_ACTION", geofence_action(actions.geofence_breach)),
            Parameter::int32("COM_POSCTL_NAVL", position_loss_action(actions.position_loss)),
            Parameter::int32("COM_POS_FS_DELAY", actions.position_loss_delay_secs as i32),
        ]);
        params
    }

    fn uses_extended_sys_state(&self) -> bool {
        true
    }

    fn pre_arm_check(&self, state: &DroneState) -> Result<(), DroneError> {
        if state.health.calibration_status == CalibrationStatus::CalibrationNeeded {
            return Err(DroneError::precondition("Sensor calibration needed"));
        }
        Ok(())
    }

    fn accept_status_text(&self, text: &str) -> bool {
        !SUPPRESSED_STATUS_TEXT.contains(&text)
    }

    fn calibration_parameters(&self) -> &'static [&'static str] {
        &CALIBRATION_PARAMETERS
    }

    fn polls_storage(&self) -> bool {
        true
    }

    fn reports_flight_information(&self) -> bool {
        true
    }
}
