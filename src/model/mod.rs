//! Telemetry domain model.
//!
//! Every value derived from a telemetry stream is wrapped in [`Telemetry`], which pairs it with
//! the staleness flag maintained by that stream's watchdog. Only the drone core mutates these.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mavlink::common::{MavLandedState, MavSeverity};
use serde::Serialize;

mod battery;
mod camera;
mod geo;
mod gnss;
mod obstacle;
mod status;

pub use battery::{Battery, BatteryAlertLevel};
pub use camera::{Camera, VideoStream};
pub use geo::{LatLon, Position, Quaternion};
pub use gnss::{GnssInfo, GnssState};
pub use obstacle::{ObstacleAvoidance, ObstacleAvoidanceStatus};
pub use status::{
    CalibrationStatus, Health, RemoteControl, RemoteControlStatus, Storage, StorageStatus,
};

use crate::flight_plan::FlightPlan;
use crate::vehicle::{AutopilotFamily, CustomMode};

/// A telemetry-derived value and whether its stream has gone quiet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry<T> {
    pub value: T,
    pub stale: bool,
}

impl<T> Telemetry<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    pub fn set(&mut self, value: T) {
        self.stale = false;
        self.value = value;
    }
}

impl<T: Default> Default for Telemetry<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutopilotState {
    #[default]
    Unknown,
    Manual,
    Autopilot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightSegment {
    #[default]
    Unknown,
    OnGround,
    Takeoff,
    Hold,
    PlanRunning,
    ReturnToHome,
    Landing,
    Lockdown,
}

impl FlightSegment {
    pub fn is_airborne(self) -> bool {
        !matches!(self, Self::Unknown | Self::OnGround)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LandedState {
    #[default]
    Undefined,
    OnGround,
    InAir,
    Takeoff,
    Landing,
}

impl From<MavLandedState> for LandedState {
    fn from(state: MavLandedState) -> Self {
        match state {
            MavLandedState::MAV_LANDED_STATE_ON_GROUND => Self::OnGround,
            MavLandedState::MAV_LANDED_STATE_IN_AIR => Self::InAir,
            MavLandedState::MAV_LANDED_STATE_TAKEOFF => Self::Takeoff,
            MavLandedState::MAV_LANDED_STATE_LANDING => Self::Landing,
            _ => Self::Undefined,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmedState {
    #[default]
    Unknown,
    Armed,
    Disarmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageSeverity {
    Error,
    Warning,
    Info,
}

impl From<MavSeverity> for MessageSeverity {
    fn from(severity: MavSeverity) -> Self {
        match severity {
            MavSeverity::MAV_SEVERITY_WARNING => Self::Warning,
            MavSeverity::MAV_SEVERITY_NOTICE
            | MavSeverity::MAV_SEVERITY_INFO
            | MavSeverity::MAV_SEVERITY_DEBUG => Self::Info,
            _ => Self::Error,
        }
    }
}

/// Status text surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroneMessage {
    pub text: String,
    pub severity: MessageSeverity,
    pub timestamp: DateTime<Utc>,
}

/// Static description of the connected hardware.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformInfo {
    pub vehicle_id: String,
    pub name: String,
    pub autopilot: AutopilotFamily,
}

#[derive(Debug, Clone, Serialize)]
pub struct DroneState {
    pub platform: PlatformInfo,
    pub armed_state: Telemetry<ArmedState>,
    pub battery: Telemetry<Battery>,
    pub remote_control: Telemetry<RemoteControl>,
    pub health: Health,
    pub storage: Telemetry<Storage>,
    pub gnss: Telemetry<GnssInfo>,
    pub position: Telemetry<Option<Position>>,
    pub attitude: Telemetry<Option<Quaternion>>,
    pub custom_mode: Telemetry<CustomMode>,
    pub landed_state: Telemetry<LandedState>,
    pub autopilot_state: Telemetry<AutopilotState>,
    pub flight_segment: Telemetry<FlightSegment>,
    pub flight_time: Telemetry<Duration>,
    pub active_flight_plan: Option<Arc<FlightPlan>>,
    pub active_waypoint_index: usize,
    /// 0..=1 while uploading, NaN when idle or after a failed upload.
    pub flight_plan_upload_progress: f64,
    pub cameras: Vec<Camera>,
    pub obstacle_avoidance: Option<Telemetry<ObstacleAvoidance>>,
}

impl DroneState {
    pub fn new(platform: PlatformInfo) -> Self {
        Self {
            platform,
            armed_state: Telemetry::default(),
            battery: Telemetry::default(),
            remote_control: Telemetry::default(),
            health: Health::default(),
            storage: Telemetry::default(),
            gnss: Telemetry::default(),
            position: Telemetry::new(None),
            attitude: Telemetry::new(None),
            custom_mode: Telemetry::new(CustomMode::Undefined),
            landed_state: Telemetry::default(),
            autopilot_state: Telemetry::default(),
            flight_segment: Telemetry::default(),
            flight_time: Telemetry::new(Duration::ZERO),
            active_flight_plan: None,
            active_waypoint_index: 0,
            flight_plan_upload_progress: f64::NAN,
            cameras: Vec::new(),
            obstacle_avoidance: None,
        }
    }

    pub fn camera_mut(&mut self, system_id: u8, component_id: u8) -> Option<&mut Camera> {
        self.cameras
            .iter_mut()
            .find(|c| c.system_id == system_id && c.component_id == component_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_set_clears_stale() {
        let mut t = Telemetry::new(1);
        t.stale = true;
        t.set(2);
        assert!(!t.stale);
        assert_eq!(t.value, 2);
    }

    #[test]
    fn severity_mapping() {
        assert_eq!(MessageSeverity::from(MavSeverity::MAV_SEVERITY_WARNING), MessageSeverity::Warning);
        assert_eq!(MessageSeverity::from(MavSeverity::MAV_SEVERITY_NOTICE), MessageSeverity::Info);
        assert_eq!(MessageSeverity::from(MavSeverity::MAV_SEVERITY_DEBUG), MessageSeverity::Info);
        assert_eq!(MessageSeverity::from(MavSeverity::MAV_SEVERITY_CRITICAL), MessageSeverity::Error);
        assert_eq!(MessageSeverity::from(MavSeverity::MAV_SEVERITY_EMERGENCY), MessageSeverity::Error);
    }

    #[test]
    fn landed_state_mapping() {
        assert_eq!(LandedState::from(MavLandedState::MAV_LANDED_STATE_IN_AIR), LandedState::InAir);
        assert_eq!(LandedState::from(MavLandedState::MAV_LANDED_STATE_UNDEFINED), LandedState::Undefined);
    }
}
