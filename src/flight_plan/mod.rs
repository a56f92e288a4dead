//! Flight plans and their translation into MAVLink mission items.

use serde::{Deserialize, Serialize};

mod elevation;
mod mission_item;
mod options;
mod translator;


pub use elevation::{ElevationModel, FlatElevationModel};
pub use mission_item::MissionItem;
pub use options::{
    CameraTriggerCommand, FlightPlanOptions, GimbalAndAttitudeCommand, LandCommand, TakeoffCommand,
};
pub use translator::MavlinkFlightPlan;

use crate::model::{LandedState, Position};

/// What the vehicle should do when a failsafe triggers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    None,
    Warn,
    Hold,
    #[default]
    ReturnHome,
    Land,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmergencyActions {
    pub rc_link_loss: EmergencyAction,
    pub rc_link_loss_delay_secs: f64,
    pub primary_link_loss: EmergencyAction,
    pub primary_link_loss_delay_secs: f64,
    pub geofence_breach: EmergencyAction,
    pub position_loss: EmergencyAction,
    pub position_loss_delay_secs: f64,
}

impl Default for EmergencyActions {
    fn default() -> Self {
        Self {
            rc_link_loss: EmergencyAction::ReturnHome,
            rc_link_loss_delay_secs: 5.0,
            primary_link_loss: EmergencyAction::ReturnHome,
            primary_link_loss_delay_secs: 10.0,
            geofence_breach: EmergencyAction::ReturnHome,
            position_loss: EmergencyAction::Land,
            position_loss_delay_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WayPoint {
    /// Altitude relative to the takeoff point.
    pub position: Position,
    pub yaw_degrees: f64,
    /// Camera pitch, 0 is horizontal and negative values look down.
    pub pitch_degrees: f64,
    pub roll_degrees: f64,
    pub speed_mps: f64,
    #[serde(default)]
    pub trigger_image_here_copter_mode: bool,
    /// Distance based triggering from this waypoint on, fixed-wing platforms only.
    #[serde(default)]
    pub trigger_distance_meters: Option<f64>,
}

impl WayPoint {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            yaw_degrees: 0.0,
            pitch_degrees: -90.0,
            roll_degrees: 0.0,
            speed_mps: 5.0,
            trigger_image_here_copter_mode: false,
            trigger_distance_meters: None,
        }
    }

    /// Point the camera looks at when it is `distance` meters away along the gimbal direction.
    pub fn target_position(&self, distance: f64) -> Position {
        let pitch = self.pitch_degrees.to_radians();
        let yaw = self.yaw_degrees.to_radians();
        let horizontal = distance * pitch.cos();
        self.position.offset(
            horizontal * yaw.cos(),
            horizontal * yaw.sin(),
            distance * pitch.sin(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlightPlan {
    pub name: String,
    pub waypoints: Vec<WayPoint>,
    #[serde(default)]
    pub takeoff_position: Option<Position>,
    #[serde(default)]
    pub landing_position: Option<Position>,
    #[serde(default)]
    pub land_automatically: bool,
    /// Hover altitude above takeoff at the landing point when not landing automatically.
    #[serde(default)]
    pub landing_hover_altitude: Option<f64>,
    #[serde(default)]
    pub stop_at_waypoints: bool,
    pub min_start_altitude: f64,
    pub max_start_altitude: f64,
    /// Return-to-launch altitude.
    pub safety_altitude: f64,
    #[serde(default)]
    pub emergency_actions: EmergencyActions,
}

impl FlightPlan {
    pub fn new(name: impl Into<String>, waypoints: Vec<WayPoint>) -> Self {
        Self {
            name: name.into(),
            waypoints,
            takeoff_position: None,
            landing_position: None,
            land_automatically: false,
            landing_hover_altitude: None,
            stop_at_waypoints: false,
            min_start_altitude: 5.0,
            max_start_altitude: 50.0,
            safety_altitude: 30.0,
            emergency_actions: EmergencyActions::default(),
        }
    }
}

/// Current position with the altitude pulled into the plan's start altitude band.
///
/// The upper bound only applies on the ground; a vehicle resuming in the air never descends.
pub fn start_altitude_position(plan: &FlightPlan, current: &Position, landed: LandedState) -> Position {
    let mut altitude = current.altitude;

    if altitude > plan.max_start_altitude && landed != LandedState::InAir {
        altitude = plan.max_start_altitude;
    }

    if altitude < plan.min_start_altitude {
        altitude = plan.min_start_altitude;
    }

    Position::new(current.latitude, current.longitude, altitude)
}
