use serde::{Deserialize, Serialize};

use crate::error::DroneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TakeoffCommand {
    None,
    Takeoff,
    WaypointAndTakeoff,
    VtolTakeoff,
    WaypointAndVtolTakeoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LandCommand {
    None,
    Land,
    VtolLand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GimbalAndAttitudeCommand {
    None,
    SetRoi,
    MountControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraTriggerCommand {
    None,
    ImageStartCapture,
    DoDigicamControl,
    SetCameraTriggerDistance,
}

/// How a platform wants flight plans expressed as mission items.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FlightPlanOptions {
    pub takeoff_command: TakeoffCommand,
    pub land_command: LandCommand,
    pub gimbal_and_attitude_command: GimbalAndAttitudeCommand,
    pub camera_trigger_command: CameraTriggerCommand,
    pub set_speed_at_each_waypoint: bool,
    /// Repeat speed, gimbal and ROI items even when unchanged from the previous waypoint.
    pub send_also_non_changed_values: bool,
    pub acceptance_radius_meters: f64,
    pub acceptance_angle_degrees: f64,
    pub default_roi_distance_meters: f64,
    pub auto_disarm_before_takeoff: bool,
    pub copter_mode: bool,
}

impl Default for FlightPlanOptions {
    fn default() -> Self {
        Self {
            takeoff_command: TakeoffCommand::Takeoff,
            land_command: LandCommand::Land,
            gimbal_and_attitude_command: GimbalAndAttitudeCommand::MountControl,
            camera_trigger_command: CameraTriggerCommand::ImageStartCapture,
            set_speed_at_each_waypoint: true,
            send_also_non_changed_values: false,
            acceptance_radius_meters: 1.0,
            acceptance_angle_degrees: 10.0,
            default_roi_distance_meters: 20.0,
            auto_disarm_before_takeoff: true,
            copter_mode: true,
        }
    }
}

impl FlightPlanOptions {
    pub fn verify(&self) -> Result<(), DroneError> {
        if !self.acceptance_radius_meters.is_finite() || self.acceptance_radius_meters < 0.0 {
            return Err(DroneError::Configuration(format!(
                "acceptance radius must be a non-negative distance, got {}",
                self.acceptance_radius_meters
            )));
        }

        if !(0.0..=180.0).contains(&self.acceptance_angle_degrees) {
            return Err(DroneError::Configuration(format!(
                "acceptance angle must be within [0, 180] degrees, got {}",
                self.acceptance_angle_degrees
            )));
        }

        let uses_roi = self.gimbal_and_attitude_command == GimbalAndAttitudeCommand::SetRoi
            || self.send_also_non_changed_values;
        if uses_roi
            && !(self.default_roi_distance_meters.is_finite() && self.default_roi_distance_meters > 0.0)
        {
            return Err(DroneError::Configuration(format!(
                "region of interest needs a positive default distance, got {}",
                self.default_roi_distance_meters
            )));
        }

        Ok(())
    }
}
