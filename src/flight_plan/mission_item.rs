use std::fmt;

use mavlink::common::{MavCmd, MavFrame};

use crate::model::Position;

const VTOL_TRANSITION_HEADING_NEXT_WAYPOINT: f32 = 1.0;
const MAV_MOUNT_MODE_MAVLINK_TARGETING: f32 = 2.0;
const SPEED_TYPE_GROUND_SPEED: f32 = 1.0;

/// One mission command in upload order.
///
/// `seq` is assigned by the translator when the item is emitted and never changes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionItem {
    pub seq: u16,
    pub frame: MavFrame,
    pub command: MavCmd,
    pub param1: f32,
    pub param2: f32,
    pub param3: f32,
    pub param4: f32,
    /// Latitude in 1e-7 degrees, or param5 for non-positional commands.
    pub x: i32,
    /// Longitude in 1e-7 degrees, or param6 for non-positional commands.
    pub y: i32,
    /// Altitude in meters relative to home, or param7.
    pub z: f32,
    pub autocontinue: bool,
}

impl MissionItem {
    fn command(command: MavCmd, autocontinue: bool) -> Self {
        Self {
            seq: 0,
            frame: MavFrame::MAV_FRAME_MISSION,
            command,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            x: 0,
            y: 0,
            z: 0.0,
            autocontinue,
        }
    }

    fn positional(command: MavCmd, position: &Position, autocontinue: bool) -> Self {
        Self {
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT,
            x: to_e7(position.latitude),
            y: to_e7(position.longitude),
            z: position.altitude as f32,
            ..Self::command(command, autocontinue)
        }
    }

    pub fn at_sequence_index(self, seq: u16) -> Self {
        Self { seq, ..self }
    }

    pub fn change_speed(ground_speed_mps: f64, autocontinue: bool) -> Self {
        Self {
            param1: SPEED_TYPE_GROUND_SPEED,
            param2: ground_speed_mps as f32,
            param3: -1.0,
            ..Self::command(MavCmd::MAV_CMD_DO_CHANGE_SPEED, autocontinue)
        }
    }

    pub fn takeoff(position: &Position, autocontinue: bool) -> Self {
        Self {
            param4: f32::NAN,
            ..Self::positional(MavCmd::MAV_CMD_NAV_TAKEOFF, position, autocontinue)
        }
    }

    pub fn vtol_takeoff(position: &Position, autocontinue: bool) -> Self {
        Self {
            param2: VTOL_TRANSITION_HEADING_NEXT_WAYPOINT,
            param4: f32::NAN,
            ..Self::positional(MavCmd::MAV_CMD_NAV_VTOL_TAKEOFF, position, autocontinue)
        }
    }

    pub fn waypoint(
        position: &Position,
        yaw_degrees: f64,
        hold_seconds: f64,
        acceptance_radius_meters: f32,
        autocontinue: bool,
    ) -> Self {
        Self {
            param1: hold_seconds as f32,
            param2: acceptance_radius_meters,
            param4: yaw_degrees as f32,
            ..Self::positional(MavCmd::MAV_CMD_NAV_WAYPOINT, position, autocontinue)
        }
    }

    pub fn set_roi_location(target: &Position, autocontinue: bool) -> Self {
        Self::positional(MavCmd::MAV_CMD_DO_SET_ROI_LOCATION, target, autocontinue)
    }

    pub fn mount_control(pitch_degrees: f64, roll_degrees: f64, yaw_degrees: f64, autocontinue: bool) -> Self {
        Self {
            param1: pitch_degrees as f32,
            param2: roll_degrees as f32,
            param3: yaw_degrees as f32,
            z: MAV_MOUNT_MODE_MAVLINK_TARGETING,
            ..Self::command(MavCmd::MAV_CMD_DO_MOUNT_CONTROL, autocontinue)
        }
    }

    /// Single image, `sequence` numbers the capture within the mission.
    pub fn image_start_capture(sequence: usize, autocontinue: bool) -> Self {
        Self {
            param2: 0.0,
            param3: 1.0,
            param4: sequence as f32,
            ..Self::command(MavCmd::MAV_CMD_IMAGE_START_CAPTURE, autocontinue)
        }
    }

    pub fn digicam_control(autocontinue: bool) -> Self {
        Self {
            x: 1,
            ..Self::command(MavCmd::MAV_CMD_DO_DIGICAM_CONTROL, autocontinue)
        }
    }

    /// A distance of 0 stops distance based triggering.
    pub fn set_camera_trigger_distance(distance_meters: f32, trigger_immediately: bool, autocontinue: bool) -> Self {
        Self {
            param1: distance_meters,
            param2: -1.0,
            param3: if trigger_immediately { 1.0 } else { 0.0 },
            ..Self::command(MavCmd::MAV_CMD_DO_SET_CAM_TRIGG_DIST, autocontinue)
        }
    }

    pub fn land(position: &Position, autocontinue: bool) -> Self {
        Self {
            param4: f32::NAN,
            ..Self::positional(MavCmd::MAV_CMD_NAV_LAND, position, autocontinue)
        }
    }

    pub fn vtol_land(position: &Position, autocontinue: bool) -> Self {
        Self {
            param4: f32::NAN,
            ..Self::positional(MavCmd::MAV_CMD_NAV_VTOL_LAND, position, autocontinue)
        }
    }
}

impl fmt::Display for MissionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:?} [{}, {}, {}, {}] ({}, {}, {})",
            self.seq, self.command, self.param1, self.param2, self.param3, self.param4, self.x, self.y, self.z
        )
    }
}

fn to_e7(degrees: f64) -> i32 {
    (degrees * 1e7).round() as i32
}
