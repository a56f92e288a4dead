use std::fmt::Write as _;
use std::sync::Arc;

use tracing::warn;

use super::{
    CameraTriggerCommand, ElevationModel, FlightPlan, FlightPlanOptions, GimbalAndAttitudeCommand,
    LandCommand, MissionItem, TakeoffCommand, WayPoint,
};
use crate::error::DroneError;
use crate::model::Position;

const HOLD_AT_WAYPOINTS_SECONDS: f64 = 0.5;

#[derive(Debug, Clone)]
struct MissionItemInfo {
    item: MissionItem,
    waypoint_index: usize,
}

/// A flight plan expressed as an ordered MAVLink mission, with the mapping back to waypoints.
#[derive(Debug, Clone)]
pub struct MavlinkFlightPlan {
    infos: Vec<MissionItemInfo>,
    options: FlightPlanOptions,
    start_altitude_position: Position,
    flight_plan: Arc<FlightPlan>,
    first_waypoint_index: usize,
    land_automatically: bool,
}

impl MavlinkFlightPlan {
    /// Translates `flight_plan` starting at `waypoint_index`.
    ///
    /// The start index is clamped into the waypoint range. An empty plan yields an empty mission.
    pub fn from_flight_plan(
        flight_plan: Arc<FlightPlan>,
        waypoint_index: usize,
        options: &FlightPlanOptions,
        start_altitude_position: Position,
        elevation: &dyn ElevationModel,
    ) -> Self {
        let mut translated = Self {
            infos: Vec::new(),
            options: options.clone(),
            start_altitude_position,
            flight_plan: Arc::clone(&flight_plan),
            first_waypoint_index: 0,
            land_automatically: false,
        };
        translated.add_waypoints(&flight_plan, waypoint_index, elevation);
        translated
    }

    fn add_waypoints(&mut self, plan: &FlightPlan, waypoint_index: usize, elevation: &dyn ElevationModel) {
        let waypoints = &plan.waypoints;
        if waypoints.is_empty() {
            return;
        }

        let first = waypoint_index.min(waypoints.len() - 1);
        self.first_waypoint_index = first;
        let last = waypoints.len() - 1;
        let options = self.options.clone();
        let send_all = options.send_also_non_changed_values;
        let radius = options.acceptance_radius_meters as f32;
        let hold = if plan.stop_at_waypoints {
            HOLD_AT_WAYPOINTS_SECONDS
        } else {
            0.0
        };

        let mut last_speed: Option<f64> = None;
        let mut last_gimbal: Option<(f64, f64)> = None;

        for (i, wp) in waypoints.iter().enumerate().skip(first) {
            if options.set_speed_at_each_waypoint && (send_all || last_speed != Some(wp.speed_mps)) {
                last_speed = Some(wp.speed_mps);
                self.push(MissionItem::change_speed(wp.speed_mps, true), i);
            }

            if i == first {
                self.add_takeoff(wp, i, hold, radius);
            }

            if send_all || options.gimbal_and_attitude_command == GimbalAndAttitudeCommand::SetRoi {
                let roi = wp.target_position(options.default_roi_distance_meters);
                self.push(MissionItem::set_roi_location(&roi, true), i);
            }

            self.push(
                MissionItem::waypoint(&wp.position, wp.yaw_degrees, hold, radius, true),
                i,
            );

            if options.gimbal_and_attitude_command == GimbalAndAttitudeCommand::MountControl {
                let gimbal = (wp.pitch_degrees, wp.roll_degrees);
                if send_all || last_gimbal != Some(gimbal) {
                    last_gimbal = Some(gimbal);
                    self.push(
                        MissionItem::mount_control(wp.pitch_degrees, wp.roll_degrees, 0.0, true),
                        i,
                    );
                }
            }

            self.add_camera_trigger(wp, i);

            if i == last {
                self.add_landing(plan, wp, i, radius, elevation);
            }
        }
    }

    fn add_takeoff(&mut self, wp: &WayPoint, i: usize, hold: f64, radius: f32) {
        let start = self.start_altitude_position;
        match self.options.takeoff_command {
            TakeoffCommand::None => {}
            TakeoffCommand::Takeoff => self.push(MissionItem::takeoff(&start, true), i),
            TakeoffCommand::WaypointAndTakeoff => {
                self.push(MissionItem::waypoint(&start, wp.yaw_degrees, hold, radius, true), i);
                self.push(MissionItem::takeoff(&start, true), i);
            }
            TakeoffCommand::VtolTakeoff => self.push(MissionItem::vtol_takeoff(&start, true), i),
            TakeoffCommand::WaypointAndVtolTakeoff => {
                self.push(MissionItem::waypoint(&start, wp.yaw_degrees, hold, radius, true), i);
                self.push(MissionItem::vtol_takeoff(&start, true), i);
            }
        }
    }

    fn add_camera_trigger(&mut self, wp: &WayPoint, i: usize) {
        // distance triggering is a fixed-wing feature of the trigger-distance encoding
        let by_distance = !self.options.copter_mode
            && self.options.camera_trigger_command == CameraTriggerCommand::SetCameraTriggerDistance;
        let trigger_distance = if by_distance {
            wp.trigger_distance_meters.filter(|d| *d > 0.0)
        } else {
            None
        };
        let image_here = wp.trigger_image_here_copter_mode && self.options.copter_mode;

        if trigger_distance.is_none() && !image_here {
            return;
        }

        match self.options.camera_trigger_command {
            CameraTriggerCommand::None => {}
            CameraTriggerCommand::ImageStartCapture => {
                self.push(MissionItem::image_start_capture(i, true), i)
            }
            CameraTriggerCommand::DoDigicamControl => self.push(MissionItem::digicam_control(true), i),
            CameraTriggerCommand::SetCameraTriggerDistance => match trigger_distance {
                Some(distance) if distance < f64::from(f32::MAX) => self.push(
                    MissionItem::set_camera_trigger_distance(distance as f32, false, true),
                    i,
                ),
                _ => self.push(MissionItem::set_camera_trigger_distance(0.0, true, true), i),
            },
        }
    }

    fn add_landing(
        &mut self,
        plan: &FlightPlan,
        wp: &WayPoint,
        i: usize,
        radius: f32,
        elevation: &dyn ElevationModel,
    ) {
        let landing = match plan.landing_position {
            Some(p) if !p.lat_lon().is_unset() => p.lat_lon(),
            _ => {
                warn!("No landing position available for flight plan {}", plan.name);
                return;
            }
        };

        self.land_automatically = plan.land_automatically;
        if plan.land_automatically {
            let ground_relative_to_takeoff = match plan.takeoff_position {
                Some(takeoff) if !takeoff.lat_lon().is_unset() => {
                    elevation.elevation(landing) - elevation.elevation(takeoff.lat_lon())
                }
                _ => 0.0,
            };
            let target = Position::from_lat_lon(landing, ground_relative_to_takeoff);

            match self.options.land_command {
                LandCommand::None => {}
                LandCommand::Land => self.push(MissionItem::land(&target, true), i),
                LandCommand::VtolLand => self.push(MissionItem::vtol_land(&target, true), i),
            }
        } else {
            match plan.landing_hover_altitude {
                Some(altitude) if altitude > 0.0 => {
                    let target = Position::from_lat_lon(landing, altitude);
                    self.push(
                        MissionItem::waypoint(&target, wp.yaw_degrees, 0.0, radius, true),
                        i,
                    );
                }
                _ => warn!("Hover altitude for landing not set in flight plan {}", plan.name),
            }
        }
    }

    fn push(&mut self, item: MissionItem, waypoint_index: usize) {
        let seq = self.infos.len() as u16;
        self.infos.push(MissionItemInfo {
            item: item.at_sequence_index(seq),
            waypoint_index,
        });
    }

    pub fn mission_items(&self) -> Vec<MissionItem> {
        self.infos.iter().map(|info| info.item.clone()).collect()
    }

    pub fn mission_item_count(&self) -> usize {
        self.infos.len()
    }

    pub fn waypoint_index_for_mission_item(&self, seq: usize) -> Result<usize, DroneError> {
        self.infos
            .get(seq)
            .map(|info| info.waypoint_index)
            .ok_or(DroneError::MissionItemOutOfRange {
                seq,
                count: self.infos.len(),
            })
    }

    pub fn start_altitude_position(&self) -> &Position {
        &self.start_altitude_position
    }

    /// Waypoint the mission starts at, after clamping.
    pub fn first_waypoint_index(&self) -> usize {
        self.first_waypoint_index
    }

    pub fn land_automatically(&self) -> bool {
        self.land_automatically
    }

    pub fn flight_plan(&self) -> &Arc<FlightPlan> {
        &self.flight_plan
    }

    pub fn options(&self) -> &FlightPlanOptions {
        &self.options
    }

    pub fn debug_description(&self) -> String {
        if self.infos.is_empty() {
            return "Empty MAVLink mission".to_string();
        }

        let mut out = format!("MAVLink mission with {} mission items\n", self.infos.len());
        for info in &self.infos {
            let _ = writeln!(out, "waypoint #{}: {}", info.waypoint_index, info.item);
        }
        out
    }
}
