use std::sync::Arc;

use tracing::{debug, info, warn};

use super::MavlinkDrone;
use crate::error::DroneError;
use crate::flight_plan::{self, FlightPlan, MavlinkFlightPlan};
use crate::model::{ArmedState, AutopilotState, DroneState, FlightSegment};

/// Clears the active plan when a command chain does not run to completion, including when its
/// future is dropped half way.
struct Rollback<'a> {
    drone: &'a MavlinkDrone,
    armed: bool,
}

impl<'a> Rollback<'a> {
    fn new(drone: &'a MavlinkDrone) -> Self {
        Self { drone, armed: true }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!("Command chain incomplete, clearing active flight plan");
        if let Err(e) = self.drone.clear_active_plan() {
            warn!("Rollback of the active flight plan failed: {}", e);
        }
    }
}

impl MavlinkDrone {
    fn require_autopilot(&self) -> Result<DroneState, DroneError> {
        let state = self.inner.snapshot()?;
        if state.autopilot_state.value != AutopilotState::Autopilot {
            return Err(DroneError::precondition("Drone not in Automatic mode"));
        }
        Ok(state)
    }

    /// Uploads `plan`, arms and starts the mission from the ground.
    ///
    /// An armed vehicle is disarmed first when the platform allows it. Once anything has been
    /// sent, a failure clears the active plan but leaves the arming state as it is.
    pub async fn take_off(
        &self,
        plan: Option<Arc<FlightPlan>>,
        waypoint_index: usize,
    ) -> Result<(), DroneError> {
        let state = self.require_autopilot()?;
        let plan = plan.ok_or_else(|| DroneError::precondition("No flight plan"))?;
        if state.flight_segment.value != FlightSegment::OnGround {
            return Err(DroneError::precondition("Drone not on ground"));
        }
        let disarm_first = state.armed_state.value != ArmedState::Disarmed;
        if disarm_first && !self.inner.platform.flight_plan.auto_disarm_before_takeoff {
            return Err(DroneError::precondition("Drone already armed"));
        }

        info!("Take off with flight plan {}", plan.name);
        let rollback = Rollback::new(self);

        if disarm_first {
            debug!("Disarming before takeoff");
            self.inner.connection.arm_disarm(false).await?;
        }

        self.set_active_flight_plan(Some(plan), waypoint_index)
            .await?;

        let state = self.inner.snapshot()?;
        self.profile().pre_arm_check(&state)?;

        debug!("Arming");
        self.inner.connection.arm_disarm(true).await?;

        self.require_autopilot()?;
        debug!("Switching to mission mode");
        self.inner
            .connection
            .set_mode(self.profile().mission_mode())
            .await?;

        rollback.commit();
        Ok(())
    }

    pub async fn abort_take_off(&self) -> Result<(), DroneError> {
        self.land().await
    }

    pub async fn land(&self) -> Result<(), DroneError> {
        self.require_autopilot()?;
        let mode = self.profile().land_mode()?;
        info!("Landing");
        self.inner.connection.set_mode(mode).await?;
        Ok(())
    }

    pub async fn abort_landing(&self) -> Result<(), DroneError> {
        self.pause_flight_plan().await
    }

    /// Interrupts whatever runs, uploads `plan` and flies it from `waypoint_index`.
    pub async fn start_flight_plan(
        &self,
        plan: Option<Arc<FlightPlan>>,
        waypoint_index: usize,
    ) -> Result<(), DroneError> {
        let plan = plan.ok_or_else(|| DroneError::precondition("No flight plan"))?;
        self.require_autopilot()?;

        info!("Start flight plan {} at waypoint {}", plan.name, waypoint_index);
        let rollback = Rollback::new(self);

        self.pause_flight_plan().await?;
        self.set_active_flight_plan(Some(plan), waypoint_index)
            .await?;

        self.require_autopilot()?;
        debug!("Switching to mission mode");
        self.inner
            .connection
            .set_mode(self.profile().mission_mode())
            .await?;

        rollback.commit();
        Ok(())
    }

    pub async fn pause_flight_plan(&self) -> Result<(), DroneError> {
        self.require_autopilot()?;
        debug!("Switching to loiter mode");
        self.inner
            .connection
            .set_mode(self.profile().loiter_mode())
            .await?;
        Ok(())
    }

    pub async fn return_home(&self) -> Result<(), DroneError> {
        self.require_autopilot()?;
        info!("Returning home");
        self.inner
            .connection
            .set_mode(self.profile().return_home_mode())
            .await?;
        Ok(())
    }

    /// Replaces the mission on the vehicle. `None` only clears it.
    ///
    /// The new plan is translated against the current position, the family's autopilot
    /// parameters are written, and after a successful upload the plan and a fresh generation of
    /// progress subscriptions are installed together.
    pub async fn set_active_flight_plan(
        &self,
        plan: Option<Arc<FlightPlan>>,
        waypoint_index: usize,
    ) -> Result<(), DroneError> {
        self.clear_active_plan()?;
        self.inner.connection.clear_mission().await?;

        let Some(plan) = plan else {
            return Ok(());
        };

        let options = &self.inner.platform.flight_plan;
        options.verify()?;

        let state = self.inner.snapshot()?;
        let current = state
            .position
            .value
            .as_ref()
            .ok_or_else(|| DroneError::precondition("Current position unavailable"))?;
        let start = flight_plan::start_altitude_position(&plan, current, state.landed_state.value);

        let mission = Arc::new(MavlinkFlightPlan::from_flight_plan(
            Arc::clone(&plan),
            waypoint_index,
            options,
            start,
            self.inner.elevation.as_ref(),
        ));

        let parameters = self
            .profile()
            .autopilot_parameters(&mission, &self.inner.platform);
        if !parameters.is_empty() {
            info!("Setting autopilot parameters: {:?}", parameters);
            self.inner.connection.set_parameters(parameters).await?;
        }

        self.clear_active_plan()?;
        info!("Uploading {}", mission.debug_description());
        let inner = Arc::clone(&self.inner);
        let progress = move |fraction: f64| {
            let _ = inner.update(|state| state.flight_plan_upload_progress = fraction);
        };

        let uploaded = self
            .inner
            .connection
            .upload_mission(mission.mission_items(), &progress)
            .await;
        if let Err(e) = uploaded {
            self.inner
                .update(|state| state.flight_plan_upload_progress = f64::NAN)?;
            return Err(e.into());
        }

        self.install_mission(plan, mission)
    }

    fn install_mission(
        &self,
        plan: Arc<FlightPlan>,
        mission: Arc<MavlinkFlightPlan>,
    ) -> Result<(), DroneError> {
        let first_waypoint = mission.first_waypoint_index();
        let mut slot = self.inner.slot()?;
        let (generation, cancel) = slot.install(Arc::clone(&mission), &self.inner.scope);
        self.inner.update(|state| {
            state.active_flight_plan = Some(plan);
            state.active_waypoint_index = first_waypoint;
            for camera in &mut state.cameras {
                camera.image_count = 0;
            }
        })?;
        self.spawn_progress_subscriptions(generation, cancel, mission);
        debug!("Flight plan generation {} active", generation);
        Ok(())
    }

    /// Mission currently uploaded and tracked, if any.
    pub fn active_mission(&self) -> Result<Option<Arc<MavlinkFlightPlan>>, DroneError> {
        Ok(self.inner.slot()?.mission().cloned())
    }
}
