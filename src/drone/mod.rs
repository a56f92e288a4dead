//! The drone state machine.
//!
//! [`MavlinkDrone`] owns the observable [`DroneState`], keeps it in sync with the telemetry streams
//! of one vehicle and runs the command chains (take off, land, start/pause a flight plan). All
//! firmware specifics come from the installed [`VehicleProfile`].

use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PlatformDescription, TelemetryConfig};
use crate::connection::DroneConnection;
use crate::error::{ConnectionException, DroneError};
use crate::flight_plan::ElevationModel;
use crate::flight_time::{FlightTimeSink, FlightTimeTimer};
use crate::model::{DroneMessage, DroneState, FlightSegment, ObstacleAvoidance, Telemetry};
use crate::telemetry::flight_duration;
use crate::vehicle::{self, VehicleProfile};

mod active_plan;
mod commands;
mod streams;

#[cfg(test)]
mod tests;

use active_plan::ActivePlanSlot;

#[derive(Debug, Clone)]
pub struct DroneSettings {
    pub link_lost_timeout: Duration,
    pub stream_timeout: Duration,
    pub storage_poll_interval: Duration,
    pub flight_time_tick: Duration,
}

impl Default for DroneSettings {
    fn default() -> Self {
        Self::from(&TelemetryConfig::default())
    }
}

impl From<&TelemetryConfig> for DroneSettings {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            link_lost_timeout: Duration::from_secs_f64(config.link_lost_timeout_secs),
            stream_timeout: Duration::from_secs_f64(config.stream_timeout_secs),
            storage_poll_interval: Duration::from_secs_f64(config.storage_poll_interval_secs),
            flight_time_tick: Duration::from_millis(config.flight_time_tick_ms),
        }
    }
}

/// Things worth telling an operator about that are not part of the state.
#[derive(Debug, Clone)]
pub enum DroneEvent {
    ConnectionException(ConnectionException),
    Message(DroneMessage),
}

struct Inner {
    connection: Arc<dyn DroneConnection>,
    profile: Box<dyn VehicleProfile>,
    platform: PlatformDescription,
    settings: DroneSettings,
    elevation: Arc<dyn ElevationModel>,
    state: RwLock<DroneState>,
    state_tx: watch::Sender<DroneState>,
    events: broadcast::Sender<DroneEvent>,
    // Lock order: active_plan, then state.
    active_plan: Mutex<ActivePlanSlot>,
    scope: CancellationToken,
    flight_timer: Mutex<FlightTimeTimer>,
}

impl Inner {
    /// Applies `f` under the state lock and publishes the result.
    fn update<R>(&self, f: impl FnOnce(&mut DroneState) -> R) -> Result<R, DroneError> {
        let mut state = self
            .state
            .write()
            .map_err(|e| DroneError::Lock(e.to_string()))?;
        let result = f(&mut state);
        self.state_tx.send_replace(state.clone());
        Ok(result)
    }

    fn snapshot(&self) -> Result<DroneState, DroneError> {
        let state = self
            .state
            .read()
            .map_err(|e| DroneError::Lock(e.to_string()))?;
        Ok(state.clone())
    }

    fn slot(&self) -> Result<MutexGuard<'_, ActivePlanSlot>, DroneError> {
        self.active_plan
            .lock()
            .map_err(|e| DroneError::Lock(e.to_string()))
    }

    fn raise(&self, exception: ConnectionException) {
        warn!("{}", exception);
        let _ = self.events.send(DroneEvent::ConnectionException(exception));
    }
}

/// Handle to one vehicle. Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct MavlinkDrone {
    inner: Arc<Inner>,
}

impl MavlinkDrone {
    /// Builds the drone for `platform` and starts listening to `connection`.
    ///
    /// Must be called from within a tokio runtime. Background tasks run until [`Self::shutdown`].
    pub fn new(
        connection: Arc<dyn DroneConnection>,
        platform: PlatformDescription,
        vehicle_id: &str,
        settings: DroneSettings,
        elevation: Arc<dyn ElevationModel>,
    ) -> Self {
        let profile = vehicle::profile_for(platform.autopilot);
        let mut state = DroneState::new(platform.info(vehicle_id));
        if profile.has_obstacle_avoidance() {
            state.obstacle_avoidance = Some(Telemetry::new(ObstacleAvoidance::new(
                platform.min_safe_distance(),
            )));
        }

        let (state_tx, _) = watch::channel(state.clone());
        let (events, _) = broadcast::channel(64);
        let scope = CancellationToken::new();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let sink: FlightTimeSink = Arc::new(move |elapsed| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = inner.update(|state| state.flight_time.value = elapsed) {
                    warn!("Failed to publish flight time: {}", e);
                }
            });
            let timer = FlightTimeTimer::new(scope.child_token(), settings.flight_time_tick, sink);

            Inner {
                connection,
                profile,
                platform,
                settings,
                elevation,
                state: RwLock::new(state),
                state_tx,
                events,
                active_plan: Mutex::new(ActivePlanSlot::new()),
                scope,
                flight_timer: Mutex::new(timer),
            }
        });

        let drone = Self { inner };
        info!(
            "Drone {} ({:?}) starting",
            drone.inner.platform.name,
            drone.inner.profile.family()
        );
        drone.start_streams();
        drone.request_initial_information();
        drone
    }

    pub fn get_state_snapshot(&self) -> Result<DroneState, DroneError> {
        self.inner.snapshot()
    }

    /// Receives a snapshot after every committed state change.
    pub fn watch_state(&self) -> watch::Receiver<DroneState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<DroneEvent> {
        self.inner.events.subscribe()
    }

    pub fn platform(&self) -> &PlatformDescription {
        &self.inner.platform
    }

    /// Stops every stream, subscription and timer owned by this drone.
    pub fn shutdown(&self) {
        info!("Drone {} shutting down", self.inner.platform.name);
        self.inner.scope.cancel();
        if let Ok(mut slot) = self.inner.slot() {
            slot.clear();
        }
    }

    fn profile(&self) -> &dyn VehicleProfile {
        self.inner.profile.as_ref()
    }

    /// Applies `f` and re-derives autopilot state and flight segment from mode and landed state.
    fn update_flight_state(&self, f: impl FnOnce(&mut DroneState)) -> Result<(), DroneError> {
        let profile = self.profile();
        let change = self.inner.update(|state| {
            f(state);

            let mode = state.custom_mode.value;
            state.autopilot_state = Telemetry {
                value: profile.autopilot_state(mode),
                stale: state.custom_mode.stale,
            };

            let previous = state.flight_segment.value;
            let segment = profile.flight_segment(mode, state.landed_state.value);
            state.flight_segment = Telemetry {
                value: segment,
                stale: state.custom_mode.stale || state.landed_state.stale,
            };
            (previous != segment).then_some((previous, segment))
        })?;

        if let Some((previous, current)) = change {
            debug!("Flight segment {:?} -> {:?}", previous, current);
            self.on_flight_segment_changed(previous, current)?;
        }
        Ok(())
    }

    fn on_flight_segment_changed(
        &self,
        previous: FlightSegment,
        current: FlightSegment,
    ) -> Result<(), DroneError> {
        if current == FlightSegment::OnGround {
            self.clear_active_plan()?;
            self.stop_flight_timer()?;
        } else if previous == FlightSegment::OnGround && current.is_airborne() {
            self.start_flight_timer();
        }
        Ok(())
    }

    fn stop_flight_timer(&self) -> Result<(), DroneError> {
        self.timer()?.update(None)?;
        self.inner.update(|state| state.flight_time = Telemetry::new(Duration::ZERO))
    }

    fn timer(&self) -> Result<MutexGuard<'_, FlightTimeTimer>, DroneError> {
        self.inner
            .flight_timer
            .lock()
            .map_err(|e| DroneError::Lock(e.to_string()))
    }

    /// Starts counting flight time, back-dated to the reported takeoff when available.
    fn start_flight_timer(&self) {
        if !self.profile().reports_flight_information() {
            self.restart_timer(Duration::ZERO);
            return;
        }

        let drone = self.clone();
        tokio::spawn(async move {
            match drone.inner.connection.request_flight_information().await {
                Ok(info) => {
                    let elapsed = flight_duration(&info, chrono::Utc::now()).unwrap_or_default();
                    drone.resume_flight_timer(elapsed);
                }
                Err(e) => {
                    warn!("Flight information unavailable: {}", e);
                    drone.restart_timer(Duration::ZERO);
                    if let Err(e) = drone.inner.update(|state| state.flight_time.stale = true) {
                        warn!("Failed to mark flight time stale: {}", e);
                    }
                }
            }
        });
    }

    /// Restarts the timer from a trusted elapsed time.
    fn resume_flight_timer(&self, elapsed: Duration) {
        self.restart_timer(elapsed);
        if let Err(e) = self.inner.update(|state| state.flight_time.stale = false) {
            warn!("Failed to publish flight time: {}", e);
        }
    }

    fn restart_timer(&self, elapsed: Duration) {
        let now = tokio::time::Instant::now();
        let started = now.checked_sub(elapsed).unwrap_or(now);
        let result = self.timer().and_then(|mut timer| timer.update(Some(started)));
        if let Err(e) = result {
            warn!("Failed to start flight timer: {}", e);
        }
    }

    /// Drops the active plan, its progress subscriptions and the per-plan camera counters.
    fn clear_active_plan(&self) -> Result<(), DroneError> {
        let mut slot = self.inner.slot()?;
        self.clear_active_plan_locked(&mut slot)
    }

    fn clear_active_plan_locked(&self, slot: &mut ActivePlanSlot) -> Result<(), DroneError> {
        if slot.clear() {
            debug!("Active flight plan cleared");
        }
        self.inner.update(|state| {
            state.active_flight_plan = None;
            state.active_waypoint_index = 0;
            state.flight_plan_upload_progress = f64::NAN;
            for camera in &mut state.cameras {
                camera.image_count = 0;
            }
        })
    }
}
