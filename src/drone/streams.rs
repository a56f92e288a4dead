use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mavlink::common::{
    MavAutopilot, MavMessage, MavType, ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA,
    STATUSTEXT_DATA, SYS_STATUS_DATA,
};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::MavlinkDrone;
use crate::connection::{ReceivedMessage, RequestTimeout};
use crate::error::{ConnectionException, DroneError};
use crate::flight_plan::MavlinkFlightPlan;
use crate::model::{
    ArmedState, AutopilotState, Battery, CalibrationStatus, Camera, DroneMessage, FlightSegment,
    GnssInfo, LandedState, Position, Quaternion, RemoteControl, Storage, Telemetry, VideoStream,
};
use crate::telemetry::{flight_duration, spawn_stream, TelemetryStream};
use crate::util::text_from_bytes;
use crate::vehicle::{self, CustomMode};

fn vehicle_heartbeat(received: &ReceivedMessage) -> Option<HEARTBEAT_DATA> {
    match &received.message {
        MavMessage::HEARTBEAT(hb)
            if hb.autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID
                && hb.mavtype != MavType::MAV_TYPE_CAMERA =>
        {
            Some(hb.clone())
        }
        _ => None,
    }
}

fn camera_heartbeat(received: &ReceivedMessage) -> Option<(u8, u8)> {
    match &received.message {
        MavMessage::HEARTBEAT(hb) if hb.mavtype == MavType::MAV_TYPE_CAMERA => {
            Some((received.header.system_id, received.header.component_id))
        }
        _ => None,
    }
}

impl MavlinkDrone {
    fn watch_stream<T, X, H, S>(
        &self,
        name: &'static str,
        timeout: Option<Duration>,
        extract: X,
        on_sample: H,
        on_stale: S,
    )
    where
        T: Send + 'static,
        X: Fn(&ReceivedMessage) -> Option<T> + Send + 'static,
        H: FnMut(T) + Send + 'static,
        S: FnMut() + Send + 'static,
    {
        spawn_stream(
            TelemetryStream::new(name, timeout, extract),
            self.inner.connection.subscribe(),
            self.inner.scope.child_token(),
            on_sample,
            on_stale,
        );
    }

    /// Handler failures are reported but never stop the stream.
    fn report(&self, stream: &'static str, result: Result<(), DroneError>) {
        if let Err(e) = result {
            self.inner
                .raise(ConnectionException::with_cause(stream, true, e));
        }
    }

    pub(super) fn start_streams(&self) {
        let link_lost = Some(self.inner.settings.link_lost_timeout);
        let timeout = Some(self.inner.settings.stream_timeout);

        let (d, s) = (self.clone(), self.clone());
        self.watch_stream(
            "HEARTBEAT",
            link_lost,
            vehicle_heartbeat,
            move |hb| d.report("HEARTBEAT", d.on_heartbeat(&hb)),
            move || s.report("HEARTBEAT", s.on_heartbeat_lost()),
        );

        let d = self.clone();
        self.watch_stream(
            "HEARTBEAT",
            None,
            camera_heartbeat,
            move |(system_id, component_id)| {
                d.report("HEARTBEAT", d.on_camera_heartbeat(system_id, component_id))
            },
            || {},
        );

        let (d, s) = (self.clone(), self.clone());
        self.watch_stream(
            "SYS_STATUS",
            timeout,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::SYS_STATUS(data) => Some(data.clone()),
                _ => None,
            },
            move |data| d.report("SYS_STATUS", d.on_sys_status(&data)),
            move || {
                let result = s.inner.update(|state| {
                    state.battery.stale = true;
                    state.remote_control.stale = true;
                });
                s.report("SYS_STATUS", result)
            },
        );

        let (d, s) = (self.clone(), self.clone());
        self.watch_stream(
            "GLOBAL_POSITION_INT",
            timeout,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::GLOBAL_POSITION_INT(data) => Some(data.clone()),
                _ => None,
            },
            move |data| d.report("GLOBAL_POSITION_INT", d.on_position(&data)),
            move || s.report("GLOBAL_POSITION_INT", s.on_position_lost()),
        );

        let (d, s) = (self.clone(), self.clone());
        self.watch_stream(
            "GPS_RAW_INT",
            timeout,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::GPS_RAW_INT(data) => Some(GnssInfo::from_gps_raw(data)),
                _ => None,
            },
            move |gnss| d.report("GPS_RAW_INT", d.inner.update(|state| state.gnss.set(gnss))),
            move || s.report("GPS_RAW_INT", s.inner.update(|state| state.gnss.stale = true)),
        );

        let (d, s) = (self.clone(), self.clone());
        self.watch_stream(
            "ATTITUDE",
            timeout,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::ATTITUDE(data) => Some(attitude(data)),
                _ => None,
            },
            move |q| d.report("ATTITUDE", d.inner.update(|state| state.attitude.set(Some(q)))),
            move || s.report("ATTITUDE", s.inner.update(|state| state.attitude.stale = true)),
        );

        if self.profile().uses_extended_sys_state() {
            let (d, s) = (self.clone(), self.clone());
            self.watch_stream(
                "EXTENDED_SYS_STATE",
                timeout,
                |m: &ReceivedMessage| match &m.message {
                    MavMessage::EXTENDED_SYS_STATE(data) => Some(LandedState::from(data.landed_state)),
                    _ => None,
                },
                move |landed| {
                    let result = d.update_flight_state(|state| state.landed_state.set(landed));
                    d.report("EXTENDED_SYS_STATE", result)
                },
                move || {
                    let result = s.update_flight_state(|state| state.landed_state.stale = true);
                    s.report("EXTENDED_SYS_STATE", result)
                },
            );
        }

        let d = self.clone();
        self.watch_stream(
            "STATUSTEXT",
            None,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::STATUSTEXT(data) => Some(data.clone()),
                _ => None,
            },
            move |data| d.on_status_text(&data),
            || {},
        );

        let d = self.clone();
        self.watch_stream(
            "CAMERA_IMAGE_CAPTURED",
            None,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::CAMERA_IMAGE_CAPTURED(_) => {
                    Some((m.header.system_id, m.header.component_id))
                }
                _ => None,
            },
            move |(system_id, component_id)| {
                let result = d.update_camera(system_id, component_id, |camera| {
                    camera.image_count += 1;
                });
                d.report("CAMERA_IMAGE_CAPTURED", result)
            },
            || {},
        );

        let d = self.clone();
        self.watch_stream(
            "VIDEO_STREAM_INFORMATION",
            None,
            |m: &ReceivedMessage| match &m.message {
                MavMessage::VIDEO_STREAM_INFORMATION(data) => Some((
                    m.header.system_id,
                    m.header.component_id,
                    VideoStream::from(data),
                )),
                _ => None,
            },
            move |(system_id, component_id, stream)| {
                let result = d.update_camera(system_id, component_id, |camera| {
                    camera.update_stream(stream);
                });
                d.report("VIDEO_STREAM_INFORMATION", result)
            },
            || {},
        );

        if self.profile().has_obstacle_avoidance() {
            let (d, s) = (self.clone(), self.clone());
            self.watch_stream(
                "OBSTACLE_DISTANCE",
                timeout,
                |m: &ReceivedMessage| match &m.message {
                    MavMessage::OBSTACLE_DISTANCE(data) => Some(data.clone()),
                    _ => None,
                },
                move |data| {
                    let result = d.inner.update(|state| {
                        if let Some(oa) = state.obstacle_avoidance.as_mut() {
                            oa.stale = false;
                            oa.value.update(&data);
                        }
                    });
                    d.report("OBSTACLE_DISTANCE", result)
                },
                move || {
                    let result = s.inner.update(|state| {
                        if let Some(oa) = state.obstacle_avoidance.as_mut() {
                            oa.stale = true;
                        }
                    });
                    s.report("OBSTACLE_DISTANCE", result)
                },
            );
        }

        if self.profile().polls_storage() {
            self.spawn_storage_poll();
        }
    }

    fn on_heartbeat(&self, heartbeat: &HEARTBEAT_DATA) -> Result<(), DroneError> {
        let profile = self.profile();
        let armed = vehicle::armed_state(heartbeat);
        let mode = match vehicle::decode_heartbeat(profile, heartbeat) {
            Ok(mode) => mode,
            Err(mismatch) => {
                self.inner
                    .raise(ConnectionException::new("HEARTBEAT", true, mismatch.to_string()));
                CustomMode::Undefined
            }
        };

        self.update_flight_state(|state| {
            state.armed_state.set(armed);
            state.custom_mode.set(mode);
            let altitude = state.position.value.as_ref().map(|p| p.altitude);
            if let Some(landed) = profile.approximate_landed_state(armed, altitude) {
                state.landed_state.set(landed);
            }
        })
    }

    fn on_heartbeat_lost(&self) -> Result<(), DroneError> {
        self.inner
            .raise(ConnectionException::new("HEARTBEAT", true, "Connection timeout"));
        self.update_flight_state(|state| {
            state.armed_state = Telemetry {
                value: ArmedState::Unknown,
                stale: true,
            };
            state.custom_mode.stale = true;
        })
    }

    fn on_camera_heartbeat(&self, system_id: u8, component_id: u8) -> Result<(), DroneError> {
        self.update_camera(system_id, component_id, |_| {})
    }

    /// Applies `f` to the camera component, registering it on first sight.
    fn update_camera(
        &self,
        system_id: u8,
        component_id: u8,
        f: impl FnOnce(&mut Camera),
    ) -> Result<(), DroneError> {
        self.inner.update(|state| {
            if state.camera_mut(system_id, component_id).is_none() {
                info!("Camera {}:{} discovered", system_id, component_id);
                state.cameras.push(Camera::new(system_id, component_id));
            }
            if let Some(camera) = state.camera_mut(system_id, component_id) {
                f(camera);
            }
        })
    }

    fn on_sys_status(&self, data: &SYS_STATUS_DATA) -> Result<(), DroneError> {
        let battery = Battery::from_sys_status(data.voltage_battery, data.battery_remaining);
        let remote_control = RemoteControl::from_sys_status(data);
        self.inner.update(|state| {
            state.battery.set(battery);
            state.remote_control.set(remote_control);
        })
    }

    fn on_position(&self, data: &GLOBAL_POSITION_INT_DATA) -> Result<(), DroneError> {
        let profile = self.profile();
        let position = Position::new(
            f64::from(data.lat) / 1e7,
            f64::from(data.lon) / 1e7,
            f64::from(data.relative_alt) / 1000.0,
        );

        self.update_flight_state(|state| {
            let altitude = position.altitude;
            state.position.set(Some(position));
            if let Some(landed) = profile.approximate_landed_state(state.armed_state.value, Some(altitude)) {
                state.landed_state.set(landed);
            }
        })
    }

    fn on_position_lost(&self) -> Result<(), DroneError> {
        let approximated = !self.profile().uses_extended_sys_state();
        self.update_flight_state(|state| {
            state.position.stale = true;
            if approximated {
                state.landed_state.stale = true;
            }
        })
    }

    fn on_status_text(&self, data: &STATUSTEXT_DATA) {
        let text = text_from_bytes(&data.text);
        if !self.profile().accept_status_text(&text) {
            debug!("Suppressed status text: {}", text);
            return;
        }

        info!("Vehicle says: {}", text);
        let message = DroneMessage {
            text,
            severity: data.severity.into(),
            timestamp: Utc::now(),
        };
        let _ = self.inner.events.send(super::DroneEvent::Message(message));
    }

    fn spawn_storage_poll(&self) {
        let drone = self.clone();
        let cancel = self.inner.scope.child_token();
        let period = self.inner.settings.storage_poll_interval;

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => drone.poll_storage().await,
                }
            }
        });
    }

    async fn poll_storage(&self) {
        let storage = match self.inner.connection.request_storage_information().await {
            Ok(info) => Telemetry::new(Storage::from_storage_information(&info)),
            Err(e) if e.downcast_ref::<RequestTimeout>().is_some() => Telemetry {
                value: Storage::unknown(),
                stale: true,
            },
            Err(e) => {
                warn!("Storage information request failed: {}", e);
                Telemetry::new(Storage::device_error())
            }
        };
        let result = self.inner.update(|state| state.storage = storage);
        self.report("STORAGE_INFORMATION", result);
    }

    pub(super) fn request_initial_information(&self) {
        let drone = self.clone();
        tokio::spawn(async move {
            drone.check_calibration().await;
            drone.request_flight_time().await;
        });
    }

    async fn check_calibration(&self) {
        let ids = self.profile().calibration_parameters();
        if ids.is_empty() {
            return;
        }

        let status = match self.inner.connection.request_parameters(ids).await {
            Ok(params) if params.iter().any(|p| p.int_value() == 0) => {
                warn!("Sensor calibration needed");
                CalibrationStatus::CalibrationNeeded
            }
            Ok(_) => CalibrationStatus::Ok,
            Err(e) => {
                warn!("Calibration parameters unavailable: {}", e);
                CalibrationStatus::Unknown
            }
        };
        let result = self
            .inner
            .update(|state| state.health.calibration_status = status);
        self.report("PARAM_VALUE", result);
    }

    /// Picks up a flight that was already running when the link came up.
    async fn request_flight_time(&self) {
        if !self.profile().reports_flight_information() {
            return;
        }

        match self.inner.connection.request_flight_information().await {
            Ok(info) => {
                if let Some(elapsed) = flight_duration(&info, Utc::now()) {
                    self.resume_flight_timer(elapsed);
                }
            }
            Err(e) => {
                warn!("Flight information unavailable: {}", e);
                let result = self.inner.update(|state| state.flight_time.stale = true);
                self.report("FLIGHT_INFORMATION", result);
            }
        }
    }

    /// Follows MISSION_CURRENT and MISSION_ITEM_REACHED for one installed mission.
    pub(super) fn spawn_progress_subscriptions(
        &self,
        generation: u64,
        cancel: CancellationToken,
        mission: Arc<MavlinkFlightPlan>,
    ) {
        let (drone, m) = (self.clone(), Arc::clone(&mission));
        spawn_stream(
            TelemetryStream::new("MISSION_CURRENT", None, |msg: &ReceivedMessage| {
                match &msg.message {
                    MavMessage::MISSION_CURRENT(data) => Some(data.seq),
                    _ => None,
                }
            }),
            self.inner.connection.subscribe(),
            cancel.clone(),
            move |seq| {
                let result = drone.on_mission_current(generation, &m, seq);
                drone.report("MISSION_CURRENT", result)
            },
            || {},
        );

        let drone = self.clone();
        spawn_stream(
            TelemetryStream::new("MISSION_ITEM_REACHED", None, |msg: &ReceivedMessage| {
                match &msg.message {
                    MavMessage::MISSION_ITEM_REACHED(data) => Some(data.seq),
                    _ => None,
                }
            }),
            self.inner.connection.subscribe(),
            cancel,
            move |seq| {
                let result = drone.on_mission_item_reached(generation, &mission, seq);
                drone.report("MISSION_ITEM_REACHED", result)
            },
            || {},
        );
    }

    fn on_mission_current(
        &self,
        generation: u64,
        mission: &MavlinkFlightPlan,
        seq: u16,
    ) -> Result<(), DroneError> {
        let slot = self.inner.slot()?;
        if !slot.is_current(generation) {
            return Ok(());
        }

        let index = mission
            .waypoint_index_for_mission_item(usize::from(seq))
            .unwrap_or_else(|e| {
                error!("Current mission item not part of the active plan: {}", e);
                0
            });
        self.inner
            .update(|state| state.active_waypoint_index = index)
    }

    fn on_mission_item_reached(
        &self,
        generation: u64,
        mission: &MavlinkFlightPlan,
        seq: u16,
    ) -> Result<(), DroneError> {
        if usize::from(seq) + 1 != mission.mission_item_count() {
            return Ok(());
        }

        let mut slot = self.inner.slot()?;
        if !slot.is_current(generation) {
            return Ok(());
        }

        let state = self.inner.snapshot()?;
        if state.autopilot_state.value != AutopilotState::Autopilot
            || state.flight_segment.value != FlightSegment::PlanRunning
            || mission.land_automatically()
        {
            return Ok(());
        }

        info!("Last mission item {} reached, pausing", seq);
        self.clear_active_plan_locked(&mut slot)?;
        drop(slot);

        let drone = self.clone();
        tokio::spawn(async move {
            if let Err(e) = drone.pause_flight_plan().await {
                error!("Pause after the last mission item failed: {}", e);
            }
        });
        Ok(())
    }
}

fn attitude(data: &ATTITUDE_DATA) -> Quaternion {
    Quaternion::from_roll_pitch_yaw(
        f64::from(data.roll),
        f64::from(data.pitch),
        f64::from(data.yaw),
    )
}
