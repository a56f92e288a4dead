use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use mavlink::common::{
    MavAutopilot, MavLandedState, MavMessage, MavModeFlag, MavSeverity, MavState, MavType,
    CAMERA_IMAGE_CAPTURED_DATA, EXTENDED_SYS_STATE_DATA, FLIGHT_INFORMATION_DATA,
    GLOBAL_POSITION_INT_DATA, GPS_RAW_INT_DATA, HEARTBEAT_DATA, MISSION_CURRENT_DATA,
    MISSION_ITEM_REACHED_DATA, OBSTACLE_DISTANCE_DATA, STATUSTEXT_DATA, STORAGE_INFORMATION_DATA,
    SYS_STATUS_DATA,
};

use super::*;
use crate::connection::mock::{Command, CommandKind, MockConnection};
use crate::connection::ParamValue;
use crate::flight_plan::{FlatElevationModel, FlightPlan, WayPoint};
use crate::model::{
    ArmedState, AutopilotState, CalibrationStatus, GnssState, LandedState, MessageSeverity,
    ObstacleAvoidanceStatus, Position, StorageStatus,
};
use crate::util::bytes_from_text;
use crate::vehicle::{ArduCopter, AutopilotFamily, CopterMode, CustomMode, Px4};

fn settings() -> DroneSettings {
    DroneSettings {
        link_lost_timeout: Duration::from_secs(3),
        stream_timeout: Duration::from_secs(2),
        storage_poll_interval: Duration::from_secs(1),
        flight_time_tick: Duration::from_secs(1),
    }
}

fn drone_with(family: AutopilotFamily, connection: &Arc<MockConnection>) -> MavlinkDrone {
    MavlinkDrone::new(
        connection.clone(),
        PlatformDescription::new("test platform", family),
        "test-1",
        settings(),
        Arc::new(FlatElevationModel::default()),
    )
}

fn drone(family: AutopilotFamily) -> (MavlinkDrone, Arc<MockConnection>) {
    let connection = MockConnection::new();
    (drone_with(family, &connection), connection)
}

/// Lets the stream tasks drain what was injected.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn base_mode(armed: bool) -> MavModeFlag {
    if armed {
        MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED | MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED
    } else {
        MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
    }
}

fn heartbeat(autopilot: MavAutopilot, mavtype: MavType, custom_mode: u32, armed: bool) -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode,
        mavtype,
        autopilot,
        base_mode: base_mode(armed),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

fn copter_heartbeat(mode: CopterMode, armed: bool) -> MavMessage {
    heartbeat(
        MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        MavType::MAV_TYPE_QUADROTOR,
        mode.number(),
        armed,
    )
}

fn px4_heartbeat(main: u32, sub: u32, armed: bool) -> MavMessage {
    heartbeat(
        MavAutopilot::MAV_AUTOPILOT_PX4,
        MavType::MAV_TYPE_QUADROTOR,
        (sub << 24) | (main << 16),
        armed,
    )
}

fn position(relative_alt_m: f64) -> MavMessage {
    MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
        lat: 470_000_000,
        lon: 80_000_000,
        relative_alt: (relative_alt_m * 1000.0) as i32,
        ..Default::default()
    })
}

fn landed(state: MavLandedState) -> MavMessage {
    MavMessage::EXTENDED_SYS_STATE(EXTENDED_SYS_STATE_DATA {
        landed_state: state,
        ..Default::default()
    })
}

fn item_reached(seq: u16) -> MavMessage {
    MavMessage::MISSION_ITEM_REACHED(MISSION_ITEM_REACHED_DATA {
        seq,
        ..Default::default()
    })
}

fn mission_current(seq: u16) -> MavMessage {
    MavMessage::MISSION_CURRENT(MISSION_CURRENT_DATA {
        seq,
        ..Default::default()
    })
}

fn status_text(text: &str, severity: MavSeverity) -> MavMessage {
    MavMessage::STATUSTEXT(STATUSTEXT_DATA {
        severity,
        text: bytes_from_text(text),
        ..Default::default()
    })
}

fn plan(waypoints: usize) -> Arc<FlightPlan> {
    let waypoints = (0..waypoints)
        .map(|i| WayPoint::new(Position::new(47.0 + i as f64 * 0.0005, 8.0, 30.0)))
        .collect();
    Arc::new(FlightPlan::new("survey", waypoints))
}

/// ArduCopter parked on the ground in LOITER, ready for take off.
async fn copter_on_ground() -> (MavlinkDrone, Arc<MockConnection>) {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Loiter, false));
    connection.inject(position(0.0));
    settle().await;
    (drone, connection)
}

/// Switches a copter that already has a plan to AUTO in the air.
async fn copter_running_plan(connection: &MockConnection) {
    connection.inject(copter_heartbeat(CopterMode::Auto, true));
    connection.inject(position(20.0));
    settle().await;
}

fn last_seq(drone: &MavlinkDrone) -> Result<u16> {
    let mission = drone
        .active_mission()?
        .ok_or_else(|| anyhow::anyhow!("no active mission"))?;
    Ok(u16::try_from(mission.mission_item_count() - 1)?)
}

fn kinds(connection: &MockConnection) -> Vec<CommandKind> {
    connection.sent().iter().map(Command::kind).collect()
}

#[tokio::test(start_paused = true)]
async fn copter_auto_in_air_runs_plan() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Auto, true));
    connection.inject(position(25.0));
    settle().await;

    let state = drone.get_state_snapshot()?;
    assert_eq!(state.custom_mode.value, CustomMode::ArduCopter(CopterMode::Auto));
    assert_eq!(state.armed_state.value, ArmedState::Armed);
    assert_eq!(state.landed_state.value, LandedState::InAir);
    assert_eq!(state.autopilot_state.value, AutopilotState::Autopilot);
    assert_eq!(state.flight_segment.value, FlightSegment::PlanRunning);
    assert!(!state.flight_segment.stale);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn px4_landed_state_comes_from_extended_sys_state() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    connection.inject(px4_heartbeat(4, 4, true));
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_IN_AIR));
    settle().await;
    let state = drone.get_state_snapshot()?;
    assert_eq!(state.flight_segment.value, FlightSegment::PlanRunning);

    // a position fix must not touch the landed state on PX4
    connection.inject(position(0.0));
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_LANDING));
    settle().await;
    let state = drone.get_state_snapshot()?;
    assert_eq!(state.flight_segment.value, FlightSegment::Landing);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_satellite_count() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(MavMessage::GPS_RAW_INT(GPS_RAW_INT_DATA {
        satellites_visible: 255,
        fix_type: mavlink::common::GpsFixType::GPS_FIX_TYPE_PPP,
        ..Default::default()
    }));
    settle().await;

    let gnss = drone.get_state_snapshot()?.gnss;
    assert!(!gnss.stale);
    assert_eq!(gnss.value.number_of_satellites, -1);
    assert!(gnss.value.quality_percentage.is_nan());
    assert_eq!(gnss.value.gnss_state, GnssState::Unknown);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn land_in_manual_mode_sends_nothing() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Stabilize, true));
    settle().await;
    assert_eq!(
        drone.get_state_snapshot()?.autopilot_state.value,
        AutopilotState::Manual
    );

    let result = drone.land().await;
    assert!(result.is_err_and(|e| e.is_precondition()));
    assert!(connection.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn fixed_wing_cannot_land() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduPlane);
    connection.inject(heartbeat(
        MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
        MavType::MAV_TYPE_FIXED_WING,
        10,
        true,
    ));
    settle().await;

    let result = drone.land().await;
    assert!(matches!(result, Err(DroneError::NotSupported(_))));
    assert!(connection.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn take_off_preconditions_fail_without_contact() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);

    let result = drone.take_off(Some(plan(2)), 0).await;
    assert!(result.is_err_and(|e| e.is_precondition()));

    connection.inject(copter_heartbeat(CopterMode::Loiter, false));
    connection.inject(position(0.0));
    settle().await;
    let result = drone.take_off(None, 0).await;
    assert!(result.is_err_and(|e| e.is_precondition()));

    assert!(connection.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn take_off_runs_the_full_chain() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;

    drone.take_off(Some(plan(3)), 0).await?;

    assert_eq!(
        kinds(&connection),
        vec![
            CommandKind::ClearMission,
            CommandKind::SetParameters,
            CommandKind::UploadMission,
            CommandKind::ArmDisarm,
            CommandKind::SetMode,
        ]
    );
    let sent = connection.sent();
    assert_eq!(sent[3], Command::ArmDisarm(true));
    assert_eq!(sent[4], Command::SetMode(ArduCopter.mission_mode()));

    let state = drone.get_state_snapshot()?;
    assert!(state.active_flight_plan.is_some());
    assert_eq!(state.flight_plan_upload_progress, 1.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn take_off_disarms_an_armed_vehicle_first() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Loiter, true));
    connection.inject(position(0.1));
    settle().await;
    assert_eq!(
        drone.get_state_snapshot()?.flight_segment.value,
        FlightSegment::OnGround
    );

    drone.take_off(Some(plan(1)), 0).await?;
    let arming: Vec<Command> = connection.sent_of(CommandKind::ArmDisarm);
    assert_eq!(arming, vec![Command::ArmDisarm(false), Command::ArmDisarm(true)]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_arming_rolls_back_the_plan() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    connection.fail(CommandKind::ArmDisarm);

    let result = drone.take_off(Some(plan(2)), 0).await;
    assert!(matches!(result, Err(DroneError::Transport(_))));

    let state = drone.get_state_snapshot()?;
    assert!(state.active_flight_plan.is_none());
    assert!(drone.active_mission()?.is_none());
    // no attempt to undo the arming state
    assert_eq!(connection.sent_of(CommandKind::ArmDisarm).len(), 1);
    assert!(connection.sent_of(CommandKind::SetMode).is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn uncalibrated_px4_refuses_to_arm() -> Result<()> {
    let connection = MockConnection::new();
    for id in ["CAL_MAG0_ID", "CAL_GYRO0_ID"] {
        connection.set_parameter(id, ParamValue::Int32(197_388));
    }
    connection.set_parameter("CAL_ACC0_ID", ParamValue::Int32(0));
    let drone = drone_with(AutopilotFamily::Px4, &connection);

    connection.inject(px4_heartbeat(4, 3, false));
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_ON_GROUND));
    connection.inject(position(0.0));
    settle().await;

    let state = drone.get_state_snapshot()?;
    assert_eq!(state.health.calibration_status, CalibrationStatus::CalibrationNeeded);
    assert_eq!(state.flight_segment.value, FlightSegment::OnGround);

    let result = drone.take_off(Some(plan(2)), 0).await;
    assert!(result.is_err_and(|e| e.is_precondition()));
    assert_eq!(connection.sent_of(CommandKind::UploadMission).len(), 1);
    assert!(connection.sent_of(CommandKind::ArmDisarm).is_empty());
    assert!(drone.get_state_snapshot()?.active_flight_plan.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn upload_needs_a_position() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);

    let result = drone.set_active_flight_plan(Some(plan(2)), 0).await;
    assert!(result.is_err_and(|e| e.is_precondition()));
    assert_eq!(kinds(&connection), vec![CommandKind::ClearMission]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn upload_progress_and_failure() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    let gate = connection.hold_uploads();

    let uploading = drone.clone();
    let task = tokio::spawn(async move { uploading.set_active_flight_plan(Some(plan(2)), 0).await });
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.flight_plan_upload_progress, 0.0);

    gate.notify_one();
    task.await??;
    assert_eq!(drone.get_state_snapshot()?.flight_plan_upload_progress, 1.0);

    connection.fail(CommandKind::UploadMission);
    let result = drone.set_active_flight_plan(Some(plan(2)), 0).await;
    assert!(result.is_err());
    let state = drone.get_state_snapshot()?;
    assert!(state.flight_plan_upload_progress.is_nan());
    assert!(state.active_flight_plan.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn installed_plan_reports_resume_waypoint() -> Result<()> {
    let (drone, _connection) = copter_on_ground().await;

    drone.set_active_flight_plan(Some(plan(5)), 3).await?;
    assert_eq!(drone.get_state_snapshot()?.active_waypoint_index, 3);

    // clamped into the plan like the mission itself
    drone.set_active_flight_plan(Some(plan(2)), 7).await?;
    assert_eq!(drone.get_state_snapshot()?.active_waypoint_index, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn dropped_start_flight_plan_clears_the_plan() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    drone.set_active_flight_plan(Some(plan(3)), 0).await?;
    connection.clear_sent();
    let _gate = connection.hold_uploads();

    let starting = drone.clone();
    let task = tokio::spawn(async move { starting.start_flight_plan(Some(plan(4)), 1).await });
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.flight_plan_upload_progress, 0.0);

    task.abort();
    assert!(task.await.is_err_and(|e| e.is_cancelled()));

    let state = drone.get_state_snapshot()?;
    assert!(state.active_flight_plan.is_none());
    assert!(state.flight_plan_upload_progress.is_nan());
    assert!(drone.active_mission()?.is_none());
    // never reached the mission mode switch
    assert_eq!(
        kinds(&connection),
        vec![
            CommandKind::SetMode,
            CommandKind::ClearMission,
            CommandKind::SetParameters,
            CommandKind::UploadMission,
        ]
    );
    assert_eq!(connection.sent()[0], Command::SetMode(ArduCopter.loiter_mode()));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn abort_take_off_lands_and_abort_landing_loiters() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Auto, true));
    connection.inject(position(10.0));
    settle().await;

    drone.abort_take_off().await?;
    drone.abort_landing().await?;
    assert_eq!(
        connection.sent(),
        vec![
            Command::SetMode(ArduCopter.land_mode()?),
            Command::SetMode(ArduCopter.loiter_mode()),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn abort_commands_need_automatic_mode() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Stabilize, true));
    connection.inject(position(10.0));
    settle().await;

    assert!(drone.abort_take_off().await.is_err_and(|e| e.is_precondition()));
    assert!(drone.abort_landing().await.is_err_and(|e| e.is_precondition()));
    assert!(connection.sent().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_command_is_a_timeout() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Auto, true));
    connection.inject(position(10.0));
    settle().await;
    connection.time_out(CommandKind::SetMode);

    let result = drone.return_home().await;
    assert!(matches!(result, Err(DroneError::Timeout(_))));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn mission_current_reports_waypoint_index() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    drone.set_active_flight_plan(Some(plan(3)), 0).await?;
    let mission = drone
        .active_mission()?
        .ok_or_else(|| anyhow::anyhow!("no active mission"))?;

    let seq = last_seq(&drone)?;
    connection.inject(mission_current(seq));
    settle().await;
    let expected = mission.waypoint_index_for_mission_item(usize::from(seq))?;
    assert_eq!(drone.get_state_snapshot()?.active_waypoint_index, expected);

    // out of range falls back to the first waypoint
    connection.inject(mission_current(seq + 10));
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.active_waypoint_index, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn last_item_reached_pauses_exactly_once() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    drone.take_off(Some(plan(3)), 0).await?;
    copter_running_plan(&connection).await;
    let seq = last_seq(&drone)?;
    connection.clear_sent();

    connection.inject(item_reached(seq));
    connection.inject(item_reached(seq));
    settle().await;

    assert_eq!(
        connection.sent_of(CommandKind::SetMode),
        vec![Command::SetMode(ArduCopter.loiter_mode())]
    );
    assert!(drone.get_state_snapshot()?.active_flight_plan.is_none());
    assert!(drone.active_mission()?.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn plans_landing_automatically_are_not_paused() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    let mut auto_land = (*plan(2)).clone();
    auto_land.land_automatically = true;
    auto_land.landing_position = Some(Position::new(47.0, 8.0, 0.0));
    drone.take_off(Some(Arc::new(auto_land)), 0).await?;
    copter_running_plan(&connection).await;
    let seq = last_seq(&drone)?;
    connection.clear_sent();

    connection.inject(item_reached(seq));
    settle().await;
    assert!(connection.sent().is_empty());
    assert!(drone.get_state_snapshot()?.active_flight_plan.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn replacing_the_plan_replaces_its_subscriptions() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    drone.set_active_flight_plan(Some(plan(3)), 0).await?;
    let old_last = last_seq(&drone)?;
    copter_running_plan(&connection).await;

    drone.set_active_flight_plan(Some(plan(1)), 0).await?;
    let new_last = last_seq(&drone)?;
    assert_ne!(old_last, new_last);
    connection.clear_sent();

    connection.inject(item_reached(old_last));
    settle().await;
    assert!(connection.sent().is_empty());

    connection.inject(item_reached(new_last));
    settle().await;
    assert_eq!(connection.sent_of(CommandKind::SetMode).len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_flight_plan_interrupts_then_uploads() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    connection.inject(copter_heartbeat(CopterMode::Loiter, true));
    connection.inject(position(20.0));
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.flight_segment.value, FlightSegment::Hold);

    drone.start_flight_plan(Some(plan(3)), 1).await?;

    assert_eq!(
        kinds(&connection),
        vec![
            CommandKind::SetMode,
            CommandKind::ClearMission,
            CommandKind::SetParameters,
            CommandKind::UploadMission,
            CommandKind::SetMode,
        ]
    );
    let modes = connection.sent_of(CommandKind::SetMode);
    assert_eq!(modes[0], Command::SetMode(ArduCopter.loiter_mode()));
    assert_eq!(modes[1], Command::SetMode(ArduCopter.mission_mode()));

    drone.return_home().await?;
    assert_eq!(
        connection.sent().last(),
        Some(&Command::SetMode(ArduCopter.return_home_mode()))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn touchdown_clears_plan_and_flight_time() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    drone.take_off(Some(plan(2)), 0).await?;
    copter_running_plan(&connection).await;

    tokio::time::sleep(Duration::from_millis(2500)).await;
    let state = drone.get_state_snapshot()?;
    assert!(state.flight_time.value >= Duration::from_secs(2));
    assert!(state.active_flight_plan.is_some());

    connection.inject(copter_heartbeat(CopterMode::Auto, false));
    connection.inject(position(0.0));
    settle().await;

    let state = drone.get_state_snapshot()?;
    assert_eq!(state.flight_segment.value, FlightSegment::OnGround);
    assert!(state.active_flight_plan.is_none());
    assert_eq!(state.flight_time, Telemetry::new(Duration::ZERO));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn flight_time_resumes_from_reported_takeoff() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    connection.inject(px4_heartbeat(4, 3, true));
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_ON_GROUND));
    settle().await;

    let takeoff = Utc::now() - chrono::Duration::seconds(60);
    connection.set_flight_information(FLIGHT_INFORMATION_DATA {
        takeoff_time_utc: u64::try_from(takeoff.timestamp_micros())?,
        ..Default::default()
    });
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_IN_AIR));
    settle().await;

    let flight_time = drone.get_state_snapshot()?.flight_time;
    assert!(!flight_time.stale);
    assert!(flight_time.value >= Duration::from_secs(59));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_flight_information_counts_from_now() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    connection.inject(px4_heartbeat(4, 3, true));
    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_ON_GROUND));
    settle().await;

    connection.inject(landed(MavLandedState::MAV_LANDED_STATE_IN_AIR));
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let flight_time = drone.get_state_snapshot()?.flight_time;
    assert!(flight_time.stale);
    assert!(flight_time.value >= Duration::from_secs(1));
    assert!(flight_time.value < Duration::from_secs(3));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_link_marks_state_stale() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    let mut events = drone.subscribe_events();
    connection.inject(copter_heartbeat(CopterMode::Loiter, true));
    settle().await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    let state = drone.get_state_snapshot()?;
    assert_eq!(state.armed_state.value, ArmedState::Unknown);
    assert!(state.armed_state.stale);
    assert!(state.custom_mode.stale);
    assert!(state.autopilot_state.stale);
    assert!(state.flight_segment.stale);

    let mut timeouts = 0;
    while let Ok(event) = events.try_recv() {
        if let DroneEvent::ConnectionException(e) = event {
            assert!(e.recoverable);
            assert_eq!(e.message, "Connection timeout");
            timeouts += 1;
        }
    }
    assert_eq!(timeouts, 1);

    connection.inject(copter_heartbeat(CopterMode::Loiter, true));
    settle().await;
    let state = drone.get_state_snapshot()?;
    assert!(!state.custom_mode.stale);
    assert_eq!(state.armed_state, Telemetry::new(ArmedState::Armed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn mismatched_autopilot_is_reported_and_undefined() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    let mut events = drone.subscribe_events();
    connection.inject(px4_heartbeat(4, 4, true));
    settle().await;

    let state = drone.get_state_snapshot()?;
    assert_eq!(state.custom_mode.value, CustomMode::Undefined);
    assert_eq!(state.autopilot_state.value, AutopilotState::Unknown);

    match events.try_recv()? {
        DroneEvent::ConnectionException(e) => {
            assert_eq!(e.message_type, "HEARTBEAT");
            assert!(e.recoverable);
            assert_eq!(e.message, "Invalid autopilot type");
        }
        other => panic!("unexpected event {:?}", other),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn battery_goes_stale_and_recovers() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    let sys_status = MavMessage::SYS_STATUS(SYS_STATUS_DATA {
        voltage_battery: 12_600,
        battery_remaining: 80,
        ..Default::default()
    });
    connection.inject(sys_status.clone());
    settle().await;
    let battery = drone.get_state_snapshot()?.battery;
    assert!(!battery.stale);
    assert!((battery.value.voltage - 12.6).abs() < 1e-9);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(drone.get_state_snapshot()?.battery.stale);
    assert!(drone.get_state_snapshot()?.remote_control.stale);

    connection.inject(sys_status);
    settle().await;
    assert!(!drone.get_state_snapshot()?.battery.stale);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn px4_filters_status_text() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    let mut events = drone.subscribe_events();
    connection.inject(status_text("Data link lost", MavSeverity::MAV_SEVERITY_CRITICAL));
    connection.inject(status_text("Takeoff detected", MavSeverity::MAV_SEVERITY_INFO));
    settle().await;

    let mut messages = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DroneEvent::Message(message) = event {
            messages.push(message);
        }
    }
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "Takeoff detected");
    assert_eq!(messages[0].severity, MessageSeverity::Info);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn storage_is_polled() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    settle().await;
    let storage = drone.get_state_snapshot()?.storage;
    assert!(storage.stale);
    assert_eq!(storage.value.status, StorageStatus::Unknown);

    connection.set_storage_information(STORAGE_INFORMATION_DATA {
        storage_count: 1,
        available_capacity: 2048.0,
        ..Default::default()
    });
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let storage = drone.get_state_snapshot()?.storage;
    assert!(!storage.stale);
    assert_eq!(storage.value.status, StorageStatus::Ok);
    assert_eq!(storage.value.available_space_mib, 2048.0);

    connection.fail(CommandKind::RequestStorageInformation);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let storage = drone.get_state_snapshot()?.storage;
    assert_eq!(storage.value.status, StorageStatus::StorageDeviceError);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn camera_images_count_per_plan() -> Result<()> {
    let (drone, connection) = copter_on_ground().await;
    connection.inject_from(
        1,
        100,
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            mavtype: MavType::MAV_TYPE_CAMERA,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            ..Default::default()
        }),
    );
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.cameras.len(), 1);
    // the camera heartbeat does not disturb the vehicle mode
    assert_eq!(
        drone.get_state_snapshot()?.custom_mode.value,
        CustomMode::ArduCopter(CopterMode::Loiter)
    );

    for _ in 0..2 {
        connection.inject_from(
            1,
            100,
            MavMessage::CAMERA_IMAGE_CAPTURED(CAMERA_IMAGE_CAPTURED_DATA::default()),
        );
    }
    settle().await;
    assert_eq!(drone.get_state_snapshot()?.cameras[0].image_count, 2);

    drone.set_active_flight_plan(None, 0).await?;
    assert_eq!(drone.get_state_snapshot()?.cameras[0].image_count, 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn obstacle_distances_are_tracked() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4ObstacleAvoidance);
    let initial = drone.get_state_snapshot()?.obstacle_avoidance;
    assert!(initial.is_some_and(|oa| oa.value.status == ObstacleAvoidanceStatus::NoData));

    let mut distances = [u16::MAX; 72];
    distances[3] = 150;
    connection.inject(MavMessage::OBSTACLE_DISTANCE(OBSTACLE_DISTANCE_DATA {
        distances,
        min_distance: 20,
        max_distance: 1000,
        ..Default::default()
    }));
    settle().await;

    let oa = drone
        .get_state_snapshot()?
        .obstacle_avoidance
        .ok_or_else(|| anyhow::anyhow!("obstacle avoidance missing"))?;
    assert!(!oa.stale);
    assert_eq!(oa.value.status, ObstacleAvoidanceStatus::Warning);
    assert!((oa.value.min_distance - 1.5).abs() < 1e-9);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn watchers_see_every_change() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::ArduCopter);
    let mut rx = drone.watch_state();
    connection.inject(copter_heartbeat(CopterMode::Guided, false));
    rx.changed().await?;
    assert_eq!(
        rx.borrow().custom_mode.value,
        CustomMode::ArduCopter(CopterMode::Guided)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_listening() -> Result<()> {
    let (drone, connection) = drone(AutopilotFamily::Px4);
    settle().await;
    drone.shutdown();
    connection.clear_sent();

    connection.inject(px4_heartbeat(4, 4, true));
    tokio::time::sleep(Duration::from_secs(5)).await;
    let state = drone.get_state_snapshot()?;
    assert_eq!(state.custom_mode.value, CustomMode::Undefined);
    assert!(connection.sent().is_empty());
    assert!(Px4.polls_storage());
    Ok(())
}
