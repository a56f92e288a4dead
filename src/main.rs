use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use mavdrone::config::CONFIG;
use mavdrone::drone::{DroneSettings, MavlinkDrone};
use mavdrone::flight_plan::FlatElevationModel;
use mavdrone::link::{MavlinkLink, ParamEncoding};
use mavdrone::util::setup_logging;
use mavdrone::web_server::WebServer;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

const SUMMARY_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging(&CONFIG.general.log_level)?;
    info!("Application starting...");

    info!(
        "Platform: {} ({:?})",
        &CONFIG.platform.name, &CONFIG.platform.autopilot
    );

    // Create a shutdown signal channel
    let (shutdown_tx, _) = broadcast::channel(1);

    let link = MavlinkLink::connect(
        &CONFIG.mavlink,
        ParamEncoding::for_family(CONFIG.platform.autopilot),
    )?;
    let drone = MavlinkDrone::new(
        link.clone(),
        CONFIG.platform.clone(),
        &CONFIG.general.vehicle_id,
        DroneSettings::from(&CONFIG.telemetry),
        Arc::new(FlatElevationModel::default()),
    );
    let web_server = WebServer::new(drone.clone(), CONFIG.web.clone());

    // Spawn all services
    let web_handle = spawn_web_server(web_server, shutdown_tx.subscribe()).await;
    let summary_handle = spawn_state_summary(drone.clone(), shutdown_tx.subscribe()).await;

    let shutdown_signal = async {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, stopping services...");
                if let Err(e) = shutdown_tx.send(()) {
                    error!("Failed to send shutdown signal: {}", e);
                }
            }
            Err(err) => {
                error!("Failed to listen for shutdown signal: {}", err);
            }
        }
    };

    let results = tokio::join!(web_handle, summary_handle, shutdown_signal);

    for (result, name) in [results.0, results.1]
        .into_iter()
        .zip(["Web server", "State summary"])
    {
        if let Err(e) = result {
            error!("{} join error: {}", name, e);
        }
    }

    drone.shutdown();
    link.close();
    info!("All services stopped, shutting down");

    Ok(())
}

async fn spawn_web_server(
    server: WebServer,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = server.start() => {
                if let Err(e) = result {
                    error!("Web server error: {}", e);
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down web server...");
                server.stop().await;
            }
        }
    })
}

async fn spawn_state_summary(
    drone: MavlinkDrone,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SUMMARY_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => log_summary(&drone),
                _ = shutdown.recv() => {
                    info!("Stopping state summary...");
                    break;
                }
            }
        }
    })
}

fn log_summary(drone: &MavlinkDrone) {
    let state = match drone.get_state_snapshot() {
        Ok(state) => state,
        Err(e) => {
            error!("State snapshot failed: {}", e);
            return;
        }
    };

    info!(
        "{:?}/{:?} {:?} armed={:?} battery={:.1}V gnss={:?} flight_time={}s plan={}",
        state.autopilot_state.value,
        state.flight_segment.value,
        state.custom_mode.value,
        state.armed_state.value,
        state.battery.value.voltage,
        state.gnss.value.gnss_state,
        state.flight_time.value.as_secs(),
        state
            .active_flight_plan
            .as_ref()
            .map_or("none", |plan| plan.name.as_str()),
    );
}
