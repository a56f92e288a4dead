use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, info};

use crate::config::WebConfig;
use crate::drone::MavlinkDrone;

use anyhow::{Context, Result};

pub struct WebServer {
    drone: MavlinkDrone,
    config: WebConfig,
    running: Arc<AtomicBool>,
}

impl WebServer {
    pub fn new(drone: MavlinkDrone, config: WebConfig) -> Self {
        Self {
            drone,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/drone/state", get(drone_state))
            .with_state(self.drone.clone())
    }

    pub async fn start(&self) -> Result<()> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind to {}", address))?;
        info!("State endpoint listening on {}", address);

        self.running.store(true, Ordering::SeqCst);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal(Arc::clone(&self.running)))
            .await
            .context("Failed to serve")?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn shutdown_signal(running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn drone_state(State(drone): State<MavlinkDrone>) -> Response {
    match drone.get_state_snapshot() {
        Ok(state) => Json(state).into_response(),
        Err(e) => {
            error!("State snapshot failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
