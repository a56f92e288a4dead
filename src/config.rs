use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::flight_plan::FlightPlanOptions;
use crate::model::PlatformInfo;
use crate::vehicle::AutopilotFamily;

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub mavlink: MavlinkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    pub platform: PlatformDescription,
    pub web: WebConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
    pub vehicle_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MavlinkConfig {
    pub connection_string: String,
    #[serde(default = "default_gcs_system_id")]
    pub system_id: u8,
    #[serde(default = "default_gcs_component_id")]
    pub component_id: u8,
    #[serde(default = "default_target")]
    pub target_system: u8,
    #[serde(default = "default_target")]
    pub target_component: u8,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_command_retries")]
    pub command_retries: u32,
}

fn default_gcs_system_id() -> u8 {
    255
}

fn default_gcs_component_id() -> u8 {
    190
}

fn default_target() -> u8 {
    1
}

fn default_command_timeout_ms() -> u64 {
    1500
}

fn default_command_retries() -> u32 {
    3
}

impl MavlinkConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Heartbeat silence after which the link counts as lost.
    pub link_lost_timeout_secs: f64,
    pub stream_timeout_secs: f64,
    pub storage_poll_interval_secs: f64,
    pub flight_time_tick_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            link_lost_timeout_secs: 5.0,
            stream_timeout_secs: 2.0,
            storage_poll_interval_secs: 1.0,
            flight_time_tick_ms: 1000,
        }
    }
}

/// What the vehicle is and how it wants to be flown.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlatformDescription {
    pub name: String,
    pub autopilot: AutopilotFamily,
    /// Whether failsafe reactions may be written to the autopilot before a mission.
    #[serde(default)]
    pub emergency_actions_settable: bool,
    #[serde(default)]
    pub flight_plan: FlightPlanOptions,
    #[serde(default)]
    pub obstacle_avoidance: Option<ObstacleAvoidanceConfig>,
}

impl PlatformDescription {
    pub fn new(name: impl Into<String>, autopilot: AutopilotFamily) -> Self {
        Self {
            name: name.into(),
            autopilot,
            emergency_actions_settable: false,
            flight_plan: FlightPlanOptions::default(),
            obstacle_avoidance: None,
        }
    }

    pub fn info(&self, vehicle_id: &str) -> PlatformInfo {
        PlatformInfo {
            vehicle_id: vehicle_id.to_string(),
            name: self.name.clone(),
            autopilot: self.autopilot,
        }
    }

    pub fn min_safe_distance(&self) -> f64 {
        self.obstacle_avoidance
            .as_ref()
            .map_or(2.0, |oa| oa.min_safe_distance_meters)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObstacleAvoidanceConfig {
    pub min_safe_distance_meters: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let config_path = format!("config/{}.toml", env);
        let fallback_path = format!("/etc/mavdrone/{}.toml", env);

        if Path::new(&config_path).exists() {
            Self::load_from(&config_path)
        } else {
            Self::load_from(&fallback_path)
        }
    }

    /// Reads one TOML file, then applies `MAVDRONE_<SECTION>__<KEY>` environment overrides.
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("MAVDRONE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config = settings.try_deserialize()?;
        Ok(config)
    }
}
