//! Contract with the MAVLink transport.
//!
//! The transport delivers already decoded messages and performs the request/acknowledge
//! handshakes of the command, mission and parameter sub-protocols.

use anyhow::Result;
use async_trait::async_trait;
use mavlink::common::{MavMessage, MavModeFlag, FLIGHT_INFORMATION_DATA, STORAGE_INFORMATION_DATA};
use mavlink::MavHeader;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::flight_plan::MissionItem;

#[cfg(test)]
pub mod mock;

#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub header: MavHeader,
    pub message: MavMessage,
}

/// Matches autopilot status text that signals a failed mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusTextFilter {
    StartsWith(String),
    Contains(String),
}

impl StatusTextFilter {
    pub fn starts_with(text: impl Into<String>) -> Self {
        Self::StartsWith(text.into())
    }

    pub fn contains(text: impl Into<String>) -> Self {
        Self::Contains(text.into())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::StartsWith(prefix) => text.starts_with(prefix.as_str()),
            Self::Contains(needle) => text.contains(needle.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetMode {
    pub base_mode: MavModeFlag,
    pub custom_main_mode: u32,
    pub custom_sub_mode: u32,
    /// The mode change fails when the autopilot answers with matching status text.
    pub fail_on_text: Option<StatusTextFilter>,
}

impl SetMode {
    pub fn new(base_mode: MavModeFlag, custom_main_mode: u32, custom_sub_mode: u32) -> Self {
        Self {
            base_mode,
            custom_main_mode,
            custom_sub_mode,
            fail_on_text: None,
        }
    }

    pub fn failing_on(mut self, filter: StatusTextFilter) -> Self {
        self.fail_on_text = Some(filter);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int32(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: String,
    pub value: ParamValue,
}

impl Parameter {
    pub fn float(id: impl Into<String>, value: f32) -> Self {
        Self {
            id: id.into(),
            value: ParamValue::Float(value),
        }
    }

    pub fn int32(id: impl Into<String>, value: i32) -> Self {
        Self {
            id: id.into(),
            value: ParamValue::Int32(value),
        }
    }

    pub fn int_value(&self) -> i64 {
        match self.value {
            ParamValue::Float(v) => v as i64,
            ParamValue::Int32(v) => i64::from(v),
        }
    }
}

/// A request got no answer in time.
#[derive(Debug, Clone, Error)]
#[error("{0} request timed out")]
pub struct RequestTimeout(pub &'static str);

#[async_trait]
pub trait DroneConnection: Send + Sync {
    /// Every message received from the vehicle from now on.
    fn subscribe(&self) -> broadcast::Receiver<ReceivedMessage>;

    async fn arm_disarm(&self, arm: bool) -> Result<()>;

    async fn set_mode(&self, mode: SetMode) -> Result<()>;

    async fn clear_mission(&self) -> Result<()>;

    /// Runs the mission upload handshake, reporting progress in 0..=1.
    async fn upload_mission(
        &self,
        items: Vec<MissionItem>,
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<()>;

    async fn set_parameters(&self, parameters: Vec<Parameter>) -> Result<()>;

    async fn request_parameters(&self, ids: &[&str]) -> Result<Vec<Parameter>>;

    async fn request_flight_information(&self) -> Result<FLIGHT_INFORMATION_DATA>;

    async fn request_storage_information(&self) -> Result<STORAGE_INFORMATION_DATA>;
}
