use thiserror::Error;

use crate::connection::RequestTimeout;

/// Failures surfaced by drone commands and the mission translator.
#[derive(Debug, Error)]
pub enum DroneError {
    /// The command was rejected before anything was sent to the vehicle.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid hardware configuration: {0}")]
    Configuration(String),

    #[error("mission item {seq} out of range (mission has {count} items)")]
    MissionItemOutOfRange { seq: usize, count: usize },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("lock error: {0}")]
    Lock(String),

    #[error(transparent)]
    Transport(anyhow::Error),
}

impl From<anyhow::Error> for DroneError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<RequestTimeout>() {
            Ok(timeout) => Self::Timeout(timeout.0.to_string()),
            Err(e) => Self::Transport(e),
        }
    }
}

impl DroneError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

/// Protocol mismatch, link loss or a failed telemetry stream.
///
/// Delivered to event subscribers only. Command futures never fail with this type.
#[derive(Debug, Clone, Error)]
#[error("{message_type}: {message}")]
pub struct ConnectionException {
    pub message_type: &'static str,
    pub recoverable: bool,
    pub message: String,
    pub cause: Option<String>,
}

impl ConnectionException {
    pub fn new(message_type: &'static str, recoverable: bool, message: impl Into<String>) -> Self {
        Self {
            message_type,
            recoverable,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message_type: &'static str,
        recoverable: bool,
        cause: impl std::fmt::Display,
    ) -> Self {
        let cause = cause.to_string();
        Self {
            message_type,
            recoverable,
            message: cause.clone(),
            cause: Some(cause),
        }
    }
}
