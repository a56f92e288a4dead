use mavlink::common::{MavSysStatusSensor, STORAGE_INFORMATION_DATA, SYS_STATUS_DATA};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStatus {
    Unknown,
    Ok,
    NoStorageDevice,
    StorageDeviceError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Storage {
    pub status: StorageStatus,
    pub available_space_mib: f64,
}

impl Default for Storage {
    fn default() -> Self {
        Self::unknown()
    }
}

impl Storage {
    pub fn unknown() -> Self {
        Self {
            status: StorageStatus::Unknown,
            available_space_mib: f64::NAN,
        }
    }

    pub fn device_error() -> Self {
        Self {
            status: StorageStatus::StorageDeviceError,
            available_space_mib: f64::NAN,
        }
    }

    pub fn from_storage_information(info: &STORAGE_INFORMATION_DATA) -> Self {
        if info.storage_count == 0 {
            Self {
                status: StorageStatus::NoStorageDevice,
                available_space_mib: 0.0,
            }
        } else {
            Self {
                status: StorageStatus::Ok,
                available_space_mib: f64::from(info.available_capacity),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteControlStatus {
    Unknown,
    NoRemoteControl,
    RemoteControlError,
    Ok,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteControl {
    pub status: RemoteControlStatus,
}

impl Default for RemoteControl {
    fn default() -> Self {
        Self {
            status: RemoteControlStatus::Unknown,
        }
    }
}

impl RemoteControl {
    pub fn from_sys_status(sys_status: &SYS_STATUS_DATA) -> Self {
        let rc = MavSysStatusSensor::MAV_SYS_STATUS_SENSOR_RC_RECEIVER;
        let present = sys_status.onboard_control_sensors_present.contains(rc);
        let enabled = sys_status.onboard_control_sensors_enabled.contains(rc);
        let healthy = sys_status.onboard_control_sensors_health.contains(rc);

        let status = if !present || !enabled {
            RemoteControlStatus::NoRemoteControl
        } else if !healthy {
            RemoteControlStatus::RemoteControlError
        } else {
            RemoteControlStatus::Ok
        };
        Self { status }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationStatus {
    Unknown,
    Ok,
    CalibrationNeeded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub calibration_status: CalibrationStatus,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            calibration_status: CalibrationStatus::Unknown,
        }
    }
}
