use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatteryAlertLevel {
    Unknown,
    Green,
    Yellow,
    Red,
}

impl BatteryAlertLevel {
    // TODO: take the thresholds from the platform description once it carries them
    pub fn from_remaining_percentage(remaining: i8) -> Self {
        if remaining >= 30 {
            Self::Green
        } else if remaining >= 20 {
            Self::Yellow
        } else if remaining >= 0 {
            Self::Red
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Battery {
    pub voltage: f64,
    /// NaN while the autopilot reports -1.
    pub remaining_charge_percentage: f64,
    pub alert_level: BatteryAlertLevel,
}

impl Default for Battery {
    fn default() -> Self {
        Self {
            voltage: f64::NAN,
            remaining_charge_percentage: f64::NAN,
            alert_level: BatteryAlertLevel::Unknown,
        }
    }
}

impl Battery {
    /// `voltage_mv` as reported by SYS_STATUS, `remaining` in percent with -1 meaning unknown.
    pub fn from_sys_status(voltage_mv: u16, remaining: i8) -> Self {
        Self {
            voltage: f64::from(voltage_mv) * 0.001,
            remaining_charge_percentage: if remaining == -1 {
                f64::NAN
            } else {
                f64::from(remaining)
            },
            alert_level: BatteryAlertLevel::from_remaining_percentage(remaining),
        }
    }
}
