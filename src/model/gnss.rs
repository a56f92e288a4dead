use mavlink::common::{GpsFixType, GPS_RAW_INT_DATA};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GnssState {
    NoFix,
    Gps,
    RtkFloat,
    RtkFixed,
    Unknown,
}

impl From<GpsFixType> for GnssState {
    fn from(fix: GpsFixType) -> Self {
        match fix {
            GpsFixType::GPS_FIX_TYPE_NO_GPS | GpsFixType::GPS_FIX_TYPE_NO_FIX => Self::NoFix,
            GpsFixType::GPS_FIX_TYPE_2D_FIX
            | GpsFixType::GPS_FIX_TYPE_3D_FIX
            | GpsFixType::GPS_FIX_TYPE_DGPS => Self::Gps,
            GpsFixType::GPS_FIX_TYPE_RTK_FLOAT => Self::RtkFloat,
            GpsFixType::GPS_FIX_TYPE_RTK_FIXED => Self::RtkFixed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GnssInfo {
    /// -1 when the receiver does not know.
    pub number_of_satellites: i32,
    /// 0..=100, NaN when the satellite count is unknown.
    pub quality_percentage: f64,
    pub gnss_state: GnssState,
}

impl Default for GnssInfo {
    fn default() -> Self {
        Self {
            number_of_satellites: -1,
            quality_percentage: f64::NAN,
            gnss_state: GnssState::Unknown,
        }
    }
}

impl GnssInfo {
    const UNKNOWN_SATELLITES: u8 = u8::MAX;

    pub fn from_gps_raw(gps: &GPS_RAW_INT_DATA) -> Self {
        let satellites = gps.satellites_visible;
        let (number_of_satellites, quality_percentage) = if satellites == Self::UNKNOWN_SATELLITES {
            (-1, f64::NAN)
        } else {
            let quality = ((f64::from(satellites) - 3.0) * 10.0).clamp(0.0, 100.0);
            (i32::from(satellites), quality)
        };

        Self {
            number_of_satellites,
            quality_percentage,
            gnss_state: GnssState::from(gps.fix_type),
        }
    }
}
