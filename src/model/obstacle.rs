use mavlink::common::OBSTACLE_DISTANCE_DATA;
use serde::Serialize;

const NO_READING_CM: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObstacleAvoidanceStatus {
    NoData,
    Ok,
    Warning,
}

/// Distance sensor ring of an obstacle-avoidance equipped vehicle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObstacleAvoidance {
    pub status: ObstacleAvoidanceStatus,
    /// Per sector, meters. `None` where the sensor has no reading.
    pub sector_distances: Vec<Option<f64>>,
    /// Closest reported obstacle in meters, NaN without readings.
    pub min_distance: f64,
    pub min_safe_distance: f64,
}

impl ObstacleAvoidance {
    pub fn new(min_safe_distance: f64) -> Self {
        Self {
            status: ObstacleAvoidanceStatus::NoData,
            sector_distances: Vec::new(),
            min_distance: f64::NAN,
            min_safe_distance,
        }
    }

    pub fn update(&mut self, data: &OBSTACLE_DISTANCE_DATA) {
        let max_cm = if data.max_distance == 0 {
            NO_READING_CM
        } else {
            data.max_distance
        };

        self.sector_distances = data
            .distances
            .iter()
            .map(|&cm| {
                if cm == NO_READING_CM || cm > max_cm {
                    None
                } else {
                    Some(f64::from(cm) * 0.01)
                }
            })
            .collect();

        self.min_distance = self
            .sector_distances
            .iter()
            .flatten()
            .copied()
            .fold(f64::NAN, f64::min);

        self.status = if self.min_distance.is_nan() {
            ObstacleAvoidanceStatus::NoData
        } else if self.min_distance < self.min_safe_distance {
            ObstacleAvoidanceStatus::Warning
        } else {
            ObstacleAvoidanceStatus::Ok
        };
    }
}
