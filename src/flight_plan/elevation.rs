use crate::model::LatLon;

/// Terrain elevation source used to place the landing item relative to the takeoff point.
pub trait ElevationModel: Send + Sync {
    /// Best available elevation above the WGS84 ellipsoid, in meters.
    fn elevation(&self, at: LatLon) -> f64;
}

/// Constant terrain height everywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatElevationModel {
    pub elevation: f64,
}

impl FlatElevationModel {
    pub fn new(elevation: f64) -> Self {
        Self { elevation }
    }
}

impl ElevationModel for FlatElevationModel {
    fn elevation(&self, _at: LatLon) -> f64 {
        self.elevation
    }
}
