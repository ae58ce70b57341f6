//! Per-frame camera state handed to nodes during projection and emission

use std::sync::Arc;

use crate::geo::{
    approximate_meters_per_degree_latitude, approximate_meters_per_degree_longitude, Envelope,
};

pub const SRID_WGS84: i32 = 4326;
pub const SRID_ECEF: i32 = 4978;

/// Elevation source sampled when clamping or offsetting altitudes. The
/// version changes whenever previously sampled values may have changed,
/// invalidating projected vertex caches.
pub trait TerrainModel: Send + Sync {
    fn version(&self) -> i32 {
        0
    }

    /// Terrain elevation in meters HAE at a geodetic position.
    fn elevation(&self, _lat: f64, _lng: f64) -> f64 {
        0.0
    }
}

/// Sea-level terrain, the default when no elevation source is attached.
pub struct FlatTerrain;

impl TerrainModel for FlatTerrain {}

/// Camera and projection state for one frame. `draw_version` must change
/// between frames whenever the camera moved; projected caches key on it.
#[derive(Clone)]
pub struct MapView {
    pub draw_version: u32,
    pub srid: i32,
    pub draw_lat: f64,
    pub draw_lng: f64,
    /// Degrees clockwise from north.
    pub draw_rotation: f64,
    /// Degrees off nadir; 0 is straight down.
    pub draw_tilt: f64,
    /// Meters per pixel at the focus point.
    pub draw_map_resolution: f64,
    pub width: f32,
    pub height: f32,
    /// Reference position for depth ordering, behind and below the camera.
    pub measure_lat: f64,
    pub measure_lng: f64,
    pub terrain: Arc<dyn TerrainModel>,
}

impl MapView {
    pub fn new(lat: f64, lng: f64, resolution: f64) -> MapView {
        MapView {
            draw_version: 0,
            srid: SRID_WGS84,
            draw_lat: lat,
            draw_lng: lng,
            draw_rotation: 0.0,
            draw_tilt: 0.0,
            draw_map_resolution: resolution,
            width: 1920.0,
            height: 1080.0,
            measure_lat: lat,
            measure_lng: lng,
            terrain: Arc::new(FlatTerrain),
        }
    }

    /// Depth ordering replaces feature-id ordering when the camera is
    /// tilted or the scene is on the globe.
    pub fn is_depth_sorted(&self) -> bool {
        self.draw_tilt > 0.0 || self.srid == SRID_ECEF
    }

    /// Whole-world shift to apply to a feature's longitudes so it renders
    /// on the same side of the antimeridian as the camera.
    pub fn longitude_unwrap(&self, envelope: &Envelope) -> f64 {
        if envelope.is_empty() {
            return 0.0;
        }
        let center = (envelope.min_x + envelope.max_x) / 2.0;
        let offset = center - self.draw_lng;
        if offset > 180.0 {
            -360.0
        } else if offset < -180.0 {
            360.0
        } else {
            0.0
        }
    }

    /// Meters east/north of the view center, altitude carried through.
    pub fn forward_projected(&self, lat: f64, lng: f64, alt: f64) -> [f64; 3] {
        let x = (lng - self.draw_lng) * approximate_meters_per_degree_longitude(self.draw_lat);
        let y = (lat - self.draw_lat) * approximate_meters_per_degree_latitude(self.draw_lat);
        [x, y, alt]
    }

    /// Screen pixels, origin at the upper-left, y growing downward.
    pub fn forward(&self, lat: f64, lng: f64, alt: f64) -> [f64; 3] {
        let [x, y, _] = self.forward_projected(lat, lng, alt);
        let theta = self.draw_rotation.to_radians();
        let (sin, cos) = theta.sin_cos();
        let xr = x * cos + y * sin;
        let yr = -x * sin + y * cos;
        [
            self.width as f64 / 2.0 + xr / self.draw_map_resolution,
            self.height as f64 / 2.0 - yr / self.draw_map_resolution,
            alt,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_center_maps_to_screen_center() {
        let view = MapView::new(35.0, -120.0, 10.0);
        let [x, y, _] = view.forward(35.0, -120.0, 0.0);
        assert_eq!(x, 960.0);
        assert_eq!(y, 540.0);
    }

    #[test]
    fn test_north_is_up() {
        let view = MapView::new(0.0, 0.0, 100.0);
        let [_, y, _] = view.forward(1.0, 0.0, 0.0);
        assert!(y < 540.0);
    }

    #[test]
    fn test_unwrap_pulls_feature_across_antimeridian() {
        let view = MapView::new(0.0, 179.0, 100.0);
        let mut env = Envelope::empty();
        env.expand(-179.5, 0.0);
        env.expand(-179.0, 1.0);
        assert_eq!(view.longitude_unwrap(&env), 360.0);

        let view = MapView::new(0.0, -179.0, 100.0);
        let mut env = Envelope::empty();
        env.expand(179.0, 0.0);
        env.expand(179.5, 1.0);
        assert_eq!(view.longitude_unwrap(&env), -360.0);
    }

    #[test]
    fn test_untilted_plane_sorts_by_fid() {
        let mut view = MapView::new(0.0, 0.0, 10.0);
        assert!(!view.is_depth_sorted());
        view.draw_tilt = 30.0;
        assert!(view.is_depth_sorted());
        view.draw_tilt = 0.0;
        view.srid = SRID_ECEF;
        assert!(view.is_depth_sorted());
    }
}
