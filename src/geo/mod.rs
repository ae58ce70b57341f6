//! Geodetic primitives shared by tessellation, sorting, and hit testing
//!
//! Distances here are deliberately approximate: per-latitude meters-per-degree
//! polynomials rather than ellipsoidal geodesy, so that tessellation
//! thresholds, depth sorting, and hit envelopes all agree with each other.

mod distance;

pub use distance::point_segment_distance;

use serde::{Deserialize, Serialize};

/// Approximate meters spanned by one degree of latitude at `lat` (degrees).
pub fn approximate_meters_per_degree_latitude(lat: f64) -> f64 {
    let rlat = lat.to_radians();
    111132.92 - 559.82 * (2.0 * rlat).cos() + 1.175 * (4.0 * rlat).cos()
}

/// Approximate meters spanned by one degree of longitude at `lat` (degrees).
pub fn approximate_meters_per_degree_longitude(lat: f64) -> f64 {
    let rlat = lat.to_radians();
    111412.84 * rlat.cos() - 93.5 * (3.0 * rlat).cos()
}

/// Approximate metric distance between two geodetic positions.
pub fn approximate_distance_meters(lat0: f64, lng0: f64, lat1: f64, lng1: f64) -> f64 {
    let mid = (lat0 + lat1) / 2.0;
    let dx = (lng1 - lng0) * approximate_meters_per_degree_longitude(mid);
    let dy = (lat1 - lat0) * approximate_meters_per_degree_latitude(mid);
    (dx * dx + dy * dy).sqrt()
}

/// Wraps a longitude into [-180, 180].
pub fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        lng
    } else {
        lng - 360.0 * ((lng + 180.0) / 360.0).floor()
    }
}

/// Geodetic axis-aligned bounding box. Longitudes may run outside
/// [-180, 180] when the contained geometry was unwrapped across the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// An empty envelope; the first `expand` call initializes all bounds.
    pub fn empty() -> Self {
        Envelope {
            min_x: f64::NAN,
            min_y: f64::NAN,
            max_x: f64::NAN,
            max_y: f64::NAN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x.is_nan()
    }

    /// Grows the envelope to contain (x, y), initializing it if empty.
    pub fn expand(&mut self, x: f64, y: f64) {
        if self.is_empty() {
            self.min_x = x;
            self.max_x = x;
            self.min_y = y;
            self.max_y = y;
            return;
        }
        if x < self.min_x {
            self.min_x = x;
        } else if x > self.max_x {
            self.max_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        } else if y > self.max_y {
            self.max_y = y;
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        !self.is_empty()
            && x >= self.min_x
            && x <= self.max_x
            && y >= self.min_y
            && y <= self.max_y
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Shifts the envelope east/west by whole-world increments.
    pub fn shifted(&self, degrees: f64) -> Envelope {
        Envelope {
            min_x: self.min_x + degrees,
            max_x: self.max_x + degrees,
            ..*self
        }
    }

    /// Builds the hit-test envelope for a query at (lat, lng) with a metric
    /// radius, using the same approximation as tessellation.
    pub fn query(lat: f64, lng: f64, radius_meters: f64) -> Envelope {
        let ra = radius_meters / approximate_meters_per_degree_latitude(lat);
        let ro = radius_meters / approximate_meters_per_degree_longitude(lat);
        Envelope {
            min_x: lng - ro,
            min_y: lat - ra,
            max_x: lng + ro,
            max_y: lat + ra,
        }
    }
}
