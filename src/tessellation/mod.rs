//! Adaptive linestring subdivision and polygon fill triangulation

mod polygon;
mod polyline;

pub use polygon::triangulate_fill;
pub use polyline::{segment_span, tessellate};

/// Segment spans measured in approximate meters on the ellipsoid.
pub const GEODETIC_THRESHOLD_METERS: f64 = 1_250_000.0;

/// Segment spans measured in source grid units.
pub const GRID_THRESHOLD: f64 = 0.125;

/// Scale between a metric threshold and its grid-unit counterpart.
pub const GRID_THRESHOLD_SCALE: f64 = 10_000_000.0;

/// How segment spans are measured against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TessellationMode {
    Geodetic,
    Grid,
}
