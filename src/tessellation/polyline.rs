//! Threshold-driven linestring subdivision
//!
//! Long segments are split into equal parts so that no emitted segment spans
//! more than the threshold. When no source segment exceeds the threshold the
//! caller keeps rendering from the source buffer directly, so `tessellate`
//! returns `None` instead of a copy.

use crate::geo::approximate_distance_meters;

use super::TessellationMode;

/// Span of one segment in the units the threshold is expressed in.
pub fn segment_span(mode: TessellationMode, a: &[f64; 3], b: &[f64; 3]) -> f64 {
    match mode {
        TessellationMode::Geodetic => approximate_distance_meters(a[1], a[0], b[1], b[0]),
        TessellationMode::Grid => {
            let dx = b[0] - a[0];
            let dy = b[1] - a[1];
            (dx * dx + dy * dy).sqrt()
        }
    }
}

/// Subdivides so every emitted segment spans at most `threshold`.
///
/// Returns `None` when no source segment exceeds the threshold; the source
/// buffer is already the render buffer in that case.
pub fn tessellate(
    points: &[[f64; 3]],
    mode: TessellationMode,
    threshold: f64,
) -> Option<Vec<[f64; 3]>> {
    if points.len() < 2 || threshold <= 0.0 {
        return None;
    }

    let exceeds = points
        .windows(2)
        .any(|w| segment_span(mode, &w[0], &w[1]) > threshold);
    if !exceeds {
        return None;
    }

    let mut out = Vec::with_capacity(points.len() * 2);
    for w in points.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        out.push(*a);
        let span = segment_span(mode, a, b);
        if span > threshold {
            let parts = (span / threshold).ceil() as usize;
            for k in 1..parts {
                let t = k as f64 / parts as f64;
                out.push([
                    a[0] + (b[0] - a[0]) * t,
                    a[1] + (b[1] - a[1]) * t,
                    a[2] + (b[2] - a[2]) * t,
                ]);
            }
        }
    }
    out.push(*points.last().unwrap());
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tessellation::{GEODETIC_THRESHOLD_METERS, GRID_THRESHOLD};

    #[test]
    fn test_short_line_aliases_source() {
        // ~55 km segment, well under the geodetic threshold
        let pts = [[10.0, 20.0, 0.0], [10.5, 20.0, 0.0]];
        assert!(tessellate(&pts, TessellationMode::Geodetic, GEODETIC_THRESHOLD_METERS).is_none());
    }

    #[test]
    fn test_long_segment_subdivided() {
        // ~4,400 km across the equator
        let pts = [[0.0, 0.0, 0.0], [40.0, 0.0, 0.0]];
        let out =
            tessellate(&pts, TessellationMode::Geodetic, GEODETIC_THRESHOLD_METERS).unwrap();
        assert!(out.len() > 2);
        assert_eq!(out[0], pts[0]);
        assert_eq!(*out.last().unwrap(), pts[1]);
        for w in out.windows(2) {
            let span = segment_span(TessellationMode::Geodetic, &w[0], &w[1]);
            assert!(span <= GEODETIC_THRESHOLD_METERS * (1.0 + 1e-9));
        }
    }

    #[test]
    fn test_output_never_shorter_than_input() {
        let pts = [
            [0.0, 0.0, 0.0],
            [30.0, 0.0, 0.0],
            [30.0, 0.5, 0.0],
            [60.0, 0.5, 0.0],
        ];
        let out =
            tessellate(&pts, TessellationMode::Geodetic, GEODETIC_THRESHOLD_METERS).unwrap();
        assert!(out.len() >= pts.len());
    }

    #[test]
    fn test_grid_mode_uses_unit_spans() {
        let pts = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let out = tessellate(&pts, TessellationMode::Grid, GRID_THRESHOLD).unwrap();
        // one unit at a 0.125 threshold splits into eight parts
        assert_eq!(out.len(), 9);
    }

    #[test]
    fn test_altitude_interpolated() {
        let pts = [[0.0, 0.0, 0.0], [20.0, 0.0, 1000.0]];
        let out =
            tessellate(&pts, TessellationMode::Geodetic, GEODETIC_THRESHOLD_METERS).unwrap();
        let mid = out[out.len() / 2];
        assert!(mid[2] > 0.0 && mid[2] < 1000.0);
    }
}
