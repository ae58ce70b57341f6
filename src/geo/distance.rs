//! Point-to-segment distance used by line and polygon-boundary hit tests

use super::{approximate_distance_meters, Envelope};

/// Minimum metric distance from a query point to a geodetic segment.
///
/// The segment's own bounding box is tested against `envelope` first; `None`
/// means the segment was rejected without an exact test.
pub fn point_segment_distance(
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    qx: f64,
    qy: f64,
    envelope: &Envelope,
) -> Option<f64> {
    let seg = Envelope {
        min_x: x1.min(x2),
        min_y: y1.min(y2),
        max_x: x1.max(x2),
        max_y: y1.max(y2),
    };
    if !seg.intersects(envelope) {
        return None;
    }

    let px = x2 - x1;
    let py = y2 - y1;
    let len_sq = px * px + py * py;

    let u = if len_sq < 1e-12 {
        0.0
    } else {
        (((qx - x1) * px + (qy - y1) * py) / len_sq).clamp(0.0, 1.0)
    };

    let cx = x1 + u * px;
    let cy = y1 + u * py;

    Some(approximate_distance_meters(cy, cx, qy, qx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_vertex_is_zero() {
        let env = Envelope::query(20.0, 10.0, 50.0);
        let d = point_segment_distance(10.0, 20.0, 10.5, 20.0, 10.0, 20.0, &env).unwrap();
        assert!(d < 1e-6);
    }

    #[test]
    fn test_prefilter_rejects_far_segment() {
        let env = Envelope::query(0.0, 0.0, 10.0);
        assert!(point_segment_distance(50.0, 50.0, 51.0, 50.0, 0.0, 0.0, &env).is_none());
    }

    #[test]
    fn test_perpendicular_distance() {
        // query one degree of latitude off the midpoint of an equatorial segment
        let env = Envelope::query(1.0, 0.5, 200_000.0);
        let d = point_segment_distance(0.0, 0.0, 1.0, 0.0, 0.5, 1.0, &env).unwrap();
        assert!((d - 110_600.0).abs() < 1_000.0, "got {}", d);
    }
}
