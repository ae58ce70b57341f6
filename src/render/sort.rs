//! Draw-order comparators
//!
//! Lines and polygons always draw in (feature id, sub-id) order. Points
//! draw in that order on an untilted plane; under tilt or on the globe they
//! draw farthest-first from the view's measurement point so nearer sprites
//! paint over farther ones. Emission never reorders after the bucket sort;
//! icon batching coalesces runs that already share texture and tint.

use std::cmp::Ordering;

use crate::node::PointNode;
use crate::render::view::MapView;

pub type FeatureKey = (u64, u32);

pub fn fid_order(a: FeatureKey, b: FeatureKey) -> Ordering {
    a.cmp(&b)
}

/// Descending distance from the measurement point, feature id as the tie
/// break so the order stays total.
pub fn depth_order(a: &PointNode, b: &PointNode, view: &MapView) -> Ordering {
    let da = a.measure_distance_sq(view);
    let db = b.measure_distance_sq(view);
    db.partial_cmp(&da)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            fid_order(
                (a.core.feature_id, a.core.sub_id),
                (b.core.feature_id, b.core.sub_id),
            )
        })
}
