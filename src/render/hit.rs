//! Screen tap resolution
//!
//! A tap maps to a latitude-dependent geodetic envelope around the query
//! point. Candidate features come from an R-tree over leaf envelopes, then
//! exact tests run in reverse draw order (labels, icon points, lines,
//! polygon boundaries) so the feature painted on top reports first.
//! Features unwrapped across the antimeridian are matched through ±360°
//! shifts of the query envelope.

use rstar::{RTree, RTreeObject, AABB};

use crate::geo::Envelope;
use crate::node::{CollectionNode, GeometryNode, LineNode, PointNode};

use super::view::MapView;
use super::BatchRenderer;

struct HitCandidate {
    feature_id: u64,
    sub_id: u32,
    bounds: AABB<[f64; 2]>,
}

impl RTreeObject for HitCandidate {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

fn aabb(env: &Envelope) -> AABB<[f64; 2]> {
    AABB::from_corners([env.min_x, env.min_y], [env.max_x, env.max_y])
}

/// Draw-ordered leaf references for exact testing.
#[derive(Default)]
struct HitLists<'a> {
    labels: Vec<&'a mut PointNode>,
    icon_points: Vec<&'a mut PointNode>,
    lines: Vec<&'a mut LineNode>,
    boundaries: Vec<&'a mut LineNode>,
}

fn collect<'a>(node: &'a mut GeometryNode, lists: &mut HitLists<'a>) {
    match node {
        GeometryNode::Point(p) => {
            if p.label_text().is_some() {
                lists.labels.push(p);
            } else {
                lists.icon_points.push(p);
            }
        }
        GeometryNode::Line(l) => lists.lines.push(l),
        GeometryNode::Polygon(p) => lists.boundaries.push(&mut p.line),
        GeometryNode::Collection(c) => collect_collection(c, lists),
    }
}

fn collect_collection<'a>(collection: &'a mut CollectionNode, lists: &mut HitLists<'a>) {
    for p in collection.points.iter_mut() {
        if p.label_text().is_some() {
            lists.labels.push(p);
        } else {
            lists.icon_points.push(p);
        }
    }
    for l in collection.lines.iter_mut() {
        lists.lines.push(l);
    }
    for p in collection.polygons.iter_mut() {
        lists.boundaries.push(&mut p.line);
    }
    for c in collection.collections.iter_mut() {
        collect_collection(c, lists);
    }
}

struct HitAccum {
    results: Vec<u64>,
    limit: usize,
}

impl HitAccum {
    fn push(&mut self, feature_id: u64) -> bool {
        if !self.results.contains(&feature_id) {
            self.results.push(feature_id);
        }
        self.results.len() >= self.limit
    }
}

impl BatchRenderer {
    /// Resolves a tap at (lat, lng) with a metric threshold into feature
    /// ids, topmost first, stopping once `limit` distinct features matched.
    pub fn hit_test(
        &mut self,
        map_view: &MapView,
        lat: f64,
        lng: f64,
        threshold_meters: f64,
        limit: usize,
    ) -> Vec<u64> {
        if limit == 0 {
            return Vec::new();
        }
        let query = Envelope::query(lat, lng, threshold_meters);

        let mut lists = HitLists::default();
        for node in self.nodes.values_mut() {
            collect(node, &mut lists);
        }

        // coarse candidate pass over leaf envelopes
        let mut entries = Vec::new();
        for p in lists.labels.iter().chain(lists.icon_points.iter()) {
            entries.push(HitCandidate {
                feature_id: p.core.feature_id,
                sub_id: p.core.sub_id,
                bounds: aabb(&p.envelope()),
            });
        }
        for l in lists.lines.iter().chain(lists.boundaries.iter()) {
            if !l.envelope.is_empty() {
                entries.push(HitCandidate {
                    feature_id: l.core.feature_id,
                    sub_id: l.core.sub_id,
                    bounds: aabb(&l.envelope),
                });
            }
        }
        let tree = RTree::bulk_load(entries);
        let mut candidates: Vec<(u64, u32)> = Vec::new();
        for shift in [0.0, 360.0, -360.0] {
            let shifted = query.shifted(shift);
            for c in tree.locate_in_envelope_intersecting(&aabb(&shifted)) {
                if !candidates.contains(&(c.feature_id, c.sub_id)) {
                    candidates.push((c.feature_id, c.sub_id));
                }
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut accum = HitAccum {
            results: Vec::new(),
            limit,
        };
        let radius_px = (threshold_meters / map_view.draw_map_resolution) as f32;
        let [qx, qy, _] = map_view.forward(lat, lng, 0.0);
        let (qx, qy) = (qx as f32, qy as f32);

        let depth_sorted = map_view.is_depth_sorted();
        let sort_points = |points: &mut Vec<&mut PointNode>| {
            if depth_sorted {
                points.sort_by(|a, b| super::sort::depth_order(a, b, map_view));
            } else {
                points.sort_by_key(|p| (p.core.feature_id, p.core.sub_id));
            }
        };
        sort_points(&mut lists.labels);
        sort_points(&mut lists.icon_points);
        lists.lines.sort_by_key(|l| (l.core.feature_id, l.core.sub_id));
        lists
            .boundaries
            .sort_by_key(|l| (l.core.feature_id, l.core.sub_id));

        for points in [&mut lists.labels, &mut lists.icon_points] {
            for p in points.iter_mut().rev() {
                if !candidates.contains(&(p.core.feature_id, p.core.sub_id)) {
                    continue;
                }
                p.compute_position(map_view);
                if p.hit_test_screen(qx, qy, radius_px) && accum.push(p.core.feature_id) {
                    return accum.results;
                }
            }
        }
        for lines in [&mut lists.lines, &mut lists.boundaries] {
            for l in lines.iter_mut().rev() {
                if !candidates.contains(&(l.core.feature_id, l.core.sub_id)) {
                    continue;
                }
                l.validate_geometry();
                if l.hit_test(&query, lat, lng, threshold_meters) && accum.push(l.core.feature_id)
                {
                    return accum.results;
                }
            }
        }
        accum.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{Bitmap, BitmapLoader};
    use crate::geometry::{Geometry, LineString, Point};
    use crate::render::{Command, RenderContext};
    use std::sync::Arc;

    struct NullLoader;
    impl BitmapLoader for NullLoader {
        fn load(&self, _uri: &str) -> anyhow::Result<Bitmap> {
            Ok(Bitmap::new(32, 32))
        }
    }

    fn renderer() -> BatchRenderer {
        BatchRenderer::new(RenderContext::new(), Arc::new(NullLoader), "asset:/d.png")
    }

    fn set_line(r: &mut BatchRenderer, fid: u64, points: &[[f64; 2]]) {
        r.apply(Command::SetGeometry {
            feature_id: fid,
            geometry: Geometry::LineString(LineString::from_xy(points)),
            lod: 0,
        });
    }

    #[test]
    fn test_tap_on_line_vertex() {
        let mut r = renderer();
        set_line(&mut r, 41, &[[10.0, 20.0], [10.5, 20.0], [11.0, 20.5]]);
        let view = MapView::new(20.0, 10.5, 10.0);
        let hits = r.hit_test(&view, 20.0, 10.5, 150.0, 8);
        assert_eq!(hits, vec![41]);
    }

    #[test]
    fn test_tap_far_away_is_empty() {
        let mut r = renderer();
        set_line(&mut r, 41, &[[10.0, 20.0], [11.0, 20.0]]);
        let view = MapView::new(0.0, 0.0, 10.0);
        assert!(r.hit_test(&view, 0.0, 0.0, 150.0, 8).is_empty());
    }

    #[test]
    fn test_limit_stops_early() {
        let mut r = renderer();
        for fid in 1..=5 {
            set_line(&mut r, fid, &[[10.0, 20.0], [10.5, 20.0]]);
        }
        let view = MapView::new(20.0, 10.2, 10.0);
        let hits = r.hit_test(&view, 20.0, 10.2, 150.0, 2);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_later_feature_reports_first() {
        let mut r = renderer();
        set_line(&mut r, 1, &[[10.0, 20.0], [10.5, 20.0]]);
        set_line(&mut r, 2, &[[10.0, 20.0], [10.5, 20.0]]);
        let view = MapView::new(20.0, 10.2, 10.0);
        let hits = r.hit_test(&view, 20.0, 10.2, 150.0, 8);
        assert_eq!(hits, vec![2, 1]);
    }

    #[test]
    fn test_point_hit_by_screen_box() {
        let mut r = renderer();
        r.apply(Command::SetGeometry {
            feature_id: 7,
            geometry: Geometry::Point(Point::new(10.0, 20.0)),
            lod: 0,
        });
        let view = MapView::new(20.0, 10.0, 10.0);
        let hits = r.hit_test(&view, 20.0, 10.0, 150.0, 8);
        assert_eq!(hits, vec![7]);
    }

    #[test]
    fn test_unwrapped_line_hit_across_antimeridian() {
        let mut r = renderer();
        set_line(&mut r, 9, &[[179.5, 0.0], [-179.5, 0.0]]);
        let view = MapView::new(0.0, -179.8, 10.0);
        let hits = r.hit_test(&view, 0.0, -179.8, 5_000.0, 8);
        assert_eq!(hits, vec![9]);
    }
}
