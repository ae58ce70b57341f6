//! Line node: source points, lazily tessellated render points, projected
//! vertices
//!
//! Three buffers, each derived from the previous one on demand:
//!
//! * `points`: geodetic source vertices, unwrapped across the antimeridian
//!   so consecutive longitudes never jump by more than 180°
//! * render points: `points` subdivided against the tessellation threshold;
//!   aliases the source buffer when no segment exceeds it
//! * `vertices`: render points projected for the current frame, cached
//!   against (draw version, srid, unwrap, terrain version, space)

use crate::geo::{point_segment_distance, Envelope};
use crate::geometry::LineString;
use crate::render::view::MapView;
use crate::style::{StrokeStyle, StyleDescriptor};
use crate::tessellation::{
    self, segment_span, TessellationMode, GEODETIC_THRESHOLD_METERS, GRID_THRESHOLD,
    GRID_THRESHOLD_SCALE,
};

use super::{AltitudeMode, NodeCore};

/// Which space `project_vertices` targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSpace {
    /// Screen pixels, ready for 2D emission.
    ScreenPixels,
    /// Meters relative to the view center, for depth-tested passes.
    Projected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProjectionKey {
    draw_version: u32,
    srid: i32,
    unwrap: f64,
    terrain_version: i32,
    space: VertexSpace,
}

#[derive(Default)]
enum RenderPoints {
    /// Not derived yet.
    #[default]
    Invalid,
    /// No segment exceeded the threshold; render from the source buffer.
    Aliased,
    Tessellated(Vec<[f64; 3]>),
}

pub struct LineNode {
    pub core: NodeCore,
    points: Vec<[f64; 3]>,
    render: RenderPoints,
    render_generation: u64,
    vertices: Vec<[f32; 3]>,
    vertices_key: Option<ProjectionKey>,
    pub envelope: Envelope,
    /// Some source segment exceeds the active threshold.
    tessellatable: bool,
    tessellation_enabled: bool,
    pub mode: TessellationMode,
    threshold_meters: f64,
    threshold_grid: f64,
    pub strokes: Vec<StrokeStyle>,
}

impl LineNode {
    pub fn new(feature_id: u64, sub_id: u32) -> LineNode {
        LineNode {
            core: NodeCore::new(feature_id, sub_id),
            points: Vec::new(),
            render: RenderPoints::Invalid,
            render_generation: 0,
            vertices: Vec::new(),
            vertices_key: None,
            envelope: Envelope::empty(),
            tessellatable: false,
            tessellation_enabled: true,
            mode: TessellationMode::Geodetic,
            threshold_meters: GEODETIC_THRESHOLD_METERS,
            threshold_grid: GRID_THRESHOLD,
            strokes: vec![StrokeStyle::default()],
        }
    }

    fn active_threshold(&self) -> f64 {
        match self.mode {
            TessellationMode::Geodetic => self.threshold_meters,
            TessellationMode::Grid => self.threshold_grid,
        }
    }

    fn invalidate(&mut self) {
        self.render = RenderPoints::Invalid;
        self.vertices_key = None;
    }

    /// Ingests source vertices in a single pass: antimeridian unwrap,
    /// envelope growth, and the tessellatable flag all update per vertex.
    pub fn set_geometry(&mut self, line: &LineString) {
        self.points.clear();
        self.points.reserve(line.points.len());
        self.envelope = Envelope::empty();
        self.tessellatable = false;

        let threshold = self.active_threshold();
        let mut unwrap = 0.0f64;
        let mut prev: Option<[f64; 3]> = None;
        for p in &line.points {
            let mut x = p[0] + unwrap;
            if let Some(q) = prev {
                if x - q[0] > 180.0 {
                    unwrap -= 360.0;
                    x -= 360.0;
                } else if x - q[0] < -180.0 {
                    unwrap += 360.0;
                    x += 360.0;
                }
            }
            let v = [x, p[1], p[2]];
            if let Some(q) = prev {
                if segment_span(self.mode, &q, &v) > threshold {
                    self.tessellatable = true;
                }
            }
            self.envelope.expand(v[0], v[1]);
            self.points.push(v);
            prev = Some(v);
        }

        self.invalidate();
        self.core.bump_version();
    }

    pub fn set_style(&mut self, style: &StyleDescriptor) {
        if self.core.style == *style {
            return;
        }
        self.strokes = style.strokes.clone();
        if self.strokes.is_empty() && style.fill.is_none() {
            self.strokes.push(StrokeStyle::default());
        }
        self.core.style = style.clone();
        self.core.bump_version();
    }

    pub fn set_altitude_mode(&mut self, mode: AltitudeMode) {
        if self.core.altitude_mode != mode {
            self.core.altitude_mode = mode;
            self.vertices_key = None;
            self.core.bump_version();
        }
    }

    pub fn set_extrude(&mut self, extrude: f64) {
        if self.core.extrude != extrude {
            self.core.extrude = extrude;
            self.vertices_key = None;
            self.core.bump_version();
        }
    }

    pub fn set_tessellation_enabled(&mut self, enabled: bool) {
        if self.tessellation_enabled != enabled {
            self.tessellation_enabled = enabled;
            self.invalidate();
        }
    }

    pub fn set_tessellation_threshold(&mut self, meters: f64) {
        self.threshold_meters = meters;
        self.threshold_grid = meters / GRID_THRESHOLD_SCALE;
        self.retest_tessellatable();
        self.invalidate();
    }

    pub fn set_tessellation_mode(&mut self, mode: TessellationMode) {
        if self.mode != mode {
            self.mode = mode;
            self.retest_tessellatable();
            self.invalidate();
        }
    }

    fn retest_tessellatable(&mut self) {
        let threshold = self.active_threshold();
        self.tessellatable = self
            .points
            .windows(2)
            .any(|w| segment_span(self.mode, &w[0], &w[1]) > threshold);
    }

    /// Rebuilds the render point buffer if it is stale. Returns true when a
    /// rebuild happened, which also invalidates any fill built on top.
    pub fn validate_geometry(&mut self) -> bool {
        if !matches!(self.render, RenderPoints::Invalid) {
            return false;
        }
        self.render = if self.tessellation_enabled && self.tessellatable {
            match tessellation::tessellate(&self.points, self.mode, self.active_threshold()) {
                Some(points) => RenderPoints::Tessellated(points),
                None => RenderPoints::Aliased,
            }
        } else {
            RenderPoints::Aliased
        };
        self.render_generation = self.render_generation.wrapping_add(1);
        self.vertices_key = None;
        true
    }

    /// Monotonic count of render buffer rebuilds. Buffers derived from the
    /// render points compare against this instead of the rebuild return
    /// value, which only the first caller after an invalidation observes.
    pub fn render_generation(&self) -> u64 {
        self.render_generation
    }

    pub fn render_points(&self) -> &[[f64; 3]] {
        match &self.render {
            RenderPoints::Tessellated(points) => points,
            _ => &self.points,
        }
    }

    pub fn num_render_points(&self) -> usize {
        self.render_points().len()
    }

    pub fn is_tessellated(&self) -> bool {
        matches!(self.render, RenderPoints::Tessellated(_))
    }

    /// Projects render points for the current frame; no-op when the cache
    /// key still matches. Returns true when there is anything to draw.
    pub fn project_vertices(&mut self, view: &MapView, space: VertexSpace) -> bool {
        self.validate_geometry();
        let unwrap = view.longitude_unwrap(&self.envelope);
        let key = ProjectionKey {
            draw_version: view.draw_version,
            srid: view.srid,
            unwrap,
            terrain_version: view.terrain.version(),
            space,
        };
        if self.vertices_key == Some(key) {
            return !self.vertices.is_empty();
        }

        let mode = self.core.altitude_mode;
        let extrude = self.core.extrude;
        let mut out = Vec::with_capacity(self.num_render_points());
        for p in self.render_points() {
            let terrain = view.terrain.elevation(p[1], p[0]);
            let alt = match mode {
                AltitudeMode::ClampToGround => terrain,
                AltitudeMode::Relative => terrain + p[2],
                AltitudeMode::Absolute => p[2],
            };
            let alt = alt + extrude;
            let v = match space {
                VertexSpace::ScreenPixels => view.forward(p[1], p[0] + unwrap, alt),
                VertexSpace::Projected => view.forward_projected(p[1], p[0] + unwrap, alt),
            };
            out.push([v[0] as f32, v[1] as f32, v[2] as f32]);
        }
        self.vertices = out;
        self.vertices_key = Some(key);
        !self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[[f32; 3]] {
        &self.vertices
    }

    /// Squared geodetic-degree distance from the envelope center to the
    /// depth-sort measurement point.
    pub fn measure_distance_sq(&self, view: &MapView) -> f64 {
        if self.envelope.is_empty() {
            return 0.0;
        }
        let cx = (self.envelope.min_x + self.envelope.max_x) / 2.0;
        let cy = (self.envelope.min_y + self.envelope.max_y) / 2.0;
        let dx = cx + view.longitude_unwrap(&self.envelope) - view.measure_lng;
        let dy = cy - view.measure_lat;
        dx * dx + dy * dy
    }

    /// Exact geodetic hit test against the render points. Unwrapped
    /// features are additionally tested against whole-world shifts of the
    /// query envelope.
    pub fn hit_test(&self, query: &Envelope, lat: f64, lng: f64, radius_meters: f64) -> bool {
        for shift in [0.0, 360.0, -360.0] {
            let shifted = query.shifted(shift);
            if !self.envelope.intersects(&shifted) {
                continue;
            }
            let qlng = lng + shift;
            for w in self.render_points().windows(2) {
                if let Some(d) =
                    point_segment_distance(w[0][0], w[0][1], w[1][0], w[1][1], qlng, lat, &shifted)
                {
                    if d <= radius_meters {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn release(&mut self) {
        self.points = Vec::new();
        self.render = RenderPoints::Invalid;
        self.vertices = Vec::new();
        self.vertices_key = None;
        self.envelope = Envelope::empty();
        self.tessellatable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineString;

    fn line(points: &[[f64; 2]]) -> LineString {
        LineString::from_xy(points)
    }

    #[test]
    fn test_short_line_render_buffer_aliases_source() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[10.0, 20.0], [10.5, 20.0]]));
        assert!(node.validate_geometry());
        assert!(!node.is_tessellated());
        assert_eq!(node.num_render_points(), 2);
    }

    #[test]
    fn test_long_line_tessellates_at_least_source_count() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[0.0, 0.0], [40.0, 0.0]]));
        node.validate_geometry();
        assert!(node.is_tessellated());
        assert!(node.num_render_points() > 2);
    }

    #[test]
    fn test_threshold_change_invalidates_render_buffer() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[0.0, 0.0], [5.0, 0.0]]));
        node.validate_geometry();
        assert!(!node.is_tessellated());

        // ~556 km segment against a 100 km threshold
        node.set_tessellation_threshold(100_000.0);
        assert!(node.validate_geometry());
        assert!(node.is_tessellated());
    }

    #[test]
    fn test_tessellation_disabled_keeps_source() {
        let mut node = LineNode::new(1, 0);
        node.set_tessellation_enabled(false);
        node.set_geometry(&line(&[[0.0, 0.0], [40.0, 0.0]]));
        node.validate_geometry();
        assert!(!node.is_tessellated());
    }

    #[test]
    fn test_antimeridian_unwrap_keeps_envelope_contiguous() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[179.5, 0.0], [-179.5, 0.5]]));
        // the second vertex unwraps to 180.5
        assert!(node.envelope.max_x > 180.0);
        assert!((node.envelope.max_x - 180.5).abs() < 1e-9);
    }

    #[test]
    fn test_hit_at_vertex() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[10.0, 20.0], [10.5, 20.0], [11.0, 20.5]]));
        node.validate_geometry();
        let q = Envelope::query(20.0, 10.5, 100.0);
        assert!(node.hit_test(&q, 20.0, 10.5, 100.0));
    }

    #[test]
    fn test_miss_outside_envelope() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[10.0, 20.0], [11.0, 20.0]]));
        node.validate_geometry();
        let q = Envelope::query(25.0, 10.5, 100.0);
        assert!(!node.hit_test(&q, 25.0, 10.5, 100.0));
    }

    #[test]
    fn test_unwrapped_feature_hit_via_shifted_envelope() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[179.5, 0.0], [-179.5, 0.0]]));
        node.validate_geometry();
        // query expressed on the western side of the antimeridian
        let q = Envelope::query(0.0, -179.8, 5_000.0);
        assert!(node.hit_test(&q, 0.0, -179.8, 5_000.0));
    }

    #[test]
    fn test_projection_cache_reused_within_frame() {
        let mut node = LineNode::new(1, 0);
        node.set_geometry(&line(&[[10.0, 20.0], [10.5, 20.0]]));
        let view = MapView::new(20.0, 10.0, 50.0);
        assert!(node.project_vertices(&view, VertexSpace::ScreenPixels));
        let first = node.vertices().to_vec();
        assert!(node.project_vertices(&view, VertexSpace::ScreenPixels));
        assert_eq!(node.vertices(), first.as_slice());
    }

    #[test]
    fn test_absolute_vertices_keep_stored_altitude_below_terrain() {
        struct Plateau;
        impl crate::render::view::TerrainModel for Plateau {
            fn elevation(&self, _lat: f64, _lng: f64) -> f64 {
                500.0
            }
        }

        let mut view = MapView::new(0.0, 0.0, 10.0);
        view.terrain = std::sync::Arc::new(Plateau);

        let mut node = LineNode::new(1, 0);
        node.set_geometry(&LineString::new(vec![
            [0.0, 0.0, 100.0],
            [0.5, 0.0, 100.0],
        ]));
        node.set_altitude_mode(AltitudeMode::Absolute);
        assert!(node.project_vertices(&view, VertexSpace::Projected));
        // unlike point anchors, line vertices take the stored altitude as-is
        for v in node.vertices() {
            assert_eq!(v[2], 100.0);
        }
    }

    #[test]
    fn test_style_reapply_is_idempotent() {
        let mut node = LineNode::new(1, 0);
        let style = StyleDescriptor::stroke(crate::style::Color::argb(255, 255, 0, 0), 3.0);
        node.set_style(&style);
        let v = node.core.version;
        node.set_style(&style);
        assert_eq!(node.core.version, v);
    }
}
