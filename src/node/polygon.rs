//! Polygon node: a line node over the exterior ring plus an optional fill
//!
//! The fill triangulation is derived from the ring's render points, so it
//! is rebuilt whenever the stroke render buffer is, and only then.

use crate::geometry::Polygon;
use crate::style::{FillStyle, StyleDescriptor};
use crate::tessellation::triangulate_fill;

use super::line::LineNode;

pub struct PolygonNode {
    pub line: LineNode,
    pub fill: Option<FillStyle>,
    fill_indices: Option<Vec<u32>>,
    /// Render buffer generation the fill was triangulated against.
    fill_generation: Option<u64>,
}

impl PolygonNode {
    pub fn new(feature_id: u64, sub_id: u32) -> PolygonNode {
        PolygonNode {
            line: LineNode::new(feature_id, sub_id),
            fill: None,
            fill_indices: None,
            fill_generation: None,
        }
    }

    /// Only the exterior ring renders; interior rings are ignored.
    pub fn set_geometry(&mut self, polygon: &Polygon) {
        self.line.set_geometry(&polygon.exterior);
    }

    pub fn set_style(&mut self, style: &StyleDescriptor) {
        if self.line.core.style == *style {
            return;
        }
        self.fill = style.fill;
        self.line.set_style(style);
    }

    pub fn has_fill(&self) -> bool {
        self.fill.is_some()
    }

    pub fn has_stroke(&self) -> bool {
        !self.line.strokes.is_empty()
    }

    /// Triangle indices into the ring's render points, rebuilt lazily after
    /// any stroke buffer rebuild. The generation comparison catches rebuilds
    /// triggered elsewhere, projection validates the render buffer before
    /// the fill is fetched. `None` when the ring cannot be filled.
    pub fn fill_indices(&mut self) -> Option<&[u32]> {
        self.fill.as_ref()?;
        self.line.validate_geometry();
        let generation = self.line.render_generation();
        if self.fill_generation != Some(generation) {
            self.fill_indices = triangulate_fill(self.line.render_points());
            self.fill_generation = Some(generation);
        }
        self.fill_indices.as_deref()
    }

    pub fn release(&mut self) {
        self.line.release();
        self.fill_indices = None;
        self.fill_generation = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineString;
    use crate::style::{Color, StyleDescriptor};

    fn square() -> Polygon {
        Polygon::new(LineString::from_xy(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 1.0],
            [0.0, 1.0],
            [0.0, 0.0],
        ]))
    }

    fn filled_style() -> StyleDescriptor {
        StyleDescriptor::filled(
            Color::argb(255, 255, 255, 255),
            1.0,
            Color::argb(128, 255, 0, 0),
        )
    }

    #[test]
    fn test_fill_requires_closed_ring_of_four() {
        let mut node = PolygonNode::new(1, 0);
        node.set_style(&filled_style());

        node.set_geometry(&Polygon::new(LineString::from_xy(&[
            [0.0, 0.0],
            [1.0, 0.0],
            [0.0, 0.0],
        ])));
        assert!(node.fill_indices().is_none());

        node.set_geometry(&square());
        assert!(node.fill_indices().is_some());
    }

    #[test]
    fn test_unfilled_polygon_strokes_only() {
        let mut node = PolygonNode::new(1, 0);
        node.set_style(&StyleDescriptor::stroke(Color::WHITE, 2.0));
        node.set_geometry(&square());
        assert!(!node.has_fill());
        assert!(node.has_stroke());
        assert!(node.fill_indices().is_none());
    }

    #[test]
    fn test_fill_rebuilds_with_render_buffer() {
        let mut node = PolygonNode::new(1, 0);
        node.set_style(&filled_style());
        // a ring large enough to tessellate once the threshold drops
        node.set_geometry(&Polygon::new(LineString::from_xy(&[
            [0.0, 0.0],
            [5.0, 0.0],
            [5.0, 5.0],
            [0.0, 5.0],
            [0.0, 0.0],
        ])));
        let coarse = node.fill_indices().unwrap().len();

        node.line.set_tessellation_threshold(100_000.0);
        let fine = node.fill_indices().unwrap().len();
        assert!(fine > coarse);
    }

    #[test]
    fn test_fill_rebuilds_when_projection_validates_first() {
        use crate::node::VertexSpace;
        use crate::render::view::MapView;

        let mut node = PolygonNode::new(1, 0);
        node.set_style(&filled_style());
        // 40 degree ring tessellates at the default threshold
        node.set_geometry(&Polygon::new(LineString::from_xy(&[
            [0.0, 0.0],
            [40.0, 0.0],
            [40.0, 40.0],
            [0.0, 40.0],
            [0.0, 0.0],
        ])));
        let tessellated = node.fill_indices().unwrap().len();

        node.line.set_tessellation_enabled(false);
        // mirror the draw path: vertices project before the fill is fetched
        let view = MapView::new(20.0, 20.0, 5000.0);
        assert!(node.line.project_vertices(&view, VertexSpace::ScreenPixels));
        let indices = node.fill_indices().unwrap().to_vec();
        let max = *indices.iter().max().unwrap() as usize;
        assert!(max < node.line.num_render_points());
        assert!(indices.len() < tessellated);
    }

    #[test]
    fn test_fill_only_style_has_no_stroke() {
        let mut node = PolygonNode::new(1, 0);
        node.set_style(&StyleDescriptor {
            fill: Some(crate::style::FillStyle {
                color: Color::argb(255, 0, 0, 255),
            }),
            ..Default::default()
        });
        assert!(node.has_fill());
        assert!(!node.has_stroke());
    }
}
