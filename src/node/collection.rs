//! Collection node: typed child pools reused positionally across updates
//!
//! An update matches incoming children against existing children of the
//! same class in order, so a collection whose shape is stable frame to
//! frame reuses every child node. Surplus children at the tail are
//! released; missing ones are created. Nested collections pool the same
//! way and continue the parent's depth-first sub-id numbering.

use crate::atlas::IconPipeline;
use crate::geometry::{Geometry, GeometryCollection};
use crate::style::StyleDescriptor;
use crate::tessellation::TessellationMode;

use super::{AltitudeMode, LineNode, NodeCore, PointNode, PolygonNode};

pub struct CollectionNode {
    pub core: NodeCore,
    pub points: Vec<PointNode>,
    pub lines: Vec<LineNode>,
    pub polygons: Vec<PolygonNode>,
    pub collections: Vec<CollectionNode>,
}

impl CollectionNode {
    pub fn new(feature_id: u64, sub_id: u32) -> CollectionNode {
        CollectionNode {
            core: NodeCore::new(feature_id, sub_id),
            points: Vec::new(),
            lines: Vec::new(),
            polygons: Vec::new(),
            collections: Vec::new(),
        }
    }

    pub fn set_geometry(&mut self, collection: &GeometryCollection, icons: &mut IconPipeline) {
        self.ingest(collection, icons);
        self.core.bump_version();
    }

    /// Returns the last ordinal assigned, so nested collections continue
    /// the depth-first sub-id numbering and siblings never collide.
    fn ingest(&mut self, collection: &GeometryCollection, icons: &mut IconPipeline) -> u32 {
        let fid = self.core.feature_id;
        let mut np = 0usize;
        let mut nl = 0usize;
        let mut npoly = 0usize;
        let mut nc = 0usize;
        let mut ordinal = self.core.sub_id;

        for child in &collection.children {
            ordinal += 1;
            match child {
                Geometry::Point(p) => {
                    if np == self.points.len() {
                        self.points.push(PointNode::new(fid, ordinal));
                    }
                    let node = &mut self.points[np];
                    node.core.sub_id = ordinal;
                    node.core.name = self.core.name.clone();
                    node.set_style(&self.core.style);
                    node.set_altitude_mode(self.core.altitude_mode);
                    node.set_geometry(p);
                    np += 1;
                }
                Geometry::LineString(ls) => {
                    if nl == self.lines.len() {
                        self.lines.push(LineNode::new(fid, ordinal));
                    }
                    let node = &mut self.lines[nl];
                    node.core.sub_id = ordinal;
                    node.set_style(&self.core.style);
                    node.set_altitude_mode(self.core.altitude_mode);
                    node.set_geometry(ls);
                    nl += 1;
                }
                Geometry::Polygon(p) => {
                    if npoly == self.polygons.len() {
                        self.polygons.push(PolygonNode::new(fid, ordinal));
                    }
                    let node = &mut self.polygons[npoly];
                    node.line.core.sub_id = ordinal;
                    node.set_style(&self.core.style);
                    node.line.set_altitude_mode(self.core.altitude_mode);
                    node.set_geometry(p);
                    npoly += 1;
                }
                Geometry::Collection(c) => {
                    if nc == self.collections.len() {
                        self.collections.push(CollectionNode::new(fid, ordinal));
                    }
                    let node = &mut self.collections[nc];
                    node.core.sub_id = ordinal;
                    node.set_name(self.core.name.clone());
                    node.set_style(&self.core.style);
                    node.set_altitude_mode(self.core.altitude_mode);
                    ordinal = node.ingest(c, icons);
                    nc += 1;
                }
            }
        }

        for mut surplus in self.points.drain(np..) {
            surplus.release(icons);
        }
        for mut surplus in self.lines.drain(nl..) {
            surplus.release();
        }
        for mut surplus in self.polygons.drain(npoly..) {
            surplus.release();
        }
        for mut surplus in self.collections.drain(nc..) {
            surplus.release(icons);
        }
        ordinal
    }

    pub fn set_style(&mut self, style: &StyleDescriptor) {
        if self.core.style == *style {
            return;
        }
        self.core.style = style.clone();
        for child in &mut self.points {
            child.set_style(style);
        }
        for child in &mut self.lines {
            child.set_style(style);
        }
        for child in &mut self.polygons {
            child.set_style(style);
        }
        for child in &mut self.collections {
            child.set_style(style);
        }
        self.core.bump_version();
    }

    pub fn set_name(&mut self, name: Option<String>) {
        for child in &mut self.points {
            child.core.name = name.clone();
        }
        for child in &mut self.collections {
            child.set_name(name.clone());
        }
        self.core.name = name;
    }

    pub fn set_altitude_mode(&mut self, mode: AltitudeMode) {
        self.core.altitude_mode = mode;
        for child in &mut self.points {
            child.set_altitude_mode(mode);
        }
        for child in &mut self.lines {
            child.set_altitude_mode(mode);
        }
        for child in &mut self.polygons {
            child.line.set_altitude_mode(mode);
        }
        for child in &mut self.collections {
            child.set_altitude_mode(mode);
        }
    }

    pub fn set_extrude(&mut self, extrude: f64) {
        self.core.extrude = extrude;
        for child in &mut self.points {
            child.set_extrude(extrude);
        }
        for child in &mut self.lines {
            child.set_extrude(extrude);
        }
        for child in &mut self.polygons {
            child.line.set_extrude(extrude);
        }
        for child in &mut self.collections {
            child.set_extrude(extrude);
        }
    }

    pub fn set_tessellation_enabled(&mut self, enabled: bool) {
        for child in &mut self.lines {
            child.set_tessellation_enabled(enabled);
        }
        for child in &mut self.polygons {
            child.line.set_tessellation_enabled(enabled);
        }
        for child in &mut self.collections {
            child.set_tessellation_enabled(enabled);
        }
    }

    pub fn set_tessellation_threshold(&mut self, meters: f64) {
        for child in &mut self.lines {
            child.set_tessellation_threshold(meters);
        }
        for child in &mut self.polygons {
            child.line.set_tessellation_threshold(meters);
        }
        for child in &mut self.collections {
            child.set_tessellation_threshold(meters);
        }
    }

    pub fn set_tessellation_mode(&mut self, mode: TessellationMode) {
        for child in &mut self.lines {
            child.set_tessellation_mode(mode);
        }
        for child in &mut self.polygons {
            child.line.set_tessellation_mode(mode);
        }
        for child in &mut self.collections {
            child.set_tessellation_mode(mode);
        }
    }

    /// Drops cached atlas keys and outstanding icon requests for every
    /// point, recursively. Used when the icon atlas is recycled.
    pub fn invalidate_icons(&mut self, icons: &mut IconPipeline) {
        for child in &mut self.points {
            icons.release_icon(&mut child.icon);
        }
        for child in &mut self.collections {
            child.invalidate_icons(icons);
        }
    }

    pub fn release(&mut self, icons: &mut IconPipeline) {
        for mut child in self.points.drain(..) {
            child.release(icons);
        }
        for mut child in self.lines.drain(..) {
            child.release();
        }
        for mut child in self.polygons.drain(..) {
            child.release();
        }
        for mut child in self.collections.drain(..) {
            child.release(icons);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::loader::BitmapLoader;
    use crate::atlas::Bitmap;
    use crate::geometry::{LineString, Point};
    use std::sync::Arc;

    struct NullLoader;
    impl BitmapLoader for NullLoader {
        fn load(&self, _uri: &str) -> anyhow::Result<Bitmap> {
            Ok(Bitmap::new(32, 32))
        }
    }

    fn pipeline() -> IconPipeline {
        IconPipeline::new(Arc::new(NullLoader), "asset:/default.png", 256, 32)
    }

    fn mixed() -> GeometryCollection {
        GeometryCollection::new(vec![
            Geometry::Point(Point::new(1.0, 2.0)),
            Geometry::LineString(LineString::from_xy(&[[0.0, 0.0], [1.0, 1.0]])),
            Geometry::Point(Point::new(3.0, 4.0)),
        ])
    }

    #[test]
    fn test_children_pooled_by_class() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        node.set_geometry(&mixed(), &mut icons);
        assert_eq!(node.points.len(), 2);
        assert_eq!(node.lines.len(), 1);
        assert_eq!(node.polygons.len(), 0);
        // sub-ids follow input order
        assert_eq!(node.points[0].core.sub_id, 1);
        assert_eq!(node.lines[0].core.sub_id, 2);
        assert_eq!(node.points[1].core.sub_id, 3);
    }

    #[test]
    fn test_stable_update_reuses_children() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        node.set_geometry(&mixed(), &mut icons);
        let v = node.points[0].core.version;

        node.set_geometry(&mixed(), &mut icons);
        assert_eq!(node.points.len(), 2);
        // same node instance, its version advanced rather than reset
        assert!(node.points[0].core.version > v);
    }

    #[test]
    fn test_shrinking_update_releases_surplus() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        node.set_geometry(&mixed(), &mut icons);

        let smaller = GeometryCollection::new(vec![Geometry::Point(Point::new(1.0, 2.0))]);
        node.set_geometry(&smaller, &mut icons);
        assert_eq!(node.points.len(), 1);
        assert_eq!(node.lines.len(), 0);
    }

    #[test]
    fn test_nested_collection_children_pooled() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        let nested = GeometryCollection::new(vec![
            Geometry::Point(Point::new(5.0, 5.0)),
            Geometry::Point(Point::new(6.0, 6.0)),
        ]);
        let c = GeometryCollection::new(vec![
            Geometry::Point(Point::new(1.0, 2.0)),
            Geometry::Collection(nested),
            Geometry::LineString(LineString::from_xy(&[[0.0, 0.0], [1.0, 1.0]])),
        ]);
        node.set_geometry(&c, &mut icons);
        assert_eq!(node.points.len(), 1);
        assert_eq!(node.collections.len(), 1);
        assert_eq!(node.collections[0].points.len(), 2);

        // depth-first ordinals continue through the nested child
        assert_eq!(node.points[0].core.sub_id, 1);
        assert_eq!(node.collections[0].core.sub_id, 2);
        assert_eq!(node.collections[0].points[0].core.sub_id, 3);
        assert_eq!(node.collections[0].points[1].core.sub_id, 4);
        assert_eq!(node.lines[0].core.sub_id, 5);
    }

    #[test]
    fn test_shrinking_update_releases_nested_collections() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        let c = GeometryCollection::new(vec![
            Geometry::Point(Point::new(1.0, 2.0)),
            Geometry::Collection(GeometryCollection::new(vec![Geometry::Point(Point::new(
                5.0, 5.0,
            ))])),
        ]);
        node.set_geometry(&c, &mut icons);
        assert_eq!(node.collections.len(), 1);

        let flat = GeometryCollection::new(vec![Geometry::Point(Point::new(1.0, 2.0))]);
        node.set_geometry(&flat, &mut icons);
        assert_eq!(node.collections.len(), 0);
    }

    #[test]
    fn test_style_propagates_into_nested_collections() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        let c = GeometryCollection::new(vec![Geometry::Collection(GeometryCollection::new(
            vec![Geometry::LineString(LineString::from_xy(&[
                [0.0, 0.0],
                [1.0, 1.0],
            ]))],
        ))]);
        node.set_geometry(&c, &mut icons);

        let style =
            crate::style::StyleDescriptor::stroke(crate::style::Color::argb(255, 0, 255, 0), 6.0);
        node.set_style(&style);
        assert_eq!(node.collections[0].lines[0].strokes[0].width, 6.0);
    }

    #[test]
    fn test_style_propagates_to_children() {
        let mut icons = pipeline();
        let mut node = CollectionNode::new(9, 0);
        node.set_geometry(&mixed(), &mut icons);

        let style = crate::style::StyleDescriptor::stroke(crate::style::Color::argb(255, 0, 255, 0), 4.0);
        node.set_style(&style);
        assert_eq!(node.lines[0].strokes[0].width, 4.0);
    }
}
