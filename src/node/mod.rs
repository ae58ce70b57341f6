//! Per-feature render nodes
//!
//! A node owns everything derived from one feature's geometry and style:
//! decoded coordinates, tessellated render points, projected vertices, icon
//! resolution state. Nodes are identified by (feature id, sub-id); children
//! of a collection share the parent's feature id with ascending sub-ids.
//!
//! All node state belongs to the render thread. Other threads mutate
//! features through the renderer's command queue, never through these types
//! directly.

pub mod collection;
pub mod line;
pub mod point;
pub mod polygon;

pub use collection::CollectionNode;
pub use line::{LineNode, VertexSpace};
pub use point::PointNode;
pub use polygon::PolygonNode;

use serde::{Deserialize, Serialize};

use crate::atlas::IconPipeline;
use crate::geometry::{blob, EntityKind, Geometry};
use crate::style::StyleDescriptor;
use crate::tessellation::TessellationMode;

pub type FeatureId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AltitudeMode {
    #[default]
    ClampToGround,
    Relative,
    Absolute,
}

/// State shared by every node kind.
#[derive(Debug, Clone)]
pub struct NodeCore {
    pub feature_id: u64,
    pub sub_id: u32,
    pub name: Option<String>,
    /// Bumped on every accepted geometry or style update.
    pub version: u64,
    pub altitude_mode: AltitudeMode,
    /// Vertical offset in meters applied on top of the resolved altitude.
    pub extrude: f64,
    pub lod: i32,
    pub style: StyleDescriptor,
}

impl NodeCore {
    pub fn new(feature_id: u64, sub_id: u32) -> NodeCore {
        NodeCore {
            feature_id,
            sub_id,
            name: None,
            version: 0,
            altitude_mode: AltitudeMode::default(),
            extrude: 0.0,
            lod: 0,
            style: StyleDescriptor::default(),
        }
    }

    pub fn bump_version(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

/// Closed set of node kinds; dispatch is by match, there is no trait object
/// in the render loop.
pub enum GeometryNode {
    Point(PointNode),
    Line(LineNode),
    Polygon(PolygonNode),
    Collection(CollectionNode),
}

impl GeometryNode {
    pub fn new_for(entity: EntityKind, feature_id: u64, sub_id: u32) -> GeometryNode {
        match entity {
            EntityKind::Point => GeometryNode::Point(PointNode::new(feature_id, sub_id)),
            EntityKind::LineString => GeometryNode::Line(LineNode::new(feature_id, sub_id)),
            EntityKind::Polygon => GeometryNode::Polygon(PolygonNode::new(feature_id, sub_id)),
            EntityKind::Collection => {
                GeometryNode::Collection(CollectionNode::new(feature_id, sub_id))
            }
        }
    }

    /// Fresh node for a feature, named before any geometry arrives.
    pub fn init(entity: EntityKind, feature_id: u64, name: Option<String>) -> GeometryNode {
        let mut node = GeometryNode::new_for(entity, feature_id, 0);
        node.set_name(name);
        node
    }

    /// Drops cached atlas keys and any outstanding icon requests, forcing
    /// re-resolution. Used when the icon atlas is recycled.
    pub fn invalidate_icons(&mut self, icons: &mut IconPipeline) {
        match self {
            GeometryNode::Point(n) => icons.release_icon(&mut n.icon),
            GeometryNode::Collection(c) => c.invalidate_icons(icons),
            _ => {}
        }
    }

    pub fn entity(&self) -> EntityKind {
        match self {
            GeometryNode::Point(_) => EntityKind::Point,
            GeometryNode::Line(_) => EntityKind::LineString,
            GeometryNode::Polygon(_) => EntityKind::Polygon,
            GeometryNode::Collection(_) => EntityKind::Collection,
        }
    }

    pub fn core(&self) -> &NodeCore {
        match self {
            GeometryNode::Point(n) => &n.core,
            GeometryNode::Line(n) => &n.core,
            GeometryNode::Polygon(n) => &n.line.core,
            GeometryNode::Collection(n) => &n.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut NodeCore {
        match self {
            GeometryNode::Point(n) => &mut n.core,
            GeometryNode::Line(n) => &mut n.core,
            GeometryNode::Polygon(n) => &mut n.line.core,
            GeometryNode::Collection(n) => &mut n.core,
        }
    }

    /// Applies an in-memory geometry. An update whose class does not match
    /// the node is dropped with a warning; the renderer replaces the whole
    /// node when a feature changes class.
    pub fn set_geometry(&mut self, geometry: &Geometry, lod: i32, icons: &mut IconPipeline) {
        match (self, geometry) {
            (GeometryNode::Point(n), Geometry::Point(p)) => {
                n.core.lod = lod;
                n.set_geometry(p);
            }
            (GeometryNode::Line(n), Geometry::LineString(ls)) => {
                n.core.lod = lod;
                n.set_geometry(ls);
            }
            (GeometryNode::Polygon(n), Geometry::Polygon(p)) => {
                n.line.core.lod = lod;
                n.set_geometry(p);
            }
            (GeometryNode::Collection(n), Geometry::Collection(c)) => {
                n.core.lod = lod;
                n.set_geometry(c, icons);
            }
            (node, geometry) => {
                log::warn!(
                    "feature {}: geometry {:?} does not match node {:?}, update dropped",
                    node.core().feature_id,
                    geometry.entity(),
                    node.entity()
                );
            }
        }
    }

    /// Decodes and applies a binary geometry blob. A malformed blob leaves
    /// the node's previous geometry in place.
    pub fn set_geometry_blob(&mut self, data: &[u8], lod: i32, icons: &mut IconPipeline) {
        match blob::decode(data) {
            Ok(geometry) => self.set_geometry(&geometry, lod, icons),
            Err(e) => log::warn!(
                "feature {}: invalid geometry blob, retaining previous geometry: {:#}",
                self.core().feature_id,
                e
            ),
        }
    }

    pub fn set_style(&mut self, style: &StyleDescriptor) {
        match self {
            GeometryNode::Point(n) => n.set_style(style),
            GeometryNode::Line(n) => n.set_style(style),
            GeometryNode::Polygon(n) => n.set_style(style),
            GeometryNode::Collection(n) => n.set_style(style),
        }
    }

    pub fn set_altitude_mode(&mut self, mode: AltitudeMode) {
        match self {
            GeometryNode::Point(n) => n.set_altitude_mode(mode),
            GeometryNode::Line(n) => n.set_altitude_mode(mode),
            GeometryNode::Polygon(n) => n.line.set_altitude_mode(mode),
            GeometryNode::Collection(n) => n.set_altitude_mode(mode),
        }
    }

    pub fn set_extrude(&mut self, extrude: f64) {
        match self {
            GeometryNode::Point(n) => n.set_extrude(extrude),
            GeometryNode::Line(n) => n.set_extrude(extrude),
            GeometryNode::Polygon(n) => n.line.set_extrude(extrude),
            GeometryNode::Collection(n) => n.set_extrude(extrude),
        }
    }

    pub fn set_name(&mut self, name: Option<String>) {
        if let GeometryNode::Collection(n) = self {
            n.set_name(name);
        } else {
            self.core_mut().name = name;
        }
    }

    pub fn set_tessellation_enabled(&mut self, enabled: bool) {
        match self {
            GeometryNode::Point(_) => {}
            GeometryNode::Line(n) => n.set_tessellation_enabled(enabled),
            GeometryNode::Polygon(n) => n.line.set_tessellation_enabled(enabled),
            GeometryNode::Collection(n) => n.set_tessellation_enabled(enabled),
        }
    }

    /// Sets the metric threshold; the grid-unit threshold scales with it.
    pub fn set_tessellation_threshold(&mut self, meters: f64) {
        match self {
            GeometryNode::Point(_) => {}
            GeometryNode::Line(n) => n.set_tessellation_threshold(meters),
            GeometryNode::Polygon(n) => n.line.set_tessellation_threshold(meters),
            GeometryNode::Collection(n) => n.set_tessellation_threshold(meters),
        }
    }

    pub fn set_tessellation_mode(&mut self, mode: TessellationMode) {
        match self {
            GeometryNode::Point(_) => {}
            GeometryNode::Line(n) => n.set_tessellation_mode(mode),
            GeometryNode::Polygon(n) => n.line.set_tessellation_mode(mode),
            GeometryNode::Collection(n) => n.set_tessellation_mode(mode),
        }
    }

    pub fn release(&mut self, icons: &mut IconPipeline) {
        match self {
            GeometryNode::Point(n) => n.release(icons),
            GeometryNode::Line(n) => n.release(),
            GeometryNode::Polygon(n) => n.release(),
            GeometryNode::Collection(n) => n.release(icons),
        }
    }
}
