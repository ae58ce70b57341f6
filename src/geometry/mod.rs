//! Source geometry model
//!
//! Geometries arrive either as in-memory objects or as compact binary blobs
//! (see [`blob`]). Coordinates are geodetic: `x` is longitude, `y` is
//! latitude, `z` is altitude in meters (HAE).

pub mod blob;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Geometry class tag, also the low digits of a blob type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Point,
    LineString,
    Polygon,
    Collection,
}

impl EntityKind {
    pub fn code(self) -> u8 {
        match self {
            EntityKind::Point => 1,
            EntityKind::LineString => 2,
            EntityKind::Polygon => 3,
            EntityKind::Collection => 7,
        }
    }

    pub fn from_code(code: u8) -> Result<EntityKind> {
        Ok(match code {
            1 => EntityKind::Point,
            2 => EntityKind::LineString,
            3 => EntityKind::Polygon,
            7 => EntityKind::Collection,
            other => bail!("unrecognized geometry entity code {}", other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Point {
        Point { x, y, z: 0.0 }
    }

    pub fn with_altitude(x: f64, y: f64, z: f64) -> Point {
        Point { x, y, z }
    }
}

/// Ordered vertex run. Stored as `[x, y, z]` triples regardless of the
/// source dimensionality; 2D sources carry `z = 0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineString {
    pub points: Vec<[f64; 3]>,
}

impl LineString {
    pub fn new(points: Vec<[f64; 3]>) -> LineString {
        LineString { points }
    }

    pub fn from_xy(points: &[[f64; 2]]) -> LineString {
        LineString {
            points: points.iter().map(|p| [p[0], p[1], 0.0]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// A ring is closed when its first and last vertices coincide.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => a[0] == b[0] && a[1] == b[1],
            _ => false,
        }
    }
}

/// Only the exterior ring participates in rendering; interior rings are
/// decoded for cursor correctness and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: LineString,
    pub interiors: Vec<LineString>,
}

impl Polygon {
    pub fn new(exterior: LineString) -> Polygon {
        Polygon {
            exterior,
            interiors: Vec::new(),
        }
    }
}

/// Heterogeneous or homogeneous child set. `declared_entity` mirrors the
/// blob-level homogeneity declaration; `None` means mixed children are
/// expected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometryCollection {
    pub declared_entity: Option<EntityKind>,
    pub children: Vec<Geometry>,
}

impl GeometryCollection {
    pub fn new(children: Vec<Geometry>) -> GeometryCollection {
        GeometryCollection {
            declared_entity: None,
            children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    Collection(GeometryCollection),
}

impl Geometry {
    pub fn entity(&self) -> EntityKind {
        match self {
            Geometry::Point(_) => EntityKind::Point,
            Geometry::LineString(_) => EntityKind::LineString,
            Geometry::Polygon(_) => EntityKind::Polygon,
            Geometry::Collection(_) => EntityKind::Collection,
        }
    }
}
