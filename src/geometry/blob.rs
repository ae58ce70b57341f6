//! Compact binary geometry codec
//!
//! Layout (all integers and floats little-endian):
//!
//! ```text
//! blob       := type_code:i32 body
//! type_code  := compressed * 1_000_000 + dim * 1_000 + entity
//!               dim: 0 = XY, 1 = XYZ, 2 = XYM, 3 = XYZM
//!               entity: 1 = point, 2 = linestring, 3 = polygon, 7 = collection
//! point      := component{n}                       (full-width f64)
//! linestring := count:i32 first_point point_rest{count-1}
//! polygon    := ring_count:i32 linestring{ring_count}
//! collection := declared:u8 count:i32 (entity:u8 body){count}
//! ```
//!
//! When the compressed flag is set, every vertex after the first is stored as
//! f32 deltas from its predecessor. M components are decoded and discarded.
//!
//! The vertex count of a linestring is validated against the bytes actually
//! remaining in the buffer before any allocation; an overclaimed count fails
//! the decode so the caller can retain its previous geometry. A collection
//! child whose entity byte disagrees with a homogeneous declaration is
//! consumed from the stream but dropped from the result, so the surviving
//! children keep their positions.

use std::io::Cursor;

use anyhow::{bail, ensure, Context, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use super::{EntityKind, Geometry, GeometryCollection, LineString, Point, Polygon};

/// Decoded type-code fields shared by every geometry in one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobHeader {
    pub compressed: bool,
    pub has_z: bool,
    pub has_m: bool,
    pub entity: EntityKind,
}

impl BlobHeader {
    /// Components stored per vertex, including any M value.
    pub fn component_count(&self) -> usize {
        2 + self.has_z as usize + self.has_m as usize
    }

    pub fn type_code(&self) -> i32 {
        let dim = self.has_z as i32 + 2 * self.has_m as i32;
        self.compressed as i32 * 1_000_000 + dim * 1_000 + self.entity.code() as i32
    }
}

pub fn parse_type_code(code: i32) -> Result<BlobHeader> {
    let compressed = code / 1_000_000 == 1;
    let dim = (code / 1_000) % 1_000;
    let (has_z, has_m) = match dim {
        0 => (false, false),
        1 => (true, false),
        2 => (false, true),
        3 => (true, true),
        other => bail!("unrecognized geometry dimension {} in type code {}", other, code),
    };
    let entity = EntityKind::from_code((code % 1_000) as u8)
        .with_context(|| format!("type code {}", code))?;
    Ok(BlobHeader {
        compressed,
        has_z,
        has_m,
        entity,
    })
}

/// Collections may nest, but a decoded blob is rejected past this depth so
/// a crafted blob cannot recurse the decoder off the stack.
const MAX_COLLECTION_DEPTH: usize = 8;

pub fn decode(blob: &[u8]) -> Result<Geometry> {
    let mut cur = Cursor::new(blob);
    let code = cur.read_i32::<LE>().context("truncated type code")?;
    let header = parse_type_code(code)?;
    decode_body(&mut cur, &header, 0)
}

fn decode_body(cur: &mut Cursor<&[u8]>, header: &BlobHeader, depth: usize) -> Result<Geometry> {
    Ok(match header.entity {
        EntityKind::Point => Geometry::Point(read_point(cur, header)?),
        EntityKind::LineString => Geometry::LineString(read_line_string(cur, header)?),
        EntityKind::Polygon => Geometry::Polygon(read_polygon(cur, header)?),
        EntityKind::Collection => Geometry::Collection(read_collection(cur, header, depth)?),
    })
}

fn remaining(cur: &Cursor<&[u8]>) -> usize {
    cur.get_ref().len().saturating_sub(cur.position() as usize)
}

fn read_point(cur: &mut Cursor<&[u8]>, header: &BlobHeader) -> Result<Point> {
    let x = cur.read_f64::<LE>().context("truncated point")?;
    let y = cur.read_f64::<LE>().context("truncated point")?;
    let z = if header.has_z {
        cur.read_f64::<LE>().context("truncated point")?
    } else {
        0.0
    };
    if header.has_m {
        cur.read_f64::<LE>().context("truncated point")?;
    }
    Ok(Point { x, y, z })
}

fn read_line_string(cur: &mut Cursor<&[u8]>, header: &BlobHeader) -> Result<LineString> {
    let count = cur.read_i32::<LE>().context("truncated vertex count")?;
    ensure!(count >= 0, "negative vertex count {}", count);
    let count = count as usize;

    let size = header.component_count();
    let avail = remaining(cur);
    let max_points = if header.compressed {
        if avail < size * 8 {
            0
        } else {
            1 + (avail - size * 8) / (size * 4)
        }
    } else {
        avail / (size * 8)
    };
    ensure!(
        count <= max_points,
        "vertex count {} exceeds buffer capacity {}",
        count,
        max_points
    );

    let mut points = Vec::with_capacity(count);
    let mut prev = [0.0f64; 3];
    for i in 0..count {
        let p = if i == 0 || !header.compressed {
            let x = cur.read_f64::<LE>()?;
            let y = cur.read_f64::<LE>()?;
            let z = if header.has_z { cur.read_f64::<LE>()? } else { 0.0 };
            if header.has_m {
                cur.read_f64::<LE>()?;
            }
            [x, y, z]
        } else {
            let x = prev[0] + cur.read_f32::<LE>()? as f64;
            let y = prev[1] + cur.read_f32::<LE>()? as f64;
            let z = if header.has_z {
                prev[2] + cur.read_f32::<LE>()? as f64
            } else {
                0.0
            };
            if header.has_m {
                cur.read_f32::<LE>()?;
            }
            [x, y, z]
        };
        prev = p;
        points.push(p);
    }
    Ok(LineString { points })
}

fn read_polygon(cur: &mut Cursor<&[u8]>, header: &BlobHeader) -> Result<Polygon> {
    let ring_count = cur.read_i32::<LE>().context("truncated ring count")?;
    ensure!(ring_count >= 0, "negative ring count {}", ring_count);
    if ring_count == 0 {
        return Ok(Polygon::default());
    }
    let exterior = read_line_string(cur, header).context("exterior ring")?;
    let mut interiors = Vec::with_capacity(ring_count as usize - 1);
    for i in 1..ring_count {
        interiors.push(read_line_string(cur, header).with_context(|| format!("interior ring {}", i))?);
    }
    Ok(Polygon { exterior, interiors })
}

fn read_collection(
    cur: &mut Cursor<&[u8]>,
    header: &BlobHeader,
    depth: usize,
) -> Result<GeometryCollection> {
    ensure!(
        depth < MAX_COLLECTION_DEPTH,
        "collection nesting deeper than {}",
        MAX_COLLECTION_DEPTH
    );
    let declared = cur.read_u8().context("truncated entity declaration")?;
    let declared_entity = if declared == 0 {
        None
    } else {
        Some(EntityKind::from_code(declared)?)
    };
    let count = cur.read_i32::<LE>().context("truncated child count")?;
    ensure!(count >= 0, "negative child count {}", count);

    let mut children = Vec::with_capacity(count as usize);
    for i in 0..count {
        let entity = EntityKind::from_code(cur.read_u8()?)
            .with_context(|| format!("collection child {}", i))?;
        let child_header = BlobHeader { entity, ..*header };
        let child = decode_body(cur, &child_header, depth + 1)
            .with_context(|| format!("collection child {}", i))?;
        if let Some(expected) = declared_entity {
            if entity != expected {
                log::warn!(
                    "collection declared homogeneous {:?} but child {} is {:?}, child dropped",
                    expected,
                    i,
                    entity
                );
                continue;
            }
        }
        children.push(child);
    }
    Ok(GeometryCollection {
        declared_entity,
        children,
    })
}

/// Per-blob encoding options; the decoder derives the same fields from the
/// type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlobFormat {
    pub compressed: bool,
    pub has_z: bool,
    pub has_m: bool,
}

pub fn encode(geometry: &Geometry, format: BlobFormat) -> Vec<u8> {
    let header = BlobHeader {
        compressed: format.compressed,
        has_z: format.has_z,
        has_m: format.has_m,
        entity: geometry.entity(),
    };
    let mut out = Vec::new();
    out.write_i32::<LE>(header.type_code()).unwrap();
    write_body(&mut out, geometry, &header);
    out
}

fn write_body(out: &mut Vec<u8>, geometry: &Geometry, header: &BlobHeader) {
    match geometry {
        Geometry::Point(p) => write_point(out, p, header),
        Geometry::LineString(ls) => write_line_string(out, ls, header),
        Geometry::Polygon(poly) => {
            out.write_i32::<LE>(1 + poly.interiors.len() as i32).unwrap();
            write_line_string(out, &poly.exterior, header);
            for ring in &poly.interiors {
                write_line_string(out, ring, header);
            }
        }
        Geometry::Collection(c) => {
            out.push(c.declared_entity.map_or(0, |e| e.code()));
            out.write_i32::<LE>(c.children.len() as i32).unwrap();
            for child in &c.children {
                out.push(child.entity().code());
                let child_header = BlobHeader {
                    entity: child.entity(),
                    ..*header
                };
                write_body(out, child, &child_header);
            }
        }
    }
}

fn write_point(out: &mut Vec<u8>, p: &Point, header: &BlobHeader) {
    out.write_f64::<LE>(p.x).unwrap();
    out.write_f64::<LE>(p.y).unwrap();
    if header.has_z {
        out.write_f64::<LE>(p.z).unwrap();
    }
    if header.has_m {
        out.write_f64::<LE>(0.0).unwrap();
    }
}

fn write_line_string(out: &mut Vec<u8>, ls: &LineString, header: &BlobHeader) {
    out.write_i32::<LE>(ls.points.len() as i32).unwrap();
    let mut prev = [0.0f64; 3];
    for (i, p) in ls.points.iter().enumerate() {
        if i == 0 || !header.compressed {
            out.write_f64::<LE>(p[0]).unwrap();
            out.write_f64::<LE>(p[1]).unwrap();
            if header.has_z {
                out.write_f64::<LE>(p[2]).unwrap();
            }
            if header.has_m {
                out.write_f64::<LE>(0.0).unwrap();
            }
        } else {
            out.write_f32::<LE>((p[0] - prev[0]) as f32).unwrap();
            out.write_f32::<LE>((p[1] - prev[1]) as f32).unwrap();
            if header.has_z {
                out.write_f32::<LE>((p[2] - prev[2]) as f32).unwrap();
            }
            if header.has_m {
                out.write_f32::<LE>(0.0).unwrap();
            }
        }
        prev = *p;
    }
}
