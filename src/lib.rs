//! Batched vector geometry rendering for map engines
//!
//! Turns a mutable set of geodetic features (points, linestrings, polygons,
//! and collections of them) into sorted, batched, engine-agnostic draw calls
//! per frame. Geometry arrives as in-memory objects or compact binary
//! blobs; styles are resolved descriptors applied per feature. The renderer
//! owns all derived state on a single thread and accepts mutations from
//! other threads through a command queue.
//!
//! The main entry points are [`render::BatchRenderer`] for drawing and hit
//! testing, [`render::RenderContext`] for cross-thread mutation, and
//! [`geometry::blob`] for the binary geometry codec.

pub mod atlas;
pub mod geo;
pub mod geometry;
pub mod node;
pub mod render;
pub mod style;
pub mod tessellation;

pub use atlas::{Bitmap, BitmapLoader, IconPipeline};
pub use geo::Envelope;
pub use geometry::{Geometry, GeometryCollection, LineString, Point, Polygon};
pub use node::{AltitudeMode, GeometryNode};
pub use render::emit::{DrawCall, FrameOutput, RENDER_PASS_SPRITES, RENDER_PASS_SURFACE};
pub use render::view::{MapView, TerrainModel};
pub use render::{BatchRenderer, Command, RenderContext};
pub use style::{Color, StyleDescriptor};
pub use tessellation::TessellationMode;
