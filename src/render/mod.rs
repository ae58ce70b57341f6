//! Batched geometry renderer
//!
//! The renderer owns every node derived from the feature set, classifies
//! them into draw buckets each frame, and emits engine-agnostic draw calls
//! per pass. It is single-threaded by construction: all node state lives on
//! the render thread, and other threads mutate features by submitting
//! commands through [`RenderContext`], drained at the start of each frame.

pub mod emit;
pub mod hit;
pub mod sort;
pub mod view;

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;

use crate::atlas::{BitmapLoader, IconPipeline};
use crate::geometry::{blob, Geometry};
use crate::node::{
    AltitudeMode, CollectionNode, GeometryNode, LineNode, PointNode, PolygonNode, VertexSpace,
};
use crate::style::{Color, StyleDescriptor};
use crate::tessellation::TessellationMode;

use emit::{
    DrawCall, FrameOutput, IconQuad, LineBatcher, POINT_BATCHING_THRESHOLD, RENDER_PASS_SPRITES,
    RENDER_PASS_SURFACE, TILT_ANCHOR_LIFT_PX,
};
use view::MapView;

/// Icon slot edge at density 1.0; scales with the display density.
const BASE_ICON_SIZE: u32 = 64;

/// A feature mutation submitted from off the render thread.
pub enum Command {
    SetGeometry {
        feature_id: u64,
        geometry: Geometry,
        lod: i32,
    },
    SetGeometryBlob {
        feature_id: u64,
        blob: Vec<u8>,
        lod: i32,
    },
    SetStyle {
        feature_id: u64,
        style: StyleDescriptor,
    },
    SetAltitudeMode {
        feature_id: u64,
        mode: AltitudeMode,
    },
    SetExtrude {
        feature_id: u64,
        extrude: f64,
    },
    SetName {
        feature_id: u64,
        name: Option<String>,
    },
    Remove {
        feature_id: u64,
    },
}

/// Shared handle between the render thread and feature producers. The queue
/// is the only cross-thread surface; everything else belongs to the thread
/// that created the context.
pub struct RenderContext {
    render_thread: ThreadId,
    queue: Mutex<Vec<Command>>,
}

impl RenderContext {
    pub fn new() -> Arc<RenderContext> {
        Arc::new(RenderContext {
            render_thread: thread::current().id(),
            queue: Mutex::new(Vec::new()),
        })
    }

    pub fn is_render_thread(&self) -> bool {
        thread::current().id() == self.render_thread
    }

    pub fn submit(&self, command: Command) {
        self.queue.lock().unwrap().push(command);
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *self.queue.lock().unwrap())
    }
}

pub struct BatchRenderer {
    context: Arc<RenderContext>,
    pub(crate) nodes: IndexMap<u64, GeometryNode>,
    pub(crate) icons: IconPipeline,
    tessellation_enabled: bool,
    tessellation_threshold: Option<f64>,
    tessellation_mode: TessellationMode,
    display_density: f32,
}

impl BatchRenderer {
    pub fn new(
        context: Arc<RenderContext>,
        loader: Arc<dyn BitmapLoader>,
        default_icon_uri: impl Into<String>,
    ) -> BatchRenderer {
        BatchRenderer {
            context,
            nodes: IndexMap::new(),
            icons: IconPipeline::new(loader, default_icon_uri, 1024, BASE_ICON_SIZE),
            tessellation_enabled: true,
            tessellation_threshold: None,
            tessellation_mode: TessellationMode::Geodetic,
            display_density: 1.0,
        }
    }

    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    pub fn icons(&self) -> &IconPipeline {
        &self.icons
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, feature_id: u64) -> Option<&GeometryNode> {
        self.nodes.get(&feature_id)
    }

    /// Direct node access, render thread only.
    pub fn node_mut(&mut self, feature_id: u64) -> Option<&mut GeometryNode> {
        self.nodes.get_mut(&feature_id)
    }

    pub fn set_tessellation_enabled(&mut self, enabled: bool) {
        self.tessellation_enabled = enabled;
        for node in self.nodes.values_mut() {
            node.set_tessellation_enabled(enabled);
        }
    }

    pub fn set_tessellation_threshold(&mut self, meters: f64) {
        self.tessellation_threshold = Some(meters);
        for node in self.nodes.values_mut() {
            node.set_tessellation_threshold(meters);
        }
    }

    pub fn set_tessellation_mode(&mut self, mode: TessellationMode) {
        self.tessellation_mode = mode;
        for node in self.nodes.values_mut() {
            node.set_tessellation_mode(mode);
        }
    }

    /// Recycles the icon atlas at a new density scale. Every point
    /// re-resolves its icon on the next frame.
    pub fn set_display_density(&mut self, density: f32) {
        if (density - self.display_density).abs() < f32::EPSILON {
            return;
        }
        self.display_density = density;
        let icon_size = ((BASE_ICON_SIZE as f32 * density).round() as u32).max(1);
        let Self { nodes, icons, .. } = self;
        icons.recycle(icon_size);
        for node in nodes.values_mut() {
            node.invalidate_icons(icons);
        }
    }

    /// Replaces the whole node set, releasing the previous one.
    pub fn set_batch(&mut self, batch: Vec<GeometryNode>) {
        let Self { nodes, icons, .. } = self;
        for (_, mut node) in nodes.drain(..) {
            node.release(icons);
        }
        for node in batch {
            nodes.insert(node.core().feature_id, node);
        }
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::SetGeometry {
                feature_id,
                geometry,
                lod,
            } => self.upsert_geometry(feature_id, &geometry, lod),
            Command::SetGeometryBlob {
                feature_id,
                blob,
                lod,
            } => match blob::decode(&blob) {
                Ok(geometry) => self.upsert_geometry(feature_id, &geometry, lod),
                Err(e) => log::warn!(
                    "feature {}: invalid geometry blob, retaining previous geometry: {:#}",
                    feature_id,
                    e
                ),
            },
            Command::SetStyle { feature_id, style } => match self.nodes.get_mut(&feature_id) {
                Some(node) => node.set_style(&style),
                None => log::debug!("style for unknown feature {} dropped", feature_id),
            },
            Command::SetAltitudeMode { feature_id, mode } => {
                if let Some(node) = self.nodes.get_mut(&feature_id) {
                    node.set_altitude_mode(mode);
                }
            }
            Command::SetExtrude {
                feature_id,
                extrude,
            } => {
                if let Some(node) = self.nodes.get_mut(&feature_id) {
                    node.set_extrude(extrude);
                }
            }
            Command::SetName { feature_id, name } => {
                if let Some(node) = self.nodes.get_mut(&feature_id) {
                    node.set_name(name);
                }
            }
            Command::Remove { feature_id } => {
                if let Some(mut node) = self.nodes.shift_remove(&feature_id) {
                    node.release(&mut self.icons);
                }
            }
        }
    }

    fn upsert_geometry(&mut self, feature_id: u64, geometry: &Geometry, lod: i32) {
        let entity = geometry.entity();
        let class_changed = self
            .nodes
            .get(&feature_id)
            .map_or(true, |n| n.entity() != entity);
        if class_changed {
            let mut node = GeometryNode::new_for(entity, feature_id, 0);
            node.set_tessellation_enabled(self.tessellation_enabled);
            if let Some(t) = self.tessellation_threshold {
                node.set_tessellation_threshold(t);
            }
            node.set_tessellation_mode(self.tessellation_mode);
            if let Some(mut old) = self.nodes.insert(feature_id, node) {
                // a feature changing class keeps its style and placement
                let style = old.core().style.clone();
                let name = old.core().name.clone();
                let mode = old.core().altitude_mode;
                let extrude = old.core().extrude;
                old.release(&mut self.icons);
                let node = &mut self.nodes[&feature_id];
                node.set_style(&style);
                node.set_name(name);
                node.set_altitude_mode(mode);
                node.set_extrude(extrude);
            }
        }
        let Self { nodes, icons, .. } = self;
        if let Some(node) = nodes.get_mut(&feature_id) {
            node.set_geometry(geometry, lod, icons);
        }
    }

    /// Applies every queued command. Called implicitly by `draw`.
    pub fn begin_frame(&mut self) {
        let commands = self.context.drain();
        for command in commands {
            self.apply(command);
        }
    }

    /// Emits one frame's draw calls for the requested passes.
    pub fn draw(&mut self, map_view: &MapView, pass_mask: u32, out: &mut FrameOutput) {
        self.begin_frame();

        let Self { nodes, icons, .. } = self;
        let mut buckets = Buckets::default();
        for node in nodes.values_mut() {
            classify(node, icons, &mut buckets);
        }
        emit_buckets(buckets, map_view, pass_mask, icons, out);
    }

    /// Number of icon decodes still outstanding.
    pub fn loading_count(&self) -> usize {
        self.icons.pending_count()
    }

    pub fn release(&mut self) {
        let Self { nodes, icons, .. } = self;
        for (_, mut node) in nodes.drain(..) {
            node.release(icons);
        }
        icons.release();
    }
}

/// Typed draw buckets for one frame. Surface buckets hold clamp-to-ground
/// geometry; everything else renders in the sprite pass.
#[derive(Default)]
struct Buckets<'a> {
    labels: Vec<&'a mut PointNode>,
    icon_points: Vec<&'a mut PointNode>,
    loading: Vec<&'a mut PointNode>,
    surface_lines: Vec<&'a mut LineNode>,
    sprite_lines: Vec<&'a mut LineNode>,
    surface_fills: Vec<&'a mut PolygonNode>,
    sprite_fills: Vec<&'a mut PolygonNode>,
}

impl<'a> Buckets<'a> {
    fn sort(&mut self, map_view: &MapView) {
        self.labels
            .sort_by_key(|p| (p.core.feature_id, p.core.sub_id));
        if map_view.is_depth_sorted() {
            self.icon_points
                .sort_by(|a, b| sort::depth_order(a, b, map_view));
        } else {
            self.icon_points
                .sort_by_key(|p| (p.core.feature_id, p.core.sub_id));
        }
        self.surface_lines
            .sort_by_key(|l| (l.core.feature_id, l.core.sub_id));
        self.sprite_lines
            .sort_by_key(|l| (l.core.feature_id, l.core.sub_id));
        self.surface_fills
            .sort_by_key(|p| (p.line.core.feature_id, p.line.core.sub_id));
        self.sprite_fills
            .sort_by_key(|p| (p.line.core.feature_id, p.line.core.sub_id));
    }
}

fn on_surface(mode: AltitudeMode) -> bool {
    mode == AltitudeMode::ClampToGround
}

fn classify<'a>(node: &'a mut GeometryNode, icons: &mut IconPipeline, buckets: &mut Buckets<'a>) {
    match node {
        GeometryNode::Point(p) => classify_point(p, icons, buckets),
        GeometryNode::Line(l) => classify_line(l, buckets),
        GeometryNode::Polygon(p) => classify_polygon(p, buckets),
        GeometryNode::Collection(c) => classify_collection(c, icons, buckets),
    }
}

fn classify_collection<'a>(
    collection: &'a mut CollectionNode,
    icons: &mut IconPipeline,
    buckets: &mut Buckets<'a>,
) {
    for p in collection.points.iter_mut() {
        classify_point(p, icons, buckets);
    }
    for l in collection.lines.iter_mut() {
        classify_line(l, buckets);
    }
    for p in collection.polygons.iter_mut() {
        classify_polygon(p, buckets);
    }
    for c in collection.collections.iter_mut() {
        classify_collection(c, icons, buckets);
    }
}

fn classify_point<'a>(
    point: &'a mut PointNode,
    icons: &mut IconPipeline,
    buckets: &mut Buckets<'a>,
) {
    let wants_default = point.wants_default_icon();
    let wants_icon = point.wants_icon();
    let resolved = wants_icon && icons.resolve(&mut point.icon, wants_default);
    if point.label_text().is_some() {
        buckets.labels.push(point);
    } else if resolved {
        buckets.icon_points.push(point);
    } else if wants_icon {
        buckets.loading.push(point);
    }
}

fn classify_line<'a>(line: &'a mut LineNode, buckets: &mut Buckets<'a>) {
    if line.strokes.is_empty() || line.render_points().len() < 2 {
        return;
    }
    if on_surface(line.core.altitude_mode) {
        buckets.surface_lines.push(line);
    } else {
        buckets.sprite_lines.push(line);
    }
}

fn classify_polygon<'a>(polygon: &'a mut PolygonNode, buckets: &mut Buckets<'a>) {
    if polygon.has_fill() {
        if on_surface(polygon.line.core.altitude_mode) {
            buckets.surface_fills.push(polygon);
        } else {
            buckets.sprite_fills.push(polygon);
        }
    } else {
        classify_line(&mut polygon.line, buckets);
    }
}

fn emit_buckets(
    mut buckets: Buckets<'_>,
    map_view: &MapView,
    pass_mask: u32,
    icons: &IconPipeline,
    out: &mut FrameOutput,
) {
    buckets.sort(map_view);

    if pass_mask & RENDER_PASS_SURFACE != 0 {
        let mut batcher = LineBatcher::new();
        emit_fills(&mut buckets.surface_fills, map_view, &mut out.surface, &mut batcher);
        emit_lines(&mut buckets.surface_lines, map_view, &mut out.surface, &mut batcher);
        batcher.flush(&mut out.surface);
    }

    if pass_mask & RENDER_PASS_SPRITES != 0 {
        if !buckets.loading.is_empty() {
            log::trace!("{} points waiting on icon decode", buckets.loading.len());
        }
        let mut batcher = LineBatcher::new();
        emit_fills(&mut buckets.sprite_fills, map_view, &mut out.sprites, &mut batcher);
        emit_lines(&mut buckets.sprite_lines, map_view, &mut out.sprites, &mut batcher);
        batcher.flush(&mut out.sprites);
        emit_points(&mut buckets.icon_points, icons, map_view, &mut out.sprites);
        emit_labels(&mut buckets.labels, icons, map_view, &mut out.sprites);
    }
}

impl GeometryNode {
    /// Emits this node's draw calls for the requested passes, outside the
    /// renderer's per-frame bucket walk. Useful for drawing one feature on
    /// its own, an overlay cursor for instance.
    pub fn batch(
        &mut self,
        map_view: &MapView,
        pass_mask: u32,
        icons: &mut IconPipeline,
        out: &mut FrameOutput,
    ) {
        let mut buckets = Buckets::default();
        classify(self, icons, &mut buckets);
        emit_buckets(buckets, map_view, pass_mask, icons, out);
    }

    /// [`batch`](Self::batch) over both passes.
    pub fn draw(&mut self, map_view: &MapView, icons: &mut IconPipeline, out: &mut FrameOutput) {
        self.batch(
            map_view,
            RENDER_PASS_SURFACE | RENDER_PASS_SPRITES,
            icons,
            out,
        );
    }
}

fn emit_lines(
    lines: &mut [&mut LineNode],
    map_view: &MapView,
    out: &mut Vec<DrawCall>,
    batcher: &mut LineBatcher,
) {
    for line in lines.iter_mut() {
        if !line.project_vertices(map_view, VertexSpace::ScreenPixels) {
            continue;
        }
        // extruded geometry cannot share the 2D segment buffer under tilt
        let unbuffered = line.core.extrude != 0.0 && map_view.draw_tilt > 0.0;
        for i in 0..line.strokes.len() {
            let stroke = line.strokes[i];
            if unbuffered {
                batcher.flush(out);
                out.push(DrawCall::LineStrip {
                    vertices: line.vertices().to_vec(),
                    stroke,
                });
            } else {
                batcher.push_strip(out, line.vertices(), &stroke);
            }
        }
    }
}

fn emit_fills(
    fills: &mut [&mut PolygonNode],
    map_view: &MapView,
    out: &mut Vec<DrawCall>,
    batcher: &mut LineBatcher,
) {
    for polygon in fills.iter_mut() {
        if !polygon.line.project_vertices(map_view, VertexSpace::ScreenPixels) {
            continue;
        }
        if let Some(fill) = polygon.fill {
            if let Some(indices) = polygon.fill_indices().map(|s| s.to_vec()) {
                batcher.flush(out);
                out.push(DrawCall::FillTriangles {
                    vertices: polygon.line.vertices().to_vec(),
                    indices,
                    color: fill.color,
                });
            }
        }
        for i in 0..polygon.line.strokes.len() {
            let stroke = polygon.line.strokes[i];
            batcher.push_strip(out, polygon.line.vertices(), &stroke);
        }
    }
}

fn icon_quad(point: &PointNode, icons: &IconPipeline, tilted: bool) -> Option<(u32, IconQuad)> {
    let atlas = icons.atlas();
    let key = point.icon.key?;
    let texture_id = atlas.texture_id(key)?;
    let (ox, oy) = atlas.offset(key)?;
    let (w, h) = (point.icon.width, point.icon.height);
    let ts = atlas.texture_size() as f32;
    // under tilt the anchor lifts so the sprite sits above the surface
    let lift = if tilted { h / 2.0 + TILT_ANCHOR_LIFT_PX } else { 0.0 };
    Some((
        texture_id,
        IconQuad {
            x: point.screen_x - w / 2.0,
            y: point.screen_y - h / 2.0 - lift,
            width: w,
            height: h,
            u0: ox as f32 / ts,
            v0: oy as f32 / ts,
            u1: (ox as f32 + w) / ts,
            v1: (oy as f32 + h) / ts,
        },
    ))
}

fn emit_points(
    points: &mut Vec<&mut PointNode>,
    icons: &IconPipeline,
    map_view: &MapView,
    out: &mut Vec<DrawCall>,
) {
    for p in points.iter_mut() {
        p.compute_position(map_view);
    }
    let tilted = map_view.draw_tilt > 0.0;
    if points.len() >= POINT_BATCHING_THRESHOLD {
        // coalesce runs in draw order; reordering here would break the
        // painter's algorithm the bucket sort established
        let mut state: Option<(u32, Color)> = None;
        let mut quads: Vec<IconQuad> = Vec::new();
        for p in points.iter() {
            let Some((texture_id, quad)) = icon_quad(p, icons, tilted) else {
                continue;
            };
            let next = (texture_id, p.icon.tint);
            if state.map_or(false, |s| s != next) {
                if let Some((texture_id, tint)) = state {
                    out.push(DrawCall::Icons {
                        texture_id,
                        tint,
                        quads: std::mem::take(&mut quads),
                    });
                }
            }
            state = Some(next);
            quads.push(quad);
        }
        if let Some((texture_id, tint)) = state {
            if !quads.is_empty() {
                out.push(DrawCall::Icons {
                    texture_id,
                    tint,
                    quads,
                });
            }
        }
    } else {
        for p in points.iter() {
            if let Some((texture_id, quad)) = icon_quad(p, icons, tilted) {
                out.push(DrawCall::Icons {
                    texture_id,
                    tint: p.icon.tint,
                    quads: vec![quad],
                });
            }
        }
    }
}

fn emit_labels(
    labels: &mut [&mut PointNode],
    icons: &IconPipeline,
    map_view: &MapView,
    out: &mut Vec<DrawCall>,
) {
    let tilted = map_view.draw_tilt > 0.0;
    for p in labels.iter_mut() {
        p.compute_position(map_view);
        if let Some((texture_id, quad)) = icon_quad(p, icons, tilted) {
            out.push(DrawCall::Icons {
                texture_id,
                tint: p.icon.tint,
                quads: vec![quad],
            });
        }
        let style = p.label.clone().unwrap_or_default();
        if map_view.draw_map_resolution >= style.min_render_resolution {
            continue;
        }
        let Some(text) = p.label_text() else {
            continue;
        };
        // anchor under the icon when one is present
        let y = p.screen_y + p.icon.height / 2.0;
        out.push(DrawCall::Label {
            text: text.to_string(),
            x: p.screen_x,
            y,
            style,
        });
    }
}
