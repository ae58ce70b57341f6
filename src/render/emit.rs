//! Frame output model
//!
//! The renderer emits engine-agnostic draw calls per pass. Line strips are
//! expanded into a shared discrete-segment buffer so runs of lines with the
//! same stroke state coalesce into one call; the buffer flushes when the
//! stroke state changes or the capacity is reached. A single line too large
//! for the shared buffer falls back to an unbuffered strip call.

use crate::style::{Color, LabelStyle, StrokeStyle};

pub const RENDER_PASS_SURFACE: u32 = 0x1;
pub const RENDER_PASS_SPRITES: u32 = 0x2;

/// Capacity of the shared segment buffer, in vertices.
pub const MAX_BUFFERED_POINTS: usize = 20_000;

/// Below this many icon points per frame, points draw individually instead
/// of being sorted and coalesced.
pub const POINT_BATCHING_THRESHOLD: usize = 500;

/// Extra pixels an icon anchor lifts under tilt, on top of half the icon
/// height, so sprites sit above the surface instead of straddling it.
pub const TILT_ANCHOR_LIFT_PX: f32 = 8.0;

/// One icon sprite, in screen pixels with normalized texture coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct IconQuad {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCall {
    /// Connected strip, used for lines past the shared buffer capacity.
    LineStrip {
        vertices: Vec<[f32; 3]>,
        stroke: StrokeStyle,
    },
    /// Discrete segments (vertex pairs) sharing one stroke state.
    LineSegments {
        vertices: Vec<[f32; 3]>,
        stroke: StrokeStyle,
    },
    /// Indexed triangles over a polygon ring's projected vertices.
    FillTriangles {
        vertices: Vec<[f32; 3]>,
        indices: Vec<u32>,
        color: Color,
    },
    /// One or more icon sprites from a single atlas page with one tint.
    Icons {
        texture_id: u32,
        tint: Color,
        quads: Vec<IconQuad>,
    },
    Label {
        text: String,
        x: f32,
        y: f32,
        style: LabelStyle,
    },
}

/// Draw calls for one frame, split by pass.
#[derive(Default)]
pub struct FrameOutput {
    pub surface: Vec<DrawCall>,
    pub sprites: Vec<DrawCall>,
}

impl FrameOutput {
    pub fn new() -> FrameOutput {
        FrameOutput::default()
    }

    pub fn clear(&mut self) {
        self.surface.clear();
        self.sprites.clear();
    }
}

/// Accumulates strip vertices into shared segment calls.
pub struct LineBatcher {
    vertices: Vec<[f32; 3]>,
    stroke: Option<StrokeStyle>,
}

impl LineBatcher {
    pub fn new() -> LineBatcher {
        LineBatcher {
            vertices: Vec::new(),
            stroke: None,
        }
    }

    /// Appends one strip under `stroke`. Oversized strips bypass the buffer
    /// entirely and emit as a standalone strip call.
    pub fn push_strip(&mut self, out: &mut Vec<DrawCall>, strip: &[[f32; 3]], stroke: &StrokeStyle) {
        if strip.len() < 2 {
            return;
        }
        if (strip.len() - 1) * 2 > MAX_BUFFERED_POINTS {
            self.flush(out);
            out.push(DrawCall::LineStrip {
                vertices: strip.to_vec(),
                stroke: *stroke,
            });
            return;
        }
        if self.stroke.map_or(false, |s| s != *stroke) {
            self.flush(out);
        }
        self.stroke = Some(*stroke);
        for w in strip.windows(2) {
            if self.vertices.len() + 2 > MAX_BUFFERED_POINTS {
                let s = *stroke;
                self.flush(out);
                self.stroke = Some(s);
            }
            self.vertices.push(w[0]);
            self.vertices.push(w[1]);
        }
    }

    pub fn flush(&mut self, out: &mut Vec<DrawCall>) {
        if self.vertices.is_empty() {
            self.stroke = None;
            return;
        }
        if let Some(stroke) = self.stroke.take() {
            out.push(DrawCall::LineSegments {
                vertices: std::mem::take(&mut self.vertices),
                stroke,
            });
        } else {
            self.vertices.clear();
        }
    }
}

impl Default for LineBatcher {
    fn default() -> Self {
        LineBatcher::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip(n: usize) -> Vec<[f32; 3]> {
        (0..n).map(|i| [i as f32, 0.0, 0.0]).collect()
    }

    fn red() -> StrokeStyle {
        StrokeStyle {
            color: Color::argb(255, 255, 0, 0),
            width: 1.0,
            pattern: None,
        }
    }

    fn blue() -> StrokeStyle {
        StrokeStyle {
            color: Color::argb(255, 0, 0, 255),
            width: 1.0,
            pattern: None,
        }
    }

    #[test]
    fn test_same_stroke_coalesces() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        batcher.push_strip(&mut out, &strip(3), &red());
        batcher.push_strip(&mut out, &strip(4), &red());
        batcher.flush(&mut out);
        assert_eq!(out.len(), 1);
        match &out[0] {
            DrawCall::LineSegments { vertices, .. } => assert_eq!(vertices.len(), (2 + 3) * 2),
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_stroke_change_flushes() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        batcher.push_strip(&mut out, &strip(3), &red());
        batcher.push_strip(&mut out, &strip(3), &blue());
        batcher.flush(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_width_change_flushes() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        let mut wide = red();
        wide.width = 4.0;
        batcher.push_strip(&mut out, &strip(3), &red());
        batcher.push_strip(&mut out, &strip(3), &wide);
        batcher.flush(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_pattern_change_flushes() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        let mut dashed = red();
        dashed.pattern = Some(crate::style::DashPattern {
            pattern: 0x0F0F,
            factor: 2,
        });
        batcher.push_strip(&mut out, &strip(3), &red());
        batcher.push_strip(&mut out, &strip(3), &dashed);
        batcher.flush(&mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_oversized_strip_goes_unbuffered() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        batcher.push_strip(&mut out, &strip(2), &red());
        batcher.push_strip(&mut out, &strip(MAX_BUFFERED_POINTS / 2 + 2), &red());
        batcher.flush(&mut out);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], DrawCall::LineSegments { .. }));
        assert!(matches!(out[1], DrawCall::LineStrip { .. }));
    }

    #[test]
    fn test_capacity_flush_mid_strip() {
        let mut out = Vec::new();
        let mut batcher = LineBatcher::new();
        // just under the unbuffered cutoff, repeated to overflow capacity
        let s = strip(MAX_BUFFERED_POINTS / 2);
        batcher.push_strip(&mut out, &s, &red());
        batcher.push_strip(&mut out, &s, &red());
        batcher.flush(&mut out);
        assert!(out.len() >= 2);
        for call in &out {
            match call {
                DrawCall::LineSegments { vertices, .. } => {
                    assert!(vertices.len() <= MAX_BUFFERED_POINTS)
                }
                other => panic!("unexpected call {:?}", other),
            }
        }
    }
}
