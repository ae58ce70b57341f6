//! Style descriptors applied to geometry nodes
//!
//! Styles are resolved externally (symbology, user settings) and handed to a
//! node through a single `set_style` call. A descriptor may carry several
//! stroke sub-styles that render simultaneously, plus optional fill, icon,
//! and label components.

use serde::{Deserialize, Serialize};

/// Packed ARGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFFFFFF);

    pub fn argb(a: u8, r: u8, g: u8, b: u8) -> Color {
        Color(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | (b as u32))
    }

    pub fn alpha(&self) -> f32 {
        ((self.0 >> 24) & 0xFF) as f32 / 255.0
    }

    pub fn red(&self) -> f32 {
        ((self.0 >> 16) & 0xFF) as f32 / 255.0
    }

    pub fn green(&self) -> f32 {
        ((self.0 >> 8) & 0xFF) as f32 / 255.0
    }

    pub fn blue(&self) -> f32 {
        (self.0 & 0xFF) as f32 / 255.0
    }

    pub fn rgba(&self) -> [f32; 4] {
        [self.red(), self.green(), self.blue(), self.alpha()]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// On/off stroke pattern, sampled along the screen-space length of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DashPattern {
    /// 16-bit on/off mask, LSB first.
    pub pattern: u16,
    /// Stretch factor; each pattern bit covers this many pixels.
    pub factor: u8,
}

/// A single stroke rendering of a line or polygon boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
    pub pattern: Option<DashPattern>,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        StrokeStyle {
            color: Color::WHITE,
            width: 1.0,
            pattern: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillStyle {
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconStyle {
    pub uri: String,
    pub tint: Color,
}

/// Default resolution gate below which labels render, meters per pixel.
pub const DEFAULT_MIN_LABEL_RENDER_RESOLUTION: f64 = 13.0;

/// Label placement and appearance. Alignment values are -1/0/1 relative to
/// the anchor (before / centered / after) on each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    pub text: Option<String>,
    pub align_x: i8,
    pub align_y: i8,
    pub text_color: Color,
    pub background_color: Color,
    /// Degrees, counter-clockwise.
    pub rotation: f32,
    /// When false, rotation is relative to map north instead of screen up.
    pub rotation_absolute: bool,
    pub min_render_resolution: f64,
}

impl Default for LabelStyle {
    fn default() -> Self {
        LabelStyle {
            text: None,
            align_x: 0,
            align_y: 0,
            text_color: Color::WHITE,
            background_color: Color::argb(153, 0, 0, 0),
            rotation: 0.0,
            rotation_absolute: false,
            min_render_resolution: DEFAULT_MIN_LABEL_RENDER_RESOLUTION,
        }
    }
}

/// Fully resolved style for one feature.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StyleDescriptor {
    pub strokes: Vec<StrokeStyle>,
    pub fill: Option<FillStyle>,
    pub icon: Option<IconStyle>,
    pub label: Option<LabelStyle>,
}

impl StyleDescriptor {
    pub fn stroke(color: Color, width: f32) -> Self {
        StyleDescriptor {
            strokes: vec![StrokeStyle {
                color,
                width,
                pattern: None,
            }],
            ..Default::default()
        }
    }

    pub fn filled(stroke: Color, width: f32, fill: Color) -> Self {
        StyleDescriptor {
            strokes: vec![StrokeStyle {
                color: stroke,
                width,
                pattern: None,
            }],
            fill: Some(FillStyle { color: fill }),
            ..Default::default()
        }
    }

    pub fn icon(uri: impl Into<String>) -> Self {
        StyleDescriptor {
            icon: Some(IconStyle {
                uri: uri.into(),
                tint: Color::WHITE,
            }),
            ..Default::default()
        }
    }

    pub fn label(text: impl Into<String>) -> Self {
        StyleDescriptor {
            label: Some(LabelStyle {
                text: Some(text.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_components() {
        let c = Color::argb(255, 255, 0, 0);
        assert_eq!(c.red(), 1.0);
        assert_eq!(c.green(), 0.0);
        assert_eq!(c.alpha(), 1.0);
    }

    #[test]
    fn test_descriptor_json_round_trip() {
        let d = StyleDescriptor::filled(Color::argb(255, 0, 255, 0), 2.0, Color::argb(128, 0, 0, 255));
        let json = serde_json::to_string(&d).unwrap();
        let back: StyleDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
