//! Point node: icon and label anchor with a cached screen position

use crate::atlas::{loader::IconState, IconPipeline};
use crate::geo::Envelope;
use crate::geometry::Point;
use crate::render::view::MapView;
use crate::style::{LabelStyle, StyleDescriptor};

use super::{AltitudeMode, NodeCore};

/// Keys under which the projected position stays valid.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PositionKey {
    draw_version: u32,
    srid: i32,
    unwrap: f64,
    terrain_version: i32,
}

pub struct PointNode {
    pub core: NodeCore,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
    pub icon: IconState,
    pub label: Option<LabelStyle>,
    cache_key: Option<PositionKey>,
    pub screen_x: f32,
    pub screen_y: f32,
    /// Resolved altitude in meters after terrain clamping.
    pub resolved_altitude: f64,
}

impl PointNode {
    pub fn new(feature_id: u64, sub_id: u32) -> PointNode {
        PointNode {
            core: NodeCore::new(feature_id, sub_id),
            longitude: 0.0,
            latitude: 0.0,
            altitude: 0.0,
            icon: IconState::default(),
            label: None,
            cache_key: None,
            screen_x: 0.0,
            screen_y: 0.0,
            resolved_altitude: 0.0,
        }
    }

    pub fn set_geometry(&mut self, point: &Point) {
        self.longitude = point.x;
        self.latitude = point.y;
        self.altitude = point.z;
        self.cache_key = None;
        self.core.bump_version();
    }

    pub fn set_style(&mut self, style: &StyleDescriptor) {
        if self.core.style == *style {
            return;
        }
        let new_uri = style.icon.as_ref().map(|i| i.uri.clone());
        if new_uri != self.icon.uri {
            // pipeline reconciles any outstanding request on the next poll
            self.icon.uri = new_uri;
            self.icon.key = None;
        }
        if let Some(icon) = &style.icon {
            self.icon.tint = icon.tint;
        }
        self.label = style.label.clone();
        self.core.style = style.clone();
        self.core.bump_version();
    }

    pub fn set_altitude_mode(&mut self, mode: AltitudeMode) {
        if self.core.altitude_mode != mode {
            self.core.altitude_mode = mode;
            self.cache_key = None;
            self.core.bump_version();
        }
    }

    pub fn set_extrude(&mut self, extrude: f64) {
        if self.core.extrude != extrude {
            self.core.extrude = extrude;
            self.cache_key = None;
            self.core.bump_version();
        }
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label
            .as_ref()
            .and_then(|l| l.text.as_deref())
            .or(self.core.name.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// With no icon style and nothing to label, the point still has to show
    /// up somehow; it renders the default icon.
    pub fn wants_default_icon(&self) -> bool {
        self.icon.uri.is_none() && self.label_text().is_none()
    }

    pub fn wants_icon(&self) -> bool {
        self.icon.uri.is_some() || self.wants_default_icon()
    }

    pub fn envelope(&self) -> Envelope {
        let mut env = Envelope::empty();
        env.expand(self.longitude, self.latitude);
        env
    }

    fn unwrap_for(&self, view: &MapView) -> f64 {
        let offset = self.longitude - view.draw_lng;
        if offset > 180.0 {
            -360.0
        } else if offset < -180.0 {
            360.0
        } else {
            0.0
        }
    }

    /// Refreshes the cached screen position. Skipped entirely when the draw
    /// version, srid, unwrap, and terrain version all match the last
    /// computation.
    pub fn compute_position(&mut self, view: &MapView) {
        let unwrap = self.unwrap_for(view);
        let key = PositionKey {
            draw_version: view.draw_version,
            srid: view.srid,
            unwrap,
            terrain_version: view.terrain.version(),
        };
        if self.cache_key == Some(key) {
            return;
        }

        let terrain = view.terrain.elevation(self.latitude, self.longitude);
        let alt = match self.core.altitude_mode {
            AltitudeMode::ClampToGround => terrain,
            AltitudeMode::Relative => terrain + self.altitude,
            AltitudeMode::Absolute => self.altitude,
        };
        // anchors never sink below the surface
        let alt = alt.max(terrain) + self.core.extrude;

        let [x, y, _] = view.forward(self.latitude, self.longitude + unwrap, alt);
        self.screen_x = x as f32;
        self.screen_y = y as f32;
        self.resolved_altitude = alt;
        self.cache_key = Some(key);
    }

    /// Squared geodetic-degree distance to the depth-sort measurement
    /// point, farther values draw first under tilt.
    pub fn measure_distance_sq(&self, view: &MapView) -> f64 {
        let dx = self.longitude + self.unwrap_for(view) - view.measure_lng;
        let dy = self.latitude - view.measure_lat;
        dx * dx + dy * dy
    }

    /// Screen-space box containment against the cached position.
    pub fn hit_test_screen(&self, sx: f32, sy: f32, radius_px: f32) -> bool {
        let hw = (self.icon.width / 2.0).max(radius_px);
        let hh = (self.icon.height / 2.0).max(radius_px);
        (self.screen_x - sx).abs() <= hw && (self.screen_y - sy).abs() <= hh
    }

    pub fn release(&mut self, icons: &mut IconPipeline) {
        icons.release_icon(&mut self.icon);
        self.cache_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Color;
    use std::sync::Arc;

    #[test]
    fn test_position_cache_keyed_on_draw_version() {
        struct Bowl;
        impl crate::render::view::TerrainModel for Bowl {
            fn elevation(&self, lat: f64, _lng: f64) -> f64 {
                lat * 10.0
            }
        }

        let mut view = MapView::new(10.0, 10.0, 10.0);
        view.terrain = Arc::new(Bowl);
        let mut node = PointNode::new(1, 0);
        node.set_geometry(&Point::new(10.5, 10.5));

        node.compute_position(&view);
        let first = (node.screen_x, node.screen_y);

        // same frame, recompute is a no-op even if we poke the position
        node.compute_position(&view);
        assert_eq!((node.screen_x, node.screen_y), first);

        view.draw_version += 1;
        view.draw_lng = 11.0;
        node.compute_position(&view);
        assert_ne!((node.screen_x, node.screen_y), first);
    }

    #[test]
    fn test_clamped_anchor_sits_on_terrain() {
        struct Plateau;
        impl crate::render::view::TerrainModel for Plateau {
            fn elevation(&self, _lat: f64, _lng: f64) -> f64 {
                500.0
            }
        }

        let mut view = MapView::new(0.0, 0.0, 10.0);
        view.terrain = Arc::new(Plateau);

        let mut node = PointNode::new(1, 0);
        node.set_geometry(&Point::with_altitude(0.0, 0.0, 100.0));
        node.set_altitude_mode(AltitudeMode::Absolute);
        node.compute_position(&view);
        // absolute altitude below the surface clamps up to it
        assert_eq!(node.resolved_altitude, 500.0);
    }

    #[test]
    fn test_style_version_bumps_once_for_identical_style() {
        let mut node = PointNode::new(7, 0);
        let style = StyleDescriptor::icon("asset:/m.png");
        node.set_style(&style);
        let v = node.core.version;
        node.set_style(&style);
        assert_eq!(node.core.version, v);
    }

    #[test]
    fn test_default_icon_only_without_label() {
        let mut node = PointNode::new(1, 0);
        assert!(node.wants_default_icon());

        node.set_style(&StyleDescriptor::label("Checkpoint"));
        assert!(!node.wants_default_icon());
        assert!(node.label_text().is_some());

        let mut styled = PointNode::new(2, 0);
        styled.set_style(&StyleDescriptor {
            icon: Some(crate::style::IconStyle {
                uri: "asset:/m.png".into(),
                tint: Color::WHITE,
            }),
            ..Default::default()
        });
        assert!(!styled.wants_default_icon());
        assert!(styled.wants_icon());
    }
}
