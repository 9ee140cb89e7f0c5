//! Zoom and pan transform shared by the node and connection layers.

use crate::constants::{FIT_MAX_SCALE, FIT_PADDING, MAX_ZOOM, MIN_ZOOM};
use crate::geometry::{Point, Rect};
use crate::types::Node;
use serde::{Deserialize, Serialize};

/// Maps map coordinates to viewport coordinates: `screen = world * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    /// Translation in viewport pixels
    pub offset: Point,
    /// Zoom factor, kept within `[MIN_ZOOM, MAX_ZOOM]` by interactive zooming
    pub scale: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewTransform {
    pub const IDENTITY: ViewTransform = ViewTransform {
        offset: Point::ZERO,
        scale: 1.0,
    };

    /// Converts a map position to viewport coordinates.
    pub fn to_screen(&self, world: Point) -> Point {
        world * self.scale + self.offset
    }

    /// Converts a viewport position to map coordinates.
    pub fn to_world(&self, screen: Point) -> Point {
        (screen - self.offset) * (1.0 / self.scale)
    }

    /// Shifts the view by a viewport-space delta.
    pub fn pan(&mut self, delta: Point) {
        self.offset = self.offset + delta;
    }

    /// Multiplies the zoom by `factor`, keeping the map point under `anchor` fixed.
    ///
    /// Returns `true` if the scale actually changed.
    pub fn zoom_about(&mut self, anchor: Point, factor: f32) -> bool {
        let new_scale = (self.scale * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if (new_scale - self.scale).abs() <= f32::EPSILON {
            return false;
        }
        let world = self.to_world(anchor);
        self.scale = new_scale;
        self.offset = anchor - world * new_scale;
        true
    }

    /// Back to the identity transform.
    pub fn reset(&mut self) {
        *self = Self::IDENTITY;
    }
}

/// Bounding box of all nodes, or `None` for an empty scene.
pub fn content_bounds(nodes: &[Node]) -> Option<Rect> {
    let mut iter = nodes.iter().map(Node::bounds);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, r| acc.union(&r)))
}

/// Transform that centers every node in a viewport of the given size.
///
/// The content box is padded by [`FIT_PADDING`] and never magnified beyond [`FIT_MAX_SCALE`].
/// Maps too large to fit at [`MIN_ZOOM`] are centered at that scale instead. An empty scene
/// yields the identity transform.
///
/// # Arguments
///
/// * `nodes` - Nodes to fit
/// * `viewport_width` - Viewport width in pixels
/// * `viewport_height` - Viewport height in pixels
pub fn fit_to_screen(nodes: &[Node], viewport_width: f32, viewport_height: f32) -> ViewTransform {
    let Some(bounds) = content_bounds(nodes) else {
        return ViewTransform::IDENTITY;
    };
    let content = bounds.expand(FIT_PADDING);
    if content.width <= 0.0 || content.height <= 0.0 {
        return ViewTransform::IDENTITY;
    }

    let scale = (viewport_width / content.width)
        .min(viewport_height / content.height)
        .min(FIT_MAX_SCALE)
        .max(MIN_ZOOM);

    let offset = Point::new(
        (viewport_width - content.width * scale) / 2.0 - content.x * scale,
        (viewport_height - content.height * scale) / 2.0 - content.y * scale,
    );
    ViewTransform { offset, scale }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(x: f32, y: f32) -> Node {
        Node::new("n", (x, y))
    }

    #[test]
    fn test_roundtrip_conversion() {
        let view = ViewTransform {
            offset: Point::new(40.0, -12.0),
            scale: 1.5,
        };
        let world = Point::new(100.0, 50.0);
        let back = view.to_world(view.to_screen(world));
        assert!(back.distance(world) < 1e-3);
    }

    #[test]
    fn test_zoom_is_clamped_and_keeps_anchor() {
        let mut view = ViewTransform::default();
        let anchor = Point::new(200.0, 100.0);
        let world_before = view.to_world(anchor);

        assert!(view.zoom_about(anchor, 100.0));
        assert_eq!(view.scale, MAX_ZOOM);
        assert!(view.to_world(anchor).distance(world_before) < 1e-3);

        assert!(!view.zoom_about(anchor, 2.0));
        view.zoom_about(anchor, 0.0001);
        assert_eq!(view.scale, MIN_ZOOM);
    }

    #[test]
    fn test_fit_empty_scene_is_identity() {
        assert_eq!(fit_to_screen(&[], 800.0, 600.0), ViewTransform::IDENTITY);
    }

    #[test]
    fn test_fit_centers_content() {
        let nodes = vec![node(0.0, 0.0), node(850.0, 440.0)];
        // content = (-50,-50) .. (1050, 550) => 1100 x 600
        let view = fit_to_screen(&nodes, 550.0, 600.0);
        assert!((view.scale - 0.5).abs() < 1e-6);

        let center = view.to_screen(Point::new(500.0, 250.0));
        assert!(center.distance(Point::new(275.0, 300.0)) < 1e-3);
    }

    #[test]
    fn test_fit_stays_within_zoom_range() {
        let nodes = vec![node(0.0, 0.0), node(20_000.0, 10_000.0)];
        let mut view = fit_to_screen(&nodes, 800.0, 600.0);
        assert_eq!(view.scale, MIN_ZOOM);

        // content is still centered
        let bounds = content_bounds(&nodes).unwrap();
        assert!(view.to_screen(bounds.center()).distance(Point::new(400.0, 300.0)) < 1e-2);

        let anchor = Point::new(400.0, 300.0);
        assert!(!view.zoom_about(anchor, 1.0 / 1.1));
        assert_eq!(view.scale, MIN_ZOOM);
    }

    #[test]
    fn test_fit_never_magnifies_past_limit() {
        let view = fit_to_screen(&[node(0.0, 0.0)], 4000.0, 4000.0);
        assert_eq!(view.scale, FIT_MAX_SCALE);
    }
}
