//! Geometry kernel shared by the interactive canvas and the static export.
//!
//! Everything here is a pure function of node geometry: shape outlines in node-local
//! coordinates, the point where a ray from a node's center leaves its outline, and the
//! straight segment a connection occupies between two nodes.

use crate::constants::{
    ARROW_HALF_WIDTH_PER_WIDTH, ARROW_LENGTH_PER_WIDTH, CONNECTION_LABEL_LIFT, MAX_CORNER_RADIUS,
};
use crate::types::{Connection, Node, NodeShape};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt::Write;
use std::ops::{Add, Mul, Sub};

/// A point (or vector) in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean length when treated as a vector.
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Point) -> f32 {
        (self - other).length()
    }

    /// Angle of the vector from `self` to `other`, in radians.
    pub fn angle_to(self, other: Point) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point {
    type Output = Point;
    fn mul(self, rhs: f32) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned rectangle described by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn from_min_size(min: Point, width: f32, height: f32) -> Self {
        Self {
            x: min.x,
            y: min.y,
            width,
            height,
        }
    }

    pub fn min(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn max(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        let min = Point::new(self.x.min(other.x), self.y.min(other.y));
        let max = Point::new(
            (self.x + self.width).max(other.x + other.width),
            (self.y + self.height).max(other.y + other.height),
        );
        Rect::from_min_size(min, max.x - min.x, max.y - min.y)
    }

    /// Grows the rectangle by `amount` on every side.
    pub fn expand(&self, amount: f32) -> Rect {
        Rect {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + 2.0 * amount,
            height: self.height + 2.0 * amount,
        }
    }

    /// Moves the rectangle by `delta`.
    pub fn translate(&self, delta: Point) -> Rect {
        Rect {
            x: self.x + delta.x,
            y: self.y + delta.y,
            ..*self
        }
    }
}

/// Closed outline of a node shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outline {
    Rect(Rect),
    RoundedRect { rect: Rect, radius: f32 },
    Ellipse { center: Point, rx: f32, ry: f32 },
    /// Vertices in order top, right, bottom, left
    Diamond([Point; 4]),
}

/// Returns the outline of `shape` in node-local coordinates (origin at the node's top-left).
pub fn shape_outline(shape: NodeShape, width: f32, height: f32) -> Outline {
    let rect = Rect::from_min_size(Point::ZERO, width, height);
    match shape {
        NodeShape::Rectangle => Outline::Rect(rect),
        NodeShape::RoundedRectangle => Outline::RoundedRect {
            rect,
            radius: corner_radius(width, height),
        },
        NodeShape::Ellipse => Outline::Ellipse {
            center: rect.center(),
            rx: width / 2.0,
            ry: height / 2.0,
        },
        NodeShape::Diamond => Outline::Diamond([
            Point::new(width / 2.0, 0.0),
            Point::new(width, height / 2.0),
            Point::new(width / 2.0, height),
            Point::new(0.0, height / 2.0),
        ]),
    }
}

/// Outline of a node placed at its position in map coordinates.
pub fn node_outline(node: &Node) -> Outline {
    shape_outline(node.shape, node.width, node.height).translate(node.origin())
}

/// Corner radius used for rounded rectangles.
pub fn corner_radius(width: f32, height: f32) -> f32 {
    MAX_CORNER_RADIUS.min(width / 4.0).min(height / 4.0)
}

impl Outline {
    /// Moves the outline by `delta`.
    pub fn translate(self, delta: Point) -> Outline {
        match self {
            Outline::Rect(rect) => Outline::Rect(rect.translate(delta)),
            Outline::RoundedRect { rect, radius } => Outline::RoundedRect {
                rect: rect.translate(delta),
                radius,
            },
            Outline::Ellipse { center, rx, ry } => Outline::Ellipse {
                center: center + delta,
                rx,
                ry,
            },
            Outline::Diamond(points) => Outline::Diamond(points.map(|p| p + delta)),
        }
    }

    /// Axis-aligned bounding box of the outline.
    pub fn bounding_box(&self) -> Rect {
        match self {
            Outline::Rect(rect) | Outline::RoundedRect { rect, .. } => *rect,
            Outline::Ellipse { center, rx, ry } => Rect::from_min_size(
                Point::new(center.x - rx, center.y - ry),
                2.0 * rx,
                2.0 * ry,
            ),
            Outline::Diamond(points) => {
                let first = Rect::from_min_size(points[0], 0.0, 0.0);
                points[1..].iter().fold(first, |acc, p| {
                    acc.union(&Rect::from_min_size(*p, 0.0, 0.0))
                })
            }
        }
    }

    /// Whether `p` lies inside (or on) the outline.
    pub fn contains(&self, p: Point) -> bool {
        match self {
            Outline::Rect(rect) | Outline::RoundedRect { rect, .. } => rect.contains(p),
            Outline::Ellipse { center, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return false;
                }
                let dx = (p.x - center.x) / rx;
                let dy = (p.y - center.y) / ry;
                dx * dx + dy * dy <= 1.0
            }
            Outline::Diamond(points) => {
                let center = Point::new(points[0].x, points[1].y);
                let w = points[1].x - center.x;
                let h = points[2].y - center.y;
                if w <= 0.0 || h <= 0.0 {
                    return false;
                }
                (p.x - center.x).abs() / w + (p.y - center.y).abs() / h <= 1.0
            }
        }
    }

    /// SVG path data for the outline.
    pub fn to_svg_path(&self) -> String {
        let mut d = String::new();
        match self {
            Outline::Rect(r) => {
                let _ = write!(
                    d,
                    "M{} {} H{} V{} H{} Z",
                    fmt_num(r.x),
                    fmt_num(r.y),
                    fmt_num(r.x + r.width),
                    fmt_num(r.y + r.height),
                    fmt_num(r.x)
                );
            }
            Outline::RoundedRect { rect: r, radius } => {
                let (x0, y0) = (r.x, r.y);
                let (x1, y1) = (r.x + r.width, r.y + r.height);
                let k = *radius;
                let _ = write!(
                    d,
                    "M{} {} H{} A{k} {k} 0 0 1 {} {} V{} A{k} {k} 0 0 1 {} {} H{} A{k} {k} 0 0 1 {} {} V{} A{k} {k} 0 0 1 {} {} Z",
                    fmt_num(x0 + k),
                    fmt_num(y0),
                    fmt_num(x1 - k),
                    fmt_num(x1),
                    fmt_num(y0 + k),
                    fmt_num(y1 - k),
                    fmt_num(x1 - k),
                    fmt_num(y1),
                    fmt_num(x0 + k),
                    fmt_num(x0),
                    fmt_num(y1 - k),
                    fmt_num(y0 + k),
                    fmt_num(x0 + k),
                    fmt_num(y0),
                    k = fmt_num(k)
                );
            }
            Outline::Ellipse { center, rx, ry } => {
                let _ = write!(
                    d,
                    "M{} {} A{rx} {ry} 0 1 0 {} {} A{rx} {ry} 0 1 0 {} {} Z",
                    fmt_num(center.x - rx),
                    fmt_num(center.y),
                    fmt_num(center.x + rx),
                    fmt_num(center.y),
                    fmt_num(center.x - rx),
                    fmt_num(center.y),
                    rx = fmt_num(*rx),
                    ry = fmt_num(*ry)
                );
            }
            Outline::Diamond(points) => {
                for (i, p) in points.iter().enumerate() {
                    let cmd = if i == 0 { 'M' } else { 'L' };
                    let _ = write!(d, "{cmd}{} {} ", fmt_num(p.x), fmt_num(p.y));
                }
                d.push('Z');
            }
        }
        d
    }

    /// Polygonal approximation of the outline, used where only straight segments can be drawn.
    ///
    /// Corner arcs and ellipses are sampled with `segments` steps per full turn.
    pub fn polyline(&self, segments: usize) -> Vec<Point> {
        let segments = segments.max(8);
        match self {
            Outline::Rect(r) => vec![
                r.min(),
                Point::new(r.x + r.width, r.y),
                r.max(),
                Point::new(r.x, r.y + r.height),
            ],
            Outline::RoundedRect { rect: r, radius } => {
                let per_corner = (segments / 4).max(2);
                let corners = [
                    (Point::new(r.x + r.width - radius, r.y + radius), -PI / 2.0),
                    (Point::new(r.x + r.width - radius, r.y + r.height - radius), 0.0),
                    (Point::new(r.x + radius, r.y + r.height - radius), PI / 2.0),
                    (Point::new(r.x + radius, r.y + radius), PI),
                ];
                let mut points = Vec::with_capacity(per_corner * 4 + 4);
                for (c, start) in corners {
                    for i in 0..=per_corner {
                        let a = start + (PI / 2.0) * (i as f32 / per_corner as f32);
                        points.push(Point::new(c.x + radius * a.cos(), c.y + radius * a.sin()));
                    }
                }
                points
            }
            Outline::Ellipse { center, rx, ry } => (0..segments)
                .map(|i| {
                    let a = 2.0 * PI * i as f32 / segments as f32;
                    Point::new(center.x + rx * a.cos(), center.y + ry * a.sin())
                })
                .collect(),
            Outline::Diamond(points) => points.to_vec(),
        }
    }
}

/// Point where a ray from the node's center at `angle` leaves the node's outline.
///
/// Rounded rectangles use the plain box rule; their corner arcs are ignored.
///
/// # Arguments
///
/// * `node` - Node whose position, size and shape define the outline
/// * `angle` - Ray direction in radians, measured from the positive x axis (y down)
///
/// # Returns
///
/// The exit point in map coordinates
pub fn edge_point(node: &Node, angle: f32) -> Point {
    let c = node.center();
    let w = node.width / 2.0;
    let h = node.height / 2.0;
    let (sin, cos) = angle.sin_cos();

    match node.shape {
        NodeShape::Ellipse => Point::new(c.x + w * cos, c.y + h * sin),
        NodeShape::Diamond => {
            let denom = cos.abs() * h + sin.abs() * w;
            if denom <= f32::EPSILON {
                return c;
            }
            let t = w * h / denom;
            Point::new(c.x + t * cos, c.y + t * sin)
        }
        NodeShape::Rectangle | NodeShape::RoundedRectangle => {
            if cos.abs() * h > sin.abs() * w {
                let sign = cos.signum();
                Point::new(c.x + sign * w, c.y + sign * w * (sin / cos))
            } else {
                if sin.abs() <= f32::EPSILON {
                    return c;
                }
                let sign = sin.signum();
                Point::new(c.x + sign * h * (cos / sin), c.y + sign * h)
            }
        }
    }
}

/// Projects `point` onto the node's outline along the ray from the node's center through it.
pub fn clamp_to_edge(node: &Node, point: Point) -> Point {
    edge_point(node, node.center().angle_to(point))
}

/// A straight connector between two edge points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    /// Direction from start to end, in radians.
    pub fn angle(&self) -> f32 {
        self.start.angle_to(self.end)
    }

    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

/// Computes the segment a connection occupies.
///
/// The target attachment (if any) is resolved first and fixes the source-side ray, then a
/// source attachment (if any) overrides the source endpoint. Returns `None` when either node
/// is missing.
///
/// # Arguments
///
/// * `connection` - Connection carrying the optional attachment offsets
/// * `source` - The node referenced by `source_node_id`, if it exists
/// * `target` - The node referenced by `target_node_id`, if it exists
pub fn connection_path(
    connection: &Connection,
    source: Option<&Node>,
    target: Option<&Node>,
) -> Option<Segment> {
    let (source, target) = (source?, target?);
    let source_center = source.center();

    let (mut start, end) = match connection.target_attach() {
        Some(offset) => {
            let target_point = target.origin() + offset;
            let angle = source_center.angle_to(target_point);
            (
                edge_point(source, angle),
                clamp_to_edge(target, target_point),
            )
        }
        None => {
            let angle = source_center.angle_to(target.center());
            (edge_point(source, angle), edge_point(target, angle + PI))
        }
    };

    if let Some(offset) = connection.source_attach() {
        start = clamp_to_edge(source, source.origin() + offset);
    }

    Some(Segment { start, end })
}

/// Anchor for a connection label: the mean of both node centers, lifted by a fixed amount.
pub fn connection_midpoint(source: &Node, target: &Node) -> Point {
    let a = source.center();
    let b = target.center();
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0 - CONNECTION_LABEL_LIFT)
}

/// Arrowhead triangle whose tip sits at `tip`, pointing along `angle`.
///
/// The size scales with the line width so thicker connections get larger heads.
pub fn arrowhead(tip: Point, angle: f32, line_width: f32) -> [Point; 3] {
    let length = ARROW_LENGTH_PER_WIDTH * line_width;
    let half = ARROW_HALF_WIDTH_PER_WIDTH * line_width;
    let (sin, cos) = angle.sin_cos();
    let base = Point::new(tip.x - length * cos, tip.y - length * sin);
    let normal = Point::new(-sin, cos);
    [tip, base + normal * half, base - normal * half]
}

/// Shortest distance from `p` to the segment `a`–`b`.
pub fn point_to_segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let ab = b - a;
    let len_sq = ab.x * ab.x + ab.y * ab.y;
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * ab.x + (p.y - a.y) * ab.y) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Formats a coordinate compactly for SVG output: at most two decimals, no trailing zeros.
pub fn fmt_num(v: f32) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    let s = format!("{rounded:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f32 = 1e-3;

    fn node_at(x: f32, y: f32, w: f32, h: f32, shape: NodeShape) -> Node {
        let mut node = Node::new("n", (x, y));
        node.width = w;
        node.height = h;
        node.shape = shape;
        node
    }

    fn assert_close(a: Point, b: Point) {
        assert!(a.distance(b) < EPS, "{a:?} != {b:?}");
    }

    /// Normalised boundary measure: 1.0 exactly on the outline.
    fn boundary_measure(node: &Node, p: Point) -> f32 {
        let c = node.center();
        let dx = (p.x - c.x) / (node.width / 2.0);
        let dy = (p.y - c.y) / (node.height / 2.0);
        match node.shape {
            NodeShape::Ellipse => (dx * dx + dy * dy).sqrt(),
            NodeShape::Diamond => dx.abs() + dy.abs(),
            _ => dx.abs().max(dy.abs()),
        }
    }

    fn any_shape() -> impl Strategy<Value = NodeShape> {
        prop::sample::select(NodeShape::ALL.to_vec())
    }

    #[test]
    fn test_horizontal_connection_between_aligned_rectangles() {
        let a = node_at(100.0, 200.0, 150.0, 60.0, NodeShape::Rectangle);
        let b = node_at(400.0, 200.0, 150.0, 60.0, NodeShape::Rectangle);
        let conn = Connection::new(a.id, b.id);

        let seg = connection_path(&conn, Some(&a), Some(&b)).unwrap();
        assert_close(seg.start, Point::new(250.0, 230.0));
        assert_close(seg.end, Point::new(400.0, 230.0));
    }

    #[test]
    fn test_missing_node_yields_no_path() {
        let a = node_at(0.0, 0.0, 150.0, 60.0, NodeShape::Rectangle);
        let conn = Connection::new(a.id, uuid::Uuid::new_v4());
        assert!(connection_path(&conn, Some(&a), None).is_none());
        assert!(connection_path(&conn, None, Some(&a)).is_none());
    }

    #[test]
    fn test_rounded_corner_radius_is_capped() {
        assert_eq!(corner_radius(150.0, 60.0), 15.0);
        assert_eq!(corner_radius(400.0, 200.0), 16.0);
        assert_eq!(corner_radius(50.0, 30.0), 7.5);
    }

    #[test]
    fn test_vertical_edge_point() {
        let n = node_at(0.0, 0.0, 100.0, 40.0, NodeShape::Rectangle);
        assert_close(edge_point(&n, PI / 2.0), Point::new(50.0, 40.0));
        assert_close(edge_point(&n, -PI / 2.0), Point::new(50.0, 0.0));
    }

    #[test]
    fn test_source_attachment_overrides_source_endpoint() {
        let a = node_at(0.0, 0.0, 100.0, 100.0, NodeShape::Rectangle);
        let b = node_at(300.0, 0.0, 100.0, 100.0, NodeShape::Rectangle);
        let mut conn = Connection::new(a.id, b.id);
        conn.source_attach_x = Some(50.0);
        conn.source_attach_y = Some(100.0);

        let seg = connection_path(&conn, Some(&a), Some(&b)).unwrap();
        assert_close(seg.start, Point::new(50.0, 100.0));
        assert_close(seg.end, Point::new(300.0, 50.0));
    }

    #[test]
    fn test_midpoint_uses_centers_not_edges() {
        let a = node_at(0.0, 0.0, 100.0, 100.0, NodeShape::Rectangle);
        let b = node_at(200.0, 100.0, 100.0, 100.0, NodeShape::Ellipse);
        assert_close(connection_midpoint(&a, &b), Point::new(150.0, 90.0));
    }

    #[test]
    fn test_arrowhead_scales_with_width() {
        let [tip, left, right] = arrowhead(Point::new(10.0, 0.0), 0.0, 2.0);
        assert_close(tip, Point::new(10.0, 0.0));
        assert_close(left, Point::new(4.0, 3.0));
        assert_close(right, Point::new(4.0, -3.0));
    }

    #[test]
    fn test_point_to_segment_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!((point_to_segment_distance(Point::new(5.0, 3.0), a, b) - 3.0).abs() < EPS);
        assert!((point_to_segment_distance(Point::new(-4.0, 3.0), a, b) - 5.0).abs() < EPS);
        assert!((point_to_segment_distance(Point::new(1.0, 1.0), a, a) - 2f32.sqrt()).abs() < EPS);
    }

    #[test]
    fn test_svg_path_formatting() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(2.5), "2.5");
        assert_eq!(fmt_num(-0.001), "0");
        let d = shape_outline(NodeShape::Rectangle, 10.0, 20.0).to_svg_path();
        assert_eq!(d, "M0 0 H10 V20 H0 Z");
    }

    proptest! {
        #[test]
        fn prop_outline_bounding_box_matches_size(
            shape in any_shape(),
            w in 50.0f32..800.0,
            h in 30.0f32..600.0,
        ) {
            let bb = shape_outline(shape, w, h).bounding_box();
            prop_assert!(bb.x.abs() < EPS && bb.y.abs() < EPS);
            prop_assert!((bb.width - w).abs() < EPS);
            prop_assert!((bb.height - h).abs() < EPS);
        }

        #[test]
        fn prop_edge_point_lies_on_outline(
            shape in any_shape(),
            x in -500.0f32..500.0,
            y in -500.0f32..500.0,
            w in 50.0f32..400.0,
            h in 30.0f32..300.0,
            theta in 0.0f32..(2.0 * PI),
        ) {
            let node = node_at(x, y, w, h, shape);
            let p = edge_point(&node, theta);
            prop_assert!((boundary_measure(&node, p) - 1.0).abs() < 1e-3);
        }

        #[test]
        fn prop_target_attachment_fixes_source_ray(
            tx in 300.0f32..600.0,
            ty in -200.0f32..200.0,
            ax in 0.0f32..150.0,
            ay in 0.0f32..60.0,
        ) {
            let a = node_at(0.0, 0.0, 150.0, 60.0, NodeShape::Rectangle);
            let b = node_at(tx, ty, 150.0, 60.0, NodeShape::Diamond);
            let mut conn = Connection::new(a.id, b.id);
            conn.target_attach_x = Some(ax);
            conn.target_attach_y = Some(ay);

            let seg = connection_path(&conn, Some(&a), Some(&b)).unwrap();
            let target_point = b.origin() + Point::new(ax, ay);
            let expected_start = edge_point(&a, a.center().angle_to(target_point));
            prop_assert!(seg.start.distance(expected_start) < EPS);
            prop_assert!((boundary_measure(&b, seg.end) - 1.0).abs() < 1e-3);
        }
    }
}
