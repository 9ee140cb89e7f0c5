//! Backend-independent scene rendering.
//!
//! [`render_scene`] turns a scene into a flat list of [`DrawCommand`]s. The egui canvas and
//! the SVG exporter are thin backends over this list, so both surfaces share one geometry,
//! one text layout and one pattern assignment.

use crate::constants::*;
use crate::geometry::{
    connection_midpoint, connection_path, node_outline, Outline, Point, Rect, Segment,
};
use crate::legend::{build_color_to_pattern_map, pattern_for_color, AccessibilityPattern};
use crate::types::*;
use std::collections::BTreeSet;

/// Which end of a connection a marker decorates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerDirection {
    /// Points back at the source node
    Start,
    /// Points at the target node
    End,
}

/// Identity of an arrowhead definition. Connections with equal keys share one marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerKey {
    pub line_width: u32,
    pub color: String,
    pub direction: MarkerDirection,
}

impl MarkerKey {
    /// Identifier safe to use as an SVG element id.
    pub fn element_id(&self) -> String {
        let color: String = self
            .color
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let dir = match self.direction {
            MarkerDirection::Start => "start",
            MarkerDirection::End => "end",
        };
        format!("arrow-{dir}-{}-{}", self.line_width, color.to_ascii_lowercase())
    }
}

/// Filter applied to a selected bevel or emboss node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeEffect {
    DropShadow,
    InsetShadow,
}

impl NodeEffect {
    pub fn element_id(&self) -> &'static str {
        match self {
            NodeEffect::DropShadow => "bevel-shadow",
            NodeEffect::InsetShadow => "emboss-inset",
        }
    }
}

/// A laid-out, centered block of text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub center: Point,
    pub font_size: f32,
    pub font_family: String,
    pub color: String,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl TextBlock {
    pub fn line_height(&self) -> f32 {
        self.font_size * LINE_HEIGHT_RATIO
    }

    /// Vertical center of each line, top to bottom.
    pub fn line_centers(&self) -> Vec<Point> {
        let lh = self.line_height();
        let first = self.center.y - (self.lines.len().saturating_sub(1)) as f32 * lh / 2.0;
        (0..self.lines.len())
            .map(|i| Point::new(self.center.x, first + i as f32 * lh))
            .collect()
    }
}

/// Everything needed to draw one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDraw {
    pub id: ConnectionId,
    pub segment: Segment,
    pub color: String,
    pub width: f32,
    /// `(on, off)` dash lengths, `None` for solid
    pub dash: Option<(f32, f32)>,
    pub start_marker: Option<MarkerKey>,
    pub end_marker: Option<MarkerKey>,
    pub label: Option<TextBlock>,
    pub selected: bool,
}

/// Everything needed to draw one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDraw {
    pub id: NodeId,
    pub outline: Outline,
    pub fill: Option<String>,
    pub stroke: String,
    pub stroke_width: f32,
    pub effect: Option<NodeEffect>,
    pub pattern: Option<AccessibilityPattern>,
    pub text: TextBlock,
    /// Center of the description indicator, when the node has a description
    pub description_icon: Option<Point>,
    pub resize_handle: Option<Rect>,
    pub selected: bool,
}

/// One primitive of the rendered scene, in map coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Connection(ConnectionDraw),
    /// Dashed line from the connect source to the pointer
    ConnectPreview { from: Point, to: Point },
    Node(NodeDraw),
}

/// Per-frame inputs that are not part of the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    /// Draw editing affordances (selection, resize handle)
    pub editable: bool,
    pub selected_node: Option<NodeId>,
    pub selected_connection: Option<ConnectionId>,
    /// Source node and pointer position of an in-progress connect gesture
    pub connect_preview: Option<(NodeId, Point)>,
    /// Overlay accessibility patterns on node fills
    pub show_patterns: bool,
}

impl RenderOptions {
    /// Options for a static or read-only rendering.
    pub fn read_only(show_patterns: bool) -> Self {
        Self {
            show_patterns,
            ..Default::default()
        }
    }
}

/// Result of rendering a scene: the commands plus the shared definitions they use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedScene {
    pub commands: Vec<DrawCommand>,
    /// Distinct arrowhead definitions, in a stable order
    pub markers: BTreeSet<MarkerKey>,
    pub patterns: Vec<AccessibilityPattern>,
    pub effects: BTreeSet<NodeEffect>,
}

/// Renders a scene to draw commands: connections first, then the connect preview, then nodes
/// in z-order.
///
/// Connections whose endpoints are missing are skipped.
///
/// # Arguments
///
/// * `scene` - The scene to draw
/// * `options` - Selection and editing state for this frame
pub fn render_scene(scene: &Scene, options: &RenderOptions) -> RenderedScene {
    let mut out = RenderedScene::default();

    for connection in &scene.connections {
        let source = scene.node(connection.source_node_id);
        let target = scene.node(connection.target_node_id);
        let Some(segment) = connection_path(connection, source, target) else {
            continue;
        };
        let draw = connection_draw(connection, segment, source, target, options);
        out.markers.extend(draw.start_marker.iter().cloned());
        out.markers.extend(draw.end_marker.iter().cloned());
        out.commands.push(DrawCommand::Connection(draw));
    }

    if let Some((source_id, pointer)) = options.connect_preview {
        if let Some(source) = scene.node(source_id) {
            out.commands.push(DrawCommand::ConnectPreview {
                from: source.center(),
                to: pointer,
            });
        }
    }

    let pattern_map = options
        .show_patterns
        .then(|| build_color_to_pattern_map(&scene.nodes));

    for node in &scene.nodes {
        let pattern = pattern_map
            .as_ref()
            .and_then(|map| pattern_for_color(&node.background_color, map));
        let draw = node_draw(node, pattern, options);
        if let Some(p) = draw.pattern {
            if !out.patterns.contains(&p) {
                out.patterns.push(p);
            }
        }
        out.effects.extend(draw.effect);
        out.commands.push(DrawCommand::Node(draw));
    }

    out
}

fn connection_draw(
    connection: &Connection,
    segment: Segment,
    source: Option<&Node>,
    target: Option<&Node>,
    options: &RenderOptions,
) -> ConnectionDraw {
    let marker = |direction| MarkerKey {
        line_width: connection.line_width,
        color: connection.line_color.clone(),
        direction,
    };
    let (start_marker, end_marker) = match connection.arrow_type {
        ArrowType::None => (None, None),
        ArrowType::End => (None, Some(marker(MarkerDirection::End))),
        ArrowType::Both => (
            Some(marker(MarkerDirection::Start)),
            Some(marker(MarkerDirection::End)),
        ),
    };

    let label = match (connection.visible_label(), source, target) {
        (Some(text), Some(s), Some(t)) => Some(TextBlock {
            lines: vec![text.to_string()],
            center: connection_midpoint(s, t),
            font_size: DEFAULT_FONT_SIZE as f32 - 2.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            color: connection.line_color.clone(),
            bold: false,
            italic: false,
            underline: false,
        }),
        _ => None,
    };

    ConnectionDraw {
        id: connection.id,
        segment,
        color: connection.line_color.clone(),
        width: connection.line_width as f32,
        dash: connection.line_style.dash_array(),
        start_marker,
        end_marker,
        label,
        selected: options.editable && options.selected_connection == Some(connection.id),
    }
}

fn node_draw(node: &Node, pattern: Option<AccessibilityPattern>, options: &RenderOptions) -> NodeDraw {
    let selected = options.editable && options.selected_node == Some(node.id);

    let (fill, stroke) = match node.node_style {
        NodeStyle::Outline => (None, node.background_color.clone()),
        _ => (
            Some(node.background_color.clone()),
            node.border_color.clone(),
        ),
    };
    let effect = match node.node_style {
        NodeStyle::Bevel if selected => Some(NodeEffect::DropShadow),
        NodeStyle::Emboss if selected => Some(NodeEffect::InsetShadow),
        _ => None,
    };

    let description_icon = node
        .description_text()
        .map(|_| description_icon_center(node));

    let resize_handle = selected.then(|| resize_handle_rect(node));

    NodeDraw {
        id: node.id,
        outline: node_outline(node),
        fill,
        stroke,
        stroke_width: if selected { 3.0 } else { 2.0 },
        effect,
        // an outline-style node has no fill to hatch
        pattern: pattern.filter(|_| node.node_style != NodeStyle::Outline),
        text: node_label(node),
        description_icon,
        resize_handle,
        selected,
    }
}

/// Center of the description indicator near the node's top-right corner.
pub fn description_icon_center(node: &Node) -> Point {
    Point::new(
        node.x + node.width - DESCRIPTION_ICON_INSET,
        node.y + DESCRIPTION_ICON_INSET,
    )
}

/// Square resize handle inside the node's bottom-right corner.
pub fn resize_handle_rect(node: &Node) -> Rect {
    Rect::from_min_size(
        Point::new(
            node.x + node.width - RESIZE_HANDLE_SIZE,
            node.y + node.height - RESIZE_HANDLE_SIZE,
        ),
        RESIZE_HANDLE_SIZE,
        RESIZE_HANDLE_SIZE,
    )
}

/// Fraction of the bounding box width usable for text inside each shape.
fn text_width_factor(shape: NodeShape) -> f32 {
    match shape {
        NodeShape::Rectangle | NodeShape::RoundedRectangle => 1.0,
        NodeShape::Ellipse => 0.75,
        NodeShape::Diamond => 0.6,
    }
}

/// Lays out a node's label inside its shape.
pub fn node_label(node: &Node) -> TextBlock {
    let font_size = node.font_size.max(1) as f32;
    let glyph = font_size * GLYPH_WIDTH_RATIO * if node.font_bold { 1.1 } else { 1.0 };
    let available = (node.width * text_width_factor(node.shape) - 2.0 * LABEL_PADDING).max(glyph);
    let max_chars = ((available / glyph).floor() as usize).max(1);
    let max_lines = ((node.height - LABEL_PADDING) / (font_size * LINE_HEIGHT_RATIO))
        .floor()
        .max(1.0) as usize;

    let lines = if node.wrap_text {
        wrap_text(&node.label, max_chars, max_lines)
    } else {
        vec![truncate_with_ellipsis(&node.label, max_chars)]
    };

    TextBlock {
        lines,
        center: node.center(),
        font_size,
        font_family: node.font_family.clone(),
        color: node.text_color.clone(),
        bold: node.font_bold,
        italic: node.font_italic,
        underline: node.font_underline,
    }
}

/// Shortens `text` to `max_chars` characters, ending in an ellipsis when cut.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

/// Greedy word wrap to at most `max_lines` lines of `max_chars` characters.
///
/// Words longer than a line are broken. Overflowing text is cut with an ellipsis on the last
/// line.
pub fn wrap_text(text: &str, max_chars: usize, max_lines: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        loop {
            let current_len = current.chars().count();
            let needed = if current.is_empty() {
                word.len()
            } else {
                current_len + 1 + word.len()
            };
            if needed <= max_chars {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.extend(word.iter());
                break;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                continue;
            }
            // word alone is too long: hard break it
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }

    if lines.len() > max_lines {
        let overflow = lines.split_off(max_lines);
        if let Some(last) = lines.last_mut() {
            let joined = format!("{last} {}", overflow.join(" "));
            *last = truncate_with_ellipsis(&joined, max_chars);
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene_with_two_nodes() -> (Scene, NodeId, NodeId) {
        let mut scene = Scene::new("Map");
        let a = Node::new("A", (100.0, 200.0));
        let b = Node::new("B", (400.0, 200.0));
        let (ida, idb) = (a.id, b.id);
        scene.nodes.push(a);
        scene.nodes.push(b);
        (scene, ida, idb)
    }

    fn commands_of(rendered: &RenderedScene) -> Vec<&'static str> {
        rendered
            .commands
            .iter()
            .map(|c| match c {
                DrawCommand::Connection(_) => "connection",
                DrawCommand::ConnectPreview { .. } => "preview",
                DrawCommand::Node(_) => "node",
            })
            .collect()
    }

    #[test]
    fn test_connections_drawn_before_nodes() {
        let (mut scene, a, b) = scene_with_two_nodes();
        scene.connections.push(Connection::new(a, b));
        let options = RenderOptions {
            editable: true,
            connect_preview: Some((a, Point::new(0.0, 0.0))),
            ..Default::default()
        };
        let rendered = render_scene(&scene, &options);
        assert_eq!(
            commands_of(&rendered),
            vec!["connection", "preview", "node", "node"]
        );
    }

    #[test]
    fn test_dangling_connection_is_skipped() {
        let (mut scene, a, _) = scene_with_two_nodes();
        scene.connections.push(Connection::new(a, uuid::Uuid::new_v4()));
        let rendered = render_scene(&scene, &RenderOptions::default());
        assert_eq!(commands_of(&rendered), vec!["node", "node"]);
    }

    #[test]
    fn test_identical_arrows_share_one_marker() {
        let (mut scene, a, b) = scene_with_two_nodes();
        scene.connections.push(Connection::new(a, b));
        scene.connections.push(Connection::new(b, a));
        let mut both = Connection::new(a, b);
        both.arrow_type = ArrowType::Both;
        scene.connections.push(both);
        let mut none = Connection::new(a, b);
        none.arrow_type = ArrowType::None;
        none.line_width = 9;
        scene.connections.push(none);

        let rendered = render_scene(&scene, &RenderOptions::default());
        assert_eq!(rendered.markers.len(), 2);
        let ids: Vec<_> = rendered.markers.iter().map(MarkerKey::element_id).collect();
        assert_eq!(ids, vec!["arrow-start-4-6b7280", "arrow-end-4-6b7280"]);
    }

    #[test]
    fn test_dash_patterns() {
        assert_eq!(LineStyle::Solid.dash_array(), None);
        assert_eq!(LineStyle::Dashed.dash_array(), Some((8.0, 4.0)));
        assert_eq!(LineStyle::Dotted.dash_array(), Some((2.0, 2.0)));
    }

    #[test]
    fn test_label_only_when_shown_and_present() {
        let (mut scene, a, b) = scene_with_two_nodes();
        let mut conn = Connection::new(a, b);
        conn.label = Some("cites".into());
        scene.connections.push(conn.clone());
        conn.show_label = true;
        scene.connections.push(conn);

        let rendered = render_scene(&scene, &RenderOptions::default());
        let labels: Vec<_> = rendered
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Connection(d) => Some(d.label.clone()),
                _ => None,
            })
            .collect();
        assert!(labels[0].is_none());
        let label = labels[1].as_ref().unwrap();
        assert_eq!(label.lines, vec!["cites"]);
        assert_eq!(label.center, Point::new(325.0, 220.0));
    }

    #[test]
    fn test_node_style_composition() {
        let mut node = Node::new("n", (0.0, 0.0));
        node.node_style = NodeStyle::Outline;
        let draw = node_draw(&node, Some(AccessibilityPattern::Dots), &RenderOptions::default());
        assert_eq!(draw.fill, None);
        assert_eq!(draw.stroke, "#3B82F6");
        assert_eq!(draw.pattern, None);

        node.node_style = NodeStyle::Bevel;
        let idle = node_draw(&node, None, &RenderOptions::default());
        assert_eq!(idle.fill.as_deref(), Some("#3B82F6"));
        assert_eq!(idle.stroke, "#1E40AF");
        assert_eq!(idle.effect, None);

        let selected = RenderOptions {
            editable: true,
            selected_node: Some(node.id),
            ..Default::default()
        };
        let draw = node_draw(&node, None, &selected);
        assert_eq!(draw.effect, Some(NodeEffect::DropShadow));
        assert!(draw.resize_handle.is_some());

        node.node_style = NodeStyle::Emboss;
        assert_eq!(
            node_draw(&node, None, &selected).effect,
            Some(NodeEffect::InsetShadow)
        );
    }

    #[test]
    fn test_read_only_has_no_affordances() {
        let (scene, a, _) = scene_with_two_nodes();
        let options = RenderOptions {
            editable: false,
            selected_node: Some(a),
            ..Default::default()
        };
        let rendered = render_scene(&scene, &options);
        assert_eq!(rendered, render_scene(&scene, &RenderOptions::read_only(false)));
    }

    #[test]
    fn test_description_icon_only_with_text() {
        let mut node = Node::new("n", (0.0, 0.0));
        assert!(node_draw(&node, None, &RenderOptions::default())
            .description_icon
            .is_none());
        node.description = Some("Longer notes".into());
        let icon = node_draw(&node, None, &RenderOptions::default()).description_icon;
        assert_eq!(icon, Some(Point::new(140.0, 10.0)));
    }

    #[test]
    fn test_patterns_follow_frequency() {
        let (mut scene, _, _) = scene_with_two_nodes();
        scene.nodes[1].background_color = "#FF0000".into();
        scene.nodes.push(Node::new("C", (0.0, 0.0)));

        let rendered = render_scene(&scene, &RenderOptions::read_only(true));
        assert_eq!(
            rendered.patterns,
            vec![AccessibilityPattern::Stripes, AccessibilityPattern::Dots]
        );
        let off = render_scene(&scene, &RenderOptions::read_only(false));
        assert!(off.patterns.is_empty());
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(wrap_text("one two three", 7, 5), vec!["one two", "three"]);
        assert_eq!(wrap_text("abcdefghij", 4, 5), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap_text("", 4, 2), vec![""]);
        assert_eq!(wrap_text("aa bb cc dd", 5, 1), vec!["aa b…"]);
    }

    #[test]
    fn test_no_wrap_clips_with_ellipsis() {
        let mut node = Node::new("A fairly long label for a node", (0.0, 0.0));
        node.wrap_text = false;
        let block = node_label(&node);
        assert_eq!(block.lines.len(), 1);
        assert!(block.lines[0].ends_with('…'));
        // 150 - 16 = 134 px at 7.7 px per glyph
        assert_eq!(block.lines[0].chars().count(), 17);
    }

    #[test]
    fn test_line_centers_are_symmetric() {
        let mut node = Node::new("alpha beta gamma delta epsilon zeta", (0.0, 0.0));
        node.height = 100.0;
        let block = node_label(&node);
        let centers = block.line_centers();
        let mean = centers.iter().map(|p| p.y).sum::<f32>() / centers.len() as f32;
        assert!((mean - node.center().y).abs() < 1e-3);
    }
}
