//! SVG backend for [`RenderedScene`].
//!
//! Used three ways: as the standalone `map.svg` of a static export, as the drawing inside the
//! exported `index.html`, and as the source document for PNG rasterization.

use super::escape_xml;
use crate::constants::{
    ARROW_HALF_WIDTH_PER_WIDTH, ARROW_LENGTH_PER_WIDTH, DESCRIPTION_ICON_RADIUS, FIT_PADDING,
    PATTERN_TILE,
};
use crate::geometry::{fmt_num, Point, Rect};
use crate::legend::{AccessibilityPattern, PatternMark};
use crate::render::{
    ConnectionDraw, DrawCommand, MarkerDirection, MarkerKey, NodeDraw, NodeEffect, RenderedScene,
    TextBlock,
};
use crate::view::content_bounds;
use crate::types::Scene;
use std::fmt::Write;

/// Stroke colour of pattern marks.
const PATTERN_INK: &str = "#000000";
const PATTERN_OPACITY: f32 = 0.35;

/// A finished SVG document.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgDocument {
    pub svg: String,
    pub width: u32,
    pub height: u32,
}

/// Options for a standalone SVG document.
#[derive(Debug, Clone, PartialEq)]
pub struct SvgOptions {
    /// Empty space around the content, in map units
    pub margin: f32,
    /// Solid background colour; transparent when `None`
    pub background: Option<String>,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            margin: FIT_PADDING,
            background: Some("#FFFFFF".to_string()),
        }
    }
}

/// Builds a standalone SVG whose view box tightly frames every node.
///
/// # Arguments
///
/// * `scene` - Scene the commands were rendered from (used for bounds)
/// * `rendered` - Output of `render_scene`
/// * `options` - Margin and background
///
/// # Returns
///
/// The document along with its pixel size at scale 1
pub fn build_svg(scene: &Scene, rendered: &RenderedScene, options: &SvgOptions) -> SvgDocument {
    let bounds = content_bounds(&scene.nodes)
        .unwrap_or_else(|| Rect::from_min_size(Point::ZERO, 0.0, 0.0))
        .expand(options.margin.max(0.0));
    let width = bounds.width.ceil().max(1.0) as u32;
    let height = bounds.height.ceil().max(1.0) as u32;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"{} {} {width} {height}\">",
        fmt_num(bounds.x),
        fmt_num(bounds.y),
    );
    write_defs(&mut out, rendered);
    if let Some(bg) = &options.background {
        let _ = writeln!(
            out,
            "<rect x=\"{}\" y=\"{}\" width=\"{width}\" height=\"{height}\" fill=\"{}\" />",
            fmt_num(bounds.x),
            fmt_num(bounds.y),
            escape_xml(bg)
        );
    }
    write_commands(&mut out, rendered);
    let _ = writeln!(out, "</svg>");

    SvgDocument {
        svg: out,
        width,
        height,
    }
}

/// Writes the `<defs>` block: arrow markers, accessibility patterns and node filters.
pub fn write_defs(out: &mut String, rendered: &RenderedScene) {
    let _ = writeln!(out, "<defs>");
    for marker in &rendered.markers {
        write_marker(out, marker);
    }
    for pattern in &rendered.patterns {
        write_pattern(out, *pattern);
    }
    for effect in &rendered.effects {
        write_filter(out, *effect);
    }
    let _ = writeln!(out, "</defs>");
}

/// Writes every draw command in order.
pub fn write_commands(out: &mut String, rendered: &RenderedScene) {
    let _ = writeln!(out, "<g class=\"connections\">");
    for command in &rendered.commands {
        match command {
            DrawCommand::Connection(c) => write_connection(out, c),
            DrawCommand::ConnectPreview { from, to } => {
                let _ = writeln!(
                    out,
                    "  <line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"#6B7280\" stroke-width=\"2\" stroke-dasharray=\"6 4\" />",
                    fmt_num(from.x),
                    fmt_num(from.y),
                    fmt_num(to.x),
                    fmt_num(to.y)
                );
            }
            DrawCommand::Node(_) => {}
        }
    }
    let _ = writeln!(out, "</g>");

    let _ = writeln!(out, "<g class=\"nodes\">");
    for command in &rendered.commands {
        if let DrawCommand::Node(n) = command {
            write_node(out, n);
        }
    }
    let _ = writeln!(out, "</g>");
}

/// SVG id of a pattern definition.
pub fn pattern_id(pattern: AccessibilityPattern) -> String {
    format!("pattern-{}", pattern.name())
}

fn write_marker(out: &mut String, key: &MarkerKey) {
    let w = key.line_width as f32;
    let len = ARROW_LENGTH_PER_WIDTH * w;
    let half = ARROW_HALF_WIDTH_PER_WIDTH * w;
    let (path, ref_x) = match key.direction {
        MarkerDirection::End => (
            format!("M0 0 L{} {} L0 {} Z", fmt_num(len), fmt_num(half), fmt_num(2.0 * half)),
            len,
        ),
        MarkerDirection::Start => (
            format!(
                "M{} 0 L0 {} L{} {} Z",
                fmt_num(len),
                fmt_num(half),
                fmt_num(len),
                fmt_num(2.0 * half)
            ),
            0.0,
        ),
    };
    let _ = writeln!(
        out,
        "  <marker id=\"{}\" markerUnits=\"userSpaceOnUse\" markerWidth=\"{}\" markerHeight=\"{}\" refX=\"{}\" refY=\"{}\" orient=\"auto\"><path d=\"{path}\" fill=\"{}\" /></marker>",
        key.element_id(),
        fmt_num(len),
        fmt_num(2.0 * half),
        fmt_num(ref_x),
        fmt_num(half),
        escape_xml(&key.color)
    );
}

fn write_pattern(out: &mut String, pattern: AccessibilityPattern) {
    let t = fmt_num(PATTERN_TILE);
    let _ = write!(
        out,
        "  <pattern id=\"{}\" width=\"{t}\" height=\"{t}\" patternUnits=\"userSpaceOnUse\">",
        pattern_id(pattern)
    );
    for mark in pattern.marks() {
        match mark {
            PatternMark::Line { from, to } => {
                let _ = write!(
                    out,
                    "<line x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{PATTERN_INK}\" stroke-opacity=\"{PATTERN_OPACITY}\" stroke-width=\"1\" />",
                    fmt_num(from.x),
                    fmt_num(from.y),
                    fmt_num(to.x),
                    fmt_num(to.y)
                );
            }
            PatternMark::Dot { center, radius } => {
                let _ = write!(
                    out,
                    "<circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"{PATTERN_INK}\" fill-opacity=\"{PATTERN_OPACITY}\" />",
                    fmt_num(center.x),
                    fmt_num(center.y),
                    fmt_num(radius)
                );
            }
        }
    }
    let _ = writeln!(out, "</pattern>");
}

fn write_filter(out: &mut String, effect: NodeEffect) {
    let body = match effect {
        NodeEffect::DropShadow => {
            "<feDropShadow dx=\"2\" dy=\"3\" stdDeviation=\"2\" flood-color=\"#000000\" flood-opacity=\"0.35\" />"
        }
        NodeEffect::InsetShadow => concat!(
            "<feOffset in=\"SourceAlpha\" dx=\"2\" dy=\"2\" />",
            "<feGaussianBlur stdDeviation=\"1.5\" result=\"dark-blur\" />",
            "<feComposite in=\"SourceAlpha\" in2=\"dark-blur\" operator=\"out\" result=\"dark-edge\" />",
            "<feFlood flood-color=\"#000000\" flood-opacity=\"0.4\" />",
            "<feComposite in2=\"dark-edge\" operator=\"in\" result=\"dark\" />",
            "<feOffset in=\"SourceAlpha\" dx=\"-2\" dy=\"-2\" />",
            "<feGaussianBlur stdDeviation=\"1.5\" result=\"light-blur\" />",
            "<feComposite in=\"SourceAlpha\" in2=\"light-blur\" operator=\"out\" result=\"light-edge\" />",
            "<feFlood flood-color=\"#FFFFFF\" flood-opacity=\"0.5\" />",
            "<feComposite in2=\"light-edge\" operator=\"in\" result=\"light\" />",
            "<feMerge><feMergeNode in=\"SourceGraphic\" /><feMergeNode in=\"dark\" /><feMergeNode in=\"light\" /></feMerge>"
        ),
    };
    let _ = writeln!(
        out,
        "  <filter id=\"{}\" x=\"-20%\" y=\"-20%\" width=\"140%\" height=\"140%\">{body}</filter>",
        effect.element_id()
    );
}

fn write_connection(out: &mut String, c: &ConnectionDraw) {
    let mut attrs = String::new();
    if let Some((on, off)) = c.dash {
        let _ = write!(attrs, " stroke-dasharray=\"{} {}\"", fmt_num(on), fmt_num(off));
    }
    if let Some(m) = &c.start_marker {
        let _ = write!(attrs, " marker-start=\"url(#{})\"", m.element_id());
    }
    if let Some(m) = &c.end_marker {
        let _ = write!(attrs, " marker-end=\"url(#{})\"", m.element_id());
    }
    let _ = writeln!(
        out,
        "  <line data-connection-id=\"{}\" x1=\"{}\" y1=\"{}\" x2=\"{}\" y2=\"{}\" stroke=\"{}\" stroke-width=\"{}\"{attrs} />",
        c.id,
        fmt_num(c.segment.start.x),
        fmt_num(c.segment.start.y),
        fmt_num(c.segment.end.x),
        fmt_num(c.segment.end.y),
        escape_xml(&c.color),
        fmt_num(c.width)
    );
    if let Some(label) = &c.label {
        write_text(
            out,
            label,
            " stroke=\"#FFFFFF\" stroke-width=\"3\" paint-order=\"stroke\"",
        );
    }
}

fn write_node(out: &mut String, n: &NodeDraw) {
    let d = n.outline.to_svg_path();
    let _ = writeln!(out, "  <g class=\"node\" data-node-id=\"{}\">", n.id);

    let fill = n
        .fill
        .as_deref()
        .map(escape_xml)
        .unwrap_or_else(|| "none".to_string());
    let filter = n
        .effect
        .map(|e| format!(" filter=\"url(#{})\"", e.element_id()))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "    <path d=\"{d}\" fill=\"{fill}\" stroke=\"{}\" stroke-width=\"{}\"{filter} />",
        escape_xml(&n.stroke),
        fmt_num(n.stroke_width)
    );
    if let Some(pattern) = n.pattern {
        let _ = writeln!(
            out,
            "    <path class=\"pattern\" d=\"{d}\" fill=\"url(#{})\" stroke=\"none\" pointer-events=\"none\" />",
            pattern_id(pattern)
        );
    }

    write_text(out, &n.text, "");

    if let Some(icon) = n.description_icon {
        let _ = writeln!(
            out,
            "    <g class=\"description-icon\" data-node-id=\"{}\" cursor=\"pointer\"><circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"#FFFFFF\" stroke=\"{}\" stroke-width=\"1.5\" /><text x=\"{}\" y=\"{}\" text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"serif\" font-size=\"11\" font-style=\"italic\" font-weight=\"bold\" fill=\"{}\">i</text></g>",
            n.id,
            fmt_num(icon.x),
            fmt_num(icon.y),
            fmt_num(DESCRIPTION_ICON_RADIUS),
            escape_xml(&n.stroke),
            fmt_num(icon.x),
            fmt_num(icon.y),
            escape_xml(&n.stroke)
        );
    }

    if let Some(handle) = n.resize_handle {
        let _ = writeln!(
            out,
            "    <rect class=\"resize-handle\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"#FFFFFF\" stroke=\"#111827\" stroke-width=\"1\" />",
            fmt_num(handle.x),
            fmt_num(handle.y),
            fmt_num(handle.width),
            fmt_num(handle.height)
        );
    }
    let _ = writeln!(out, "  </g>");
}

fn write_text(out: &mut String, text: &TextBlock, extra: &str) {
    let weight = if text.bold { "bold" } else { "normal" };
    let style = if text.italic { "italic" } else { "normal" };
    let decoration = if text.underline {
        " text-decoration=\"underline\""
    } else {
        ""
    };
    let _ = write!(
        out,
        "    <text text-anchor=\"middle\" dominant-baseline=\"central\" font-family=\"{}\" font-size=\"{}\" font-weight=\"{weight}\" font-style=\"{style}\" fill=\"{}\"{decoration}{extra}>",
        escape_xml(&text.font_family),
        fmt_num(text.font_size),
        escape_xml(&text.color)
    );
    for (line, center) in text.lines.iter().zip(text.line_centers()) {
        let _ = write!(
            out,
            "<tspan x=\"{}\" y=\"{}\">{}</tspan>",
            fmt_num(center.x),
            fmt_num(center.y),
            escape_xml(line)
        );
    }
    let _ = writeln!(out, "</text>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render_scene, RenderOptions};
    use crate::types::*;

    fn scene() -> Scene {
        let mut scene = Scene::new("Map");
        let mut a = Node::new("Tom & Jerry <3", (100.0, 200.0));
        a.description = Some("notes".into());
        let b = Node::new("B", (400.0, 200.0));
        let mut conn = Connection::new(a.id, b.id);
        conn.line_style = LineStyle::Dashed;
        scene.connections.push(conn);
        scene.nodes.push(a);
        scene.nodes.push(b);
        scene
    }

    #[test]
    fn test_document_frames_content() {
        let scene = scene();
        let rendered = render_scene(&scene, &RenderOptions::read_only(false));
        let doc = build_svg(&scene, &rendered, &SvgOptions::default());

        assert_eq!((doc.width, doc.height), (550, 160));
        assert!(doc.svg.contains("viewBox=\"50 150 550 160\""));
        assert!(doc.svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_connection_markup() {
        let scene = scene();
        let rendered = render_scene(&scene, &RenderOptions::read_only(false));
        let doc = build_svg(&scene, &rendered, &SvgOptions::default());

        assert!(doc
            .svg
            .contains("x1=\"250\" y1=\"230\" x2=\"400\" y2=\"230\""));
        assert!(doc.svg.contains("stroke-dasharray=\"8 4\""));
        assert!(doc.svg.contains("marker-end=\"url(#arrow-end-4-6b7280)\""));
        assert_eq!(doc.svg.matches("<marker ").count(), 1);
    }

    #[test]
    fn test_text_is_escaped() {
        let scene = scene();
        let rendered = render_scene(&scene, &RenderOptions::read_only(false));
        let doc = build_svg(&scene, &rendered, &SvgOptions::default());
        assert!(doc.svg.contains("Tom &amp; Jerry &lt;3"));
        assert!(doc.svg.contains("class=\"description-icon\""));
    }

    #[test]
    fn test_patterns_are_defined_once_and_referenced() {
        let mut scene = scene();
        scene.nodes.push(Node::new("C", (0.0, 0.0)));
        let rendered = render_scene(&scene, &RenderOptions::read_only(true));
        let doc = build_svg(&scene, &rendered, &SvgOptions::default());

        assert_eq!(doc.svg.matches("<pattern id=\"pattern-stripes\"").count(), 1);
        assert_eq!(doc.svg.matches("fill=\"url(#pattern-stripes)\"").count(), 3);
    }
}
