//! Canvas rendering: the egui backend for [`DrawCommand`]s.
//!
//! Everything drawn here comes from [`render_scene`], the same command list the SVG exporter
//! writes, so the canvas and the static export agree on geometry, text layout and patterns.

use super::state::BibMapApp;
use crate::constants::{DESCRIPTION_ICON_RADIUS, PATTERN_TILE};
use crate::geometry::{arrowhead, Outline, Point};
use crate::legend::{legend_entries, AccessibilityPattern, PatternMark};
use crate::render::{
    render_scene, ConnectionDraw, DrawCommand, NodeDraw, NodeEffect, RenderOptions, TextBlock,
};
use eframe::egui;
use egui::StrokeKind;
use std::f32::consts::PI;

const SELECTION_COLOR: egui::Color32 = egui::Color32::from_rgb(100, 150, 255);
const PATTERN_INK: egui::Color32 = egui::Color32::from_rgba_premultiplied(0, 0, 0, 89);
/// Segments per full turn when flattening ellipses and rounded corners
const OUTLINE_SEGMENTS: usize = 48;

/// Parses `#RRGGBB` / `#RRGGBBAA`, falling back to gray for anything else.
pub fn parse_hex_color(hex: &str) -> egui::Color32 {
    egui::Color32::from_hex(hex.trim()).unwrap_or(egui::Color32::GRAY)
}

/// Formats a color as upper-case `#RRGGBB`.
pub fn to_hex(color: egui::Color32) -> String {
    format!("#{:02X}{:02X}{:02X}", color.r(), color.g(), color.b())
}

impl BibMapApp {
    /// Render options for the current frame.
    pub fn render_options(&self) -> RenderOptions {
        let show_patterns = self.model.scene().settings().show_patterns;
        if self.read_only {
            return RenderOptions::read_only(show_patterns);
        }
        RenderOptions {
            editable: true,
            selected_node: self.interaction.selected_node(),
            selected_connection: self.interaction.selected_connection(),
            connect_preview: self.interaction.connect_preview(),
            show_patterns,
        }
    }

    /// Renders the grid and every scene element on the canvas.
    ///
    /// # Arguments
    ///
    /// * `painter` - The egui painter for drawing operations
    /// * `canvas_rect` - The screen-space rectangle of the canvas area
    pub fn render_scene_elements(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        if self.settings.show_grid {
            self.draw_grid(painter, canvas_rect);
        }

        let rendered = render_scene(self.model.scene(), &self.render_options());
        for command in &rendered.commands {
            match command {
                DrawCommand::Connection(c) => self.draw_connection(painter, c),
                DrawCommand::ConnectPreview { from, to } => {
                    let points = [self.world_to_screen(*from), self.world_to_screen(*to)];
                    painter.extend(egui::Shape::dashed_line(
                        &points,
                        egui::Stroke::new(2.0, egui::Color32::from_rgb(107, 114, 128)),
                        6.0,
                        4.0,
                    ));
                }
                DrawCommand::Node(n) => self.draw_node(painter, n),
            }
        }
    }

    /// Draws a zoom-aware grid every `grid_size` map units.
    pub fn draw_grid(&self, painter: &egui::Painter, canvas_rect: egui::Rect) {
        let grid_size = self.settings.grid_size;
        let screen_grid_size = grid_size * self.canvas.view.scale;
        if grid_size <= 0.0 || screen_grid_size < 4.0 {
            return;
        }
        let stroke = egui::Stroke::new(
            1.0,
            egui::Color32::from_rgba_unmultiplied(128, 128, 128, 32),
        );

        let top_left = self.screen_to_world(canvas_rect.min);
        let bottom_right = self.screen_to_world(canvas_rect.max);

        let mut x = (top_left.x / grid_size).floor() * grid_size;
        while x <= bottom_right.x {
            let sx = self.world_to_screen(Point::new(x, 0.0)).x;
            painter.line_segment(
                [
                    egui::pos2(sx, canvas_rect.min.y),
                    egui::pos2(sx, canvas_rect.max.y),
                ],
                stroke,
            );
            x += grid_size;
        }
        let mut y = (top_left.y / grid_size).floor() * grid_size;
        while y <= bottom_right.y {
            let sy = self.world_to_screen(Point::new(0.0, y)).y;
            painter.line_segment(
                [
                    egui::pos2(canvas_rect.min.x, sy),
                    egui::pos2(canvas_rect.max.x, sy),
                ],
                stroke,
            );
            y += grid_size;
        }
    }

    fn draw_connection(&self, painter: &egui::Painter, c: &ConnectionDraw) {
        let scale = self.canvas.view.scale;
        let start = self.world_to_screen(c.segment.start);
        let end = self.world_to_screen(c.segment.end);
        let color = parse_hex_color(&c.color);
        let stroke = egui::Stroke::new(c.width * scale, color);

        if c.selected {
            painter.line_segment(
                [start, end],
                egui::Stroke::new((c.width + 6.0) * scale, SELECTION_COLOR.gamma_multiply(0.4)),
            );
        }
        match c.dash {
            Some((on, off)) => {
                painter.extend(egui::Shape::dashed_line(
                    &[start, end],
                    stroke,
                    on * scale,
                    off * scale,
                ));
            }
            None => {
                painter.line_segment([start, end], stroke);
            }
        }

        let angle = c.segment.angle();
        if c.end_marker.is_some() {
            self.draw_arrowhead(painter, c.segment.end, angle, c.width, color);
        }
        if c.start_marker.is_some() {
            self.draw_arrowhead(painter, c.segment.start, angle + PI, c.width, color);
        }

        if let Some(label) = &c.label {
            self.draw_text(painter, label, Some(egui::Color32::WHITE));
        }
    }

    fn draw_arrowhead(
        &self,
        painter: &egui::Painter,
        tip: Point,
        angle: f32,
        line_width: f32,
        color: egui::Color32,
    ) {
        let points = arrowhead(tip, angle, line_width)
            .iter()
            .map(|p| self.world_to_screen(*p))
            .collect();
        painter.add(egui::Shape::convex_polygon(points, color, egui::Stroke::NONE));
    }

    fn draw_node(&self, painter: &egui::Painter, n: &NodeDraw) {
        let scale = self.canvas.view.scale;
        let outline: Vec<egui::Pos2> = n
            .outline
            .polyline(OUTLINE_SEGMENTS)
            .into_iter()
            .map(|p| self.world_to_screen(p))
            .collect();
        let fill = n
            .fill
            .as_deref()
            .map(parse_hex_color)
            .unwrap_or(egui::Color32::TRANSPARENT);
        let stroke = egui::Stroke::new(n.stroke_width * scale, parse_hex_color(&n.stroke));

        if n.effect == Some(NodeEffect::DropShadow) {
            let shadow: Vec<egui::Pos2> = outline
                .iter()
                .map(|p| *p + egui::vec2(2.0, 3.0) * scale)
                .collect();
            painter.add(egui::Shape::convex_polygon(
                shadow,
                egui::Color32::from_black_alpha(90),
                egui::Stroke::NONE,
            ));
        }

        painter.add(egui::Shape::convex_polygon(
            outline.clone(),
            fill,
            egui::Stroke::NONE,
        ));
        if let Some(pattern) = n.pattern {
            self.draw_pattern(painter, &n.outline, pattern);
        }
        if n.effect == Some(NodeEffect::InsetShadow) {
            self.draw_inset_shadow(painter, &outline, scale);
        }
        painter.add(egui::Shape::closed_line(outline, stroke));

        self.draw_text(painter, &n.text, None);

        if let Some(icon) = n.description_icon {
            let center = self.world_to_screen(icon);
            let radius = DESCRIPTION_ICON_RADIUS * scale;
            painter.circle(
                center,
                radius,
                egui::Color32::WHITE,
                egui::Stroke::new(1.5 * scale, parse_hex_color(&n.stroke)),
            );
            painter.text(
                center,
                egui::Align2::CENTER_CENTER,
                "i",
                egui::FontId::proportional(11.0 * scale),
                parse_hex_color(&n.stroke),
            );
        }

        if let Some(handle) = n.resize_handle {
            let rect = egui::Rect::from_min_max(
                self.world_to_screen(handle.min()),
                self.world_to_screen(handle.max()),
            );
            painter.rect_filled(rect, 2.0, SELECTION_COLOR);
            painter.rect_stroke(
                rect,
                2.0,
                egui::Stroke::new(1.0, egui::Color32::WHITE),
                StrokeKind::Inside,
            );
        }
    }

    /// Hatches the inside of `outline`, tiling the pattern in map space so it lines up with
    /// the exported SVG pattern.
    fn draw_pattern(&self, painter: &egui::Painter, outline: &Outline, pattern: AccessibilityPattern) {
        let scale = self.canvas.view.scale;
        let bounds = outline.bounding_box();
        let marks = pattern.marks();
        let stroke = egui::Stroke::new(scale, PATTERN_INK);

        let mut ty = (bounds.y / PATTERN_TILE).floor() * PATTERN_TILE;
        while ty < bounds.y + bounds.height {
            let mut tx = (bounds.x / PATTERN_TILE).floor() * PATTERN_TILE;
            while tx < bounds.x + bounds.width {
                let tile = Point::new(tx, ty);
                for mark in &marks {
                    match *mark {
                        PatternMark::Line { from, to } => {
                            let (a, b) = (tile + from, tile + to);
                            if outline.contains(a) && outline.contains(b) {
                                painter.line_segment(
                                    [self.world_to_screen(a), self.world_to_screen(b)],
                                    stroke,
                                );
                            }
                        }
                        PatternMark::Dot { center, radius } => {
                            let c = tile + center;
                            if outline.contains(c) {
                                painter.circle_filled(
                                    self.world_to_screen(c),
                                    radius * scale,
                                    PATTERN_INK,
                                );
                            }
                        }
                    }
                }
                tx += PATTERN_TILE;
            }
            ty += PATTERN_TILE;
        }
    }

    /// Emboss approximation: a dark edge toward the bottom-right and a light one toward the
    /// top-left.
    fn draw_inset_shadow(&self, painter: &egui::Painter, outline: &[egui::Pos2], scale: f32) {
        let offset = egui::vec2(1.5, 1.5) * scale;
        let dark: Vec<egui::Pos2> = outline.iter().map(|p| *p - offset).collect();
        let light: Vec<egui::Pos2> = outline.iter().map(|p| *p + offset).collect();
        painter.add(egui::Shape::closed_line(
            dark,
            egui::Stroke::new(2.0 * scale, egui::Color32::from_black_alpha(100)),
        ));
        painter.add(egui::Shape::closed_line(
            light,
            egui::Stroke::new(2.0 * scale, egui::Color32::from_white_alpha(128)),
        ));
    }

    fn draw_text(&self, painter: &egui::Painter, text: &TextBlock, halo: Option<egui::Color32>) {
        let scale = self.canvas.view.scale;
        let color = parse_hex_color(&text.color);
        let font = egui::FontId::proportional(text.font_size * scale);

        for (line, center) in text.lines.iter().zip(text.line_centers()) {
            let mut job = egui::text::LayoutJob::single_section(
                line.clone(),
                egui::TextFormat {
                    font_id: font.clone(),
                    color,
                    italics: text.italic,
                    underline: if text.underline {
                        egui::Stroke::new(scale.max(1.0), color)
                    } else {
                        egui::Stroke::NONE
                    },
                    ..Default::default()
                },
            );
            job.halign = egui::Align::Center;
            let galley = painter.layout_job(job);
            let screen_center = self.world_to_screen(center);
            let top_left = egui::pos2(
                screen_center.x - galley.size().x / 2.0,
                screen_center.y - galley.size().y / 2.0,
            );

            if let Some(halo) = halo {
                painter.rect_filled(
                    egui::Rect::from_min_size(top_left, galley.size()).expand(2.0 * scale),
                    2.0,
                    halo,
                );
            }
            let pos = top_left + egui::vec2(galley.size().x / 2.0, 0.0);
            painter.galley(pos, galley.clone(), color);
            if text.bold {
                // no bold face in the default fonts: overstrike by a fraction of a pixel
                painter.galley(pos + egui::vec2(0.6, 0.0), galley, color);
            }
        }
    }

    /// Draws the legend over the bottom-left corner of the canvas.
    pub fn draw_legend(&self, ui: &mut egui::Ui, canvas_rect: egui::Rect) {
        let settings = self.model.scene().settings();
        let entries = legend_entries(self.model.nodes(), &settings);
        if entries.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("legend"))
            .fixed_pos(canvas_rect.left_bottom() + egui::vec2(10.0, -10.0))
            .pivot(egui::Align2::LEFT_BOTTOM)
            .interactable(false)
            .show(ui.ctx(), |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.strong("Legend");
                    for entry in &entries {
                        ui.horizontal(|ui| {
                            let (rect, _) =
                                ui.allocate_exact_size(egui::vec2(18.0, 18.0), egui::Sense::hover());
                            ui.painter()
                                .rect_filled(rect, 3.0, parse_hex_color(&entry.color));
                            if settings.show_patterns {
                                draw_swatch_pattern(ui.painter(), rect, entry.pattern);
                            }
                            ui.label(format!("{} ({})", entry.label, entry.count));
                        });
                    }
                });
            });
    }
}

/// Pattern marks inside a small screen-space swatch.
fn draw_swatch_pattern(painter: &egui::Painter, rect: egui::Rect, pattern: AccessibilityPattern) {
    let tile = PATTERN_TILE;
    let stroke = egui::Stroke::new(1.0, PATTERN_INK);
    let painter = painter.with_clip_rect(rect);
    let mut ty = 0.0;
    while ty < rect.height() {
        let mut tx = 0.0;
        while tx < rect.width() {
            let origin = rect.min + egui::vec2(tx, ty);
            for mark in pattern.marks() {
                match mark {
                    PatternMark::Line { from, to } => painter.line_segment(
                        [origin + egui::vec2(from.x, from.y), origin + egui::vec2(to.x, to.y)],
                        stroke,
                    ),
                    PatternMark::Dot { center, radius } => painter.circle_filled(
                        origin + egui::vec2(center.x, center.y),
                        radius,
                        PATTERN_INK,
                    ),
                };
            }
            tx += tile;
        }
        ty += tile;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let c = parse_hex_color("#3B82F6");
        assert_eq!(c, egui::Color32::from_rgb(0x3B, 0x82, 0xF6));
        assert_eq!(to_hex(c), "#3B82F6");
    }

    #[test]
    fn test_bad_hex_falls_back() {
        assert_eq!(parse_hex_color("blue"), egui::Color32::GRAY);
    }
}
