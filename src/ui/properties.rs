//! Properties panel: editors for the selected node or connection and for the map itself.
//!
//! Text fields apply locally on every keystroke and persist once typing settles; every other
//! control persists immediately.

use super::rendering::{parse_hex_color, to_hex};
use super::state::{BibMapApp, PendingEdit};
use crate::legend::legend_entries;
use crate::types::*;
use eframe::egui;

const FONT_FAMILIES: [&str; 4] = ["system-ui", "serif", "sans-serif", "monospace"];

impl BibMapApp {
    /// Renders the properties panel for the current selection.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    pub fn draw_properties_panel(&mut self, ui: &mut egui::Ui) {
        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                ui.heading("Properties");
                ui.separator();

                if let Some(id) = self.interaction.selected_node() {
                    self.draw_node_properties(ui, id);
                } else if let Some(id) = self.interaction.selected_connection() {
                    self.draw_connection_properties(ui, id);
                } else {
                    self.draw_map_properties(ui);
                }
            });
    }

    /// Applies a text edit now and persists it once typing settles.
    fn edit_node_text(&mut self, id: NodeId, patch: NodePatch) {
        self.model.apply_node_patch(id, &patch);
        self.schedule_edit(id, PendingEdit::Node(patch));
    }

    fn draw_node_properties(&mut self, ui: &mut egui::Ui, id: NodeId) {
        let Some(node) = self.model.node(id).cloned() else {
            return;
        };
        ui.label("Type: Node");
        ui.separator();

        ui.label("Label:");
        let mut label = node.label.clone();
        if ui.text_edit_singleline(&mut label).changed() {
            self.edit_node_text(
                id,
                NodePatch {
                    label: Some(label),
                    ..Default::default()
                },
            );
        }

        ui.label("Description:");
        let mut description = node.description.clone().unwrap_or_default();
        if ui
            .add(egui::TextEdit::multiline(&mut description).desired_rows(3))
            .changed()
        {
            let description = Some(description).filter(|d| !d.trim().is_empty());
            self.edit_node_text(
                id,
                NodePatch {
                    description: Some(description),
                    ..Default::default()
                },
            );
        }

        ui.separator();
        let mut patch = NodePatch::default();

        egui::Grid::new("node_shape_grid")
            .num_columns(2)
            .show(ui, |ui| {
                ui.label("Shape:");
                let mut shape = node.shape;
                egui::ComboBox::from_id_salt("node_shape")
                    .selected_text(shape.as_str())
                    .show_ui(ui, |ui| {
                        for option in NodeShape::ALL {
                            ui.selectable_value(&mut shape, *option, option.as_str());
                        }
                    });
                if shape != node.shape {
                    patch.shape = Some(shape);
                }
                ui.end_row();

                ui.label("Style:");
                let mut style = node.node_style;
                egui::ComboBox::from_id_salt("node_style")
                    .selected_text(style.as_str())
                    .show_ui(ui, |ui| {
                        for option in NodeStyle::ALL {
                            ui.selectable_value(&mut style, *option, option.as_str());
                        }
                    });
                if style != node.node_style {
                    patch.node_style = Some(style);
                }
                ui.end_row();

                for (name, current, slot) in [
                    ("Fill:", &node.background_color, &mut patch.background_color),
                    ("Text:", &node.text_color, &mut patch.text_color),
                    ("Border:", &node.border_color, &mut patch.border_color),
                ] {
                    ui.label(name);
                    let mut color = parse_hex_color(current);
                    if ui.color_edit_button_srgba(&mut color).changed() {
                        *slot = Some(to_hex(color));
                    }
                    ui.end_row();
                }

                ui.label("Font:");
                let mut family = node.font_family.clone();
                egui::ComboBox::from_id_salt("node_font_family")
                    .selected_text(family.as_str())
                    .show_ui(ui, |ui| {
                        for option in FONT_FAMILIES {
                            ui.selectable_value(&mut family, option.to_string(), option);
                        }
                    });
                if family != node.font_family {
                    patch.font_family = Some(family);
                }
                ui.end_row();

                ui.label("Font size:");
                let mut size = node.font_size;
                if ui
                    .add(egui::DragValue::new(&mut size).range(6..=96))
                    .changed()
                {
                    patch.font_size = Some(size);
                }
                ui.end_row();
            });

        ui.horizontal(|ui| {
            for (name, current, slot) in [
                ("Bold", node.font_bold, &mut patch.font_bold),
                ("Italic", node.font_italic, &mut patch.font_italic),
                ("Underline", node.font_underline, &mut patch.font_underline),
            ] {
                let mut value = current;
                if ui.checkbox(&mut value, name).changed() {
                    *slot = Some(value);
                }
            }
        });
        let mut wrap = node.wrap_text;
        if ui.checkbox(&mut wrap, "Wrap text").changed() {
            patch.wrap_text = Some(wrap);
        }
        let mut link = node.link_to_references;
        if ui.checkbox(&mut link, "Link to references").changed() {
            patch.link_to_references = Some(link);
        }

        if patch != NodePatch::default() {
            self.model.update_node(id, patch);
        }

        ui.separator();
        self.draw_node_size(ui, &node);

        if !node.taxonomies.is_empty() {
            ui.separator();
            ui.label("Tags:");
            ui.horizontal_wrapped(|ui| {
                for tag in &node.taxonomies {
                    ui.colored_label(parse_hex_color(&tag.color), &tag.name);
                }
            });
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Duplicate").clicked() {
                self.duplicate_selection();
            }
            if ui.button("Delete").clicked() {
                self.delete_selection();
            }
        });

        if node.link_to_references {
            ui.separator();
            self.draw_reference_list(ui, id);
        }
    }

    /// Width and height editors. Dragging resizes live and persists when the drag ends.
    fn draw_node_size(&mut self, ui: &mut egui::Ui, node: &Node) {
        let mut width = node.width;
        let mut height = node.height;
        let (w, h) = ui
            .horizontal(|ui| {
                ui.label("Size:");
                let w = ui.add(egui::DragValue::new(&mut width).speed(1.0).prefix("w "));
                let h = ui.add(egui::DragValue::new(&mut height).speed(1.0).prefix("h "));
                (w, h)
            })
            .inner;
        if w.changed() || h.changed() {
            self.model.set_node_size(node.id, width, height);
        }
        let settled = |r: &egui::Response| r.drag_stopped() || (r.changed() && !r.dragged());
        if settled(&w) || settled(&h) {
            self.model.commit_node_size(node.id);
        }
    }

    fn draw_reference_list(&mut self, ui: &mut egui::Ui, id: NodeId) {
        ui.horizontal(|ui| {
            ui.label("References");
            if ui.small_button("⟳").on_hover_text("Load references").clicked() {
                self.load_references(id);
            }
        });
        if self.references.node != Some(id) {
            return;
        }
        if self.references.loading {
            ui.spinner();
        } else if let Some(error) = &self.references.error {
            ui.colored_label(ui.visuals().error_fg_color, error);
        } else if self.references.items.is_empty() && self.references.media.is_empty() {
            ui.label("No linked references or media");
        }
        for linked in &self.references.items {
            let reference = &linked.reference;
            ui.group(|ui| {
                ui.strong(reference.display_title());
                let byline: Vec<&str> = [reference.author.as_deref(), reference.year.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                if !byline.is_empty() {
                    ui.label(byline.join(", "));
                }
                for reason in &linked.match_reasons {
                    ui.small(reason.describe());
                }
            });
        }
        if !self.references.media.is_empty() {
            ui.label("Media");
        }
        for linked in &self.references.media {
            let media = &linked.media;
            ui.group(|ui| {
                ui.hyperlink_to(&media.title, &media.url);
                if let Some(description) = media.description.as_deref().filter(|d| !d.is_empty()) {
                    ui.label(description);
                }
                for reason in &linked.match_reasons {
                    ui.small(reason.describe());
                }
            });
        }
    }

    fn draw_connection_properties(&mut self, ui: &mut egui::Ui, id: ConnectionId) {
        let Some(connection) = self.model.connection(id).cloned() else {
            return;
        };
        ui.label("Type: Connection");
        let endpoint = |node_id: NodeId| {
            self.model
                .node(node_id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| "(missing)".to_string())
        };
        ui.label(format!(
            "{} → {}",
            endpoint(connection.source_node_id),
            endpoint(connection.target_node_id)
        ));
        ui.separator();

        ui.label("Label:");
        let mut label = connection.label.clone().unwrap_or_default();
        if ui.text_edit_singleline(&mut label).changed() {
            let patch = ConnectionPatch {
                label: Some(label),
                ..Default::default()
            };
            self.model.apply_connection_patch(id, &patch);
            self.schedule_edit(id, PendingEdit::Connection(patch));
        }

        let mut patch = ConnectionPatch::default();
        let mut show_label = connection.show_label;
        if ui.checkbox(&mut show_label, "Show label").changed() {
            patch.show_label = Some(show_label);
        }

        egui::Grid::new("connection_grid")
            .num_columns(2)
            .show(ui, |ui| {
                ui.label("Color:");
                let mut color = parse_hex_color(&connection.line_color);
                if ui.color_edit_button_srgba(&mut color).changed() {
                    patch.line_color = Some(to_hex(color));
                }
                ui.end_row();

                ui.label("Width:");
                let mut width = connection.line_width;
                if ui
                    .add(egui::DragValue::new(&mut width).range(1..=20))
                    .changed()
                {
                    patch.line_width = Some(width);
                }
                ui.end_row();

                ui.label("Line:");
                let mut style = connection.line_style;
                egui::ComboBox::from_id_salt("line_style")
                    .selected_text(style.as_str())
                    .show_ui(ui, |ui| {
                        for option in LineStyle::ALL {
                            ui.selectable_value(&mut style, *option, option.as_str());
                        }
                    });
                if style != connection.line_style {
                    patch.line_style = Some(style);
                }
                ui.end_row();

                ui.label("Arrows:");
                let mut arrow = connection.arrow_type;
                egui::ComboBox::from_id_salt("arrow_type")
                    .selected_text(arrow.as_str())
                    .show_ui(ui, |ui| {
                        for option in ArrowType::ALL {
                            ui.selectable_value(&mut arrow, *option, option.as_str());
                        }
                    });
                if arrow != connection.arrow_type {
                    patch.arrow_type = Some(arrow);
                }
                ui.end_row();
            });

        if patch != ConnectionPatch::default() {
            self.model.update_connection(id, patch);
        }

        ui.separator();
        ui.horizontal(|ui| {
            if ui.button("Duplicate").clicked() {
                self.duplicate_selection();
            }
            if ui.button("Delete").clicked() {
                self.delete_selection();
            }
        });
    }

    /// Map-level settings shown when nothing is selected.
    fn draw_map_properties(&mut self, ui: &mut egui::Ui) {
        let scene_id = self.model.id();
        ui.label("Map:");
        let mut title = self.model.scene().title.clone();
        if ui.text_edit_singleline(&mut title).changed() {
            self.model.set_title(title);
        }
        ui.label(format!(
            "{} nodes, {} connections",
            self.model.nodes().len(),
            self.model.connections().len()
        ));

        ui.separator();
        let mut published = self.model.scene().is_published;
        if ui.checkbox(&mut published, "Published").changed() {
            self.set_published(published);
        }

        let original = self.model.scene().settings();
        let mut settings = original.clone();
        ui.checkbox(&mut settings.show_legend, "Show legend");
        ui.checkbox(&mut settings.show_patterns, "Show patterns");
        if settings != original {
            self.text_edits.cancel(&scene_id);
            self.model.update_settings(settings.clone());
        }

        if settings.show_legend {
            ui.separator();
            ui.label("Legend labels:");
            let mut edited = settings.clone();
            for entry in legend_entries(self.model.nodes(), &settings) {
                ui.horizontal(|ui| {
                    let (rect, _) =
                        ui.allocate_exact_size(egui::vec2(14.0, 14.0), egui::Sense::hover());
                    ui.painter()
                        .rect_filled(rect, 2.0, parse_hex_color(&entry.color));
                    let mut label = entry.label.clone();
                    if ui.text_edit_singleline(&mut label).changed() {
                        edited
                            .legend_labels
                            .insert(entry.color.to_ascii_uppercase(), label);
                    }
                });
            }
            if edited != settings {
                self.model.apply_settings(&edited);
                self.schedule_edit(scene_id, PendingEdit::Settings(edited));
            }
        }
    }
}
