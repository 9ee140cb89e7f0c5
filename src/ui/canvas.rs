//! Canvas navigation and input binding.
//!
//! Converts egui pointer and keyboard input into [`CanvasEvent`]s for the interaction state
//! machine, and handles the view: panning, zooming about the pointer, fit and reset. In
//! read-only mode only navigation and description callouts are bound.

use super::interaction::{hit_test, CanvasEvent, Hit, KeyCommand};
use super::state::BibMapApp;
use crate::constants::{DESCRIPTION_ICON_RADIUS, ZOOM_STEP};
use crate::geometry::Point;
use crate::view::fit_to_screen;
use eframe::egui;

impl BibMapApp {
    /// Converts screen coordinates to map coordinates accounting for zoom and pan.
    ///
    /// # Arguments
    ///
    /// * `screen_pos` - Position in screen space (pixels)
    ///
    /// # Returns
    ///
    /// The corresponding position in map space
    pub fn screen_to_world(&self, screen_pos: egui::Pos2) -> Point {
        let local = screen_pos - self.canvas.origin;
        self.canvas.view.to_world(Point::new(local.x, local.y))
    }

    /// Converts map coordinates to screen coordinates accounting for zoom and pan.
    pub fn world_to_screen(&self, world_pos: Point) -> egui::Pos2 {
        let local = self.canvas.view.to_screen(world_pos);
        self.canvas.origin + egui::vec2(local.x, local.y)
    }

    /// Centers every node in the canvas.
    pub fn fit_view(&mut self) {
        self.canvas.view = fit_to_screen(self.model.nodes(), self.canvas.size.x, self.canvas.size.y);
        self.canvas.needs_fit = false;
        self.interaction.on_view_changed();
    }

    /// Back to the identity transform.
    pub fn reset_view(&mut self) {
        self.canvas.view.reset();
        self.interaction.on_view_changed();
    }

    /// Zooms by `factor` about the canvas center.
    pub fn zoom_centered(&mut self, factor: f32) {
        let anchor = Point::new(self.canvas.size.x / 2.0, self.canvas.size.y / 2.0);
        if self.canvas.view.zoom_about(anchor, factor) {
            self.interaction.on_view_changed();
        }
    }

    /// Draws the canvas and binds its input.
    pub fn draw_canvas(&mut self, ui: &mut egui::Ui) {
        let (response, painter) =
            ui.allocate_painter(ui.available_size(), egui::Sense::click_and_drag());
        self.canvas.origin = response.rect.min;
        self.canvas.size = response.rect.size();

        if self.canvas.needs_fit && self.canvas.size.x > 0.0 && self.canvas.size.y > 0.0 {
            self.fit_view();
        }

        if self.read_only {
            self.handle_read_only_pointer(ui, &response);
        } else {
            self.handle_pointer_events(ui, &response);
        }
        self.handle_canvas_panning(ui, &response);
        self.handle_canvas_zoom(ui, &response);

        if response.double_clicked() {
            let on_background = response
                .interact_pointer_pos()
                .map(|pos| {
                    let world = self.screen_to_world(pos);
                    hit_test(&self.model, world, self.canvas.view.scale, None) == Hit::Background
                })
                .unwrap_or(true);
            if on_background {
                log::debug!("View reset");
                self.reset_view();
            }
        }

        self.render_scene_elements(&painter, response.rect);
        if self.model.scene().settings().show_legend {
            self.draw_legend(ui, response.rect);
        }
        self.draw_callout(ui);

        if self.read_only {
            return;
        }
        if self.interaction.is_dragging() || self.canvas.is_panning {
            ui.ctx().set_cursor_icon(egui::CursorIcon::Grabbing);
        } else if self.interaction.connect_preview().is_some() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::Crosshair);
        }
    }

    /// Translates primary-button input on the canvas into interaction events.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    /// * `response` - The response from the canvas widget
    pub fn handle_pointer_events(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let (pressed, down, released, command, pos) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
                i.modifiers.command,
                i.pointer.interact_pos().or(i.pointer.hover_pos()),
            )
        });
        let Some(pos) = pos else {
            return;
        };
        let world = self.screen_to_world(pos);
        let scale = self.canvas.view.scale;
        let snap = self.snap_settings();

        // Cmd/Ctrl+drag always pans
        if pressed && response.rect.contains(pos) && !command {
            self.canvas.press_active = true;
            self.interaction
                .handle(&mut self.model, CanvasEvent::PointerDown(world), scale, snap);
            self.sync_reference_panel();
        } else if self.canvas.press_active && down {
            self.interaction
                .handle(&mut self.model, CanvasEvent::PointerMove(world), scale, snap);
        } else if !down && self.interaction.connect_preview().is_some() && response.hovered() {
            // keep the preview following the pointer between presses
            self.interaction
                .handle(&mut self.model, CanvasEvent::PointerMove(world), scale, snap);
        }

        if released && self.canvas.press_active {
            self.canvas.press_active = false;
            self.interaction
                .handle(&mut self.model, CanvasEvent::PointerUp(world), scale, snap);
        }
    }

    /// Read-only pointer handling: callout toggles and drag-to-pan only.
    fn handle_read_only_pointer(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let (pressed, released, pos) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.interact_pos(),
            )
        });
        if released {
            self.canvas.press_active = false;
        }
        let Some(pos) = pos.filter(|p| pressed && response.rect.contains(*p)) else {
            return;
        };
        let world = self.screen_to_world(pos);
        let icon = self.model.nodes().iter().rev().find(|node| {
            node.description_text().is_some()
                && crate::render::description_icon_center(node).distance(world)
                    <= DESCRIPTION_ICON_RADIUS
        });
        match icon {
            Some(node) => {
                let id = node.id;
                self.interaction.toggle_callout(id);
            }
            None => {
                self.interaction.close_callout();
                self.canvas.press_active = true;
            }
        }
    }

    /// Handles middle-click, Cmd/Ctrl+drag and background-drag panning.
    ///
    /// # Arguments
    ///
    /// * `ui` - The egui UI context
    /// * `response` - The response from the canvas widget
    pub fn handle_canvas_panning(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let background_drag = if self.read_only {
            self.canvas.press_active
        } else {
            self.interaction.is_panning()
        };
        let should_pan = ui.input(|i| {
            i.pointer.middle_down()
                || (i.pointer.primary_down() && (i.modifiers.command || background_drag))
        });

        if should_pan {
            if let Some(current_pos) = ui
                .input(|i| i.pointer.interact_pos())
                .or_else(|| response.interact_pointer_pos())
            {
                if !self.canvas.is_panning {
                    self.canvas.is_panning = true;
                    self.canvas.last_pan_pos = Some(current_pos);
                } else if let Some(last_pos) = self.canvas.last_pan_pos {
                    let delta = current_pos - last_pos;
                    if delta != egui::Vec2::ZERO {
                        self.canvas.view.pan(Point::new(delta.x, delta.y));
                        self.interaction.on_view_changed();
                    }
                    self.canvas.last_pan_pos = Some(current_pos);
                }
            }
        } else {
            self.canvas.is_panning = false;
            self.canvas.last_pan_pos = None;
        }
    }

    /// Handles scroll wheel zooming about the pointer.
    ///
    /// The scale stays within the view's zoom range; zooming closes any open callout.
    pub fn handle_canvas_zoom(&mut self, ui: &mut egui::Ui, response: &egui::Response) {
        let (scroll, pinch, hover) = ui.input(|i| {
            (
                i.smooth_scroll_delta.y,
                i.zoom_delta(),
                i.pointer.hover_pos(),
            )
        });
        let Some(mouse_pos) = hover else {
            return;
        };
        if !response.rect.contains(mouse_pos) {
            return;
        }
        let factor = if pinch != 1.0 {
            pinch
        } else if scroll != 0.0 {
            ZOOM_STEP.powf(scroll / 50.0)
        } else {
            return;
        };
        let local = mouse_pos - self.canvas.origin;
        if self.canvas.view.zoom_about(Point::new(local.x, local.y), factor) {
            self.interaction.on_view_changed();
        }
    }

    /// Maps pressed keys to interaction commands. Ignored while a text field has focus.
    pub fn handle_canvas_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let commands: Vec<KeyCommand> = ctx.input(|i| {
            let mut out = Vec::new();
            if i.key_pressed(egui::Key::Escape) {
                out.push(KeyCommand::Escape);
            }
            if self.read_only {
                return out;
            }
            if i.key_pressed(egui::Key::Tab) {
                out.push(if i.modifiers.shift {
                    KeyCommand::FocusPrevious
                } else {
                    KeyCommand::FocusNext
                });
            }
            let arrows = [
                (egui::Key::ArrowLeft, -1, 0),
                (egui::Key::ArrowRight, 1, 0),
                (egui::Key::ArrowUp, 0, -1),
                (egui::Key::ArrowDown, 0, 1),
            ];
            for (key, dx, dy) in arrows {
                if i.key_pressed(key) {
                    out.push(KeyCommand::Nudge { dx, dy });
                }
            }
            if i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace) {
                out.push(KeyCommand::Delete);
            }
            if i.key_pressed(egui::Key::C) && !i.modifiers.command {
                out.push(KeyCommand::Connect);
            }
            out
        });

        let scale = self.canvas.view.scale;
        let snap = self.snap_settings();
        for command in commands {
            if command == KeyCommand::Escape && self.read_only {
                self.interaction.close_callout();
                continue;
            }
            if command == KeyCommand::Delete {
                self.delete_selection();
                continue;
            }
            self.interaction
                .handle(&mut self.model, CanvasEvent::Key(command), scale, snap);
        }
        self.sync_reference_panel();
    }

    /// Clears the references panel when the selection moves to another node.
    fn sync_reference_panel(&mut self) {
        if self.references.node.is_some() && self.references.node != self.interaction.selected_node() {
            self.references = Default::default();
        }
    }

    /// Shows the open description callout next to its node's top-right corner.
    fn draw_callout(&mut self, ui: &mut egui::Ui) {
        let Some(id) = self.interaction.open_callout() else {
            return;
        };
        let Some(node) = self.model.node(id) else {
            self.interaction.close_callout();
            return;
        };
        let Some(description) = node.description_text().map(str::to_string) else {
            self.interaction.close_callout();
            return;
        };
        let label = node.label.clone();
        let links = node.link_to_references && !self.read_only;
        let anchor = self.world_to_screen(Point::new(node.x + node.width, node.y))
            + egui::vec2(DESCRIPTION_ICON_RADIUS + 4.0, 0.0);

        let mut close = false;
        let mut show_references = false;
        egui::Area::new(egui::Id::new(("callout", id)))
            .fixed_pos(anchor)
            .order(egui::Order::Foreground)
            .show(ui.ctx(), |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.set_max_width(280.0);
                    ui.horizontal(|ui| {
                        ui.strong(&label);
                        if ui.small_button("×").on_hover_text("Close").clicked() {
                            close = true;
                        }
                    });
                    ui.label(&description);
                    if links && ui.link("Show references").clicked() {
                        show_references = true;
                    }
                });
            });

        if close {
            self.interaction.close_callout();
        }
        if show_references {
            self.interaction.select_node(id);
            self.load_references(id);
        }
    }
}
