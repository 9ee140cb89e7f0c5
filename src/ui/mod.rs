//! User interface for the map editor and the public viewer.
//!
//! # Module Organization
//!
//! - `state` - Application state structures and the main BibMapApp
//! - `interaction` - Selection, drag, resize and connect state machine
//! - `canvas` - Canvas navigation, zooming, panning and input binding
//! - `rendering` - Drawing the render commands with the egui painter
//! - `properties` - The properties panel
//! - `file_ops` - Bundle open/save and exports for native and WASM

mod canvas;
mod file_ops;
pub mod interaction;
mod properties;
mod rendering;
mod state;

#[cfg(test)]
mod tests;

pub use state::{BibMapApp, EditorSettings};

use eframe::egui;

/// Storage key for the editor preferences.
const APP_STATE_KEY: &str = "app_state";

impl BibMapApp {
    /// Restores editor preferences saved by a previous session.
    pub fn restore_settings(&mut self, storage: Option<&dyn eframe::Storage>) {
        let Some(json) = storage.and_then(|s| s.get_string(APP_STATE_KEY)) else {
            return;
        };
        match EditorSettings::from_json(&json) {
            Ok(settings) => self.settings = settings,
            Err(err) => log::warn!("Ignoring saved editor settings: {err}"),
        }
    }
}

impl eframe::App for BibMapApp {
    /// Persist editor preferences between restarts.
    ///
    /// Also called on shutdown, so edits still waiting for typing to settle are sent here.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        self.flush_edits();
        match self.settings.to_json() {
            Ok(json) => storage.set_string(APP_STATE_KEY, json),
            Err(err) => log::error!("Failed to serialize editor settings: {err}"),
        }
    }

    /// Main update function called by egui for each frame.
    ///
    /// Runs background work (debounced saves, store results, file dialogs) and lays out the
    /// toolbar, the properties panel and the canvas.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let visuals = if self.settings.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        };
        ctx.set_visuals(visuals);

        let now = ctx.input(|i| i.time);
        self.process_background(now);
        self.handle_pending_operations(ctx);
        self.handle_canvas_keys(ctx);

        egui::TopBottomPanel::top("top_toolbar").show(ctx, |ui| {
            self.draw_toolbar(ui);
        });

        if !self.read_only {
            let viewport_width = ctx.input(|i| i.screen_rect().width());
            let max_allowed = (viewport_width * 0.9).max(180.0);
            let clamped_width = self.settings.properties_panel_width.clamp(180.0, max_allowed);

            egui::SidePanel::right("properties_panel")
                .resizable(true)
                .default_width(clamped_width)
                .show(ctx, |ui| {
                    self.settings.properties_panel_width =
                        ui.available_width().clamp(180.0, max_allowed);
                    self.draw_properties_panel(ui);
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_canvas(ui);
        });

        self.draw_notifications(ctx);

        if let Some(deadline) = self.text_edits.next_deadline() {
            let wait = (deadline - now).max(0.0);
            ctx.request_repaint_after(std::time::Duration::from_secs_f64(wait));
        }
        if let Some(expiry) = self
            .notifications
            .iter()
            .map(|n| n.expires_at)
            .reduce(f64::min)
        {
            ctx.request_repaint_after(std::time::Duration::from_secs_f64((expiry - now).max(0.0)));
        }
    }
}

impl BibMapApp {
    fn draw_toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.read_only {
                ui.strong(&self.model.scene().title);
                ui.separator();
            } else {
                if ui.button("Open").clicked() {
                    self.open_bundle();
                }
                if ui.button("Save").clicked() {
                    self.save_bundle();
                }
                if ui.button("Export Site").clicked() {
                    self.export_site();
                }
                #[cfg(not(target_arch = "wasm32"))]
                if ui.button("Export PNG").clicked() {
                    self.export_png();
                }

                ui.separator();

                if ui.button("Add Node").clicked() {
                    let center = self.screen_to_world(self.canvas.origin + self.canvas.size / 2.0);
                    self.add_node_at(center.x, center.y);
                }
                let has_node = self.interaction.selected_node().is_some();
                let has_selection = has_node || self.interaction.selected_connection().is_some();
                if ui
                    .add_enabled(has_node, egui::Button::new("Connect"))
                    .on_hover_text("Drag from the selected node to another node (C)")
                    .clicked()
                {
                    self.interaction.start_connecting();
                }
                if ui
                    .add_enabled(has_selection, egui::Button::new("Duplicate"))
                    .clicked()
                {
                    self.duplicate_selection();
                }
                if ui
                    .add_enabled(has_selection, egui::Button::new("Delete"))
                    .clicked()
                {
                    self.delete_selection();
                }

                ui.separator();
            }

            if ui.button("−").on_hover_text("Zoom out").clicked() {
                self.zoom_centered(1.0 / crate::constants::ZOOM_STEP);
            }
            if ui.button("+").on_hover_text("Zoom in").clicked() {
                self.zoom_centered(crate::constants::ZOOM_STEP);
            }
            if ui.button("Fit").clicked() {
                self.fit_view();
            }
            if ui.button("Reset").clicked() {
                self.reset_view();
            }

            ui.separator();

            if !self.read_only {
                ui.checkbox(&mut self.settings.snap_to_grid, "Snap");
                ui.checkbox(&mut self.settings.show_grid, "Show Grid");
                ui.separator();
            }
            ui.checkbox(&mut self.settings.dark_mode, "Dark Mode");

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("Zoom: {:.0}%", self.canvas.view.scale * 100.0));
                if !self.read_only {
                    if let Some(path) = &self.file.current_path {
                        ui.label(path);
                    }
                    if self.model.has_unsent_changes() || !self.text_edits.is_empty() {
                        ui.label("Saving…");
                    }
                }
            });
        });
    }

    fn draw_notifications(&self, ctx: &egui::Context) {
        if self.notifications.is_empty() {
            return;
        }
        egui::Area::new(egui::Id::new("notifications"))
            .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -16.0))
            .order(egui::Order::Tooltip)
            .show(ctx, |ui| {
                for notification in &self.notifications {
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.label(&notification.message);
                    });
                }
            });
    }
}
