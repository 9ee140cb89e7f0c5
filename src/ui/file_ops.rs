//! File operations: `.bibmap` bundles, static site export and PNG export.
//!
//! Native builds use rfd dialogs on the tokio runtime; the browser build picks files through
//! rfd as well and saves by triggering downloads.

use super::state::{BibMapApp, FileOperationResult, PendingFileOperation, TaskMessage};
use crate::bundle::{generate_filename, import_bundle, MapBundle, BUNDLE_EXTENSION};
use crate::export::{export_static_site, LinkSource};
use crate::types::{NodeId, NodeLinks};
use eframe::egui;
use std::collections::HashMap;

impl BibMapApp {
    /// Handles pending file operations for both native and WASM platforms.
    ///
    /// Processes completed dialog results from the channel, then starts whatever operation
    /// the toolbar queued this frame.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The egui context for requesting repaints
    pub fn handle_pending_operations(&mut self, ctx: &egui::Context) {
        while let Ok(result) = self.file.file_operation_receiver.try_recv() {
            match result {
                FileOperationResult::BundleLoaded(path, content) => {
                    self.import_bundle_contents(&content);
                    self.file.current_path = Some(path);
                }
                FileOperationResult::BundleSaved(path) => {
                    self.notify(format!("Saved {path}"));
                    self.file.current_path = Some(path);
                }
                FileOperationResult::SiteExported(path) => {
                    self.notify(format!("Exported site to {path}"))
                }
                FileOperationResult::PngSaved(path) => self.notify(format!("Saved {path}")),
                FileOperationResult::OperationFailed(error) => {
                    log::error!("File operation failed: {error}");
                    self.notify(error);
                }
            }
        }

        let Some(operation) = self.file.pending_operation.take() else {
            return;
        };
        match operation {
            PendingFileOperation::OpenBundle => self.start_open_bundle(ctx),
            PendingFileOperation::SaveBundle => self.start_save_bundle(ctx),
            PendingFileOperation::ExportSite => self.start_site_export(),
            PendingFileOperation::ExportPng => self.start_png_export(ctx),
        }
    }

    /// Queues the open dialog for the next frame.
    pub fn open_bundle(&mut self) {
        self.file.pending_operation = Some(PendingFileOperation::OpenBundle);
    }

    pub fn save_bundle(&mut self) {
        self.file.pending_operation = Some(PendingFileOperation::SaveBundle);
    }

    pub fn export_site(&mut self) {
        self.file.pending_operation = Some(PendingFileOperation::ExportSite);
    }

    pub fn export_png(&mut self) {
        self.file.pending_operation = Some(PendingFileOperation::ExportPng);
    }

    fn start_open_bundle(&mut self, ctx: &egui::Context) {
        let ctx = ctx.clone();
        let sender = self.file.file_operation_sender.clone();
        let task = async move {
            if let Some(handle) = rfd::AsyncFileDialog::new()
                .add_filter("BibMap", &[BUNDLE_EXTENSION, "json"])
                .pick_file()
                .await
            {
                let name = handle.file_name();
                let bytes = handle.read().await;
                let message = match String::from_utf8(bytes) {
                    Ok(content) => FileOperationResult::BundleLoaded(name, content),
                    Err(e) => {
                        FileOperationResult::OperationFailed(format!("Failed to read {name}: {e}"))
                    }
                };
                let _ = sender.send(message);
            }
            ctx.request_repaint();
        };

        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(task);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(task);
    }

    /// Imports a bundle into the open map, then reloads the map from the store.
    ///
    /// Bundle nodes and connections get fresh ids, so importing the same file twice adds a
    /// second copy rather than overwriting anything.
    pub fn import_bundle_contents(&mut self, content: &str) {
        let bundle = match MapBundle::from_json(content) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.notify(format!("Failed to open map: {e}"));
                return;
            }
        };
        self.flush_edits();

        let api = self.api.clone();
        let scene_id = self.model.id();
        let sender = self.task_sender.clone();
        self.tasks.spawn(async move {
            let loaded = match import_bundle(api.as_ref(), scene_id, &bundle).await {
                Ok(_) => api.get_scene(scene_id).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            let _ = sender.send(TaskMessage::SceneLoaded(loaded));
        });
        self.process_background(self.now);
    }

    fn start_save_bundle(&mut self, ctx: &egui::Context) {
        let json = match MapBundle::from_scene(self.model.scene()).to_json() {
            Ok(json) => json,
            Err(e) => {
                self.notify(format!("Failed to save map: {e}"));
                return;
            }
        };
        let filename = generate_filename(&self.model.scene().title);
        let sender = self.file.file_operation_sender.clone();

        #[cfg(target_arch = "wasm32")]
        {
            let message = match Self::trigger_download(&filename, &json, "application/json") {
                Ok(()) => FileOperationResult::BundleSaved(filename),
                Err(e) => FileOperationResult::OperationFailed(e),
            };
            let _ = sender.send(message);
            ctx.request_repaint();
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                if let Some(handle) = rfd::AsyncFileDialog::new()
                    .add_filter("BibMap", &[BUNDLE_EXTENSION])
                    .set_file_name(&filename)
                    .save_file()
                    .await
                {
                    let path = handle.path();
                    let message = match std::fs::write(path, json) {
                        Ok(()) => FileOperationResult::BundleSaved(path.display().to_string()),
                        Err(e) => {
                            FileOperationResult::OperationFailed(format!("Failed to save map: {e}"))
                        }
                    };
                    let _ = sender.send(message);
                }
                ctx.request_repaint();
            });
        }
    }

    /// Gathers each linked node's references and media, then finishes in
    /// [`Self::finish_site_export`].
    fn start_site_export(&mut self) {
        let linked: Vec<NodeId> = self
            .model
            .nodes()
            .iter()
            .filter(|n| n.link_to_references)
            .map(|n| n.id)
            .collect();
        let lookups: Vec<_> = linked
            .iter()
            .map(|&id| {
                let references = self.api.node_references(id);
                let media = self.api.node_media(id);
                async move { (id, futures::future::join(references, media).await) }
            })
            .collect();
        let sender = self.task_sender.clone();
        self.tasks.spawn(async move {
            let mut lookup = HashMap::new();
            for (id, (references, media)) in futures::future::join_all(lookups).await {
                let references = references.unwrap_or_else(|err| {
                    log::warn!("Exporting node {id} without references: {err}");
                    Vec::new()
                });
                let media = media.unwrap_or_else(|err| {
                    log::warn!("Exporting node {id} without media: {err}");
                    Vec::new()
                });
                lookup.insert(id, NodeLinks { references, media });
            }
            let _ = sender.send(TaskMessage::ExportLinks(lookup));
        });
    }

    /// Builds the static site once link lookups are in and hands it to the user.
    pub fn finish_site_export(&mut self, lookup: HashMap<NodeId, NodeLinks>) {
        let site = export_static_site(self.model.scene(), LinkSource::Lookup(&lookup));
        let sender = self.file.file_operation_sender.clone();

        #[cfg(target_arch = "wasm32")]
        {
            let result = ["index.html", "map.svg"].into_iter().try_for_each(|name| {
                let mime = if name.ends_with(".svg") {
                    "image/svg+xml"
                } else {
                    "text/html"
                };
                let content = site.get(name).unwrap_or_default();
                Self::trigger_download(name, content, mime)
            });
            let message = match result {
                Ok(()) => FileOperationResult::SiteExported("index.html".to_string()),
                Err(e) => FileOperationResult::OperationFailed(e),
            };
            let _ = sender.send(message);
        }

        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(async move {
            if let Some(handle) = rfd::AsyncFileDialog::new().pick_folder().await {
                let dir = handle.path();
                let message = match site.write_to_dir(dir) {
                    Ok(()) => FileOperationResult::SiteExported(dir.display().to_string()),
                    Err(e) => FileOperationResult::OperationFailed(format!("Export failed: {e}")),
                };
                let _ = sender.send(message);
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn start_png_export(&mut self, ctx: &egui::Context) {
        use crate::export::png::render_png;
        use crate::export::svg::{build_svg, SvgOptions};
        use crate::render::{render_scene, RenderOptions};

        let scene = self.model.scene();
        let rendered = render_scene(
            scene,
            &RenderOptions::read_only(scene.settings().show_patterns),
        );
        let document = build_svg(scene, &rendered, &SvgOptions::default());
        let filename = generate_filename(&scene.title);
        let filename = format!(
            "{}.png",
            filename.trim_end_matches(&format!(".{BUNDLE_EXTENSION}"))
        );
        let sender = self.file.file_operation_sender.clone();
        let ctx = ctx.clone();

        tokio::spawn(async move {
            let Some(handle) = rfd::AsyncFileDialog::new()
                .add_filter("PNG", &["png"])
                .set_file_name(&filename)
                .save_file()
                .await
            else {
                return;
            };
            let path = handle.path().to_path_buf();
            let message = match render_png(&document, 2.0) {
                Ok(bytes) => match std::fs::write(&path, bytes) {
                    Ok(()) => FileOperationResult::PngSaved(path.display().to_string()),
                    Err(e) => FileOperationResult::OperationFailed(format!("Failed to save PNG: {e}")),
                },
                Err(e) => FileOperationResult::OperationFailed(e.to_string()),
            };
            let _ = sender.send(message);
            ctx.request_repaint();
        });
    }

    #[cfg(target_arch = "wasm32")]
    fn start_png_export(&mut self, _ctx: &egui::Context) {
        self.notify("PNG export is only available in the desktop app");
    }

    /// Triggers a file download in the browser (WASM only).
    ///
    /// Creates a temporary anchor element with a blob URL and clicks it.
    ///
    /// # Arguments
    ///
    /// * `filename` - The name to give the downloaded file
    /// * `content` - The content to write to the file
    /// * `mime` - Blob content type
    ///
    /// # Returns
    ///
    /// `Ok(())` if successful, or an error message if the operation fails.
    #[cfg(target_arch = "wasm32")]
    fn trigger_download(filename: &str, content: &str, mime: &str) -> Result<(), String> {
        use eframe::wasm_bindgen::{JsCast, JsValue};

        let window = web_sys::window().ok_or("No window found")?;
        let document = window.document().ok_or("No document found")?;

        let blob_parts = js_sys::Array::new();
        blob_parts.push(&JsValue::from_str(content));

        let blob_options = web_sys::BlobPropertyBag::new();
        blob_options.set_type(mime);

        let blob = web_sys::Blob::new_with_str_sequence_and_options(&blob_parts, &blob_options)
            .map_err(|_| "Failed to create blob")?;
        let url = web_sys::Url::create_object_url_with_blob(&blob)
            .map_err(|_| "Failed to create object URL")?;

        let anchor = document
            .create_element("a")
            .map_err(|_| "Failed to create anchor element")?
            .dyn_into::<web_sys::HtmlAnchorElement>()
            .map_err(|_| "Failed to cast to anchor element")?;
        anchor.set_href(&url);
        anchor.set_download(filename);
        anchor.style().set_property("display", "none").ok();

        let body = document.body().ok_or("No body found")?;
        body.append_child(&anchor)
            .map_err(|_| "Failed to append anchor")?;
        anchor.click();
        body.remove_child(&anchor)
            .map_err(|_| "Failed to remove anchor")?;

        web_sys::Url::revoke_object_url(&url).map_err(|_| "Failed to revoke object URL")?;
        Ok(())
    }
}
