//! # BibMap Canvas
//!
//! Diagram engine and editor for bibliography maps: styled nodes anchored to bibliographic
//! references, joined by connections, rendered interactively with egui and exported as a
//! self-contained static site.
//!
//! ## Layout
//! - [`types`], [`geometry`], [`view`], [`legend`]: data model and pure geometry
//! - [`render`]: the shared draw-command list consumed by both the canvas and the exporters
//! - [`scene`], [`api`], [`debounce`]: optimistic editing and persistence through [`api::DataApi`]
//! - [`bundle`], [`export`]: `.bibmap` bundles, static HTML/SVG sites and PNG snapshots
//! - [`ui`]: the eframe application

#![deny(unsafe_code)]

pub mod api;
pub mod bundle;
pub mod constants;
pub mod debounce;
pub mod error;
pub mod export;
pub mod geometry;
pub mod legend;
pub mod render;
pub mod scene;
pub mod types;
pub mod ui;
pub mod view;

pub use ui::BibMapApp;

#[cfg(not(target_arch = "wasm32"))]
use std::path::PathBuf;

/// Runs the editor on a local in-memory store.
///
/// # Arguments
///
/// * `bundle` - Optional `.bibmap` file to open; an empty map is created otherwise
/// * `read_only` - Open the public viewer instead of the editor
///
/// # Returns
///
/// Returns `Ok(())` if the application runs successfully, or an `eframe::Error` if
/// initialization fails.
///
/// # Example
///
/// ```no_run
/// fn main() -> Result<(), eframe::Error> {
///     bibmap_canvas::run_app(None, false)
/// }
/// ```
#[cfg(not(target_arch = "wasm32"))]
pub fn run_app(bundle: Option<PathBuf>, read_only: bool) -> Result<(), eframe::Error> {
    use crate::api::{DataApi, InMemoryApi};
    use crate::bundle::MapBundle;
    use crate::types::Scene;
    use std::rc::Rc;

    let scene = match bundle {
        Some(path) => match MapBundle::load(&path) {
            Ok(bundle) => bundle.to_scene(),
            Err(err) => {
                log::error!("Failed to open {}: {err}", path.display());
                Scene::new("Untitled map")
            }
        },
        None => Scene::new("Untitled map"),
    };
    let store = InMemoryApi::new();
    store.insert_scene(scene.clone());
    let api: Rc<dyn DataApi> = Rc::new(store);

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "BibMap",
        options,
        Box::new(move |cc| {
            let mut app = if read_only {
                BibMapApp::new_read_only(api, scene)
            } else {
                BibMapApp::new(api, scene)
            };
            app.restore_settings(cc.storage);
            Ok(Box::new(app))
        }),
    )
}
