//! Application state structures.
//!
//! The app owns the open [`SceneModel`], the canvas view, the interaction state machine and
//! the plumbing that carries saves to the data store and results back: a local executor for
//! store futures, a channel drained once per frame, and a debouncer for text edits.

use super::interaction::{InteractionState, SnapSettings};
use crate::api::{dispatch, DataApi, SaveResult};
use crate::constants::{GRID_SIZE, NOTIFICATION_SECS, SAVE_DEBOUNCE_SECS};
use crate::debounce::Debouncer;
use crate::error::ApiError;
use crate::scene::SceneModel;
use crate::types::*;
use crate::view::ViewTransform;
use eframe::egui;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use uuid::Uuid;

/// Per-user editor preferences, persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Round dragged and nudged positions to the grid
    pub snap_to_grid: bool,
    pub grid_size: f32,
    pub show_grid: bool,
    pub dark_mode: bool,
    /// Remembered width of the properties panel
    pub properties_panel_width: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            snap_to_grid: false,
            grid_size: GRID_SIZE,
            show_grid: true,
            dark_mode: true,
            properties_panel_width: 300.0,
        }
    }
}

impl EditorSettings {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Canvas navigation state.
#[derive(Debug, Clone)]
pub struct CanvasState {
    pub view: ViewTransform,
    /// Top-left corner of the canvas in screen space, updated every frame
    pub origin: egui::Pos2,
    /// Size of the canvas in screen space, updated every frame
    pub size: egui::Vec2,
    /// Fit the scene on the next frame
    pub needs_fit: bool,
    pub is_panning: bool,
    pub last_pan_pos: Option<egui::Pos2>,
    /// A primary press started on the canvas and has not been released
    pub press_active: bool,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self {
            view: ViewTransform::IDENTITY,
            origin: egui::Pos2::ZERO,
            size: egui::Vec2::ZERO,
            needs_fit: true,
            is_panning: false,
            last_pan_pos: None,
            press_active: false,
        }
    }
}

/// A transient message shown over the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub expires_at: f64,
}

/// A text edit waiting for the typing to settle.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingEdit {
    Node(NodePatch),
    Connection(ConnectionPatch),
    Settings(SceneSettings),
}

impl PendingEdit {
    /// Folds a later edit of the same entity into this one.
    pub fn merge(&mut self, later: PendingEdit) {
        match (self, later) {
            (PendingEdit::Node(a), PendingEdit::Node(b)) => a.merge(b),
            (PendingEdit::Connection(a), PendingEdit::Connection(b)) => a.merge(b),
            (slot, later) => *slot = later,
        }
    }
}

/// References and media listed in the properties panel for one node.
#[derive(Debug, Clone, Default)]
pub struct ReferencePanel {
    pub node: Option<NodeId>,
    pub loading: bool,
    pub items: Vec<LinkedReference>,
    pub media: Vec<LinkedMedia>,
    pub error: Option<String>,
}

/// Pending file operations, started on the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingFileOperation {
    OpenBundle,
    SaveBundle,
    ExportSite,
    ExportPng,
}

/// Messages sent from file dialogs back to the main app.
#[derive(Debug)]
pub enum FileOperationResult {
    /// A bundle was picked: file name and contents
    BundleLoaded(String, String),
    BundleSaved(String),
    SiteExported(String),
    PngSaved(String),
    OperationFailed(String),
}

/// State related to file dialogs.
pub struct FileState {
    pub current_path: Option<String>,
    pub pending_operation: Option<PendingFileOperation>,
    pub file_operation_sender: Sender<FileOperationResult>,
    pub file_operation_receiver: Receiver<FileOperationResult>,
}

impl Default for FileState {
    fn default() -> Self {
        let (sender, receiver) = channel();
        Self {
            current_path: None,
            pending_operation: None,
            file_operation_sender: sender,
            file_operation_receiver: receiver,
        }
    }
}

/// Results of data store futures, delivered on the UI thread.
#[derive(Debug)]
pub enum TaskMessage {
    Saved(SaveResult),
    Links {
        node: NodeId,
        references: Result<Vec<LinkedReference>, ApiError>,
        media: Result<Vec<LinkedMedia>, ApiError>,
    },
    /// Per-node link lookups gathered for a static export
    ExportLinks(HashMap<NodeId, NodeLinks>),
    SceneLoaded(Result<Scene, String>),
}

/// Runs data store futures on the UI thread.
pub struct TaskRunner {
    #[cfg(not(target_arch = "wasm32"))]
    pool: futures::executor::LocalPool,
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self {
            #[cfg(not(target_arch = "wasm32"))]
            pool: futures::executor::LocalPool::new(),
        }
    }
}

impl TaskRunner {
    pub fn spawn(&mut self, task: impl Future<Output = ()> + 'static) {
        #[cfg(not(target_arch = "wasm32"))]
        {
            use futures::task::LocalSpawnExt;
            if let Err(err) = self.pool.spawner().spawn_local(task) {
                log::error!("Failed to spawn task: {err}");
            }
        }
        #[cfg(target_arch = "wasm32")]
        {
            wasm_bindgen_futures::spawn_local(task);
        }
    }

    /// Drives every task as far as it can go without blocking.
    pub fn run_until_stalled(&mut self) {
        #[cfg(not(target_arch = "wasm32"))]
        self.pool.run_until_stalled();
    }
}

/// The main application structure.
///
/// Implements `eframe::App`; see `ui/mod.rs` for the frame layout.
pub struct BibMapApp {
    pub model: SceneModel,
    pub api: Rc<dyn DataApi>,
    pub canvas: CanvasState,
    pub interaction: InteractionState,
    pub settings: EditorSettings,
    /// Public view: only navigation and callouts are bound
    pub read_only: bool,
    pub notifications: Vec<Notification>,
    pub text_edits: Debouncer<Uuid, PendingEdit>,
    pub references: ReferencePanel,
    pub file: FileState,
    pub tasks: TaskRunner,
    pub task_sender: Sender<TaskMessage>,
    pub task_receiver: Receiver<TaskMessage>,
    /// Counter for default node labels
    pub node_counter: u32,
    /// Time of the current frame, in seconds
    pub now: f64,
}

impl BibMapApp {
    /// Creates an editor for `scene`, persisting through `api`.
    pub fn new(api: Rc<dyn DataApi>, scene: Scene) -> Self {
        let (task_sender, task_receiver) = channel();
        log::info!(
            "Opening map '{}' with {} nodes and {} connections",
            scene.title,
            scene.nodes.len(),
            scene.connections.len()
        );
        Self {
            node_counter: scene.nodes.len() as u32,
            model: SceneModel::new(scene),
            api,
            canvas: CanvasState::default(),
            interaction: InteractionState::default(),
            settings: EditorSettings::default(),
            read_only: false,
            notifications: Vec::new(),
            text_edits: Debouncer::new(SAVE_DEBOUNCE_SECS),
            references: ReferencePanel::default(),
            file: FileState::default(),
            tasks: TaskRunner::default(),
            task_sender,
            task_receiver,
            now: 0.0,
        }
    }

    /// Creates a public, non-editable view of `scene`.
    pub fn new_read_only(api: Rc<dyn DataApi>, scene: Scene) -> Self {
        Self {
            read_only: true,
            ..Self::new(api, scene)
        }
    }

    pub fn snap_settings(&self) -> SnapSettings {
        SnapSettings {
            enabled: self.settings.snap_to_grid,
            grid_size: self.settings.grid_size,
        }
    }

    /// Shows a transient message.
    pub fn notify(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        self.notifications.push(Notification {
            message,
            expires_at: self.now + NOTIFICATION_SECS,
        });
    }

    /// Schedules a debounced edit; the local scene is expected to show it already.
    pub fn schedule_edit(&mut self, key: Uuid, edit: PendingEdit) {
        self.text_edits
            .schedule_with(key, edit, self.now, |pending, later| pending.merge(later));
    }

    /// Runs one round of background work at time `now`.
    ///
    /// Turns settled text edits into saves, sends every queued save, drives store futures and
    /// folds their results back into the scene.
    pub fn process_background(&mut self, now: f64) {
        self.now = now;
        let settled = self.text_edits.poll(now);
        self.persist_edits(settled);
        self.pump();
        self.notifications.retain(|n| n.expires_at > now);
    }

    /// Sends every pending edit immediately, without waiting for typing to settle.
    pub fn flush_edits(&mut self) {
        let pending = self.text_edits.flush_all();
        self.persist_edits(pending);
        self.pump();
    }

    fn persist_edits(&mut self, edits: Vec<(Uuid, PendingEdit)>) {
        for (id, edit) in edits {
            let queued = match edit {
                PendingEdit::Node(patch) => self.model.persist_node_patch(id, patch),
                PendingEdit::Connection(patch) => self.model.persist_connection_patch(id, patch),
                PendingEdit::Settings(settings) => {
                    self.model.update_settings(settings);
                    true
                }
            };
            if !queued {
                log::debug!("Dropping edit for missing entity {id}");
            }
        }
    }

    /// Dispatches queued saves and applies finished results until nothing changes.
    fn pump(&mut self) {
        loop {
            let requests = self.model.take_requests();
            for request in requests {
                let future = dispatch(self.api.as_ref(), request);
                let sender = self.task_sender.clone();
                self.tasks.spawn(async move {
                    let _ = sender.send(TaskMessage::Saved(future.await));
                });
            }
            self.tasks.run_until_stalled();
            if !self.handle_task_messages() {
                break;
            }
        }
    }

    /// Drains finished store futures. Returns true if anything was received.
    fn handle_task_messages(&mut self) -> bool {
        let mut received = false;
        while let Ok(message) = self.task_receiver.try_recv() {
            received = true;
            match message {
                TaskMessage::Saved(result) => self.apply_save_result(result),
                TaskMessage::Links {
                    node,
                    references,
                    media,
                } => {
                    if self.references.node != Some(node) {
                        continue;
                    }
                    let panel = &mut self.references;
                    panel.loading = false;
                    panel.error = None;
                    match references {
                        Ok(items) => panel.items = items,
                        Err(err) => panel.error = Some(err.to_string()),
                    }
                    match media {
                        Ok(items) => panel.media = items,
                        Err(err) => {
                            panel.error.get_or_insert_with(|| err.to_string());
                        }
                    }
                }
                TaskMessage::ExportLinks(lookup) => self.finish_site_export(lookup),
                TaskMessage::SceneLoaded(Ok(scene)) => self.replace_scene(scene),
                TaskMessage::SceneLoaded(Err(message)) => {
                    self.notify(format!("Failed to open map: {message}"))
                }
            }
        }
        received
    }

    fn apply_save_result(&mut self, result: SaveResult) {
        let outcome = self.model.apply_result(result);
        if let Some((old, new)) = outcome.remapped {
            self.interaction.remap_id(old, new);
            if let Some(edit) = self.text_edits.cancel(&old) {
                self.text_edits.schedule(new, edit, self.now);
            }
            if self.references.node == Some(old) {
                self.references.node = Some(new);
            }
        }
        if let Some(message) = outcome.notification {
            self.notify(message);
        }
        self.interaction.prune(&self.model);
    }

    /// Swaps in a freshly loaded scene, dropping selection and view.
    pub fn replace_scene(&mut self, scene: Scene) {
        self.flush_edits();
        self.node_counter = scene.nodes.len() as u32;
        self.model = SceneModel::new(scene);
        self.interaction = InteractionState::default();
        self.references = ReferencePanel::default();
        self.canvas.needs_fit = true;
    }

    /// Starts loading the references and media linked to `node` into the properties panel.
    pub fn load_references(&mut self, node: NodeId) {
        self.references = ReferencePanel {
            node: Some(node),
            loading: true,
            ..Default::default()
        };
        let references = self.api.node_references(node);
        let media = self.api.node_media(node);
        let sender = self.task_sender.clone();
        self.tasks.spawn(async move {
            let (references, media) = futures::future::join(references, media).await;
            let _ = sender.send(TaskMessage::Links {
                node,
                references,
                media,
            });
        });
        self.pump();
    }

    /// Adds a node with default styling at the given map position.
    pub fn add_node_at(&mut self, x: f32, y: f32) -> NodeId {
        self.node_counter += 1;
        let template = Node::new(format!("Node {}", self.node_counter), (x, y));
        let id = self.model.add_node(template);
        self.interaction.select_node(id);
        id
    }

    /// Duplicates whatever is selected and selects the copy.
    pub fn duplicate_selection(&mut self) {
        if let Some(id) = self.interaction.selected_node() {
            if let Some(copy) = self.model.duplicate_node(id) {
                self.interaction.select_node(copy);
            }
        } else if let Some(id) = self.interaction.selected_connection() {
            if let Some(copy) = self.model.duplicate_connection(id) {
                self.interaction.select_connection(copy);
            }
        }
    }

    /// Deletes whatever is selected.
    pub fn delete_selection(&mut self) {
        if let Some(id) = self.interaction.selected_node() {
            self.text_edits.cancel(&id);
            self.model.delete_node(id);
        } else if let Some(id) = self.interaction.selected_connection() {
            self.text_edits.cancel(&id);
            self.model.delete_connection(id);
        }
        self.interaction.clear();
        self.interaction.prune(&self.model);
    }

    /// Toggles publication; reverted automatically if the store rejects it.
    pub fn set_published(&mut self, published: bool) {
        self.model.set_published(published);
    }
}
