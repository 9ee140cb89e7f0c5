//! Canvas interaction state machine.
//!
//! Pointer and keyboard input arrives here already translated to map coordinates, so every
//! transition can be driven from tests without an egui context. The machine only mutates the
//! scene through [`SceneModel`], which queues the matching saves.

use crate::constants::DESCRIPTION_ICON_RADIUS;
use crate::geometry::Point;
use crate::render::{description_icon_center, resize_handle_rect};
use crate::scene::SceneModel;
use crate::types::{Connection, ConnectionId, NodeId};
use uuid::Uuid;

/// Current editing mode.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Mode {
    #[default]
    Idle,
    NodeSelected(NodeId),
    ConnectionSelected(ConnectionId),
    /// Drawing a new connection out of `source`; `pointer` is the preview end
    Connecting { source: NodeId, pointer: Option<Point> },
    /// Dragging the resize handle of `node`; `grab` is the bottom-right corner minus the
    /// pointer at press time
    Resizing { node: NodeId, grab: Point },
}

/// What lies under the pointer, topmost first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    DescriptionIcon(NodeId),
    ResizeHandle(NodeId),
    Node(NodeId),
    Connection(ConnectionId),
    Background,
}

/// Keyboard commands understood by the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCommand {
    Escape,
    FocusNext,
    FocusPrevious,
    /// Move the selected node by whole grid steps
    Nudge { dx: i32, dy: i32 },
    Delete,
    Connect,
}

/// Input events in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanvasEvent {
    PointerDown(Point),
    PointerMove(Point),
    PointerUp(Point),
    Key(KeyCommand),
}

/// Grid behavior applied to drags and nudges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapSettings {
    pub enabled: bool,
    pub grid_size: f32,
}

impl SnapSettings {
    pub fn snap(&self, value: f32) -> f32 {
        if self.enabled && self.grid_size > 0.0 {
            (value / self.grid_size).round() * self.grid_size
        } else {
            value
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NodeDrag {
    node: NodeId,
    /// Pointer position relative to the node origin when the drag started
    grab: Point,
    moved: bool,
}

/// Selection, gesture transients and the open description callout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    mode: Mode,
    drag: Option<NodeDrag>,
    /// Background press that should pan the view until release
    panning: bool,
    open_callout: Option<NodeId>,
}

/// Finds what lies under `point`.
///
/// Description icons and the selected node's resize handle sit on top of node bodies;
/// nodes sit on top of connections.
///
/// # Arguments
///
/// * `model` - The scene to test against
/// * `point` - Pointer position in map coordinates
/// * `scale` - Current zoom, used to keep connection hit tolerance constant on screen
/// * `selected` - The selected node, which exposes a resize handle
pub fn hit_test(model: &SceneModel, point: Point, scale: f32, selected: Option<NodeId>) -> Hit {
    if let Some(node) = selected.and_then(|id| model.node(id)) {
        if resize_handle_rect(node).contains(point) {
            return Hit::ResizeHandle(node.id);
        }
    }
    let icon_hit = model.nodes().iter().rev().find(|node| {
        node.description_text().is_some()
            && description_icon_center(node).distance(point) <= DESCRIPTION_ICON_RADIUS
    });
    if let Some(node) = icon_hit {
        return Hit::DescriptionIcon(node.id);
    }
    if let Some(id) = model.node_at(point) {
        return Hit::Node(id);
    }
    if let Some(id) = model.connection_at(point, scale) {
        return Hit::Connection(id);
    }
    Hit::Background
}

impl InteractionState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected_node(&self) -> Option<NodeId> {
        match self.mode {
            Mode::NodeSelected(id) | Mode::Resizing { node: id, .. } => Some(id),
            Mode::Connecting { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn selected_connection(&self) -> Option<ConnectionId> {
        match self.mode {
            Mode::ConnectionSelected(id) => Some(id),
            _ => None,
        }
    }

    /// Source and pointer of an in-progress connect gesture, for the preview line.
    pub fn connect_preview(&self) -> Option<(NodeId, Point)> {
        match self.mode {
            Mode::Connecting {
                source,
                pointer: Some(pointer),
            } => Some((source, pointer)),
            _ => None,
        }
    }

    pub fn is_panning(&self) -> bool {
        self.panning
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some() || matches!(self.mode, Mode::Resizing { .. })
    }

    pub fn open_callout(&self) -> Option<NodeId> {
        self.open_callout
    }

    pub fn select_node(&mut self, id: NodeId) {
        self.mode = Mode::NodeSelected(id);
    }

    pub fn select_connection(&mut self, id: ConnectionId) {
        self.mode = Mode::ConnectionSelected(id);
    }

    /// Drops every selection and gesture.
    pub fn clear(&mut self) {
        self.mode = Mode::Idle;
        self.drag = None;
        self.panning = false;
    }

    /// Enters connect mode from the selected node. Returns false when no node is selected.
    pub fn start_connecting(&mut self) -> bool {
        match self.mode {
            Mode::NodeSelected(source) => {
                log::debug!("Connecting from {source}");
                self.mode = Mode::Connecting {
                    source,
                    pointer: None,
                };
                true
            }
            _ => false,
        }
    }

    /// Opens the callout for `node`, or closes it if it is already open.
    pub fn toggle_callout(&mut self, node: NodeId) {
        self.open_callout = match self.open_callout {
            Some(open) if open == node => None,
            _ => Some(node),
        };
    }

    pub fn close_callout(&mut self) {
        self.open_callout = None;
    }

    /// The view transform changed: any open callout would be misplaced.
    pub fn on_view_changed(&mut self) {
        self.close_callout();
    }

    /// Follows a placeholder id being replaced by the store's id.
    pub fn remap_id(&mut self, old: Uuid, new: Uuid) {
        let swap = |id: &mut Uuid| {
            if *id == old {
                *id = new;
            }
        };
        match &mut self.mode {
            Mode::Idle => {}
            Mode::NodeSelected(id) | Mode::ConnectionSelected(id) => swap(id),
            Mode::Connecting { source, .. } => swap(source),
            Mode::Resizing { node, .. } => swap(node),
        }
        if let Some(drag) = &mut self.drag {
            swap(&mut drag.node);
        }
        if let Some(id) = &mut self.open_callout {
            swap(id);
        }
    }

    /// Drops selection that points at entities no longer in the scene.
    pub fn prune(&mut self, model: &SceneModel) {
        let gone = match self.mode {
            Mode::Idle => false,
            Mode::NodeSelected(id) | Mode::Resizing { node: id, .. } => model.node(id).is_none(),
            Mode::Connecting { source, .. } => model.node(source).is_none(),
            Mode::ConnectionSelected(id) => model.connection(id).is_none(),
        };
        if gone {
            self.clear();
        }
        if self.open_callout.is_some_and(|id| model.node(id).is_none()) {
            self.open_callout = None;
        }
    }

    /// Feeds one event through the state machine.
    ///
    /// # Arguments
    ///
    /// * `model` - Scene receiving any resulting mutation
    /// * `event` - The input event
    /// * `scale` - Current zoom factor
    /// * `snap` - Grid snapping for drags and nudges
    pub fn handle(
        &mut self,
        model: &mut SceneModel,
        event: CanvasEvent,
        scale: f32,
        snap: SnapSettings,
    ) {
        match event {
            CanvasEvent::PointerDown(point) => self.pointer_down(model, point, scale),
            CanvasEvent::PointerMove(point) => self.pointer_move(model, point, snap),
            CanvasEvent::PointerUp(point) => self.pointer_up(model, point, scale),
            CanvasEvent::Key(key) => self.key(model, key, snap),
        }
    }

    fn pointer_down(&mut self, model: &SceneModel, point: Point, scale: f32) {
        if let Mode::Connecting { source, .. } = self.mode {
            self.mode = Mode::Connecting {
                source,
                pointer: Some(point),
            };
            return;
        }

        match hit_test(model, point, scale, self.selected_node()) {
            Hit::DescriptionIcon(id) => self.toggle_callout(id),
            Hit::ResizeHandle(id) => {
                log::debug!("Resizing {id}");
                if let Some(node) = model.node(id) {
                    let corner = Point::new(node.x + node.width, node.y + node.height);
                    self.mode = Mode::Resizing {
                        node: id,
                        grab: corner - point,
                    };
                }
                self.close_callout();
            }
            Hit::Node(id) => {
                self.mode = Mode::NodeSelected(id);
                self.close_callout();
                if let Some(node) = model.node(id) {
                    self.drag = Some(NodeDrag {
                        node: id,
                        grab: point - node.origin(),
                        moved: false,
                    });
                }
            }
            Hit::Connection(id) => {
                self.mode = Mode::ConnectionSelected(id);
                self.close_callout();
            }
            Hit::Background => {
                self.mode = Mode::Idle;
                self.close_callout();
                self.panning = true;
            }
        }
    }

    fn pointer_move(&mut self, model: &mut SceneModel, point: Point, snap: SnapSettings) {
        match self.mode {
            Mode::Connecting { source, .. } => {
                self.mode = Mode::Connecting {
                    source,
                    pointer: Some(point),
                };
            }
            Mode::Resizing { node, grab } => {
                if let Some(origin) = model.node(node).map(|n| n.origin()) {
                    let corner = point + grab;
                    model.set_node_size(node, corner.x - origin.x, corner.y - origin.y);
                }
            }
            _ => {
                if let Some(drag) = &mut self.drag {
                    let target = point - drag.grab;
                    let (x, y) = (snap.snap(target.x), snap.snap(target.y));
                    let unchanged = model
                        .node(drag.node)
                        .is_some_and(|n| n.x == x && n.y == y);
                    if !unchanged && model.set_node_position(drag.node, x, y) {
                        drag.moved = true;
                    }
                }
            }
        }
    }

    fn pointer_up(&mut self, model: &mut SceneModel, point: Point, scale: f32) {
        self.panning = false;
        if self.finish_gesture(model) {
            return;
        }

        match self.mode {
            Mode::Connecting { source, pointer } => {
                // a release without any press since entering connect mode is not a drop
                if pointer.is_none() {
                    return;
                }
                self.finish_connecting(model, source, point, scale);
            }
            _ => {}
        }
    }

    fn finish_connecting(
        &mut self,
        model: &mut SceneModel,
        source: NodeId,
        point: Point,
        scale: f32,
    ) {
        let target = match hit_test(model, point, scale, None) {
            Hit::Node(id) | Hit::DescriptionIcon(id) if id != source => id,
            Hit::Node(_) | Hit::DescriptionIcon(_) => {
                log::debug!("Connect released over its own source; cancelled");
                self.mode = Mode::NodeSelected(source);
                return;
            }
            _ => {
                log::debug!("Connect released over empty canvas; cancelled");
                self.mode = Mode::Idle;
                return;
            }
        };
        let Some(origin) = model.node(target).map(|n| n.origin()) else {
            self.mode = Mode::Idle;
            return;
        };

        let mut template = Connection::new(source, target);
        template.target_attach_x = Some(point.x - origin.x);
        template.target_attach_y = Some(point.y - origin.y);
        self.mode = match model.add_connection(template) {
            Some(id) => Mode::ConnectionSelected(id),
            None => Mode::NodeSelected(source),
        };
    }

    /// Ends an in-progress drag or resize, persisting whatever it already changed.
    ///
    /// Returns true if there was one. Leaves the node selected.
    fn finish_gesture(&mut self, model: &mut SceneModel) -> bool {
        if let Some(drag) = self.drag.take() {
            if drag.moved {
                model.commit_node_position(drag.node);
            }
            return true;
        }
        if let Mode::Resizing { node, .. } = self.mode {
            model.commit_node_size(node);
            self.mode = Mode::NodeSelected(node);
            return true;
        }
        false
    }

    fn key(&mut self, model: &mut SceneModel, key: KeyCommand, snap: SnapSettings) {
        self.finish_gesture(model);
        match key {
            KeyCommand::Escape => {
                self.clear();
                self.close_callout();
            }
            KeyCommand::FocusNext => self.cycle_focus(model, true),
            KeyCommand::FocusPrevious => self.cycle_focus(model, false),
            KeyCommand::Nudge { dx, dy } => {
                if let Mode::NodeSelected(id) = self.mode {
                    if let Some(node) = model.node(id) {
                        let step = if snap.grid_size > 0.0 { snap.grid_size } else { 1.0 };
                        let x = snap.snap(node.x + dx as f32 * step);
                        let y = snap.snap(node.y + dy as f32 * step);
                        model.move_node(id, x, y);
                    }
                }
            }
            KeyCommand::Delete => match self.mode {
                Mode::NodeSelected(id) => {
                    model.delete_node(id);
                    self.clear();
                    self.prune(model);
                }
                Mode::ConnectionSelected(id) => {
                    model.delete_connection(id);
                    self.clear();
                }
                _ => {}
            },
            KeyCommand::Connect => {
                self.start_connecting();
            }
        }
    }

    fn cycle_focus(&mut self, model: &SceneModel, forward: bool) {
        let ids = model.node_ids();
        if ids.is_empty() {
            return;
        }
        let current = self
            .selected_node()
            .and_then(|id| ids.iter().position(|n| *n == id));
        let next = match (current, forward) {
            (None, true) => 0,
            (None, false) => ids.len() - 1,
            (Some(i), true) => (i + 1) % ids.len(),
            (Some(i), false) => (i + ids.len() - 1) % ids.len(),
        };
        self.mode = Mode::NodeSelected(ids[next]);
    }
}
