//! Scene model: the single source of truth both renderers draw from.
//!
//! Every mutation is applied optimistically to the in-memory scene and described as a
//! [`SaveRequest`] queued for the data store. Entities created locally carry a placeholder id
//! until the store answers; requests that refer to such an entity are held back and released,
//! with the id rewritten, once the store has assigned the real one.

use crate::api::{SaveRequest, SaveResult, Saved};
use crate::constants::{CLICK_THRESHOLD, DUPLICATE_OFFSET};
use crate::geometry::{connection_path, node_outline, point_to_segment_distance, Point};
use crate::types::*;
use std::collections::HashSet;
use uuid::Uuid;

/// What folding a [`SaveResult`] into the scene changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOutcome {
    /// A placeholder id that was replaced by the store's id, as `(local, server)`
    pub remapped: Option<(Uuid, Uuid)>,
    /// User-facing message for a failed save
    pub notification: Option<String>,
}

/// Live nodes and connections of one open scene.
#[derive(Debug, Clone)]
pub struct SceneModel {
    scene: Scene,
    outbox: Vec<SaveRequest>,
    deferred: Vec<SaveRequest>,
    pending_creates: HashSet<Uuid>,
}

impl SceneModel {
    /// Takes ownership of a loaded scene, raising any undersized node to the minimum size.
    pub fn new(mut scene: Scene) -> Self {
        for node in &mut scene.nodes {
            node.set_size(node.width, node.height);
        }
        Self {
            scene,
            outbox: Vec::new(),
            deferred: Vec::new(),
            pending_creates: HashSet::new(),
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn id(&self) -> SceneId {
        self.scene.id
    }

    pub fn nodes(&self) -> &[Node] {
        &self.scene.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.scene.connections
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.scene.node(id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.scene.connection(id)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.scene.nodes.iter_mut().find(|n| n.id == id)
    }

    fn connection_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.scene.connections.iter_mut().find(|c| c.id == id)
    }

    /// Takes every request ready to be sent to the store.
    pub fn take_requests(&mut self) -> Vec<SaveRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// True when saves are queued or held back behind a pending create.
    pub fn has_unsent_changes(&self) -> bool {
        !self.outbox.is_empty() || !self.deferred.is_empty()
    }

    fn queue(&mut self, request: SaveRequest) {
        let blocked = request
            .referenced_ids()
            .iter()
            .any(|id| self.pending_creates.contains(id));
        if blocked {
            log::debug!("Holding back {} until create completes", request.describe());
            self.deferred.push(request);
        } else {
            self.outbox.push(request);
        }
    }

    /// Adds a node built from `template`; the store will assign its final id.
    pub fn add_node(&mut self, template: Node) -> NodeId {
        let mut node = template;
        node.id = Uuid::new_v4();
        node.set_size(node.width, node.height);
        let id = node.id;
        self.pending_creates.insert(id);
        self.scene.nodes.push(node.clone());
        self.outbox.push(SaveRequest::CreateNode {
            scene_id: self.scene.id,
            local_id: id,
            node,
        });
        id
    }

    /// Adds a connection built from `template`.
    ///
    /// Returns `None` without queuing anything if an endpoint is missing or both endpoints
    /// are the same node.
    pub fn add_connection(&mut self, template: Connection) -> Option<ConnectionId> {
        if template.source_node_id == template.target_node_id {
            log::debug!("Ignoring self-connection on {}", template.source_node_id);
            return None;
        }
        self.node(template.source_node_id)?;
        self.node(template.target_node_id)?;

        let mut connection = template;
        connection.id = Uuid::new_v4();
        let id = connection.id;
        self.scene.connections.push(connection.clone());
        self.queue(SaveRequest::CreateConnection {
            scene_id: self.scene.id,
            local_id: id,
            connection,
        });
        self.pending_creates.insert(id);
        Some(id)
    }

    /// Moves a node without persisting (live drag).
    pub fn set_node_position(&mut self, id: NodeId, x: f32, y: f32) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.x = x;
                node.y = y;
                true
            }
            None => false,
        }
    }

    /// Persists a node's current position.
    pub fn commit_node_position(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let request = SaveRequest::MoveNode {
            id,
            x: node.x,
            y: node.y,
        };
        self.queue(request);
        true
    }

    /// Moves a node and persists the new position immediately.
    pub fn move_node(&mut self, id: NodeId, x: f32, y: f32) -> bool {
        self.set_node_position(id, x, y) && self.commit_node_position(id)
    }

    /// Resizes a node without persisting (live resize). The size is clamped to the minimum.
    pub fn set_node_size(&mut self, id: NodeId, width: f32, height: f32) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.set_size(width, height);
                true
            }
            None => false,
        }
    }

    /// Persists a node's current size.
    pub fn commit_node_size(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let request = SaveRequest::ResizeNode {
            id,
            width: node.width,
            height: node.height,
        };
        self.queue(request);
        true
    }

    /// Applies a partial update locally without persisting.
    pub fn apply_node_patch(&mut self, id: NodeId, patch: &NodePatch) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                patch.apply_to(node);
                true
            }
            None => false,
        }
    }

    /// Queues a partial update that was already applied locally.
    pub fn persist_node_patch(&mut self, id: NodeId, patch: NodePatch) -> bool {
        if self.node(id).is_none() {
            return false;
        }
        self.queue(SaveRequest::UpdateNode { id, patch });
        true
    }

    /// Applies and persists a partial update.
    pub fn update_node(&mut self, id: NodeId, patch: NodePatch) -> bool {
        self.apply_node_patch(id, &patch) && self.persist_node_patch(id, patch)
    }

    pub fn apply_connection_patch(&mut self, id: ConnectionId, patch: &ConnectionPatch) -> bool {
        match self.connection_mut(id) {
            Some(connection) => {
                patch.apply_to(connection);
                true
            }
            None => false,
        }
    }

    pub fn persist_connection_patch(&mut self, id: ConnectionId, patch: ConnectionPatch) -> bool {
        if self.connection(id).is_none() {
            return false;
        }
        self.queue(SaveRequest::UpdateConnection { id, patch });
        true
    }

    pub fn update_connection(&mut self, id: ConnectionId, patch: ConnectionPatch) -> bool {
        self.apply_connection_patch(id, &patch) && self.persist_connection_patch(id, patch)
    }

    /// Deletes a node together with every connection touching it, as one update.
    ///
    /// # Returns
    ///
    /// The ids of the removed connections, or `None` if the node does not exist
    pub fn delete_node(&mut self, id: NodeId) -> Option<Vec<ConnectionId>> {
        self.node(id)?;
        let removed: Vec<ConnectionId> = self
            .scene
            .connections
            .iter()
            .filter(|c| c.touches(id))
            .map(|c| c.id)
            .collect();

        self.scene.nodes.retain(|n| n.id != id);
        self.scene.connections.retain(|c| !c.touches(id));

        // the store cascades on its side; pending creates for removed connections are moot
        for cid in &removed {
            self.pending_creates.remove(cid);
            self.deferred.retain(|r| !r.referenced_ids().contains(cid));
        }
        self.queue(SaveRequest::DeleteNode { id });
        Some(removed)
    }

    pub fn delete_connection(&mut self, id: ConnectionId) -> bool {
        if self.connection(id).is_none() {
            return false;
        }
        self.scene.connections.retain(|c| c.id != id);
        self.queue(SaveRequest::DeleteConnection { id });
        true
    }

    /// Copies a node, offset by `(+30, +30)` with `" (copy)"` appended to its label.
    ///
    /// Returns `None` without queuing anything if the node does not exist.
    pub fn duplicate_node(&mut self, id: NodeId) -> Option<NodeId> {
        let original = self.node(id)?;
        let copy = Node {
            id: Uuid::nil(),
            label: format!("{} (copy)", original.label),
            x: original.x + DUPLICATE_OFFSET,
            y: original.y + DUPLICATE_OFFSET,
            ..original.clone()
        };
        Some(self.add_node(copy))
    }

    /// Copies a connection's endpoints and styling.
    ///
    /// A non-empty label gets `" (copy)"` appended; an absent or empty label stays as it is.
    /// Returns `None` if the connection does not exist.
    pub fn duplicate_connection(&mut self, id: ConnectionId) -> Option<ConnectionId> {
        let original = self.connection(id)?;
        let label = match original.label.as_deref() {
            Some(label) if !label.is_empty() => Some(format!("{label} (copy)")),
            _ => original.label.clone(),
        };
        let copy = Connection {
            id: Uuid::nil(),
            label,
            ..original.clone()
        };
        self.add_connection(copy)
    }

    /// Publishes or unpublishes the scene.
    pub fn set_published(&mut self, published: bool) {
        let previous = self.scene.is_published;
        self.scene.is_published = published;
        self.queue(SaveRequest::SetPublished {
            scene_id: self.scene.id,
            published,
            previous,
        });
    }

    /// Replaces the display settings locally without persisting (typing in a legend label).
    pub fn apply_settings(&mut self, settings: &SceneSettings) -> bool {
        match self.scene.set_settings(settings) {
            Ok(()) => true,
            Err(err) => {
                log::error!("Failed to encode map settings: {err}");
                false
            }
        }
    }

    /// Replaces the display settings and persists them.
    pub fn update_settings(&mut self, settings: SceneSettings) {
        if !self.apply_settings(&settings) {
            return;
        }
        self.queue(SaveRequest::UpdateSettings {
            scene_id: self.scene.id,
            settings,
        });
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.scene.title = title.into();
    }

    /// Folds a finished round trip back into the scene.
    ///
    /// Successful creates swap the placeholder id for the store's id and release any requests
    /// held back behind it. Other successes change nothing: local state stays authoritative.
    /// Failures never roll back local edits, except a publish toggle which is restored.
    pub fn apply_result(&mut self, result: SaveResult) -> ApplyOutcome {
        let SaveResult { request, outcome } = result;
        match outcome {
            Ok(saved) => self.apply_success(&request, saved),
            Err(err) => {
                match &request {
                    SaveRequest::SetPublished { previous, .. } => {
                        self.scene.is_published = *previous;
                    }
                    SaveRequest::CreateNode { local_id, .. }
                    | SaveRequest::CreateConnection { local_id, .. } => {
                        self.abandon_create(*local_id);
                    }
                    _ => {}
                }
                ApplyOutcome {
                    remapped: None,
                    notification: Some(format!("Failed to {}: {err}", request.describe())),
                }
            }
        }
    }

    fn apply_success(&mut self, request: &SaveRequest, saved: Saved) -> ApplyOutcome {
        let (local_id, server_id) = match (request, &saved) {
            (SaveRequest::CreateNode { local_id, .. }, Saved::Node(node)) => (*local_id, node.id),
            (SaveRequest::CreateConnection { local_id, .. }, Saved::Connection(conn)) => {
                (*local_id, conn.id)
            }
            _ => return ApplyOutcome::default(),
        };

        self.pending_creates.remove(&local_id);
        self.remap_id(local_id, server_id);

        let (ready, still_blocked): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .map(|mut r| {
                r.remap_id(local_id, server_id);
                r
            })
            .partition(|r| {
                !r.referenced_ids()
                    .iter()
                    .any(|id| self.pending_creates.contains(id))
            });
        self.outbox.extend(ready);
        self.deferred = still_blocked;

        ApplyOutcome {
            remapped: Some((local_id, server_id)),
            notification: None,
        }
    }

    fn remap_id(&mut self, old: Uuid, new: Uuid) {
        for node in self.scene.nodes.iter_mut().filter(|n| n.id == old) {
            node.id = new;
        }
        for conn in self.scene.connections.iter_mut() {
            if conn.id == old {
                conn.id = new;
            }
            if conn.source_node_id == old {
                conn.source_node_id = new;
            }
            if conn.target_node_id == old {
                conn.target_node_id = new;
            }
        }
        for request in self.outbox.iter_mut() {
            request.remap_id(old, new);
        }
    }

    fn abandon_create(&mut self, local_id: Uuid) {
        self.pending_creates.remove(&local_id);
        let before = self.deferred.len();
        self.deferred
            .retain(|r| !r.referenced_ids().contains(&local_id));
        let dropped = before - self.deferred.len();
        if dropped > 0 {
            log::warn!("Dropped {dropped} saves that depended on a failed create");
        }
    }

    /// Topmost node whose outline contains `point`.
    pub fn node_at(&self, point: Point) -> Option<NodeId> {
        self.scene
            .nodes
            .iter()
            .rev()
            .find(|n| node_outline(n).contains(point))
            .map(|n| n.id)
    }

    /// Topmost connection passing within `CLICK_THRESHOLD / scale` of `point`.
    pub fn connection_at(&self, point: Point, scale: f32) -> Option<ConnectionId> {
        let threshold = CLICK_THRESHOLD / scale.max(f32::EPSILON);
        self.scene
            .connections
            .iter()
            .rev()
            .find(|c| {
                let source = self.node(c.source_node_id);
                let target = self.node(c.target_node_id);
                connection_path(c, source, target).is_some_and(|seg| {
                    let tolerance = threshold.max(c.line_width as f32 / 2.0);
                    point_to_segment_distance(point, seg.start, seg.end) <= tolerance
                })
            })
            .map(|c| c.id)
    }

    /// Node ids in z-order, used for keyboard focus cycling.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.scene.nodes.iter().map(|n| n.id).collect()
    }
}
