//! Persistence interface consumed by the editor.
//!
//! The data store is an external collaborator reached through the [`DataApi`] trait. Every
//! operation is asynchronous and independently failable. The editor never awaits a call
//! inline: mutations are described as [`SaveRequest`] values, sent through [`dispatch`], and
//! the resulting [`SaveResult`] is folded back into the scene once it arrives.
//!
//! [`InMemoryApi`] is a complete local implementation used by the desktop build when no
//! server is configured and by the test suite.

use crate::error::ApiError;
use crate::types::*;
use futures::future::{self, FutureExt, LocalBoxFuture, TryFutureExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// Future returned by every [`DataApi`] operation.
pub type ApiFuture<T> = LocalBoxFuture<'static, Result<T, ApiError>>;

/// Logical operations of the external data store.
pub trait DataApi {
    /// Creates a node in a scene. The store assigns the id and returns the stored node.
    fn create_node(&self, scene_id: SceneId, node: Node) -> ApiFuture<Node>;
    fn update_node(&self, id: NodeId, patch: NodePatch) -> ApiFuture<Node>;
    fn update_node_position(&self, id: NodeId, x: f32, y: f32) -> ApiFuture<Node>;
    /// Resizes a node. The store clamps to the minimum node size.
    fn update_node_size(&self, id: NodeId, width: f32, height: f32) -> ApiFuture<Node>;
    /// Deletes a node and every connection touching it.
    fn delete_node(&self, id: NodeId) -> ApiFuture<()>;
    /// References linked to a node, with the reasons for each link.
    fn node_references(&self, id: NodeId) -> ApiFuture<Vec<LinkedReference>>;
    /// Media linked to a node, by the same tag and legend-category rules as references.
    fn node_media(&self, id: NodeId) -> ApiFuture<Vec<LinkedMedia>>;

    /// Creates a connection. Self-connections are rejected.
    fn create_connection(&self, scene_id: SceneId, connection: Connection)
        -> ApiFuture<Connection>;
    fn update_connection(&self, id: ConnectionId, patch: ConnectionPatch)
        -> ApiFuture<Connection>;
    fn delete_connection(&self, id: ConnectionId) -> ApiFuture<()>;

    /// Full scene with nested nodes and connections.
    fn get_scene(&self, id: SceneId) -> ApiFuture<Scene>;
    /// Read-only scene; fails with [`ApiError::NotPublished`] unless published.
    fn get_public_scene(&self, id: SceneId) -> ApiFuture<Scene>;
    fn set_published(&self, id: SceneId, published: bool) -> ApiFuture<Scene>;
    fn update_settings(&self, id: SceneId, settings: SceneSettings) -> ApiFuture<Scene>;
}

/// A mutation waiting to be sent to the data store.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveRequest {
    /// `local_id` is the placeholder id the node carries until the store answers
    CreateNode {
        scene_id: SceneId,
        local_id: NodeId,
        node: Node,
    },
    UpdateNode {
        id: NodeId,
        patch: NodePatch,
    },
    MoveNode {
        id: NodeId,
        x: f32,
        y: f32,
    },
    ResizeNode {
        id: NodeId,
        width: f32,
        height: f32,
    },
    DeleteNode {
        id: NodeId,
    },
    CreateConnection {
        scene_id: SceneId,
        local_id: ConnectionId,
        connection: Connection,
    },
    UpdateConnection {
        id: ConnectionId,
        patch: ConnectionPatch,
    },
    DeleteConnection {
        id: ConnectionId,
    },
    /// `previous` is restored if the store rejects the toggle
    SetPublished {
        scene_id: SceneId,
        published: bool,
        previous: bool,
    },
    UpdateSettings {
        scene_id: SceneId,
        settings: SceneSettings,
    },
}

impl SaveRequest {
    /// Short description used in log lines and notifications.
    pub fn describe(&self) -> &'static str {
        match self {
            SaveRequest::CreateNode { .. } => "create node",
            SaveRequest::UpdateNode { .. } => "update node",
            SaveRequest::MoveNode { .. } => "save node position",
            SaveRequest::ResizeNode { .. } => "save node size",
            SaveRequest::DeleteNode { .. } => "delete node",
            SaveRequest::CreateConnection { .. } => "create connection",
            SaveRequest::UpdateConnection { .. } => "update connection",
            SaveRequest::DeleteConnection { .. } => "delete connection",
            SaveRequest::SetPublished { published: true, .. } => "publish map",
            SaveRequest::SetPublished { published: false, .. } => "unpublish map",
            SaveRequest::UpdateSettings { .. } => "save map settings",
        }
    }

    /// Ids of existing entities this request refers to.
    pub fn referenced_ids(&self) -> Vec<Uuid> {
        match self {
            SaveRequest::CreateNode { .. }
            | SaveRequest::SetPublished { .. }
            | SaveRequest::UpdateSettings { .. } => Vec::new(),
            SaveRequest::UpdateNode { id, .. }
            | SaveRequest::MoveNode { id, .. }
            | SaveRequest::ResizeNode { id, .. }
            | SaveRequest::DeleteNode { id }
            | SaveRequest::DeleteConnection { id } => vec![*id],
            SaveRequest::CreateConnection { connection, .. } => {
                vec![connection.source_node_id, connection.target_node_id]
            }
            SaveRequest::UpdateConnection { id, patch } => {
                let mut ids = vec![*id];
                ids.extend(patch.source_node_id);
                ids.extend(patch.target_node_id);
                ids
            }
        }
    }

    /// Rewrites every reference to `old` as `new`.
    pub fn remap_id(&mut self, old: Uuid, new: Uuid) {
        let swap = |id: &mut Uuid| {
            if *id == old {
                *id = new;
            }
        };
        match self {
            SaveRequest::CreateNode { .. }
            | SaveRequest::SetPublished { .. }
            | SaveRequest::UpdateSettings { .. } => {}
            SaveRequest::UpdateNode { id, .. }
            | SaveRequest::MoveNode { id, .. }
            | SaveRequest::ResizeNode { id, .. }
            | SaveRequest::DeleteNode { id }
            | SaveRequest::DeleteConnection { id } => swap(id),
            SaveRequest::CreateConnection { connection, .. } => {
                swap(&mut connection.source_node_id);
                swap(&mut connection.target_node_id);
            }
            SaveRequest::UpdateConnection { id, patch } => {
                swap(id);
                if let Some(source) = patch.source_node_id.as_mut() {
                    swap(source);
                }
                if let Some(target) = patch.target_node_id.as_mut() {
                    swap(target);
                }
            }
        }
    }
}

/// What the store returned for a successful request.
#[derive(Debug, Clone, PartialEq)]
pub enum Saved {
    Node(Node),
    Connection(Connection),
    Scene(Scene),
    Deleted,
}

/// A finished round trip: the request and what came back.
#[derive(Debug, Clone)]
pub struct SaveResult {
    pub request: SaveRequest,
    pub outcome: Result<Saved, ApiError>,
}

/// Sends one request to the store.
///
/// The returned future owns everything it needs, so it can be spawned on any local executor.
pub fn dispatch(api: &dyn DataApi, request: SaveRequest) -> LocalBoxFuture<'static, SaveResult> {
    log::debug!("Dispatching save: {}", request.describe());
    let outcome: ApiFuture<Saved> = match &request {
        SaveRequest::CreateNode { scene_id, node, .. } => api
            .create_node(*scene_id, node.clone())
            .map_ok(Saved::Node)
            .boxed_local(),
        SaveRequest::UpdateNode { id, patch } => api
            .update_node(*id, patch.clone())
            .map_ok(Saved::Node)
            .boxed_local(),
        SaveRequest::MoveNode { id, x, y } => api
            .update_node_position(*id, *x, *y)
            .map_ok(Saved::Node)
            .boxed_local(),
        SaveRequest::ResizeNode { id, width, height } => api
            .update_node_size(*id, *width, *height)
            .map_ok(Saved::Node)
            .boxed_local(),
        SaveRequest::DeleteNode { id } => api
            .delete_node(*id)
            .map_ok(|_| Saved::Deleted)
            .boxed_local(),
        SaveRequest::CreateConnection {
            scene_id,
            connection,
            ..
        } => api
            .create_connection(*scene_id, connection.clone())
            .map_ok(Saved::Connection)
            .boxed_local(),
        SaveRequest::UpdateConnection { id, patch } => api
            .update_connection(*id, patch.clone())
            .map_ok(Saved::Connection)
            .boxed_local(),
        SaveRequest::DeleteConnection { id } => api
            .delete_connection(*id)
            .map_ok(|_| Saved::Deleted)
            .boxed_local(),
        SaveRequest::SetPublished {
            scene_id,
            published,
            ..
        } => api
            .set_published(*scene_id, *published)
            .map_ok(Saved::Scene)
            .boxed_local(),
        SaveRequest::UpdateSettings { scene_id, settings } => api
            .update_settings(*scene_id, settings.clone())
            .map_ok(Saved::Scene)
            .boxed_local(),
    };

    async move {
        let outcome = outcome.await;
        if let Err(err) = &outcome {
            log::error!("Failed to {}: {err}", request.describe());
        }
        SaveResult { request, outcome }
    }
    .boxed_local()
}

/// Backing data for [`InMemoryApi`].
#[derive(Debug, Default)]
struct MemoryStore {
    scenes: HashMap<SceneId, Scene>,
    references: Vec<Reference>,
    media: Vec<Media>,
    fail_next: Option<ApiError>,
}

impl MemoryStore {
    fn take_failure(&mut self) -> Result<(), ApiError> {
        match self.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn scene_mut(&mut self, id: SceneId) -> Result<&mut Scene, ApiError> {
        self.scenes
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("map", id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, ApiError> {
        self.scenes
            .values_mut()
            .flat_map(|s| s.nodes.iter_mut())
            .find(|n| n.id == id)
            .ok_or_else(|| ApiError::not_found("node", id))
    }

    fn node(&self, id: NodeId) -> Result<&Node, ApiError> {
        self.scenes
            .values()
            .flat_map(|s| s.nodes.iter())
            .find(|n| n.id == id)
            .ok_or_else(|| ApiError::not_found("node", id))
    }

    fn scene_of_connection_mut(&mut self, id: ConnectionId) -> Result<&mut Scene, ApiError> {
        self.scenes
            .values_mut()
            .find(|s| s.connections.iter().any(|c| c.id == id))
            .ok_or_else(|| ApiError::not_found("connection", id))
    }

    fn validate_endpoints(scene: &Scene, connection: &Connection) -> Result<(), ApiError> {
        if connection.source_node_id == connection.target_node_id {
            return Err(ApiError::InvalidInput(
                "a connection cannot link a node to itself".into(),
            ));
        }
        for id in [connection.source_node_id, connection.target_node_id] {
            if scene.node(id).is_none() {
                return Err(ApiError::not_found("node", id));
            }
        }
        Ok(())
    }

    fn linked_references(&self, node: &Node) -> Vec<LinkedReference> {
        self.references
            .iter()
            .filter_map(|reference| {
                let match_reasons = MatchReason::linking(
                    node,
                    &reference.taxonomies,
                    reference.legend_category.as_deref(),
                );
                (!match_reasons.is_empty()).then(|| LinkedReference {
                    reference: reference.clone(),
                    match_reasons,
                })
            })
            .collect()
    }

    fn linked_media(&self, node: &Node) -> Vec<LinkedMedia> {
        self.media
            .iter()
            .filter_map(|media| {
                let match_reasons =
                    MatchReason::linking(node, &media.taxonomies, media.legend_category.as_deref());
                (!match_reasons.is_empty()).then(|| LinkedMedia {
                    media: media.clone(),
                    match_reasons,
                })
            })
            .collect()
    }
}

/// Single-process [`DataApi`] backed by shared in-memory state.
///
/// Cloning yields another handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApi {
    store: Rc<RefCell<MemoryStore>>,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a scene, keeping its ids.
    pub fn insert_scene(&self, scene: Scene) {
        self.store.borrow_mut().scenes.insert(scene.id, scene);
    }

    /// Adds a bibliographic reference.
    pub fn insert_reference(&self, reference: Reference) {
        self.store.borrow_mut().references.push(reference);
    }

    /// Adds a media item.
    pub fn insert_media(&self, media: Media) {
        self.store.borrow_mut().media.push(media);
    }

    /// Snapshot of a stored scene.
    pub fn scene(&self, id: SceneId) -> Option<Scene> {
        self.store.borrow().scenes.get(&id).cloned()
    }

    /// Makes the next operation fail with `err`.
    pub fn fail_next(&self, err: ApiError) {
        self.store.borrow_mut().fail_next = Some(err);
    }

    fn run<T: 'static>(
        &self,
        op: impl FnOnce(&mut MemoryStore) -> Result<T, ApiError>,
    ) -> ApiFuture<T> {
        let mut store = self.store.borrow_mut();
        let result = store.take_failure().and_then(|_| op(&mut store));
        future::ready(result).boxed_local()
    }
}

impl DataApi for InMemoryApi {
    fn create_node(&self, scene_id: SceneId, node: Node) -> ApiFuture<Node> {
        self.run(move |store| {
            let scene = store.scene_mut(scene_id)?;
            let mut node = node;
            node.id = Uuid::new_v4();
            node.set_size(node.width, node.height);
            scene.nodes.push(node.clone());
            Ok(node)
        })
    }

    fn update_node(&self, id: NodeId, patch: NodePatch) -> ApiFuture<Node> {
        self.run(move |store| {
            let node = store.node_mut(id)?;
            patch.apply_to(node);
            Ok(node.clone())
        })
    }

    fn update_node_position(&self, id: NodeId, x: f32, y: f32) -> ApiFuture<Node> {
        self.run(move |store| {
            let node = store.node_mut(id)?;
            node.x = x;
            node.y = y;
            Ok(node.clone())
        })
    }

    fn update_node_size(&self, id: NodeId, width: f32, height: f32) -> ApiFuture<Node> {
        self.run(move |store| {
            let node = store.node_mut(id)?;
            node.set_size(width, height);
            Ok(node.clone())
        })
    }

    fn delete_node(&self, id: NodeId) -> ApiFuture<()> {
        self.run(move |store| {
            let scene = store
                .scenes
                .values_mut()
                .find(|s| s.node(id).is_some())
                .ok_or_else(|| ApiError::not_found("node", id))?;
            scene.nodes.retain(|n| n.id != id);
            scene.connections.retain(|c| !c.touches(id));
            Ok(())
        })
    }

    fn node_references(&self, id: NodeId) -> ApiFuture<Vec<LinkedReference>> {
        self.run(move |store| {
            let node = store.node(id)?;
            Ok(store.linked_references(node))
        })
    }

    fn node_media(&self, id: NodeId) -> ApiFuture<Vec<LinkedMedia>> {
        self.run(move |store| {
            let node = store.node(id)?;
            Ok(store.linked_media(node))
        })
    }

    fn create_connection(
        &self,
        scene_id: SceneId,
        connection: Connection,
    ) -> ApiFuture<Connection> {
        self.run(move |store| {
            let scene = store.scene_mut(scene_id)?;
            MemoryStore::validate_endpoints(scene, &connection)?;
            let mut connection = connection;
            connection.id = Uuid::new_v4();
            scene.connections.push(connection.clone());
            Ok(connection)
        })
    }

    fn update_connection(
        &self,
        id: ConnectionId,
        patch: ConnectionPatch,
    ) -> ApiFuture<Connection> {
        self.run(move |store| {
            let scene = store.scene_of_connection_mut(id)?;
            let index = scene
                .connections
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| ApiError::not_found("connection", id))?;
            let mut updated = scene.connections[index].clone();
            patch.apply_to(&mut updated);
            MemoryStore::validate_endpoints(scene, &updated)?;
            scene.connections[index] = updated.clone();
            Ok(updated)
        })
    }

    fn delete_connection(&self, id: ConnectionId) -> ApiFuture<()> {
        self.run(move |store| {
            let scene = store.scene_of_connection_mut(id)?;
            scene.connections.retain(|c| c.id != id);
            Ok(())
        })
    }

    fn get_scene(&self, id: SceneId) -> ApiFuture<Scene> {
        self.run(move |store| Ok(store.scene_mut(id)?.clone()))
    }

    fn get_public_scene(&self, id: SceneId) -> ApiFuture<Scene> {
        self.run(move |store| {
            let scene = store.scene_mut(id)?;
            if !scene.is_published {
                return Err(ApiError::NotPublished(id));
            }
            Ok(scene.clone())
        })
    }

    fn set_published(&self, id: SceneId, published: bool) -> ApiFuture<Scene> {
        self.run(move |store| {
            let scene = store.scene_mut(id)?;
            scene.is_published = published;
            Ok(scene.clone())
        })
    }

    fn update_settings(&self, id: SceneId, settings: SceneSettings) -> ApiFuture<Scene> {
        self.run(move |store| {
            let scene = store.scene_mut(id)?;
            scene
                .set_settings(&settings)
                .map_err(|e| ApiError::InvalidInput(e.to_string()))?;
            Ok(scene.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_BACKGROUND_COLOR;
    use futures::executor::block_on;

    fn store_with_scene() -> (InMemoryApi, SceneId) {
        let api = InMemoryApi::new();
        let scene = Scene::new("Test map");
        let id = scene.id;
        api.insert_scene(scene);
        (api, id)
    }

    fn create(api: &InMemoryApi, scene: SceneId, label: &str) -> Node {
        block_on(api.create_node(scene, Node::new(label, (0.0, 0.0)))).unwrap()
    }

    #[test]
    fn test_create_node_assigns_new_id() {
        let (api, scene_id) = store_with_scene();
        let template = Node::new("A", (10.0, 10.0));
        let stored = block_on(api.create_node(scene_id, template.clone())).unwrap();

        assert_ne!(stored.id, template.id);
        assert_eq!(stored.label, "A");
        assert_eq!(api.scene(scene_id).unwrap().nodes.len(), 1);
    }

    #[test]
    fn test_update_size_clamps_in_store() {
        let (api, scene_id) = store_with_scene();
        let node = create(&api, scene_id, "A");
        let resized = block_on(api.update_node_size(node.id, 1.0, 2.0)).unwrap();
        assert_eq!((resized.width, resized.height), (50.0, 30.0));
    }

    #[test]
    fn test_self_connection_rejected() {
        let (api, scene_id) = store_with_scene();
        let node = create(&api, scene_id, "A");
        let result = block_on(api.create_connection(scene_id, Connection::new(node.id, node.id)));
        assert!(matches!(result, Err(ApiError::InvalidInput(_))));
    }

    #[test]
    fn test_delete_node_cascades_in_store() {
        let (api, scene_id) = store_with_scene();
        let a = create(&api, scene_id, "A");
        let b = create(&api, scene_id, "B");
        let c = create(&api, scene_id, "C");
        block_on(api.create_connection(scene_id, Connection::new(a.id, b.id))).unwrap();
        let keep = block_on(api.create_connection(scene_id, Connection::new(b.id, c.id))).unwrap();

        block_on(api.delete_node(a.id)).unwrap();
        let scene = api.scene(scene_id).unwrap();
        assert_eq!(scene.connections, vec![keep]);
    }

    #[test]
    fn test_public_scene_requires_publish() {
        let (api, scene_id) = store_with_scene();
        assert_eq!(
            block_on(api.get_public_scene(scene_id)).unwrap_err(),
            ApiError::NotPublished(scene_id)
        );
        block_on(api.set_published(scene_id, true)).unwrap();
        assert!(block_on(api.get_public_scene(scene_id)).is_ok());
    }

    #[test]
    fn test_node_references_report_match_reasons() {
        let (api, scene_id) = store_with_scene();
        let tag = Tag::new("ecology", "#10B981");
        let other = Tag::new("physics", "#EF4444");

        let mut node = Node::new("A", (0.0, 0.0));
        node.background_color = "#ff0000".into();
        node.taxonomies = vec![tag.clone()];
        let node = block_on(api.create_node(scene_id, node)).unwrap();

        let mut by_tag = Reference::new("smith2020", "article");
        by_tag.taxonomies = vec![tag.clone(), other.clone()];
        let mut by_color = Reference::new("doe2021", "book");
        by_color.legend_category = Some("#FF0000".into());
        let mut unrelated = Reference::new("roe2019", "misc");
        unrelated.taxonomies = vec![other];
        api.insert_reference(by_tag);
        api.insert_reference(by_color);
        api.insert_reference(unrelated);

        let linked = block_on(api.node_references(node.id)).unwrap();
        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].reference.bibtex_key, "smith2020");
        assert_eq!(linked[0].match_reasons, vec![MatchReason::for_tag(&tag)]);
        assert_eq!(
            linked[1].match_reasons,
            vec![MatchReason::LegendCategory {
                legend_category: "#FF0000".into()
            }]
        );
    }

    #[test]
    fn test_node_media_use_reference_rules() {
        let (api, scene_id) = store_with_scene();
        let tag = Tag::new("ecology", "#10B981");

        let mut node = Node::new("A", (0.0, 0.0));
        node.background_color = "#10b981".into();
        node.taxonomies = vec![tag.clone()];
        let node = block_on(api.create_node(scene_id, node)).unwrap();

        let mut both = Media::new("Lecture", "https://example.org/lecture");
        both.taxonomies = vec![tag.clone()];
        both.legend_category = Some("#10B981".into());
        api.insert_media(both);
        api.insert_media(Media::new("Unrelated", "https://example.org/other"));

        let linked = block_on(api.node_media(node.id)).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].media.title, "Lecture");
        assert_eq!(
            linked[0].match_reasons,
            vec![
                MatchReason::for_tag(&tag),
                MatchReason::LegendCategory {
                    legend_category: "#10B981".into()
                }
            ]
        );
        assert!(matches!(
            block_on(api.node_media(Uuid::new_v4())),
            Err(ApiError::NotFound { .. })
        ));
    }

    #[test]
    fn test_default_color_never_matches_legend_category() {
        let (api, scene_id) = store_with_scene();
        let node = create(&api, scene_id, "A");
        let mut reference = Reference::new("k", "article");
        reference.legend_category = Some(DEFAULT_BACKGROUND_COLOR.into());
        api.insert_reference(reference);

        assert!(block_on(api.node_references(node.id)).unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_reports_injected_failure() {
        let (api, scene_id) = store_with_scene();
        let node = create(&api, scene_id, "A");
        api.fail_next(ApiError::Rejected("offline".into()));

        let result = block_on(dispatch(
            &api,
            SaveRequest::MoveNode {
                id: node.id,
                x: 5.0,
                y: 5.0,
            },
        ));
        assert_eq!(result.outcome, Err(ApiError::Rejected("offline".into())));

        let result = block_on(dispatch(
            &api,
            SaveRequest::MoveNode {
                id: node.id,
                x: 5.0,
                y: 5.0,
            },
        ));
        assert!(matches!(result.outcome, Ok(Saved::Node(n)) if n.x == 5.0));
    }

    #[test]
    fn test_remap_rewrites_connection_endpoints() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut request = SaveRequest::CreateConnection {
            scene_id: Uuid::new_v4(),
            local_id: Uuid::new_v4(),
            connection: Connection::new(old, other),
        };
        assert!(request.referenced_ids().contains(&old));

        request.remap_id(old, new);
        assert_eq!(request.referenced_ids(), vec![new, other]);
    }
}
