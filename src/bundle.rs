//! `.bibmap` bundle shape: export and re-import of a whole map.
//!
//! The bundle carries a fixed set of fields per node and connection. Zero, false and empty
//! values are written out like any other value so they survive a round trip.

use crate::api::DataApi;
use crate::error::BundleError;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 1;

/// File extension used for bundles.
pub const BUNDLE_EXTENSION: &str = "bibmap";

/// Node as carried by a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleNode {
    pub id: NodeId,
    pub label: String,
    pub description: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub background_color: String,
    pub text_color: String,
    pub border_color: String,
    pub font_size: u32,
    pub font_family: String,
    pub font_bold: bool,
    pub font_italic: bool,
    pub font_underline: bool,
    pub shape: NodeShape,
    pub link_to_references: bool,
    /// Names of the node's tags; informational, not relinked on import
    pub tag_names: Vec<String>,
}

impl From<&Node> for BundleNode {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            label: node.label.clone(),
            description: node.description.clone(),
            x: node.x,
            y: node.y,
            width: node.width,
            height: node.height,
            background_color: node.background_color.clone(),
            text_color: node.text_color.clone(),
            border_color: node.border_color.clone(),
            font_size: node.font_size,
            font_family: node.font_family.clone(),
            font_bold: node.font_bold,
            font_italic: node.font_italic,
            font_underline: node.font_underline,
            shape: node.shape,
            link_to_references: node.link_to_references,
            tag_names: node.taxonomies.iter().map(|t| t.name.clone()).collect(),
        }
    }
}

impl BundleNode {
    /// Node carrying this entry's fields; fields the bundle does not carry get defaults.
    ///
    /// Sizes below the minimum node dimensions are raised to it.
    pub fn to_node(&self) -> Node {
        let (width, height) = clamp_node_size(self.width, self.height);
        Node {
            id: self.id,
            label: self.label.clone(),
            description: self.description.clone(),
            x: self.x,
            y: self.y,
            width,
            height,
            background_color: self.background_color.clone(),
            text_color: self.text_color.clone(),
            border_color: self.border_color.clone(),
            font_size: self.font_size,
            font_family: self.font_family.clone(),
            font_bold: self.font_bold,
            font_italic: self.font_italic,
            font_underline: self.font_underline,
            shape: self.shape,
            link_to_references: self.link_to_references,
            ..Node::new(String::new(), (0.0, 0.0))
        }
    }
}

/// Connection as carried by a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConnection {
    pub id: ConnectionId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub label: Option<String>,
    pub show_label: bool,
    pub line_color: String,
    pub line_width: u32,
    pub line_style: LineStyle,
    pub arrow_type: ArrowType,
}

impl From<&Connection> for BundleConnection {
    fn from(c: &Connection) -> Self {
        Self {
            id: c.id,
            source_node_id: c.source_node_id,
            target_node_id: c.target_node_id,
            label: c.label.clone(),
            show_label: c.show_label,
            line_color: c.line_color.clone(),
            line_width: c.line_width,
            line_style: c.line_style,
            arrow_type: c.arrow_type,
        }
    }
}

impl BundleConnection {
    pub fn to_connection(&self) -> Connection {
        Connection {
            id: self.id,
            label: self.label.clone(),
            show_label: self.show_label,
            line_color: self.line_color.clone(),
            line_width: self.line_width,
            line_style: self.line_style,
            arrow_type: self.arrow_type,
            ..Connection::new(self.source_node_id, self.target_node_id)
        }
    }
}

/// A whole map in bundle form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapBundle {
    pub version: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: SceneSettings,
    pub nodes: Vec<BundleNode>,
    pub connections: Vec<BundleConnection>,
}

impl MapBundle {
    /// Captures a scene.
    pub fn from_scene(scene: &Scene) -> Self {
        Self {
            version: BUNDLE_VERSION,
            title: scene.title.clone(),
            description: scene.description.clone(),
            settings: scene.settings(),
            nodes: scene.nodes.iter().map(BundleNode::from).collect(),
            connections: scene.connections.iter().map(BundleConnection::from).collect(),
        }
    }

    /// Builds a local scene that keeps the bundle's ids.
    pub fn to_scene(&self) -> Scene {
        let mut scene = Scene::new(self.title.clone());
        scene.description = self.description.clone();
        if let Err(err) = scene.set_settings(&self.settings) {
            log::warn!("Dropping bundle settings: {err}");
        }
        scene.nodes = self.nodes.iter().map(BundleNode::to_node).collect();
        scene.connections = self
            .connections
            .iter()
            .map(BundleConnection::to_connection)
            .collect();
        scene
    }

    pub fn to_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, BundleError> {
        let bundle: MapBundle = serde_json::from_str(json)?;
        if bundle.version > BUNDLE_VERSION {
            log::warn!(
                "Bundle version {} is newer than supported version {BUNDLE_VERSION}",
                bundle.version
            );
        }
        Ok(bundle)
    }

    /// Reads a bundle file from disk.
    pub fn load(path: &Path) -> Result<Self, BundleError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// File name for a map's bundle: lower-cased title with every non-alphanumeric character
/// replaced by `_`.
pub fn generate_filename(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let stem = if stem.is_empty() { "untitled" } else { &stem };
    format!("{stem}.{BUNDLE_EXTENSION}")
}

/// Counts reported after an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub nodes: usize,
    pub connections: usize,
    /// Connections skipped because an endpoint was missing or both endpoints matched
    pub skipped_connections: usize,
    /// Bundle node id → newly assigned node id
    pub node_ids: HashMap<NodeId, NodeId>,
}

/// Recreates a bundle's nodes and connections in an existing scene through the data API.
///
/// Nodes get new ids; connections are rewired to them. Connections that reference a node
/// missing from the bundle are skipped with a warning.
pub async fn import_bundle(
    api: &dyn DataApi,
    scene_id: SceneId,
    bundle: &MapBundle,
) -> Result<ImportSummary, BundleError> {
    let mut summary = ImportSummary::default();

    for entry in &bundle.nodes {
        let mut template = entry.to_node();
        template.id = Uuid::nil();
        let created = api.create_node(scene_id, template).await?;
        summary.node_ids.insert(entry.id, created.id);
        summary.nodes += 1;
    }

    for entry in &bundle.connections {
        let endpoints = (
            summary.node_ids.get(&entry.source_node_id),
            summary.node_ids.get(&entry.target_node_id),
        );
        let (Some(&source), Some(&target)) = endpoints else {
            log::warn!("Skipping connection {} with a missing endpoint", entry.id);
            summary.skipped_connections += 1;
            continue;
        };
        if source == target {
            log::warn!("Skipping self-connection {}", entry.id);
            summary.skipped_connections += 1;
            continue;
        }
        let mut template = entry.to_connection();
        template.id = Uuid::nil();
        template.source_node_id = source;
        template.target_node_id = target;
        api.create_connection(scene_id, template).await?;
        summary.connections += 1;
    }

    if bundle.settings != SceneSettings::default() {
        api.update_settings(scene_id, bundle.settings.clone()).await?;
    }

    log::info!(
        "Imported {} nodes and {} connections",
        summary.nodes,
        summary.connections
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InMemoryApi;
    use crate::constants::{MIN_NODE_HEIGHT, MIN_NODE_WIDTH, NODE_WIDTH};
    use futures::executor::block_on;

    fn sample_scene() -> Scene {
        let mut scene = Scene::new("My BibMap");
        let mut a = Node::new("Zero", (0.0, 0.0));
        a.description = Some(String::new());
        a.font_bold = false;
        a.link_to_references = false;
        a.taxonomies = vec![Tag::new("ecology", "#10B981")];
        let mut b = Node::new("Diamond", (300.0, -20.5));
        b.shape = NodeShape::Diamond;
        b.font_italic = true;
        b.font_size = 0;
        let mut conn = Connection::new(a.id, b.id);
        conn.label = Some(String::new());
        conn.line_width = 0;
        conn.line_style = LineStyle::Dotted;
        conn.arrow_type = ArrowType::None;
        scene.connections.push(conn);
        scene.nodes.push(a);
        scene.nodes.push(b);
        scene
    }

    #[test]
    fn test_generate_filename() {
        assert_eq!(generate_filename("My BibMap"), "my_bibmap.bibmap");
        assert_eq!(generate_filename("Lit. review #2"), "lit__review__2.bibmap");
        assert_eq!(generate_filename("   "), "untitled.bibmap");
    }

    #[test]
    fn test_falsy_values_are_written() {
        let bundle = MapBundle::from_scene(&sample_scene());
        let json: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();

        let node = &json["nodes"][0];
        assert_eq!(node["description"], "");
        assert_eq!(node["font_bold"], false);
        assert_eq!(node["link_to_references"], false);
        assert_eq!(node["x"], 0.0);
        assert_eq!(node["tag_names"], serde_json::json!(["ecology"]));
        assert_eq!(json["nodes"][1]["font_size"], 0);
        assert_eq!(json["connections"][0]["label"], "");
        assert_eq!(json["connections"][0]["line_width"], 0);
    }

    #[test]
    fn test_import_roundtrip_preserves_documented_fields() {
        let original = sample_scene();
        let bundle = MapBundle::from_scene(&original);
        let json = bundle.to_json().unwrap();
        let parsed = MapBundle::from_json(&json).unwrap();

        let api = InMemoryApi::new();
        let target = Scene::new("Imported");
        let target_id = target.id;
        api.insert_scene(target);

        let summary = block_on(import_bundle(&api, target_id, &parsed)).unwrap();
        assert_eq!(summary.nodes, 2);
        assert_eq!(summary.connections, 1);

        let imported = api.scene(target_id).unwrap();
        let reexported = MapBundle::from_scene(&imported);
        for (before, after) in bundle.nodes.iter().zip(&reexported.nodes) {
            assert_eq!(summary.node_ids[&before.id], after.id);
            assert_eq!(
                BundleNode {
                    id: before.id,
                    tag_names: before.tag_names.clone(),
                    ..after.clone()
                },
                *before
            );
        }
        let (before, after) = (&bundle.connections[0], &reexported.connections[0]);
        assert_eq!(summary.node_ids[&before.source_node_id], after.source_node_id);
        assert_eq!(
            BundleConnection {
                id: before.id,
                source_node_id: before.source_node_id,
                target_node_id: before.target_node_id,
                ..after.clone()
            },
            *before
        );
    }

    #[test]
    fn test_import_skips_dangling_connections() {
        let mut scene = sample_scene();
        let a = scene.nodes[0].id;
        scene.connections.push(Connection::new(a, Uuid::new_v4()));
        let bundle = MapBundle::from_scene(&scene);

        let api = InMemoryApi::new();
        let target = Scene::new("Imported");
        let target_id = target.id;
        api.insert_scene(target);

        let summary = block_on(import_bundle(&api, target_id, &bundle)).unwrap();
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.skipped_connections, 1);
    }

    #[test]
    fn test_undersized_nodes_load_at_minimum_size() {
        let bundle = MapBundle::from_scene(&sample_scene());
        let mut json: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        json["nodes"][0]["width"] = serde_json::json!(10.0);
        json["nodes"][0]["height"] = serde_json::json!(5.0);

        let scene = MapBundle::from_json(&json.to_string()).unwrap().to_scene();
        let node = &scene.nodes[0];
        assert_eq!((node.width, node.height), (MIN_NODE_WIDTH, MIN_NODE_HEIGHT));
        assert_eq!(scene.nodes[1].width, NODE_WIDTH);
    }

    #[test]
    fn test_to_scene_keeps_ids() {
        let original = sample_scene();
        let scene = MapBundle::from_scene(&original).to_scene();
        assert_eq!(scene.nodes[0].id, original.nodes[0].id);
        assert_eq!(scene.connections[0].target_node_id, original.nodes[1].id);
        assert_eq!(scene.title, "My BibMap");
    }
}
