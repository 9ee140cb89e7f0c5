//! Core data types for bibliography maps.
//!
//! This module defines the entities owned by the external data store (nodes, connections,
//! scenes, tags and references) together with the partial-update payloads used to persist
//! edits. Every type round-trips through `serde` using the store's snake_case field names.

use crate::constants::*;
use crate::geometry::{Point, Rect};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for nodes.
pub type NodeId = Uuid;

/// Unique identifier for connections.
pub type ConnectionId = Uuid;

/// Unique identifier for scenes (maps).
pub type SceneId = Uuid;

/// Unique identifier for tags.
pub type TagId = Uuid;

/// Unique identifier for bibliographic references.
pub type ReferenceId = Uuid;

/// Unique identifier for media items.
pub type MediaId = Uuid;

/// Declares a string-backed enum that accepts unknown values by falling back to its default.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
        default $default:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// Parses a wire name, falling back to the default for unknown values.
            pub fn parse(value: &str) -> Self {
                match value {
                    $( $text $(| $alias)* => $name::$variant, )+
                    _ => $name::$default,
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Outline drawn for a node.
    pub enum NodeShape {
        /// Axis-aligned box with sharp corners
        Rectangle => "rectangle",
        /// Box with corners rounded by `min(16, w/4, h/4)`
        RoundedRectangle => "rounded-rectangle",
        /// Ellipse inscribed in the bounding box
        Ellipse => "ellipse",
        /// Rhombus through the midpoints of the bounding box edges
        Diamond => "diamond",
    }
    default Rectangle
}

string_enum! {
    /// Fill/stroke/filter composition of a node. Never affects geometry.
    pub enum NodeStyle {
        /// Filled with the background color, stroked with the border color
        Flat => "flat",
        /// No fill, stroked with the background color
        Outline => "outline",
        /// Filled, with a drop shadow when selected
        Bevel => "bevel",
        /// Filled, with an inset double shadow when selected
        Emboss => "emboss",
    }
    default Flat
}

string_enum! {
    /// Dash pattern of a connection.
    pub enum LineStyle {
        /// Continuous line
        Solid => "solid",
        /// 8 on, 4 off
        Dashed => "dashed",
        /// 2 on, 2 off
        Dotted => "dotted",
    }
    default Solid
}

string_enum! {
    /// Which ends of a connection carry an arrowhead.
    pub enum ArrowType {
        /// No arrowheads
        None => "none",
        /// Arrowhead at the target
        End => "end" | "arrow",
        /// Arrowheads at both ends
        Both => "both",
    }
    default End
}

impl LineStyle {
    /// Dash array `(on, off)` for this style, or `None` for a solid line.
    pub fn dash_array(&self) -> Option<(f32, f32)> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some((8.0, 4.0)),
            LineStyle::Dotted => Some((2.0, 2.0)),
        }
    }
}

fn default_width() -> f32 {
    NODE_WIDTH
}

fn default_height() -> f32 {
    NODE_HEIGHT
}

fn min_width<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    f32::deserialize(deserializer).map(|w| w.max(MIN_NODE_WIDTH))
}

fn min_height<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    f32::deserialize(deserializer).map(|h| h.max(MIN_NODE_HEIGHT))
}

fn default_background_color() -> String {
    DEFAULT_BACKGROUND_COLOR.to_string()
}

fn default_text_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

fn default_border_color() -> String {
    DEFAULT_BORDER_COLOR.to_string()
}

fn default_font_family() -> String {
    DEFAULT_FONT_FAMILY.to_string()
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn default_line_color() -> String {
    DEFAULT_LINE_COLOR.to_string()
}

fn default_line_width() -> u32 {
    DEFAULT_LINE_WIDTH
}

fn default_tag_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

fn default_true() -> bool {
    true
}

/// A tag (taxonomy) attached to nodes and references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier for this tag
    pub id: TagId,
    /// Display name, unique across the store
    pub name: String,
    /// Hex color used for chips and match indicators
    #[serde(default = "default_tag_color")]
    pub color: String,
}

impl Tag {
    /// Creates a tag with a fresh identifier.
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color: color.into(),
        }
    }
}

/// A styled, positioned shape on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier, assigned by the data store
    pub id: NodeId,
    /// Text rendered centered inside the shape
    pub label: String,
    /// Optional longer text shown in a dismissible callout
    #[serde(default)]
    pub description: Option<String>,
    /// Left edge in map units
    #[serde(default)]
    pub x: f32,
    /// Top edge in map units
    #[serde(default)]
    pub y: f32,
    /// Width in map units, never below [`MIN_NODE_WIDTH`]
    #[serde(default = "default_width", deserialize_with = "min_width")]
    pub width: f32,
    /// Height in map units, never below [`MIN_NODE_HEIGHT`]
    #[serde(default = "default_height", deserialize_with = "min_height")]
    pub height: f32,
    /// Outline of the node
    #[serde(default)]
    pub shape: NodeShape,
    /// Fill/stroke composition
    #[serde(default)]
    pub node_style: NodeStyle,
    #[serde(default = "default_background_color")]
    pub background_color: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_border_color")]
    pub border_color: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub font_bold: bool,
    #[serde(default)]
    pub font_italic: bool,
    #[serde(default)]
    pub font_underline: bool,
    /// Wrap overflowing label text; when false the label is clipped with an ellipsis
    #[serde(default = "default_true")]
    pub wrap_text: bool,
    /// Whether the node exposes a references page
    #[serde(default = "default_true")]
    pub link_to_references: bool,
    /// Tags used to compute the node's linked references
    #[serde(default)]
    pub taxonomies: Vec<Tag>,
}

impl Node {
    /// Creates a node with default paint and size at the given top-left position.
    pub fn new(label: impl Into<String>, position: (f32, f32)) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            description: None,
            x: position.0,
            y: position.1,
            width: NODE_WIDTH,
            height: NODE_HEIGHT,
            shape: NodeShape::default(),
            node_style: NodeStyle::default(),
            background_color: default_background_color(),
            text_color: default_text_color(),
            border_color: default_border_color(),
            font_family: default_font_family(),
            font_size: DEFAULT_FONT_SIZE,
            font_bold: false,
            font_italic: false,
            font_underline: false,
            wrap_text: true,
            link_to_references: true,
            taxonomies: Vec::new(),
        }
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Center of the bounding box.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Bounding box in map coordinates.
    pub fn bounds(&self) -> Rect {
        Rect::from_min_size(self.origin(), self.width, self.height)
    }

    /// Sets the size, clamping to the minimum node dimensions.
    pub fn set_size(&mut self, width: f32, height: f32) {
        let (width, height) = clamp_node_size(width, height);
        self.width = width;
        self.height = height;
    }

    /// Returns the description when it is present and non-empty.
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// Clamps a requested size to the minimum node dimensions.
pub fn clamp_node_size(width: f32, height: f32) -> (f32, f32) {
    (width.max(MIN_NODE_WIDTH), height.max(MIN_NODE_HEIGHT))
}

/// A directed or bidirectional edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique identifier, assigned by the data store
    pub id: ConnectionId,
    /// Node the connection starts at
    pub source_node_id: NodeId,
    /// Node the connection ends at
    pub target_node_id: NodeId,
    /// Explicit attachment offsets relative to the source node's top-left corner
    #[serde(default)]
    pub source_attach_x: Option<f32>,
    #[serde(default)]
    pub source_attach_y: Option<f32>,
    /// Explicit attachment offsets relative to the target node's top-left corner
    #[serde(default)]
    pub target_attach_x: Option<f32>,
    #[serde(default)]
    pub target_attach_y: Option<f32>,
    #[serde(default = "default_line_color")]
    pub line_color: String,
    #[serde(default = "default_line_width")]
    pub line_width: u32,
    #[serde(default)]
    pub line_style: LineStyle,
    #[serde(default)]
    pub arrow_type: ArrowType,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub show_label: bool,
}

impl Connection {
    /// Creates a connection with default paint between two nodes.
    pub fn new(source_node_id: NodeId, target_node_id: NodeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_node_id,
            target_node_id,
            source_attach_x: None,
            source_attach_y: None,
            target_attach_x: None,
            target_attach_y: None,
            line_color: default_line_color(),
            line_width: DEFAULT_LINE_WIDTH,
            line_style: LineStyle::default(),
            arrow_type: ArrowType::default(),
            label: None,
            show_label: false,
        }
    }

    /// Source attachment offset, present only when both coordinates are set.
    pub fn source_attach(&self) -> Option<Point> {
        match (self.source_attach_x, self.source_attach_y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }

    /// Target attachment offset, present only when both coordinates are set.
    pub fn target_attach(&self) -> Option<Point> {
        match (self.target_attach_x, self.target_attach_y) {
            (Some(x), Some(y)) => Some(Point::new(x, y)),
            _ => None,
        }
    }

    /// The label to draw, if `show_label` is set and the label is non-empty.
    pub fn visible_label(&self) -> Option<&str> {
        if !self.show_label {
            return None;
        }
        self.label.as_deref().filter(|l| !l.is_empty())
    }

    /// True when the connection touches the given node.
    pub fn touches(&self, node_id: NodeId) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }
}

/// Display settings stored with a scene as a JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneSettings {
    /// Render the color legend
    pub show_legend: bool,
    /// Render accessibility patterns over node fills
    pub show_patterns: bool,
    /// User-supplied legend labels keyed by upper-cased hex color
    pub legend_labels: BTreeMap<String, String>,
}

impl SceneSettings {
    /// Decodes a settings blob, falling back to defaults when it cannot be parsed.
    pub fn from_blob(blob: Option<&str>) -> Self {
        match blob.map(str::trim).filter(|b| !b.is_empty()) {
            None => Self::default(),
            Some(json) => serde_json::from_str(json).unwrap_or_else(|err| {
                log::warn!("Ignoring undecodable scene settings: {err}");
                Self::default()
            }),
        }
    }

    /// Encodes the settings as a JSON blob.
    pub fn to_blob(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// User label for a color, looked up case-insensitively.
    pub fn legend_label(&self, color: &str) -> Option<&str> {
        let key = color.to_ascii_uppercase();
        self.legend_labels
            .get(&key)
            .or_else(|| self.legend_labels.get(color))
            .map(String::as_str)
    }
}

/// One bibliography map: its nodes, connections, and display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Unique identifier, assigned by the data store
    pub id: SceneId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the map can be fetched without authentication
    #[serde(default)]
    pub is_published: bool,
    /// JSON-encoded [`SceneSettings`]
    #[serde(default)]
    pub settings_json: Option<String>,
    /// Nodes in z-order: later entries render on top
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Scene {
    /// Creates an empty, unpublished scene.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            is_published: false,
            settings_json: None,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Decoded display settings.
    pub fn settings(&self) -> SceneSettings {
        SceneSettings::from_blob(self.settings_json.as_deref())
    }

    /// Replaces the display settings.
    pub fn set_settings(&mut self, settings: &SceneSettings) -> Result<(), serde_json::Error> {
        self.settings_json = Some(settings.to_blob()?);
        Ok(())
    }

    /// Finds a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Finds a connection by id.
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| c.id == id)
    }
}

/// A bibliographic entry imported from BibTeX.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: ReferenceId,
    pub bibtex_key: String,
    /// BibTeX entry type (article, book, inproceedings, ...)
    pub entry_type: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub booktitle: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub pages: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub raw_bibtex: String,
    /// Legend color this reference is filed under, if any
    #[serde(default)]
    pub legend_category: Option<String>,
    #[serde(default)]
    pub taxonomies: Vec<Tag>,
}

impl Reference {
    /// Creates a reference with only the mandatory fields set.
    pub fn new(bibtex_key: impl Into<String>, entry_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bibtex_key: bibtex_key.into(),
            entry_type: entry_type.into(),
            title: None,
            author: None,
            year: None,
            journal: None,
            booktitle: None,
            publisher: None,
            volume: None,
            number: None,
            pages: None,
            doi: None,
            url: None,
            abstract_text: None,
            raw_bibtex: String::new(),
            legend_category: None,
            taxonomies: Vec::new(),
        }
    }

    /// Title, falling back to the citation key.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.bibtex_key)
    }
}

/// Why a reference is linked to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchReason {
    /// The reference shares this tag with the node
    Taxonomy {
        taxonomy_id: TagId,
        taxonomy_name: String,
        taxonomy_color: String,
    },
    /// The reference's legend category equals the node's fill color
    LegendCategory { legend_category: String },
}

impl MatchReason {
    /// Builds a tag match reason.
    pub fn for_tag(tag: &Tag) -> Self {
        MatchReason::Taxonomy {
            taxonomy_id: tag.id,
            taxonomy_name: tag.name.clone(),
            taxonomy_color: tag.color.clone(),
        }
    }

    /// Reasons an item with these tags and legend category is linked to `node`.
    ///
    /// Shared tags come first in the node's tag order. The legend category matches the node's
    /// fill color case-insensitively, except when the node keeps the default fill.
    pub fn linking(node: &Node, taxonomies: &[Tag], legend_category: Option<&str>) -> Vec<Self> {
        let mut reasons: Vec<Self> = node
            .taxonomies
            .iter()
            .filter(|tag| taxonomies.iter().any(|t| t.id == tag.id))
            .map(Self::for_tag)
            .collect();

        let node_color = node.background_color.to_ascii_uppercase();
        let category_matches =
            legend_category.is_some_and(|c| c.to_ascii_uppercase() == node_color);
        if node_color != DEFAULT_BACKGROUND_COLOR && category_matches {
            reasons.push(MatchReason::LegendCategory {
                legend_category: node_color,
            });
        }
        reasons
    }

    /// Short human-readable description, used in "why is this here" indicators.
    pub fn describe(&self) -> String {
        match self {
            MatchReason::Taxonomy { taxonomy_name, .. } => format!("Tag: {taxonomy_name}"),
            MatchReason::LegendCategory { legend_category } => {
                format!("Legend category: {legend_category}")
            }
        }
    }
}

/// A reference together with the reasons it is linked to a particular node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedReference {
    #[serde(flatten)]
    pub reference: Reference,
    #[serde(default)]
    pub match_reasons: Vec<MatchReason>,
}

/// An external resource (video, image, web page) filed under tags and a legend category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub legend_category: Option<String>,
    #[serde(default)]
    pub taxonomies: Vec<Tag>,
}

impl Media {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            url: url.into(),
            description: None,
            legend_category: None,
            taxonomies: Vec::new(),
        }
    }
}

/// A media item together with the reasons it is linked to a particular node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedMedia {
    #[serde(flatten)]
    pub media: Media,
    #[serde(default)]
    pub match_reasons: Vec<MatchReason>,
}

/// Everything linked to one node: references and media.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLinks {
    pub references: Vec<LinkedReference>,
    pub media: Vec<LinkedMedia>,
}

impl NodeLinks {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.media.is_empty()
    }
}

/// Reads a field that was present in the payload, keeping an explicit `null` apart from absence.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial node update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `Some(None)` clears the description
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<NodeShape>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_style: Option<NodeStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrap_text: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_to_references: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomies: Option<Vec<Tag>>,
}

impl NodePatch {
    /// Applies every present field to `node`. Sizes are clamped to the minimum.
    pub fn apply_to(&self, node: &mut Node) {
        if let Some(v) = &self.label {
            node.label = v.clone();
        }
        if let Some(v) = &self.description {
            node.description = v.clone();
        }
        if let Some(v) = self.x {
            node.x = v;
        }
        if let Some(v) = self.y {
            node.y = v;
        }
        if self.width.is_some() || self.height.is_some() {
            node.set_size(
                self.width.unwrap_or(node.width),
                self.height.unwrap_or(node.height),
            );
        }
        if let Some(v) = self.shape {
            node.shape = v;
        }
        if let Some(v) = self.node_style {
            node.node_style = v;
        }
        if let Some(v) = &self.background_color {
            node.background_color = v.clone();
        }
        if let Some(v) = &self.text_color {
            node.text_color = v.clone();
        }
        if let Some(v) = &self.border_color {
            node.border_color = v.clone();
        }
        if let Some(v) = &self.font_family {
            node.font_family = v.clone();
        }
        if let Some(v) = self.font_size {
            node.font_size = v;
        }
        if let Some(v) = self.font_bold {
            node.font_bold = v;
        }
        if let Some(v) = self.font_italic {
            node.font_italic = v;
        }
        if let Some(v) = self.font_underline {
            node.font_underline = v;
        }
        if let Some(v) = self.wrap_text {
            node.wrap_text = v;
        }
        if let Some(v) = self.link_to_references {
            node.link_to_references = v;
        }
        if let Some(v) = &self.taxonomies {
            node.taxonomies = v.clone();
        }
    }

    /// Folds a later patch into this one; fields present in `later` win.
    pub fn merge(&mut self, later: NodePatch) {
        macro_rules! take {
            ($($field:ident),+) => {
                $( if later.$field.is_some() { self.$field = later.$field; } )+
            };
        }
        take!(
            label,
            description,
            x,
            y,
            width,
            height,
            shape,
            node_style,
            background_color,
            text_color,
            border_color,
            font_family,
            font_size,
            font_bold,
            font_italic,
            font_underline,
            wrap_text,
            link_to_references,
            taxonomies
        );
    }
}

/// Partial connection update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_node_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_attach_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_attach_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_attach_x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_attach_y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_style: Option<LineStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrow_type: Option<ArrowType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_label: Option<bool>,
}

impl ConnectionPatch {
    /// Applies every present field to `connection`.
    pub fn apply_to(&self, connection: &mut Connection) {
        if let Some(v) = self.source_node_id {
            connection.source_node_id = v;
        }
        if let Some(v) = self.target_node_id {
            connection.target_node_id = v;
        }
        if let Some(v) = self.source_attach_x {
            connection.source_attach_x = Some(v);
        }
        if let Some(v) = self.source_attach_y {
            connection.source_attach_y = Some(v);
        }
        if let Some(v) = self.target_attach_x {
            connection.target_attach_x = Some(v);
        }
        if let Some(v) = self.target_attach_y {
            connection.target_attach_y = Some(v);
        }
        if let Some(v) = &self.line_color {
            connection.line_color = v.clone();
        }
        if let Some(v) = self.line_width {
            connection.line_width = v;
        }
        if let Some(v) = self.line_style {
            connection.line_style = v;
        }
        if let Some(v) = self.arrow_type {
            connection.arrow_type = v;
        }
        if let Some(v) = &self.label {
            connection.label = Some(v.clone());
        }
        if let Some(v) = self.show_label {
            connection.show_label = v;
        }
    }

    /// Folds a later patch into this one; fields present in `later` win.
    pub fn merge(&mut self, later: ConnectionPatch) {
        macro_rules! take {
            ($($field:ident),+) => {
                $( if later.$field.is_some() { self.$field = later.$field; } )+
            };
        }
        take!(
            source_node_id,
            target_node_id,
            source_attach_x,
            source_attach_y,
            target_attach_x,
            target_attach_y,
            line_color,
            line_width,
            line_style,
            arrow_type,
            label,
            show_label
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_defaults() {
        let node = Node::new("Topic", (10.0, 20.0));

        assert_eq!(node.width, 150.0);
        assert_eq!(node.height, 60.0);
        assert_eq!(node.shape, NodeShape::Rectangle);
        assert_eq!(node.node_style, NodeStyle::Flat);
        assert_eq!(node.background_color, "#3B82F6");
        assert_eq!(node.text_color, "#FFFFFF");
        assert_eq!(node.border_color, "#1E40AF");
        assert_eq!(node.font_size, 14);
        assert!(node.wrap_text);
        assert!(!node.id.is_nil());
    }

    #[test]
    fn test_node_deserializes_with_missing_fields() {
        let id = Uuid::new_v4();
        let node: Node = serde_json::from_value(json!({"id": id, "label": "Bare"})).unwrap();

        assert_eq!(node.width, 150.0);
        assert_eq!(node.height, 60.0);
        assert_eq!(node.x, 0.0);
        assert!(node.description.is_none());
        assert!(node.link_to_references);
    }

    #[test]
    fn test_stored_node_size_is_raised_to_minimum() {
        let id = Uuid::new_v4();
        let node: Node =
            serde_json::from_value(json!({"id": id, "label": "Tiny", "width": 10.0, "height": 5.0}))
                .unwrap();
        assert_eq!((node.width, node.height), (50.0, 30.0));
    }

    #[test]
    fn test_unknown_shape_falls_back_to_rectangle() {
        let id = Uuid::new_v4();
        let node: Node =
            serde_json::from_value(json!({"id": id, "label": "X", "shape": "hexagon"})).unwrap();
        assert_eq!(node.shape, NodeShape::Rectangle);

        let json = serde_json::to_value(Node {
            shape: NodeShape::RoundedRectangle,
            ..node
        })
        .unwrap();
        assert_eq!(json["shape"], "rounded-rectangle");
    }

    #[test]
    fn test_arrow_type_accepts_legacy_arrow_value() {
        assert_eq!(ArrowType::parse("arrow"), ArrowType::End);
        assert_eq!(ArrowType::parse("both"), ArrowType::Both);
        assert_eq!(ArrowType::parse("nonsense"), ArrowType::End);
        assert_eq!(String::from(ArrowType::End), "end");
    }

    #[test]
    fn test_set_size_clamps_to_minimum() {
        let mut node = Node::new("Small", (0.0, 0.0));
        node.set_size(10.0, 5.0);
        assert_eq!((node.width, node.height), (50.0, 30.0));

        node.set_size(200.0, 80.0);
        assert_eq!((node.width, node.height), (200.0, 80.0));
    }

    #[test]
    fn test_visible_label_requires_flag_and_text() {
        let mut conn = Connection::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(conn.visible_label(), None);

        conn.label = Some("supports".into());
        assert_eq!(conn.visible_label(), None);

        conn.show_label = true;
        assert_eq!(conn.visible_label(), Some("supports"));

        conn.label = Some(String::new());
        assert_eq!(conn.visible_label(), None);
    }

    #[test]
    fn test_attachment_requires_both_coordinates() {
        let mut conn = Connection::new(Uuid::new_v4(), Uuid::new_v4());
        conn.target_attach_x = Some(5.0);
        assert!(conn.target_attach().is_none());

        conn.target_attach_y = Some(0.0);
        assert_eq!(conn.target_attach(), Some(Point::new(5.0, 0.0)));
    }

    #[test]
    fn test_settings_blob_roundtrip_and_fallback() {
        let mut settings = SceneSettings::default();
        settings.show_legend = true;
        settings
            .legend_labels
            .insert("#FF0000".into(), "Methods".into());

        let blob = settings.to_blob().unwrap();
        assert!(blob.contains("legendLabels"));
        assert_eq!(SceneSettings::from_blob(Some(&blob)), settings);
        assert_eq!(settings.legend_label("#ff0000"), Some("Methods"));

        assert_eq!(SceneSettings::from_blob(Some("{not json")), SceneSettings::default());
        assert_eq!(SceneSettings::from_blob(None), SceneSettings::default());
    }

    #[test]
    fn test_node_patch_applies_only_present_fields() {
        let mut node = Node::new("Before", (1.0, 2.0));
        let patch = NodePatch {
            label: Some("After".into()),
            font_bold: Some(true),
            width: Some(20.0),
            ..Default::default()
        };
        patch.apply_to(&mut node);

        assert_eq!(node.label, "After");
        assert!(node.font_bold);
        assert_eq!(node.width, 50.0);
        assert_eq!(node.height, 60.0);
        assert_eq!(node.x, 1.0);
    }

    #[test]
    fn test_patch_merge_prefers_later_fields() {
        let mut first = NodePatch {
            label: Some("a".into()),
            description: Some(Some("keep".into())),
            ..Default::default()
        };
        first.merge(NodePatch {
            label: Some("ab".into()),
            ..Default::default()
        });
        assert_eq!(first.label.as_deref(), Some("ab"));
        assert_eq!(first.description, Some(Some("keep".to_string())));
    }

    #[test]
    fn test_patch_can_clear_description() {
        let mut node = Node::new("Topic", (0.0, 0.0));
        node.description = Some("old notes".into());

        let untouched: NodePatch = serde_json::from_value(json!({"label": "T"})).unwrap();
        assert_eq!(untouched.description, None);
        untouched.apply_to(&mut node);
        assert_eq!(node.description.as_deref(), Some("old notes"));

        let clear: NodePatch = serde_json::from_value(json!({"description": null})).unwrap();
        assert_eq!(clear.description, Some(None));
        clear.apply_to(&mut node);
        assert_eq!(node.description, None);
        assert_eq!(serde_json::to_value(&clear).unwrap(), json!({"description": null}));
    }

    #[test]
    fn test_patch_serialization_omits_absent_fields() {
        let patch = ConnectionPatch {
            show_label: Some(false),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, json!({"show_label": false}));
    }

    #[test]
    fn test_match_reason_tagging() {
        let tag = Tag::new("ecology", "#10B981");
        let json = serde_json::to_value(MatchReason::for_tag(&tag)).unwrap();
        assert_eq!(json["type"], "taxonomy");
        assert_eq!(json["taxonomy_name"], "ecology");
    }

    #[test]
    fn test_linked_media_flattens_media_fields() {
        let json = json!({
            "id": Uuid::new_v4(),
            "title": "Field recording",
            "url": "https://example.org/clip",
            "legend_category": "#FF0000",
            "match_reasons": [{"type": "legend_category", "legend_category": "#FF0000"}]
        });
        let linked: LinkedMedia = serde_json::from_value(json).unwrap();
        assert_eq!(linked.media.title, "Field recording");
        assert!(linked.media.description.is_none());
        assert!(linked.media.taxonomies.is_empty());
        assert_eq!(linked.match_reasons.len(), 1);
    }

    #[test]
    fn test_linking_orders_tags_before_legend_category() {
        let tag = Tag::new("ecology", "#10B981");
        let mut node = Node::new("A", (0.0, 0.0));
        node.background_color = "#ef4444".into();
        node.taxonomies = vec![tag.clone()];

        let reasons = MatchReason::linking(&node, &[tag.clone()], Some("#EF4444"));
        assert_eq!(
            reasons,
            vec![
                MatchReason::for_tag(&tag),
                MatchReason::LegendCategory {
                    legend_category: "#EF4444".into()
                }
            ]
        );
        assert!(MatchReason::linking(&node, &[], None).is_empty());
    }
}
