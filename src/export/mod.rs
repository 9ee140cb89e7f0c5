//! Static, self-contained export of a map.
//!
//! The export is a small relocatable site:
//!
//! - `index.html` - the map with zoom, pan, fit-to-screen, description callouts and legend
//! - `map.svg` - the same drawing as a standalone image
//! - `nodes/{id}.html` - one reference and media list per node that links to references
//! - `references/{id}.html` - one detail page per referenced entry, never duplicated
//!
//! Every link is relative, so the directory can be moved or served from anywhere.

pub mod html;
pub mod pages;
#[cfg(not(target_arch = "wasm32"))]
pub mod png;
pub mod svg;

use crate::error::ExportError;
use crate::render::{render_scene, RenderOptions};
use crate::types::{Media, NodeId, NodeLinks, Reference, Scene};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Where node → reference and media links come from.
#[derive(Debug, Clone, Copy)]
pub enum LinkSource<'a> {
    /// Authoritative per-node lookups from the data store
    Lookup(&'a HashMap<NodeId, NodeLinks>),
    /// No lookup available: link items that share a tag with the node
    SharedTags {
        references: &'a [Reference],
        media: &'a [Media],
    },
}

/// An in-memory static site: relative path → file contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportBundle {
    pub files: BTreeMap<String, String>,
}

impl ExportBundle {
    /// Writes every file below `dir`, creating subdirectories as needed.
    pub fn write_to_dir(&self, dir: &Path) -> Result<(), ExportError> {
        for (relative, contents) in &self.files {
            let path = dir.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
        }
        log::info!("Exported {} files to {}", self.files.len(), dir.display());
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }
}

/// Builds the static site for a scene.
///
/// # Arguments
///
/// * `scene` - The map to export
/// * `links` - Source of each node's linked references and media
pub fn export_static_site(scene: &Scene, links: LinkSource<'_>) -> ExportBundle {
    let settings = scene.settings();
    let rendered = render_scene(scene, &RenderOptions::read_only(settings.show_patterns));
    let mut bundle = ExportBundle::default();

    let linked_nodes: Vec<_> = scene
        .nodes
        .iter()
        .filter(|n| n.link_to_references)
        .map(|node| {
            let linked = match links {
                LinkSource::Lookup(map) => map.get(&node.id).cloned().unwrap_or_default(),
                LinkSource::SharedTags { references, media } => {
                    pages::links_by_shared_tags(node, references, media)
                }
            };
            (node, linked)
        })
        .collect();

    bundle.files.insert(
        "index.html".to_string(),
        html::index_html(scene, &rendered, &settings),
    );

    let document = svg::build_svg(scene, &rendered, &svg::SvgOptions::default());
    bundle.files.insert("map.svg".to_string(), document.svg);

    for (node, linked) in &linked_nodes {
        bundle.files.insert(
            pages::node_page_path(node.id),
            pages::node_page_html(&scene.title, node, linked),
        );
        for entry in &linked.references {
            bundle
                .files
                .entry(pages::reference_page_path(entry.reference.id))
                .or_insert_with(|| pages::reference_page_html(&scene.title, &entry.reference));
        }
    }

    log::debug!(
        "Built static export for '{}' with {} files",
        scene.title,
        bundle.files.len()
    );
    bundle
}

/// Escapes text for use in XML/HTML content and attribute values.
pub fn escape_xml(input: &str) -> String {
    let mut s = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => s.push_str("&amp;"),
            '<' => s.push_str("&lt;"),
            '>' => s.push_str("&gt;"),
            '"' => s.push_str("&quot;"),
            '\'' => s.push_str("&apos;"),
            _ => s.push(ch),
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn shared_tags(references: &[Reference]) -> LinkSource<'_> {
        LinkSource::SharedTags {
            references,
            media: &[],
        }
    }

    fn tagged_scene() -> (Scene, Vec<Reference>) {
        let ecology = Tag::new("ecology", "#10B981");
        let methods = Tag::new("methods", "#F59E0B");

        let mut scene = Scene::new("Reading list");
        let mut a = Node::new("A", (0.0, 0.0));
        a.taxonomies = vec![ecology.clone()];
        let mut b = Node::new("B", (300.0, 0.0));
        b.taxonomies = vec![ecology.clone(), methods.clone()];
        let mut c = Node::new("C", (600.0, 0.0));
        c.link_to_references = false;
        c.taxonomies = vec![methods.clone()];
        scene.nodes = vec![a, b, c];

        let mut shared = Reference::new("smith2020", "article");
        shared.taxonomies = vec![ecology];
        let mut only_methods = Reference::new("doe2021", "book");
        only_methods.taxonomies = vec![methods];
        (scene, vec![shared, only_methods])
    }

    #[test]
    fn test_site_layout_and_dedup() {
        let (scene, references) = tagged_scene();
        let bundle = export_static_site(&scene, shared_tags(&references));

        let paths: Vec<&str> = bundle.files.keys().map(String::as_str).collect();
        assert!(paths.contains(&"index.html"));
        assert!(paths.contains(&"map.svg"));
        let node_pages = paths.iter().filter(|p| p.starts_with("nodes/")).count();
        let reference_pages = paths.iter().filter(|p| p.starts_with("references/")).count();
        // node C does not link to references
        assert_eq!(node_pages, 2);
        // smith2020 is linked from both A and B but written once
        assert_eq!(reference_pages, 2);
    }

    #[test]
    fn test_lookup_links_take_precedence() {
        let (scene, references) = tagged_scene();
        let mut lookup = HashMap::new();
        lookup.insert(
            scene.nodes[0].id,
            NodeLinks {
                references: vec![LinkedReference {
                    reference: references[1].clone(),
                    match_reasons: Vec::new(),
                }],
                media: Vec::new(),
            },
        );
        let bundle = export_static_site(&scene, LinkSource::Lookup(&lookup));

        assert!(bundle
            .get(&pages::reference_page_path(references[1].id))
            .is_some());
        assert!(bundle
            .get(&pages::reference_page_path(references[0].id))
            .is_none());
    }

    #[test]
    fn test_node_pages_list_shared_tag_media() {
        let (scene, references) = tagged_scene();
        let mut clip = Media::new("Field notes", "https://example.org/notes");
        clip.taxonomies = scene.nodes[0].taxonomies.clone();
        let media = [clip];
        let bundle = export_static_site(
            &scene,
            LinkSource::SharedTags {
                references: &references,
                media: &media,
            },
        );

        for node in &scene.nodes[..2] {
            let page = bundle.get(&pages::node_page_path(node.id)).unwrap();
            assert!(page.contains("<h2>Media (1)</h2>"));
            assert!(page.contains("https://example.org/notes"));
        }
        // media are external links, not exported pages
        assert_eq!(bundle.files.len(), 6);
    }

    #[test]
    fn test_export_is_deterministic() {
        let (scene, references) = tagged_scene();
        let first = export_static_site(&scene, shared_tags(&references));
        let second = export_static_site(&scene, shared_tags(&references));
        assert_eq!(first, second);
    }

    #[test]
    fn test_write_to_dir() {
        let (scene, references) = tagged_scene();
        let bundle = export_static_site(&scene, shared_tags(&references));
        let dir = std::env::temp_dir().join(format!("bibmap-export-{}", uuid::Uuid::new_v4()));

        bundle.write_to_dir(&dir).unwrap();
        for path in bundle.files.keys() {
            assert!(dir.join(path).is_file(), "{path} missing");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
