//! Per-node reference and media listings, and per-reference detail pages.

use super::escape_xml;
use crate::types::{
    LinkedMedia, LinkedReference, MatchReason, Media, Node, NodeId, NodeLinks, Reference,
    ReferenceId,
};
use std::fmt::Write;

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem;color:#111827;line-height:1.5}\
a{color:#2563EB}h1{font-size:1.5rem}ul{padding-left:1.2rem}li{margin:.6rem 0}\
.reason{display:inline-block;font-size:.75rem;border-radius:.6rem;padding:0 .5rem;margin-right:.3rem;color:#fff}\
.meta{color:#4B5563}pre{background:#F3F4F6;padding:1rem;overflow:auto;white-space:pre-wrap}\
dt{font-weight:600}dd{margin:0 0 .5rem 0}";

/// Path of a node's reference listing, relative to the export root.
pub fn node_page_path(id: NodeId) -> String {
    format!("nodes/{id}.html")
}

/// Path of a reference detail page, relative to the export root.
pub fn reference_page_path(id: ReferenceId) -> String {
    format!("references/{id}.html")
}

/// Links every reference and media item sharing at least one tag with the node, recording
/// the shared tags.
pub fn links_by_shared_tags(node: &Node, references: &[Reference], media: &[Media]) -> NodeLinks {
    let references = references
        .iter()
        .filter_map(|reference| {
            let match_reasons = MatchReason::linking(node, &reference.taxonomies, None);
            (!match_reasons.is_empty()).then(|| LinkedReference {
                reference: reference.clone(),
                match_reasons,
            })
        })
        .collect();
    let media = media
        .iter()
        .filter_map(|item| {
            let match_reasons = MatchReason::linking(node, &item.taxonomies, None);
            (!match_reasons.is_empty()).then(|| LinkedMedia {
                media: item.clone(),
                match_reasons,
            })
        })
        .collect();
    NodeLinks { references, media }
}

fn page_start(out: &mut String, title: &str) {
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    );
    let _ = writeln!(out, "<title>{}</title>", escape_xml(title));
    let _ = writeln!(out, "<style>{PAGE_STYLE}</style>");
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
}

fn page_end(out: &mut String) {
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
}

/// One-line citation: authors (year). Title. Venue.
fn citation(reference: &Reference) -> String {
    let mut parts = Vec::new();
    if let Some(author) = reference.author.as_deref().filter(|a| !a.is_empty()) {
        match reference.year.as_deref() {
            Some(year) if !year.is_empty() => parts.push(format!("{author} ({year})")),
            _ => parts.push(author.to_string()),
        }
    }
    let venue = reference
        .journal
        .as_deref()
        .or(reference.booktitle.as_deref())
        .or(reference.publisher.as_deref())
        .filter(|v| !v.is_empty());
    if let Some(venue) = venue {
        parts.push(venue.to_string());
    }
    parts.join(". ")
}

fn reason_badge(reason: &MatchReason) -> String {
    let color = match reason {
        MatchReason::Taxonomy { taxonomy_color, .. } => taxonomy_color.as_str(),
        MatchReason::LegendCategory { legend_category } => legend_category.as_str(),
    };
    format!(
        "<span class=\"reason\" style=\"background:{}\" title=\"Why this is listed\">{}</span>",
        escape_xml(color),
        escape_xml(&reason.describe())
    )
}

fn reason_badges(out: &mut String, reasons: &[MatchReason]) {
    if !reasons.is_empty() {
        let _ = write!(out, "<br>");
        for reason in reasons {
            out.push_str(&reason_badge(reason));
        }
    }
}

/// Reference and media listing for one node.
pub fn node_page_html(map_title: &str, node: &Node, links: &NodeLinks) -> String {
    let mut out = String::new();
    page_start(&mut out, &format!("{} - {}", node.label, map_title));
    let _ = writeln!(out, "<p><a href=\"../index.html\">&larr; Back to map</a></p>");
    let _ = writeln!(out, "<h1>{}</h1>", escape_xml(&node.label));
    if let Some(description) = node.description_text() {
        let _ = writeln!(out, "<p>{}</p>", escape_xml(description));
    }

    if links.is_empty() {
        let _ = writeln!(
            out,
            "<p class=\"meta\">No references or media are linked to this node.</p>"
        );
    }
    if !links.references.is_empty() {
        let _ = writeln!(out, "<h2>References ({})</h2>", links.references.len());
        let _ = writeln!(out, "<ul>");
        for entry in &links.references {
            let reference = &entry.reference;
            let _ = write!(
                out,
                "<li><a href=\"../{}\">{}</a>",
                reference_page_path(reference.id),
                escape_xml(reference.display_title())
            );
            let cite = citation(reference);
            if !cite.is_empty() {
                let _ = write!(out, "<br><span class=\"meta\">{}</span>", escape_xml(&cite));
            }
            reason_badges(&mut out, &entry.match_reasons);
            let _ = writeln!(out, "</li>");
        }
        let _ = writeln!(out, "</ul>");
    }
    if !links.media.is_empty() {
        let _ = writeln!(out, "<h2>Media ({})</h2>", links.media.len());
        let _ = writeln!(out, "<ul>");
        for entry in &links.media {
            let media = &entry.media;
            let _ = write!(
                out,
                "<li><a href=\"{}\" rel=\"noopener\">{}</a>",
                escape_xml(&media.url),
                escape_xml(&media.title)
            );
            if let Some(description) = media.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = write!(
                    out,
                    "<br><span class=\"meta\">{}</span>",
                    escape_xml(description)
                );
            }
            reason_badges(&mut out, &entry.match_reasons);
            let _ = writeln!(out, "</li>");
        }
        let _ = writeln!(out, "</ul>");
    }
    page_end(&mut out);
    out
}

/// Detail page for one reference.
pub fn reference_page_html(map_title: &str, reference: &Reference) -> String {
    let mut out = String::new();
    page_start(
        &mut out,
        &format!("{} - {}", reference.display_title(), map_title),
    );
    let _ = writeln!(out, "<p><a href=\"../index.html\">&larr; Back to map</a></p>");
    let _ = writeln!(out, "<h1>{}</h1>", escape_xml(reference.display_title()));
    let _ = writeln!(out, "<dl>");

    let fields: [(&str, Option<&str>); 11] = [
        ("Key", Some(reference.bibtex_key.as_str())),
        ("Type", Some(reference.entry_type.as_str())),
        ("Authors", reference.author.as_deref()),
        ("Year", reference.year.as_deref()),
        ("Journal", reference.journal.as_deref()),
        ("Book title", reference.booktitle.as_deref()),
        ("Publisher", reference.publisher.as_deref()),
        ("Volume", reference.volume.as_deref()),
        ("Number", reference.number.as_deref()),
        ("Pages", reference.pages.as_deref()),
        ("Legend category", reference.legend_category.as_deref()),
    ];
    for (name, value) in fields {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            let _ = writeln!(out, "<dt>{name}</dt><dd>{}</dd>", escape_xml(value));
        }
    }
    if let Some(doi) = reference.doi.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(
            out,
            "<dt>DOI</dt><dd><a href=\"https://doi.org/{}\">{}</a></dd>",
            escape_xml(doi),
            escape_xml(doi)
        );
    }
    if let Some(url) = reference.url.as_deref().filter(|u| !u.is_empty()) {
        let _ = writeln!(
            out,
            "<dt>URL</dt><dd><a href=\"{}\">{}</a></dd>",
            escape_xml(url),
            escape_xml(url)
        );
    }
    if !reference.taxonomies.is_empty() {
        let _ = write!(out, "<dt>Tags</dt><dd>");
        for tag in &reference.taxonomies {
            out.push_str(&reason_badge(&MatchReason::for_tag(tag)));
        }
        let _ = writeln!(out, "</dd>");
    }
    let _ = writeln!(out, "</dl>");

    if let Some(abstract_text) = reference.abstract_text.as_deref().filter(|a| !a.is_empty()) {
        let _ = writeln!(out, "<h2>Abstract</h2>");
        let _ = writeln!(out, "<p>{}</p>", escape_xml(abstract_text));
    }
    if !reference.raw_bibtex.is_empty() {
        let _ = writeln!(out, "<h2>BibTeX</h2>");
        let _ = writeln!(out, "<pre>{}</pre>", escape_xml(&reference.raw_bibtex));
    }
    page_end(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;

    #[test]
    fn test_shared_tag_reasons() {
        let a = Tag::new("a", "#111111");
        let b = Tag::new("b", "#222222");
        let c = Tag::new("c", "#333333");
        let mut node = Node::new("n", (0.0, 0.0));
        node.taxonomies = vec![a.clone(), b.clone()];

        let mut both = Reference::new("both", "article");
        both.taxonomies = vec![b.clone(), a.clone(), c.clone()];
        let mut none = Reference::new("none", "article");
        none.taxonomies = vec![c];

        let mut clip = Media::new("clip", "https://example.org/clip");
        clip.taxonomies = vec![b.clone()];
        clip.legend_category = Some(node.background_color.clone());

        let links = links_by_shared_tags(&node, &[both, none], &[clip]);
        assert_eq!(links.references.len(), 1);
        assert_eq!(
            links.references[0].match_reasons,
            vec![MatchReason::for_tag(&a), MatchReason::for_tag(&b)]
        );
        assert_eq!(links.media.len(), 1);
        assert_eq!(links.media[0].match_reasons, vec![MatchReason::for_tag(&b)]);
    }

    #[test]
    fn test_node_page_links_are_relative() {
        let node = Node::new("Topic", (0.0, 0.0));
        let mut reference = Reference::new("smith2020", "article");
        reference.title = Some("On <things>".into());
        let links = NodeLinks {
            references: vec![LinkedReference {
                reference: reference.clone(),
                match_reasons: vec![MatchReason::LegendCategory {
                    legend_category: "#FF0000".into(),
                }],
            }],
            media: Vec::new(),
        };
        let page = node_page_html("Map", &node, &links);

        assert!(page.contains(&format!("href=\"../references/{}.html\"", reference.id)));
        assert!(page.contains("href=\"../index.html\""));
        assert!(page.contains("On &lt;things&gt;"));
        assert!(page.contains("Legend category: #FF0000"));
        assert!(!page.contains("href=\"/"));
        assert!(!page.contains("<h2>Media"));
    }

    #[test]
    fn test_node_page_lists_media() {
        let node = Node::new("Topic", (0.0, 0.0));
        let tag = Tag::new("ecology", "#10B981");
        let mut clip = Media::new("Wetlands & birds", "https://example.org/clip?a=1&b=2");
        clip.description = Some("Short documentary".into());
        let links = NodeLinks {
            references: Vec::new(),
            media: vec![LinkedMedia {
                media: clip,
                match_reasons: vec![MatchReason::for_tag(&tag)],
            }],
        };
        let page = node_page_html("Map", &node, &links);

        assert!(page.contains("<h2>Media (1)</h2>"));
        assert!(!page.contains("<h2>References"));
        assert!(page.contains("href=\"https://example.org/clip?a=1&amp;b=2\""));
        assert!(page.contains("Wetlands &amp; birds"));
        assert!(page.contains("Short documentary"));
        assert!(page.contains("Tag: ecology"));
        assert!(!page.contains("No references or media"));
    }

    #[test]
    fn test_node_page_without_links() {
        let node = Node::new("Topic", (0.0, 0.0));
        let page = node_page_html("Map", &node, &NodeLinks::default());
        assert!(page.contains("No references or media are linked to this node."));
    }

    #[test]
    fn test_reference_page_fields() {
        let mut reference = Reference::new("doe2021", "book");
        reference.author = Some("Doe, J.".into());
        reference.doi = Some("10.1000/xyz".into());
        reference.raw_bibtex = "@book{doe2021}".into();
        let page = reference_page_html("Map", &reference);

        assert!(page.contains("<h1>doe2021</h1>"));
        assert!(page.contains("<dt>Authors</dt><dd>Doe, J.</dd>"));
        assert!(page.contains("https://doi.org/10.1000/xyz"));
        assert!(page.contains("<pre>@book{doe2021}</pre>"));
        assert!(!page.contains("<dt>Journal</dt>"));
    }
}
