//! `index.html` of the static export.
//!
//! The page embeds the SVG drawing inside a transformable viewport group and a short script
//! that mirrors the editor's view behavior: wheel zoom about the pointer clamped to the same
//! range, drag to pan, fit-to-screen with the same padding and magnification cap, double-click
//! reset, and description callouts of which at most one is open at a time.

use super::escape_xml;
use super::pages::node_page_path;
use super::svg::{write_commands, write_defs};
use crate::constants::{
    DESCRIPTION_ICON_RADIUS, FIT_MAX_SCALE, FIT_PADDING, MAX_ZOOM, MIN_ZOOM, ZOOM_STEP,
};
use crate::geometry::fmt_num;
use crate::legend::legend_entries;
use crate::render::RenderedScene;
use crate::types::{Scene, SceneSettings};
use crate::view::content_bounds;
use std::fmt::Write;

const STYLE: &str = r#"
html,body{margin:0;height:100%;font-family:system-ui,sans-serif;color:#111827}
body{display:flex;flex-direction:column}
header{padding:.6rem 1rem;border-bottom:1px solid #E5E7EB}
header h1{margin:0;font-size:1.25rem}
header p{margin:.2rem 0 0;color:#4B5563}
#stage{position:relative;flex:1;overflow:hidden;background:#FAFAFA}
#map{width:100%;height:100%;display:block;cursor:grab;touch-action:none}
#map.panning{cursor:grabbing}
.node.linked{cursor:pointer}
.toolbar{position:absolute;top:.6rem;right:.6rem;display:flex;gap:.3rem}
.toolbar button{font-size:1rem;min-width:2rem;padding:.2rem .5rem;border:1px solid #D1D5DB;background:#fff;border-radius:.3rem;cursor:pointer}
.callout{position:absolute;max-width:18rem;background:#fff;border:1px solid #D1D5DB;border-radius:.4rem;box-shadow:0 4px 12px rgba(0,0,0,.15);padding:.6rem .8rem;font-size:.9rem;z-index:10}
.callout h3{margin:0 1.4rem .3rem 0;font-size:1rem}
.callout p{margin:0 0 .4rem;white-space:pre-wrap}
.callout .close{position:absolute;top:.2rem;right:.3rem;border:none;background:none;font-size:1.1rem;cursor:pointer}
.legend{position:absolute;left:.6rem;bottom:.6rem;background:#fff;border:1px solid #E5E7EB;border-radius:.4rem;padding:.5rem .7rem;font-size:.85rem}
.legend h2{margin:0 0 .3rem;font-size:.9rem}
.legend ul{list-style:none;margin:0;padding:0}
.legend li{display:flex;align-items:center;gap:.4rem;margin:.15rem 0}
"#;

const SCRIPT: &str = r#"
(function () {
  var svg = document.getElementById('map');
  var viewport = document.getElementById('viewport');
  var stage = document.getElementById('stage');
  var cfg = JSON.parse(svg.getAttribute('data-view'));
  var view = { x: 0, y: 0, k: 1 };
  var open = null;

  function apply() {
    viewport.setAttribute('transform', 'translate(' + view.x + ' ' + view.y + ') scale(' + view.k + ')');
  }
  function closeCallout() {
    if (open) { open.hidden = true; open = null; }
  }
  function changeView(next) {
    closeCallout();
    view = next;
    apply();
  }
  function fit() {
    var b = cfg.bounds;
    if (!b) { changeView({ x: 0, y: 0, k: 1 }); return; }
    var r = svg.getBoundingClientRect();
    var cx = b[0] - cfg.padding, cy = b[1] - cfg.padding;
    var cw = b[2] - b[0] + 2 * cfg.padding, ch = b[3] - b[1] + 2 * cfg.padding;
    var k = Math.max(cfg.minZoom, Math.min(r.width / cw, r.height / ch, cfg.maxFit));
    changeView({ x: (r.width - cw * k) / 2 - cx * k, y: (r.height - ch * k) / 2 - cy * k, k: k });
  }
  function zoomAbout(px, py, factor) {
    var k = Math.min(cfg.maxZoom, Math.max(cfg.minZoom, view.k * factor));
    if (k === view.k) return;
    var wx = (px - view.x) / view.k, wy = (py - view.y) / view.k;
    changeView({ x: px - wx * k, y: py - wy * k, k: k });
  }
  function center(factor) {
    var r = svg.getBoundingClientRect();
    zoomAbout(r.width / 2, r.height / 2, factor);
  }

  svg.addEventListener('wheel', function (e) {
    e.preventDefault();
    var r = svg.getBoundingClientRect();
    zoomAbout(e.clientX - r.left, e.clientY - r.top, e.deltaY < 0 ? cfg.step : 1 / cfg.step);
  }, { passive: false });

  var drag = null;
  svg.addEventListener('pointerdown', function (e) {
    drag = { x: e.clientX, y: e.clientY, vx: view.x, vy: view.y, moved: false };
  });
  window.addEventListener('pointermove', function (e) {
    if (!drag) return;
    var dx = e.clientX - drag.x, dy = e.clientY - drag.y;
    if (!drag.moved && Math.abs(dx) + Math.abs(dy) < 4) return;
    if (!drag.moved) { drag.moved = true; svg.classList.add('panning'); }
    changeView({ x: drag.vx + dx, y: drag.vy + dy, k: view.k });
  });
  window.addEventListener('pointerup', function () {
    svg.classList.remove('panning');
    setTimeout(function () { drag = null; }, 0);
  });

  svg.addEventListener('dblclick', function (e) {
    e.preventDefault();
    changeView({ x: 0, y: 0, k: 1 });
  });

  svg.addEventListener('click', function (e) {
    if (drag && drag.moved) return;
    var icon = e.target.closest('.description-icon');
    if (icon) {
      e.stopPropagation();
      var id = icon.getAttribute('data-node-id');
      var callout = document.getElementById('callout-' + id);
      var wasOpen = open === callout;
      closeCallout();
      if (!callout || wasOpen) return;
      var ax = parseFloat(callout.getAttribute('data-x')), ay = parseFloat(callout.getAttribute('data-y'));
      callout.style.left = (ax * view.k + view.x + cfg.iconRadius + 4) + 'px';
      callout.style.top = (ay * view.k + view.y) + 'px';
      callout.hidden = false;
      open = callout;
      return;
    }
    var node = e.target.closest('.node.linked');
    if (node) {
      window.location.href = node.getAttribute('data-href');
      return;
    }
    closeCallout();
  });

  document.addEventListener('click', function (e) {
    if (open && !open.contains(e.target) && !svg.contains(e.target)) closeCallout();
  });
  Array.prototype.forEach.call(document.querySelectorAll('.callout .close'), function (b) {
    b.addEventListener('click', closeCallout);
  });
  document.addEventListener('keydown', function (e) {
    if (e.key === 'Escape') closeCallout();
  });

  document.getElementById('zoom-in').addEventListener('click', function () { center(cfg.step); });
  document.getElementById('zoom-out').addEventListener('click', function () { center(1 / cfg.step); });
  document.getElementById('fit').addEventListener('click', fit);
  window.addEventListener('resize', fit);
  fit();
})();
"#;

/// Builds `index.html` for a rendered scene.
pub fn index_html(scene: &Scene, rendered: &RenderedScene, settings: &SceneSettings) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"utf-8\">");
    let _ = writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
    );
    let _ = writeln!(out, "<title>{}</title>", escape_xml(&scene.title));
    let _ = writeln!(out, "<style>{STYLE}</style>");
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");

    let _ = writeln!(out, "<header>");
    let _ = writeln!(out, "<h1>{}</h1>", escape_xml(&scene.title));
    if let Some(description) = scene.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "<p>{}</p>", escape_xml(description));
    }
    let _ = writeln!(out, "</header>");

    let _ = writeln!(out, "<div id=\"stage\">");
    let _ = writeln!(
        out,
        "<svg id=\"map\" xmlns=\"http://www.w3.org/2000/svg\" data-view=\"{}\">",
        escape_xml(&view_config(scene))
    );
    write_defs(&mut out, rendered);
    let _ = writeln!(out, "<g id=\"viewport\">");
    let mut body = String::new();
    write_commands(&mut body, rendered);
    out.push_str(&mark_linked_nodes(&body, scene));
    let _ = writeln!(out, "</g>");
    let _ = writeln!(out, "</svg>");

    let _ = writeln!(out, "<div class=\"toolbar\">");
    let _ = writeln!(out, "<button id=\"zoom-in\" title=\"Zoom in\">+</button>");
    let _ = writeln!(out, "<button id=\"zoom-out\" title=\"Zoom out\">&minus;</button>");
    let _ = writeln!(out, "<button id=\"fit\" title=\"Fit to screen\">Fit</button>");
    let _ = writeln!(out, "</div>");

    write_callouts(&mut out, scene);
    if settings.show_legend {
        write_legend(&mut out, scene, rendered, settings);
    }
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "<script>{SCRIPT}</script>");
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}

/// View constants and content bounds handed to the page script.
fn view_config(scene: &Scene) -> String {
    let bounds = match content_bounds(&scene.nodes) {
        Some(b) => format!(
            "[{},{},{},{}]",
            fmt_num(b.x),
            fmt_num(b.y),
            fmt_num(b.x + b.width),
            fmt_num(b.y + b.height)
        ),
        None => "null".to_string(),
    };
    format!(
        "{{\"bounds\":{bounds},\"padding\":{FIT_PADDING},\"maxFit\":{FIT_MAX_SCALE},\"minZoom\":{MIN_ZOOM},\"maxZoom\":{MAX_ZOOM},\"step\":{ZOOM_STEP},\"iconRadius\":{DESCRIPTION_ICON_RADIUS}}}"
    )
}

/// Tags nodes that have a references page so the script can navigate on click.
fn mark_linked_nodes(body: &str, scene: &Scene) -> String {
    let mut out = body.to_string();
    for node in scene.nodes.iter().filter(|n| n.link_to_references) {
        let plain = format!("<g class=\"node\" data-node-id=\"{}\">", node.id);
        let linked = format!(
            "<g class=\"node linked\" data-node-id=\"{}\" data-href=\"{}\">",
            node.id,
            node_page_path(node.id)
        );
        out = out.replacen(&plain, &linked, 1);
    }
    out
}

fn write_callouts(out: &mut String, scene: &Scene) {
    for node in &scene.nodes {
        let Some(description) = node.description_text() else {
            continue;
        };
        let _ = writeln!(
            out,
            "<div class=\"callout\" id=\"callout-{}\" data-x=\"{}\" data-y=\"{}\" hidden>",
            node.id,
            fmt_num(node.x + node.width),
            fmt_num(node.y)
        );
        let _ = writeln!(out, "<button class=\"close\" title=\"Close\">&times;</button>");
        let _ = writeln!(out, "<h3>{}</h3>", escape_xml(&node.label));
        let _ = writeln!(out, "<p>{}</p>", escape_xml(description));
        if node.link_to_references {
            let _ = writeln!(
                out,
                "<a href=\"{}\">View references</a>",
                node_page_path(node.id)
            );
        }
        let _ = writeln!(out, "</div>");
    }
}

fn write_legend(
    out: &mut String,
    scene: &Scene,
    rendered: &RenderedScene,
    settings: &SceneSettings,
) {
    let entries = legend_entries(&scene.nodes, settings);
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "<aside class=\"legend\">");
    let _ = writeln!(out, "<h2>Legend</h2>");
    let _ = writeln!(out, "<ul>");
    for entry in entries {
        let pattern = if settings.show_patterns && rendered.patterns.contains(&entry.pattern) {
            format!(
                "<rect width=\"18\" height=\"18\" fill=\"url(#{})\" />",
                super::svg::pattern_id(entry.pattern)
            )
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "<li><svg width=\"18\" height=\"18\" aria-hidden=\"true\"><rect width=\"18\" height=\"18\" rx=\"3\" fill=\"{}\" />{pattern}</svg><span>{}</span></li>",
            escape_xml(&entry.color),
            escape_xml(&entry.label)
        );
    }
    let _ = writeln!(out, "</ul>");
    let _ = writeln!(out, "</aside>");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{render_scene, RenderOptions};
    use crate::types::*;

    fn scene() -> Scene {
        let mut scene = Scene::new("A <b> map");
        let mut a = Node::new("Described", (0.0, 0.0));
        a.description = Some("Some notes".into());
        a.background_color = "#FF0000".into();
        let mut b = Node::new("Plain", (300.0, 0.0));
        b.link_to_references = false;
        scene.nodes = vec![a, b];
        scene
    }

    fn page(scene: &Scene, settings: &SceneSettings) -> String {
        let rendered = render_scene(scene, &RenderOptions::read_only(settings.show_patterns));
        index_html(scene, &rendered, settings)
    }

    #[test]
    fn test_callouts_only_for_described_nodes() {
        let scene = scene();
        let html = page(&scene, &SceneSettings::default());
        assert_eq!(html.matches("class=\"callout\"").count(), 1);
        assert!(html.contains(&format!("id=\"callout-{}\"", scene.nodes[0].id)));
        assert!(html.contains("<title>A &lt;b&gt; map</title>"));
    }

    #[test]
    fn test_linked_nodes_navigate_relatively() {
        let scene = scene();
        let html = page(&scene, &SceneSettings::default());
        assert!(html.contains(&format!(
            "data-href=\"nodes/{}.html\"",
            scene.nodes[0].id
        )));
        assert!(html.contains(&format!(
            "<g class=\"node\" data-node-id=\"{}\">",
            scene.nodes[1].id
        )));
    }

    #[test]
    fn test_legend_follows_settings() {
        let scene = scene();
        let hidden = page(&scene, &SceneSettings::default());
        assert!(!hidden.contains("class=\"legend\""));

        let mut settings = SceneSettings {
            show_legend: true,
            show_patterns: true,
            ..Default::default()
        };
        settings
            .legend_labels
            .insert("#FF0000".into(), "Primary sources".into());
        let shown = page(&scene, &settings);
        assert!(shown.contains("Primary sources"));
        assert!(shown.contains("Category 2"));
        assert!(shown.contains("fill=\"url(#pattern-stripes)\""));
    }

    #[test]
    fn test_view_config_matches_editor_constants() {
        let config: serde_json::Value = serde_json::from_str(&view_config(&scene())).unwrap();
        assert_eq!(config["bounds"], serde_json::json!([0, 0, 450, 60]));
        assert_eq!(config["padding"], 50.0);
        assert_eq!(config["maxFit"], 2.0);
        assert_eq!(config["minZoom"], 0.25);
        assert_eq!(config["maxZoom"], 4.0);

        let empty = view_config(&Scene::new("empty"));
        assert!(empty.contains("\"bounds\":null"));
    }

    #[test]
    fn test_script_fit_respects_zoom_range() {
        assert!(SCRIPT.contains(
            "var k = Math.max(cfg.minZoom, Math.min(r.width / cw, r.height / ch, cfg.maxFit));"
        ));
    }
}
