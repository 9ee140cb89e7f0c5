//! PNG rasterization of the exported SVG (native builds only).

use super::svg::SvgDocument;
use crate::error::ExportError;
use std::sync::Arc;
use tiny_skia::Pixmap;

pub const MIN_PNG_SCALE: f32 = 0.25;
pub const MAX_PNG_SCALE: f32 = 8.0;

/// Rasterizes an SVG document at `scale` (clamped to a sane range).
///
/// # Arguments
///
/// * `document` - Output of [`super::svg::build_svg`]
/// * `scale` - Pixels per SVG unit
///
/// # Returns
///
/// The rendered pixmap, or an error if the SVG could not be parsed or the pixmap allocated
pub fn rasterize(document: &SvgDocument, scale: f32) -> Result<Pixmap, ExportError> {
    let mut opt = usvg::Options::default();
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    opt.fontdb = Arc::new(db);

    let tree = usvg::Tree::from_data(document.svg.as_bytes(), &opt)
        .map_err(|e| ExportError::Svg(e.to_string()))?;

    let scale = scale.clamp(MIN_PNG_SCALE, MAX_PNG_SCALE);
    let out_w = ((document.width as f32) * scale).round().max(1.0) as u32;
    let out_h = ((document.height as f32) * scale).round().max(1.0) as u32;

    let mut pixmap = Pixmap::new(out_w, out_h)
        .ok_or_else(|| ExportError::Png(format!("cannot allocate {out_w}x{out_h} pixmap")))?;
    let transform = tiny_skia::Transform::from_scale(scale, scale);
    resvg::render(&tree, transform, &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Rasterizes and encodes to PNG bytes.
pub fn render_png(document: &SvgDocument, scale: f32) -> Result<Vec<u8>, ExportError> {
    let pixmap = rasterize(document, scale)?;
    pixmap
        .encode_png()
        .map_err(|e| ExportError::Png(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::svg::{build_svg, SvgOptions};
    use crate::render::{render_scene, RenderOptions};
    use crate::types::{Node, Scene};

    fn document() -> SvgDocument {
        let mut scene = Scene::new("png");
        scene.nodes.push(Node::new("A", (0.0, 0.0)));
        let rendered = render_scene(&scene, &RenderOptions::read_only(false));
        build_svg(&scene, &rendered, &SvgOptions::default())
    }

    #[test]
    fn test_rasterize_scales_document() {
        let doc = document();
        let pixmap = rasterize(&doc, 2.0).unwrap();
        assert_eq!(pixmap.width(), doc.width * 2);
        assert_eq!(pixmap.height(), doc.height * 2);
    }

    #[test]
    fn test_scale_is_clamped() {
        let doc = document();
        let pixmap = rasterize(&doc, 0.0).unwrap();
        assert_eq!(
            pixmap.width(),
            ((doc.width as f32) * MIN_PNG_SCALE).round() as u32
        );
    }

    #[test]
    fn test_png_signature() {
        let bytes = render_png(&document(), 1.0).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_invalid_svg_is_reported() {
        let doc = SvgDocument {
            svg: "not svg".into(),
            width: 10,
            height: 10,
        };
        assert!(matches!(rasterize(&doc, 1.0), Err(ExportError::Svg(_))));
    }
}
