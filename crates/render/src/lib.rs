//! Software rasterizer for the ink layer.
//!
//! A full repaint draws the persisted snapshot (scaled to fit the fixed
//! document width, preserving aspect ratio) and then replays every stroke in
//! insertion order with its own color, width, opacity and blend mode.
//! Repainting is a pure function of its inputs, so redrawing with unchanged
//! state produces a pixel-identical surface.

use image::imageops::FilterType;
use image::{ImageBuffer, Rgba};

use quillpad_core::{
    Color, InkRasterizer, PageGeometry, RasterError, Stroke, StrokeKind,
};

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Page background.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Backing-store ceiling; sane geometry never reaches it, so exceeding it
/// indicates corrupt input.
const MAX_SURFACE_DIM: u32 = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
}

/// Render the ink layer at `scale` pixels per document unit.
///
/// `scale` is the product of zoom and device pixel ratio for on-screen
/// surfaces, `1.0` for persisted snapshots, or the export scale factor.
/// Stored stroke coordinates are untouched; only the rendering scales.
pub fn render_ink(
    strokes: &[Stroke],
    snapshot_png: Option<&[u8]>,
    geometry: &PageGeometry,
    scale: f32,
) -> Result<RgbaImage, RenderError> {
    let width = (geometry.doc_width() * scale).round().max(1.0) as u32;
    let height = (geometry.page_height() * scale).round().max(1.0) as u32;
    if width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
        return Err(RenderError::InvalidSize { width, height });
    }

    let mut surface = RgbaImage::from_pixel(width, height, BACKGROUND);
    if let Some(png) = snapshot_png {
        draw_snapshot(&mut surface, png, geometry.doc_width(), scale)?;
    }
    for stroke in strokes {
        draw_stroke(&mut surface, stroke, scale);
    }
    Ok(surface)
}

/// Draw a previously persisted snapshot scaled to the document width.
fn draw_snapshot(
    surface: &mut RgbaImage,
    png: &[u8],
    doc_width: f32,
    scale: f32,
) -> Result<(), RenderError> {
    let decoded = image::load_from_memory(png)?.to_rgba8();
    let (w, h) = decoded.dimensions();
    if w == 0 || h == 0 {
        return Ok(());
    }
    let target_w = (doc_width * scale).round().max(1.0) as u32;
    let target_h = ((h as f32) * target_w as f32 / w as f32).round().max(1.0) as u32;
    let resized = if (target_w, target_h) == (w, h) {
        decoded
    } else {
        image::imageops::resize(&decoded, target_w, target_h, FilterType::Triangle)
    };
    image::imageops::overlay(surface, &resized, 0, 0);
    Ok(())
}

/// Replay one stroke.
///
/// The stroke path is stamped into a coverage mask first and composited in
/// a single pass, so overlapping stamps within one stroke do not compound
/// its opacity. Pen strokes composite source-over; highlighter strokes
/// multiply against the destination, which makes overlapping *separate*
/// passes darken.
fn draw_stroke(surface: &mut RgbaImage, stroke: &Stroke, scale: f32) {
    let Some((min_x, min_y, max_x, max_y)) = stroke.bounds() else {
        return;
    };
    let radius = (stroke.width * scale / 2.0).max(0.5);
    let (sw, sh) = surface.dimensions();

    let x0 = ((min_x * scale - radius).floor().max(0.0)) as u32;
    let y0 = ((min_y * scale - radius).floor().max(0.0)) as u32;
    let x1 = (((max_x * scale + radius).ceil().max(0.0)) as u32).min(sw.saturating_sub(1));
    let y1 = (((max_y * scale + radius).ceil().max(0.0)) as u32).min(sh.saturating_sub(1));
    if x0 > x1 || y0 > y1 {
        return;
    }
    let bw = x1 - x0 + 1;
    let bh = y1 - y0 + 1;
    let mut mask = vec![false; (bw as usize) * (bh as usize)];

    let mut stamp = |cx: f32, cy: f32| {
        let px0 = ((cx - radius).floor().max(x0 as f32)) as u32;
        let px1 = ((cx + radius).ceil().min(x1 as f32)).max(0.0) as u32;
        let py0 = ((cy - radius).floor().max(y0 as f32)) as u32;
        let py1 = ((cy + radius).ceil().min(y1 as f32)).max(0.0) as u32;
        for py in py0..=py1 {
            for px in px0..=px1 {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= radius * radius {
                    mask[((py - y0) * bw + (px - x0)) as usize] = true;
                }
            }
        }
    };

    let points = &stroke.points;
    if points.len() == 1 {
        stamp(points[0].x * scale, points[0].y * scale);
    } else {
        for pair in points.windows(2) {
            let (ax, ay) = (pair[0].x * scale, pair[0].y * scale);
            let (bx, by) = (pair[1].x * scale, pair[1].y * scale);
            let length = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
            let step = (radius * 0.5).max(0.5);
            let count = (length / step).ceil().max(1.0) as u32;
            for i in 0..=count {
                let t = i as f32 / count as f32;
                stamp(ax + (bx - ax) * t, ay + (by - ay) * t);
            }
        }
    }

    composite_mask(surface, &mask, x0, y0, bw, bh, stroke.color, stroke.opacity, stroke.kind);
}

#[allow(clippy::too_many_arguments)]
fn composite_mask(
    surface: &mut RgbaImage,
    mask: &[bool],
    x0: u32,
    y0: u32,
    bw: u32,
    bh: u32,
    color: Color,
    opacity: f32,
    kind: StrokeKind,
) {
    let alpha = opacity.clamp(0.0, 1.0);
    let src = [color.r as f32, color.g as f32, color.b as f32];
    for row in 0..bh {
        for col in 0..bw {
            if !mask[(row * bw + col) as usize] {
                continue;
            }
            let pixel = surface.get_pixel_mut(x0 + col, y0 + row);
            for c in 0..3 {
                let dst = pixel.0[c] as f32;
                let blended = match kind {
                    StrokeKind::Pen => src[c],
                    StrokeKind::Highlighter => src[c] * dst / 255.0,
                };
                pixel.0[c] = (blended * alpha + dst * (1.0 - alpha)).round() as u8;
            }
            pixel.0[3] = 255;
        }
    }
}

/// Encode a surface as PNG, the snapshot wire format.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// The session-facing rasterizer: flattens ink to a PNG snapshot at
/// document resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rasterizer;

impl InkRasterizer for Rasterizer {
    fn rasterize(
        &self,
        strokes: &[Stroke],
        snapshot_png: Option<&[u8]>,
        geometry: &PageGeometry,
    ) -> Result<Vec<u8>, RasterError> {
        let surface = render_ink(strokes, snapshot_png, geometry, 1.0)
            .map_err(|e| RasterError::Failed(e.to_string()))?;
        encode_png(&surface).map_err(|e| RasterError::Failed(e.to_string()))
    }

    fn png_size(&self, png: &[u8]) -> Option<(u32, u32)> {
        image::load_from_memory(png).ok().map(|img| (img.width(), img.height()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillpad_core::{InkLayer, InputDevice, StrokePoint, Tool};

    fn geometry() -> PageGeometry {
        PageGeometry::with_doc_width(200.0)
    }

    fn stroke_with(tool: Tool, color: Color, width: f32, points: &[(f32, f32)]) -> Stroke {
        let mut layer = InkLayer::new();
        let first = points[0];
        layer.begin_stroke(
            StrokePoint::new(first.0, first.1, 1.0),
            tool,
            InputDevice::Mouse,
            color,
            width,
            1.0,
            false,
        );
        for &(x, y) in &points[1..] {
            layer.extend_stroke(StrokePoint::new(x, y, 1.0));
        }
        layer.end_stroke();
        layer.strokes()[0].clone()
    }

    fn pen_stroke(points: &[(f32, f32)]) -> Stroke {
        stroke_with(Tool::Pen, Color::BLACK, 4.0, points)
    }

    fn highlighter_stroke(points: &[(f32, f32)]) -> Stroke {
        stroke_with(Tool::Highlighter, Color::YELLOW, 12.0, points)
    }

    fn is_background(pixel: &Rgba<u8>) -> bool {
        *pixel == BACKGROUND
    }

    #[test]
    fn redraw_is_pixel_identical() {
        let strokes = vec![
            pen_stroke(&[(10.0, 10.0), (50.0, 10.0)]),
            highlighter_stroke(&[(20.0, 30.0), (80.0, 30.0)]),
        ];
        let geometry = geometry();

        let first = render_ink(&strokes, None, &geometry, 1.0).unwrap();
        let second = render_ink(&strokes, None, &geometry, 1.0).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn stroke_leaves_ink_along_its_path() {
        let stroke = pen_stroke(&[(10.0, 10.0), (50.0, 10.0), (50.0, 50.0)]);
        let surface = render_ink(&[stroke], None, &geometry(), 1.0).unwrap();

        for (x, y) in [(10u32, 10u32), (30, 10), (50, 10), (50, 30), (50, 50)] {
            assert!(!is_background(surface.get_pixel(x, y)), "no ink at ({x},{y})");
        }
        assert!(is_background(surface.get_pixel(150, 150)));
    }

    #[test]
    fn rendering_scale_preserves_proportions() {
        let stroke = pen_stroke(&[(10.0, 10.0), (50.0, 10.0)]);
        let geometry = geometry();

        let at_1x = render_ink(std::slice::from_ref(&stroke), None, &geometry, 1.0).unwrap();
        let at_2x = render_ink(std::slice::from_ref(&stroke), None, &geometry, 2.0).unwrap();

        assert_eq!(at_2x.width(), at_1x.width() * 2);
        assert!(!is_background(at_1x.get_pixel(30, 10)));
        assert!(!is_background(at_2x.get_pixel(60, 20)));
    }

    #[test]
    fn overlapping_highlighter_passes_darken() {
        let one = vec![highlighter_stroke(&[(20.0, 30.0), (80.0, 30.0)])];
        let two = vec![
            highlighter_stroke(&[(20.0, 30.0), (80.0, 30.0)]),
            highlighter_stroke(&[(20.0, 30.0), (80.0, 30.0)]),
        ];
        let geometry = geometry();

        let single = render_ink(&one, None, &geometry, 1.0).unwrap();
        let double = render_ink(&two, None, &geometry, 1.0).unwrap();

        let p1 = single.get_pixel(50, 30);
        let p2 = double.get_pixel(50, 30);
        // Yellow multiplies blue down; each pass darkens further instead of
        // stacking to full opacity.
        assert!(p2.0[2] < p1.0[2]);
        assert!(p1.0[2] < BACKGROUND.0[2]);
    }

    #[test]
    fn single_highlighter_pass_stays_translucent() {
        let stroke = highlighter_stroke(&[(20.0, 30.0), (80.0, 30.0)]);
        let surface = render_ink(&[stroke], None, &geometry(), 1.0).unwrap();
        let pixel = surface.get_pixel(50, 30);
        // Not the fully saturated highlighter color: opacity is capped.
        assert!(pixel.0[2] > 0);
        assert!(!is_background(pixel));
    }

    #[test]
    fn snapshot_is_scaled_to_document_width() {
        // A 100x50 red snapshot under a 200-wide document covers 200x100.
        let red = RgbaImage::from_pixel(100, 50, Rgba([255, 0, 0, 255]));
        let png = encode_png(&red).unwrap();
        let surface = render_ink(&[], Some(&png), &geometry(), 1.0).unwrap();

        let top_left = surface.get_pixel(5, 5);
        let stretched = surface.get_pixel(195, 95);
        assert!(top_left.0[0] > 200 && top_left.0[1] < 60);
        assert!(stretched.0[0] > 200 && stretched.0[1] < 60);
        assert!(is_background(surface.get_pixel(195, 150)));
    }

    #[test]
    fn strokes_draw_over_snapshot() {
        let red = RgbaImage::from_pixel(200, 200, Rgba([255, 0, 0, 255]));
        let png = encode_png(&red).unwrap();
        let stroke = pen_stroke(&[(10.0, 10.0), (50.0, 10.0)]);
        let surface = render_ink(&[stroke], Some(&png), &geometry(), 1.0).unwrap();

        let inked = surface.get_pixel(30, 10);
        assert!(inked.0[0] < 60 && inked.0[1] < 60 && inked.0[2] < 60);
    }

    #[test]
    fn png_round_trip() {
        let stroke = pen_stroke(&[(10.0, 10.0), (40.0, 40.0)]);
        let surface = render_ink(&[stroke], None, &geometry(), 1.0).unwrap();
        let png = encode_png(&surface).unwrap();
        let decoded = decode_png(&png).unwrap();
        assert_eq!(surface.as_raw(), decoded.as_raw());
    }

    #[test]
    fn rasterizer_reports_snapshot_size() {
        let surface = RgbaImage::from_pixel(64, 32, BACKGROUND);
        let png = encode_png(&surface).unwrap();
        assert_eq!(Rasterizer.png_size(&png), Some((64, 32)));
        assert_eq!(Rasterizer.png_size(b"not a png"), None);
    }

    #[test]
    fn oversized_geometry_is_rejected() {
        let geometry = PageGeometry::with_doc_width(20_000.0);
        assert!(matches!(
            render_ink(&[], None, &geometry, 1.0),
            Err(RenderError::InvalidSize { .. })
        ));
    }
}
