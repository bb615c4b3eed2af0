//! Offline PDF composition of a note.
//!
//! The composition happens at the fixed document width, never the zoomed
//! display width: lay out the rich text, rasterize the ink layer at a fixed
//! high-resolution scale, slice the tall ink raster into fixed-height pages
//! and emit each page with its text runs and inline images. Image lookups
//! are bounded by a timeout so a slow or broken source cannot hang the
//! export; unresolved images are skipped.

use std::collections::HashMap;
use std::time::Duration;

use doc_model::{layout, LayoutMetrics, RichDocument, TextStyle, STYLE_MARKER};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use quillpad_core::{PageGeometry, Stroke};
use quillpad_render::{render_ink, RgbaImage};

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("ink render failed: {0}")]
    Render(#[from] quillpad_render::RenderError),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("PDF assembly failed: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of inline image bytes during export.
///
/// `resolve` must return within roughly `deadline`; returning `None` (miss
/// or timeout) makes the export proceed without that image.
pub trait ImageResolver {
    fn resolve(&self, src: &str, deadline: Duration) -> Option<Vec<u8>>;
}

/// Resolver with no sources; every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImages;

impl ImageResolver for NoImages {
    fn resolve(&self, _src: &str, _deadline: Duration) -> Option<Vec<u8>> {
        None
    }
}

/// Resolver over an in-memory cache of already-loaded image bytes.
#[derive(Debug, Default)]
pub struct MemoryImages {
    images: HashMap<String, Vec<u8>>,
}

impl MemoryImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, src: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(src.into(), bytes);
    }
}

impl ImageResolver for MemoryImages {
    fn resolve(&self, src: &str, _deadline: Duration) -> Option<Vec<u8>> {
        self.images.get(src).cloned()
    }
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Output page size in PDF points.
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    /// Ink raster resolution in pixels per document unit, independent of
    /// the on-screen zoom.
    pub raster_scale: f32,
    /// Bounded wait per inline image.
    pub image_wait: Duration,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        // A4 portrait.
        Self {
            page_width_pt: 595.0,
            page_height_pt: 842.0,
            raster_scale: 2.0,
            image_wait: Duration::from_secs(3),
        }
    }
}

impl ComposeOptions {
    /// Height of one page slice in document units.
    fn slice_height(&self, doc_width: f32) -> f32 {
        self.page_height_pt * doc_width / self.page_width_pt
    }
}

/// Number of page slices needed to cover `content_height`.
pub fn page_count(content_height: f32, slice_height: f32) -> usize {
    if content_height <= 0.0 || slice_height <= 0.0 {
        return 1;
    }
    ((content_height / slice_height).ceil() as usize).max(1)
}

/// Compose a note into PDF bytes.
///
/// `strokes` is the live stroke list for the open note; for other notes the
/// caller passes an empty list and the persisted `snapshot_png` stands in
/// for the ink layer.
pub fn compose_note(
    doc: &RichDocument,
    strokes: &[Stroke],
    snapshot_png: Option<&[u8]>,
    geometry: &PageGeometry,
    resolver: &dyn ImageResolver,
    options: &ComposeOptions,
) -> Result<Vec<u8>, ComposeError> {
    let doc_width = geometry.doc_width();
    let metrics = LayoutMetrics::default();
    let doc_layout = layout::measure(doc, doc_width, &metrics);

    let slice_height = options.slice_height(doc_width);
    let content_height = doc_layout.content_height.max(geometry.page_height());
    let pages = page_count(content_height, slice_height);

    // The ink layer rendered in one tall raster covering every page.
    let mut ink_geometry = geometry.clone();
    ink_geometry.expand_to(slice_height * pages as f32);
    let ink_raster = render_ink(strokes, snapshot_png, &ink_geometry, options.raster_scale)?;

    // Resolve inline images up front, bounded per image.
    let mut resolved: HashMap<String, RgbaImage> = HashMap::new();
    for laid in &doc_layout.images {
        if resolved.contains_key(&laid.src) {
            continue;
        }
        match resolver.resolve(&laid.src, options.image_wait) {
            Some(bytes) => match image::load_from_memory(&bytes) {
                Ok(decoded) => {
                    resolved.insert(laid.src.clone(), decoded.to_rgba8());
                }
                Err(err) => log::warn!("skipping undecodable image {}: {err}", laid.src),
            },
            None => log::warn!("image {} unavailable within deadline, skipping", laid.src),
        }
    }

    let mut writer = PdfWriter::new(options);
    let pt_per_doc = options.page_width_pt / doc_width;

    for page_index in 0..pages {
        let slice_top = page_index as f32 * slice_height;
        let slice_bottom = slice_top + slice_height;
        let mut page = writer.begin_page();

        page.draw_ink_slice(&ink_raster, slice_top, slice_height, options.raster_scale, pt_per_doc)?;

        for laid in &doc_layout.images {
            if laid.y >= slice_top && laid.y < slice_bottom {
                if let Some(pixels) = resolved.get(&laid.src) {
                    page.draw_image(
                        pixels,
                        laid.x * pt_per_doc,
                        (laid.y - slice_top) * pt_per_doc,
                        laid.width * pt_per_doc,
                        laid.height * pt_per_doc,
                    )?;
                }
            }
        }

        for line in &doc_layout.lines {
            let baseline = line.baseline();
            if baseline >= slice_top && baseline < slice_bottom {
                for run in &line.runs {
                    page.draw_text_run(
                        &run.text,
                        &run.style,
                        run.x * pt_per_doc,
                        (baseline - slice_top) * pt_per_doc,
                        pt_per_doc,
                        &metrics,
                    );
                }
            }
        }

        writer.finish_page(page)?;
    }

    writer.into_bytes()
}

/// Incrementally built output document.
struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    font_ids: [ObjectId; 4],
    kids: Vec<Object>,
    page_width_pt: f32,
    page_height_pt: f32,
}

/// One page under construction.
struct PageBuilder {
    operations: Vec<Operation>,
    /// Image XObjects queued for this page, by resource name.
    images: Vec<(String, Stream)>,
    page_height_pt: f32,
}

const FONT_NAMES: [&str; 4] =
    ["Helvetica", "Helvetica-Bold", "Helvetica-Oblique", "Helvetica-BoldOblique"];

fn font_resource(style: &TextStyle) -> &'static str {
    match (style.bold, style.italic) {
        (false, false) => "F1",
        (true, false) => "F2",
        (false, true) => "F3",
        (true, true) => "F4",
    }
}

impl PdfWriter {
    fn new(options: &ComposeOptions) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_ids = FONT_NAMES.map(|name| {
            doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => name,
            })
        });
        Self {
            doc,
            pages_id,
            font_ids,
            kids: Vec::new(),
            page_width_pt: options.page_width_pt,
            page_height_pt: options.page_height_pt,
        }
    }

    fn begin_page(&self) -> PageBuilder {
        PageBuilder {
            operations: Vec::new(),
            images: Vec::new(),
            page_height_pt: self.page_height_pt,
        }
    }

    fn finish_page(&mut self, page: PageBuilder) -> Result<(), ComposeError> {
        let PageBuilder { operations, images, .. } = page;

        let mut xobject_refs = Dictionary::new();
        for (name, stream) in images {
            let id = self.doc.add_object(stream);
            xobject_refs.set(name.into_bytes(), Object::Reference(id));
        }

        let content = Content { operations };
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let mut fonts = Dictionary::new();
        for (name, id) in ["F1", "F2", "F3", "F4"].iter().zip(self.font_ids) {
            fonts.set(*name, Object::Reference(id));
        }
        let mut resources = dictionary! { "Font" => fonts };
        if !xobject_refs.is_empty() {
            resources.set("XObject", xobject_refs);
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(self.pages_id),
            "MediaBox" => vec![
                0.into(),
                0.into(),
                self.page_width_pt.into(),
                self.page_height_pt.into(),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => resources,
        });
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    fn into_bytes(mut self) -> Result<Vec<u8>, ComposeError> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(self.pages_id),
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

impl PageBuilder {
    /// Draw the page's slice of the tall ink raster, covering the full page
    /// width at the top of the page.
    fn draw_ink_slice(
        &mut self,
        raster: &RgbaImage,
        slice_top: f32,
        slice_height: f32,
        raster_scale: f32,
        pt_per_doc: f32,
    ) -> Result<(), ComposeError> {
        let (raster_w, raster_h) = raster.dimensions();
        let y0 = (slice_top * raster_scale).round() as u32;
        if y0 >= raster_h {
            return Ok(());
        }
        let crop_h = (((slice_height * raster_scale).round() as u32).min(raster_h - y0)).max(1);
        let slice = image::imageops::crop_imm(raster, 0, y0, raster_w, crop_h).to_image();

        let width_pt = raster_w as f32 / raster_scale * pt_per_doc;
        let height_pt = crop_h as f32 / raster_scale * pt_per_doc;
        let top_pt = self.page_height_pt; // slice starts at the page top
        self.place_image(&slice, 0.0, top_pt - height_pt, width_pt, height_pt)
    }

    /// Draw an inline image. `x`/`y_from_top` position its top-left corner
    /// in points measured from the page's top-left.
    fn draw_image(
        &mut self,
        pixels: &RgbaImage,
        x: f32,
        y_from_top: f32,
        width_pt: f32,
        height_pt: f32,
    ) -> Result<(), ComposeError> {
        let bottom = self.page_height_pt - y_from_top - height_pt;
        self.place_image(pixels, x, bottom, width_pt, height_pt)
    }

    fn place_image(
        &mut self,
        pixels: &RgbaImage,
        x: f32,
        y: f32,
        width_pt: f32,
        height_pt: f32,
    ) -> Result<(), ComposeError> {
        let (w, h) = pixels.dimensions();
        // Flatten alpha over white; DeviceRGB carries no transparency.
        let mut rgb = Vec::with_capacity((w * h * 3) as usize);
        for pixel in pixels.pixels() {
            let a = pixel.0[3] as u16;
            for c in 0..3 {
                let channel = pixel.0[c] as u16;
                rgb.push(((channel * a + 255 * (255 - a)) / 255) as u8);
            }
        }

        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w as i64,
                "Height" => h as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb,
        );
        let name = format!("Im{}", self.images.len() + 1);
        self.images.push((name.clone(), stream));

        self.operations.push(Operation::new("q", vec![]));
        self.operations.push(Operation::new(
            "cm",
            vec![width_pt.into(), 0.into(), 0.into(), height_pt.into(), x.into(), y.into()],
        ));
        self.operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.operations.push(Operation::new("Q", vec![]));
        Ok(())
    }

    /// Emit one text run at `baseline_from_top` points below the page top.
    fn draw_text_run(
        &mut self,
        text: &str,
        style: &TextStyle,
        x: f32,
        baseline_from_top: f32,
        pt_per_doc: f32,
        metrics: &LayoutMetrics,
    ) {
        let visible: String = text.chars().filter(|c| *c != STYLE_MARKER).collect();
        if visible.trim().is_empty() {
            return;
        }
        let size = style.effective_font_size() * pt_per_doc;
        let y = self.page_height_pt - baseline_from_top;

        self.operations.push(Operation::new("BT", vec![]));
        self.operations.push(Operation::new(
            "Tf",
            vec![Object::Name(font_resource(style).into()), size.into()],
        ));
        self.operations.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.operations
            .push(Operation::new("Tj", vec![Object::string_literal(visible.as_str())]));
        self.operations.push(Operation::new("ET", vec![]));

        if style.underline {
            let width = layout::text_width(text, style, metrics) * pt_per_doc;
            let underline_y = y - size * 0.15;
            self.operations.push(Operation::new("q", vec![]));
            self.operations.push(Operation::new("w", vec![(size * 0.06).max(0.4).into()]));
            self.operations.push(Operation::new("m", vec![x.into(), underline_y.into()]));
            self.operations
                .push(Operation::new("l", vec![(x + width).into(), underline_y.into()]));
            self.operations.push(Operation::new("S", vec![]));
            self.operations.push(Operation::new("Q", vec![]));
        }
    }
}
