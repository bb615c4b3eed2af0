//! Quillpad - notebook UI
//!
//! eframe front end over the notebook session: sidebar note list, toolbar,
//! the ink canvas layered over the rich text area, the ruler overlay, and
//! inline error dialogs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use eframe::egui;

use doc_model::{Inline, Selection};
use note_store::{HttpNoteStore, LocalNoteStore, MemoryNoteStore, NoteId, NoteStore};
use pdf_compose::{compose_note, ComposeOptions, ImageResolver, MemoryImages};
use quillpad_core::{
    Color, HsvColor, InputDevice, NotebookSession, ScreenPoint, Settings, SettingsStore,
    SubscriptionId, Tool, ROTATE_HANDLE_RADIUS, RULER_BODY_WIDTH,
};
use quillpad_render::Rasterizer;

fn main() -> eframe::Result {
    env_logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0])
            .with_title("Quillpad"),
        ..Default::default()
    };

    eframe::run_native(
        "Quillpad",
        options,
        Box::new(|cc| Ok(Box::new(QuillpadApp::new(cc)))),
    )
}

/// Pick the note store from the environment: a configured backend URL wins,
/// then the local JSON store, then (as a last resort) a volatile in-memory
/// store.
fn open_note_store() -> Box<dyn NoteStore> {
    if let Ok(base_url) = std::env::var("QUILLPAD_API_URL") {
        let mut store = HttpNoteStore::new(base_url);
        if let Ok(token) = std::env::var("QUILLPAD_API_TOKEN") {
            store = store.with_auth_token(token);
        }
        return Box::new(store);
    }
    match LocalNoteStore::from_default_project() {
        Ok(store) => Box::new(store),
        Err(err) => {
            log::warn!("no data directory, notes will not persist: {err}");
            Box::new(MemoryNoteStore::new())
        }
    }
}

fn settings_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("Quillpad").join("settings.json"))
}

struct QuillpadApp {
    session: NotebookSession,

    settings: Arc<SettingsStore>,
    settings_mirror: Arc<Mutex<Settings>>,
    settings_sub: SubscriptionId,

    // UI working state
    title_buffer: String,
    hsv: HsvColor,
    new_note_title: Option<String>,
    confirm_delete: Option<NoteId>,
    status: Option<String>,

    // Inserted image bytes by src, for display and export.
    image_bytes: HashMap<String, Vec<u8>>,
    image_textures: HashMap<String, egui::TextureHandle>,
    snapshot_texture: Option<(NoteId, usize, egui::TextureHandle)>,

    last_dpr: f32,
}

impl QuillpadApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Arc::new(match settings_path() {
            Some(path) => SettingsStore::load_or_default(path),
            None => SettingsStore::new(Settings::default()),
        });
        let initial = settings.get();

        let settings_mirror = Arc::new(Mutex::new(initial.clone()));
        let mirror = Arc::clone(&settings_mirror);
        let settings_sub = settings.subscribe(move |updated| {
            if let Ok(mut guard) = mirror.lock() {
                *guard = updated.clone();
            }
        });

        let mut session = NotebookSession::new(open_note_store(), Box::new(Rasterizer));
        session.set_pen_color(initial.pen_color);
        session.set_highlighter_color(initial.highlighter_color);
        session.set_pen_width(initial.pen_width);
        session.set_zoom(initial.zoom);
        session.set_autosave_quiet_period(Duration::from_millis(initial.autosave_quiet_ms));
        session.open();

        let title_buffer = session.title().to_owned();
        let hsv = HsvColor::from_color(initial.pen_color);

        Self {
            session,
            settings,
            settings_mirror,
            settings_sub,
            title_buffer,
            hsv,
            new_note_title: None,
            confirm_delete: None,
            status: None,
            image_bytes: HashMap::new(),
            image_textures: HashMap::new(),
            snapshot_texture: None,
            last_dpr: 1.0,
        }
    }

    // ----- toolbar -----

    fn show_toolbar(&mut self, ui: &mut egui::Ui, now: Instant) {
        ui.horizontal_wrapped(|ui| {
            for (tool, label) in
                [(Tool::Select, "Select"), (Tool::Pen, "Pen"), (Tool::Highlighter, "Highlighter")]
            {
                if ui.selectable_label(self.session.tool() == tool, label).clicked() {
                    self.session.set_tool(tool);
                }
            }
            let mut ruler = self.session.ruler_enabled();
            if ui.toggle_value(&mut ruler, "Ruler").changed() {
                self.session.set_ruler_enabled(ruler);
            }
            ui.separator();

            self.show_color_controls(ui);

            let mut width = self.session.pen_width();
            if ui
                .add(egui::Slider::new(&mut width, 0.5..=24.0).text("width"))
                .changed()
            {
                self.session.set_pen_width(width);
                self.settings.update(|s| s.pen_width = width);
            }
            ui.separator();

            if ui
                .add_enabled(self.session.ink().can_undo(), egui::Button::new("Undo"))
                .clicked()
            {
                self.session.undo(now);
            }
            if ui
                .add_enabled(self.session.ink().can_redo(), egui::Button::new("Redo"))
                .clicked()
            {
                self.session.redo(now);
            }
            if ui.button("Clear ink").clicked() {
                self.session.clear_ink(now);
            }
            ui.separator();

            if ui.button("B").on_hover_text("Bold selection").clicked() {
                self.session.toggle_bold(now);
            }
            if ui.button("I").on_hover_text("Italic selection").clicked() {
                self.session.toggle_italic(now);
            }
            if ui.button("U").on_hover_text("Underline selection").clicked() {
                self.session.toggle_underline(now);
            }
            if ui.button("A+").on_hover_text("Increase font size").clicked() {
                self.session.adjust_font_size(2.0, now);
            }
            if ui.button("A-").on_hover_text("Decrease font size").clicked() {
                self.session.adjust_font_size(-2.0, now);
            }
            if ui.button("Image…").clicked() {
                self.insert_image(now);
            }
            ui.separator();

            let zoom = self.session.geometry().zoom();
            if ui.button("−").on_hover_text("Zoom out").clicked() {
                self.set_zoom(zoom - 0.25);
            }
            ui.label(format!("{:.0}%", zoom * 100.0));
            if ui.button("+").on_hover_text("Zoom in").clicked() {
                self.set_zoom(zoom + 0.25);
            }
            ui.separator();

            if ui.button("Export PDF").clicked() {
                self.export_pdf();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if self.session.is_dirty() {
                    ui.label(egui::RichText::new("unsaved changes").weak());
                } else if self.session.last_saved_at().is_some() {
                    ui.label(egui::RichText::new("saved").weak());
                }
            });
        });
    }

    fn show_color_controls(&mut self, ui: &mut egui::Ui) {
        let current = self.session.pen_color();
        let swatch = egui::Color32::from_rgb(current.r, current.g, current.b);
        let size = egui::vec2(18.0, 18.0);
        let (rect, response) = ui.allocate_exact_size(size, egui::Sense::click());
        ui.painter().rect_filled(rect, 3.0, swatch);
        let popup_id = ui.make_persistent_id("pen-color-popup");
        if response.clicked() {
            ui.memory_mut(|m| m.toggle_popup(popup_id));
        }
        egui::popup_below_widget(
            ui,
            popup_id,
            &response,
            egui::PopupCloseBehavior::CloseOnClickOutside,
            |ui| {
                ui.set_min_width(220.0);
                let mut changed = false;
                changed |= ui
                    .add(egui::Slider::new(&mut self.hsv.h, 0.0..=360.0).text("hue"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.hsv.s, 0.0..=1.0).text("saturation"))
                    .changed();
                changed |= ui
                    .add(egui::Slider::new(&mut self.hsv.v, 0.0..=1.0).text("value"))
                    .changed();
                if changed {
                    let color = self.hsv.to_color();
                    self.session.set_pen_color(color);
                    self.settings.update(|s| s.pen_color = color);
                }
                ui.horizontal(|ui| {
                    for color in [Color::BLACK, Color::RED, Color::BLUE, Color::GREEN] {
                        let c32 = egui::Color32::from_rgb(color.r, color.g, color.b);
                        if ui.add(egui::Button::new("  ").fill(c32)).clicked() {
                            self.hsv = HsvColor::from_color(color);
                            self.session.set_pen_color(color);
                            self.settings.update(|s| s.pen_color = color);
                        }
                    }
                });
                ui.label(egui::RichText::new(self.session.pen_color().to_hex()).monospace());
            },
        );
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.session.set_zoom(zoom);
        let clamped = self.session.geometry().zoom();
        self.settings.update(|s| s.zoom = clamped);
    }

    // ----- sidebar -----

    fn show_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Notes");
            if ui.button("New").clicked() {
                self.new_note_title = Some(String::new());
            }
        });
        ui.separator();

        let notes: Vec<(NoteId, String, i64)> = self
            .session
            .notes()
            .iter()
            .map(|n| (n.id, n.title.clone(), n.updated_at))
            .collect();
        let current = self.session.current_note_id();

        egui::ScrollArea::vertical().show(ui, |ui| {
            for (id, title, updated_at) in notes {
                ui.horizontal(|ui| {
                    let selected = current == Some(id);
                    let label = if title.is_empty() { "(untitled)".to_owned() } else { title };
                    if ui.selectable_label(selected, label).clicked() && !selected {
                        self.session.switch_note(id);
                        self.title_buffer = self.session.title().to_owned();
                        self.snapshot_texture = None;
                    }
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.small_button("🗑").clicked() {
                            self.confirm_delete = Some(id);
                        }
                        ui.label(egui::RichText::new(format_updated_at(updated_at)).weak().small());
                    });
                });
            }
        });
    }

    // ----- notebook page -----

    fn show_page(&mut self, ui: &mut egui::Ui, now: Instant) {
        // Title row doubles as the rename control.
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.title_buffer)
                    .hint_text("Note title")
                    .desired_width(320.0),
            );
            if response.changed() {
                self.session.set_title(&self.title_buffer, now);
            }
        });
        ui.add_space(4.0);

        let geometry = self.session.geometry();
        let zoom = geometry.zoom();
        let page_size =
            egui::vec2(geometry.doc_width() * zoom, geometry.page_height() * zoom);

        egui::ScrollArea::both().show(ui, |ui| {
            let (page_rect, _) = ui.allocate_exact_size(page_size, egui::Sense::hover());
            let painter = ui.painter_at(page_rect.expand(RULER_BODY_WIDTH));
            painter.rect_filled(page_rect, 2.0, egui::Color32::WHITE);

            self.paint_snapshot(ui.ctx(), &painter, page_rect);
            self.show_text_layer(ui, page_rect, now);
            self.paint_ink(&painter, page_rect);
            self.paint_ruler(&painter);
            self.handle_canvas_input(ui, page_rect, now);
        });
    }

    /// The rich text layer: an editable plain-text mirror styled through a
    /// custom layouter driven by the document model.
    fn show_text_layer(&mut self, ui: &mut egui::Ui, page_rect: egui::Rect, now: Instant) {
        let zoom = self.session.geometry().zoom();
        let doc_width = self.session.geometry().doc_width();
        let mut text = self.session.doc().plain_text();
        let styled_source = text.clone();
        let fragments = styled_fragments(self.session.doc(), zoom, ui.visuals().strong_text_color());

        let mut layouter = |ui: &egui::Ui, source: &str, wrap_width: f32| {
            let mut job = egui::text::LayoutJob::default();
            if source == styled_source {
                for (fragment, format) in &fragments {
                    job.append(fragment, 0.0, format.clone());
                }
            } else {
                job.append(
                    source,
                    0.0,
                    egui::TextFormat {
                        font_id: egui::FontId::proportional(16.0 * zoom),
                        color: ui.visuals().text_color(),
                        ..Default::default()
                    },
                );
            }
            job.wrap.max_width = wrap_width;
            ui.fonts(|f| f.layout_job(job))
        };

        let text_rect = egui::Rect::from_min_size(
            page_rect.min + egui::vec2(8.0 * zoom, 8.0 * zoom),
            egui::vec2(doc_width * zoom - 16.0 * zoom, page_rect.height() - 16.0 * zoom),
        );

        // With a drawing tool (or the ruler) active the canvas owns the
        // pointer, so the text layer is painted read-only.
        let editing = self.session.tool() == Tool::Select && !self.session.ruler_enabled();
        if editing {
            let output = ui
                .allocate_new_ui(egui::UiBuilder::new().max_rect(text_rect), |ui| {
                    egui::TextEdit::multiline(&mut text)
                        .frame(false)
                        .desired_width(f32::INFINITY)
                        .layouter(&mut layouter)
                        .show(ui)
                })
                .inner;

            if output.response.changed() {
                self.session.apply_text_edit(&text, now);
            }
            if let Some(range) = output.cursor_range {
                self.session.set_selection(Selection::new(
                    range.secondary.ccursor.index,
                    range.primary.ccursor.index,
                ));
            }
        } else {
            let galley = layouter(ui, &styled_source, text_rect.width());
            ui.painter().galley(text_rect.min, galley, egui::Color32::from_gray(40));
        }

        // Inline images, stacked under the text area at their display size.
        let images: Vec<(String, f32, f32)> = self
            .session
            .doc()
            .blocks
            .iter()
            .flat_map(|block| &block.inlines)
            .filter_map(|inline| match inline {
                Inline::Image(image) => {
                    let (w, h) = image.display_size(doc_width);
                    Some((image.src.clone(), w, h))
                }
                Inline::Run(_) => None,
            })
            .collect();
        let mut y = text_rect.min.y;
        for (src, w, h) in images {
            if let Some(texture) = self.image_texture(ui.ctx(), &src) {
                let rect = egui::Rect::from_min_size(
                    egui::pos2(text_rect.min.x, y),
                    egui::vec2(w * zoom, h * zoom),
                );
                y += h * zoom + 6.0;
                ui.painter().image(
                    texture.id(),
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
        }
    }

    fn paint_snapshot(&mut self, ctx: &egui::Context, painter: &egui::Painter, page_rect: egui::Rect) {
        let Some(current) = self.session.current_note_id() else {
            return;
        };
        let Some(png) = self.session.snapshot_png() else {
            return;
        };
        let fingerprint = png.len();
        let cached = matches!(
            &self.snapshot_texture,
            Some((id, len, _)) if *id == current && *len == fingerprint
        );
        if !cached {
            let Ok(decoded) = quillpad_render::decode_png(png) else {
                return;
            };
            let size = [decoded.width() as usize, decoded.height() as usize];
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_raw());
            let texture =
                ctx.load_texture("note-snapshot", color_image, egui::TextureOptions::LINEAR);
            self.snapshot_texture = Some((current, fingerprint, texture));
        }
        if let Some((_, _, texture)) = &self.snapshot_texture {
            // Scaled to the document width, preserving aspect ratio.
            let size = texture.size_vec2();
            let zoom = self.session.geometry().zoom();
            let width = self.session.geometry().doc_width() * zoom;
            let height = size.y * width / size.x;
            let rect = egui::Rect::from_min_size(page_rect.min, egui::vec2(width, height));
            painter.image(
                texture.id(),
                rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }
    }

    fn paint_ink(&self, painter: &egui::Painter, page_rect: egui::Rect) {
        let transform = self
            .session
            .geometry()
            .transform(ScreenPoint::new(page_rect.min.x, page_rect.min.y));
        let zoom = self.session.geometry().zoom();

        for stroke in self.session.ink().visible_strokes() {
            let alpha = (stroke.opacity.clamp(0.0, 1.0) * 255.0) as u8;
            let color = egui::Color32::from_rgba_unmultiplied(
                stroke.color.r,
                stroke.color.g,
                stroke.color.b,
                alpha,
            );
            let points: Vec<egui::Pos2> = stroke
                .points
                .iter()
                .map(|p| {
                    let s = transform.to_screen(quillpad_core::DocPoint::new(p.x, p.y));
                    egui::pos2(s.x, s.y)
                })
                .collect();
            if points.len() == 1 {
                painter.circle_filled(points[0], stroke.width * zoom / 2.0, color);
            } else {
                painter.add(egui::Shape::line(
                    points,
                    egui::Stroke::new(stroke.width * zoom, color),
                ));
            }
        }
    }

    fn paint_ruler(&self, painter: &egui::Painter) {
        let Some(ruler) = self.session.ruler() else {
            return;
        };
        let (dx, dy) = ruler.direction();
        let (nx, ny) = (-dy, dx);
        let half = RULER_BODY_WIDTH / 2.0;
        let a = egui::pos2(ruler.x + nx * half, ruler.y + ny * half);
        let b = egui::pos2(ruler.x - nx * half, ruler.y - ny * half);
        let c = egui::pos2(
            ruler.x + dx * ruler.length - nx * half,
            ruler.y + dy * ruler.length - ny * half,
        );
        let d = egui::pos2(
            ruler.x + dx * ruler.length + nx * half,
            ruler.y + dy * ruler.length + ny * half,
        );
        painter.add(egui::Shape::convex_polygon(
            vec![a, b, c, d],
            egui::Color32::from_rgba_unmultiplied(200, 200, 210, 90),
            egui::Stroke::new(1.0, egui::Color32::from_gray(120)),
        ));
        // The drawing edge.
        painter.line_segment(
            [
                egui::pos2(ruler.x, ruler.y),
                egui::pos2(ruler.x + dx * ruler.length, ruler.y + dy * ruler.length),
            ],
            egui::Stroke::new(1.5, egui::Color32::from_gray(70)),
        );
        let handle = ruler.handle_position();
        painter.circle(
            egui::pos2(handle.x, handle.y),
            ROTATE_HANDLE_RADIUS,
            egui::Color32::from_rgba_unmultiplied(120, 140, 255, 120),
            egui::Stroke::new(1.0, egui::Color32::from_gray(90)),
        );
    }

    fn handle_canvas_input(&mut self, ui: &mut egui::Ui, page_rect: egui::Rect, now: Instant) {
        // With the select tool and no ruler the text layer keeps the pointer.
        let wants_pointer = self.session.tool() != Tool::Select || self.session.ruler_enabled();
        if !wants_pointer {
            return;
        }
        let response = ui.interact(
            page_rect.expand(RULER_BODY_WIDTH),
            ui.id().with("ink-canvas"),
            egui::Sense::click_and_drag(),
        );
        let transform = self
            .session
            .geometry()
            .transform(ScreenPoint::new(page_rect.min.x, page_rect.min.y));

        let pointer = response.interact_pointer_pos();
        if response.drag_started() {
            if let Some(pos) = pointer {
                self.session.pointer_down(
                    ScreenPoint::new(pos.x, pos.y),
                    InputDevice::Mouse,
                    1.0,
                    &transform,
                );
            }
        } else if response.dragged() {
            if let Some(pos) = pointer {
                self.session
                    .pointer_move(ScreenPoint::new(pos.x, pos.y), 1.0, &transform);
            }
        }
        if response.drag_stopped() || response.clicked() {
            self.session.pointer_up(now);
        }
    }

    // ----- images -----

    fn insert_image(&mut self, now: Instant) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "webp"])
            .pick_file()
        else {
            return;
        };
        let src = path.to_string_lossy().to_string();
        match std::fs::read(&path) {
            Ok(bytes) => {
                // Insert first with unknown dimensions, then report them once
                // decoded, mirroring the deferred image-load flow.
                self.session.insert_image(&src, None, now);
                if let Ok(decoded) = image::load_from_memory(&bytes) {
                    self.session.image_loaded(&src, decoded.width(), decoded.height(), now);
                }
                self.image_bytes.insert(src, bytes);
            }
            Err(err) => self.status = Some(format!("could not read image: {err}")),
        }
    }

    fn image_texture(
        &mut self,
        ctx: &egui::Context,
        src: &str,
    ) -> Option<egui::TextureHandle> {
        if let Some(texture) = self.image_textures.get(src) {
            return Some(texture.clone());
        }
        let bytes = self.image_bytes.get(src)?;
        let decoded = image::load_from_memory(bytes).ok()?.to_rgba8();
        let size = [decoded.width() as usize, decoded.height() as usize];
        let color_image = egui::ColorImage::from_rgba_unmultiplied(size, decoded.as_raw());
        let texture = ctx.load_texture(format!("img-{src}"), color_image, egui::TextureOptions::LINEAR);
        self.image_textures.insert(src.to_owned(), texture.clone());
        Some(texture)
    }

    // ----- export -----

    fn export_pdf(&mut self) {
        let default_name = if self.session.title().is_empty() {
            "note.pdf".to_owned()
        } else {
            format!("{}.pdf", self.session.title())
        };
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PDF", &["pdf"])
            .set_file_name(default_name)
            .save_file()
        else {
            return;
        };

        let mut resolver = MemoryImages::new();
        for (src, bytes) in &self.image_bytes {
            resolver.insert(src.clone(), bytes.clone());
        }
        let resolver = DiskFallbackImages { cache: resolver };

        let raster_scale = self.settings_mirror.lock().map(|s| s.export_scale).unwrap_or(2.0);
        let options = ComposeOptions { raster_scale, ..Default::default() };

        let result = compose_note(
            self.session.doc(),
            self.session.ink().strokes(),
            self.session.snapshot_png(),
            self.session.geometry(),
            &resolver,
            &options,
        );
        match result.and_then(|bytes| std::fs::write(&path, bytes).map_err(Into::into)) {
            Ok(()) => self.status = Some(format!("Exported to {}", path.display())),
            Err(err) => {
                log::warn!("PDF export failed: {err}");
                self.status = Some(format!("Export failed: {err}"));
            }
        }
    }

    // ----- dialogs -----

    fn show_dialogs(&mut self, ctx: &egui::Context) {
        if let Some(mut title) = self.new_note_title.take() {
            let mut open = true;
            let mut create = false;
            egui::Window::new("New note")
                .collapsible(false)
                .resizable(false)
                .open(&mut open)
                .show(ctx, |ui| {
                    let response = ui.text_edit_singleline(&mut title);
                    create = ui.button("Create").clicked()
                        || (response.lost_focus()
                            && ui.input(|i| i.key_pressed(egui::Key::Enter)));
                });
            if create {
                let title = if title.trim().is_empty() { "Untitled note" } else { title.trim() };
                if self.session.create_note(title) {
                    self.title_buffer = self.session.title().to_owned();
                    self.snapshot_texture = None;
                }
            } else if open {
                self.new_note_title = Some(title);
            }
        }

        if let Some(id) = self.confirm_delete {
            let title = self
                .session
                .notes()
                .iter()
                .find(|n| n.id == id)
                .map(|n| n.title.clone())
                .unwrap_or_default();
            let mut done = false;
            egui::Window::new("Delete note?")
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(format!("Delete \"{title}\"? This cannot be undone."));
                    ui.horizontal(|ui| {
                        if ui.button("Cancel").clicked() {
                            done = true;
                        }
                        let delete = egui::Button::new(
                            egui::RichText::new("Delete").color(egui::Color32::WHITE),
                        )
                        .fill(egui::Color32::from_rgb(180, 40, 40));
                        if ui.add(delete).clicked() {
                            if self.session.delete_note(id) {
                                self.title_buffer = self.session.title().to_owned();
                                self.snapshot_texture = None;
                            }
                            done = true;
                        }
                    });
                });
            if done {
                self.confirm_delete = None;
            }
        }
    }

    /// Inline, dismissible error/status banner. Must be added before the
    /// central panel.
    fn show_banner(&mut self, ctx: &egui::Context) {
        if let Some(error) = self.session.last_error().map(str::to_owned) {
            egui::TopBottomPanel::bottom("error-banner").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.colored_label(egui::Color32::from_rgb(200, 60, 60), "⚠");
                    ui.label(&error);
                    if ui.small_button("Dismiss").clicked() {
                        self.session.clear_error();
                    }
                });
            });
        } else if let Some(status) = self.status.clone() {
            egui::TopBottomPanel::bottom("status-banner").show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(&status);
                    if ui.small_button("Dismiss").clicked() {
                        self.status = None;
                    }
                });
            });
        }
    }
}

impl eframe::App for QuillpadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();

        let dpr = ctx.pixels_per_point();
        if (dpr - self.last_dpr).abs() > f32::EPSILON {
            self.last_dpr = dpr;
            self.session.viewport_resized(dpr, now);
        }

        self.session.tick(now);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.show_toolbar(ui, now);
        });
        egui::SidePanel::left("sidebar").default_width(220.0).show(ctx, |ui| {
            self.show_sidebar(ui);
        });
        self.show_banner(ctx);
        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_page(ui, now);
        });
        self.show_dialogs(ctx);

        // Keep the debounce timer moving while idle.
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

impl Drop for QuillpadApp {
    fn drop(&mut self) {
        self.settings.unsubscribe(self.settings_sub);
        self.session.close();
    }
}

/// Export-time image source: the in-memory cache first, then a bounded read
/// from disk for file-path sources.
struct DiskFallbackImages {
    cache: MemoryImages,
}

impl ImageResolver for DiskFallbackImages {
    fn resolve(&self, src: &str, deadline: Duration) -> Option<Vec<u8>> {
        if let Some(bytes) = self.cache.resolve(src, deadline) {
            return Some(bytes);
        }
        std::fs::read(src).ok()
    }
}

/// Styled fragments for the text layouter: one per run, newlines between
/// blocks, matching the plain-text projection character for character.
fn styled_fragments(
    doc: &doc_model::RichDocument,
    zoom: f32,
    strong_color: egui::Color32,
) -> Vec<(String, egui::TextFormat)> {
    let normal_color = egui::Color32::from_gray(40);
    let mut fragments = Vec::new();
    for (i, block) in doc.blocks.iter().enumerate() {
        if i > 0 {
            fragments.push(("\n".to_owned(), egui::TextFormat::default()));
        }
        for inline in &block.inlines {
            match inline {
                Inline::Run(run) => {
                    let size = run.style.effective_font_size() * zoom;
                    let color = if run.style.bold { strong_color } else { normal_color };
                    let underline = if run.style.underline {
                        egui::Stroke::new(1.0, color)
                    } else {
                        egui::Stroke::NONE
                    };
                    let format = egui::TextFormat {
                        font_id: egui::FontId::proportional(size),
                        color,
                        italics: run.style.italic,
                        underline,
                        ..Default::default()
                    };
                    fragments.push((run.text.clone(), format));
                }
                Inline::Image(_) => {
                    fragments.push(('\u{FFFC}'.to_string(), egui::TextFormat::default()));
                }
            }
        }
    }
    fragments
}

fn format_updated_at(updated_at: i64) -> String {
    let now = note_store::unix_now();
    let delta = (now - updated_at).max(0);
    match delta {
        0..=59 => "just now".to_owned(),
        60..=3599 => format!("{}m ago", delta / 60),
        3600..=86_399 => format!("{}h ago", delta / 3600),
        _ => format!("{}d ago", delta / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_at_buckets() {
        let now = note_store::unix_now();
        assert_eq!(format_updated_at(now), "just now");
        assert_eq!(format_updated_at(now - 120), "2m ago");
        assert_eq!(format_updated_at(now - 7200), "2h ago");
        assert_eq!(format_updated_at(now - 172_800), "2d ago");
        // Clock skew never shows negative ages.
        assert_eq!(format_updated_at(now + 100), "just now");
    }
}
