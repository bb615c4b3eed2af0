//! The notebook session.
//!
//! Owns the working copy of exactly one current note (rich text, ink,
//! geometry, title), the sidebar's note list, and the autosave bridge, and
//! orchestrates the note store around the one hard ordering rule: switching
//! away from a dirty note flushes its save before the next note loads.

use std::time::Instant;

use doc_model::{layout, markup, InlineImage, LayoutMetrics, RichDocument, Selection};
use note_store::{Note, NoteId, NoteStore, SaveNoteRequest, StoreError};

use crate::autosave::AutosaveBridge;
use crate::color::Color;
use crate::geometry::{DocTransform, PageGeometry, ScreenPoint};
use crate::ink::{InkLayer, InputDevice, Stroke, StrokePoint, Tool};
use crate::raster::InkRasterizer;
use crate::ruler::{Ruler, RulerPart};

/// Title given to the note created implicitly on first open.
pub const DEFAULT_NOTE_TITLE: &str = "Untitled note";

/// Screen position a freshly enabled ruler appears at.
const RULER_HOME: (f32, f32) = (140.0, 220.0);

pub struct NotebookSession {
    store: Box<dyn NoteStore>,
    rasterizer: Box<dyn InkRasterizer>,

    notes: Vec<Note>,
    current: Option<NoteId>,

    title: String,
    doc: RichDocument,
    selection: Selection,
    ink: InkLayer,
    geometry: PageGeometry,
    ruler: Option<Ruler>,
    snapshot_png: Option<Vec<u8>>,
    /// Document-space height implied by the loaded snapshot; the page never
    /// shrinks below it.
    snapshot_floor: f32,

    tool: Tool,
    pen_color: Color,
    highlighter_color: Color,
    pen_width: f32,
    pen_opacity: f32,

    autosave: AutosaveBridge,
    layout_metrics: LayoutMetrics,
    last_error: Option<String>,
}

impl NotebookSession {
    pub fn new(store: Box<dyn NoteStore>, rasterizer: Box<dyn InkRasterizer>) -> Self {
        Self {
            store,
            rasterizer,
            notes: Vec::new(),
            current: None,
            title: String::new(),
            doc: RichDocument::default(),
            selection: Selection::default(),
            ink: InkLayer::new(),
            geometry: PageGeometry::new(),
            ruler: None,
            snapshot_png: None,
            snapshot_floor: 0.0,
            tool: Tool::Pen,
            pen_color: Color::BLACK,
            highlighter_color: Color::YELLOW,
            pen_width: 2.5,
            pen_opacity: 1.0,
            autosave: AutosaveBridge::new(),
            layout_metrics: LayoutMetrics::default(),
            last_error: None,
        }
    }

    // ----- opening and the note list -----

    /// Fetch the note list and make the most recently updated note current.
    /// When the user has no notes yet, a default note is created immediately
    /// so edits are always backed by a persisted identifier.
    pub fn open(&mut self) -> bool {
        match self.store.list_notes() {
            Ok(notes) => self.notes = notes,
            Err(err) => {
                self.record_error("failed to load notes", err);
                return false;
            }
        }
        match self.notes.first().cloned() {
            Some(note) => {
                self.load_note_state(note);
                true
            }
            None => self.create_note_inner(DEFAULT_NOTE_TITLE, None),
        }
    }

    /// Create a note and make it current, flushing the outgoing note first.
    pub fn create_note(&mut self, title: &str) -> bool {
        self.flush_outgoing();
        self.create_note_inner(title, None)
    }

    fn create_note_inner(&mut self, title: &str, document_id: Option<NoteId>) -> bool {
        match self.store.create_note(title, document_id) {
            Ok(note) => {
                self.notes.insert(0, note.clone());
                self.load_note_state(note);
                true
            }
            Err(err) => {
                self.record_error("failed to create note", err);
                false
            }
        }
    }

    /// Make another note current. The outgoing note's pending autosave is
    /// flushed before the incoming note's content is loaded.
    pub fn switch_note(&mut self, id: NoteId) -> bool {
        if self.current == Some(id) {
            return true;
        }
        self.flush_outgoing();
        match self.notes.iter().find(|n| n.id == id).cloned() {
            Some(note) => {
                self.load_note_state(note);
                true
            }
            None => {
                self.record_error("cannot open note", StoreError::NoteNotFound(id));
                false
            }
        }
    }

    /// Persist the current note under a new title and merge the server's
    /// response into the local list entry.
    pub fn rename_current(&mut self, title: &str) -> bool {
        if self.current.is_none() {
            return false;
        }
        self.title = title.to_owned();
        self.save_now()
    }

    /// Delete a note. Confirmation is the caller's responsibility. Deleting
    /// the current note clears the editor and canvas to an empty state.
    pub fn delete_note(&mut self, id: NoteId) -> bool {
        match self.store.delete_note(id) {
            Ok(_) => {
                self.notes.retain(|n| n.id != id);
                if self.current == Some(id) {
                    self.clear_editor();
                }
                true
            }
            Err(err) => {
                self.record_error("failed to delete note", err);
                false
            }
        }
    }

    /// Flush before the notebook closes.
    pub fn close(&mut self) {
        self.flush_outgoing();
    }

    // ----- autosave -----

    /// Drive the debounce timer; called once per frame. Returns whether a
    /// save was performed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.autosave.save_due(now) {
            self.save_now()
        } else {
            false
        }
    }

    /// Serialize title + content, flatten ink to a fresh snapshot and submit
    /// one save request. A missing current note is a benign no-op (dirty
    /// state is retained); a failed save surfaces an inline error and leaves
    /// local state untouched for the next retry.
    pub fn save_now(&mut self) -> bool {
        let Some(id) = self.current else {
            return false;
        };
        let png = match self.rasterizer.rasterize(
            self.ink.strokes(),
            self.snapshot_png.as_deref(),
            &self.geometry,
        ) {
            Ok(png) => png,
            Err(err) => {
                log::warn!("snapshot rasterization failed: {err}");
                self.last_error = Some(format!("snapshot failed: {err}"));
                return false;
            }
        };
        let ink_json = match serde_json::to_string(self.ink.strokes()) {
            Ok(json) => json,
            Err(err) => {
                self.last_error = Some(format!("could not serialize ink: {err}"));
                return false;
            }
        };
        let request = SaveNoteRequest {
            id,
            title: self.title.clone(),
            content: markup::serialize_markup(&self.doc),
            document_id: self.notes.iter().find(|n| n.id == id).and_then(|n| n.document_id),
            ink: Some(ink_json),
            snapshot_png: Some(png.clone()),
        };
        match self.store.save_note(&request) {
            Ok(updated) => {
                self.autosave.mark_saved(updated.updated_at);
                self.snapshot_png = Some(png);
                self.last_error = None;
                self.merge_note(updated);
                true
            }
            Err(err) => {
                self.record_error("autosave failed", err);
                false
            }
        }
    }

    fn flush_outgoing(&mut self) {
        if self.current.is_some() && self.autosave.needs_flush() {
            self.save_now();
        }
    }

    /// Merge a server response into the local list by identifier. If the
    /// note was deleted in the meantime this is a harmless no-op.
    fn merge_note(&mut self, updated: Note) {
        if let Some(entry) = self.notes.iter_mut().find(|n| n.id == updated.id) {
            *entry = updated;
        }
        self.notes.sort_by_key(|n| std::cmp::Reverse(n.updated_at));
    }

    // ----- text editing -----

    /// Reconcile an externally edited plain-text mirror of the document.
    pub fn apply_text_edit(&mut self, new_text: &str, now: Instant) {
        self.doc.apply_plain_text_edit(new_text);
        self.after_text_mutation(now);
    }

    pub fn set_title(&mut self, title: &str, now: Instant) {
        if self.title != title {
            self.title = title.to_owned();
            self.autosave.mark_text_dirty(now);
        }
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn toggle_bold(&mut self, now: Instant) {
        let (start, end) = (self.selection.start(), self.selection.end());
        if start < end {
            self.doc.toggle_bold(start, end);
            self.after_text_mutation(now);
        }
    }

    pub fn toggle_italic(&mut self, now: Instant) {
        let (start, end) = (self.selection.start(), self.selection.end());
        if start < end {
            self.doc.toggle_italic(start, end);
            self.after_text_mutation(now);
        }
    }

    pub fn toggle_underline(&mut self, now: Instant) {
        let (start, end) = (self.selection.start(), self.selection.end());
        if start < end {
            self.doc.toggle_underline(start, end);
            self.after_text_mutation(now);
        }
    }

    /// Adjust font size at the current selection (see the document model for
    /// the caret/marker/span cases).
    pub fn adjust_font_size(&mut self, delta: f32, now: Instant) {
        self.selection = self.doc.adjust_selection_font_size(self.selection, delta);
        self.after_text_mutation(now);
    }

    /// Insert an image at the caret. Dimensions may be unknown until the
    /// bytes are decoded; see [`Self::image_loaded`].
    pub fn insert_image(&mut self, src: &str, natural: Option<(u32, u32)>, now: Instant) {
        let mut image = InlineImage::new(src);
        if let Some((w, h)) = natural {
            image.set_natural_size(w, h);
        }
        self.doc.insert_image(self.selection.end(), image);
        self.after_text_mutation(now);
    }

    /// An inserted image finished loading: record its natural size, re-apply
    /// display constraints and recalculate the page height.
    pub fn image_loaded(&mut self, src: &str, width: u32, height: u32, now: Instant) {
        let mut changed = false;
        for image in self.doc.images_mut() {
            if image.src == src && image.natural_width.is_none() {
                image.set_natural_size(width, height);
                changed = true;
            }
        }
        if changed {
            self.after_text_mutation(now);
        }
    }

    fn after_text_mutation(&mut self, now: Instant) {
        self.doc.apply_image_constraints(self.geometry.doc_width());
        self.recalc_content_height();
        self.autosave.mark_text_dirty(now);
    }

    /// Refit the page to the content: text layout, ink extent and snapshot
    /// floor. The page can shrink again when content gets shorter, but never
    /// below what the ink or snapshot occupies.
    fn recalc_content_height(&mut self) {
        let layout =
            layout::measure(&self.doc, self.geometry.doc_width(), &self.layout_metrics);
        let ink_bottom = self
            .ink
            .visible_strokes()
            .filter_map(|s| s.bounds().map(|b| b.3))
            .fold(0.0_f32, f32::max);
        let extent = layout.content_height.max(ink_bottom).max(self.snapshot_floor);
        self.geometry.fit_to(extent);
    }

    // ----- ink -----

    /// Pointer-down on the canvas. Grabs the ruler when appropriate,
    /// otherwise begins a (possibly ruler-constrained) stroke. Returns
    /// whether the event was consumed.
    pub fn pointer_down(
        &mut self,
        p: ScreenPoint,
        device: InputDevice,
        pressure: f32,
        transform: &DocTransform,
    ) -> bool {
        let draws = matches!(self.tool, Tool::Pen | Tool::Highlighter)
            || device != InputDevice::Mouse;
        if let Some(ruler) = &mut self.ruler {
            let grab = match ruler.hit_test(p) {
                Some(RulerPart::RotateHandle) => true,
                // The body only swallows the pointer when it would not draw;
                // with a drawing tool the ruler's edge is drawn along.
                Some(RulerPart::Body) => !draws,
                None => false,
            };
            if grab {
                return ruler.pointer_down(p).is_some();
            }
        }
        let point = match &self.ruler {
            Some(ruler) => ruler.project(p, transform),
            None => transform.to_doc(p),
        };
        self.geometry.ensure_room_for(point.y);
        self.ink.begin_stroke(
            StrokePoint::from_doc(point, pressure),
            self.tool,
            device,
            self.active_color(),
            self.pen_width,
            self.pen_opacity,
            self.ruler.is_some(),
        )
    }

    pub fn pointer_move(&mut self, p: ScreenPoint, pressure: f32, transform: &DocTransform) {
        if let Some(ruler) = &mut self.ruler {
            if ruler.is_interacting() {
                ruler.pointer_move(p);
                return;
            }
        }
        if self.ink.is_drawing() {
            let point = match &self.ruler {
                Some(ruler) => ruler.project(p, transform),
                None => transform.to_doc(p),
            };
            self.geometry.ensure_room_for(point.y);
            self.ink.extend_stroke(StrokePoint::from_doc(point, pressure));
        }
    }

    pub fn pointer_up(&mut self, now: Instant) {
        if let Some(ruler) = &mut self.ruler {
            if ruler.is_interacting() {
                ruler.pointer_up();
                return;
            }
        }
        if self.ink.end_stroke() {
            self.autosave.mark_ink_dirty(now);
        }
    }

    pub fn undo(&mut self, now: Instant) {
        if self.ink.undo() {
            self.autosave.mark_ink_dirty(now);
        }
    }

    pub fn redo(&mut self, now: Instant) {
        if self.ink.redo() {
            self.autosave.mark_ink_dirty(now);
        }
    }

    pub fn clear_ink(&mut self, now: Instant) {
        if !self.ink.is_empty() {
            self.ink.clear();
            self.autosave.mark_ink_dirty(now);
        }
    }

    // ----- view -----

    pub fn set_zoom(&mut self, zoom: f32) {
        self.geometry.set_zoom(zoom);
    }

    /// The viewport resized or moved between displays.
    pub fn viewport_resized(&mut self, dpr: f32, now: Instant) {
        self.geometry.set_dpr(dpr);
        self.autosave.trigger(now);
    }

    pub fn set_ruler_enabled(&mut self, enabled: bool) {
        match (enabled, &self.ruler) {
            (true, None) => self.ruler = Some(Ruler::new(RULER_HOME.0, RULER_HOME.1)),
            (false, _) => self.ruler = None,
            _ => {}
        }
    }

    pub fn ruler_enabled(&self) -> bool {
        self.ruler.is_some()
    }

    pub fn ruler(&self) -> Option<&Ruler> {
        self.ruler.as_ref()
    }

    pub fn ruler_mut(&mut self) -> Option<&mut Ruler> {
        self.ruler.as_mut()
    }

    // ----- state loading -----

    fn load_note_state(&mut self, note: Note) {
        self.current = Some(note.id);
        self.title = note.title.clone();
        self.selection = Selection::default();

        self.doc = match markup::parse_markup(&note.content) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("note {} has unreadable content: {err}", note.id);
                self.last_error = Some(format!("could not read note content: {err}"));
                RichDocument::default()
            }
        };
        self.doc.apply_image_constraints(self.geometry.doc_width());

        self.ink = InkLayer::new();
        if let Some(ink_json) = &note.ink {
            match serde_json::from_str::<Vec<Stroke>>(ink_json) {
                Ok(strokes) => self.ink.load_strokes(strokes),
                Err(err) => log::warn!("note {} has unreadable ink, keeping snapshot only: {err}", note.id),
            }
        }

        self.snapshot_png = note.snapshot_png;
        self.snapshot_floor = self
            .snapshot_png
            .as_deref()
            .and_then(|png| self.rasterizer.png_size(png))
            .filter(|(w, _)| *w > 0)
            .map(|(w, h)| h as f32 * self.geometry.doc_width() / w as f32)
            .unwrap_or(0.0);

        self.recalc_content_height();
        self.autosave.reset();
    }

    fn clear_editor(&mut self) {
        self.current = None;
        self.title.clear();
        self.doc = RichDocument::default();
        self.selection = Selection::default();
        self.ink = InkLayer::new();
        self.snapshot_png = None;
        self.snapshot_floor = 0.0;
        self.geometry.reset_page_height();
        self.autosave.reset();
    }

    fn record_error(&mut self, context: &str, err: StoreError) {
        log::warn!("{context}: {err}");
        self.last_error = Some(format!("{context}: {err}"));
    }

    // ----- accessors -----

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn current_note_id(&self) -> Option<NoteId> {
        self.current
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn doc(&self) -> &RichDocument {
        &self.doc
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn ink(&self) -> &InkLayer {
        &self.ink
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    pub fn snapshot_png(&self) -> Option<&[u8]> {
        self.snapshot_png.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn last_saved_at(&self) -> Option<i64> {
        self.autosave.last_saved_at()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn pen_color(&self) -> Color {
        self.pen_color
    }

    pub fn set_pen_color(&mut self, color: Color) {
        self.pen_color = color;
    }

    pub fn highlighter_color(&self) -> Color {
        self.highlighter_color
    }

    pub fn set_highlighter_color(&mut self, color: Color) {
        self.highlighter_color = color;
    }

    pub fn pen_width(&self) -> f32 {
        self.pen_width
    }

    pub fn set_pen_width(&mut self, width: f32) {
        self.pen_width = width.clamp(0.5, 40.0);
    }

    pub fn set_autosave_quiet_period(&mut self, quiet: std::time::Duration) {
        self.autosave.set_quiet_period(quiet);
    }

    fn active_color(&self) -> Color {
        match self.tool {
            Tool::Highlighter => self.highlighter_color,
            _ => self.pen_color,
        }
    }
}
