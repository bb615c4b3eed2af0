//! Document tree: paragraphs of styled text runs and inline images.
//!
//! All editing operations address characters in the document's plain-text
//! projection (blocks joined by `\n`, images contributing one object
//! replacement character), which keeps the operations independent of any
//! particular text widget.

use serde::{Deserialize, Serialize};

use crate::selection::Selection;

/// Font size applied when a run carries no explicit size.
pub const DEFAULT_FONT_SIZE: f32 = 16.0;

/// Lower clamp for `adjust_selection_font_size`.
pub const MIN_FONT_SIZE: f32 = 8.0;

/// Upper clamp for `adjust_selection_font_size`.
pub const MAX_FONT_SIZE: f32 = 72.0;

/// Zero-width space carried by caret-only style marker runs.
pub const STYLE_MARKER: char = '\u{200B}';

/// Placeholder character an inline image contributes to the plain-text
/// projection (U+FFFC OBJECT REPLACEMENT CHARACTER).
pub const IMAGE_CHAR: char = '\u{FFFC}';

/// Inline formatting attributes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    /// Explicit font size in points; `None` inherits [`DEFAULT_FONT_SIZE`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
}

impl TextStyle {
    pub fn effective_font_size(&self) -> f32 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = Some(clamp_font_size(size));
        self
    }
}

/// Clamp a font size to the editable range.
pub fn clamp_font_size(size: f32) -> f32 {
    size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

/// A maximal span of text sharing one style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), style: TextStyle::default() }
    }

    pub fn styled(text: impl Into<String>, style: TextStyle) -> Self {
        Self { text: text.into(), style }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// An inline image. Natural dimensions are unknown until the image bytes
/// have been decoded, at which point display constraints are re-applied and
/// the page height is recalculated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineImage {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_height: Option<u32>,
    /// Width the image is displayed at, after constraining to the content
    /// width. `None` until constraints have been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_width: Option<f32>,
}

impl InlineImage {
    pub fn new(src: impl Into<String>) -> Self {
        Self { src: src.into(), natural_width: None, natural_height: None, display_width: None }
    }

    /// Record decoded dimensions once the image has loaded.
    pub fn set_natural_size(&mut self, width: u32, height: u32) {
        self.natural_width = Some(width);
        self.natural_height = Some(height);
    }

    /// Display size at the given maximum content width, preserving aspect
    /// ratio. Falls back to a square placeholder before dimensions are known.
    pub fn display_size(&self, max_width: f32) -> (f32, f32) {
        match (self.natural_width, self.natural_height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => {
                let width = (w as f32).min(max_width).max(1.0);
                let height = width * h as f32 / w as f32;
                (width, height)
            }
            _ => {
                let side = max_width.min(120.0);
                (side, side)
            }
        }
    }
}

/// A single inline element of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inline {
    Run(TextRun),
    Image(InlineImage),
}

impl Inline {
    fn char_len(&self) -> usize {
        match self {
            Inline::Run(run) => run.char_len(),
            Inline::Image(_) => 1,
        }
    }
}

/// A paragraph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub inlines: Vec<Inline>,
}

impl Block {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Self::default()
        } else {
            Self { inlines: vec![Inline::Run(TextRun::new(text))] }
        }
    }

    fn char_len(&self) -> usize {
        self.inlines.iter().map(Inline::char_len).sum()
    }
}

/// The document: a non-empty list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichDocument {
    pub blocks: Vec<Block>,
}

impl Default for RichDocument {
    fn default() -> Self {
        Self { blocks: vec![Block::default()] }
    }
}

impl RichDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        let blocks: Vec<Block> = text.split('\n').map(Block::from_text).collect();
        Self { blocks }
    }

    /// True when the document contains no visible content.
    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| {
            b.inlines.iter().all(|inline| match inline {
                Inline::Run(run) => run.text.chars().all(|c| c == STYLE_MARKER),
                Inline::Image(_) => false,
            })
        })
    }

    /// Total character count of the plain-text projection, including the
    /// `\n` separators between blocks.
    pub fn char_len(&self) -> usize {
        let blocks: usize = self.blocks.iter().map(Block::char_len).sum();
        blocks + self.blocks.len().saturating_sub(1)
    }

    /// Plain-text projection: blocks joined by `\n`, each image contributing
    /// one [`IMAGE_CHAR`].
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for inline in &block.inlines {
                match inline {
                    Inline::Run(run) => out.push_str(&run.text),
                    Inline::Image(_) => out.push(IMAGE_CHAR),
                }
            }
        }
        out
    }

    /// Insert text at a character offset. `\n` characters split the block.
    /// Inserted text inherits the style in effect at the insertion point.
    pub fn insert_text(&mut self, offset: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let offset = offset.min(self.char_len());
        let style = self.style_at(offset);
        let (block_idx, local) = self.locate_block(offset);
        self.split_block_inlines(block_idx, local);

        let mut segments = text.split('\n');
        let first = segments.next().unwrap_or_default();
        let insert_at = self.inline_index_at(block_idx, local);
        if !first.is_empty() {
            self.blocks[block_idx]
                .inlines
                .insert(insert_at, Inline::Run(TextRun::styled(first, style)));
        }

        // Remaining segments each open a new block, carrying the tail of the
        // original block after the last one.
        let mut carry_from = if first.is_empty() { insert_at } else { insert_at + 1 };
        let mut current_block = block_idx;
        for segment in segments {
            let tail: Vec<Inline> = self.blocks[current_block].inlines.split_off(carry_from);
            let mut block = Block::default();
            if !segment.is_empty() {
                block.inlines.push(Inline::Run(TextRun::styled(segment, style)));
            }
            carry_from = block.inlines.len();
            block.inlines.extend(tail);
            current_block += 1;
            self.blocks.insert(current_block, block);
        }
        self.normalize();
    }

    /// Delete the character range `[start, end)` of the plain-text
    /// projection, merging blocks when a separator is removed.
    pub fn delete_range(&mut self, start: usize, end: usize) {
        let len = self.char_len();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return;
        }
        let (start_block, start_local) = self.locate_block(start);
        let (end_block, end_local) = self.locate_block(end);

        self.split_block_inlines(start_block, start_local);
        self.split_block_inlines(end_block, end_local);

        if start_block == end_block {
            let from = self.inline_index_at(start_block, start_local);
            let to = self.inline_index_at(start_block, end_local);
            self.blocks[start_block].inlines.drain(from..to);
        } else {
            let from = self.inline_index_at(start_block, start_local);
            self.blocks[start_block].inlines.truncate(from);
            let to = self.inline_index_at(end_block, end_local);
            let tail: Vec<Inline> = self.blocks[end_block].inlines.split_off(to);
            self.blocks[start_block].inlines.extend(tail);
            self.blocks.drain(start_block + 1..=end_block);
        }
        self.normalize();
    }

    /// Reconcile the document with an externally edited plain-text mirror.
    /// Styles survive everywhere outside the changed span.
    pub fn apply_plain_text_edit(&mut self, new_text: &str) {
        let old: Vec<char> = self.plain_text().chars().collect();
        let new: Vec<char> = new_text.chars().collect();

        let mut prefix = 0;
        while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
            prefix += 1;
        }
        let mut suffix = 0;
        while suffix < old.len() - prefix
            && suffix < new.len() - prefix
            && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
        {
            suffix += 1;
        }

        let removed_end = old.len() - suffix;
        if prefix < removed_end {
            self.delete_range(prefix, removed_end);
        }
        let inserted: String = new[prefix..new.len() - suffix].iter().collect();
        if !inserted.is_empty() {
            self.insert_text(prefix, &inserted);
        }
    }

    pub fn toggle_bold(&mut self, start: usize, end: usize) {
        self.toggle_attr(start, end, |s| &mut s.bold);
    }

    pub fn toggle_italic(&mut self, start: usize, end: usize) {
        self.toggle_attr(start, end, |s| &mut s.italic);
    }

    pub fn toggle_underline(&mut self, start: usize, end: usize) {
        self.toggle_attr(start, end, |s| &mut s.underline);
    }

    /// Adjust the font size at the selection by `delta` points.
    ///
    /// Collapsed selection inside a run: the run's size is mutated directly.
    /// Collapsed selection with no enclosing run (empty block): a zero-width
    /// marker run carrying the new size is inserted so subsequent typing at
    /// the caret picks it up. Non-collapsed selection: the selected contents
    /// become a span with the adjusted size; the returned selection still
    /// covers them.
    pub fn adjust_selection_font_size(&mut self, selection: Selection, delta: f32) -> Selection {
        if selection.is_collapsed() {
            let caret = selection.start();
            if let Some(style) = self.style_of_run_at(caret) {
                let new_size = clamp_font_size(style.effective_font_size() + delta);
                self.set_font_size_of_run_at(caret, new_size);
                selection
            } else {
                let size = clamp_font_size(DEFAULT_FONT_SIZE + delta);
                let style = TextStyle::default().with_font_size(size);
                let (block_idx, local) = self.locate_block(caret.min(self.char_len()));
                let insert_at = self.inline_index_at(block_idx, local);
                self.blocks[block_idx].inlines.insert(
                    insert_at,
                    Inline::Run(TextRun::styled(STYLE_MARKER.to_string(), style)),
                );
                Selection::caret(caret + 1)
            }
        } else {
            let (start, end) = (selection.start(), selection.end());
            self.for_runs_in_range(start, end, |run| {
                let size = clamp_font_size(run.style.effective_font_size() + delta);
                run.style.font_size = Some(size);
            });
            selection
        }
    }

    /// Insert an image at a character offset.
    pub fn insert_image(&mut self, offset: usize, image: InlineImage) {
        let offset = offset.min(self.char_len());
        let (block_idx, local) = self.locate_block(offset);
        self.split_block_inlines(block_idx, local);
        let insert_at = self.inline_index_at(block_idx, local);
        self.blocks[block_idx].inlines.insert(insert_at, Inline::Image(image));
    }

    /// Constrain every image to the content width. Idempotent; applied after
    /// every edit and whenever an image's natural size becomes known.
    pub fn apply_image_constraints(&mut self, max_width: f32) {
        for block in &mut self.blocks {
            for inline in &mut block.inlines {
                if let Inline::Image(image) = inline {
                    let (width, _) = image.display_size(max_width);
                    image.display_width = Some(width);
                }
            }
        }
    }

    pub fn images_mut(&mut self) -> impl Iterator<Item = &mut InlineImage> {
        self.blocks.iter_mut().flat_map(|b| {
            b.inlines.iter_mut().filter_map(|inline| match inline {
                Inline::Image(image) => Some(image),
                Inline::Run(_) => None,
            })
        })
    }

    // ----- internal tree navigation -----

    /// Block index and character offset within that block.
    fn locate_block(&self, offset: usize) -> (usize, usize) {
        let mut remaining = offset;
        for (i, block) in self.blocks.iter().enumerate() {
            let len = block.char_len();
            if remaining <= len {
                return (i, remaining);
            }
            remaining -= len + 1; // block separator
        }
        let last = self.blocks.len().saturating_sub(1);
        (last, self.blocks.get(last).map(Block::char_len).unwrap_or(0))
    }

    /// Style in effect at a character offset: the style of the run ending
    /// there, falling back to the run starting there.
    fn style_at(&self, offset: usize) -> TextStyle {
        let (block_idx, mut local) = self.locate_block(offset);
        let block = &self.blocks[block_idx];
        let mut last_style = None;
        for inline in &block.inlines {
            let len = inline.char_len();
            if let Inline::Run(run) = inline {
                if local <= len && (local > 0 || last_style.is_none()) {
                    return run.style;
                }
                last_style = Some(run.style);
            }
            if local <= len {
                break;
            }
            local -= len;
        }
        last_style.unwrap_or_default()
    }

    fn style_of_run_at(&self, offset: usize) -> Option<TextStyle> {
        let (block_idx, mut local) = self.locate_block(offset.min(self.char_len()));
        let block = &self.blocks[block_idx];
        for inline in &block.inlines {
            let len = inline.char_len();
            if local <= len {
                return match inline {
                    // A caret on a run boundary belongs to the run it ends.
                    Inline::Run(run) if len > 0 => Some(run.style),
                    _ => None,
                };
            }
            local -= len;
        }
        None
    }

    fn set_font_size_of_run_at(&mut self, offset: usize, size: f32) {
        let (block_idx, mut local) = self.locate_block(offset.min(self.char_len()));
        let block = &mut self.blocks[block_idx];
        for inline in &mut block.inlines {
            let len = inline.char_len();
            if local <= len {
                if let Inline::Run(run) = inline {
                    if len > 0 {
                        run.style.font_size = Some(size);
                    }
                }
                return;
            }
            local -= len;
        }
    }

    /// Index of the inline boundary at a character offset inside a block.
    /// Call [`split_block_inlines`] first so the offset falls on a boundary.
    fn inline_index_at(&self, block_idx: usize, local: usize) -> usize {
        let mut remaining = local;
        for (i, inline) in self.blocks[block_idx].inlines.iter().enumerate() {
            if remaining == 0 {
                return i;
            }
            remaining -= inline.char_len().min(remaining);
            if remaining == 0 {
                return i + 1;
            }
        }
        self.blocks[block_idx].inlines.len()
    }

    /// Split the run containing `local` so an inline boundary exists there.
    fn split_block_inlines(&mut self, block_idx: usize, local: usize) {
        let mut remaining = local;
        let block = &mut self.blocks[block_idx];
        for i in 0..block.inlines.len() {
            let len = block.inlines[i].char_len();
            if remaining == 0 || remaining == len {
                return;
            }
            if remaining < len {
                if let Inline::Run(run) = &mut block.inlines[i] {
                    let byte = run
                        .text
                        .char_indices()
                        .nth(remaining)
                        .map(|(b, _)| b)
                        .unwrap_or(run.text.len());
                    let tail = run.text.split_off(byte);
                    let style = run.style;
                    block.inlines.insert(i + 1, Inline::Run(TextRun::styled(tail, style)));
                }
                return;
            }
            remaining -= len;
        }
    }

    fn toggle_attr(&mut self, start: usize, end: usize, attr: fn(&mut TextStyle) -> &mut bool) {
        if start >= end {
            return;
        }
        // Toggle to "on" unless every covered run already has the attribute.
        let mut all_on = true;
        let mut saw_run = false;
        self.for_runs_in_range(start, end, |run| {
            saw_run = true;
            let mut style = run.style;
            if !*attr(&mut style) {
                all_on = false;
            }
        });
        if !saw_run {
            return;
        }
        let value = !all_on;
        self.for_runs_in_range(start, end, |run| {
            *attr(&mut run.style) = value;
        });
    }

    /// Apply `f` to every run wholly inside `[start, end)`, splitting runs at
    /// the boundaries first. Images inside the range are left untouched.
    fn for_runs_in_range(&mut self, start: usize, end: usize, mut f: impl FnMut(&mut TextRun)) {
        let len = self.char_len();
        let start = start.min(len);
        let end = end.min(len);
        if start >= end {
            return;
        }
        let (start_block, start_local) = self.locate_block(start);
        self.split_block_inlines(start_block, start_local);
        let (end_block, end_local) = self.locate_block(end);
        self.split_block_inlines(end_block, end_local);

        for block_idx in start_block..=end_block {
            let from = if block_idx == start_block {
                self.inline_index_at(block_idx, start_local)
            } else {
                0
            };
            let to = if block_idx == end_block {
                self.inline_index_at(block_idx, end_local)
            } else {
                self.blocks[block_idx].inlines.len()
            };
            for inline in &mut self.blocks[block_idx].inlines[from..to] {
                if let Inline::Run(run) = inline {
                    f(run);
                }
            }
        }
        self.normalize();
    }

    /// Merge adjacent runs with identical styles and drop empty runs. Marker
    /// runs (zero-width space) survive so caret-only sizes are not lost.
    fn normalize(&mut self) {
        for block in &mut self.blocks {
            block.inlines.retain(|inline| match inline {
                Inline::Run(run) => !run.text.is_empty(),
                Inline::Image(_) => true,
            });
            let mut i = 0;
            while i + 1 < block.inlines.len() {
                let merge = matches!(
                    (&block.inlines[i], &block.inlines[i + 1]),
                    (Inline::Run(a), Inline::Run(b)) if a.style == b.style
                );
                if merge {
                    if let Inline::Run(next) = block.inlines.remove(i + 1) {
                        if let Inline::Run(run) = &mut block.inlines[i] {
                            run.text.push_str(&next.text);
                        }
                    }
                } else {
                    i += 1;
                }
            }
        }
        if self.blocks.is_empty() {
            self.blocks.push(Block::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> RichDocument {
        RichDocument::from_text(text)
    }

    #[test]
    fn plain_text_round_trip() {
        let d = doc("hello\nworld");
        assert_eq!(d.plain_text(), "hello\nworld");
        assert_eq!(d.char_len(), 11);
    }

    #[test]
    fn insert_text_inherits_style() {
        let mut d = RichDocument::default();
        d.blocks[0]
            .inlines
            .push(Inline::Run(TextRun::styled("bold", TextStyle { bold: true, ..Default::default() })));
        d.insert_text(4, "er");
        assert_eq!(d.plain_text(), "bolder");
        assert_eq!(d.blocks[0].inlines.len(), 1);
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => assert!(run.style.bold),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn insert_newline_splits_block() {
        let mut d = doc("hello world");
        d.insert_text(5, "\n");
        assert_eq!(d.blocks.len(), 2);
        assert_eq!(d.plain_text(), "hello\n world");
    }

    #[test]
    fn delete_range_across_blocks_merges() {
        let mut d = doc("hello\nworld");
        d.delete_range(3, 8);
        assert_eq!(d.plain_text(), "helrld");
        assert_eq!(d.blocks.len(), 1);
    }

    #[test]
    fn plain_text_edit_preserves_styles_outside_change() {
        let mut d = doc("hello world");
        d.toggle_bold(0, 5);
        d.apply_plain_text_edit("hello brave world");
        assert_eq!(d.plain_text(), "hello brave world");
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => {
                assert_eq!(run.text, "hello");
                assert!(run.style.bold);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn toggle_bold_turns_off_when_uniform() {
        let mut d = doc("abcdef");
        d.toggle_bold(0, 6);
        d.toggle_bold(0, 6);
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => assert!(!run.style.bold),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn toggle_bold_mixed_range_turns_on() {
        let mut d = doc("abcdef");
        d.toggle_bold(0, 3);
        d.toggle_bold(0, 6);
        for inline in &d.blocks[0].inlines {
            match inline {
                Inline::Run(run) => assert!(run.style.bold),
                _ => panic!("expected run"),
            }
        }
    }

    #[test]
    fn font_size_collapsed_mutates_enclosing_run() {
        let mut d = doc("abc");
        let sel = d.adjust_selection_font_size(Selection::caret(2), 4.0);
        assert_eq!(sel, Selection::caret(2));
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => assert_eq!(run.style.font_size, Some(DEFAULT_FONT_SIZE + 4.0)),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn font_size_collapsed_empty_block_inserts_marker() {
        let mut d = RichDocument::default();
        let sel = d.adjust_selection_font_size(Selection::caret(0), 2.0);
        assert_eq!(sel, Selection::caret(1));
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => {
                assert_eq!(run.text, STYLE_MARKER.to_string());
                assert_eq!(run.style.font_size, Some(DEFAULT_FONT_SIZE + 2.0));
            }
            _ => panic!("expected marker run"),
        }
        assert!(d.is_empty());
    }

    #[test]
    fn font_size_range_spans_selection_and_preserves_it() {
        let mut d = doc("hello world");
        let sel = d.adjust_selection_font_size(Selection::new(6, 11), 8.0);
        assert_eq!((sel.start(), sel.end()), (6, 11));
        // "world" now carries the adjusted size, "hello " does not.
        let runs: Vec<&TextRun> = d.blocks[0]
            .inlines
            .iter()
            .filter_map(|i| match i {
                Inline::Run(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].style.font_size, None);
        assert_eq!(runs[1].style.font_size, Some(DEFAULT_FONT_SIZE + 8.0));
    }

    #[test]
    fn font_size_clamps_to_bounds() {
        let mut d = doc("x");
        d.adjust_selection_font_size(Selection::new(0, 1), 500.0);
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => assert_eq!(run.style.font_size, Some(MAX_FONT_SIZE)),
            _ => panic!("expected run"),
        }
        d.adjust_selection_font_size(Selection::new(0, 1), -500.0);
        match &d.blocks[0].inlines[0] {
            Inline::Run(run) => assert_eq!(run.style.font_size, Some(MIN_FONT_SIZE)),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn image_constraints_are_idempotent() {
        let mut d = doc("pic:");
        let mut image = InlineImage::new("photo.png");
        image.set_natural_size(1600, 900);
        d.insert_image(4, image);

        d.apply_image_constraints(640.0);
        let first: Vec<Option<f32>> = d
            .images_mut()
            .map(|i| i.display_width)
            .collect();
        d.apply_image_constraints(640.0);
        let second: Vec<Option<f32>> = d.images_mut().map(|i| i.display_width).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], Some(640.0));
    }

    #[test]
    fn small_image_keeps_natural_width() {
        let mut image = InlineImage::new("icon.png");
        image.set_natural_size(48, 48);
        let (w, h) = image.display_size(640.0);
        assert_eq!((w, h), (48.0, 48.0));
    }
}
