//! Deterministic layout measurement.
//!
//! Estimates line wrapping and content height from the document tree at the
//! fixed document width, using an average glyph width ratio rather than a
//! font rasterizer. The same measurement drives canvas growth in the editor
//! and pagination in the PDF export, so both stay in agreement.

use crate::document::{Inline, RichDocument, TextStyle, STYLE_MARKER};

/// Tunable measurement constants.
#[derive(Debug, Clone)]
pub struct LayoutMetrics {
    /// Average character width relative to font size.
    pub char_width_ratio: f32,
    /// Line height multiplier (typically 1.2 for normal spacing).
    pub line_height_multiplier: f32,
    /// Vertical gap between paragraphs.
    pub paragraph_spacing: f32,
    /// Vertical gap around images.
    pub image_spacing: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            char_width_ratio: 0.6, // conservative estimate for proportional fonts
            line_height_multiplier: 1.2,
            paragraph_spacing: 6.0,
            image_spacing: 4.0,
        }
    }
}

/// A styled fragment positioned on a line.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidRun {
    pub x: f32,
    pub text: String,
    pub style: TextStyle,
}

/// One wrapped line. `y` is the top edge in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidLine {
    pub y: f32,
    pub height: f32,
    pub runs: Vec<LaidRun>,
}

impl LaidLine {
    /// Baseline position used when emitting PDF text.
    pub fn baseline(&self) -> f32 {
        self.y + self.height * 0.8
    }
}

/// An image positioned in the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct LaidImage {
    pub src: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Full measurement result.
#[derive(Debug, Clone, PartialEq)]
pub struct DocLayout {
    pub width: f32,
    pub content_height: f32,
    pub lines: Vec<LaidLine>,
    pub images: Vec<LaidImage>,
}

/// Estimated advance width of a run fragment.
pub fn text_width(text: &str, style: &TextStyle, metrics: &LayoutMetrics) -> f32 {
    let size = style.effective_font_size();
    text.chars()
        .map(|c| if c == STYLE_MARKER { 0.0 } else { size * metrics.char_width_ratio })
        .sum()
}

/// Measure the document at `width`, producing positioned lines and images.
pub fn measure(doc: &RichDocument, width: f32, metrics: &LayoutMetrics) -> DocLayout {
    let mut lines = Vec::new();
    let mut images = Vec::new();
    let mut y = 0.0_f32;

    for (block_idx, block) in doc.blocks.iter().enumerate() {
        if block_idx > 0 {
            y += metrics.paragraph_spacing;
        }
        let mut line = LineBuilder::new(y);
        for inline in &block.inlines {
            match inline {
                Inline::Run(run) => {
                    for word in split_words(&run.text) {
                        let advance = text_width(word, &run.style, metrics);
                        if line.width > 0.0 && line.width + advance > width {
                            y = line.flush(&mut lines, metrics);
                            line = LineBuilder::new(y);
                        }
                        line.push(word, run.style, advance);
                    }
                }
                Inline::Image(image) => {
                    // Images occupy their own band below the current line.
                    if line.width > 0.0 {
                        y = line.flush(&mut lines, metrics);
                        line = LineBuilder::new(y);
                    }
                    let (w, h) = image.display_size(width);
                    y += metrics.image_spacing;
                    images.push(LaidImage {
                        src: image.src.clone(),
                        x: 0.0,
                        y,
                        width: w,
                        height: h,
                    });
                    y += h + metrics.image_spacing;
                    line = LineBuilder::new(y);
                }
            }
        }
        y = line.flush(&mut lines, metrics);
    }

    DocLayout { width, content_height: y, lines, images }
}

struct LineBuilder {
    y: f32,
    width: f32,
    max_size: f32,
    runs: Vec<LaidRun>,
}

impl LineBuilder {
    fn new(y: f32) -> Self {
        Self { y, width: 0.0, max_size: 0.0, runs: Vec::new() }
    }

    fn push(&mut self, word: &str, style: TextStyle, advance: f32) {
        self.max_size = self.max_size.max(style.effective_font_size());
        match self.runs.last_mut() {
            Some(last) if last.style == style => last.text.push_str(word),
            _ => self.runs.push(LaidRun { x: self.width, text: word.to_owned(), style }),
        }
        self.width += advance;
    }

    /// Close the line, returning the y coordinate below it. Empty blocks
    /// still take up one default line height.
    fn flush(self, lines: &mut Vec<LaidLine>, metrics: &LayoutMetrics) -> f32 {
        let size = if self.max_size > 0.0 {
            self.max_size
        } else {
            crate::document::DEFAULT_FONT_SIZE
        };
        let height = size * metrics.line_height_multiplier;
        let y = self.y;
        lines.push(LaidLine { y, height, runs: self.runs });
        y + height
    }
}

/// Split text into wrap candidates, keeping trailing whitespace attached to
/// the preceding word so widths stay additive.
fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut start = 0;
    let mut in_space = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            words.push(&text[start..i]);
            start = i;
            in_space = false;
        }
    }
    if start < text.len() {
        words.push(&text[start..]);
    }
    words
}
