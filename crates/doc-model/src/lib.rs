//! Rich text document model for Quillpad notes.
//!
//! An explicit tree of paragraphs and styled inline runs that replaces
//! direct editing of an opaque markup buffer. Formatting operations work on
//! character ranges, serialization targets the HTML-like markup persisted by
//! the note store, and layout measurement is deterministic so canvas growth
//! and export pagination can be computed without a rendering backend.

pub mod document;
pub mod layout;
pub mod markup;
pub mod selection;

pub use document::{
    Block, Inline, InlineImage, RichDocument, TextRun, TextStyle, DEFAULT_FONT_SIZE,
    MAX_FONT_SIZE, MIN_FONT_SIZE, STYLE_MARKER,
};
pub use layout::{measure, DocLayout, LaidImage, LaidLine, LaidRun, LayoutMetrics};
pub use markup::{parse_markup, serialize_markup, MarkupError};
pub use selection::Selection;
