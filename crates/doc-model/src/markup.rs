//! Serialization between the document tree and the HTML-like markup the
//! note store persists.
//!
//! The grammar is deliberately small: `<p>` blocks containing text,
//! `<strong>`/`<em>`/`<u>` formatting, `<span style="font-size:NNpx">` for
//! explicit sizes, and self-closing `<img>` tags. The parser accepts exactly
//! what the serializer emits plus whitespace between blocks.

use std::fmt::Write as _;

use crate::document::{Block, Inline, InlineImage, RichDocument, TextRun, TextStyle};

#[derive(Debug, thiserror::Error)]
pub enum MarkupError {
    #[error("unexpected end of markup")]
    UnexpectedEof,
    #[error("unexpected tag <{0}>")]
    UnexpectedTag(String),
    #[error("mismatched closing tag </{0}>")]
    MismatchedClose(String),
    #[error("malformed attribute in <{0}>")]
    BadAttribute(String),
}

/// Serialize a document to markup.
pub fn serialize_markup(doc: &RichDocument) -> String {
    let mut out = String::new();
    for block in &doc.blocks {
        out.push_str("<p>");
        for inline in &block.inlines {
            match inline {
                Inline::Run(run) => serialize_run(&mut out, run),
                Inline::Image(image) => serialize_image(&mut out, image),
            }
        }
        out.push_str("</p>");
    }
    out
}

fn serialize_run(out: &mut String, run: &TextRun) {
    let style = run.style;
    if let Some(size) = style.font_size {
        let _ = write!(out, "<span style=\"font-size:{size}px\">");
    }
    if style.bold {
        out.push_str("<strong>");
    }
    if style.italic {
        out.push_str("<em>");
    }
    if style.underline {
        out.push_str("<u>");
    }
    out.push_str(&escape(&run.text));
    if style.underline {
        out.push_str("</u>");
    }
    if style.italic {
        out.push_str("</em>");
    }
    if style.bold {
        out.push_str("</strong>");
    }
    if style.font_size.is_some() {
        out.push_str("</span>");
    }
}

fn serialize_image(out: &mut String, image: &InlineImage) {
    let _ = write!(out, "<img src=\"{}\"", escape(&image.src));
    if let Some(w) = image.natural_width {
        let _ = write!(out, " width=\"{w}\"");
    }
    if let Some(h) = image.natural_height {
        let _ = write!(out, " height=\"{h}\"");
    }
    if let Some(dw) = image.display_width {
        let _ = write!(out, " display-width=\"{dw}\"");
    }
    out.push_str("/>");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse markup back into a document. Empty input yields the empty document.
pub fn parse_markup(markup: &str) -> Result<RichDocument, MarkupError> {
    let mut parser = Parser { chars: markup.chars().collect(), pos: 0 };
    let mut blocks = Vec::new();
    loop {
        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        parser.expect_open("p")?;
        blocks.push(parser.parse_block()?);
    }
    if blocks.is_empty() {
        return Ok(RichDocument::default());
    }
    Ok(RichDocument { blocks })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.chars.get(self.pos + i) == Some(&c))
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), MarkupError> {
        let expected = format!("<{tag}>");
        if self.starts_with(&expected) {
            self.pos += expected.chars().count();
            Ok(())
        } else {
            Err(MarkupError::UnexpectedTag(self.read_tag_name()))
        }
    }

    fn read_tag_name(&self) -> String {
        self.chars[self.pos..]
            .iter()
            .take(24)
            .take_while(|c| !c.is_whitespace() && **c != '>')
            .collect()
    }

    fn parse_block(&mut self) -> Result<Block, MarkupError> {
        let mut block = Block::default();
        let mut stack: Vec<StyleTag> = Vec::new();
        loop {
            if self.at_end() {
                return Err(MarkupError::UnexpectedEof);
            }
            if self.starts_with("</p>") {
                if let Some(open) = stack.last() {
                    return Err(MarkupError::MismatchedClose(open.name().to_owned()));
                }
                self.pos += 4;
                return Ok(block);
            }
            if self.starts_with("<img") {
                block.inlines.push(Inline::Image(self.parse_image()?));
                continue;
            }
            if self.starts_with("</") {
                let tag = self.parse_close_tag()?;
                match stack.pop() {
                    Some(open) if open.name() == tag => {}
                    _ => return Err(MarkupError::MismatchedClose(tag)),
                }
                continue;
            }
            if self.peek() == Some('<') {
                stack.push(self.parse_style_tag()?);
                continue;
            }
            let text = self.parse_text()?;
            if !text.is_empty() {
                block
                    .inlines
                    .push(Inline::Run(TextRun::styled(text, style_from_stack(&stack))));
            }
        }
    }

    fn parse_close_tag(&mut self) -> Result<String, MarkupError> {
        self.pos += 2; // "</"
        let mut name = String::new();
        while let Some(c) = self.bump() {
            if c == '>' {
                return Ok(name);
            }
            name.push(c);
        }
        Err(MarkupError::UnexpectedEof)
    }

    fn parse_style_tag(&mut self) -> Result<StyleTag, MarkupError> {
        if self.starts_with("<strong>") {
            self.pos += 8;
            return Ok(StyleTag::Strong);
        }
        if self.starts_with("<em>") {
            self.pos += 4;
            return Ok(StyleTag::Em);
        }
        if self.starts_with("<u>") {
            self.pos += 3;
            return Ok(StyleTag::Underline);
        }
        if self.starts_with("<span style=\"font-size:") {
            self.pos += "<span style=\"font-size:".chars().count();
            let mut number = String::new();
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                number.push(self.bump().unwrap_or_default());
            }
            if !self.starts_with("px\">") {
                return Err(MarkupError::BadAttribute("span".to_owned()));
            }
            self.pos += 4;
            let size: f32 = number
                .parse()
                .map_err(|_| MarkupError::BadAttribute("span".to_owned()))?;
            return Ok(StyleTag::FontSize(size));
        }
        Err(MarkupError::UnexpectedTag(self.read_tag_name()))
    }

    fn parse_image(&mut self) -> Result<InlineImage, MarkupError> {
        self.pos += 4; // "<img"
        let mut image = InlineImage::new(String::new());
        loop {
            self.skip_whitespace();
            if self.starts_with("/>") {
                self.pos += 2;
                return Ok(image);
            }
            if self.at_end() {
                return Err(MarkupError::UnexpectedEof);
            }
            let (name, value) = self.parse_attribute()?;
            match name.as_str() {
                "src" => image.src = unescape(&value),
                "width" => {
                    image.natural_width =
                        Some(value.parse().map_err(|_| MarkupError::BadAttribute(name))?)
                }
                "height" => {
                    image.natural_height =
                        Some(value.parse().map_err(|_| MarkupError::BadAttribute(name))?)
                }
                "display-width" => {
                    image.display_width =
                        Some(value.parse().map_err(|_| MarkupError::BadAttribute(name))?)
                }
                _ => return Err(MarkupError::BadAttribute(name)),
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<(String, String), MarkupError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '=' {
                break;
            }
            if c.is_whitespace() || c == '>' {
                return Err(MarkupError::BadAttribute(name));
            }
            name.push(c);
            self.pos += 1;
        }
        if self.bump() != Some('=') || self.bump() != Some('"') {
            return Err(MarkupError::BadAttribute(name));
        }
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok((name, value)),
                Some(c) => value.push(c),
                None => return Err(MarkupError::UnexpectedEof),
            }
        }
    }

    fn parse_text(&mut self) -> Result<String, MarkupError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == '<' {
                break;
            }
            if c == '&' {
                text.push(self.parse_entity()?);
            } else {
                text.push(c);
                self.pos += 1;
            }
        }
        Ok(text)
    }

    fn parse_entity(&mut self) -> Result<char, MarkupError> {
        for (entity, ch) in [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'), ("&quot;", '"')] {
            if self.starts_with(entity) {
                self.pos += entity.chars().count();
                return Ok(ch);
            }
        }
        // A bare ampersand is taken literally.
        self.pos += 1;
        Ok('&')
    }
}

#[derive(Debug, Clone, Copy)]
enum StyleTag {
    Strong,
    Em,
    Underline,
    FontSize(f32),
}

impl StyleTag {
    fn name(&self) -> &'static str {
        match self {
            StyleTag::Strong => "strong",
            StyleTag::Em => "em",
            StyleTag::Underline => "u",
            StyleTag::FontSize(_) => "span",
        }
    }
}

fn style_from_stack(stack: &[StyleTag]) -> TextStyle {
    let mut style = TextStyle::default();
    for tag in stack {
        match tag {
            StyleTag::Strong => style.bold = true,
            StyleTag::Em => style.italic = true,
            StyleTag::Underline => style.underline = true,
            StyleTag::FontSize(size) => style.font_size = Some(*size),
        }
    }
    style
}

fn unescape(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{InlineImage, RichDocument, TextStyle};
    use crate::selection::Selection;

    #[test]
    fn empty_markup_parses_to_empty_document() {
        let doc = parse_markup("").unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn styled_document_round_trips() {
        let mut doc = RichDocument::from_text("hello world\nsecond line");
        doc.toggle_bold(0, 5);
        doc.toggle_italic(6, 11);
        doc.adjust_selection_font_size(Selection::new(12, 18), 6.0);

        let markup = serialize_markup(&doc);
        let parsed = parse_markup(&markup).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn image_attributes_round_trip() {
        let mut doc = RichDocument::from_text("look: ");
        let mut image = InlineImage::new("a&b.png");
        image.set_natural_size(800, 600);
        doc.insert_image(6, image);
        doc.apply_image_constraints(640.0);

        let markup = serialize_markup(&doc);
        let parsed = parse_markup(&markup).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn escaped_text_round_trips() {
        let doc = RichDocument::from_text("a < b & \"c\" > d");
        let markup = serialize_markup(&doc);
        assert!(!markup.contains("< b"));
        assert_eq!(parse_markup(&markup).unwrap(), doc);
    }

    #[test]
    fn nested_tags_compose_styles() {
        let doc = parse_markup("<p><strong><em>both</em></strong></p>").unwrap();
        let style = match &doc.blocks[0].inlines[0] {
            crate::document::Inline::Run(run) => run.style,
            _ => panic!("expected run"),
        };
        assert_eq!(style, TextStyle { bold: true, italic: true, ..Default::default() });
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            parse_markup("<p><script>x</script></p>"),
            Err(MarkupError::UnexpectedTag(_))
        ));
    }

    #[test]
    fn mismatched_close_is_rejected() {
        assert!(matches!(
            parse_markup("<p><strong>x</em></p>"),
            Err(MarkupError::MismatchedClose(_))
        ));
    }
}
